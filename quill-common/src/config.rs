//! Configuration management for Quill services.
//!
//! The gateway reads a single configuration file at `~/.quill/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (QUILL_* prefix, provider key variables)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `QUILL_PORT` → server.port
//! - `QUILL_BIND_ADDRESS` → network.bind
//! - `QUILL_JWT_SECRET` → auth.jwt_secret
//! - `QUILL_DB_PATH` → database.path
//! - `QUILL_LOG_LEVEL` → observability.log_level
//! - `OPENAI_API_KEY` → llm.api_key
//! - `QUILL_LLM_MODEL` → llm.model
//! - `HUMANIZER_API_KEY` → humanizer.api_key
//! - `HUMANIZER_BASE_URL` → humanizer.base_url

use crate::error::Error;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".quill"),
        |dirs| dirs.home_dir().join(".quill"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4480
}

fn default_cookie_name() -> String {
    "quill-session".to_string()
}

fn default_token_expiry() -> u64 {
    86400
}

fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_title_count() -> usize {
    5
}

fn default_humanizer_base_url() -> String {
    "https://humanize.undetectable.ai".to_string()
}

fn default_humanizer_timeout() -> u64 {
    60
}

fn default_window_minutes() -> u64 {
    30
}

fn default_max_age_minutes() -> u64 {
    60
}

fn default_prune_interval() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Sections
// ============================================================================

/// Network bind configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default "127.0.0.1"; set "0.0.0.0" for remote access.
    #[serde(default = "default_bind_address")]
    pub bind: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Authentication configuration.
///
/// Sessions are issued by the external auth provider as HS256 JWTs; the
/// gateway only needs the shared secret and the cookie that carries them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret shared with the auth provider
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Cookie carrying the session token
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Expiry for tokens minted locally (tests, tooling)
    #[serde(default = "default_token_expiry")]
    pub token_expiry_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            cookie_name: default_cookie_name(),
            token_expiry_secs: default_token_expiry(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path (defaults to `<config_dir>/quill.db`)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// Resolve the effective database path.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| config_dir().join("quill.db"))
    }
}

/// LLM provider used for title generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Number of titles requested per generation
    #[serde(default = "default_title_count")]
    pub title_count: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            title_count: default_title_count(),
        }
    }
}

/// Text rewriting (humanizer) API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanizerConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_humanizer_base_url")]
    pub base_url: String,

    #[serde(default = "default_humanizer_timeout")]
    pub timeout_secs: u64,
}

impl Default for HumanizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_humanizer_base_url(),
            timeout_secs: default_humanizer_timeout(),
        }
    }
}

/// Workflow session coalescing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Rolling window within which workflow steps share a session
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u64,

    /// Age past which coalescer entries are pruned
    #[serde(default = "default_max_age_minutes")]
    pub max_age_minutes: u64,

    /// Background prune cadence in seconds; 0 disables the pruner
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            max_age_minutes: default_max_age_minutes(),
            prune_interval_secs: default_prune_interval(),
        }
    }
}

impl SessionsConfig {
    /// Reject settings under which pruning would cut the window short.
    pub fn validate(&self) -> crate::Result<()> {
        if self.window_minutes == 0 {
            return Err(Error::Config("sessions.window_minutes must be positive".into()));
        }
        if self.max_age_minutes < self.window_minutes {
            return Err(Error::Config(format!(
                "sessions.max_age_minutes ({}) must be at least sessions.window_minutes ({})",
                self.max_age_minutes, self.window_minutes
            )));
        }
        Ok(())
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub humanizer: HumanizerConfig,

    #[serde(default)]
    pub sessions: SessionsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(port) = var("QUILL_PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid QUILL_PORT"),
            }
        }
        if let Some(bind) = var("QUILL_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(secret) = var("QUILL_JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(path) = var("QUILL_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }
        if let Some(level) = var("QUILL_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = var("QUILL_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(key) = var("HUMANIZER_API_KEY") {
            self.humanizer.api_key = Some(key);
        }
        if let Some(url) = var("HUMANIZER_BASE_URL") {
            self.humanizer.base_url = url;
        }
    }

    /// Socket address string the gateway binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.network.bind, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 4480);
        assert_eq!(config.network.bind, "127.0.0.1");
        assert_eq!(config.auth.cookie_name, "quill-session");
        assert_eq!(config.sessions.window_minutes, 30);
        assert_eq!(config.sessions.max_age_minutes, 60);
        assert_eq!(config.llm.title_count, 5);
        assert_eq!(config.bind_address(), "127.0.0.1:4480");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"server": {"port": 9000}, "observability": {"level": "debug"}}"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, "pretty");
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"auth": {"jwt_secret": "s3cret"}, "sessions": {"window_minutes": 10}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.sessions.window_minutes, 10);
    }

    #[test]
    fn test_sessions_validate() {
        assert!(SessionsConfig::default().validate().is_ok());

        let zero_window = SessionsConfig {
            window_minutes: 0,
            ..SessionsConfig::default()
        };
        assert!(matches!(zero_window.validate(), Err(Error::Config(_))));

        let short_max_age = SessionsConfig {
            window_minutes: 90,
            max_age_minutes: 60,
            ..SessionsConfig::default()
        };
        assert!(matches!(short_max_age.validate(), Err(Error::Config(_))));

        let equal = SessionsConfig {
            window_minutes: 45,
            max_age_minutes: 45,
            ..SessionsConfig::default()
        };
        assert!(equal.validate().is_ok());
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("QUILL_PORT", "5000"),
            ("QUILL_JWT_SECRET", "env-secret"),
            ("OPENAI_API_KEY", "sk-test"),
            ("QUILL_DB_PATH", "/tmp/q.db"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("env-secret"));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.database.resolved_path(), PathBuf::from("/tmp/q.db"));
    }

    #[test]
    fn test_invalid_port_override_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|k| (k == "QUILL_PORT").then(|| "nope".to_string()));
        assert_eq!(config.server.port, 4480);
    }
}
