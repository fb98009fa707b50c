//! Route definitions for Quill Gateway.
//!
//! Provides HTTP endpoints for profiles, chat sessions, usage tracking, the
//! AI proxies, admin reporting, and health checks.

mod admin;
mod ai;
mod profile;
mod sessions;
mod usage;

pub use admin::require_admin;
pub use ai::{HumanizeRequest, HumanizeResponse, TitlesResponse};
pub use usage::{RecordUsageRequest, RecordUsageResponse};

use crate::auth::{auth_middleware, AuthState};
use crate::coalescer::SessionCoalescer;
use crate::humanizer::HumanizerClient;
use crate::provider::{OpenAIProvider, Provider};
use crate::store::{Database, ProfileStore, SessionStore, UsageStore};
use axum::{
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post, put},
    Router,
};
use quill_common::config::{Config, SessionsConfig};
use quill_common::Error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub profiles: ProfileStore,
    pub sessions: SessionStore,
    pub usage: UsageStore,
    pub coalescer: Arc<SessionCoalescer>,
    pub session_settings: SessionsConfig,
    /// Title generator, absent when no LLM key is configured
    pub llm: Option<Arc<dyn Provider>>,
    pub llm_model: String,
    pub title_count: usize,
    /// Humanizer, absent when no humanizer key is configured
    pub humanizer: Option<HumanizerClient>,
}

impl AppState {
    /// Wire up stores and upstream clients from configuration.
    pub fn from_config(config: &Config, db: Database) -> anyhow::Result<Self> {
        let jwt_secret = config.auth.jwt_secret.clone().ok_or_else(|| {
            Error::Config("auth.jwt_secret is not set (QUILL_JWT_SECRET)".into())
        })?;

        config.sessions.validate()?;

        let auth = AuthState::new(
            jwt_secret,
            config.auth.cookie_name.clone(),
            config.auth.token_expiry_secs,
        );

        let llm: Option<Arc<dyn Provider>> = match config.llm.api_key.as_deref() {
            Some(key) if !key.is_empty() => {
                let provider = OpenAIProvider::with_base_url(key, config.llm.base_url.clone())?;
                if !provider.supports_model(&config.llm.model) {
                    tracing::warn!(
                        model = %config.llm.model,
                        provider = provider.name(),
                        "Configured model may not be served by this provider"
                    );
                }
                Some(Arc::new(provider) as Arc<dyn Provider>)
            }
            _ => {
                tracing::warn!("No LLM API key configured; title generation disabled");
                None
            }
        };

        let humanizer = match config.humanizer.api_key.as_deref() {
            Some(key) if !key.is_empty() => Some(HumanizerClient::new(
                key,
                config.humanizer.base_url.clone(),
                Duration::from_secs(config.humanizer.timeout_secs),
            )?),
            _ => {
                tracing::warn!("No humanizer API key configured; humanization disabled");
                None
            }
        };

        Ok(Self {
            auth,
            profiles: db.profiles(),
            sessions: db.sessions(),
            usage: db.usage(),
            coalescer: Arc::new(SessionCoalescer::new()),
            session_settings: config.sessions.clone(),
            llm,
            llm_model: config.llm.model.clone(),
            title_count: config.llm.title_count,
            humanizer,
        })
    }
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// Pagination query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PaginationQuery {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: code.into(),
        }),
    )
}

/// Map a typed error onto its HTTP status and code.
pub(crate) fn api_error(err: &Error) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(status, err.code(), err.to_string())
}

/// Map a store error: validation failures become 400, everything else 500.
pub(crate) fn store_error(err: anyhow::Error) -> ApiError {
    match err.downcast_ref::<Error>() {
        Some(typed) => api_error(typed),
        None => {
            tracing::error!(error = %err, "Storage failure");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Storage failure",
            )
        }
    }
}

pub(crate) fn session_not_found() -> ApiError {
    error_response(StatusCode::NOT_FOUND, "SESSION_NOT_FOUND", "Session not found")
}

/// Build the complete router with all routes.
pub fn build_all_routes(state: AppState) -> Router {
    let auth_layer = middleware::from_fn_with_state(state.auth.clone(), auth_middleware);

    let api = Router::new()
        .route("/api/profile", get(profile::get_profile).put(profile::update_profile))
        .route(
            "/api/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/api/sessions/:id",
            get(sessions::get_session)
                .patch(sessions::rename_session)
                .delete(sessions::delete_session),
        )
        .route(
            "/api/sessions/:id/messages",
            get(sessions::list_messages).post(sessions::append_message),
        )
        .route("/api/usage", get(usage::list_usage).post(usage::record_usage))
        .route("/api/titles", post(ai::generate_titles))
        .route("/api/humanize", post(ai::humanize))
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/:id/admin", put(admin::set_admin))
        .route("/api/admin/usage", get(admin::list_usage))
        .route("/api/admin/usage/summary", get(admin::usage_summary))
        .route("/api/admin/sessions/prune", post(admin::prune_sessions))
        .layer(auth_layer)
        .with_state(state);

    Router::new().merge(api).merge(health_routes())
}

/// Build health check routes.
pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/health", get(health_handler))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "quill-gateway".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let (status, Json(body)) =
            store_error(Error::InvalidInput("Session title cannot be empty".into()).into());
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "INVALID_INPUT");

        let (status, Json(body)) = store_error(anyhow::anyhow!("disk I/O error"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "DATABASE_ERROR");
        assert!(!body.error.contains("disk"));
    }

    #[test]
    fn test_from_config_requires_secret() {
        let db = Database::open_in_memory().unwrap();
        let config = Config::default();
        assert!(AppState::from_config(&config, db).is_err());
    }

    #[test]
    fn test_from_config_rejects_window_longer_than_max_age() {
        let mut config = Config::default();
        config.auth.jwt_secret = Some("secret".into());
        config.sessions.window_minutes = 90;
        config.sessions.max_age_minutes = 60;

        let err = AppState::from_config(&config, Database::open_in_memory().unwrap())
            .err()
            .unwrap();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))));

        config.sessions.window_minutes = 0;
        assert!(AppState::from_config(&config, Database::open_in_memory().unwrap()).is_err());
    }

    #[test]
    fn test_from_config_without_upstream_keys() {
        let db = Database::open_in_memory().unwrap();
        let mut config = Config::default();
        config.auth.jwt_secret = Some("secret".into());

        let state = AppState::from_config(&config, db).unwrap();
        assert!(state.llm.is_none());
        assert!(state.humanizer.is_none());
        assert_eq!(state.llm_model, "gpt-4o-mini");
    }
}
