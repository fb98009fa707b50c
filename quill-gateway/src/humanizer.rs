//! Client for the text humanization service.
//!
//! The service rewrites AI-generated drafts so they read naturally. One
//! request, one response: there is no polling and no retry.

use quill_common::util::sanitize_for_log;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Longest draft accepted for rewriting, in characters.
pub const MAX_CONTENT_CHARS: usize = 10_000;

pub const DEFAULT_READABILITY: &str = "High School";
pub const DEFAULT_PURPOSE: &str = "General Writing";

/// Humanizer failures.
#[derive(Error, Debug)]
pub enum HumanizerError {
    #[error("Invalid humanizer configuration: {0}")]
    Config(String),

    #[error("Humanizer request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Humanizer returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Humanizer returned no output")]
    EmptyOutput,
}

/// Rewritten text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanizedText {
    pub document_id: Option<String>,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    content: &'a str,
    readability: &'a str,
    purpose: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default, alias = "documentId")]
    id: Option<String>,
    #[serde(default)]
    output: Option<String>,
}

/// Check a draft before sending it upstream.
pub fn validate_content(content: &str) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("Content cannot be empty".into());
    }
    let chars = content.chars().count();
    if chars > MAX_CONTENT_CHARS {
        return Err(format!(
            "Content too long ({} characters, max {})",
            chars, MAX_CONTENT_CHARS
        ));
    }
    Ok(())
}

/// HTTP client for the humanizer API.
#[derive(Clone)]
pub struct HumanizerClient {
    client: reqwest::Client,
    base_url: String,
}

impl HumanizerClient {
    pub fn new(
        api_key: &str,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, HumanizerError> {
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|_| HumanizerError::Config("API key contains invalid characters".into()))?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("api-key", key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Rewrite `content`.
    pub async fn humanize(
        &self,
        content: &str,
        readability: &str,
        purpose: &str,
    ) -> Result<HumanizedText, HumanizerError> {
        let url = format!("{}/submit", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&SubmitRequest {
                content,
                readability,
                purpose,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = sanitize_for_log(&response.text().await.unwrap_or_default());
            tracing::warn!(status = status.as_u16(), body = %body, "Humanizer returned an error");
            return Err(HumanizerError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let submitted: SubmitResponse = response.json().await?;
        let output = submitted
            .output
            .filter(|o| !o.trim().is_empty())
            .ok_or(HumanizerError::EmptyOutput)?;

        tracing::debug!(document_id = ?submitted.id, chars = output.len(), "Humanized draft");

        Ok(HumanizedText {
            document_id: submitted.id,
            output,
        })
    }
}
