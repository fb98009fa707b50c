//! LLM backends for title generation.
//!
//! Route handlers hold an `Arc<dyn Provider>`; only OpenAI-compatible chat
//! completions are implemented.

mod openai;

pub use openai::OpenAIProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A chat-completion backend.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `model` looks like one this backend serves.
    fn supports_model(&self, model: &str) -> bool;

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Failed completion. `status_code` is set when the backend answered.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ProviderError {
    pub(crate) fn new(
        provider: &str,
        model: &str,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            message: message.into(),
            status_code,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}] {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Completion request, independent of any backend's wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Sent ahead of `messages` as a system turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

/// One conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Completion result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub provider: String,
    /// Model the backend reports having used
    pub model: String,
    pub content: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
    pub latency_ms: u64,
}

/// Token accounting reported by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_skips_unset_options() {
        let request = ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::user("Hello")],
            max_tokens: Some(1000),
            temperature: None,
            system: Some("You are helpful.".into()),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::new("openai", "gpt-4o", "API error: boom", Some(500));
        assert_eq!(err.to_string(), "[openai:gpt-4o] API error: boom");
    }
}
