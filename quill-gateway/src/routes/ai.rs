//! AI proxy handlers: title generation and humanization.
//!
//! Both record a usage event under the caller's coalesced workflow session.
//! A failure to record is logged but does not fail the response.

use super::usage::record_step;
use super::{error_response, ApiError, AppState};
use crate::auth::AuthUser;
use crate::humanizer::{self, DEFAULT_PURPOSE, DEFAULT_READABILITY};
use crate::provider::TokenUsage;
use crate::titles::{build_title_request, parse_titles, TitleRequest};
use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::Json,
};
use quill_common::util::{truncate_with_ellipsis, word_count};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Title generation response.
#[derive(Debug, Serialize, Deserialize)]
pub struct TitlesResponse {
    pub titles: Vec<String>,
    pub model: String,
    pub usage: TokenUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Humanize request body.
#[derive(Debug, Deserialize)]
pub struct HumanizeRequest {
    pub content: String,
    #[serde(default)]
    pub readability: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
}

/// Humanize response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HumanizeResponse {
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

fn not_configured(what: &str) -> ApiError {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "PROVIDER_NOT_CONFIGURED",
        format!("{} is not configured", what),
    )
}

fn invalid_input(message: impl Into<String>) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, "INVALID_INPUT", message)
}

fn record_quietly(
    state: &AppState,
    user: &AuthUser,
    action: &str,
    metadata: serde_json::Value,
) -> Option<String> {
    match record_step(state, user, action, metadata) {
        Ok(event) => Some(event.session_id),
        Err((_, Json(err))) => {
            tracing::warn!(
                user_id = %user.user_id,
                action,
                error = %err.error,
                "Failed to record usage"
            );
            None
        }
    }
}

pub(super) async fn generate_titles(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<TitleRequest>,
) -> Result<Json<TitlesResponse>, ApiError> {
    let topic = request.validate().map_err(invalid_input)?;

    let Some(provider) = state.llm.clone() else {
        return Err(not_configured("Title generation"));
    };

    let count = request.count.unwrap_or(state.title_count);
    tracing::info!(
        user_id = %user.user_id,
        topic = %truncate_with_ellipsis(topic, 60),
        count,
        "Generating titles"
    );
    let chat_request = build_title_request(
        topic,
        &request.keywords,
        request.tone.as_deref(),
        count,
        &state.llm_model,
    );

    let response = provider.chat(chat_request).await.map_err(|e| {
        tracing::error!(user_id = %user.user_id, error = %e, "Title generation failed");
        error_response(StatusCode::BAD_GATEWAY, "LLM_ERROR", "Title generation failed")
    })?;

    let titles = parse_titles(&response.content, count);
    if titles.is_empty() {
        tracing::error!(user_id = %user.user_id, "LLM reply contained no titles");
        return Err(error_response(
            StatusCode::BAD_GATEWAY,
            "LLM_ERROR",
            "Model returned no usable titles",
        ));
    }

    let session_id = record_quietly(
        &state,
        &user,
        "generate_titles",
        json!({
            "model": response.model,
            "count": titles.len(),
            "total_tokens": response.usage.total_tokens,
        }),
    );

    Ok(Json(TitlesResponse {
        titles,
        model: response.model,
        usage: response.usage,
        session_id,
    }))
}

pub(super) async fn humanize(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<HumanizeRequest>,
) -> Result<Json<HumanizeResponse>, ApiError> {
    humanizer::validate_content(&request.content).map_err(invalid_input)?;

    let Some(client) = state.humanizer.clone() else {
        return Err(not_configured("Humanizer"));
    };

    let readability = request.readability.as_deref().unwrap_or(DEFAULT_READABILITY);
    let purpose = request.purpose.as_deref().unwrap_or(DEFAULT_PURPOSE);

    let result = client
        .humanize(&request.content, readability, purpose)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %user.user_id, error = %e, "Humanization failed");
            error_response(StatusCode::BAD_GATEWAY, "HUMANIZER_ERROR", "Humanization failed")
        })?;

    let session_id = record_quietly(
        &state,
        &user,
        "humanize",
        json!({
            "document_id": result.document_id,
            "input_chars": request.content.chars().count(),
            "input_words": word_count(&request.content),
            "output_chars": result.output.chars().count(),
            "readability": readability,
            "purpose": purpose,
        }),
    );

    Ok(Json(HumanizeResponse {
        output: result.output,
        document_id: result.document_id,
        session_id,
    }))
}
