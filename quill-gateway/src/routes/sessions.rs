//! Chat session handlers.
//!
//! Every lookup is owner-scoped, so another user's session id yields 404.

use super::{session_not_found, store_error, ApiError, AppState};
use crate::auth::AuthUser;
use crate::store::{ChatMessage, MessageRole, Session};
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};

const DEFAULT_SESSION_TITLE: &str = "New session";

/// Create/rename request body.
#[derive(Debug, Default, Deserialize)]
pub struct SessionTitleRequest {
    #[serde(default)]
    pub title: Option<String>,
}

/// Append-message request body.
#[derive(Debug, Deserialize)]
pub struct AppendMessageRequest {
    pub role: MessageRole,
    pub content: String,
}

/// List sessions response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<Session>,
}

/// Session with its messages.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub messages: Vec<ChatMessage>,
}

/// Message list response.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<ChatMessage>,
}

pub(super) async fn list_sessions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ListSessionsResponse>, ApiError> {
    let sessions = state
        .sessions
        .list_for_user(&user.user_id)
        .map_err(store_error)?;
    Ok(Json(ListSessionsResponse { sessions }))
}

pub(super) async fn create_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Option<Json<SessionTitleRequest>>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let title = body
        .and_then(|Json(b)| b.title)
        .unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());

    let session = state
        .sessions
        .create(&user.user_id, &title)
        .map_err(store_error)?;

    tracing::info!(user_id = %user.user_id, session_id = %session.id, "Session created");
    Ok((StatusCode::CREATED, Json(session)))
}

pub(super) async fn get_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetail>, ApiError> {
    let session = state
        .sessions
        .get(&user.user_id, &id)
        .map_err(store_error)?
        .ok_or_else(session_not_found)?;

    let messages = state
        .sessions
        .list_messages(&user.user_id, &id)
        .map_err(store_error)?
        .ok_or_else(session_not_found)?;

    Ok(Json(SessionDetail { session, messages }))
}

pub(super) async fn rename_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(request): Json<SessionTitleRequest>,
) -> Result<Json<Session>, ApiError> {
    let title = request.title.unwrap_or_default();
    let session = state
        .sessions
        .rename(&user.user_id, &id, &title)
        .map_err(store_error)?
        .ok_or_else(session_not_found)?;
    Ok(Json(session))
}

pub(super) async fn delete_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .sessions
        .delete(&user.user_id, &id)
        .map_err(store_error)?;

    if !deleted {
        return Err(session_not_found());
    }

    tracing::info!(user_id = %user.user_id, session_id = %id, "Session deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn list_messages(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let messages = state
        .sessions
        .list_messages(&user.user_id, &id)
        .map_err(store_error)?
        .ok_or_else(session_not_found)?;
    Ok(Json(MessagesResponse { messages }))
}

pub(super) async fn append_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(request): Json<AppendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    let message = state
        .sessions
        .append_message(&user.user_id, &id, request.role, &request.content)
        .map_err(store_error)?
        .ok_or_else(session_not_found)?;
    Ok((StatusCode::CREATED, Json(message)))
}
