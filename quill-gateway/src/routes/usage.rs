//! Usage tracking handlers.

use super::{store_error, ApiError, AppState, PaginationQuery};
use crate::auth::AuthUser;
use crate::store::{validate_action, UsageEvent};
use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};

/// Record-usage request body.
#[derive(Debug, Deserialize)]
pub struct RecordUsageRequest {
    pub action: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Record-usage response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordUsageResponse {
    pub session_id: String,
    pub event: UsageEvent,
}

/// Usage history response.
#[derive(Debug, Serialize, Deserialize)]
pub struct UsageListResponse {
    pub events: Vec<UsageEvent>,
    pub total: u64,
}

/// Record a workflow step under the caller's current coalesced session.
pub(crate) fn record_step(
    state: &AppState,
    user: &AuthUser,
    action: &str,
    metadata: serde_json::Value,
) -> Result<UsageEvent, ApiError> {
    validate_action(action).map_err(store_error)?;

    let settings = &state.session_settings;
    let _removed = state.coalescer.prune_expired(settings.max_age_minutes);

    let session_id = state
        .coalescer
        .get_or_create(&user.user_id, settings.window_minutes);

    state
        .usage
        .record(&user.user_id, &session_id, action, metadata)
        .map_err(store_error)
}

pub(super) async fn record_usage(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<RecordUsageRequest>,
) -> Result<(StatusCode, Json<RecordUsageResponse>), ApiError> {
    state
        .profiles
        .ensure(&user.user_id, user.email.as_deref())
        .map_err(store_error)?;

    let metadata = request
        .metadata
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
    let event = record_step(&state, &user, &request.action, metadata)?;

    Ok((
        StatusCode::CREATED,
        Json(RecordUsageResponse {
            session_id: event.session_id.clone(),
            event,
        }),
    ))
}

pub(super) async fn list_usage(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<UsageListResponse>, ApiError> {
    let events = state
        .usage
        .list_for_user(&user.user_id, query.limit, query.offset)
        .map_err(store_error)?;
    let total = state
        .usage
        .count(Some(&user.user_id))
        .map_err(store_error)?;
    Ok(Json(UsageListResponse { events, total }))
}
