//! Admin handlers. Every handler checks the caller's admin flag first.

use super::{error_response, store_error, ApiError, AppState, PaginationQuery};
use crate::auth::AuthUser;
use crate::store::{ActionCount, Profile, ProfileStore, UsageEvent, UsageQuery};
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};

/// List users response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListUsersResponse {
    pub users: Vec<Profile>,
    pub total: u64,
}

/// Grant/revoke admin request body.
#[derive(Debug, Deserialize)]
pub struct SetAdminRequest {
    pub is_admin: bool,
}

/// Admin usage listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminUsageResponse {
    pub events: Vec<UsageEvent>,
    pub total: u64,
}

/// Per-action usage summary.
#[derive(Debug, Serialize, Deserialize)]
pub struct UsageSummaryResponse {
    pub actions: Vec<ActionCount>,
    pub total_events: u64,
}

/// Manual prune result.
#[derive(Debug, Serialize, Deserialize)]
pub struct PruneResponse {
    pub removed: usize,
    pub remaining: usize,
}

/// Reject callers without the admin flag.
pub fn require_admin(profiles: &ProfileStore, user: &AuthUser) -> Result<(), ApiError> {
    profiles
        .ensure(&user.user_id, user.email.as_deref())
        .map_err(store_error)?;

    if !profiles.is_admin(&user.user_id).map_err(store_error)? {
        tracing::warn!(user_id = %user.user_id, "Admin route denied");
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "Admin access required",
        ));
    }
    Ok(())
}

pub(super) async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListUsersResponse>, ApiError> {
    require_admin(&state.profiles, &user)?;

    let users = state
        .profiles
        .list(query.limit, query.offset)
        .map_err(store_error)?;
    let total = state.profiles.count().map_err(store_error)?;
    Ok(Json(ListUsersResponse { users, total }))
}

pub(super) async fn set_admin(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(request): Json<SetAdminRequest>,
) -> Result<Json<Profile>, ApiError> {
    require_admin(&state.profiles, &user)?;

    if id == user.user_id && !request.is_admin {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_INPUT",
            "Admins cannot revoke their own admin flag",
        ));
    }

    let profile = state
        .profiles
        .set_admin(&id, request.is_admin)
        .map_err(store_error)?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "NOT_FOUND", "User not found"))?;

    tracing::info!(
        admin_id = %user.user_id,
        user_id = %id,
        is_admin = request.is_admin,
        "Admin flag changed"
    );
    Ok(Json(profile))
}

pub(super) async fn list_usage(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<AdminUsageResponse>, ApiError> {
    require_admin(&state.profiles, &user)?;

    let events = state.usage.list(&query).map_err(store_error)?;
    let total = state
        .usage
        .count(query.user_id.as_deref())
        .map_err(store_error)?;
    Ok(Json(AdminUsageResponse { events, total }))
}

pub(super) async fn usage_summary(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UsageSummaryResponse>, ApiError> {
    require_admin(&state.profiles, &user)?;

    let actions = state.usage.summary_by_action().map_err(store_error)?;
    let total_events = actions.iter().map(|a| a.count).sum();
    Ok(Json(UsageSummaryResponse {
        actions,
        total_events,
    }))
}

pub(super) async fn prune_sessions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<PruneResponse>, ApiError> {
    require_admin(&state.profiles, &user)?;

    let removed = state
        .coalescer
        .prune_expired(state.session_settings.max_age_minutes);
    let remaining = state.coalescer.len();

    tracing::info!(admin_id = %user.user_id, removed, remaining, "Manual session prune");
    Ok(Json(PruneResponse { removed, remaining }))
}
