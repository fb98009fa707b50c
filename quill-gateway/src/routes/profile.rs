//! Profile handlers.

use super::{store_error, ApiError, AppState};
use crate::auth::AuthUser;
use crate::store::{Profile, UpdateProfileRequest};
use axum::{
    extract::{Extension, State},
    response::Json,
};

/// Get the caller's profile, creating it on first visit.
pub(super) async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Profile>, ApiError> {
    let profile = state
        .profiles
        .ensure(&user.user_id, user.email.as_deref())
        .map_err(store_error)?;
    Ok(Json(profile))
}

/// Update the caller's display name or email.
pub(super) async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    state
        .profiles
        .ensure(&user.user_id, user.email.as_deref())
        .map_err(store_error)?;

    let profile = state
        .profiles
        .update(&user.user_id, &request)
        .map_err(store_error)?;

    // ensure() just created the row; a miss here means it was deleted in between.
    let Some(profile) = profile else {
        return Err(store_error(anyhow::anyhow!(
            "profile {} vanished during update",
            user.user_id
        )));
    };

    tracing::info!(user_id = %user.user_id, "Profile updated");
    Ok(Json(profile))
}
