use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::json_body;
use crate::middleware::{ApiResponse, ApiResult};
use crate::provider::{Identity, Profile, ProfileUpdate};

/// Stored profile for the caller, creating the default `user` row when absent.
async fn ensure_profile(state: &AppState, user: &AuthUser) -> Result<Profile, ApiError> {
    let existing = state.profiles.get_profile(&user.id).await.map_err(|e| {
        tracing::error!("Profile fetch error for user '{}': {}", user.id, e);
        ApiError::internal_server_error("Error fetching profile")
    })?;

    if let Some(profile) = existing {
        return Ok(profile);
    }

    let identity = Identity {
        id: user.id.clone(),
        email: user.email.clone(),
    };
    let created = state
        .profiles
        .create_profile(Profile::default_for(&identity))
        .await
        .map_err(|e| {
            tracing::error!("Profile creation error for user '{}': {}", user.id, e);
            ApiError::internal_server_error("Error creating profile")
        })?;

    tracing::info!(user_id = %user.id, "Created default profile");
    Ok(created)
}

/// GET /auth/profile
pub async fn profile_get(State(state): State<AppState>, user: AuthUser) -> ApiResult<Value> {
    let profile = ensure_profile(&state, &user).await?;
    Ok(ApiResponse::success(json!({ "profile": profile })))
}

/// PUT /auth/profile - Update `fullName`, `avatarUrl` and `phone`
///
/// Any other field in the body, `role` included, is ignored.
pub async fn profile_put(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<Value> {
    let update = json_body(payload)?;
    if update.is_empty() {
        return Err(ApiError::bad_request("No updatable profile fields provided"));
    }

    ensure_profile(&state, &user).await?;
    let profile = state
        .profiles
        .update_profile(&user.id, &update)
        .await
        .map_err(|e| {
            tracing::error!("Profile update error for user '{}': {}", user.id, e);
            ApiError::internal_server_error("Error updating profile")
        })?;

    Ok(ApiResponse::success(json!({
        "message": "Profile updated successfully",
        "profile": profile,
    })))
}
