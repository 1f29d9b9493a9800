use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::auth::{AuthUser, Role};
use crate::error::ApiError;
use crate::handlers::{json_body, non_empty};
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct RoleUpdateRequest {
    pub role: Option<String>,
}

/// GET /admin/users - All profiles, newest first
pub async fn users_list(State(state): State<AppState>) -> ApiResult<Value> {
    let profiles = state.profiles.list_profiles().await?;
    Ok(ApiResponse::success(json!({ "data": profiles })))
}

/// GET /admin/users/:id
pub async fn user_show(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let profile = state
        .profiles
        .get_profile(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User {} not found", id)))?;

    Ok(ApiResponse::success(json!({ "data": profile })))
}

/// PUT /admin/users/:id/role - Change a user's role (admin only)
///
/// Expected Input:
/// ```json
/// { "role": "user | counsellor | manager | admin" }
/// ```
pub async fn user_role_put(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<RoleUpdateRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let body = json_body(payload)?;
    let requested = non_empty(body.role).ok_or_else(|| ApiError::bad_request("Role is required"))?;
    let role: Role = requested.trim().parse().map_err(|_| {
        ApiError::bad_request(format!(
            "Invalid role '{}'. Must be one of: user, counsellor, manager, admin",
            requested
        ))
    })?;

    let profile = state.profiles.set_role(&id, role).await?;

    tracing::info!(actor = %actor.id, target = %id, role = %role, "Role changed");
    Ok(ApiResponse::success(json!({
        "message": "Role updated successfully",
        "data": profile,
    })))
}
