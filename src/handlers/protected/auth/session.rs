use axum::{extract::State, http::HeaderMap};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::auth::{bearer_token, AuthUser};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

/// POST /auth/signout - Revoke the session behind the presented token
pub async fn signout(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
) -> ApiResult<Value> {
    let token = bearer_token(&headers)?;

    state.identity.sign_out(token).await.map_err(|e| {
        tracing::error!("Signout error for user '{}': {}", user.id, e);
        ApiError::from(e)
    })?;

    tracing::info!(user_id = %user.id, "User signed out");
    Ok(ApiResponse::success(json!({ "message": "Signed out successfully" })))
}

/// GET /auth/whoami - The identity context the gate attached
pub async fn whoami(user: AuthUser) -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({ "user": user })))
}

/// GET /auth/csrf-token - Token to echo in `x-csrf-token` on mutating requests
pub async fn csrf_token(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Value> {
    let secret = state
        .csrf
        .as_ref()
        .ok_or_else(|| ApiError::not_found("CSRF protection is not enabled"))?;
    let token = bearer_token(&headers)?;

    Ok(ApiResponse::success(json!({ "csrfToken": secret.token_for(token) })))
}
