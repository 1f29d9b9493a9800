use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::ApiError;
use crate::handlers::{json_body, non_empty};
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub password: Option<String>,
    /// Recovery token from the reset email link.
    pub access_token: Option<String>,
}

/// POST /auth/forgot-password - Ask the provider to email a recovery link
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let body = json_body(payload)?;
    let email = non_empty(body.email).ok_or_else(|| ApiError::bad_request("Email is required"))?;

    state.identity.send_password_reset(&email).await.map_err(|e| {
        tracing::error!("Password reset error: {}", e);
        ApiError::from(e)
    })?;

    Ok(ApiResponse::success(json!({ "message": "Password reset email sent" })))
}

/// POST /auth/reset-password - Set a new password with a recovery token
///
/// Expected Input:
/// ```json
/// { "password": "string", "accessToken": "string" }
/// ```
pub async fn reset_password(
    State(state): State<AppState>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let body = json_body(payload)?;
    let (password, access_token) = match (non_empty(body.password), non_empty(body.access_token)) {
        (Some(password), Some(token)) => (password, token),
        _ => {
            return Err(ApiError::bad_request(
                "Password and access token are required",
            ))
        }
    };

    state
        .identity
        .update_password(&access_token, &password)
        .await
        .map_err(|e| {
            tracing::error!("Password update error: {}", e);
            ApiError::from(e)
        })?;

    Ok(ApiResponse::success(json!({ "message": "Password updated successfully" })))
}
