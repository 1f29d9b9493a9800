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
use crate::provider::{Profile, ProviderError, SignUp};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// POST /auth/signup - Register with email and password
///
/// Expected Input:
/// ```json
/// { "email": "string", "password": "string", "fullName": "string (optional)" }
/// ```
///
/// Responds 201 with `{ message, user, session }`. `session` is null while the
/// provider waits for email confirmation. A profile row carrying the default
/// role is created on a best-effort basis.
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignUpRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let body = json_body(payload)?;
    let (email, password) = match (non_empty(body.email), non_empty(body.password)) {
        (Some(email), Some(password)) => (email, password),
        _ => return Err(ApiError::bad_request("Email and password are required")),
    };
    let full_name = non_empty(body.full_name);

    let grant = state
        .identity
        .sign_up(SignUp {
            email,
            password,
            full_name: full_name.clone(),
        })
        .await
        .map_err(|e| {
            tracing::error!("Signup error: {}", e);
            ApiError::from(e)
        })?;

    let mut profile = Profile::default_for(&grant.user);
    profile.full_name = full_name;
    if let Err(e) = state.profiles.create_profile(profile).await {
        tracing::warn!("Could not create profile for new user '{}': {}", grant.user.id, e);
    }

    tracing::info!(user_id = %grant.user.id, "User signed up");
    Ok(ApiResponse::created(json!({
        "message": "User created successfully",
        "user": grant.user,
        "session": grant.session,
    })))
}

/// POST /auth/signin - Exchange email and password for a session
///
/// Provider rejections surface as 401 with the provider's reason.
pub async fn signin(
    State(state): State<AppState>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let body = json_body(payload)?;
    let (email, password) = match (non_empty(body.email), non_empty(body.password)) {
        (Some(email), Some(password)) => (email, password),
        _ => return Err(ApiError::bad_request("Email and password are required")),
    };

    let grant = state
        .identity
        .sign_in_with_password(&email, &password)
        .await
        .map_err(|e| {
            tracing::warn!("Signin error: {}", e);
            rejected_as_unauthorized(e)
        })?;

    Ok(ApiResponse::success(json!({
        "message": "Signed in successfully",
        "user": grant.user,
        "session": grant.session,
    })))
}

/// POST /auth/refresh - Exchange a refresh token for a new pair
///
/// Expected Input:
/// ```json
/// { "refreshToken": "string" }
/// ```
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let body = json_body(payload)?;
    let refresh_token =
        non_empty(body.refresh_token).ok_or_else(|| ApiError::bad_request("Refresh token is required"))?;

    let session = state
        .identity
        .refresh_session(&refresh_token)
        .await
        .map_err(|e| {
            tracing::warn!("Token refresh error: {}", e);
            rejected_as_unauthorized(e)
        })?;

    Ok(ApiResponse::success(json!({
        "message": "Token refreshed successfully",
        "session": session,
    })))
}

fn rejected_as_unauthorized(err: ProviderError) -> ApiError {
    match err {
        ProviderError::Rejected { message, .. } => ApiError::unauthorized(message),
        other => other.into(),
    }
}
