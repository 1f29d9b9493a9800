// handlers/mod.rs - Handler tiers
//
// Public (no auth) → Protected (bearer token + role resolution, some routers
// further restricted by role). System endpoints sit outside the API prefix.

pub mod protected;
pub mod public;
pub mod system;

use axum::{extract::rejection::JsonRejection, Json};

use crate::error::ApiError;

/// Unwrap a JSON body, turning extractor rejections into a 400 `ApiError`.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(ApiError::from)
}

/// Treat absent, empty and whitespace-only fields alike.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
