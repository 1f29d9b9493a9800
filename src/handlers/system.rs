use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Json},
};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::ApiError;

/// GET / - service descriptor
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let prefix = state.config.api_prefix();

    Json(json!({
        "name": "U-Recover API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Authentication and role gateway for the U-Recover platform",
        "endpoints": {
            "home": "/ (public)",
            "health": "/health (public)",
            "auth": format!("{}/auth/signup, /signin, /refresh, /forgot-password, /reset-password (public)", prefix),
            "session": format!("{}/auth/signout, /profile, /whoami, /csrf-token (bearer token)", prefix),
            "admin": format!("{}/admin/users[/:id[/role]] (admin, manager)", prefix),
        }
    }))
}

/// GET /health - liveness plus a profile store round trip
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.profiles.health_check().await;

    let (status, label, profiles) = match &store {
        Ok(()) => (StatusCode::OK, "ok", "ok"),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable")
        }
    };

    (
        status,
        Json(json!({
            "status": label,
            "timestamp": chrono::Utc::now(),
            "environment": state.config.environment,
            "version": env!("CARGO_PKG_VERSION"),
            "profiles": profiles,
        })),
    )
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("Route {} not found", uri.path()))
}
