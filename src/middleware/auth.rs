use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use crate::auth::{AuthError, AuthGate, AuthUser};
use crate::error::ApiError;

/// Bearer-token authentication middleware: validates the token with the
/// identity provider, resolves the caller's role and injects [`AuthUser`].
pub async fn require_auth(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_user = gate.authenticate(request.headers()).await?;

    tracing::debug!(user_id = %auth_user.id, role = %auth_user.role, "Authenticated request");
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Handlers take `AuthUser` as an argument; outside the gate this rejects with 401.
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AuthError::NotAuthenticated.into())
    }
}
