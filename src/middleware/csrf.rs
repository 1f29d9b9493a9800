use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::auth::bearer_token;
use crate::error::ApiError;

pub const CSRF_HEADER: &str = "x-csrf-token";

/// Shared secret the per-session CSRF token is derived from.
#[derive(Clone)]
pub struct CsrfSecret(Arc<str>);

impl CsrfSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Arc::from(secret.into()))
    }

    pub fn token_for(&self, bearer: &str) -> String {
        csrf_token(bearer, &self.0)
    }

    pub fn verify(&self, bearer: &str, presented: &str) -> bool {
        constant_time_eq(self.token_for(bearer).as_bytes(), presented.as_bytes())
    }
}

impl std::fmt::Debug for CsrfSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CsrfSecret(<redacted>)")
    }
}

/// Lowercase hex SHA-256 of the bearer token followed by the secret.
pub fn csrf_token(bearer: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bearer.as_bytes());
    hasher.update(secret.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub(crate) fn is_state_changing(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

/// Checks `x-csrf-token` on state-changing requests. Layered inside the
/// authentication gate, so a bearer token is already known to be present.
pub async fn csrf_protection(
    State(secret): State<CsrfSecret>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !is_state_changing(request.method()) {
        return Ok(next.run(request).await);
    }

    let presented = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            tracing::warn!(path = %request.uri().path(), "CSRF token missing");
            ApiError::forbidden("CSRF token is required for this operation")
        })?;

    let bearer = bearer_token(request.headers())?;
    if !secret.verify(bearer, presented) {
        tracing::warn!(path = %request.uri().path(), "CSRF token mismatch");
        return Err(ApiError::forbidden("CSRF token validation failed"));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_hex_sha256_of_bearer_and_secret() {
        // sha256("abc") with an empty secret
        assert_eq!(
            csrf_token("abc", ""),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(csrf_token("ab", "c"), csrf_token("abc", ""));
        assert_eq!(csrf_token("token", "secret").len(), 64);
    }

    #[test]
    fn verify_accepts_only_matching_token() {
        let secret = CsrfSecret::new("s3cret");
        let good = secret.token_for("at-1");
        assert!(secret.verify("at-1", &good));
        assert!(!secret.verify("at-2", &good));
        assert!(!secret.verify("at-1", &good[..63]));
    }

    #[test]
    fn only_mutating_methods_are_checked() {
        assert!(is_state_changing(&Method::POST));
        assert!(is_state_changing(&Method::DELETE));
        assert!(!is_state_changing(&Method::GET));
        assert!(!is_state_changing(&Method::OPTIONS));
    }

    #[test]
    fn debug_hides_secret() {
        assert!(!format!("{:?}", CsrfSecret::new("hunter2")).contains("hunter2"));
    }
}
