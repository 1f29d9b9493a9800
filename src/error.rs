// HTTP API Error Types
use axum::{
    extract::rejection::JsonRejection,
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::auth::AuthError;
use crate::provider::{ProviderError, StoreError};

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 429 Too Many Requests
    TooManyRequests { message: String, retry_after: u64 },

    // 500 Internal Server Error
    InternalServerError(String),

    // 502 Bad Gateway (identity provider or row store unreachable)
    BadGateway(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::InternalServerError(msg)
            | ApiError::BadGateway(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
            ApiError::TooManyRequests { message, .. } => message,
        }
    }

    /// Human-readable error title, the `error` field of the body
    pub fn title(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "Bad Request",
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::NotFound(_) => "Not Found",
            ApiError::TooManyRequests { .. } => "Too Many Requests",
            ApiError::InternalServerError(_) => "Internal Server Error",
            ApiError::BadGateway(_) => "Bad Gateway",
            ApiError::ServiceUnavailable(_) => "Service Unavailable",
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::TooManyRequests { .. } => "TOO_MANY_REQUESTS",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::BadGateway(_) => "BAD_GATEWAY",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "error": self.title(),
            "message": self.message(),
            "code": self.error_code()
        });
        if let ApiError::TooManyRequests { retry_after, .. } = self {
            body["retryAfter"] = json!(retry_after);
        }
        body
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    /// `retry_after` is in whole seconds.
    pub fn too_many_requests(message: impl Into<String>, retry_after: u64) -> Self {
        ApiError::TooManyRequests {
            message: message.into(),
            retry_after,
        }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ApiError::BadGateway(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingHeader | AuthError::InvalidFormat => {
                ApiError::unauthorized("No valid authorization token provided")
            }
            AuthError::InvalidToken(_) => ApiError::unauthorized("Invalid or expired token"),
            AuthError::NotAuthenticated => ApiError::unauthorized("Authentication required"),
            AuthError::InsufficientRole => ApiError::forbidden("Insufficient permissions"),
            AuthError::RoleLookup(_) => ApiError::internal_server_error("Error fetching user profile"),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            StoreError::Unavailable(msg) => {
                tracing::error!("Profile store unavailable: {}", msg);
                ApiError::service_unavailable("Profile store temporarily unavailable")
            }
            StoreError::Query(msg) => {
                // Don't expose store internals to clients
                tracing::error!("Profile store query error: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            StoreError::InvalidRole(role) => {
                tracing::error!("Profile store returned unknown role '{}'", role);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Rejected { message, .. } => ApiError::bad_request(message),
            ProviderError::Unavailable(msg) => {
                tracing::error!("Identity provider unavailable: {}", msg);
                ApiError::bad_gateway("Identity provider temporarily unavailable")
            }
            ProviderError::InvalidResponse(msg) => {
                tracing::error!("Identity provider returned an unexpected response: {}", msg);
                ApiError::bad_gateway("Identity provider returned an unexpected response")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::bad_request(err.body_text())
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let mut response = (self.status_code(), Json(self.to_json())).into_response();
        if let ApiError::TooManyRequests { retry_after, .. } = &self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(*retry_after));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_body_shape() {
        let body = ApiError::unauthorized("Invalid or expired token").to_json();
        assert_eq!(body["error"], "Unauthorized");
        assert_eq!(body["message"], "Invalid or expired token");
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[test]
    fn forbidden_body_shape() {
        let err: ApiError = AuthError::InsufficientRole.into();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_json()["message"], "Insufficient permissions");
    }

    #[test]
    fn role_lookup_failure_does_not_leak_detail() {
        let err: ApiError = AuthError::RoleLookup("connection reset by peer at 10.0.0.3".into()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_json()["error"], "Internal Server Error");
        assert!(!err.message().contains("10.0.0.3"));
    }

    #[test]
    fn malformed_header_and_missing_header_share_message() {
        let missing: ApiError = AuthError::MissingHeader.into();
        let malformed: ApiError = AuthError::InvalidFormat.into();
        assert_eq!(missing.message(), malformed.message());
        assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn provider_transport_failure_is_generic() {
        let err: ApiError = ProviderError::Unavailable("dns error: api.internal".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(!err.message().contains("api.internal"));
    }

    #[test]
    fn too_many_requests_carries_retry_after() {
        let err = ApiError::too_many_requests("Rate limit exceeded", 42);
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        let body = err.to_json();
        assert_eq!(body["error"], "Too Many Requests");
        assert_eq!(body["retryAfter"], 42);

        let response = err.into_response();
        assert_eq!(response.headers()[RETRY_AFTER], "42");
    }
}
