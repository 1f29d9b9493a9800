pub mod auth;
pub mod csrf;
pub mod rate_limit;
pub mod response;
pub mod role;

pub use auth::require_auth;
pub use csrf::{csrf_protection, csrf_token, CsrfSecret, CSRF_HEADER};
pub use rate_limit::{rate_limit, RateLimit};
pub use response::{ApiResponse, ApiResult};
pub use role::{require_role, RoleGuard};
