// handlers/protected/mod.rs - Protected handlers (bearer token required)
//
// Every route here sits behind `require_auth`, so handlers receive the caller
// as an `AuthUser` argument. The admin tier is further limited by `RoleGuard`.

pub mod admin;
pub mod auth;
