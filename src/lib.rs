pub mod app;
pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod provider;

pub use app::{app, AppState};
pub use auth::{AuthGate, AuthUser, Role};
pub use error::ApiError;
