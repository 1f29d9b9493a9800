// handlers/public/auth/mod.rs - Public authentication handlers

pub mod password; // POST /auth/forgot-password, /auth/reset-password
pub mod session;  // POST /auth/signup, /auth/signin, /auth/refresh

pub use password::{forgot_password, reset_password};
pub use session::{refresh, signin, signup};
