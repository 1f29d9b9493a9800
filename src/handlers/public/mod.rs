// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Token acquisition and password recovery. Every input is validated here
// since there is no trusted caller context.

pub mod auth;
