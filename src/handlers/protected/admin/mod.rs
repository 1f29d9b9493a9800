// handlers/protected/admin/mod.rs - Staff-only user management
//
// Mounted behind RoleGuard(admin, manager); role changes additionally
// require admin.

pub mod users;

pub use users::{user_role_put, user_show, users_list};
