use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::auth::{AuthError, AuthUser, Role};
use crate::error::ApiError;

/// Allow-list of roles for a route or router. Must be layered inside [`super::require_auth`].
#[derive(Clone, Debug)]
pub struct RoleGuard {
    allowed: Arc<[Role]>,
}

impl RoleGuard {
    /// # Panics
    /// When `roles` is empty; a guard that admits nobody is a routing bug.
    pub fn any_of(roles: impl IntoIterator<Item = Role>) -> Self {
        let allowed: Vec<Role> = roles.into_iter().collect();
        assert!(!allowed.is_empty(), "RoleGuard requires at least one role");
        Self { allowed: allowed.into() }
    }

    pub fn check(&self, user: Option<&AuthUser>) -> Result<(), AuthError> {
        let user = user.ok_or(AuthError::NotAuthenticated)?;
        if user.has_any_role(&self.allowed) {
            Ok(())
        } else {
            Err(AuthError::InsufficientRole)
        }
    }
}

pub async fn require_role(
    State(guard): State<RoleGuard>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request.extensions().get::<AuthUser>();

    if let Err(e) = guard.check(user) {
        match user {
            Some(user) => tracing::warn!(
                user_id = %user.id,
                role = %user.role,
                path = %request.uri().path(),
                "Role not permitted"
            ),
            None => tracing::warn!(path = %request.uri().path(), "Role guard reached without identity"),
        }
        return Err(e.into());
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            id: "u1".into(),
            email: "u1@example.com".into(),
            role,
        }
    }

    #[test]
    fn admits_listed_roles() {
        let guard = RoleGuard::any_of([Role::Admin, Role::Manager]);
        assert!(guard.check(Some(&user(Role::Admin))).is_ok());
        assert!(guard.check(Some(&user(Role::Manager))).is_ok());
    }

    #[test]
    fn rejects_other_roles_as_forbidden() {
        let guard = RoleGuard::any_of([Role::Admin, Role::Manager]);
        assert!(matches!(guard.check(Some(&user(Role::User))), Err(AuthError::InsufficientRole)));
        assert!(matches!(guard.check(Some(&user(Role::Counsellor))), Err(AuthError::InsufficientRole)));
    }

    #[test]
    fn missing_identity_is_unauthenticated() {
        let guard = RoleGuard::any_of([Role::User]);
        assert!(matches!(guard.check(None), Err(AuthError::NotAuthenticated)));
    }

    #[test]
    #[should_panic(expected = "at least one role")]
    fn empty_allow_list_panics() {
        RoleGuard::any_of([]);
    }
}
