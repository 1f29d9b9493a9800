use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::{Deserialize, Serialize};

use crate::provider::{Identity, IdentityProvider, ProfileStore, StoreError};

/// Coarse permission level stored in the caller's profile row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Counsellor,
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Counsellor => "counsellor",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "counsellor" => Ok(Role::Counsellor),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            other => Err(StoreError::InvalidRole(other.to_string())),
        }
    }
}

/// Identity context attached to a request by the authentication gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingHeader,
    #[error("Authorization header must use Bearer token format")]
    InvalidFormat,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Authentication required")]
    NotAuthenticated,
    #[error("Insufficient permissions")]
    InsufficientRole,
    #[error("Role lookup failed: {0}")]
    RoleLookup(String),
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidFormat)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidFormat);
    }
    Ok(token)
}

/// Resolves the caller's role for an already-verified identity.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    async fn resolve(&self, identity: &Identity) -> Result<Role, StoreError>;
}

/// Reads the role from the profile row on every call. An absent row resolves
/// to [`Role::User`] without writing; lookup failures are returned as errors.
pub struct ProfileRoleResolver {
    profiles: Arc<dyn ProfileStore>,
}

impl ProfileRoleResolver {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl RoleResolver for ProfileRoleResolver {
    async fn resolve(&self, identity: &Identity) -> Result<Role, StoreError> {
        match self.profiles.get_profile(&identity.id).await? {
            Some(profile) => profile.role.parse(),
            None => Ok(Role::User),
        }
    }
}

/// Bearer-token gate: header check, provider verification, role resolution.
pub struct AuthGate {
    identity: Arc<dyn IdentityProvider>,
    roles: Arc<dyn RoleResolver>,
}

impl AuthGate {
    pub fn new(identity: Arc<dyn IdentityProvider>, roles: Arc<dyn RoleResolver>) -> Self {
        Self { identity, roles }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
        let token = bearer_token(headers).map_err(|e| {
            tracing::debug!("Rejecting request without usable bearer token: {}", e);
            e
        })?;

        let identity = self.identity.verify_token(token).await.map_err(|e| {
            tracing::warn!("Authentication failed: {}", e);
            AuthError::InvalidToken(e.to_string())
        })?;

        let role = self.roles.resolve(&identity).await.map_err(|e| {
            tracing::error!("Error fetching role for user '{}': {}", identity.id, e);
            AuthError::RoleLookup(e.to_string())
        })?;

        Ok(AuthUser {
            id: identity.id,
            email: identity.email,
            role,
        })
    }
}
