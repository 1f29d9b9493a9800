//! Capabilities consumed from the hosted backend: the identity provider that
//! issues and verifies opaque bearer tokens, and the row store holding one
//! profile (and role) per identity.

pub mod memory;
pub mod postgres;
pub mod postgrest;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::Role;

pub use memory::{MemoryIdentityProvider, MemoryProfileStore};
pub use postgres::PgProfileStore;
pub use postgrest::PostgrestProfileStore;
pub use supabase::SupabaseAuth;

/// Identity as reported by the provider for a valid access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Access/refresh token pair issued by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(alias = "refreshToken")]
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Result of a signup or password sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthGrant {
    pub user: Identity,
    /// Absent when the provider requires email confirmation before issuing tokens.
    pub session: Option<Session>,
}

#[derive(Debug, Clone)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider understood the request and refused it (bad token, bad credentials, ...).
    #[error("Rejected by identity provider ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
    #[error("Unexpected identity provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        ProviderError::Rejected { status, message: message.into() }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_token(&self, access_token: &str) -> Result<Identity, ProviderError>;

    async fn sign_up(&self, request: SignUp) -> Result<AuthGrant, ProviderError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthGrant, ProviderError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError>;

    /// Revoke the session the access token belongs to.
    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError>;

    async fn update_password(&self, access_token: &str, password: &str) -> Result<(), ProviderError>;
}

/// Row of the `profiles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    pub role: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Default record for an identity that has none yet.
    pub fn default_for(identity: &Identity) -> Self {
        let now = Utc::now();
        Self {
            id: identity.id.clone(),
            email: Some(identity.email.clone()).filter(|e| !e.is_empty()),
            full_name: None,
            role: Role::User.to_string(),
            avatar_url: None,
            phone: None,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// User-editable profile fields. Role is deliberately absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.avatar_url.is_none() && self.phone.is_none()
    }

    pub fn apply(&self, profile: &mut Profile) {
        if let Some(v) = &self.full_name {
            profile.full_name = Some(v.clone());
        }
        if let Some(v) = &self.avatar_url {
            profile.avatar_url = Some(v.clone());
        }
        if let Some(v) = &self.phone {
            profile.phone = Some(v.clone());
        }
        profile.updated_at = Some(Utc::now());
    }

    /// Column/value pairs in the store's snake_case naming.
    pub fn to_columns(&self) -> Value {
        let mut columns = serde_json::Map::new();
        if let Some(v) = &self.full_name {
            columns.insert("full_name".into(), Value::String(v.clone()));
        }
        if let Some(v) = &self.avatar_url {
            columns.insert("avatar_url".into(), Value::String(v.clone()));
        }
        if let Some(v) = &self.phone {
            columns.insert("phone".into(), Value::String(v.clone()));
        }
        columns.insert("updated_at".into(), Value::String(Utc::now().to_rfc3339()));
        Value::Object(columns)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Store query failed: {0}")]
    Query(String),
    #[error("Unknown role '{0}'")]
    InvalidRole(String),
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `Ok(None)` means the row is absent; any other failure is an error.
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, StoreError>;

    async fn create_profile(&self, profile: Profile) -> Result<Profile, StoreError>;

    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<Profile, StoreError>;

    async fn set_role(&self, id: &str, role: Role) -> Result<Profile, StoreError>;

    /// All profiles, newest first.
    async fn list_profiles(&self) -> Result<Vec<Profile>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
