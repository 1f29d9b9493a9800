//! In-process identity provider and profile store. Used by the test suites and
//! for running the router without a hosted backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{AuthGrant, Identity, IdentityProvider, Profile, ProfileStore, ProfileUpdate, ProviderError, Session, SignUp, StoreError};
use crate::auth::Role;

#[derive(Debug, Clone)]
struct MemoryUser {
    identity: Identity,
    password: String,
}

#[derive(Debug, Default)]
struct AuthState {
    // keyed by email
    users: HashMap<String, MemoryUser>,
    // token -> user id
    access_tokens: HashMap<String, String>,
    refresh_tokens: HashMap<String, String>,
    password_resets: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryIdentityProvider {
    state: RwLock<AuthState>,
    verify_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    unavailable: AtomicBool,
    rejecting: AtomicBool,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, AuthState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AuthState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), ProviderError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable("memory provider switched off".into()));
        }
        Ok(())
    }

    /// Register a user and return its identity.
    pub fn add_user(&self, email: &str, password: &str) -> Identity {
        let identity = Identity {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
        };
        self.write().users.insert(
            email.to_string(),
            MemoryUser {
                identity: identity.clone(),
                password: password.to_string(),
            },
        );
        identity
    }

    /// Issue a fresh token pair for an existing user id.
    pub fn issue_session(&self, user_id: &str) -> Session {
        let session = Session {
            access_token: format!("at-{}", Uuid::new_v4().simple()),
            refresh_token: format!("rt-{}", Uuid::new_v4().simple()),
            expires_in: Some(3600),
            token_type: Some("bearer".to_string()),
        };
        let mut state = self.write();
        state.access_tokens.insert(session.access_token.clone(), user_id.to_string());
        state.refresh_tokens.insert(session.refresh_token.clone(), user_id.to_string());
        session
    }

    /// Make an access token fail verification from now on.
    pub fn expire_access_token(&self, token: &str) {
        self.write().access_tokens.remove(token);
    }

    pub fn revoke_refresh_token(&self, token: &str) {
        self.write().refresh_tokens.remove(token);
    }

    /// While set, every access token fails verification, including freshly refreshed ones.
    pub fn reject_all_access_tokens(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn password_resets(&self) -> Vec<String> {
        self.read().password_resets.clone()
    }

    pub fn is_refresh_token_valid(&self, token: &str) -> bool {
        self.read().refresh_tokens.contains_key(token)
    }

    fn identity_by_id(&self, id: &str) -> Option<Identity> {
        self.read()
            .users
            .values()
            .find(|u| u.identity.id == id)
            .map(|u| u.identity.clone())
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn verify_token(&self, access_token: &str) -> Result<Identity, ProviderError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(ProviderError::rejected(401, "invalid JWT: token is expired"));
        }

        let user_id = self
            .read()
            .access_tokens
            .get(access_token)
            .cloned()
            .ok_or_else(|| ProviderError::rejected(401, "invalid JWT: token is expired"))?;

        self.identity_by_id(&user_id)
            .ok_or_else(|| ProviderError::rejected(404, "User not found"))
    }

    async fn sign_up(&self, request: SignUp) -> Result<AuthGrant, ProviderError> {
        self.check_available()?;
        if self.read().users.contains_key(&request.email) {
            return Err(ProviderError::rejected(422, "User already registered"));
        }
        let identity = self.add_user(&request.email, &request.password);
        let session = self.issue_session(&identity.id);
        Ok(AuthGrant {
            user: identity,
            session: Some(session),
        })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthGrant, ProviderError> {
        self.check_available()?;
        let user = self
            .read()
            .users
            .get(email)
            .cloned()
            .filter(|u| u.password == password)
            .ok_or_else(|| ProviderError::rejected(400, "Invalid login credentials"))?;

        let session = self.issue_session(&user.identity.id);
        Ok(AuthGrant {
            user: user.identity,
            session: Some(session),
        })
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        // Refresh tokens are single use
        let user_id = self
            .write()
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| ProviderError::rejected(400, "Invalid Refresh Token: Refresh Token Not Found"))?;

        Ok(self.issue_session(&user_id))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError> {
        self.check_available()?;
        let mut state = self.write();
        let user_id = state
            .access_tokens
            .remove(access_token)
            .ok_or_else(|| ProviderError::rejected(401, "invalid JWT"))?;
        state.refresh_tokens.retain(|_, owner| owner != &user_id);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        self.check_available()?;
        self.write().password_resets.push(email.to_string());
        Ok(())
    }

    async fn update_password(&self, access_token: &str, password: &str) -> Result<(), ProviderError> {
        self.check_available()?;
        let mut state = self.write();
        let user_id = state
            .access_tokens
            .get(access_token)
            .cloned()
            .ok_or_else(|| ProviderError::rejected(401, "invalid JWT"))?;
        let user = state
            .users
            .values_mut()
            .find(|u| u.identity.id == user_id)
            .ok_or_else(|| ProviderError::rejected(404, "User not found"))?;
        user.password = password.to_string();
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, Profile>>,
    get_calls: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Profile>> {
        self.profiles.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Profile>> {
        self.profiles.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }

    pub fn insert(&self, profile: Profile) {
        self.write().insert(profile.id.clone(), profile);
    }

    /// Insert a minimal profile carrying `role` for `identity`.
    pub fn insert_with_role(&self, identity: &Identity, role: &str) {
        let mut profile = Profile::default_for(identity);
        profile.role = role.to_string();
        self.insert(profile);
    }

    pub fn snapshot(&self, id: &str) -> Option<Profile> {
        self.read().get(id).cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.read().get(id).cloned())
    }

    async fn create_profile(&self, profile: Profile) -> Result<Profile, StoreError> {
        self.check_available()?;
        let mut profiles = self.write();
        // insert-or-ignore, so concurrent lazy creation settles on the first row
        let stored = profiles.entry(profile.id.clone()).or_insert(profile);
        Ok(stored.clone())
    }

    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<Profile, StoreError> {
        self.check_available()?;
        let mut profiles = self.write();
        let profile = profiles
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("Profile {}", id)))?;
        update.apply(profile);
        Ok(profile.clone())
    }

    async fn set_role(&self, id: &str, role: Role) -> Result<Profile, StoreError> {
        self.check_available()?;
        let mut profiles = self.write();
        let profile = profiles
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("Profile {}", id)))?;
        profile.role = role.to_string();
        profile.updated_at = Some(Utc::now());
        Ok(profile.clone())
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        self.check_available()?;
        let mut profiles: Vec<Profile> = self.read().values().cloned().collect();
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(profiles)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refresh_tokens_are_single_use() {
        let provider = MemoryIdentityProvider::new();
        let identity = provider.add_user("a@example.com", "pw");
        let session = provider.issue_session(&identity.id);

        let rotated = provider.refresh_session(&session.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, session.refresh_token);
        assert!(matches!(
            provider.refresh_session(&session.refresh_token).await,
            Err(ProviderError::Rejected { .. })
        ));
        assert_eq!(provider.refresh_calls(), 2);
    }

    #[tokio::test]
    async fn expired_access_token_is_rejected() {
        let provider = MemoryIdentityProvider::new();
        let identity = provider.add_user("a@example.com", "pw");
        let session = provider.issue_session(&identity.id);
        assert_eq!(provider.verify_token(&session.access_token).await.unwrap(), identity);

        provider.expire_access_token(&session.access_token);
        assert!(provider.verify_token(&session.access_token).await.is_err());
    }

    #[tokio::test]
    async fn create_profile_keeps_existing_row() {
        let store = MemoryProfileStore::new();
        let identity = Identity { id: "u1".into(), email: "u1@example.com".into() };
        store.insert_with_role(&identity, "admin");

        let created = store.create_profile(Profile::default_for(&identity)).await.unwrap();
        assert_eq!(created.role, "admin");
    }

    #[tokio::test]
    async fn failing_store_reports_unavailable() {
        let store = MemoryProfileStore::new();
        store.set_failing(true);
        assert!(matches!(store.get_profile("u1").await, Err(StoreError::Unavailable(_))));
    }
}
