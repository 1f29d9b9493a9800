use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use url::Url;

use super::supabase::{error_message, normalized_base};
use super::{Profile, ProfileStore, ProfileUpdate, StoreError};
use crate::auth::Role;
use crate::config::SupabaseConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const PROFILE_COLUMNS: &str = "id,email,full_name,role,avatar_url,phone,created_at,updated_at";

/// `profiles` rows through PostgREST, authenticated with the service role key
/// (bypasses row-level security, so only server-side code may hold it).
pub struct PostgrestProfileStore {
    http: Client,
    profiles_url: Url,
    service_key: String,
}

impl PostgrestProfileStore {
    pub fn new(config: &SupabaseConfig) -> Result<Self, StoreError> {
        let base = normalized_base(&config.url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let profiles_url = base
            .join("rest/v1/profiles")
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            profiles_url,
            service_key: config.service_role_key.clone(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Accept", "application/json")
    }

    fn url_for_id(&self, id: &str) -> Url {
        let mut url = self.profiles_url.clone();
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", id))
            .append_pair("select", PROFILE_COLUMNS);
        url
    }

    async fn rows(response: Response) -> Result<Vec<Profile>, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = error_message(&body).unwrap_or_else(|| status.to_string());
            return Err(if status.is_server_error() {
                StoreError::Unavailable(message)
            } else {
                StoreError::Query(message)
            });
        }
        response
            .json::<Vec<Profile>>()
            .await
            .map_err(|e| StoreError::Query(format!("unexpected profile payload: {}", e)))
    }

    async fn single(response: Response, id: &str) -> Result<Profile, StoreError> {
        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("Profile {}", id)))
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

#[async_trait]
impl ProfileStore for PostgrestProfileStore {
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        let response = self
            .authorized(self.http.get(self.url_for_id(id)))
            .send()
            .await
            .map_err(transport)?;

        Ok(Self::rows(response).await?.into_iter().next())
    }

    async fn create_profile(&self, profile: Profile) -> Result<Profile, StoreError> {
        let mut url = self.profiles_url.clone();
        url.query_pairs_mut()
            .append_pair("on_conflict", "id")
            .append_pair("select", PROFILE_COLUMNS);

        // ignore-duplicates keeps an existing row (and its role) intact
        let response = self
            .authorized(self.http.post(url))
            .header("Prefer", "return=representation,resolution=ignore-duplicates")
            .json(&profile)
            .send()
            .await
            .map_err(transport)?;

        let id = profile.id.clone();
        match Self::rows(response).await?.into_iter().next() {
            Some(created) => Ok(created),
            // Nothing returned means the row already existed
            None => self
                .get_profile(&id)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("Profile {}", id))),
        }
    }

    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<Profile, StoreError> {
        let response = self
            .authorized(self.http.patch(self.url_for_id(id)))
            .header("Prefer", "return=representation")
            .json(&update.to_columns())
            .send()
            .await
            .map_err(transport)?;

        Self::single(response, id).await
    }

    async fn set_role(&self, id: &str, role: Role) -> Result<Profile, StoreError> {
        let response = self
            .authorized(self.http.patch(self.url_for_id(id)))
            .header("Prefer", "return=representation")
            .json(&json!({ "role": role.as_str(), "updated_at": chrono::Utc::now().to_rfc3339() }))
            .send()
            .await
            .map_err(transport)?;

        Self::single(response, id).await
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        let mut url = self.profiles_url.clone();
        url.query_pairs_mut()
            .append_pair("select", PROFILE_COLUMNS)
            .append_pair("order", "created_at.desc");

        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(transport)?;

        Self::rows(response).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let mut url = self.profiles_url.clone();
        url.query_pairs_mut().append_pair("select", "id").append_pair("limit", "1");

        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(transport)?;

        Self::rows(response).await.map(|_| ())
    }
}
