use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use super::{AuthGrant, Identity, IdentityProvider, ProviderError, Session, SignUp};
use crate::config::SupabaseConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// GoTrue (Supabase Auth) client. Tokens are opaque to this crate; every
/// verification is a round trip to `/auth/v1/user`.
pub struct SupabaseAuth {
    http: Client,
    base_url: Url,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    user: Option<Identity>,
}

impl From<TokenResponse> for Session {
    fn from(t: TokenResponse) -> Self {
        Session {
            access_token: t.access_token,
            refresh_token: t.refresh_token,
            expires_in: t.expires_in,
            token_type: t.token_type,
        }
    }
}

impl SupabaseAuth {
    pub fn new(config: &SupabaseConfig) -> Result<Self, ProviderError> {
        let base_url = normalized_base(&config.url)?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            // Auth endpoints accept the anon key; fall back to the service key.
            api_key: config
                .anon_key
                .clone()
                .unwrap_or_else(|| config.service_role_key.clone()),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::InvalidResponse(format!("bad endpoint {}: {}", path, e)))
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<TokenResponse, ProviderError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let response = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        parse_json(response).await
    }
}

pub(crate) fn normalized_base(raw: &str) -> Result<Url, ProviderError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&with_slash).map_err(|e| ProviderError::InvalidResponse(format!("invalid base URL {}: {}", raw, e)))
}

pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable(err.to_string())
}

/// Pull the human-readable part out of a GoTrue/PostgREST error body.
pub(crate) fn error_message(body: &Value) -> Option<String> {
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

async fn error_from_response(response: Response) -> ProviderError {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = error_message(&body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

    if status.is_server_error() {
        ProviderError::Unavailable(format!("{}: {}", status, message))
    } else {
        ProviderError::rejected(status.as_u16(), message)
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

async fn expect_success(response: Response) -> Result<(), ProviderError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(error_from_response(response).await)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    async fn verify_token(&self, access_token: &str) -> Result<Identity, ProviderError> {
        let response = self
            .http
            .get(self.endpoint("auth/v1/user")?)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        parse_json(response).await
    }

    async fn sign_up(&self, request: SignUp) -> Result<AuthGrant, ProviderError> {
        let response = self
            .http
            .post(self.endpoint("auth/v1/signup")?)
            .header("apikey", &self.api_key)
            .json(&json!({
                "email": request.email,
                "password": request.password,
                "data": { "full_name": request.full_name }
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let body: Value = parse_json(response).await?;

        // With email confirmation on, GoTrue answers with the bare user.
        if body.get("access_token").is_some() {
            let tokens: TokenResponse =
                serde_json::from_value(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
            let user = tokens
                .user
                .clone()
                .ok_or_else(|| ProviderError::InvalidResponse("signup session without user".into()))?;
            Ok(AuthGrant {
                user,
                session: Some(tokens.into()),
            })
        } else {
            let user: Identity =
                serde_json::from_value(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
            Ok(AuthGrant { user, session: None })
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthGrant, ProviderError> {
        let tokens = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        let user = tokens
            .user
            .clone()
            .ok_or_else(|| ProviderError::InvalidResponse("token response without user".into()))?;
        Ok(AuthGrant {
            user,
            session: Some(tokens.into()),
        })
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        let tokens = self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        Ok(tokens.into())
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError> {
        let response = self
            .http
            .post(self.endpoint("auth/v1/logout")?)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        // Already-revoked sessions count as signed out
        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        expect_success(response).await
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        let response = self
            .http
            .post(self.endpoint("auth/v1/recover")?)
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email }))
            .send()
            .await
            .map_err(transport_error)?;

        expect_success(response).await
    }

    async fn update_password(&self, access_token: &str, password: &str) -> Result<(), ProviderError> {
        let response = self
            .http
            .put(self.endpoint("auth/v1/user")?)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .json(&json!({ "password": password }))
            .send()
            .await
            .map_err(transport_error)?;

        expect_success(response).await
    }
}
