//! HTTP client for the API that attaches the stored access token to every
//! request and, on a 401, performs at most one refresh-and-retry cycle.
//!
//! Refresh is single-flight: concurrent 401s queue on one lock, and a waiter
//! that finds the stored access token already replaced retries with it
//! instead of exchanging the refresh token again. Progress is published as a
//! [`RefreshState`]; [`RefreshState::Failed`] means the stored pair has been
//! discarded and the user must sign in again.
//!
//! Against a server with CSRF protection, build the client
//! [`with_csrf`](ApiClient::with_csrf). The CSRF token is bound to the access
//! token, so it is fetched lazily per access token and fetched again after a
//! refresh.

pub mod session;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::{Method, Response};
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use url::Url;

use crate::middleware::csrf::{is_state_changing, CSRF_HEADER};
use crate::provider::Session;

pub use session::{FileSessionStore, MemorySessionStore, SessionError, SessionStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CSRF_TOKEN_PATH: &str = "auth/csrf-token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retry,
}

/// One logical request. Resubmission produces a new descriptor marked
/// [`Attempt::Retry`] rather than mutating the original.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub attempt: Attempt,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            attempt: Attempt::First,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn retried(&self) -> Self {
        Self {
            attempt: Attempt::Retry,
            ..self.clone()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Non-2xx answer from the API, carrying its `error` and `message` fields.
    #[error("{error} ({status}): {message}")]
    Api {
        status: u16,
        error: String,
        message: String,
    },
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Not signed in")]
    NotSignedIn,
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// CSRF token issued for one access token.
#[derive(Debug, Clone)]
struct CsrfBinding {
    access_token: String,
    csrf_token: String,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    sessions: Arc<dyn SessionStore>,
    refresh_lock: Mutex<()>,
    state: watch::Sender<RefreshState>,
    /// `None` when the client does not send CSRF tokens.
    csrf: Option<RwLock<Option<CsrfBinding>>>,
}

impl ApiClient {
    /// `base_url` is the API root including the version prefix,
    /// e.g. `http://localhost:3001/api/v1`.
    pub fn new(base_url: &str, sessions: Arc<dyn SessionStore>) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let (state, _) = watch::channel(RefreshState::Idle);

        Ok(Self {
            http,
            base_url,
            sessions,
            refresh_lock: Mutex::new(()),
            state,
            csrf: None,
        })
    }

    /// Attach `x-csrf-token` to state-changing requests, fetching it from
    /// `auth/csrf-token` for the access token in use.
    pub fn with_csrf(mut self) -> Self {
        self.csrf = Some(RwLock::new(None));
        self
    }

    pub fn refresh_state(&self) -> RefreshState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RefreshState> {
        self.state.subscribe()
    }

    pub fn session(&self) -> Result<Option<Session>, ClientError> {
        Ok(self.sessions.load()?)
    }

    /// Send with the stored bearer token. A first attempt rejected with 401
    /// gets one refresh and one resubmission; a retry is never refreshed again.
    pub async fn send(&self, request: RequestDescriptor) -> Result<Value, ClientError> {
        let token = self.sessions.load()?.map(|s| s.access_token);

        match self.submit(&request, token.as_deref()).await {
            Err(err) if err.is_unauthorized() && request.attempt == Attempt::First => {
                let fresh = self.refresh_after(token.as_deref(), err).await?;
                self.submit(&request.retried(), Some(&fresh)).await
            }
            other => other,
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.send(RequestDescriptor::new(Method::GET, path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.send(RequestDescriptor::new(Method::POST, path).with_body(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.send(RequestDescriptor::new(Method::PUT, path).with_body(body)).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Value, ClientError> {
        let request = RequestDescriptor::new(Method::POST, "auth/signin")
            .with_body(json!({ "email": email, "password": password }));
        let body = self.dispatch(&request, None, None).await?;

        let session = session_from_body(&body)?
            .ok_or_else(|| ClientError::InvalidResponse("sign-in returned no session".into()))?;
        self.store(&session)?;
        Ok(body)
    }

    /// Register; the pair is stored only when the server issued one.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<Value, ClientError> {
        let request = RequestDescriptor::new(Method::POST, "auth/signup")
            .with_body(json!({ "email": email, "password": password, "fullName": full_name }));
        let body = self.dispatch(&request, None, None).await?;

        if let Some(session) = session_from_body(&body)? {
            self.store(&session)?;
        }
        Ok(body)
    }

    /// Revoke the session server-side. The local pair is cleared whatever the outcome.
    pub async fn sign_out(&self) -> Result<(), ClientError> {
        let token = self.sessions.load()?.map(|s| s.access_token);
        let result = match token.as_deref() {
            Some(token) => self
                .submit(&RequestDescriptor::new(Method::POST, "auth/signout"), Some(token))
                .await
                .map(|_| ()),
            None => Ok(()),
        };

        self.sessions.clear()?;
        self.state.send_replace(RefreshState::Idle);
        result
    }

    /// Exchange the stored refresh token now, outside of any failed request.
    pub async fn refresh(&self) -> Result<Session, ClientError> {
        let _guard = self.refresh_lock.lock().await;

        let refresh_token = self
            .sessions
            .load()?
            .map(|s| s.refresh_token)
            .filter(|t| !t.is_empty());
        match refresh_token {
            Some(token) => self.exchange_and_store(&token).await,
            None => {
                self.state.send_replace(RefreshState::Failed);
                Err(ClientError::NotSignedIn)
            }
        }
    }

    /// Refresh cycle for a request that got 401 while presenting `stale`.
    /// Returns the access token to retry with, or `original` when the
    /// session cannot be refreshed.
    async fn refresh_after(&self, stale: Option<&str>, original: ClientError) -> Result<String, ClientError> {
        let _guard = self.refresh_lock.lock().await;

        let stored = self.sessions.load()?;
        if let Some(session) = &stored {
            if stale != Some(session.access_token.as_str()) {
                tracing::debug!("Access token already replaced, retrying without a new exchange");
                return Ok(session.access_token.clone());
            }
        }

        let refresh_token = stored.map(|s| s.refresh_token).filter(|t| !t.is_empty());
        let Some(refresh_token) = refresh_token else {
            tracing::warn!("Got 401 without a stored refresh token, sign-in required");
            self.state.send_replace(RefreshState::Failed);
            return Err(original);
        };

        match self.exchange_and_store(&refresh_token).await {
            Ok(session) => Ok(session.access_token),
            Err(ClientError::Session(e)) => Err(ClientError::Session(e)),
            Err(_) => Err(original),
        }
    }

    /// Exchange and persist. On failure the stored pair is discarded and the
    /// state moves to `Failed`.
    async fn exchange_and_store(&self, refresh_token: &str) -> Result<Session, ClientError> {
        self.state.send_replace(RefreshState::Refreshing);

        let exchanged = match self.exchange(refresh_token).await {
            Ok(session) => self.sessions.save(&session).map(|()| session).map_err(ClientError::from),
            Err(e) => Err(e),
        };

        match exchanged {
            Ok(session) => {
                tracing::debug!("Session refreshed");
                self.state.send_replace(RefreshState::Idle);
                Ok(session)
            }
            Err(e) => {
                tracing::warn!("Session refresh failed, discarding stored tokens: {}", e);
                if let Err(clear_err) = self.sessions.clear() {
                    tracing::error!("Failed to clear stored session: {}", clear_err);
                }
                self.state.send_replace(RefreshState::Failed);
                Err(e)
            }
        }
    }

    async fn exchange(&self, refresh_token: &str) -> Result<Session, ClientError> {
        let request = RequestDescriptor::new(Method::POST, "auth/refresh")
            .with_body(json!({ "refreshToken": refresh_token }));
        let body = self.dispatch(&request, None, None).await?;

        session_from_body(&body)?
            .ok_or_else(|| ClientError::InvalidResponse("refresh returned no session".into()))
    }

    fn store(&self, session: &Session) -> Result<(), ClientError> {
        self.sessions.save(session)?;
        self.state.send_replace(RefreshState::Idle);
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Dispatch with the bearer token, adding the CSRF token when the
    /// request changes state and the client is CSRF-aware.
    async fn submit(&self, request: &RequestDescriptor, token: Option<&str>) -> Result<Value, ClientError> {
        let csrf = match token {
            Some(bearer) if is_state_changing(&request.method) => self.csrf_token_for(bearer).await?,
            _ => None,
        };
        self.dispatch(request, token, csrf.as_deref()).await
    }

    async fn csrf_token_for(&self, access_token: &str) -> Result<Option<String>, ClientError> {
        let Some(cache) = &self.csrf else {
            return Ok(None);
        };

        let cached = cache
            .read()
            .ok()
            .and_then(|binding| binding.clone())
            .filter(|binding| binding.access_token == access_token);
        if let Some(binding) = cached {
            return Ok(Some(binding.csrf_token));
        }

        let request = RequestDescriptor::new(Method::GET, CSRF_TOKEN_PATH);
        let body = self.dispatch(&request, Some(access_token), None).await?;
        let csrf_token = body
            .get("csrfToken")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::InvalidResponse("csrf-token returned no csrfToken".into()))?
            .to_string();

        if let Ok(mut binding) = cache.write() {
            *binding = Some(CsrfBinding {
                access_token: access_token.to_string(),
                csrf_token: csrf_token.clone(),
            });
        }
        Ok(Some(csrf_token))
    }

    async fn dispatch(
        &self,
        request: &RequestDescriptor,
        token: Option<&str>,
        csrf: Option<&str>,
    ) -> Result<Value, ClientError> {
        let mut builder = self.http.request(request.method.clone(), self.url(&request.path)?);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(csrf) = csrf {
            builder = builder.header(CSRF_HEADER, csrf);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %request.method, path = %request.path, attempt = ?request.attempt, "Sending request");
        parse_response(builder.send().await?).await
    }
}

async fn parse_response(response: Response) -> Result<Value, ClientError> {
    let status = response.status();
    let text = response.text().await?;
    let body: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };

    if status.is_success() {
        return Ok(body);
    }

    let field = |name: &str| body.get(name).and_then(Value::as_str).map(str::to_string);
    Err(ClientError::Api {
        status: status.as_u16(),
        error: field("error").unwrap_or_else(|| status.canonical_reason().unwrap_or("Error").to_string()),
        message: field("message").unwrap_or_else(|| status.to_string()),
    })
}

/// Token pair from either a nested `session` object or a flat body.
fn session_from_body(body: &Value) -> Result<Option<Session>, ClientError> {
    let candidate = match body.get("session") {
        Some(Value::Null) => return Ok(None),
        Some(session) => session,
        None => body,
    };
    serde_json::from_value(candidate.clone())
        .map(Some)
        .map_err(|e| ClientError::InvalidResponse(format!("malformed session: {}", e)))
}
