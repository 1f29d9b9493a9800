#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use tokio::net::TcpListener;

use urecover_api::app::{app, AppState};
use urecover_api::config::AppConfig;
use urecover_api::provider::{Identity, MemoryIdentityProvider, MemoryProfileStore, Session};

pub struct TestServer {
    pub port: u16,
    /// Host root, where `/` and `/health` live.
    pub base_url: String,
    /// API root including the version prefix.
    pub api_url: String,
    pub provider: Arc<MemoryIdentityProvider>,
    pub profiles: Arc<MemoryProfileStore>,
    pub http: Client,
}

pub fn test_config() -> Result<AppConfig> {
    Ok(AppConfig::from_lookup(|key| match key {
        "SUPABASE_URL" => Some("http://127.0.0.1:9".to_string()),
        "SUPABASE_SERVICE_ROLE_KEY" => Some("test-service-key".to_string()),
        _ => None,
    })?)
}

/// Serve the full router in-process on a free port, backed by the memory provider and store.
pub async fn spawn_server() -> Result<TestServer> {
    spawn_server_with(|_| {}).await
}

pub async fn spawn_server_with(configure: impl FnOnce(&mut AppConfig)) -> Result<TestServer> {
    let mut config = test_config()?;
    configure(&mut config);
    let api_prefix = config.api_prefix();

    let provider = Arc::new(MemoryIdentityProvider::new());
    let profiles = Arc::new(MemoryProfileStore::new());
    let state = AppState::new(config, provider.clone(), profiles.clone());

    // Pick an unused port for isolation
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .context("failed to bind test listener")?;

    let router = app(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await {
            eprintln!("test server stopped: {e}");
        }
    });

    let base_url = format!("http://127.0.0.1:{}", port);
    Ok(TestServer {
        port,
        api_url: format!("{}{}", base_url, api_prefix),
        base_url,
        provider,
        profiles,
        http: Client::new(),
    })
}

impl TestServer {
    pub fn api(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.http.get(self.api(path))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.http.post(self.api(path))
    }

    pub fn put(&self, path: &str) -> RequestBuilder {
        self.http.put(self.api(path))
    }

    /// Register a user, optionally with a stored role, and issue a token pair.
    pub fn user(&self, email: &str, role: Option<&str>) -> (Identity, Session) {
        let identity = self.provider.add_user(email, "password123");
        if let Some(role) = role {
            self.profiles.insert_with_role(&identity, role);
        }
        let session = self.provider.issue_session(&identity.id);
        (identity, session)
    }
}
