use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3001/api/v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// API root including the version prefix.
    pub server_url: String,
    /// Send `x-csrf-token` on state-changing requests.
    #[serde(default)]
    pub csrf: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_ping: Option<DateTime<Utc>>,
    pub status: ServerStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Up,
    Down,
    Unknown,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            csrf: false,
            updated_at: None,
            last_ping: None,
            status: ServerStatus::Unknown,
        }
    }
}

impl CliConfig {
    pub fn set_server(&mut self, url: String, csrf: bool) {
        self.server_url = url.trim_end_matches('/').to_string();
        self.csrf = csrf;
        self.updated_at = Some(Utc::now());
        self.last_ping = None;
        self.status = ServerStatus::Unknown;
    }

    pub fn update_ping(&mut self, status: ServerStatus) {
        self.last_ping = Some(Utc::now());
        self.status = status;
    }

    /// Host root of the configured server, where `/` and `/health` live.
    pub fn server_root(&self) -> anyhow::Result<url::Url> {
        let mut url = url::Url::parse(&self.server_url)?;
        url.set_path("/");
        url.set_query(None);
        Ok(url)
    }
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    let config_dir = if let Ok(custom_dir) = std::env::var("URECOVER_CLI_CONFIG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
        PathBuf::from(home).join(".config").join("urecover").join("cli")
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn session_path() -> anyhow::Result<PathBuf> {
    Ok(get_config_dir()?.join("session.json"))
}

pub fn load_cli_config() -> anyhow::Result<CliConfig> {
    let cli_file = get_config_dir()?.join("cli.json");

    if !cli_file.exists() {
        return Ok(CliConfig::default());
    }

    let content = fs::read_to_string(cli_file)?;
    let config: CliConfig = serde_json::from_str(&content)?;
    Ok(config)
}

pub fn save_cli_config(config: &CliConfig) -> anyhow::Result<()> {
    let cli_file = get_config_dir()?.join("cli.json");

    let content = serde_json::to_string_pretty(config)?;
    fs::write(cli_file, content)?;
    Ok(())
}

pub async fn ping_server(config: &CliConfig) -> ServerStatus {
    let url = match config.server_root().and_then(|root| Ok(root.join("health")?)) {
        Ok(url) => url,
        Err(_) => return ServerStatus::Unknown,
    };

    match reqwest::Client::new()
        .get(url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => ServerStatus::Up,
        _ => ServerStatus::Down,
    }
}
