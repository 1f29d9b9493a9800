pub mod commands;
pub mod config;
pub mod utils;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::client::{ApiClient, FileSessionStore, RefreshState};

#[derive(Parser)]
#[command(name = "urecover")]
#[command(about = "U-Recover CLI - sign in, manage your profile and administer users")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Remote server selection and health")]
    Server {
        #[command(subcommand)]
        cmd: commands::server::ServerCommands,
    },

    #[command(about = "Authentication, session and profile")]
    Auth {
        #[command(subcommand)]
        cmd: commands::auth::AuthCommands,
    },

    #[command(about = "User administration")]
    Admin {
        #[command(subcommand)]
        cmd: commands::admin::AdminCommands,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Client for the configured server, persisting its session under the CLI config dir.
pub fn api_client() -> anyhow::Result<ApiClient> {
    let config = config::load_cli_config()?;
    let sessions = Arc::new(FileSessionStore::new(config::session_path()?));
    let client = ApiClient::new(&config.server_url, sessions)?;
    Ok(if config.csrf { client.with_csrf() } else { client })
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    let client = api_client()?;

    let result = match cli.command {
        Commands::Server { cmd } => commands::server::handle(cmd, output_format.clone()).await,
        Commands::Auth { cmd } => commands::auth::handle(cmd, &client, output_format.clone()).await,
        Commands::Admin { cmd } => commands::admin::handle(cmd, &client, output_format.clone()).await,
    };

    if result.is_err() && client.refresh_state() == RefreshState::Failed {
        utils::output_error(
            &output_format,
            "Session expired. Sign in again with `urecover auth login <email>`",
            Some("REAUTH_REQUIRED"),
        )?;
    }

    result
}
