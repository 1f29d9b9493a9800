use clap::Subcommand;
use serde_json::{json, Value};

use crate::cli::config::{load_cli_config, ping_server, save_cli_config, ServerStatus};
use crate::cli::utils::{output_error, output_record, output_success};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum ServerCommands {
    #[command(about = "Point the CLI at an API root (e.g. https://api.example.com/api/v1)")]
    Use {
        #[arg(help = "API root URL")]
        url: String,
        #[arg(long, help = "Server enforces CSRF tokens on state-changing requests")]
        csrf: bool,
    },

    #[command(about = "Show the configured server")]
    Current,

    #[command(about = "Health check the configured server")]
    Ping,

    #[command(about = "Show server information from the root endpoint")]
    Info,
}

pub async fn handle(cmd: ServerCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ServerCommands::Use { url, csrf } => {
            url::Url::parse(&url).map_err(|e| anyhow::anyhow!("Invalid server URL '{}': {}", url, e))?;

            let mut config = load_cli_config()?;
            config.set_server(url, csrf);
            save_cli_config(&config)?;

            output_success(
                &output_format,
                &format!("Using server {}", config.server_url),
                Some(json!({ "server_url": config.server_url, "csrf": config.csrf })),
            )
        }
        ServerCommands::Current => {
            let config = load_cli_config()?;
            output_record(&output_format, &serde_json::to_value(&config)?)
        }
        ServerCommands::Ping => {
            let mut config = load_cli_config()?;
            let status = ping_server(&config).await;
            config.update_ping(status);
            save_cli_config(&config)?;

            match status {
                ServerStatus::Up => output_success(
                    &output_format,
                    &format!("{} is up", config.server_url),
                    Some(json!({ "status": status })),
                ),
                _ => output_error(
                    &output_format,
                    &format!("{} is not responding", config.server_url),
                    Some("SERVER_DOWN"),
                ),
            }
        }
        ServerCommands::Info => {
            let config = load_cli_config()?;
            let info: Value = reqwest::get(config.server_root()?).await?.json().await?;
            output_record(&output_format, &info)
        }
    }
}
