use clap::Subcommand;
use serde_json::{json, Value};

use crate::auth::Role;
use crate::cli::utils::{output_list, output_record, output_success};
use crate::cli::OutputFormat;
use crate::client::ApiClient;

#[derive(Subcommand)]
pub enum AdminCommands {
    #[command(about = "List users, newest first (admin, manager)")]
    Users,

    #[command(about = "Show one user (admin, manager)")]
    User {
        #[arg(help = "User id")]
        id: String,
    },

    #[command(about = "Change a user's role (admin)")]
    SetRole {
        #[arg(help = "User id")]
        id: String,
        #[arg(help = "user, counsellor, manager or admin")]
        role: String,
    },
}

pub async fn handle(cmd: AdminCommands, client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        AdminCommands::Users => {
            let body = client.get("admin/users").await?;
            let users = body["data"].as_array().cloned().unwrap_or_default();
            output_list(&output_format, &users, &["id", "email", "role"], "No users found")
        }
        AdminCommands::User { id } => {
            let body = client.get(&format!("admin/users/{}", id)).await?;
            output_record(&output_format, &body["data"])
        }
        AdminCommands::SetRole { id, role } => {
            // Fail fast locally; the server validates again
            let role: Role = role.parse()?;
            let body: Value = client
                .put(&format!("admin/users/{}/role", id), json!({ "role": role }))
                .await?;
            output_success(
                &output_format,
                &format!("User {} is now {}", id, role),
                Some(json!({ "user": body["data"] })),
            )
        }
    }
}
