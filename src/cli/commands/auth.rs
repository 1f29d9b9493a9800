use clap::Subcommand;
use serde_json::{json, Map, Value};

use crate::cli::utils::{output_record, output_success, resolve_password};
use crate::cli::OutputFormat;
use crate::client::ApiClient;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Sign in with email and password")]
    Login {
        #[arg(help = "Email")]
        email: String,
        #[arg(long, help = "Password (will prompt if not provided)")]
        password: Option<String>,
    },

    #[command(about = "Sign out and discard the stored session")]
    Logout,

    #[command(about = "Show whether a session is stored")]
    Status,

    #[command(about = "Exchange the stored refresh token for a new pair")]
    Refresh,

    #[command(about = "Show the identity and role the server resolves for you")]
    Whoami,

    #[command(about = "Register new user")]
    Register {
        #[arg(help = "Email")]
        email: String,
        #[arg(long, help = "Full name")]
        full_name: Option<String>,
        #[arg(long, help = "Password (will prompt if not provided)")]
        password: Option<String>,
    },

    #[command(about = "Show or update your profile")]
    Profile {
        #[arg(long, help = "New full name")]
        full_name: Option<String>,
        #[arg(long, help = "New avatar URL")]
        avatar_url: Option<String>,
        #[arg(long, help = "New phone number")]
        phone: Option<String>,
    },

    #[command(about = "Email a password reset link")]
    ForgotPassword {
        #[arg(help = "Email")]
        email: String,
    },
}

pub async fn handle(cmd: AuthCommands, client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        AuthCommands::Login { email, password } => {
            let password = resolve_password(password)?;
            let body = client.sign_in(&email, &password).await?;
            output_success(
                &output_format,
                &format!("Signed in as {}", email),
                Some(json!({ "user": body["user"] })),
            )
        }
        AuthCommands::Logout => {
            if let Err(e) = client.sign_out().await {
                tracing::warn!("Server-side sign out failed: {}", e);
            }
            output_success(&output_format, "Signed out", None)
        }
        AuthCommands::Status => {
            let signed_in = client.session()?.is_some();
            let message = if signed_in { "Session stored" } else { "Not signed in" };
            output_success(&output_format, message, Some(json!({ "signed_in": signed_in })))
        }
        AuthCommands::Refresh => {
            let session = client.refresh().await?;
            output_success(
                &output_format,
                "Token refreshed",
                Some(json!({ "expires_in": session.expires_in })),
            )
        }
        AuthCommands::Whoami => {
            let body = client.get("auth/whoami").await?;
            output_record(&output_format, &body["user"])
        }
        AuthCommands::Register { email, full_name, password } => {
            let password = resolve_password(password)?;
            let body = client.sign_up(&email, &password, full_name.as_deref()).await?;
            let message = if body["session"].is_null() {
                format!("Registered {}, confirm the email before signing in", email)
            } else {
                format!("Registered and signed in as {}", email)
            };
            output_success(&output_format, &message, Some(json!({ "user": body["user"] })))
        }
        AuthCommands::Profile { full_name, avatar_url, phone } => {
            let mut changes = Map::new();
            for (key, value) in [("fullName", full_name), ("avatarUrl", avatar_url), ("phone", phone)] {
                if let Some(value) = value {
                    changes.insert(key.to_string(), Value::String(value));
                }
            }

            let body = if changes.is_empty() {
                client.get("auth/profile").await?
            } else {
                client.put("auth/profile", Value::Object(changes)).await?
            };
            output_record(&output_format, &body["profile"])
        }
        AuthCommands::ForgotPassword { email } => {
            client.post("auth/forgot-password", json!({ "email": email })).await?;
            output_success(&output_format, &format!("Password reset email sent to {}", email), None)
        }
    }
}
