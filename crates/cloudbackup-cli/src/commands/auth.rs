//! Auth commands - Login, Logout, and Status for OneDrive authentication
//!
//! Provides the `cloud-backup auth` CLI subcommands which:
//! 1. `login`  - Runs the OAuth2 PKCE flow and caches the tokens on disk.
//! 2. `logout` - Deletes the cached tokens.
//! 3. `status` - Shows whether cached tokens exist and when they expire.

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use cloudbackup_core::config::Config;
use cloudbackup_core::ports::Tokens;
use cloudbackup_graph::client::GraphClient;

use crate::output::{get_formatter, human_bytes, OutputFormat, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Authenticate with OneDrive via OAuth2
    Login {
        /// Azure application (client) ID, overriding auth.app_id
        #[arg(long)]
        app_id: Option<String>,
    },
    /// Remove cached credentials
    Logout,
    /// Check authentication status
    Status,
}

impl AuthCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        match self {
            AuthCommand::Login { app_id } => {
                let mut config = config.clone();
                if let Some(id) = app_id {
                    config.auth.app_id = Some(id.clone());
                }
                execute_login(&config, &*fmt, format).await
            }
            AuthCommand::Logout => execute_logout(config, &*fmt, format),
            AuthCommand::Status => execute_status(config, &*fmt, format),
        }
    }
}

async fn execute_login(
    config: &Config,
    fmt: &dyn OutputFormatter,
    format: OutputFormat,
) -> Result<()> {
    let adapter = super::auth_adapter(config)
        .context("No app_id provided. Use --app-id or set auth.app_id in config.yaml")?;

    fmt.info("Opening browser for Microsoft login...");
    let tokens = adapter.login_and_store().await.context("OAuth2 login failed")?;
    info!(cache = %adapter.cache().path().display(), "Tokens cached");

    fmt.info("Retrieving account information...");
    let client = GraphClient::with_base_url(
        tokens.access_token.as_str(),
        config.remote.base_url.as_str(),
    )
    .with_max_retries(config.remote.max_retries);
    let drive = client
        .get_drive_info()
        .await
        .context("Failed to read drive information")?;

    if format == OutputFormat::Json {
        fmt.print_json(&serde_json::json!({
            "authenticated": true,
            "owner": drive.owner,
            "expires_at": tokens.expires_at.to_rfc3339(),
        }));
    } else {
        fmt.success(&format!("Authenticated as {}", drive.owner));
        fmt.info(&format!(
            "Storage: {} used / {} total",
            human_bytes(drive.used),
            human_bytes(drive.total)
        ));
    }
    Ok(())
}

fn execute_logout(config: &Config, fmt: &dyn OutputFormatter, format: OutputFormat) -> Result<()> {
    let adapter = super::auth_adapter(config)?;
    let removed = adapter.logout().context("Failed to remove cached tokens")?;

    if format == OutputFormat::Json {
        fmt.print_json(&serde_json::json!({ "logged_out": removed }));
    } else if removed {
        fmt.success("Logged out successfully");
        fmt.info(&format!("Removed {}", adapter.cache().path().display()));
    } else {
        fmt.info("No cached credentials. Nothing to log out.");
    }
    Ok(())
}

fn execute_status(config: &Config, fmt: &dyn OutputFormatter, format: OutputFormat) -> Result<()> {
    if config.auth.app_id.is_none() {
        fmt.info("Authentication status: Not configured");
        fmt.info("Set auth.app_id in config.yaml, then run 'cloud-backup auth login'");
        return Ok(());
    }

    let adapter = super::auth_adapter(config)?;
    let tokens = adapter.cached_tokens()?;
    let state = token_state(tokens.as_ref());

    if format == OutputFormat::Json {
        fmt.print_json(&serde_json::json!({
            "authenticated": tokens.is_some(),
            "token_status": state,
            "expires_at": tokens.as_ref().map(|t| t.expires_at.to_rfc3339()),
            "cache": adapter.cache().path().display().to_string(),
        }));
        return Ok(());
    }

    match tokens {
        Some(tokens) => {
            fmt.success("Authenticated");
            fmt.info(&format!("Token status: {state}"));
            fmt.info(&format!(
                "Expires:      {}",
                tokens.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
        None => {
            fmt.info("Authentication status: Not logged in");
            fmt.info("Run 'cloud-backup auth login' to authenticate");
        }
    }
    fmt.info(&format!("Token cache:  {}", adapter.cache().path().display()));
    Ok(())
}

/// Describes cached tokens for display
fn token_state(tokens: Option<&Tokens>) -> &'static str {
    match tokens {
        None => "Not found",
        Some(t) if !t.is_expired() => "Valid",
        Some(t) if t.can_refresh() => "Expired (refreshable)",
        Some(_) => "Expired",
    }
}
