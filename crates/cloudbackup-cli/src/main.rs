//! cloud-backup CLI - One-way folder backup to OneDrive
//!
//! Provides commands for:
//! - Authentication with OneDrive
//! - Backing up a local folder
//! - Previewing what a backup would transfer
//! - Showing drive quota

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cloudbackup_core::config::Config;

mod commands;
mod output;

use commands::{
    auth::AuthCommand, quota::QuotaCommand, status::StatusCommand, sync::SyncCommand,
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(
    name = "cloud-backup",
    version,
    about = "Back up a local folder to OneDrive"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Authentication commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Upload every new file of a local folder
    Sync(SyncCommand),
    /// Show what a sync would do without uploading
    Status(StatusCommand),
    /// Show drive owner and storage quota
    Quota(QuotaCommand),
}

impl Cli {
    fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }

    fn load_config(&self) -> Result<Config> {
        let config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Config::load_or_default(&Config::default_path())?,
        };

        let problems = config.validate();
        if !problems.is_empty() {
            let joined = problems
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            anyhow::bail!("Invalid configuration: {joined}");
        }
        Ok(config)
    }
}

/// Picks the log filter: `RUST_LOG`, then `-v`, then the configured level
fn env_filter(verbose: u8, configured: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = match verbose {
        0 => configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let format = cli.format();
    match cli.command {
        Commands::Auth(cmd) => cmd.execute(&config, format).await,
        Commands::Sync(cmd) => cmd.execute(&config, format).await,
        Commands::Status(cmd) => cmd.execute(&config, format).await,
        Commands::Quota(cmd) => cmd.execute(&config, format).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let formatter = get_formatter(cli.json);

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(cli.verbose, &config.logging.level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
