//! Status command - Preview a backup
//!
//! Provides the `cloud-backup status` CLI command which reconciles a local
//! folder against a remote folder and prints the resulting worklist without
//! uploading anything. The remote folder is created if it is missing.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use cloudbackup_core::config::Config;
use cloudbackup_core::domain::Worklist;

use super::sync::{local_folder, marker};
use crate::output::{get_formatter, plural, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Local folder to compare
    #[arg(long)]
    pub local: PathBuf,

    /// Remote folder to compare against
    #[arg(long)]
    pub remote: String,
}

impl StatusCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format == OutputFormat::Json);
        let local = local_folder(&self.local)?;

        let client = super::connect(config).await?;
        let worklist = super::reconciler(client)
            .reconcile(local, &self.remote)
            .await?;
        info!(total = worklist.len(), "Worklist computed");

        if format == OutputFormat::Json {
            formatter.print_json(&serde_json::json!({
                "local": local,
                "remote": self.remote,
                "files": worklist,
            }));
        } else {
            print_worklist(&*formatter, &worklist);
        }
        Ok(())
    }
}

fn print_worklist(formatter: &dyn OutputFormatter, worklist: &Worklist) {
    for decision in worklist {
        formatter.file_line(marker(decision.status), decision.filename());
    }

    let pending = worklist.iter().filter(|d| d.status.needs_upload()).count();
    if pending == 0 {
        formatter.success(&format!(
            "Remote folder is up to date ({})",
            plural(worklist.len(), "file")
        ));
    } else {
        formatter.success(&format!(
            "{} to upload, {} already backed up",
            plural(pending, "file"),
            plural(worklist.len() - pending, "file")
        ));
    }
}
