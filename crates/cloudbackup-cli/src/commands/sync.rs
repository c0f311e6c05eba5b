//! Sync command - Back up a local folder to OneDrive
//!
//! Provides the `cloud-backup sync` CLI command which:
//! 1. Authenticates and prints the drive owner and quota
//! 2. Reconciles the local folder against the remote folder
//! 3. Uploads every file that is missing remotely, in name order
//! 4. Prints the per-file outcome and a summary
//!
//! The command stops at the first error and exits non-zero.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use cloudbackup_core::config::Config;
use cloudbackup_core::domain::SyncStatus;
use cloudbackup_graph::client::DriveInfo;
use cloudbackup_graph::upload::GraphUploader;
use cloudbackup_sync::{BackupReport, BackupRunner};

use crate::output::{
    get_formatter, human_bytes, human_duration, plural, OutputFormat, OutputFormatter,
};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Local folder to back up
    #[arg(long)]
    pub local: PathBuf,

    /// Destination folder on the drive, e.g. /Backups/photos
    #[arg(long)]
    pub remote: String,

    /// Show what would be uploaded without uploading
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format == OutputFormat::Json);
        let local = local_folder(&self.local)?;

        let client = super::connect(config).await?;
        let drive = client
            .get_drive_info()
            .await
            .context("Failed to read drive information")?;
        print_banner(&*formatter, &drive);

        let uploader = Arc::new(GraphUploader::from_config(client.clone(), config));
        let runner = BackupRunner::new(super::reconciler(client), uploader);

        info!(local, remote = %self.remote, dry_run = self.dry_run, "Starting backup");
        if self.dry_run {
            formatter.info("Dry run mode - nothing will be uploaded");
        }

        let report = runner.run(local, &self.remote, self.dry_run).await?;

        if format == OutputFormat::Json {
            formatter.print_json(&serde_json::json!({
                "local": local,
                "remote": self.remote,
                "drive": drive,
                "dry_run": report.dry_run,
                "uploaded": report.uploaded,
                "already_synced": report.already_synced,
                "pending": report.pending,
                "duration_ms": report.duration_ms,
                "files": report.worklist,
            }));
        } else {
            print_report(&*formatter, &report);
        }

        Ok(())
    }
}

/// Checks that `path` is a directory and returns it as UTF-8
pub(crate) fn local_folder(path: &std::path::Path) -> Result<&str> {
    if !path.is_dir() {
        anyhow::bail!("Local folder does not exist: {}", path.display());
    }
    path.to_str()
        .with_context(|| format!("Local path is not valid UTF-8: {}", path.display()))
}

fn print_banner(formatter: &dyn OutputFormatter, drive: &DriveInfo) {
    formatter.success(&format!("Connected to the drive of {}", drive.owner));
    formatter.info(&format!(
        "Storage: {} used / {} total ({} free)",
        human_bytes(drive.used),
        human_bytes(drive.total),
        human_bytes(drive.remaining)
    ));
}

/// Marker printed in front of each file name
pub(crate) fn marker(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::AlreadySynced => "unchanged",
        SyncStatus::NeedsSync => "pending",
        SyncStatus::Uploaded => "uploaded",
    }
}

fn print_report(formatter: &dyn OutputFormatter, report: &BackupReport) {
    for decision in &report.worklist {
        formatter.file_line(marker(decision.status), decision.filename());
    }

    if report.total() == 0 {
        formatter.success("Local folder is empty, nothing to back up");
        return;
    }

    if report.dry_run {
        formatter.success(&format!(
            "Dry run: {} to upload, {} already backed up",
            plural(report.pending, "file"),
            plural(report.already_synced, "file")
        ));
    } else if report.uploaded == 0 {
        formatter.success("Already up to date");
    } else {
        formatter.success(&format!(
            "Uploaded {} in {}",
            plural(report.uploaded, "file"),
            human_duration(report.duration_ms)
        ));
        formatter.info(&format!(
            "{} already backed up",
            plural(report.already_synced, "file")
        ));
    }
}
