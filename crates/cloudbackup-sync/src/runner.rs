//! Backup runner
//!
//! The [`BackupRunner`] drives one backup of a local folder: it asks the
//! [`Reconciler`] for a worklist, then uploads every `NeedsSync` entry in
//! worklist order. The first failed upload stops the run.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use cloudbackup_core::domain::{SyncStatus, Worklist};
use cloudbackup_core::ports::IUploader;

use crate::reconciler::Reconciler;
use crate::BackupError;

// ============================================================================
// BackupReport
// ============================================================================

/// Outcome of a completed backup run
#[derive(Debug, Clone)]
pub struct BackupReport {
    /// Final worklist; uploaded entries carry [`SyncStatus::Uploaded`]
    pub worklist: Worklist,
    /// Number of files transferred during this run
    pub uploaded: usize,
    /// Number of files that were already present remotely
    pub already_synced: usize,
    /// Number of files still needing a transfer (non-zero only for dry runs)
    pub pending: usize,
    /// Whether the run skipped all transfers
    pub dry_run: bool,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
}

impl BackupReport {
    fn from_worklist(worklist: Worklist, dry_run: bool, started: Instant) -> Self {
        let count = |status: SyncStatus| worklist.iter().filter(|d| d.status == status).count();
        Self {
            uploaded: count(SyncStatus::Uploaded),
            already_synced: count(SyncStatus::AlreadySynced),
            pending: count(SyncStatus::NeedsSync),
            dry_run,
            duration_ms: started.elapsed().as_millis() as u64,
            worklist,
        }
    }

    /// Total number of files considered
    pub fn total(&self) -> usize {
        self.worklist.len()
    }
}

// ============================================================================
// BackupRunner
// ============================================================================

/// Reconcile-then-upload driver
pub struct BackupRunner {
    reconciler: Reconciler,
    uploader: Arc<dyn IUploader>,
}

impl BackupRunner {
    pub fn new(reconciler: Reconciler, uploader: Arc<dyn IUploader>) -> Self {
        Self {
            reconciler,
            uploader,
        }
    }

    /// Backs up `local_path` into `remote_path`
    ///
    /// With `dry_run` set, the worklist is computed but nothing is uploaded.
    ///
    /// # Errors
    /// - [`BackupError::Reconcile`] if no worklist could be produced
    /// - [`BackupError::Upload`] for the first file that failed to transfer
    #[instrument(skip(self))]
    pub async fn run(
        &self,
        local_path: &str,
        remote_path: &str,
        dry_run: bool,
    ) -> Result<BackupReport, BackupError> {
        let started = Instant::now();
        let mut worklist = self.reconciler.reconcile(local_path, remote_path).await?;

        if dry_run {
            info!("dry run, skipping uploads");
            return Ok(BackupReport::from_worklist(worklist, true, started));
        }

        for decision in worklist.iter_mut() {
            if !decision.status.needs_upload() {
                debug!(file = %decision.filename(), "already synchronized");
                continue;
            }

            let local_file = Path::new(&decision.entry.folder).join(&decision.entry.filename);
            let item = self
                .uploader
                .upload(&local_file, remote_path, &decision.entry.filename)
                .await
                .map_err(|source| BackupError::Upload {
                    filename: decision.entry.filename.clone(),
                    source,
                })?;

            if digest_differs(&decision.entry.hash, item.hash.as_deref()) {
                warn!(
                    file = %decision.filename(),
                    local = %decision.entry.hash,
                    remote = ?item.hash,
                    "remote digest differs after upload"
                );
            }

            decision.mark_uploaded();
            info!(file = %decision.filename(), "uploaded");
        }

        let report = BackupReport::from_worklist(worklist, false, started);
        info!(
            uploaded = report.uploaded,
            already_synced = report.already_synced,
            duration_ms = report.duration_ms,
            "backup complete"
        );
        Ok(report)
    }
}

// ============================================================================
// Tests
// ============================================================================

/// True when the service reported a digest that does not match `local`.
/// Hex case is ignored; a missing remote digest is not a mismatch.
fn digest_differs(local: &str, remote: Option<&str>) -> bool {
    remote.is_some_and(|remote| !remote.eq_ignore_ascii_case(local))
}
