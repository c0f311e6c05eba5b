//! cloud-backup Sync - Reconciliation and backup engine
//!
//! Provides:
//! - Flat, one-way reconciliation of a local folder against a remote folder
//! - A local filesystem lister producing SHA-1 digests
//! - A backup runner that uploads every file the reconciler schedules
//!
//! ## Modules
//!
//! - [`reconciler`] - Merge-join of local and remote listings into a worklist
//! - [`filesystem`] - Local filesystem adapter (flat listing, SHA-1)
//! - [`runner`] - Reconcile-then-upload driver used by the `sync` command

pub mod filesystem;
pub mod reconciler;
pub mod runner;

pub use filesystem::LocalFileSystemLister;
pub use reconciler::{worklist, Reconciler};
pub use runner::{BackupReport, BackupRunner};

use thiserror::Error;

/// Errors produced while reconciling a local folder against a remote one
///
/// Every variant is terminal: no partial worklist accompanies it.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A local file carries no digest, so it cannot be compared
    #[error("Local file has no hash: {filename}")]
    LocalHashMissing { filename: String },

    /// The remote folder holds something the local folder does not explain
    #[error("Remote folder is not clean: {filename}: {reason}")]
    RemoteNotClean { filename: String, reason: String },

    /// A listing provider failed; its error is passed through unchanged
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl ReconcileError {
    /// Name of the file that caused the failure, when there is one
    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::LocalHashMissing { filename } | Self::RemoteNotClean { filename, .. } => {
                Some(filename)
            }
            Self::Collaborator(_) => None,
        }
    }
}

/// Errors produced by a backup run
#[derive(Debug, Error)]
pub enum BackupError {
    /// Reconciliation refused to produce a worklist
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Transferring one file failed; later files were not attempted
    #[error("Failed to upload {filename}: {source}")]
    Upload {
        filename: String,
        #[source]
        source: anyhow::Error,
    },
}
