//! Upload port (driven/secondary port)
//!
//! Transfers the bytes of one local file into a remote folder. The backup
//! runner calls it once for every worklist entry that needs syncing.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Metadata of a file after a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedItem {
    /// Provider-specific item identifier
    pub id: String,
    /// Item name as stored remotely
    pub name: String,
    /// Stored size in bytes, when reported
    pub size: Option<u64>,
    /// Lowercase hex digest reported by the provider, when available
    pub hash: Option<String>,
}

/// Port trait for file transfer
///
/// Implementations overwrite nothing silently: the reconciler only ever
/// schedules files that are absent remotely.
#[async_trait::async_trait]
pub trait IUploader: Send + Sync {
    /// Uploads `local_file` as `name` inside `remote_folder`
    ///
    /// # Arguments
    /// * `local_file` - Path of the file on disk
    /// * `remote_folder` - Destination folder in the remote path syntax
    /// * `name` - Destination file name
    async fn upload(
        &self,
        local_file: &Path,
        remote_folder: &str,
        name: &str,
    ) -> anyhow::Result<UploadedItem>;
}
