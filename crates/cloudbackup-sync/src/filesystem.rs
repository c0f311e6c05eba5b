//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`IListingProvider`] using `tokio::fs` for async file operations.
//!
//! ## Design Decisions
//!
//! - **Flat listing**: Only the entries directly inside the folder are
//!   considered. Subdirectories and names starting with `.` are skipped.
//! - **SHA-1**: OneDrive reports `sha1Hash` for stored files, so hashing
//!   locally with the same algorithm makes digests directly comparable.
//! - **Streaming**: Files are hashed in fixed-size blocks so large files are
//!   never held in memory.
//! - **Symlinks**: Followed; the target decides whether an entry is a file.

use std::path::Path;

use sha1::{Digest, Sha1};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

use cloudbackup_core::domain::HashedEntry;
use cloudbackup_core::ports::IListingProvider;

/// Size of each block read while hashing
const HASH_BLOCK_SIZE: usize = 64 * 1024;

// ============================================================================
// LocalFileSystemLister struct
// ============================================================================

/// Adapter that bridges the [`IListingProvider`] port to the real filesystem.
///
/// Zero-sized: every operation takes its folder as an argument.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemLister;

impl LocalFileSystemLister {
    /// Create a new `LocalFileSystemLister`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Computes the lowercase hex SHA-1 digest of the file at `path`.
    ///
    /// Returns `Ok(None)` when `path` is a directory.
    ///
    /// # Errors
    /// Returns an error if the path cannot be opened or read.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn hash_file(&self, path: &Path) -> anyhow::Result<Option<String>> {
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.is_dir() {
            debug!("is a directory");
            return Ok(None);
        }

        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha1::new();
        let mut buf = vec![0u8; HASH_BLOCK_SIZE];
        let mut total: u64 = 0;

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            total += n as u64;
        }

        let digest = hex::encode(hasher.finalize());
        debug!(bytes = total, hash = %digest, "hash computed");
        Ok(Some(digest))
    }
}

/// Hidden entries never take part in a backup.
fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

// ============================================================================
// IListingProvider implementation
// ============================================================================

#[async_trait::async_trait]
impl IListingProvider for LocalFileSystemLister {
    #[instrument(skip(self), fields(path = %path))]
    async fn list(&self, path: &str) -> anyhow::Result<Vec<HashedEntry>> {
        let mut dir = tokio::fs::read_dir(path).await?;
        let mut entries = Vec::new();

        while let Some(item) = dir.next_entry().await? {
            let name = match item.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    anyhow::bail!("file name is not valid UTF-8: {}", raw.to_string_lossy());
                }
            };

            if is_hidden(&name) {
                debug!(file = %name, "skipping hidden entry");
                continue;
            }

            let hash = match self.hash_file(&item.path()).await {
                Ok(Some(hash)) => hash,
                Ok(None) => {
                    debug!(file = %name, "skipping directory");
                    continue;
                }
                Err(e) => return Err(e.context(format!("Failed to hash {name}"))),
            };

            entries.push(HashedEntry::new(path, name, hash));
        }

        debug!(count = entries.len(), "listing complete");
        Ok(entries)
    }
}

// ============================================================================
// Unit tests
// ============================================================================
