//! Listing provider ports (driven/secondary ports)
//!
//! A listing provider reports the files directly inside one folder together
//! with their content digests. Two variants exist: the local filesystem and
//! the remote drive. Only the remote variant can create folders.
//!
//! ## Contract
//!
//! - Listings are flat: subdirectories are never entered and never reported.
//! - Entries whose name starts with `.` are excluded.
//! - Order is unspecified; the reconciler sorts.
//! - An entry whose digest could not be determined carries an empty `hash`.
//! - Uses `anyhow::Result` because failures are adapter-specific and are
//!   propagated verbatim by the reconciler.

use crate::domain::entry::HashedEntry;

/// Port trait for producing a hashed listing of a folder
#[async_trait::async_trait]
pub trait IListingProvider: Send + Sync {
    /// Lists the files directly inside `path`
    ///
    /// # Arguments
    /// * `path` - Folder to list, in the provider's own path syntax
    ///
    /// # Errors
    /// Returns an error if the folder cannot be read
    async fn list(&self, path: &str) -> anyhow::Result<Vec<HashedEntry>>;
}

/// Port trait for the remote side, which can also create its folder
#[async_trait::async_trait]
pub trait IRemoteListingProvider: IListingProvider {
    /// Makes sure `path` exists as a folder
    ///
    /// Succeeds whether or not the folder already existed.
    ///
    /// # Errors
    /// Returns an error if the path exists but is not a folder, or if
    /// creation fails
    async fn ensure_folder(&self, path: &str) -> anyhow::Result<()>;
}
