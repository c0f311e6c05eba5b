//! GraphListingProvider - IRemoteListingProvider implementation for Microsoft Graph API
//!
//! Wraps a shared [`GraphClient`] and turns drive listings into
//! [`HashedEntry`] values the reconciler can compare with local files.
//!
//! ## Design Notes
//!
//! - The client is shared through `Arc` with the uploader; the access token is
//!   resolved before either adapter is built.
//! - Folders and dot-names are dropped from listings so both sides of a
//!   comparison obey the same rules.
//! - Files without a reported SHA-1 get an empty hash, which the reconciler
//!   treats as a mismatch.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use cloudbackup_core::domain::{HashedEntry, RemotePath};
use cloudbackup_core::ports::{IListingProvider, IRemoteListingProvider};

use crate::client::GraphClient;
use crate::GraphError;

/// Remote listing provider backed by OneDrive
pub struct GraphListingProvider {
    client: Arc<GraphClient>,
}

impl GraphListingProvider {
    /// Creates a new provider using the given client
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }

    /// Returns a reference to the underlying GraphClient
    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    /// Creates `folder` inside its parent, tolerating a concurrent creation
    async fn create_one(&self, folder: &RemotePath) -> Result<()> {
        let (parent, name) = match (folder.parent(), folder.file_name()) {
            (Some(parent), Some(name)) => (parent, name),
            _ => return Ok(()),
        };

        match self.client.create_folder(&parent, name).await {
            Ok(item) => {
                info!(path = %folder, id = %item.id, "Created remote folder");
                Ok(())
            }
            Err(e) if matches!(e.downcast_ref::<GraphError>(), Some(GraphError::Conflict(_))) => {
                debug!(path = %folder, "Folder appeared concurrently");
                Ok(())
            }
            Err(e) => Err(e.context(format!("Failed to create remote folder {folder}"))),
        }
    }
}

#[async_trait::async_trait]
impl IListingProvider for GraphListingProvider {
    #[instrument(skip(self), fields(path = %path))]
    async fn list(&self, path: &str) -> Result<Vec<HashedEntry>> {
        let folder = RemotePath::parse(path).context("Invalid remote path")?;
        let children = self.client.list_children(&folder).await?;

        let mut entries = Vec::with_capacity(children.len());
        for item in children {
            if item.is_folder() {
                debug!(name = %item.name, "skipping folder");
                continue;
            }
            if item.name.starts_with('.') {
                debug!(name = %item.name, "skipping hidden entry");
                continue;
            }

            let hash = item.sha1().unwrap_or_else(|| {
                warn!(name = %item.name, "no SHA-1 reported for remote file");
                String::new()
            });
            entries.push(HashedEntry::new(folder.as_str(), item.name, hash));
        }

        debug!(count = entries.len(), "remote listing complete");
        Ok(entries)
    }
}

#[async_trait::async_trait]
impl IRemoteListingProvider for GraphListingProvider {
    /// Makes sure `path` exists as a folder, creating missing ancestors first
    #[instrument(skip(self), fields(path = %path))]
    async fn ensure_folder(&self, path: &str) -> Result<()> {
        let target = RemotePath::parse(path).context("Invalid remote path")?;

        // Walk up until an existing folder is found.
        let mut missing = Vec::new();
        let mut current = target;
        while !current.is_root() {
            match self.client.get_metadata(&current).await? {
                Some(item) if item.is_folder() => break,
                Some(_) => return Err(GraphError::NotAFolder(current.to_string()).into()),
                None => {
                    let parent = current.parent().unwrap_or_else(RemotePath::root);
                    missing.push(current);
                    current = parent;
                }
            }
        }

        for folder in missing.iter().rev() {
            self.create_one(folder).await?;
        }

        Ok(())
    }
}
