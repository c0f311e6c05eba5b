//! CLI subcommands
//!
//! Commands that talk to OneDrive share [`connect`], which resolves an
//! access token (cache, refresh, or interactive login) and builds the
//! Graph client every adapter uses.

pub mod auth;
pub mod quota;
pub mod status;
pub mod sync;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use cloudbackup_core::config::Config;
use cloudbackup_graph::auth::{GraphAuthAdapter, OAuth2Config};
use cloudbackup_graph::client::GraphClient;
use cloudbackup_graph::provider::GraphListingProvider;
use cloudbackup_sync::{LocalFileSystemLister, Reconciler};

/// Builds the auth adapter described by `config`
pub fn auth_adapter(config: &Config) -> Result<GraphAuthAdapter> {
    let oauth = OAuth2Config::from_auth_config(&config.auth)?;
    Ok(GraphAuthAdapter::new(oauth))
}

/// Returns an authenticated Graph client
pub async fn connect(config: &Config) -> Result<Arc<GraphClient>> {
    let token = auth_adapter(config)?
        .access_token()
        .await
        .context("Could not obtain an access token. Run 'cloud-backup auth login' first")?;

    debug!(base_url = %config.remote.base_url, "Connecting to Graph");
    let client = GraphClient::with_base_url(token, config.remote.base_url.as_str())
        .with_max_retries(config.remote.max_retries);
    Ok(Arc::new(client))
}

/// Reconciler comparing the local filesystem against the drive behind `client`
pub fn reconciler(client: Arc<GraphClient>) -> Reconciler {
    Reconciler::new(
        Arc::new(LocalFileSystemLister::new()),
        Arc::new(GraphListingProvider::new(client)),
    )
}
