//! Microsoft Graph API client
//!
//! Provides a typed HTTP client for interacting with the Microsoft Graph API.
//! Handles authentication headers, JSON deserialization, endpoint
//! construction, paging, and 429 back-off.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cloudbackup_graph::client::GraphClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = GraphClient::new("access-token-here");
//! let drive = client.get_drive_info().await?;
//! println!("Connected to {}'s drive", drive.owner);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use cloudbackup_core::domain::RemotePath;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::GraphError;

/// Base URL for Microsoft Graph API v1.0
const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Fields requested for every item lookup and listing
const ITEM_SELECT: &str = "id,name,size,folder,file";

// ============================================================================
// Graph API response types
// ============================================================================

/// A file or folder in the drive
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    /// OneDrive item ID
    pub id: String,
    /// Item name (file or folder name)
    pub name: String,
    /// Size in bytes
    #[serde(default)]
    pub size: Option<u64>,
    /// Present if the item is a folder
    #[serde(default)]
    pub folder: Option<serde_json::Value>,
    /// Present if the item is a file
    #[serde(default)]
    pub file: Option<FileFacet>,
}

/// File-specific metadata in a DriveItem response
#[derive(Debug, Clone, Deserialize)]
pub struct FileFacet {
    /// File content hashes
    #[serde(default)]
    pub hashes: Option<FileHashes>,
}

/// Content hashes for a file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHashes {
    /// Uppercase hex SHA-1, reported for personal drives
    #[serde(default)]
    pub sha1_hash: Option<String>,
}

impl DriveItem {
    /// Returns true if the item is a folder
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }

    /// Lowercase hex SHA-1 of the content, when the service reported one
    pub fn sha1(&self) -> Option<String> {
        self.file
            .as_ref()
            .and_then(|f| f.hashes.as_ref())
            .and_then(|h| h.sha1_hash.as_deref())
            .map(str::to_ascii_lowercase)
    }
}

/// One page of a children listing
#[derive(Debug, Deserialize)]
struct ChildrenPage {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// Response from the /me/drive endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveResponse {
    /// Drive owner
    owner: Option<IdentitySet>,
    /// Quota information
    quota: Option<QuotaResponse>,
}

#[derive(Debug, Deserialize)]
struct IdentitySet {
    user: Option<Identity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Identity {
    display_name: Option<String>,
}

/// Quota information from the drive response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotaResponse {
    /// Total storage in bytes
    total: Option<u64>,
    /// Used storage in bytes
    used: Option<u64>,
    /// Remaining storage in bytes
    remaining: Option<u64>,
}

/// Drive owner and storage quota
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriveInfo {
    /// Display name of the drive owner
    pub owner: String,
    /// Total storage in bytes
    pub total: u64,
    /// Used storage in bytes
    pub used: u64,
    /// Remaining storage in bytes
    pub remaining: u64,
}

// ============================================================================
// Path construction
// ============================================================================

/// Percent-encodes a drive path, leaving `/` separators intact
fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for b in path.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// API path addressing an item by its drive path
///
/// - Root: `/me/drive/root`
/// - Other: `/me/drive/root:{path}`
pub(crate) fn item_path(path: &RemotePath) -> String {
    if path.is_root() {
        "/me/drive/root".to_string()
    } else {
        format!("/me/drive/root:{}", encode_path(path.as_str()))
    }
}

/// API path for an action or relationship on an item addressed by path
///
/// - Root: `/me/drive/root/{action}`
/// - Other: `/me/drive/root:{path}:/{action}`
pub(crate) fn item_action_path(path: &RemotePath, action: &str) -> String {
    if path.is_root() {
        format!("/me/drive/root/{action}")
    } else {
        format!("/me/drive/root:{}:/{action}", encode_path(path.as_str()))
    }
}

// ============================================================================
// GraphClient
// ============================================================================

/// Default retry-after duration when header is missing (30 seconds)
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Longest wait honoured from a `Retry-After` header
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Maximum number of retries for 429 responses
const DEFAULT_MAX_RETRIES: u32 = 5;

/// HTTP client for Microsoft Graph API calls
///
/// Wraps `reqwest::Client` with authentication headers and base URL
/// construction for the Microsoft Graph API.
pub struct GraphClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests
    base_url: String,
    /// Current OAuth2 access token
    access_token: String,
    /// Retries allowed after an HTTP 429 response
    max_retries: u32,
}

impl GraphClient {
    /// Creates a new GraphClient with the given access token
    ///
    /// # Arguments
    /// * `access_token` - A valid OAuth2 access token for Microsoft Graph
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, GRAPH_BASE_URL)
    }

    /// Creates a new GraphClient with a custom base URL (useful for testing)
    ///
    /// # Arguments
    /// * `access_token` - A valid OAuth2 access token
    /// * `base_url` - Custom base URL for API requests
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Sets how many times a throttled request is retried
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Updates the access token (e.g., after a token refresh)
    ///
    /// # Arguments
    /// * `token` - The new access token
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = token.into();
        debug!("Updated GraphClient access token");
    }

    /// Returns a reference to the current access token
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns a reference to the underlying HTTP client
    ///
    /// Upload session URLs and `@odata.nextLink` values are absolute, so they
    /// bypass [`GraphClient::request`].
    pub(crate) fn http_client(&self) -> &Client {
        &self.client
    }

    /// Creates an authenticated request builder for the given method and path
    ///
    /// Automatically prepends the base URL and adds the Authorization header.
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, PUT, DELETE, etc.)
    /// * `path` - API path relative to base URL (e.g., "/me/drive")
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, &url)
            .bearer_auth(&self.access_token)
    }

    /// Retrieves the drive owner and quota
    ///
    /// Makes `GET /me/drive`.
    pub async fn get_drive_info(&self) -> Result<DriveInfo> {
        debug!("Fetching drive info from /me/drive");

        let response = self
            .execute_with_retry("GET /me/drive", || self.request(Method::GET, "/me/drive"))
            .await?;
        let drive: DriveResponse = check_status(response)
            .await
            .context("GET /me/drive returned error status")?
            .json()
            .await
            .context("Failed to parse /me/drive response")?;

        let owner = drive
            .owner
            .and_then(|o| o.user)
            .and_then(|u| u.display_name)
            .unwrap_or_else(|| "Unknown User".to_string());

        let quota = drive.quota.unwrap_or(QuotaResponse {
            total: None,
            used: None,
            remaining: None,
        });
        let total = quota.total.unwrap_or(0);
        let used = quota.used.unwrap_or(0);
        let remaining = quota.remaining.unwrap_or_else(|| total.saturating_sub(used));

        if total == 0 {
            warn!("Drive quota total is 0, this may indicate an API issue");
        }

        debug!(%owner, used, total, "drive info retrieved");
        Ok(DriveInfo {
            owner,
            total,
            used,
            remaining,
        })
    }

    /// Looks up an item by path
    ///
    /// # Returns
    /// `None` if nothing exists at `path`
    pub async fn get_metadata(&self, path: &RemotePath) -> Result<Option<DriveItem>> {
        let api_path = item_path(path);
        debug!(%path, "Fetching metadata");

        let response = self
            .execute_with_retry(&api_path, || {
                self.request(Method::GET, &api_path)
                    .query(&[("$select", ITEM_SELECT)])
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(%path, "No item at path");
            return Ok(None);
        }

        let item: DriveItem = check_status(response)
            .await
            .with_context(|| format!("Metadata lookup for {path} failed"))?
            .json()
            .await
            .context("Failed to parse item metadata")?;
        Ok(Some(item))
    }

    /// Lists every direct child of the folder at `path`
    ///
    /// Follows `@odata.nextLink` until the listing is exhausted.
    pub async fn list_children(&self, path: &RemotePath) -> Result<Vec<DriveItem>> {
        let api_path = item_action_path(path, "children");

        let response = self
            .execute_with_retry(&api_path, || {
                self.request(Method::GET, &api_path)
                    .query(&[("$select", ITEM_SELECT)])
            })
            .await?;
        let mut page: ChildrenPage = check_status(response)
            .await
            .with_context(|| format!("Listing {path} failed"))?
            .json()
            .await
            .context("Failed to parse children page")?;

        let mut items = std::mem::take(&mut page.value);

        while let Some(next_link) = page.next_link.take() {
            debug!(collected = items.len(), "Fetching next page");
            let response = self
                .execute_with_retry(&next_link, || {
                    self.client.get(&next_link).bearer_auth(&self.access_token)
                })
                .await?;
            page = check_status(response)
                .await
                .with_context(|| format!("Fetching next page of {path} failed"))?
                .json()
                .await
                .context("Failed to parse children page")?;
            items.append(&mut page.value);
        }

        debug!(%path, count = items.len(), "Children listed");
        Ok(items)
    }

    /// Creates a folder named `name` inside `parent`
    ///
    /// Fails with [`GraphError::Conflict`] if an item with that name exists.
    pub async fn create_folder(&self, parent: &RemotePath, name: &str) -> Result<DriveItem> {
        let api_path = item_action_path(parent, "children");
        let body = serde_json::json!({
            "name": name,
            "folder": {},
            "@microsoft.graph.conflictBehavior": "fail",
        });
        info!(%parent, name, "Creating folder");

        let response = self
            .execute_with_retry(&api_path, || {
                self.request(Method::POST, &api_path).json(&body)
            })
            .await?;
        let item: DriveItem = check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse created folder")?;
        Ok(item)
    }

    // ========================================================================
    // execute_with_retry - 429 response handling
    // ========================================================================

    /// Sends a request, retrying while the service answers HTTP 429.
    ///
    /// `build` is called once per attempt because a `RequestBuilder` is
    /// consumed by sending. The `Retry-After` header decides the wait; when
    /// absent, 30 seconds are used.
    ///
    /// # Returns
    /// The first non-429 response, whatever its status.
    pub async fn execute_with_retry<F>(&self, label: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            let response = build()
                .send()
                .await
                .with_context(|| format!("Failed to send request: {label}"))?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                if attempt > 0 {
                    info!(label, attempt, "Request succeeded after retry");
                }
                return Ok(response);
            }

            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
                .unwrap_or(DEFAULT_RETRY_AFTER);

            if attempt >= self.max_retries {
                warn!(label, attempts = attempt + 1, "429 retry limit exhausted");
                return Err(GraphError::TooManyRequests { retry_after }.into());
            }

            info!(
                label,
                attempt,
                retry_after_ms = retry_after.as_millis() as u64,
                "Received 429, backing off"
            );
            tokio::time::sleep(retry_after).await;
            attempt += 1;
        }
    }
}

/// Passes successful responses through and maps the rest to [`GraphError`]
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error body".to_string());
    Err(GraphError::from_status(status, body).into())
}

/// Parses a `Retry-After` header value
///
/// Accepts delta-seconds or an HTTP date. Either form is capped at one hour;
/// anything unparseable yields `default`.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds).min(MAX_RETRY_AFTER);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let diff = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        let secs = u64::try_from(diff.num_seconds()).unwrap_or(0);
        return Duration::from_secs(secs).min(MAX_RETRY_AFTER);
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}
