//! Upload operations for Microsoft Graph API (OneDrive)
//!
//! Provides functions for uploading files to OneDrive:
//! - [`upload_small`] - Single-request upload for small files
//! - [`upload_large`] - Resumable upload session streamed from disk in chunks
//! - [`create_upload_session`] - Creates a resumable upload session
//! - [`upload_chunk`] - Uploads a single chunk within a session
//!
//! [`GraphUploader`] picks between the two based on file size and implements
//! the [`IUploader`] port.
//!
//! ## Microsoft Graph API References
//!
//! - [Upload small files](https://learn.microsoft.com/en-us/graph/api/driveitem-put-content)
//! - [Upload large files](https://learn.microsoft.com/en-us/graph/api/driveitem-createuploadsession)

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use cloudbackup_core::config::Config;
use cloudbackup_core::domain::RemotePath;
use cloudbackup_core::ports::{IUploader, UploadedItem};
use reqwest::Method;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument};

use crate::client::{check_status, item_action_path, DriveItem, GraphClient};
use crate::GraphError;

/// Default single-request limit: 4 MiB
pub const DEFAULT_SIMPLE_UPLOAD_LIMIT: u64 = 4 * 1024 * 1024;

/// Default chunk size for resumable uploads: 10 MiB
///
/// Microsoft requires chunk sizes that are multiples of 320 KiB.
/// 10 MiB = 320 KiB * 32.
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Chunk size granularity required by upload sessions
const CHUNK_ALIGNMENT: usize = 320 * 1024;

/// Upload sessions reject ranges of 60 MiB or more
pub const MAX_CHUNK_SIZE: usize = 60 * 1024 * 1024 - CHUNK_ALIGNMENT;

/// Response from creating an upload session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSessionResponse {
    /// The URL to use for uploading chunks
    upload_url: String,
}

impl From<DriveItem> for UploadedItem {
    fn from(item: DriveItem) -> Self {
        let hash = item.sha1();
        Self {
            id: item.id,
            name: item.name,
            size: item.size,
            hash,
        }
    }
}

// ============================================================================
// Throughput
// ============================================================================

/// Tracks bytes sent and reports an average rate
struct Throughput {
    started: Instant,
    sent: u64,
}

impl Throughput {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            sent: 0,
        }
    }

    fn add(&mut self, bytes: u64) {
        self.sent += bytes;
    }

    /// Average bytes per second since start
    fn rate(&self) -> u64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return self.sent;
        }
        (self.sent as f64 / secs) as u64
    }
}

// ============================================================================
// upload_small
// ============================================================================

/// Uploads a small file in a single PUT request
///
/// Uses the simple upload API: `PUT /me/drive/root:{path}:/content`
/// with the file bytes as the request body.
///
/// # Arguments
/// * `client` - The authenticated GraphClient
/// * `file_path` - Remote path of the file to create or overwrite
/// * `data` - File contents
///
/// # Errors
/// Returns an error if the upload request fails or the response cannot be parsed
pub async fn upload_small(
    client: &GraphClient,
    file_path: &RemotePath,
    data: Vec<u8>,
) -> Result<DriveItem> {
    let path = item_action_path(file_path, "content");
    let len = data.len() as u64;
    debug!(bytes = len, %file_path, "Uploading small file");

    let mut meter = Throughput::start();
    let response = client
        .execute_with_retry(&path, || {
            client
                .request(Method::PUT, &path)
                .header("Content-Type", "application/octet-stream")
                .body(data.clone())
        })
        .await?;
    let item: DriveItem = check_status(response)
        .await
        .context("Small upload returned error status")?
        .json()
        .await
        .context("Failed to parse upload response")?;
    meter.add(len);

    info!(
        name = %item.name,
        bytes = len,
        bytes_per_sec = meter.rate(),
        "Small upload completed"
    );
    Ok(item)
}

// ============================================================================
// create_upload_session
// ============================================================================

/// Creates a resumable upload session for large files
///
/// Uses the upload session API: `POST /me/drive/root:{path}:/createUploadSession`
///
/// # Returns
/// The upload session URL
pub async fn create_upload_session(client: &GraphClient, file_path: &RemotePath) -> Result<String> {
    let path = item_action_path(file_path, "createUploadSession");
    let body = serde_json::json!({
        "item": { "@microsoft.graph.conflictBehavior": "replace" }
    });
    debug!(%file_path, "Creating upload session");

    let response = client
        .execute_with_retry(&path, || client.request(Method::POST, &path).json(&body))
        .await?;
    let session: UploadSessionResponse = check_status(response)
        .await
        .context("Create upload session returned error status")?
        .json()
        .await
        .context("Failed to parse upload session response")?;

    debug!("Upload session created");
    Ok(session.upload_url)
}

// ============================================================================
// upload_chunk
// ============================================================================

/// Uploads a single chunk of data to a resumable upload session
///
/// Sends a PUT request to the upload session URL with a `Content-Range` header
/// specifying the byte range being uploaded. Session URLs are pre-authorized,
/// so no bearer token is attached.
///
/// # Returns
/// - `Some(DriveItem)` on the final chunk (HTTP 200/201)
/// - `None` for intermediate chunks (HTTP 202 Accepted)
pub async fn upload_chunk(
    http: &reqwest::Client,
    upload_url: &str,
    data: Vec<u8>,
    offset: u64,
    total: u64,
) -> Result<Option<DriveItem>> {
    let chunk_len = data.len() as u64;
    let range_end = offset + chunk_len - 1;
    let content_range = format!("bytes {offset}-{range_end}/{total}");

    debug!(range = %content_range, bytes = chunk_len, "Uploading chunk");

    let response = http
        .put(upload_url)
        .header("Content-Length", chunk_len.to_string())
        .header("Content-Range", &content_range)
        .body(data)
        .send()
        .await
        .context("Failed to send chunk upload request")?;

    let status = response.status();
    if status == reqwest::StatusCode::ACCEPTED {
        return Ok(None);
    }

    let item: DriveItem = check_status(response)
        .await
        .with_context(|| format!("Chunk {content_range} rejected"))?
        .json()
        .await
        .context("Failed to parse final chunk response")?;
    debug!(%status, "Upload session completed");
    Ok(Some(item))
}

// ============================================================================
// upload_large
// ============================================================================

/// Uploads a file through a resumable upload session
///
/// The file is read from disk one chunk at a time, so memory use is bounded
/// by `chunk_size`. Progress and throughput are logged after each chunk.
///
/// # Errors
/// Returns an error if session creation, any chunk upload, or response parsing fails
pub async fn upload_large(
    client: &GraphClient,
    file_path: &RemotePath,
    local_file: &Path,
    chunk_size: usize,
) -> Result<DriveItem> {
    let mut file = tokio::fs::File::open(local_file)
        .await
        .with_context(|| format!("Failed to open {}", local_file.display()))?;
    let total = file.metadata().await?.len();
    if total == 0 {
        return Err(GraphError::InvalidResponse(
            "upload sessions cannot carry an empty file".to_string(),
        )
        .into());
    }

    info!(
        %file_path,
        bytes = total,
        chunks = total.div_ceil(chunk_size as u64),
        "Starting large file upload"
    );

    let upload_url = create_upload_session(client, file_path).await?;

    let mut meter = Throughput::start();
    let mut offset: u64 = 0;
    let mut completed = None;

    while offset < total {
        let len = std::cmp::min(chunk_size as u64, total - offset) as usize;
        let mut chunk = vec![0u8; len];
        file.read_exact(&mut chunk)
            .await
            .with_context(|| format!("Failed to read {} at offset {offset}", local_file.display()))?;

        let result = upload_chunk(client.http_client(), &upload_url, chunk, offset, total)
            .await
            .with_context(|| format!("Failed to upload chunk at offset {offset}/{total}"))?;

        offset += len as u64;
        meter.add(len as u64);
        info!(
            sent = offset,
            total,
            percent = offset * 100 / total,
            bytes_per_sec = meter.rate(),
            "Upload progress"
        );

        if result.is_some() {
            completed = result;
        }
    }

    completed.ok_or_else(|| {
        GraphError::InvalidResponse("upload session finished without an item".to_string()).into()
    })
}

// ============================================================================
// GraphUploader
// ============================================================================

/// [`IUploader`] adapter choosing simple or resumable upload by size
pub struct GraphUploader {
    client: Arc<GraphClient>,
    simple_upload_limit: u64,
    chunk_size: usize,
}

impl GraphUploader {
    /// Creates an uploader with the default size thresholds
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self {
            client,
            simple_upload_limit: DEFAULT_SIMPLE_UPLOAD_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Creates an uploader using the thresholds from `config`
    pub fn from_config(client: Arc<GraphClient>, config: &Config) -> Self {
        Self::new(client)
            .with_simple_upload_limit(config.simple_upload_limit_bytes())
            .with_chunk_size(config.chunk_size_bytes())
    }

    /// Files up to `limit` bytes are sent in one request
    pub fn with_simple_upload_limit(mut self, limit: u64) -> Self {
        self.simple_upload_limit = limit;
        self
    }

    /// Sets the session chunk size, rounded down to a multiple of 320 KiB
    /// and capped at [`MAX_CHUNK_SIZE`]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        let aligned = std::cmp::max(chunk_size / CHUNK_ALIGNMENT, 1) * CHUNK_ALIGNMENT;
        self.chunk_size = std::cmp::min(aligned, MAX_CHUNK_SIZE);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

#[async_trait::async_trait]
impl IUploader for GraphUploader {
    #[instrument(skip(self, local_file), fields(file = %local_file.display()))]
    async fn upload(
        &self,
        local_file: &Path,
        remote_folder: &str,
        name: &str,
    ) -> Result<UploadedItem> {
        let folder = RemotePath::parse(remote_folder).context("Invalid remote path")?;
        let target = folder.join(name)?;

        let size = tokio::fs::metadata(local_file)
            .await
            .with_context(|| format!("Failed to stat {}", local_file.display()))?
            .len();

        let item = if size <= self.simple_upload_limit {
            let data = tokio::fs::read(local_file)
                .await
                .with_context(|| format!("Failed to read {}", local_file.display()))?;
            upload_small(&self.client, &target, data).await?
        } else {
            upload_large(&self.client, &target, local_file, self.chunk_size).await?
        };

        Ok(item.into())
    }
}
