//! cloud-backup Graph - Microsoft Graph API adapters
//!
//! Provides async adapters for:
//! - OAuth2 authentication (Authorization Code with PKCE) and a token cache
//! - Flat folder listings with SHA-1 digests
//! - Folder creation
//! - Simple and resumable (chunked) uploads
//!
//! ## Modules
//!
//! - [`auth`] - OAuth2 PKCE authentication flow components
//! - [`client`] - Microsoft Graph API HTTP client
//! - [`provider`] - Remote listing provider (implements `IRemoteListingProvider`)
//! - [`upload`] - File upload operations (small and large/chunked)

pub mod auth;
pub mod client;
pub mod provider;
pub mod upload;

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when communicating with the Microsoft Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// An item with the same name already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded and retries were exhausted
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration the service last asked us to wait
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// Any other non-success status
    #[error("Unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The path exists remotely but is a file
    #[error("Remote path is not a folder: {0}")]
    NotAFolder(String),

    /// The OAuth flow did not complete
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GraphError {
    /// Maps a non-success HTTP status to an error, keeping the response body
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized(body),
            StatusCode::FORBIDDEN => Self::Forbidden(body),
            StatusCode::NOT_FOUND => Self::NotFound(body),
            StatusCode::CONFLICT => Self::Conflict(body),
            s if s.is_server_error() => Self::ServerError(format!("{s}: {body}")),
            _ => Self::Status { status, body },
        }
    }
}
