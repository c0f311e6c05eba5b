//! OAuth credentials shared across adapters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth tokens received from the identity provider
///
/// Contains the access token for API requests, an optional refresh token
/// for obtaining new access tokens, and the expiration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    /// Bearer token for authenticating API requests
    pub access_token: String,
    /// Token for refreshing the access token without user interaction
    /// (requires `offline_access` scope)
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// Returns true if the access token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the access token will expire within the given duration
    pub fn expires_within(&self, duration: chrono::Duration) -> bool {
        Utc::now() + duration >= self.expires_at
    }

    /// Returns true if a refresh token is available
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}
