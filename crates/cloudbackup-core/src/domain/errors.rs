//! Domain error types
//!
//! Validation failures raised while constructing domain newtypes.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid remote path format
    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),
}
