//! Domain entities
//!
//! This module contains the core value types for cloud-backup:
//! - Hashed entries describing one observed file
//! - Sync decisions and their status
//! - Validated remote paths
//! - Domain-specific error types

pub mod entry;
pub mod errors;
pub mod newtypes;

// Re-export commonly used types
pub use entry::{by_filename, HashedEntry, SyncDecision, SyncStatus, Worklist};
pub use errors::DomainError;
pub use newtypes::RemotePath;
