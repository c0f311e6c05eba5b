//! Hashed entries and per-file sync decisions
//!
//! A [`HashedEntry`] is what a listing provider reports for one file. The
//! reconciler turns sorted local and remote listings into a [`Worklist`] of
//! [`SyncDecision`] values, one per local file.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

// ============================================================================
// HashedEntry
// ============================================================================

/// One file's identity and content digest within a folder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashedEntry {
    /// Path of the containing folder (informational, never compared)
    pub folder: String,
    /// File name, unique within a single listing
    pub filename: String,
    /// Lowercase hex content digest; empty when the digest is unavailable
    pub hash: String,
}

impl HashedEntry {
    /// Creates a new entry
    pub fn new(
        folder: impl Into<String>,
        filename: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            folder: folder.into(),
            filename: filename.into(),
            hash: hash.into(),
        }
    }

    /// Returns true if the entry carries a content digest
    #[must_use]
    pub fn has_hash(&self) -> bool {
        !self.hash.is_empty()
    }
}

impl Display for HashedEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.has_hash() {
            write!(f, "{} ({})", self.filename, self.hash)
        } else {
            write!(f, "{} (no hash)", self.filename)
        }
    }
}

/// Ascending filename order using ordinal byte comparison.
///
/// `str` ordering compares UTF-8 bytes, so this is locale independent and
/// total over any listing with unique names.
pub fn by_filename(a: &HashedEntry, b: &HashedEntry) -> Ordering {
    a.filename.as_bytes().cmp(b.filename.as_bytes())
}

// ============================================================================
// SyncStatus
// ============================================================================

/// Outcome recorded for a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// The remote already holds an identical copy
    AlreadySynced,
    /// The file is missing on the remote and must be uploaded
    NeedsSync,
    /// The file was transferred by the caller after reconciliation
    Uploaded,
}

impl SyncStatus {
    /// Returns true if the file still has to be transferred
    #[must_use]
    pub fn needs_upload(&self) -> bool {
        matches!(self, Self::NeedsSync)
    }
}

impl Display for SyncStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AlreadySynced => "Already synchronized",
            Self::NeedsSync => "Needs sync",
            Self::Uploaded => "Uploaded",
        };
        f.write_str(s)
    }
}

// ============================================================================
// SyncDecision
// ============================================================================

/// A per-file sync decision produced by reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDecision {
    /// The local version of the file
    #[serde(flatten)]
    pub entry: HashedEntry,
    /// What should happen (or has happened) to the file
    pub status: SyncStatus,
    /// Reserved for per-file failures; always `None` from the reconciler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncDecision {
    /// Creates a decision with no error attached
    pub fn new(entry: HashedEntry, status: SyncStatus) -> Self {
        Self {
            entry,
            status,
            error: None,
        }
    }

    /// Shorthand for the entry's file name
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.entry.filename
    }

    /// Records a successful transfer of this file
    pub fn mark_uploaded(&mut self) {
        self.status = SyncStatus::Uploaded;
    }
}

/// Ordered sequence of sync decisions, ascending by filename
pub type Worklist = Vec<SyncDecision>;
