//! Reconciler
//!
//! The [`Reconciler`] compares the flat listing of a local folder with the
//! listing of a remote folder and decides, per file, whether it must be
//! uploaded.
//!
//! ## Flow
//!
//! 1. **Local listing**: every entry must carry a digest; otherwise the run
//!    stops before the remote is touched
//! 2. **Remote folder**: created if missing
//! 3. **Remote listing**
//! 4. **Merge-join**: both listings sorted by [`by_filename`] and walked in
//!    lockstep
//!
//! The remote folder is expected to be a pure mirror of the local one. Any
//! remote file without a local counterpart, or with a different digest,
//! stops the run with [`ReconcileError::RemoteNotClean`].

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use cloudbackup_core::domain::{by_filename, HashedEntry, SyncDecision, SyncStatus, Worklist};
use cloudbackup_core::ports::{IListingProvider, IRemoteListingProvider};

use crate::ReconcileError;

// ============================================================================
// Reconciler
// ============================================================================

/// Stateless local-vs-remote comparison over two listing providers
#[derive(Clone)]
pub struct Reconciler {
    local: Arc<dyn IListingProvider>,
    remote: Arc<dyn IRemoteListingProvider>,
}

impl Reconciler {
    /// Creates a reconciler over the given providers
    pub fn new(local: Arc<dyn IListingProvider>, remote: Arc<dyn IRemoteListingProvider>) -> Self {
        Self { local, remote }
    }

    /// Produces the worklist for `local_path` against `remote_path`
    ///
    /// Collaborator calls are awaited strictly one after another. The
    /// returned worklist is sorted by filename and contains only
    /// `AlreadySynced` and `NeedsSync` decisions.
    ///
    /// # Errors
    /// - [`ReconcileError::Collaborator`] if listing or folder creation fails
    /// - [`ReconcileError::LocalHashMissing`] if a local file has no digest
    /// - [`ReconcileError::RemoteNotClean`] if the remote folder diverges
    #[instrument(skip(self))]
    pub async fn reconcile(
        &self,
        local_path: &str,
        remote_path: &str,
    ) -> Result<Worklist, ReconcileError> {
        let local_entries = self.local.list(local_path).await?;
        debug!(count = local_entries.len(), "local listing complete");

        ensure_hashed(&local_entries)?;

        self.remote.ensure_folder(remote_path).await?;

        let remote_entries = self.remote.list(remote_path).await?;
        debug!(count = remote_entries.len(), "remote listing complete");

        let decisions = worklist(local_entries, remote_entries)?;

        info!(
            total = decisions.len(),
            pending = decisions.iter().filter(|d| d.status.needs_upload()).count(),
            "reconciliation complete"
        );

        Ok(decisions)
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

fn ensure_hashed(entries: &[HashedEntry]) -> Result<(), ReconcileError> {
    match entries.iter().find(|e| !e.has_hash()) {
        Some(entry) => Err(ReconcileError::LocalHashMissing {
            filename: entry.filename.clone(),
        }),
        None => Ok(()),
    }
}

// ============================================================================
// Merge-join
// ============================================================================

/// Merges two listings into a worklist
///
/// Both inputs are sorted with [`by_filename`] first, so callers may pass
/// them in any order. Local digests are not checked here; see
/// [`Reconciler::reconcile`].
///
/// # Errors
/// Returns [`ReconcileError::RemoteNotClean`] at the first remote entry that
/// is missing locally or whose digest differs.
pub fn worklist(
    mut local: Vec<HashedEntry>,
    mut remote: Vec<HashedEntry>,
) -> Result<Worklist, ReconcileError> {
    local.sort_by(by_filename);
    remote.sort_by(by_filename);

    let mut decisions = Vec::with_capacity(local.len());
    let mut remote_iter = remote.into_iter().peekable();

    for entry in local {
        let status = match remote_iter.peek() {
            None => SyncStatus::NeedsSync,
            Some(r) => match by_filename(&entry, r) {
                Ordering::Less => SyncStatus::NeedsSync,
                Ordering::Greater => return Err(remote_only(r)),
                Ordering::Equal if entry.hash == r.hash => {
                    remote_iter.next();
                    SyncStatus::AlreadySynced
                }
                Ordering::Equal => {
                    return Err(ReconcileError::RemoteNotClean {
                        filename: entry.filename.clone(),
                        reason: format!("hash mismatch (local {}, remote {})", entry.hash, r.hash),
                    });
                }
            },
        };

        debug!(file = %entry.filename, %status, "decided");
        decisions.push(SyncDecision::new(entry, status));
    }

    // Local side exhausted; anything left remotely is unexplained.
    if let Some(r) = remote_iter.next() {
        return Err(remote_only(&r));
    }

    Ok(decisions)
}

fn remote_only(entry: &HashedEntry) -> ReconcileError {
    ReconcileError::RemoteNotClean {
        filename: entry.filename.clone(),
        reason: "file exists only in the remote folder".to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;

    use super::*;

    // ------------------------------------------------------------------
    // Mock providers
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct MockProvider {
        folders: HashMap<String, Vec<HashedEntry>>,
        fail_list: bool,
        fail_ensure: bool,
        list_calls: AtomicUsize,
        ensured: Mutex<Vec<String>>,
    }

    impl MockProvider {
        fn with(path: &str, files: &[(&str, &str)]) -> Self {
            let entries = files
                .iter()
                .map(|(name, hash)| HashedEntry::new(path, *name, *hash))
                .collect();
            Self {
                folders: HashMap::from([(path.to_string(), entries)]),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.list_calls.load(AtomicOrdering::SeqCst) + self.ensured.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl IListingProvider for MockProvider {
        async fn list(&self, path: &str) -> anyhow::Result<Vec<HashedEntry>> {
            self.list_calls.fetch_add(1, AtomicOrdering::SeqCst);
            if self.fail_list {
                anyhow::bail!("listing failed for {path}");
            }
            Ok(self.folders.get(path).cloned().unwrap_or_default())
        }
    }

    #[async_trait::async_trait]
    impl IRemoteListingProvider for MockProvider {
        async fn ensure_folder(&self, path: &str) -> anyhow::Result<()> {
            self.ensured.lock().unwrap().push(path.to_string());
            if self.fail_ensure {
                anyhow::bail!("Remote path is not a folder: {path}");
            }
            Ok(())
        }
    }

    fn reconciler(local: MockProvider, remote: MockProvider) -> (Reconciler, Arc<MockProvider>) {
        let remote = Arc::new(remote);
        (Reconciler::new(Arc::new(local), remote.clone()), remote)
    }

    fn names(worklist: &Worklist) -> Vec<&str> {
        worklist.iter().map(|d| d.filename()).collect()
    }

    // ------------------------------------------------------------------
    // reconcile
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_empty_remote_needs_everything() {
        let local = MockProvider::with("/pics", &[("c", "hc"), ("a", "ha"), ("b", "hb")]);
        let (r, remote) = reconciler(local, MockProvider::default());

        let result = r.reconcile("/pics", "/Backups/pics").await.unwrap();

        assert_eq!(names(&result), vec!["a", "b", "c"]);
        assert!(result.iter().all(|d| d.status == SyncStatus::NeedsSync));
        assert!(result.iter().all(|d| d.error.is_none()));
        assert_eq!(result[0].entry.folder, "/pics");
        assert_eq!(*remote.ensured.lock().unwrap(), vec!["/Backups/pics".to_string()]);
    }

    #[tokio::test]
    async fn test_identical_listings_are_synced() {
        let files = [("a", "ha"), ("b", "hb")];
        let (r, _) = reconciler(
            MockProvider::with("/l", &files),
            MockProvider::with("/r", &files),
        );

        let result = r.reconcile("/l", "/r").await.unwrap();

        assert_eq!(names(&result), vec!["a", "b"]);
        assert!(result.iter().all(|d| d.status == SyncStatus::AlreadySynced));
    }

    #[tokio::test]
    async fn test_partial_remote() {
        let (r, _) = reconciler(
            MockProvider::with("/l", &[("a", "ha"), ("b", "hb"), ("c", "hc")]),
            MockProvider::with("/r", &[("b", "hb")]),
        );

        let result = r.reconcile("/l", "/r").await.unwrap();

        let statuses: Vec<SyncStatus> = result.iter().map(|d| d.status).collect();
        assert_eq!(
            statuses,
            vec![
                SyncStatus::NeedsSync,
                SyncStatus::AlreadySynced,
                SyncStatus::NeedsSync
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_local_hash_never_touches_remote() {
        let (r, remote) = reconciler(
            MockProvider::with("/l", &[("a", "ha"), ("b", "")]),
            MockProvider::with("/r", &[("zzz", "whatever")]),
        );

        let err = r.reconcile("/l", "/r").await.unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::LocalHashMissing { ref filename } if filename == "b"
        ));
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_remote_only_file_is_not_clean() {
        let (r, _) = reconciler(
            MockProvider::with("/l", &[("a", "ha")]),
            MockProvider::with("/r", &[("z", "hz")]),
        );

        let err = r.reconcile("/l", "/r").await.unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::RemoteNotClean { ref filename, .. } if filename == "z"
        ));
    }

    #[tokio::test]
    async fn test_hash_mismatch_is_not_clean() {
        let (r, _) = reconciler(
            MockProvider::with("/l", &[("a", "ha")]),
            MockProvider::with("/r", &[("a", "wronghash")]),
        );

        let err = r.reconcile("/l", "/r").await.unwrap_err();

        match err {
            ReconcileError::RemoteNotClean { filename, reason } => {
                assert_eq!(filename, "a");
                assert!(reason.contains("wronghash"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_local_listing_failure_propagates() {
        let local = MockProvider {
            fail_list: true,
            ..Default::default()
        };
        let (r, remote) = reconciler(local, MockProvider::default());

        let err = r.reconcile("/l", "/r").await.unwrap_err();

        assert!(matches!(err, ReconcileError::Collaborator(_)));
        assert_eq!(err.to_string(), "listing failed for /l");
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_ensure_folder_failure_skips_remote_listing() {
        let remote = MockProvider {
            fail_ensure: true,
            ..Default::default()
        };
        let (r, remote) = reconciler(MockProvider::with("/l", &[("a", "ha")]), remote);

        let err = r.reconcile("/l", "/r").await.unwrap_err();

        assert!(err.to_string().contains("not a folder"));
        assert_eq!(remote.list_calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_idempotent_after_upload() {
        let files = [("a", "ha"), ("b", "hb")];
        let (r, _) = reconciler(MockProvider::with("/l", &files), MockProvider::default());
        let first = r.reconcile("/l", "/r").await.unwrap();
        assert!(first.iter().all(|d| d.status == SyncStatus::NeedsSync));

        // Simulate the uploads landing remotely.
        let uploaded: Vec<(&str, &str)> = first
            .iter()
            .map(|d| (d.entry.filename.as_str(), d.entry.hash.as_str()))
            .collect();
        let (r, _) = reconciler(
            MockProvider::with("/l", &files),
            MockProvider::with("/r", &uploaded),
        );
        let second = r.reconcile("/l", "/r").await.unwrap();
        assert!(second.iter().all(|d| d.status == SyncStatus::AlreadySynced));
    }

    // ------------------------------------------------------------------
    // worklist
    // ------------------------------------------------------------------

    fn entries(files: &[(&str, &str)]) -> Vec<HashedEntry> {
        files
            .iter()
            .map(|(n, h)| HashedEntry::new("/x", *n, *h))
            .collect()
    }

    #[test]
    fn test_worklist_empty_inputs() {
        assert!(worklist(Vec::new(), Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_worklist_remote_extra_after_local_exhausted() {
        let err = worklist(entries(&[("a", "1")]), entries(&[("a", "1"), ("b", "2")])).unwrap_err();
        assert_eq!(err.filename(), Some("b"));
    }

    #[test]
    fn test_worklist_uses_byte_order() {
        // Uppercase sorts before lowercase byte-wise.
        let result = worklist(
            entries(&[("b", "1"), ("B", "2"), ("a", "3")]),
            entries(&[("B", "2")]),
        )
        .unwrap();
        assert_eq!(names(&result), vec!["B", "a", "b"]);
        assert_eq!(result[0].status, SyncStatus::AlreadySynced);
    }

    #[test]
    fn test_worklist_remote_gap_in_middle() {
        let err = worklist(
            entries(&[("a", "1"), ("c", "3")]),
            entries(&[("a", "1"), ("b", "2"), ("c", "3")]),
        )
        .unwrap_err();
        assert_eq!(err.filename(), Some("b"));
    }

    // ------------------------------------------------------------------
    // worklist properties
    // ------------------------------------------------------------------

    mod properties {
        use std::collections::BTreeMap;

        use proptest::prelude::*;

        use super::*;

        /// Unique names mapped to 40-digit hex digests
        fn listing() -> impl Strategy<Value = BTreeMap<String, String>> {
            prop::collection::btree_map("[a-zA-Z0-9._-]{1,12}", "[0-9a-f]{40}", 0..32)
        }

        /// Entries in reverse name order so the merge has to sort them
        fn to_entries(files: &BTreeMap<String, String>) -> Vec<HashedEntry> {
            files
                .iter()
                .rev()
                .map(|(n, h)| HashedEntry::new("/x", n.as_str(), h.as_str()))
                .collect()
        }

        proptest! {
            #[test]
            fn empty_remote_needs_everything(files in listing()) {
                let result = worklist(to_entries(&files), Vec::new()).unwrap();

                prop_assert_eq!(result.len(), files.len());
                prop_assert!(result.iter().all(|d| d.status == SyncStatus::NeedsSync));
                let expected: Vec<&str> = files.keys().map(String::as_str).collect();
                prop_assert_eq!(names(&result), expected);
            }

            #[test]
            fn identical_listings_are_synced(files in listing()) {
                let result = worklist(to_entries(&files), to_entries(&files)).unwrap();

                prop_assert_eq!(result.len(), files.len());
                prop_assert!(result.iter().all(|d| d.status == SyncStatus::AlreadySynced));
            }

            #[test]
            fn remote_subset_splits_statuses(files in listing(), mask in any::<u32>()) {
                let remote: BTreeMap<String, String> = files
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, (n, h))| (n.clone(), h.clone()))
                    .collect();

                let result = worklist(to_entries(&files), to_entries(&remote)).unwrap();

                prop_assert_eq!(result.len(), files.len());
                for decision in &result {
                    let expected = if remote.contains_key(decision.filename()) {
                        SyncStatus::AlreadySynced
                    } else {
                        SyncStatus::NeedsSync
                    };
                    prop_assert_eq!(decision.status, expected);
                }
            }

            #[test]
            fn remote_only_name_is_rejected(files in listing(), extra in "[a-z]{13}") {
                let mut remote = files.clone();
                remote.insert(extra.clone(), "00".to_string());

                let err = worklist(to_entries(&files), to_entries(&remote)).unwrap_err();
                let is_not_clean = matches!(err, ReconcileError::RemoteNotClean { .. });
                prop_assert!(is_not_clean);
                prop_assert_eq!(err.filename(), Some(extra.as_str()));
            }
        }
    }
}
