//! Delta generation
//!
//! Compares the snapshot against the current tree and sorts every observed
//! file into exactly one outcome. Four signals are involved: path identity,
//! content identity, timestamp identity and absence. They are checked in a
//! fixed order:
//!
//! ```text
//!                         path tracked and unmatched?
//!                     yes /                        \ no
//!        hash same?  mtime same?            first unmatched record
//!        ─────────────────────────          with the same hash?
//!        yes / yes  → unchanged             yes → moved (+ touched if
//!        yes / no   → touched                      mtime differs)
//!        no  / no   → modified              no  → created
//!        no  / yes  → deteriorated
//!
//!   tracked paths never matched → deleted
//! ```
//!
//! Path identity comes first, in a pass of its own: every observed path the
//! snapshot tracks is claimed before any move detection runs. Content
//! identity is then consulted only for paths the snapshot does not claim, so
//! a rename shows up as one move instead of a delete plus a create. A new
//! copy can never take the record of a file that is still at its tracked
//! path, whatever the walk order, so a rotted original is always reported as
//! deteriorated.
//!
//! When several unmatched records share the hash of a new path, the first one
//! in path order is taken. With duplicate content, which copy counts as
//! "moved" is therefore arbitrary but repeatable.
//!
//! Hashing is done up front (in parallel, see [`FileTracker`]). The
//! classification pass below is single-threaded, and the working set of
//! unmatched paths is local to one call.

use crate::error::{BtrackError, Result};
use crate::file_tracking::{FileTracker, TreeObservation};
use crate::snapshot::SnapshotStore;
use crate::types::{Delta, FileMovement, ObservedFile, ProgressInfo, SkippedFile};
use crate::utils;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Generate a delta for `tree_root` with default walker settings
///
/// # Example
///
/// ```rust,no_run
/// use btrack::{reconcile, SnapshotStore};
/// use std::path::Path;
///
/// # fn main() -> btrack::Result<()> {
/// let store = SnapshotStore::open(Path::new("/backup/.btrack.db"))?;
/// let delta = reconcile::generate_delta(&store, Path::new("/backup"))?;
/// for file in &delta.deteriorated {
///     eprintln!("content changed without a new mtime: {}", file.path);
/// }
/// # Ok(())
/// # }
/// ```
pub fn generate_delta(store: &SnapshotStore, tree_root: &Path) -> Result<Delta> {
    ReconciliationEngine::for_root(tree_root).generate_delta(store)
}

/// Reconciles one tree against a snapshot
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    tracker: FileTracker,
}

impl ReconciliationEngine {
    /// Create an engine around a configured tracker
    pub fn new(tracker: FileTracker) -> Self {
        Self { tracker }
    }

    /// Create an engine with default walker settings
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self::new(FileTracker::new(root.into()))
    }

    /// The walker used for scans
    pub fn tracker(&self) -> &FileTracker {
        &self.tracker
    }

    /// Walk the tree, hash every file and classify it against `store`
    ///
    /// The store is only read. Unreadable files end up in [`Delta::skipped`].
    ///
    /// # Errors
    ///
    /// Store errors and walker setup errors (bad pattern, unreadable root)
    /// abort the scan. Per-file errors do not.
    pub fn generate_delta(&self, store: &SnapshotStore) -> Result<Delta> {
        self.generate_delta_with_progress::<fn(ProgressInfo)>(store, None)
    }

    /// Same as [`generate_delta`](Self::generate_delta), reporting hashing progress
    pub fn generate_delta_with_progress<F>(
        &self,
        store: &SnapshotStore,
        progress_callback: Option<F>,
    ) -> Result<Delta>
    where
        F: Fn(ProgressInfo) + Send + Sync,
    {
        let TreeObservation { observed, skipped } = self.tracker.observe(progress_callback)?;
        classify(store, observed, skipped)
    }
}

/// Classify pre-hashed files against `store`
///
/// `observed` is processed in the given order, which becomes the order of the
/// delta's lists. `touched` holds same-path entries first, then move targets.
/// `skipped` entries are carried through to the delta; any
/// tracked path equal to or under a skipped path is treated as present, so an
/// unreadable file or directory is never reported as deleted.
pub fn classify(
    store: &SnapshotStore,
    observed: Vec<ObservedFile>,
    skipped: Vec<SkippedFile>,
) -> Result<Delta> {
    let start = Instant::now();
    let mut unmatched = store.all_paths()?;
    let tracked = unmatched.len();

    if !skipped.is_empty() {
        unmatched.retain(|path| {
            !skipped
                .iter()
                .any(|s| !s.path.is_empty() && utils::key_is_within(path, &s.path))
        });
    }

    let mut delta = Delta::default();

    let mut new_paths = Vec::new();

    for file in observed {
        if !unmatched.remove(&file.path) {
            new_paths.push(file);
            continue;
        }

        let prior = store.record_by_path(&file.path)?.ok_or_else(|| {
            BtrackError::storage(format!("record for {:?} vanished during scan", file.path))
        })?;

        let same_hash = file.content_hash == prior.content_hash;
        let same_mtime = file.file_mod_time == prior.file_mod_time;
        match (same_hash, same_mtime) {
            (true, true) => {}
            (true, false) => delta.touched.push(file),
            (false, false) => delta.modified.push(file),
            (false, true) => {
                warn!(
                    "Deterioration: {} changed content but kept mtime {}",
                    file.path, file.file_mod_time
                );
                delta.deteriorated.push(file);
            }
        }
    }

    for file in new_paths {
        let candidate = store
            .records_by_hash(&file.content_hash)?
            .into_iter()
            .find(|record| unmatched.contains(&record.path));

        match candidate {
            Some(record) => {
                unmatched.remove(&record.path);
                debug!("Moved: {} -> {}", record.path, file.path);
                delta.moved.push(FileMovement::new(record.path, file.path.clone()));
                if record.file_mod_time != file.file_mod_time {
                    delta.touched.push(file);
                }
            }
            None => delta.created.push(file),
        }
    }

    let mut deleted: Vec<String> = unmatched.into_iter().collect();
    deleted.sort();
    delta.deleted = deleted;
    delta.skipped = skipped;

    let summary = delta.summary();
    info!(
        "Reconciled {} tracked paths in {:?}: {} created, {} modified, {} deteriorated, {} touched, {} moved, {} deleted, {} skipped",
        tracked,
        start.elapsed(),
        summary.created,
        summary.modified,
        summary.deteriorated,
        summary.touched,
        summary.moved,
        summary.deleted,
        summary.skipped
    );

    Ok(delta)
}
