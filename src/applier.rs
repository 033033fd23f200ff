//! Committing an accepted delta
//!
//! A scan never writes. Once the caller has looked at a [`Delta`] and accepted
//! it, [`DeltaApplier::apply`] brings the snapshot in line with the observed
//! tree in one transaction.
//!
//! Deteriorated files are deliberately left out of `apply`: writing their new
//! hash would erase the only evidence of the corruption. Accepting corrupted
//! content as the new baseline is a separate decision, made by calling
//! [`DeltaApplier::rebaseline_deteriorated`].

use crate::error::Result;
use crate::mod_time::ModTime;
use crate::snapshot::SnapshotStore;
use crate::types::{ApplyStats, Delta};
use tracing::{info, warn};

/// Writes accepted deltas into a snapshot store
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaApplier;

impl DeltaApplier {
    /// Apply `delta`, stamping new hashes with the current time
    ///
    /// Moves, creations, deletions, modifications and touches are written.
    /// Deteriorated entries are not.
    pub fn apply(delta: &Delta, store: &mut SnapshotStore) -> Result<ApplyStats> {
        Self::apply_at(delta, store, ModTime::now())
    }

    /// Apply `delta` with an explicit `hash_recorded_at` timestamp
    pub fn apply_at(delta: &Delta, store: &mut SnapshotStore, applied_at: ModTime) -> Result<ApplyStats> {
        let stats = store.apply_delta(delta, applied_at)?;
        if delta.has_deterioration() {
            warn!(
                "{} deteriorated files left untouched in the snapshot",
                delta.deteriorated.len()
            );
        }
        info!("Committed {} snapshot rows", stats.total_rows());
        Ok(stats)
    }

    /// Accept the current content of every deteriorated file as its baseline
    ///
    /// Hash, mtime and `hash_recorded_at` are overwritten for each entry in
    /// `delta.deteriorated`, in one transaction. Nothing else in the delta is
    /// touched.
    pub fn rebaseline_deteriorated(delta: &Delta, store: &mut SnapshotStore) -> Result<ApplyStats> {
        let rehashed = store.rebaseline(&delta.deteriorated, ModTime::now())?;
        if rehashed > 0 {
            warn!("Rebaselined {} deteriorated files", rehashed);
        }
        Ok(ApplyStats {
            rehashed,
            ..Default::default()
        })
    }
}
