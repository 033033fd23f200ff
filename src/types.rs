//! Core data types used throughout btrack
//!
//! ## Overview
//!
//! - **Persisted state**: [`FileRecord`], one row per tracked path
//! - **Scan output**: [`ObservedFile`], [`FileMovement`], [`SkippedFile`] and
//!   the [`Delta`] that groups them
//! - **Reporting**: [`DeltaSummary`], [`ApplyStats`], [`ProgressInfo`]
//! - **Configuration**: [`TrackerConfig`]
//!
//! All of these are plain data. Paths are relative to the tracked root and
//! always use `/` as separator.
//!
//! ## Examples
//!
//! ```rust
//! use btrack::types::Delta;
//!
//! let delta = Delta::default();
//! assert!(delta.is_empty());
//! assert_eq!(delta.summary().total_changes(), 0);
//! ```

use crate::hasher::Fingerprint;
use crate::mod_time::ModTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One tracked file as persisted in the snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the tracked root (unique key)
    pub path: String,
    /// SHA-256 of the content when the hash was last recorded
    pub content_hash: Fingerprint,
    /// Modification time of the file when the hash was last recorded
    pub file_mod_time: ModTime,
    /// When the hash was last computed and stored
    pub hash_recorded_at: ModTime,
}

/// A file seen during a scan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ObservedFile {
    /// Path relative to the tracked root
    pub path: String,
    /// SHA-256 of the current content
    pub content_hash: Fingerprint,
    /// Current modification time
    pub file_mod_time: ModTime,
}

impl ObservedFile {
    /// Create an observed file entry
    pub fn new(path: impl Into<String>, content_hash: impl Into<String>, file_mod_time: ModTime) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.into(),
            file_mod_time,
        }
    }
}

/// A record whose content reappeared under another path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FileMovement {
    /// Path in the prior snapshot
    pub old_path: String,
    /// Path in the current tree
    pub new_path: String,
}

impl FileMovement {
    /// Create a movement entry
    pub fn new(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
        Self {
            old_path: old_path.into(),
            new_path: new_path.into(),
        }
    }
}

/// A file the scan saw but could not fingerprint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedFile {
    /// Path relative to the tracked root (lossy when the name is not UTF-8)
    pub path: String,
    /// Why the file was skipped
    pub reason: String,
}

/// Classified differences between the snapshot and the current tree
///
/// The six change lists are disjoint. A path observed in the tree shows up in
/// at most one of `created`, `modified`, `deteriorated` and `touched`, and is
/// the target of at most one `moved` entry. A moved file whose timestamp also
/// changed appears both in `moved` and in `touched` (under its new path).
///
/// `deteriorated` is the integrity alarm: the content changed while the
/// modification time stayed the same.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Delta {
    /// Files with no prior record and no content match
    pub created: Vec<ObservedFile>,
    /// Prior paths that are gone and were not matched to a moved file
    pub deleted: Vec<String>,
    /// Same path, new content, new modification time
    pub modified: Vec<ObservedFile>,
    /// Same path, new content, unchanged modification time
    pub deteriorated: Vec<ObservedFile>,
    /// Unchanged content with a new modification time
    pub touched: Vec<ObservedFile>,
    /// Content found under a new path
    pub moved: Vec<FileMovement>,
    /// Files that could not be read during the scan
    pub skipped: Vec<SkippedFile>,
}

impl Delta {
    /// Check whether the scan found no changes
    ///
    /// Skipped files are warnings, not changes, and do not count.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.deleted.is_empty()
            && self.modified.is_empty()
            && self.deteriorated.is_empty()
            && self.touched.is_empty()
            && self.moved.is_empty()
    }

    /// Check whether the scan raised an integrity alarm
    pub fn has_deterioration(&self) -> bool {
        !self.deteriorated.is_empty()
    }

    /// Per-category counts
    pub fn summary(&self) -> DeltaSummary {
        DeltaSummary {
            created: self.created.len(),
            deleted: self.deleted.len(),
            modified: self.modified.len(),
            deteriorated: self.deteriorated.len(),
            touched: self.touched.len(),
            moved: self.moved.len(),
            skipped: self.skipped.len(),
        }
    }
}

/// Counts of each change category in a [`Delta`]
///
/// # Examples
///
/// ```rust
/// # use btrack::types::DeltaSummary;
/// let summary = DeltaSummary {
///     created: 2,
///     modified: 1,
///     skipped: 4,
///     ..Default::default()
/// };
///
/// assert!(summary.has_changes());
/// assert_eq!(summary.total_changes(), 3);
/// ```
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeltaSummary {
    /// Number of created files
    pub created: usize,
    /// Number of deleted paths
    pub deleted: usize,
    /// Number of modified files
    pub modified: usize,
    /// Number of deteriorated files
    pub deteriorated: usize,
    /// Number of touched files
    pub touched: usize,
    /// Number of moved files
    pub moved: usize,
    /// Number of unreadable files
    pub skipped: usize,
}

impl DeltaSummary {
    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }

    /// Total number of change entries (skipped files excluded)
    pub fn total_changes(&self) -> usize {
        self.created + self.deleted + self.modified + self.deteriorated + self.touched + self.moved
    }
}

/// Rows written by one apply or rebaseline
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyStats {
    /// Records inserted for created files
    pub inserted: usize,
    /// Records removed for deleted paths
    pub deleted: usize,
    /// Records renamed for moved files
    pub renamed: usize,
    /// Records whose hash and mtime were refreshed
    pub rehashed: usize,
    /// Records whose mtime alone was refreshed
    pub retimed: usize,
}

impl ApplyStats {
    /// Total number of rows written
    pub fn total_rows(&self) -> usize {
        self.inserted + self.deleted + self.renamed + self.rehashed + self.retimed
    }
}

/// Progress information for long-running operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Current operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Number of items processed
    pub processed: usize,
    /// Total number of items (if known)
    pub total: Option<usize>,
    /// Bytes processed
    pub bytes_processed: u64,
}

impl ProgressInfo {
    /// Get progress percentage (0-100)
    pub fn percentage(&self) -> Option<f32> {
        self.total.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.processed as f32 / total as f32) * 100.0
            }
        })
    }
}

/// Tracker configuration, persisted alongside the snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Root directory being tracked
    pub root_path: PathBuf,
    /// Snapshot database location
    pub db_path: PathBuf,
    /// Extra gitignore-style patterns to exclude
    pub ignore_patterns: Vec<String>,
    /// Whether symbolic links are followed during the walk
    pub follow_symlinks: bool,
    /// Files larger than this are skipped (0 = unlimited)
    pub max_file_size: u64,
    /// Number of hashing threads
    pub parallel_workers: usize,
    /// btrack version that wrote this configuration
    pub version: String,
}

impl TrackerConfig {
    /// Default configuration for a root and database location
    pub fn new(root_path: PathBuf, db_path: PathBuf) -> Self {
        Self {
            root_path,
            db_path,
            ignore_patterns: Vec::new(),
            follow_symlinks: false,
            max_file_size: 0,
            parallel_workers: num_cpus::get(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
