//! Tree walking and fingerprinting
//!
//! [`FileTracker`] turns a directory tree into the list of [`ObservedFile`]s a
//! reconciliation needs. It runs in two steps:
//!
//! 1. **Walk**: enumerate regular files under the root with the `ignore`
//!    crate's parallel walker, honoring `.btrackignore` files and custom
//!    patterns. Directories, sockets, devices and (unless followed) symbolic
//!    links are not tracked.
//! 2. **Hash**: fingerprint every file on a dedicated rayon pool.
//!
//! Failures on individual files never abort the walk. They come back as
//! [`SkippedFile`] entries so the caller can report them next to the delta.
//!
//! ## Ignore Pattern Support
//!
//! ```text
//! # .btrackignore
//! *.tmp
//! cache/
//! !cache/keep.me
//! ```
//!
//! Custom patterns given through [`FileTracker::with_ignore_patterns`] use the
//! same syntax and take precedence over ignore files.
//!
//! ## Timestamps and hashing races
//!
//! The modification time is read before and after hashing. If it moved, the
//! file was written to while it was being read, and the (hash, mtime) pair
//! would be inconsistent: an old mtime paired with new content looks exactly
//! like deterioration. Such files are skipped for this scan.

use crate::error::{BtrackError, Result};
use crate::hasher::{self, HASH_BUFFER_SIZE};
use crate::types::{ObservedFile, ProgressInfo, SkippedFile};
use crate::utils;
use ignore::{overrides::OverrideBuilder, WalkBuilder, WalkState};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Name of per-directory ignore files
pub const IGNORE_FILE_NAME: &str = ".btrackignore";

/// Result of walking and hashing a tree
#[derive(Debug, Clone, Default)]
pub struct TreeObservation {
    /// Successfully fingerprinted files, sorted by path
    pub observed: Vec<ObservedFile>,
    /// Files that could not be fingerprinted, sorted by path
    pub skipped: Vec<SkippedFile>,
}

/// File tracker for one directory tree
///
/// # Example
///
/// ```rust,no_run
/// use btrack::file_tracking::FileTracker;
/// use btrack::types::ProgressInfo;
/// use std::path::PathBuf;
///
/// # fn main() -> btrack::Result<()> {
/// let tracker = FileTracker::new(PathBuf::from("./photos"))
///     .with_ignore_patterns(vec!["*.tmp".to_string()])
///     .with_parallel_workers(4);
///
/// let tree = tracker.observe::<fn(ProgressInfo)>(None)?;
/// println!("{} files hashed, {} skipped", tree.observed.len(), tree.skipped.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileTracker {
    /// Root directory to track
    root_path: PathBuf,
    /// Custom ignore patterns (in addition to .btrackignore files)
    ignore_patterns: Vec<String>,
    /// Files never reported, such as the snapshot database itself
    excluded_files: Vec<PathBuf>,
    /// Maximum file size to track in bytes (0 = unlimited)
    max_file_size: u64,
    /// Whether to follow symbolic links during traversal
    follow_symlinks: bool,
    /// Number of threads used for walking and hashing
    parallel_workers: usize,
}

impl FileTracker {
    /// Create a new file tracker with default settings
    ///
    /// No custom patterns, no size limit, symlinks not followed, one worker
    /// per CPU core.
    pub fn new(root_path: PathBuf) -> Self {
        Self {
            root_path,
            ignore_patterns: Vec::new(),
            excluded_files: Vec::new(),
            max_file_size: 0,
            follow_symlinks: false,
            parallel_workers: num_cpus::get(),
        }
    }

    /// Set custom ignore patterns (gitignore syntax)
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Never report these files, wherever they sit in the tree
    pub fn with_excluded_files(mut self, files: Vec<PathBuf>) -> Self {
        self.excluded_files = files.iter().map(|f| normalize_existing(f)).collect();
        self
    }

    /// Set maximum file size limit (0 = unlimited)
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Set symbolic link following behavior
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Set number of parallel workers (minimum 1)
    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers.max(1);
        self
    }

    /// Root directory being tracked
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Walk the tree and fingerprint every tracked file
    ///
    /// # Errors
    ///
    /// - [`BtrackError::InvalidPattern`] if a custom ignore pattern is invalid
    /// - [`BtrackError::Io`] if the root itself cannot be read
    /// - [`BtrackError::Internal`] if the hashing pool cannot be started
    pub fn observe<F>(&self, progress_callback: Option<F>) -> Result<TreeObservation>
    where
        F: Fn(ProgressInfo) + Send + Sync,
    {
        let start = Instant::now();
        let (paths, mut skipped) = self.list_files()?;
        let total = paths.len();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallel_workers)
            .thread_name(|i| format!("btrack-hash-{}", i))
            .build()
            .map_err(|e| BtrackError::internal(format!("hash pool: {}", e)))?;

        let processed = AtomicUsize::new(0);
        let bytes = AtomicU64::new(0);
        let root = self.root_path.as_path();
        let max_file_size = self.max_file_size;

        let outcomes: Vec<FileOutcome> = pool.install(|| {
            paths
                .par_iter()
                .map_init(
                    || vec![0u8; HASH_BUFFER_SIZE],
                    |buffer, path| {
                        let outcome = observe_file(path, root, max_file_size, buffer);

                        let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                        if let FileOutcome::Observed(_, size) = &outcome {
                            bytes.fetch_add(*size, Ordering::Relaxed);
                        }
                        if let Some(ref callback) = progress_callback {
                            callback(ProgressInfo {
                                operation: "Hashing files".to_string(),
                                current_item: Some(utils::display_key(path, root)),
                                processed: done,
                                total: Some(total),
                                bytes_processed: bytes.load(Ordering::Relaxed),
                            });
                        }
                        outcome
                    },
                )
                .collect()
        });

        let mut observed = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                FileOutcome::Observed(file, _) => observed.push(file),
                FileOutcome::Skipped(file) => skipped.push(file),
            }
        }

        observed.sort_by(|a, b| a.path.cmp(&b.path));
        skipped.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(
            "Hashed {} files ({}) in {:?}, {} skipped",
            observed.len(),
            utils::format_bytes(bytes.load(Ordering::Relaxed)),
            start.elapsed(),
            skipped.len()
        );

        Ok(TreeObservation { observed, skipped })
    }

    /// Enumerate tracked files under the root, sorted
    ///
    /// Entries the walker could not read (an unreadable directory, a broken
    /// link being followed) are returned as skipped, keyed by the path the
    /// walker reported.
    pub fn list_files(&self) -> Result<(Vec<PathBuf>, Vec<SkippedFile>)> {
        // Surface a missing or unreadable root as an error instead of an empty tree.
        std::fs::read_dir(&self.root_path)?;

        let mut walker_builder = WalkBuilder::new(&self.root_path);
        walker_builder
            .follow_links(self.follow_symlinks)
            .hidden(false)
            .parents(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .require_git(false)
            .threads(self.parallel_workers);
        walker_builder.add_custom_ignore_filename(IGNORE_FILE_NAME);

        if !self.ignore_patterns.is_empty() {
            let mut override_builder = OverrideBuilder::new(&self.root_path);
            for pattern in &self.ignore_patterns {
                // Override globs whitelist by default; a leading '!' flips to ignore.
                let final_pattern = match pattern.strip_prefix('!') {
                    Some(include) => include.to_string(),
                    None => format!("!{}", pattern),
                };
                override_builder
                    .add(&final_pattern)
                    .map_err(|e| BtrackError::InvalidPattern(format!("{}: {}", pattern, e)))?;
            }
            let overrides = override_builder
                .build()
                .map_err(|e| BtrackError::InvalidPattern(e.to_string()))?;
            walker_builder.overrides(overrides);
        }

        let files = Arc::new(Mutex::new(Vec::<PathBuf>::new()));
        let skipped = Arc::new(Mutex::new(Vec::<SkippedFile>::new()));

        walker_builder.build_parallel().run(|| {
            let files = Arc::clone(&files);
            let skipped = Arc::clone(&skipped);
            let root = self.root_path.clone();
            let excluded = &self.excluded_files;

            Box::new(move |entry_result| {
                match entry_result {
                    Ok(entry) => {
                        let is_file = entry.file_type().map(|ft| ft.is_file()).unwrap_or(false);
                        if !is_file {
                            trace!("Not tracking {:?}", entry.path());
                            return WalkState::Continue;
                        }
                        if is_excluded(entry.path(), excluded) {
                            trace!("Excluded {:?}", entry.path());
                            return WalkState::Continue;
                        }
                        files.lock().push(entry.into_path());
                    }
                    Err(e) => {
                        warn!("Walk error: {}", e);
                        let path = walk_error_path(&e)
                            .map(|p| utils::display_key(p, &root))
                            .unwrap_or_default();
                        skipped.lock().push(SkippedFile {
                            path,
                            reason: e.to_string(),
                        });
                    }
                }
                WalkState::Continue
            })
        });

        let mut files = std::mem::take(&mut *files.lock());
        let skipped = std::mem::take(&mut *skipped.lock());
        files.sort();
        Ok((files, skipped))
    }
}

/// Outcome of fingerprinting one walked file
#[derive(Debug)]
enum FileOutcome {
    Observed(ObservedFile, u64),
    Skipped(SkippedFile),
}

fn observe_file(path: &Path, root: &Path, max_file_size: u64, buffer: &mut [u8]) -> FileOutcome {
    let skip = |reason: String| {
        warn!("Skipping {:?}: {}", path, reason);
        FileOutcome::Skipped(SkippedFile {
            path: utils::display_key(path, root),
            reason,
        })
    };

    let key = match utils::path_key(path, root) {
        Ok(key) => key,
        Err(e) => return skip(e.to_string()),
    };

    let before = match utils::get_file_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => return skip(e.to_string()),
    };

    // Skipped, not dropped, so a tracked file over the limit is never deleted.
    if max_file_size > 0 && before.size > max_file_size {
        debug!("Skipping large file {:?} ({} bytes)", path, before.size);
        return FileOutcome::Skipped(SkippedFile {
            path: key,
            reason: format!(
                "larger than max_file_size ({} > {} bytes)",
                before.size, max_file_size
            ),
        });
    }

    let content_hash = match hasher::hash_file_with_buffer(path, buffer) {
        Ok(hash) => hash,
        Err(e) => return skip(e.to_string()),
    };

    let after = match utils::get_file_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => return skip(e.to_string()),
    };
    if after.modified != before.modified || after.size != before.size {
        return skip("file changed while it was being hashed".to_string());
    }

    FileOutcome::Observed(ObservedFile::new(key, content_hash, after.modified), after.size)
}

fn walk_error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path),
        ignore::Error::WithDepth { err, .. } => walk_error_path(err),
        ignore::Error::WithLineNumber { err, .. } => walk_error_path(err),
        ignore::Error::Partial(errs) => errs.iter().find_map(walk_error_path),
        ignore::Error::Loop { child, .. } => Some(child),
        _ => None,
    }
}

fn is_excluded(path: &Path, excluded: &[PathBuf]) -> bool {
    if excluded.is_empty() {
        return false;
    }
    let name = path.file_name();
    if !excluded.iter().any(|e| e.file_name() == name) {
        return false;
    }
    let normalized = normalize_existing(path);
    excluded.iter().any(|e| *e == normalized)
}

/// Canonical form of a path whose final component may not exist yet
fn normalize_existing(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            parent
                .canonicalize()
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}
