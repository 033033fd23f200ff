//! Main btrack entry point
//!
//! [`Tracker`] binds a tree root, its snapshot database and the scan options
//! together. It is a thin layer over the lower-level pieces:
//!
//! - **SnapshotStore**: the persisted per-file records
//! - **ReconciliationEngine**: walks, hashes and classifies the tree
//! - **DeltaApplier**: commits an accepted delta
//!
//! ## Examples
//!
//! ```rust,no_run
//! use btrack::Tracker;
//! use std::path::PathBuf;
//!
//! # fn main() -> btrack::Result<()> {
//! let mut tracker = Tracker::init(PathBuf::from("/srv/archive"))?;
//!
//! // ... time passes, files change ...
//!
//! let delta = tracker.scan()?;
//! if delta.has_deterioration() {
//!     for file in &delta.deteriorated {
//!         eprintln!("possible bit rot: {}", file.path);
//!     }
//! }
//! tracker.commit(&delta)?;
//! # Ok(())
//! # }
//! ```

use crate::applier::DeltaApplier;
use crate::error::{BtrackError, Result};
use crate::file_tracking::FileTracker;
use crate::reconcile::ReconciliationEngine;
use crate::snapshot::{self, SnapshotStore, SIDECAR_SUFFIXES};
use crate::types::{ApplyStats, Delta, ProgressInfo, TrackerConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Database file name used when no explicit location is given
pub const DEFAULT_DB_NAME: &str = ".btrack.db";

/// A tracked tree and its snapshot
///
/// # Examples
///
/// ```rust,no_run
/// use btrack::TrackerBuilder;
/// use std::path::PathBuf;
///
/// # fn main() -> btrack::Result<()> {
/// let tracker = TrackerBuilder::new()
///     .ignore_patterns(vec!["*.part".to_string(), "cache/".to_string()])
///     .max_file_size(4 * 1024 * 1024 * 1024)
///     .db_path(PathBuf::from("/var/lib/btrack/archive.db"))
///     .build(PathBuf::from("/srv/archive"))?;
/// println!("{} files tracked", tracker.record_count()?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Tracker {
    /// Effective configuration
    config: TrackerConfig,
    /// Snapshot database
    store: SnapshotStore,
    /// Scanner for the root
    engine: ReconciliationEngine,
}

impl Tracker {
    /// Start tracking `root_path` with default settings
    ///
    /// The snapshot goes to `<root>/.btrack.db` and starts empty, so the
    /// first scan reports every file as created.
    ///
    /// # Errors
    ///
    /// - [`BtrackError::AlreadyInitialized`] if the database already exists
    /// - [`BtrackError::InvalidConfiguration`] if `root_path` is not a directory
    pub fn init(root_path: PathBuf) -> Result<Self> {
        TrackerBuilder::new().init(root_path)
    }

    /// Open an existing snapshot for `root_path` at the default location
    pub fn open(root_path: PathBuf) -> Result<Self> {
        TrackerBuilder::new().open(root_path)
    }

    /// Default database location for a root
    pub fn default_db_path(root_path: &Path) -> PathBuf {
        root_path.join(DEFAULT_DB_NAME)
    }

    /// Compare the tree against the snapshot
    ///
    /// Nothing is written. Pass the result to [`commit`](Self::commit) to
    /// accept it.
    #[instrument(skip(self), fields(root = ?self.config.root_path))]
    pub fn scan(&self) -> Result<Delta> {
        self.scan_with_progress::<fn(ProgressInfo)>(None)
    }

    /// Compare the tree against the snapshot, reporting hashing progress
    pub fn scan_with_progress<F>(&self, progress_callback: Option<F>) -> Result<Delta>
    where
        F: Fn(ProgressInfo) + Send + Sync,
    {
        let start = Instant::now();
        let delta = self
            .engine
            .generate_delta_with_progress(&self.store, progress_callback)?;
        debug!("Scan finished in {:?}", start.elapsed());
        Ok(delta)
    }

    /// Write an accepted delta into the snapshot
    ///
    /// Deteriorated files keep their old records. See
    /// [`rebaseline_deteriorated`](Self::rebaseline_deteriorated).
    #[instrument(skip(self, delta))]
    pub fn commit(&mut self, delta: &Delta) -> Result<ApplyStats> {
        DeltaApplier::apply(delta, &mut self.store)
    }

    /// Accept the current content of deteriorated files as their new baseline
    #[instrument(skip(self, delta))]
    pub fn rebaseline_deteriorated(&mut self, delta: &Delta) -> Result<ApplyStats> {
        DeltaApplier::rebaseline_deteriorated(delta, &mut self.store)
    }

    /// Root directory being tracked
    pub fn root_path(&self) -> &Path {
        &self.config.root_path
    }

    /// Effective configuration
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Underlying snapshot store
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Number of files in the snapshot
    pub fn record_count(&self) -> Result<usize> {
        self.store.record_count()
    }

    fn assemble(config: TrackerConfig, store: SnapshotStore) -> Self {
        let excluded = std::iter::once(config.db_path.clone())
            .chain(SIDECAR_SUFFIXES.iter().map(|s| snapshot::sidecar(&config.db_path, s)))
            .collect();

        let file_tracker = FileTracker::new(config.root_path.clone())
            .with_ignore_patterns(config.ignore_patterns.clone())
            .with_excluded_files(excluded)
            .with_max_file_size(config.max_file_size)
            .with_follow_symlinks(config.follow_symlinks)
            .with_parallel_workers(config.parallel_workers);

        Self {
            config,
            store,
            engine: ReconciliationEngine::new(file_tracker),
        }
    }
}

/// Builder for configuring a [`Tracker`]
///
/// Options left unset keep their defaults on `init` and their persisted
/// values on `open`.
#[derive(Debug, Clone, Default)]
pub struct TrackerBuilder {
    ignore_patterns: Option<Vec<String>>,
    max_file_size: Option<u64>,
    parallel_workers: Option<usize>,
    follow_symlinks: Option<bool>,
    db_path: Option<PathBuf>,
    force: bool,
}

impl TrackerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set ignore patterns (gitignore syntax)
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = Some(patterns);
        self
    }

    /// Skip files larger than `size` bytes (0 = unlimited)
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = Some(size);
        self
    }

    /// Set the number of hashing threads
    pub fn parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = Some(workers);
        self
    }

    /// Follow symbolic links during the walk
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = Some(follow);
        self
    }

    /// Put the database somewhere other than `<root>/.btrack.db`
    pub fn db_path(mut self, path: PathBuf) -> Self {
        self.db_path = Some(path);
        self
    }

    /// Replace an existing database on `init`
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Create a new snapshot for `root_path`
    #[instrument(skip(self))]
    pub fn init(self, root_path: PathBuf) -> Result<Tracker> {
        check_root(&root_path)?;
        let db_path = self.resolve_db_path(&root_path);

        // Validate before anything on disk is replaced
        let mut config = TrackerConfig::new(root_path, db_path);
        self.apply_overrides(&mut config)?;

        if self.force {
            remove_database(&config.db_path)?;
        }

        let store = SnapshotStore::init(&config.db_path)?;
        store.save_config(&config)?;

        info!("Tracking {:?} with snapshot {:?}", config.root_path, config.db_path);
        Ok(Tracker::assemble(config, store))
    }

    /// Open the existing snapshot for `root_path`
    ///
    /// The configuration saved at init is loaded. The root and database
    /// location passed now take precedence, so a tree can be moved along
    /// with its snapshot.
    #[instrument(skip(self))]
    pub fn open(self, root_path: PathBuf) -> Result<Tracker> {
        check_root(&root_path)?;
        let db_path = self.resolve_db_path(&root_path);
        let store = SnapshotStore::open(&db_path)?;

        let mut config = match store.load_config()? {
            Some(saved) => {
                if saved.version != env!("CARGO_PKG_VERSION") {
                    debug!("Snapshot was written by btrack {}", saved.version);
                }
                TrackerConfig {
                    root_path: root_path.clone(),
                    db_path: db_path.clone(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    ..saved
                }
            }
            None => {
                warn!("No saved configuration in {:?}, using defaults", db_path);
                TrackerConfig::new(root_path, db_path)
            }
        };
        self.apply_overrides(&mut config)?;

        Ok(Tracker::assemble(config, store))
    }

    /// Open the snapshot if it exists, otherwise create it
    pub fn build(self, root_path: PathBuf) -> Result<Tracker> {
        if !self.force && self.resolve_db_path(&root_path).is_file() {
            self.open(root_path)
        } else {
            self.init(root_path)
        }
    }

    fn resolve_db_path(&self, root_path: &Path) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| Tracker::default_db_path(root_path))
    }

    fn apply_overrides(&self, config: &mut TrackerConfig) -> Result<()> {
        if let Some(patterns) = &self.ignore_patterns {
            config.ignore_patterns = patterns.clone();
        }
        if let Some(size) = self.max_file_size {
            config.max_file_size = size;
        }
        if let Some(follow) = self.follow_symlinks {
            config.follow_symlinks = follow;
        }
        if let Some(workers) = self.parallel_workers {
            if workers == 0 {
                return Err(BtrackError::InvalidConfiguration(
                    "parallel_workers must be at least 1".to_string(),
                ));
            }
            config.parallel_workers = workers;
        }
        Ok(())
    }
}

fn check_root(root_path: &Path) -> Result<()> {
    if root_path.is_dir() {
        Ok(())
    } else {
        Err(BtrackError::InvalidConfiguration(format!(
            "{} is not a directory",
            root_path.display()
        )))
    }
}

fn remove_database(db_path: &Path) -> Result<()> {
    let files = std::iter::once(db_path.to_path_buf())
        .chain(SIDECAR_SUFFIXES.iter().map(|s| snapshot::sidecar(db_path, s)));
    for file in files {
        if file.is_file() {
            fs::remove_file(&file)?;
            debug!("Removed {:?}", file);
        }
    }
    Ok(())
}
