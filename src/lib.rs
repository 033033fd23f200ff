//! # btrack - Bit-rot aware change tracking for file trees
//!
//! btrack keeps a snapshot of the content hash and modification time of every
//! file under a directory, and reports how the tree has changed since the
//! snapshot was last committed.
//!
//! ## Overview
//!
//! Each scan sorts every file into exactly one outcome:
//!
//! | path known? | content     | mtime     | outcome        |
//! |-------------|-------------|-----------|----------------|
//! | yes         | same        | same      | unchanged      |
//! | yes         | same        | different | `touched`      |
//! | yes         | different   | different | `modified`     |
//! | yes         | different   | same      | `deteriorated` |
//! | no          | matches an unclaimed record | any | `moved` (+ `touched` if mtime differs) |
//! | no          | no match    | any       | `created`      |
//!
//! Tracked paths that were not matched are `deleted`.
//!
//! `deteriorated` is the case btrack exists for: the bytes changed but the
//! timestamp did not, which ordinary edits never do. On an archive that is
//! not being written to, that points at failing storage.
//!
//! Scanning never writes. The result is a [`Delta`] that the caller can
//! inspect, print or serialize before committing it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use btrack::Tracker;
//! use std::path::PathBuf;
//!
//! # fn main() -> btrack::Result<()> {
//! let mut tracker = Tracker::init(PathBuf::from("./archive"))?;
//! let first = tracker.scan()?;
//! tracker.commit(&first)?;
//!
//! // Later
//! let delta = tracker.scan()?;
//! println!("{:?}", delta.summary());
//! if !delta.has_deterioration() {
//!     tracker.commit(&delta)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Lower-level API
//!
//! The facade only wires together pieces that can be used directly:
//!
//! ```rust,no_run
//! use btrack::{DeltaApplier, ReconciliationEngine, SnapshotStore};
//! use std::path::Path;
//!
//! # fn main() -> btrack::Result<()> {
//! let mut store = SnapshotStore::init(Path::new("/var/lib/btrack/archive.db"))?;
//! let engine = ReconciliationEngine::for_root("/srv/archive");
//! let delta = engine.generate_delta(&store)?;
//! DeltaApplier::apply(&delta, &mut store)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`tracker`]: `Tracker` facade and builder
//! - [`reconcile`]: delta generation
//! - [`applier`]: committing deltas
//! - [`snapshot`]: SQLite-backed snapshot store
//! - [`file_tracking`]: directory walking and parallel hashing
//! - [`hasher`]: SHA-256 content fingerprints
//! - [`mod_time`]: modification times at snapshot precision
//! - [`types`]: records, deltas and configuration
//! - [`error`]: error types and handling

pub mod applier;
pub mod error;
pub mod file_tracking;
pub mod hasher;
pub mod mod_time;
pub mod reconcile;
pub mod snapshot;
pub mod tracker;
pub mod types;
pub mod utils;

pub use applier::DeltaApplier;
pub use error::{BtrackError, Result};
pub use hasher::hash_file;
pub use mod_time::ModTime;
pub use reconcile::ReconciliationEngine;
pub use snapshot::SnapshotStore;
pub use tracker::{Tracker, TrackerBuilder};
pub use types::*;
