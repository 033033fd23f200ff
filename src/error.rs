//! Error types for btrack
//!
//! Every fallible operation in the crate returns [`Result<T>`], which carries a
//! [`BtrackError`]. Errors fall into three groups:
//!
//! - **File errors** ([`BtrackError::Io`], [`BtrackError::PathConversion`]):
//!   during a scan these are caught per file and reported as skipped entries,
//!   everywhere else they propagate.
//! - **Store errors** ([`BtrackError::Sqlite`], [`BtrackError::Storage`],
//!   [`BtrackError::SchemaMismatch`], [`BtrackError::NotInitialized`]): fatal,
//!   the operation is aborted and the store keeps its previous state.
//! - **Setup errors** ([`BtrackError::AlreadyInitialized`],
//!   [`BtrackError::InvalidPattern`], [`BtrackError::InvalidConfiguration`]).

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the btrack library
pub type Result<T> = std::result::Result<T, BtrackError>;

/// Main error type for all btrack operations
#[derive(Debug, Error)]
pub enum BtrackError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors reported by the SQLite engine
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Store unreachable or in an unexpected state
    #[error("Storage error: {0}")]
    Storage(String),

    /// `init` was called on a location that already holds a store
    #[error("Snapshot store already initialized at {0:?}")]
    AlreadyInitialized(PathBuf),

    /// `open` was called on a location without a store
    #[error("Snapshot store not initialized at {0:?}")]
    NotInitialized(PathBuf),

    /// The store was written by an incompatible schema version
    #[error("Schema mismatch - expected version {expected}, found {found}")]
    SchemaMismatch {
        /// Schema version this build understands
        expected: u32,
        /// Schema version recorded in the store
        found: String,
    },

    /// A persisted timestamp could not be parsed
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Pattern parsing error
    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(String),

    /// Path cannot be represented as UTF-8 text
    #[error("Path conversion error: {0:?}")]
    PathConversion(std::ffi::OsString),

    /// Walked path does not live under the tree root
    #[error("Path {0:?} is outside the tracked root")]
    PathOutsideRoot(PathBuf),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BtrackError {
    /// Create a storage error with a custom message
    pub fn storage(msg: impl Into<String>) -> Self {
        BtrackError::Storage(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        BtrackError::Internal(msg.into())
    }

    /// Check if this error is recoverable
    ///
    /// Per-file errors and a repeated `init` can be handled by the caller.
    /// Store-level errors cannot.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BtrackError::Io(_)
                | BtrackError::PathConversion(_)
                | BtrackError::AlreadyInitialized(_)
        )
    }

    /// Check if this error comes from the snapshot store
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            BtrackError::Sqlite(_)
                | BtrackError::Storage(_)
                | BtrackError::SchemaMismatch { .. }
                | BtrackError::NotInitialized(_)
                | BtrackError::InvalidTimestamp(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            BtrackError::AlreadyInitialized(path) => {
                format!(
                    "A snapshot already exists at {:?}. Use 'init --force' to start over.",
                    path
                )
            }
            BtrackError::NotInitialized(path) => {
                format!("No snapshot found at {:?}. Run 'btrack init' first.", path)
            }
            BtrackError::SchemaMismatch { expected, found } => {
                format!(
                    "The snapshot was written with schema version {} but this build reads version {}.",
                    found, expected
                )
            }
            _ => self.to_string(),
        }
    }
}
