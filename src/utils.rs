//! Utility functions for btrack
//!
//! Path handling and file metadata helpers shared by the walker, the
//! reconciliation engine and the binary.
//!
//! ## Snapshot keys
//!
//! Snapshot rows are keyed by the file's path relative to the tracked root,
//! with components joined by `/` on every platform:
//!
//! ```rust,ignore
//! use crate::utils::path_key;
//! use std::path::Path;
//!
//! let key = path_key(Path::new("/data/photos/2024/a.jpg"), Path::new("/data"))?;
//! assert_eq!(key, "photos/2024/a.jpg");
//! ```
//!
//! Keys must be valid UTF-8 because the snapshot stores them as `TEXT`. Files
//! whose names are not UTF-8 are reported as skipped instead of being stored
//! under a lossy name that would never match again.

use crate::error::{BtrackError, Result};
use crate::mod_time::ModTime;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Metadata captured for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,
    /// Last modification time at snapshot precision
    pub modified: ModTime,
    /// Whether the path is a regular file (after following links)
    pub is_file: bool,
}

/// Read the metadata of a file, following symbolic links
pub fn get_file_metadata(path: &Path) -> Result<FileMetadata> {
    let metadata = fs::metadata(path)?;
    Ok(FileMetadata {
        size: metadata.len(),
        modified: ModTime::from_system_time(metadata.modified()?),
        is_file: metadata.is_file(),
    })
}

/// Make a path relative to a base path
///
/// Tries a lexical strip first. When that fails (for instance `base` is
/// relative and `path` absolute) both sides are canonicalized.
///
/// # Errors
///
/// - [`BtrackError::PathOutsideRoot`] if `path` is not under `base`
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let canonical_path = path.canonicalize()?;
    let canonical_base = base.canonicalize()?;
    canonical_path
        .strip_prefix(&canonical_base)
        .map(Path::to_path_buf)
        .map_err(|_| BtrackError::PathOutsideRoot(path.to_path_buf()))
}

/// Snapshot key of `path` under `root`
///
/// # Errors
///
/// - [`BtrackError::PathOutsideRoot`] if `path` is not under `root`, or
///   the relative path contains `..` or is empty
/// - [`BtrackError::PathConversion`] if a component is not valid UTF-8
pub fn path_key(path: &Path, root: &Path) -> Result<String> {
    let relative = make_relative(path, root)?;
    let mut parts = Vec::new();

    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let text = part
                    .to_str()
                    .ok_or_else(|| BtrackError::PathConversion(part.to_os_string()))?;
                parts.push(text);
            }
            Component::CurDir => {}
            _ => return Err(BtrackError::PathOutsideRoot(path.to_path_buf())),
        }
    }

    if parts.is_empty() {
        return Err(BtrackError::PathOutsideRoot(path.to_path_buf()));
    }
    Ok(parts.join("/"))
}

/// Lossy snapshot key, for reporting paths that could not be keyed
pub fn display_key(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check whether `key` is `prefix` itself or lies underneath it
pub fn key_is_within(key: &str, prefix: &str) -> bool {
    key == prefix
        || (key.len() > prefix.len()
            && key.starts_with(prefix)
            && key.as_bytes()[prefix.len()] == b'/')
}

/// Format a byte count for humans
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}
