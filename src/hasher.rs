//! Content fingerprints
//!
//! A fingerprint is the SHA-256 digest of a file's bytes, rendered as 64
//! lowercase hex characters. Files are always read as raw bytes through a
//! large reusable buffer so that multi-gigabyte files cost few syscalls.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::Path;
use tracing::trace;

/// Hex-encoded SHA-256 digest
pub type Fingerprint = String;

/// Read buffer size for [`hash_file`] (16 MiB)
pub const HASH_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Length of a hex-encoded fingerprint
pub const FINGERPRINT_LEN: usize = 64;

/// Hash a file's content using SHA-256
///
/// The file is streamed through a [`HASH_BUFFER_SIZE`] buffer. Reads that are
/// interrupted by a signal are retried, any other read failure aborts the hash.
///
/// # Errors
///
/// - [`BtrackError::Io`](crate::BtrackError::Io) if the file cannot be opened
///   or a read fails mid-stream
pub fn hash_file(path: &Path) -> Result<Fingerprint> {
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    hash_file_with_buffer(path, &mut buffer)
}

/// Hash a file reusing a caller-provided buffer
///
/// Worker threads hashing many files keep one buffer each instead of
/// allocating 16 MiB per file.
///
/// # Errors
///
/// - [`BtrackError::Io`](crate::BtrackError::Io) with
///   [`ErrorKind::InvalidInput`] if `buffer` is empty, since every read would
///   then look like end of file
/// - [`BtrackError::Io`](crate::BtrackError::Io) if the file cannot be read
pub fn hash_file_with_buffer(path: &Path, buffer: &mut [u8]) -> Result<Fingerprint> {
    if buffer.is_empty() {
        return Err(io::Error::new(ErrorKind::InvalidInput, "hash buffer must not be empty").into());
    }

    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut total = 0u64;

    loop {
        let bytes_read = match file.read(buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }

    trace!("Hashed {:?} ({} bytes)", path, total);
    Ok(hex::encode(hasher.finalize()))
}

/// Hash in-memory data using SHA-256
pub fn hash_data(data: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
