//! Persistent snapshot of tracked files
//!
//! The snapshot is a single SQLite database holding one row per tracked path.
//! The `btrack` table is the on-disk format shared with other implementations
//! and must not change shape:
//!
//! ```text
//! btrack
//! ├── path           TEXT PRIMARY KEY   relative, '/'-separated
//! ├── hash           TEXT               SHA-256, 64 hex chars   (indexed)
//! ├── file_mod_time  TEXT               "YYYY-MM-DD HH:MM:SS" UTC
//! └── hash_mod_time  TEXT               when the hash was last recorded
//!
//! meta
//! ├── schema_version
//! ├── created_at
//! └── config         JSON TrackerConfig
//! ```
//!
//! Reads are plain queries. Every write that changes tracked state goes
//! through [`SnapshotStore::apply_delta`] or [`SnapshotStore::rebaseline`],
//! each of which runs in one transaction: a crash or an error part way
//! through leaves the store exactly as it was before the call.

use crate::error::{BtrackError, Result};
use crate::mod_time::ModTime;
use crate::types::{ApplyStats, Delta, FileRecord, ObservedFile, TrackerConfig};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, Transaction};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Schema version written to the `meta` table
pub const SCHEMA_VERSION: u32 = 1;

/// SQLite companion files that live next to the database
pub const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

const CREATE_SCHEMA_SQL: &str = "
CREATE TABLE btrack (
    path TEXT PRIMARY KEY,
    hash TEXT,
    file_mod_time TEXT,
    hash_mod_time TEXT
);

CREATE INDEX btrack_hash_idx ON btrack(hash);

CREATE TABLE meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// SQLite-backed snapshot store
///
/// A store is owned by one reconciliation run at a time. It is `Send` so it
/// can move to a worker thread, but it is never shared.
///
/// # Example
///
/// ```rust
/// use btrack::SnapshotStore;
///
/// # fn main() -> btrack::Result<()> {
/// let store = SnapshotStore::open_in_memory()?;
/// assert_eq!(store.record_count()?, 0);
/// assert!(store.record_by_path("missing.txt")?.is_none());
/// # Ok(())
/// # }
/// ```
pub struct SnapshotStore {
    conn: Connection,
    location: Option<PathBuf>,
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("location", &self.location)
            .finish()
    }
}

impl SnapshotStore {
    /// Create a new store at `location`
    ///
    /// The parent directory is created if needed. An existing empty file is
    /// accepted (temporary files are often pre-created).
    ///
    /// # Errors
    ///
    /// - [`BtrackError::AlreadyInitialized`] if the database or any of its
    ///   sidecar files exists with content
    /// - [`BtrackError::Sqlite`] / [`BtrackError::Io`] if creation fails
    pub fn init(location: &Path) -> Result<Self> {
        let leftover = has_content(location)
            || SIDECAR_SUFFIXES.iter().any(|suffix| has_content(&sidecar(location, suffix)));
        if leftover {
            return Err(BtrackError::AlreadyInitialized(location.to_path_buf()));
        }
        if let Some(parent) = location.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            location,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_pragmas(&conn, true)?;
        create_schema(&conn)?;

        info!("Initialized snapshot store at {:?}", location);
        Ok(Self {
            conn,
            location: Some(location.to_path_buf()),
        })
    }

    /// Open an existing store at `location`
    ///
    /// # Errors
    ///
    /// - [`BtrackError::NotInitialized`] if there is no store at `location`
    /// - [`BtrackError::SchemaMismatch`] if the store uses another schema version
    pub fn open(location: &Path) -> Result<Self> {
        if !location.is_file() {
            return Err(BtrackError::NotInitialized(location.to_path_buf()));
        }

        let conn = Connection::open_with_flags(
            location,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_pragmas(&conn, true)?;

        let store = Self {
            conn,
            location: Some(location.to_path_buf()),
        };
        store.check_schema()?;
        debug!("Opened snapshot store at {:?}", location);
        Ok(store)
    }

    /// Create an initialized store that lives only in memory
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn, false)?;
        create_schema(&conn)?;
        Ok(Self {
            conn,
            location: None,
        })
    }

    /// Database file location (`None` for in-memory stores)
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Every tracked path
    pub fn all_paths(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare_cached("SELECT path FROM btrack")?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(paths)
    }

    /// Look up the record for one path
    pub fn record_by_path(&self, path: &str) -> Result<Option<FileRecord>> {
        let record = self
            .conn
            .prepare_cached(
                "SELECT path, hash, file_mod_time, hash_mod_time FROM btrack WHERE path = ?1",
            )?
            .query_row(params![path], record_from_row)
            .optional()?;
        Ok(record)
    }

    /// All records with the given content hash, ordered by path
    ///
    /// The ordering is what makes move detection repeatable: when several
    /// records share a hash, the first unmatched one in path order wins.
    pub fn records_by_hash(&self, hash: &str) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT path, hash, file_mod_time, hash_mod_time FROM btrack
             WHERE hash = ?1 ORDER BY path",
        )?;
        let records = stmt
            .query_map(params![hash], record_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// All records, ordered by path
    pub fn all_records(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT path, hash, file_mod_time, hash_mod_time FROM btrack ORDER BY path",
        )?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Number of tracked paths
    pub fn record_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM btrack", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Insert one record directly
    ///
    /// Seeds a store from an external baseline (an imported manifest, a test
    /// fixture). Regular scans go through [`SnapshotStore::apply_delta`].
    pub fn insert_record(&mut self, record: &FileRecord) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO btrack (path, hash, file_mod_time, hash_mod_time)
                 VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![
                record.path,
                record.content_hash,
                record.file_mod_time,
                record.hash_recorded_at,
            ])?;
        Ok(())
    }

    /// Apply every mutation implied by `delta` in one transaction
    ///
    /// Order inside the transaction: renames for `moved` (in delta order),
    /// deletes, inserts for `created`, full updates for `modified`, mtime-only
    /// updates for `touched`. `deteriorated` entries are left alone.
    ///
    /// # Errors
    ///
    /// Any failure rolls the whole transaction back. A rename or update that
    /// does not hit exactly one row is reported as [`BtrackError::Storage`],
    /// since it means the delta was generated against a different snapshot.
    pub fn apply_delta(&mut self, delta: &Delta, applied_at: ModTime) -> Result<ApplyStats> {
        let tx = self.conn.transaction()?;
        let mut stats = ApplyStats::default();

        {
            let mut rename = tx.prepare_cached("UPDATE btrack SET path = ?2 WHERE path = ?1")?;
            for movement in &delta.moved {
                let rows = rename.execute(params![movement.old_path, movement.new_path])?;
                expect_one_row(rows, "rename", &movement.old_path)?;
                stats.renamed += 1;
            }

            let mut delete = tx.prepare_cached("DELETE FROM btrack WHERE path = ?1")?;
            for path in &delta.deleted {
                let rows = delete.execute(params![path])?;
                expect_one_row(rows, "delete", path)?;
                stats.deleted += 1;
            }

            let mut insert = tx.prepare_cached(
                "INSERT INTO btrack (path, hash, file_mod_time, hash_mod_time)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for file in &delta.created {
                insert.execute(params![file.path, file.content_hash, file.file_mod_time, applied_at])?;
                stats.inserted += 1;
            }
        }

        stats.rehashed = rehash(&tx, &delta.modified, applied_at)?;

        {
            let mut retime =
                tx.prepare_cached("UPDATE btrack SET file_mod_time = ?2 WHERE path = ?1")?;
            for file in &delta.touched {
                let rows = retime.execute(params![file.path, file.file_mod_time])?;
                expect_one_row(rows, "touch", &file.path)?;
                stats.retimed += 1;
            }
        }

        tx.commit()?;
        debug!("Applied delta: {:?}", stats);
        Ok(stats)
    }

    /// Overwrite hash and mtime for `files` in one transaction
    ///
    /// Accepts the current content of each file as its new baseline. Returns
    /// the number of records updated.
    pub fn rebaseline(&mut self, files: &[ObservedFile], applied_at: ModTime) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let updated = rehash(&tx, files, applied_at)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Persist the tracker configuration
    pub fn save_config(&self, config: &TrackerConfig) -> Result<()> {
        let json = serde_json::to_string(config)?;
        self.set_meta("config", &json)
    }

    /// Load the persisted tracker configuration, if any
    pub fn load_config(&self) -> Result<Option<TrackerConfig>> {
        match self.meta_value("config")? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Read a value from the `meta` table
    pub fn meta_value(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .prepare_cached("SELECT value FROM meta WHERE key = ?1")?
            .query_row(params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .prepare_cached("INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)")?
            .execute(params![key, value])?;
        Ok(())
    }

    fn check_schema(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('btrack', 'meta')",
            [],
            |row| row.get(0),
        )?;
        if tables != 2 {
            return Err(BtrackError::NotInitialized(
                self.location.clone().unwrap_or_default(),
            ));
        }

        match self.meta_value("schema_version")? {
            Some(found) if found == SCHEMA_VERSION.to_string() => Ok(()),
            Some(found) => Err(BtrackError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found,
            }),
            None => Err(BtrackError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found: "<missing>".to_string(),
            }),
        }
    }
}

/// Path of a SQLite companion file (`-wal`, `-shm`, `-journal`)
pub fn sidecar(location: &Path, suffix: &str) -> PathBuf {
    let mut name = location.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn has_content(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn apply_pragmas(conn: &Connection, on_disk: bool) -> Result<()> {
    conn.execute_batch(
        "PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    if on_disk {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!("Requested WAL journal mode but got '{}'", mode);
        }
    }
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<()> {
    let already: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'btrack'",
        [],
        |row| row.get(0),
    )?;
    if already > 0 {
        return Err(BtrackError::storage("btrack table already exists"));
    }

    conn.execute_batch(&format!("BEGIN;\n{}\nCOMMIT;", CREATE_SCHEMA_SQL))?;
    conn.execute(
        "INSERT INTO meta (key, value) VALUES ('schema_version', ?1), ('created_at', ?2)",
        params![SCHEMA_VERSION.to_string(), ModTime::now()],
    )?;
    Ok(())
}

fn rehash(tx: &Transaction<'_>, files: &[ObservedFile], applied_at: ModTime) -> Result<usize> {
    let mut update = tx.prepare_cached(
        "UPDATE btrack SET hash = ?2, file_mod_time = ?3, hash_mod_time = ?4 WHERE path = ?1",
    )?;
    for file in files {
        let rows = update.execute(params![file.path, file.content_hash, file.file_mod_time, applied_at])?;
        expect_one_row(rows, "rehash", &file.path)?;
    }
    Ok(files.len())
}

fn expect_one_row(rows: usize, operation: &str, path: &str) -> Result<()> {
    if rows == 1 {
        Ok(())
    } else {
        Err(BtrackError::storage(format!(
            "{} of {:?} touched {} rows; delta does not match this snapshot",
            operation, path, rows
        )))
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        path: row.get(0)?,
        content_hash: row.get(1)?,
        file_mod_time: row.get(2)?,
        hash_recorded_at: row.get(3)?,
    })
}
