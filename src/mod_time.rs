//! Modification timestamps at a fixed one-second precision
//!
//! Filesystems report modification times with very different resolutions
//! (nanoseconds on ext4, 100ns on NTFS, 2s on FAT). The snapshot persists
//! timestamps as text in the canonical form `YYYY-MM-DD HH:MM:SS` (UTC), so
//! every timestamp is truncated to whole seconds the moment it is captured.
//! Comparisons always happen between [`ModTime`] values, never between
//! formatted strings.

use crate::error::{BtrackError, Result};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Canonical text form used in the snapshot database
pub const MOD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A UTC timestamp truncated to whole seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModTime(DateTime<Utc>);

impl ModTime {
    /// Truncate a timestamp to the snapshot precision
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.trunc_subsecs(0))
    }

    /// Capture a filesystem timestamp
    pub fn from_system_time(time: SystemTime) -> Self {
        Self::from_datetime(DateTime::<Utc>::from(time))
    }

    /// Build from seconds since the Unix epoch
    pub fn from_unix_seconds(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(Self)
    }

    /// Current time at snapshot precision
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Parse the canonical text form
    pub fn parse(text: &str) -> Result<Self> {
        NaiveDateTime::parse_from_str(text, MOD_TIME_FORMAT)
            .map(|naive| Self(naive.and_utc()))
            .map_err(|e| BtrackError::InvalidTimestamp(format!("{:?}: {}", text, e)))
    }

    /// Seconds since the Unix epoch
    pub fn unix_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    /// Underlying UTC timestamp
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for ModTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(MOD_TIME_FORMAT))
    }
}

impl TryFrom<String> for ModTime {
    type Error = BtrackError;

    fn try_from(value: String) -> Result<Self> {
        ModTime::parse(&value)
    }
}

impl From<ModTime> for String {
    fn from(value: ModTime) -> Self {
        value.to_string()
    }
}

impl ToSql for ModTime {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for ModTime {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        ModTime::parse(text).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
