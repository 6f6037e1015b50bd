//! Lock record structures and utilities.

use crate::error::{Result, WardenError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Lock metadata stored in `<file>.lock-meta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Opaque token the holder must present to release the lock.
    pub lock_id: String,

    /// Canonical path of the locked file.
    pub file_path: PathBuf,

    pub owner_pid: u32,

    /// Owner of the lock (e.g., `user@HOST`).
    pub owner_user: String,

    /// Effective uid of the holder, where the platform has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_uid: Option<u32>,

    pub acquired_at: DateTime<Utc>,

    /// Staleness timeout chosen by the acquirer.
    pub stale_after_ms: u64,

    /// SHA-256 of the content at acquisition, when integrity checking was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// Snapshot taken at acquisition, removed on release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
}

/// Outcome of reading a metadata file.
#[derive(Debug)]
pub(crate) enum RecordState {
    Missing,
    Corrupt(String),
    Valid(LockRecord),
}

impl LockRecord {
    /// Create a new record for the current process with the current timestamp.
    pub fn new(lock_id: String, file_path: PathBuf, stale_after_ms: u64) -> Self {
        Self {
            lock_id,
            file_path,
            owner_pid: std::process::id(),
            owner_user: get_owner_string(),
            owner_uid: current_uid(),
            acquired_at: Utc::now(),
            stale_after_ms,
            checksum: None,
            backup_path: None,
        }
    }

    /// Parse a record from a metadata file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| WardenError::io("read", path, e))?;

        serde_json::from_str(&content).map_err(|e| {
            WardenError::Filesystem(format!(
                "failed to parse lock metadata '{}': {}",
                path.display(),
                e
            ))
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            WardenError::Filesystem(format!("failed to serialize lock metadata: {}", e))
        })
    }

    /// Calculate the age of the lock.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.acquired_at)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        format_age(self.age())
    }

    /// Whether the record has outlived its own staleness timeout.
    pub fn is_stale(&self) -> bool {
        // Records written by other processes may carry any u64; compare unsigned.
        let age_ms = u64::try_from(self.age().num_milliseconds()).unwrap_or(0);
        age_ms > self.stale_after_ms
    }

    /// Owner description used in error messages.
    pub fn owner_description(&self) -> String {
        format!("{} (pid {})", self.owner_user, self.owner_pid)
    }
}

/// Read a metadata file without failing on missing or unparsable content.
pub(crate) fn load_record(path: &Path) -> Result<RecordState> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RecordState::Missing),
        Err(e) => return Err(WardenError::io("read", path, e)),
    };

    Ok(match serde_json::from_str(&content) {
        Ok(record) => RecordState::Valid(record),
        Err(e) => RecordState::Corrupt(e.to_string()),
    })
}

/// Format a duration as `3s`, `4m`, `2h 5m` or `1d 3h`.
pub(crate) fn format_age(age: Duration) -> String {
    let seconds = age.num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

/// Get the owner string for lock metadata.
pub(crate) fn get_owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

#[cfg(unix)]
fn current_uid() -> Option<u32> {
    Some(nix::unistd::geteuid().as_raw())
}

#[cfg(not(unix))]
fn current_uid() -> Option<u32> {
    None
}
