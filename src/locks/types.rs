//! Lock options, outcomes and artifact naming.

use crate::config::Config;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Suffix of the presence marker whose exclusive creation is the lock.
pub const MARKER_SUFFIX: &str = ".lock";

/// Suffix of the JSON lock record.
pub const METADATA_SUFFIX: &str = ".lock-meta";

/// Options for [`super::AtomicFileManager::acquire_lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// Age after which a lock may be reclaimed by any caller.
    pub stale_after: Duration,

    /// How long to keep retrying while another holder owns the lock.
    pub wait: Duration,

    /// Sleep between retries.
    pub poll: Duration,

    /// Capture a content checksum into the lock record.
    pub check_integrity: bool,

    /// Snapshot the file at acquisition; the snapshot is removed on release.
    pub backup: bool,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl LockOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stale_after: Duration::from_millis(config.lock_stale_ms),
            wait: Duration::from_millis(config.lock_wait_ms),
            poll: Duration::from_millis(config.lock_poll_ms),
            check_integrity: config.verify_integrity,
            backup: false,
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_integrity(mut self, check_integrity: bool) -> Self {
        self.check_integrity = check_integrity;
        self
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Compare content against the checksum in the active lock record.
    pub verify_integrity: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Compare current content against the lock record before writing, then
    /// refresh the record's checksum afterwards.
    pub verify_integrity: bool,

    /// Snapshot the original before replacing it.
    pub backup: bool,

    /// Keep the snapshot after a successful write.
    pub keep_backup: bool,
}

/// Result of a successful atomic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub bytes_written: usize,
    /// Backup left on disk (only with `keep_backup`).
    pub backup: Option<PathBuf>,
    /// Checksum written into the lock record, if one was refreshed.
    pub checksum: Option<String>,
}

/// A lock owned by this manager instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldLock {
    pub path: PathBuf,
    pub lock_id: String,
}

impl fmt::Display for HeldLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.lock_id)
    }
}

pub fn marker_path(target: &Path) -> PathBuf {
    with_suffix(target, MARKER_SUFFIX)
}

pub fn metadata_path(target: &Path) -> PathBuf {
    with_suffix(target, METADATA_SUFFIX)
}

pub(crate) fn tombstone_path(marker: &Path) -> PathBuf {
    let id = uuid::Uuid::new_v4().simple().to_string();
    with_suffix(marker, &format!(".stale-{}", &id[..12]))
}

/// Held briefly by whichever process is reclaiming a stale marker.
pub(crate) fn reclaim_guard_path(marker: &Path) -> PathBuf {
    with_suffix(marker, ".reclaim")
}

pub(crate) fn backup_path(target: &Path) -> PathBuf {
    let id = uuid::Uuid::new_v4().simple().to_string();
    with_suffix(target, &format!(".{}.bak", &id[..12]))
}

fn with_suffix(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target
        .file_name()
        .map(OsStr::to_os_string)
        .unwrap_or_default();
    name.push(suffix);
    target.with_file_name(name)
}
