//! Lock acquisition, release, integrity-checked IO and backups.

use super::guard::LockGuard;
use super::record::{LockRecord, RecordState, format_age, load_record};
use super::types::{
    HeldLock, LockOptions, ReadOptions, WriteOptions, WriteOutcome, backup_path, marker_path,
    metadata_path, reclaim_guard_path, tombstone_path,
};
use crate::config::Config;
use crate::error::{Result, WardenError};
use crate::fs::{atomic_write, atomic_write_str, sha256_hex};
use crate::paths::PathValidator;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

/// Result of a single acquisition attempt.
enum Attempt {
    Acquired(String),
    Held(WardenError),
}

/// What the current marker for a path represents.
enum Existing {
    /// The marker vanished between the failed create and the inspection.
    Gone,
    Active { owner: String, age: String },
    Stale { lock_id: String },
}

/// Cross-process file locking with integrity-checked atomic IO.
///
/// Mutual exclusion is the exclusive creation of `<file>.lock`; the JSON
/// record lives next to it in `<file>.lock-meta`. Every public operation
/// validates its path first, so a manager never touches a path its
/// [`PathValidator`] would reject.
#[derive(Debug)]
pub struct AtomicFileManager {
    validator: Arc<PathValidator>,
    defaults: LockOptions,
    held: Mutex<HashMap<PathBuf, String>>,
}

impl AtomicFileManager {
    pub fn new(validator: Arc<PathValidator>) -> Self {
        Self::with_defaults(validator, LockOptions::default())
    }

    pub fn with_defaults(validator: Arc<PathValidator>, defaults: LockOptions) -> Self {
        Self {
            validator,
            defaults,
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(validator: Arc<PathValidator>, config: &Config) -> Self {
        Self::with_defaults(validator, LockOptions::from_config(config))
    }

    /// Options used by callers that have no reason to override them.
    pub fn defaults(&self) -> &LockOptions {
        &self.defaults
    }

    pub fn validator(&self) -> &PathValidator {
        &self.validator
    }

    /// Acquire the lock on `path`, waiting up to `options.wait` for a live holder.
    ///
    /// # Errors
    ///
    /// * `AlreadyLocked` - a non-stale holder kept the lock for the whole wait
    /// * `NotFound` - integrity or backup was requested and the file is missing
    /// * any path validation error
    pub fn acquire_lock(&self, path: &Path, options: &LockOptions) -> Result<String> {
        let target = self.validator.validate_path(path)?;
        // An unrepresentable deadline means waiting without limit.
        let deadline = Instant::now().checked_add(options.wait);

        loop {
            match self.try_acquire(&target, options)? {
                Attempt::Acquired(lock_id) => return Ok(lock_id),
                Attempt::Held(err) => {
                    let now = Instant::now();
                    let pause = match deadline {
                        Some(deadline) if now >= deadline => return Err(err),
                        Some(deadline) => options.poll.min(deadline - now),
                        None => options.poll,
                    };
                    thread::sleep(pause);
                }
            }
        }
    }

    /// Acquire the lock and wrap it in a guard that releases on drop.
    pub fn acquire_guard(&self, path: &Path, options: &LockOptions) -> Result<LockGuard<'_>> {
        let target = self.validator.validate_path(path)?;
        let lock_id = self.acquire_lock(&target, options)?;
        Ok(LockGuard::new(self, target, lock_id))
    }

    /// Release a lock. `lock_id` must match the stored marker exactly.
    ///
    /// # Errors
    ///
    /// * `NotLocked` - no marker exists
    /// * `InvalidLockId` - the marker or record belongs to another holder
    pub fn release_lock(&self, path: &Path, lock_id: &str) -> Result<()> {
        let target = self.validator.validate_path(path)?;
        self.release_canonical(&target, lock_id)
    }

    pub(super) fn release_canonical(&self, target: &Path, lock_id: &str) -> Result<()> {
        let marker = marker_path(target);
        let metadata = metadata_path(target);

        let current = match fs::read_to_string(&marker) {
            Ok(content) => content.trim().to_string(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.forget(target, lock_id);
                return Err(WardenError::NotLocked {
                    path: target.to_path_buf(),
                });
            }
            Err(e) => return Err(WardenError::io("read lock marker", &marker, e)),
        };
        if current != lock_id {
            self.forget(target, lock_id);
            return Err(WardenError::InvalidLockId {
                path: target.to_path_buf(),
            });
        }

        let record = match load_record(&metadata)? {
            RecordState::Valid(record) if record.lock_id != lock_id => {
                return Err(WardenError::InvalidLockId {
                    path: target.to_path_buf(),
                });
            }
            RecordState::Valid(record) => Some(record),
            RecordState::Missing | RecordState::Corrupt(_) => None,
        };

        if let Some(backup) = record.and_then(|r| r.backup_path) {
            remove_if_present(&backup)?;
        }

        // Marker goes last: a crash before this point leaves the lock held.
        remove_if_present(&metadata)?;
        remove_if_present(&marker)?;
        self.forget(target, lock_id);

        debug!(path = %target.display(), lock_id, "released lock");
        Ok(())
    }

    /// Remove a lock regardless of owner. Returns the removed record when readable.
    ///
    /// This is the explicit repair path for crashed holders and corrupt metadata.
    pub fn force_release_lock(&self, path: &Path) -> Result<Option<LockRecord>> {
        let target = self.validator.validate_path(path)?;
        let marker = marker_path(&target);
        let metadata = metadata_path(&target);

        let record = match load_record(&metadata)? {
            RecordState::Valid(record) => Some(record),
            RecordState::Corrupt(reason) => {
                warn!(path = %target.display(), %reason, "discarding corrupt lock metadata");
                None
            }
            RecordState::Missing => None,
        };

        let removed_metadata = remove_if_present(&metadata)?;
        let removed_marker = remove_if_present(&marker)?;
        if !removed_metadata && !removed_marker {
            return Err(WardenError::NotLocked { path: target });
        }

        if let Some(backup) = record.as_ref().and_then(|r| r.backup_path.as_ref()) {
            remove_if_present(backup)?;
        }

        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&target);

        warn!(
            path = %target.display(),
            owner = record.as_ref().map(|r| r.owner_user.as_str()).unwrap_or("unknown"),
            "force-released lock"
        );
        Ok(record)
    }

    /// Whether a valid, non-stale lock is currently held on `path`.
    ///
    /// A marker without metadata counts as held while the marker itself is
    /// fresh (an acquisition in progress). Corrupt metadata counts as unlocked.
    pub fn is_file_locked(&self, path: &Path) -> Result<bool> {
        let target = self.validator.validate_path(path)?;
        let marker = marker_path(&target);

        let Some(marker_id) = read_marker(&marker)? else {
            return Ok(false);
        };

        Ok(match load_record(&metadata_path(&target))? {
            RecordState::Valid(record) => record.lock_id == marker_id && !record.is_stale(),
            RecordState::Missing => {
                marker_age(&marker).is_some_and(|age| age <= self.defaults.stale_after)
            }
            RecordState::Corrupt(_) => false,
        })
    }

    /// The record of the lock currently held on `path`, if it is readable.
    ///
    /// Stale records are still returned; check [`LockRecord::is_stale`].
    pub fn get_lock_info(&self, path: &Path) -> Result<Option<LockRecord>> {
        let target = self.validator.validate_path(path)?;

        let Some(marker_id) = read_marker(&marker_path(&target))? else {
            return Ok(None);
        };

        Ok(match load_record(&metadata_path(&target))? {
            RecordState::Valid(record) if record.lock_id == marker_id => Some(record),
            _ => None,
        })
    }

    /// Atomically replace the content of `path`.
    ///
    /// With `backup`, the original is snapshotted first and restored if the
    /// write fails. With `verify_integrity`, the current content must match the
    /// lock record's checksum, and the checksum is refreshed afterwards.
    pub fn atomic_write(
        &self,
        path: &Path,
        data: &[u8],
        options: &WriteOptions,
    ) -> Result<WriteOutcome> {
        let target = self.validator.validate_path(path)?;

        if options.verify_integrity {
            self.verify_integrity(&target)?;
        }

        let backup = if options.backup && target.exists() {
            Some(snapshot(&target)?)
        } else {
            None
        };

        write_restoring(&target, backup.as_deref(), || atomic_write(&target, data))?;

        let checksum = if options.verify_integrity {
            self.refresh_checksum(&target, data)?
        } else {
            None
        };

        let backup = match backup {
            Some(backup) if !options.keep_backup => {
                remove_if_present(&backup)?;
                None
            }
            other => other,
        };

        debug!(path = %target.display(), bytes = data.len(), "atomic write complete");
        Ok(WriteOutcome {
            path: target,
            bytes_written: data.len(),
            backup,
            checksum,
        })
    }

    /// Read the content of `path`, optionally checking it against the lock record.
    pub fn atomic_read(&self, path: &Path, options: &ReadOptions) -> Result<Vec<u8>> {
        let target = self.validator.validate_path(path)?;
        let content = fs::read(&target).map_err(|e| WardenError::io("read", &target, e))?;

        if options.verify_integrity
            && let Some(expected) = self.expected_checksum(&target)?
            && sha256_hex(&content) != expected
        {
            return Err(WardenError::IntegrityViolation { path: target });
        }

        Ok(content)
    }

    /// Restore `path` from a backup produced by [`Self::atomic_write`], then
    /// remove the backup.
    pub fn restore_backup(&self, path: &Path, backup: &Path) -> Result<()> {
        let target = self.validator.validate_path(path)?;
        let backup = self.validator.validate_path(backup)?;
        restore_from(&backup, &target)?;
        remove_if_present(&backup)?;
        info!(path = %target.display(), "restored from backup");
        Ok(())
    }

    /// Locks currently owned by this manager instance.
    pub fn list_held(&self) -> Vec<HeldLock> {
        let mut held: Vec<HeldLock> = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(path, lock_id)| HeldLock {
                path: path.clone(),
                lock_id: lock_id.clone(),
            })
            .collect();
        held.sort_by(|a, b| a.path.cmp(&b.path));
        held
    }

    /// Release every lock this instance holds. Returns how many were released.
    ///
    /// Locks reclaimed by someone else in the meantime are dropped silently.
    pub fn cleanup(&self) -> Result<usize> {
        let mut released = 0;
        let mut first_error = None;

        for lock in self.list_held() {
            match self.release_canonical(&lock.path, &lock.lock_id) {
                Ok(()) => released += 1,
                Err(WardenError::NotLocked { .. } | WardenError::InvalidLockId { .. }) => {
                    debug!(path = %lock.path.display(), "lock already gone during cleanup");
                }
                Err(e) => {
                    warn!(
                        path = %lock.path.display(),
                        error = %e,
                        "cleanup failed to release lock"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(released),
        }
    }

    fn try_acquire(&self, target: &Path, options: &LockOptions) -> Result<Attempt> {
        if let Some(lock_id) = self.create_marker(target, options)? {
            return Ok(Attempt::Acquired(lock_id));
        }

        match self.inspect_existing(target, options.stale_after)? {
            Existing::Gone => {}
            Existing::Active { owner, age } => {
                return Ok(Attempt::Held(WardenError::AlreadyLocked {
                    path: target.to_path_buf(),
                    owner,
                    age,
                }));
            }
            Existing::Stale { lock_id } => {
                if !self.reclaim(target, &lock_id, options.stale_after)? {
                    return Ok(Attempt::Held(WardenError::AlreadyLocked {
                        path: target.to_path_buf(),
                        owner: "another process".to_string(),
                        age: "0s".to_string(),
                    }));
                }
            }
        }

        // One retry after the previous holder is gone.
        match self.create_marker(target, options)? {
            Some(lock_id) => Ok(Attempt::Acquired(lock_id)),
            None => Ok(Attempt::Held(WardenError::AlreadyLocked {
                path: target.to_path_buf(),
                owner: "another process".to_string(),
                age: "0s".to_string(),
            })),
        }
    }

    /// Create the marker exclusively, then write the record.
    ///
    /// Returns `None` when another marker already exists.
    fn create_marker(&self, target: &Path, options: &LockOptions) -> Result<Option<String>> {
        let marker = marker_path(target);
        let lock_id = uuid::Uuid::new_v4().to_string();

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&marker) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(WardenError::io("create lock marker", &marker, e)),
        };

        let written = file
            .write_all(lock_id.as_bytes())
            .and_then(|()| file.sync_all());
        drop(file);
        if let Err(e) = written {
            let _ = fs::remove_file(&marker);
            return Err(WardenError::io("write lock marker", &marker, e));
        }

        if let Err(e) = self.write_record(target, &lock_id, options) {
            let _ = fs::remove_file(&marker);
            return Err(e);
        }

        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target.to_path_buf(), lock_id.clone());

        debug!(path = %target.display(), lock_id = %lock_id, "acquired lock");
        Ok(Some(lock_id))
    }

    fn write_record(&self, target: &Path, lock_id: &str, options: &LockOptions) -> Result<()> {
        let mut record = LockRecord::new(
            lock_id.to_string(),
            target.to_path_buf(),
            duration_ms(options.stale_after),
        );

        if options.check_integrity || options.backup {
            let content = fs::read(target).map_err(|e| WardenError::io("read", target, e))?;
            if options.check_integrity {
                record.checksum = Some(sha256_hex(&content));
            }
            if options.backup {
                let backup = backup_path(target);
                atomic_write(&backup, &content)?;
                record.backup_path = Some(backup);
            }
        }

        let written = record
            .to_json()
            .and_then(|json| atomic_write_str(metadata_path(target), &json));
        if written.is_err()
            && let Some(backup) = &record.backup_path
        {
            let _ = fs::remove_file(backup);
        }
        written
    }

    fn inspect_existing(&self, target: &Path, stale_after: Duration) -> Result<Existing> {
        let marker = marker_path(target);
        let Some(marker_id) = read_marker(&marker)? else {
            return Ok(Existing::Gone);
        };

        if let RecordState::Valid(record) = load_record(&metadata_path(target))?
            && record.lock_id == marker_id
        {
            return Ok(if record.is_stale() {
                Existing::Stale { lock_id: marker_id }
            } else {
                Existing::Active {
                    owner: record.owner_description(),
                    age: record.age_string(),
                }
            });
        }

        // No usable record: the marker's own age decides.
        let Some(age) = marker_age(&marker) else {
            return Ok(Existing::Gone);
        };
        if age > stale_after {
            Ok(Existing::Stale { lock_id: marker_id })
        } else {
            Ok(Existing::Active {
                owner: "unknown".to_string(),
                age: format_age(chrono::Duration::milliseconds(duration_ms(age) as i64)),
            })
        }
    }

    /// Remove a stale marker. Returns `false` if someone else got there first.
    ///
    /// Reclaimers serialize on `<file>.lock.reclaim` and re-read the marker
    /// while holding it, so a fresh marker is never moved aside by a
    /// reclaimer that observed an older one.
    fn reclaim(&self, target: &Path, stale_id: &str, stale_after: Duration) -> Result<bool> {
        let marker = marker_path(target);
        let guard = reclaim_guard_path(&marker);

        match OpenOptions::new().write(true).create_new(true).open(&guard) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                // A reclaimer that crashed mid-way leaves its guard behind.
                if marker_age(&guard).is_some_and(|age| age > stale_after) {
                    warn!(path = %target.display(), "removing abandoned reclaim guard");
                    remove_if_present(&guard)?;
                }
                return Ok(false);
            }
            Err(e) => return Err(WardenError::io("create reclaim guard", &guard, e)),
        }

        let result = self.reclaim_guarded(target, &marker, stale_id);
        if let Err(e) = remove_if_present(&guard) {
            warn!(path = %target.display(), error = %e, "failed to remove reclaim guard");
        }
        result
    }

    fn reclaim_guarded(&self, target: &Path, marker: &Path, stale_id: &str) -> Result<bool> {
        match read_marker(marker)? {
            None => return Ok(true),
            Some(current) if current != stale_id => return Ok(false),
            Some(_) => {}
        }

        let tombstone = tombstone_path(marker);
        match fs::rename(marker, &tombstone) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(WardenError::io("reclaim lock marker", marker, e)),
        }

        let moved_id = fs::read_to_string(&tombstone)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if moved_id != stale_id {
            // The stale holder released and a new one arrived after the re-read.
            let restored = fs::hard_link(&tombstone, marker);
            let _ = fs::remove_file(&tombstone);
            return match restored {
                Ok(()) => Ok(false),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    // A third process took the slot; its marker stands and the
                    // displaced holder's release will report InvalidLockId.
                    warn!(
                        path = %target.display(),
                        "displaced lock marker could not be restored; slot already taken"
                    );
                    Ok(false)
                }
                Err(e) => Err(WardenError::io("restore displaced lock marker", marker, e)),
            };
        }
        let _ = fs::remove_file(&tombstone);

        let metadata = metadata_path(target);
        if let RecordState::Valid(record) = load_record(&metadata)? {
            if record.lock_id == stale_id {
                remove_if_present(&metadata)?;
                if let Some(backup) = &record.backup_path {
                    remove_if_present(backup)?;
                }
            }
        } else {
            remove_if_present(&metadata)?;
        }

        info!(path = %target.display(), stale_lock_id = stale_id, "reclaimed stale lock");
        Ok(true)
    }

    /// Fail with `IntegrityViolation` if the file no longer matches the record.
    fn verify_integrity(&self, target: &Path) -> Result<()> {
        let Some(expected) = self.expected_checksum(target)? else {
            debug!(path = %target.display(), "no checksum recorded; skipping integrity check");
            return Ok(());
        };

        let actual = match fs::read(target) {
            Ok(content) => sha256_hex(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(WardenError::io("read", target, e)),
        };

        if actual != expected {
            warn!(path = %target.display(), "content changed outside the lock");
            return Err(WardenError::IntegrityViolation {
                path: target.to_path_buf(),
            });
        }
        Ok(())
    }

    fn expected_checksum(&self, target: &Path) -> Result<Option<String>> {
        let Some(marker_id) = read_marker(&marker_path(target))? else {
            return Ok(None);
        };
        Ok(match load_record(&metadata_path(target))? {
            RecordState::Valid(record) if record.lock_id == marker_id => record.checksum,
            _ => None,
        })
    }

    /// Store the checksum of freshly written content in the record this instance holds.
    fn refresh_checksum(&self, target: &Path, data: &[u8]) -> Result<Option<String>> {
        let held_id = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .cloned();
        let Some(held_id) = held_id else {
            return Ok(None);
        };

        let metadata = metadata_path(target);
        let RecordState::Valid(mut record) = load_record(&metadata)? else {
            return Ok(None);
        };
        if record.lock_id != held_id || record.checksum.is_none() {
            return Ok(None);
        }

        let checksum = sha256_hex(data);
        record.checksum = Some(checksum.clone());
        atomic_write_str(&metadata, &record.to_json()?)?;
        Ok(Some(checksum))
    }

    fn forget(&self, target: &Path, lock_id: &str) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if held.get(target).is_some_and(|id| id == lock_id) {
            held.remove(target);
        }
    }
}

/// Read the lock id stored in a marker. `None` if the marker does not exist.
fn read_marker(marker: &Path) -> Result<Option<String>> {
    match fs::read_to_string(marker) {
        Ok(content) => Ok(Some(content.trim().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WardenError::io("read lock marker", marker, e)),
    }
}

fn marker_age(marker: &Path) -> Option<Duration> {
    let modified = fs::metadata(marker).and_then(|m| m.modified()).ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    )
}

fn snapshot(target: &Path) -> Result<PathBuf> {
    let backup = backup_path(target);
    fs::copy(target, &backup).map_err(|e| WardenError::io("back up", target, e))?;
    Ok(backup)
}

/// Run `write`; if it fails and a backup exists, put the original back first.
///
/// The backup is removed once restored. A failed restore keeps it and is logged.
pub(super) fn write_restoring(
    target: &Path,
    backup: Option<&Path>,
    write: impl FnOnce() -> Result<()>,
) -> Result<()> {
    let Err(e) = write() else {
        return Ok(());
    };

    if let Some(backup) = backup {
        match restore_from(backup, target) {
            Ok(()) => {
                let _ = fs::remove_file(backup);
                info!(path = %target.display(), "restored original after failed write");
            }
            Err(restore_err) => warn!(
                path = %target.display(),
                backup = %backup.display(),
                error = %restore_err,
                "failed to restore from backup; backup kept"
            ),
        }
    }
    Err(e)
}

fn restore_from(backup: &Path, target: &Path) -> Result<()> {
    let content = fs::read(backup).map_err(|e| WardenError::io("read backup", backup, e))?;
    atomic_write(target, &content)
}

/// Remove a file, treating "already gone" as success. Returns whether it existed.
fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(WardenError::io("remove", path, e)),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
