//! Atomic file locking for filewarden.
//!
//! This module implements the cross-process lock model that serializes every
//! permission change on a protected file.
//!
//! # Lock Files
//!
//! Two artifacts live next to the target:
//! - `<file>.lock`: the presence marker. It is created with **create_new**
//!   semantics (exclusive create) and holds the lock id, so only one process
//!   can hold a given lock at a time.
//! - `<file>.lock-meta`: the JSON [`LockRecord`], written via temp file +
//!   rename after the marker exists.
//!
//! # Staleness
//!
//! A record older than its own `stale_after_ms` may be reclaimed by any
//! caller. A marker without readable metadata ages by its mtime. Reclaiming
//! renames the marker to a unique tombstone first so two reclaimers cannot
//! both delete a freshly created marker.
//!
//! # RAII Guards
//!
//! [`AtomicFileManager::acquire_guard`] returns a guard that releases the lock
//! when dropped. If release fails during drop, a warning is logged but the
//! program does not crash.

mod guard;
mod manager;
mod record;
mod types;

#[cfg(test)]
mod tests;

pub use guard::LockGuard;
pub use manager::AtomicFileManager;
pub use record::LockRecord;
pub use types::{
    HeldLock, LockOptions, MARKER_SUFFIX, METADATA_SUFFIX, ReadOptions, WriteOptions,
    WriteOutcome, marker_path, metadata_path,
};
