//! RAII lock guard implementation.

use super::manager::AtomicFileManager;
use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::warn;

/// RAII guard for an operation lock.
///
/// When dropped, the lock is released through the manager that issued it.
/// If release fails, a warning is logged but no panic occurs.
#[derive(Debug)]
pub struct LockGuard<'a> {
    manager: &'a AtomicFileManager,
    path: PathBuf,
    lock_id: String,
    released: bool,
}

impl<'a> LockGuard<'a> {
    pub(super) fn new(manager: &'a AtomicFileManager, path: PathBuf, lock_id: String) -> Self {
        Self {
            manager,
            path,
            lock_id,
            released: false,
        }
    }

    /// Canonical path of the locked file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    /// Release the lock explicitly, surfacing any error.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.manager.release_canonical(&self.path, &self.lock_id)
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.manager.release_canonical(&self.path, &self.lock_id)
        {
            warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}
