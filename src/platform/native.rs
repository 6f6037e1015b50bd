//! The lock/unlock algorithm shared by every native platform.
//!
//! Platforms differ only in their immutability primitive, which is injected
//! as an [`ImmutabilityFlag`].

use super::diagnostics::{DiagnosticReport, Diagnostics};
use super::flags::ImmutabilityFlag;
use super::perms;
use super::types::{FlagStatus, LockOutcome, PlatformKind, SecurityInfo, UnlockOutcome};
use super::{AdapterSettings, PlatformAdapter};
use crate::error::{Result, WardenError};
use crate::fs::sha256_file;
use crate::locks::AtomicFileManager;
use crate::paths::{PathKind, PathValidator};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct NativeAdapter {
    kind: PlatformKind,
    validator: Arc<PathValidator>,
    locks: Arc<AtomicFileManager>,
    flag: Arc<dyn ImmutabilityFlag>,
    diagnostics: Arc<dyn Diagnostics>,
    settings: AdapterSettings,
}

impl NativeAdapter {
    pub fn new(
        kind: PlatformKind,
        validator: Arc<PathValidator>,
        locks: Arc<AtomicFileManager>,
        flag: Arc<dyn ImmutabilityFlag>,
        diagnostics: Arc<dyn Diagnostics>,
        settings: AdapterSettings,
    ) -> Self {
        Self {
            kind,
            validator,
            locks,
            flag,
            diagnostics,
            settings,
        }
    }

    fn resolve_file(&self, path: &Path) -> Result<PathBuf> {
        let target = self.validator.validate_path(path)?;
        self.validator.validate_path_type(&target, PathKind::File)?;
        Ok(target)
    }

    /// One unlock attempt under the atomic lock: clear flag, settle, chmod, verify.
    fn try_unlock(&self, target: &Path) -> Result<FlagStatus> {
        let guard = self.locks.acquire_guard(target, self.locks.defaults())?;

        let flag = self.flag.clear(target);
        if let FlagStatus::Failed(reason) = &flag {
            debug!(path = %target.display(), %reason, "clearing immutable flag failed");
        }
        thread::sleep(self.settings.settle_delay);

        perms::set_writable(target)?;
        if !perms::is_writable(target)? {
            return Err(WardenError::PermissionDenied {
                path: target.to_path_buf(),
                operation: "restore write access to".to_string(),
            });
        }

        guard.release()?;
        Ok(flag)
    }
}

impl PlatformAdapter for NativeAdapter {
    fn kind(&self) -> PlatformKind {
        self.kind
    }

    fn lock_file(&self, path: &Path) -> Result<LockOutcome> {
        let target = self.resolve_file(path)?;

        if !perms::is_writable(&target)? {
            debug!(path = %target.display(), "already locked");
            return Ok(LockOutcome {
                path: target,
                changed: false,
                flag: FlagStatus::Skipped,
            });
        }

        let guard = self.locks.acquire_guard(&target, self.locks.defaults())?;
        // A concurrent lock may have finished while we waited for the guard.
        if !perms::is_writable(&target)? {
            guard.release()?;
            debug!(path = %target.display(), "locked by another caller");
            return Ok(LockOutcome {
                path: target,
                changed: false,
                flag: FlagStatus::Skipped,
            });
        }
        perms::set_read_only(&target)?;

        let flag = self.flag.set(&target);
        if let FlagStatus::Failed(reason) = &flag {
            warn!(
                path = %target.display(),
                flag = self.flag.name(),
                %reason,
                "immutable flag not set; permission bits still protect the file"
            );
        }

        guard.release()?;
        info!(path = %target.display(), flag = %flag, "locked");
        Ok(LockOutcome {
            path: target,
            changed: true,
            flag,
        })
    }

    fn unlock_file(&self, path: &Path) -> Result<UnlockOutcome> {
        let target = self.resolve_file(path)?;

        if perms::is_writable(&target)? {
            debug!(path = %target.display(), "already unlocked");
            return Ok(UnlockOutcome {
                path: target,
                changed: false,
                flag: FlagStatus::Skipped,
                attempts: 0,
            });
        }

        let attempts = self.settings.unlock_attempts.max(1);
        for attempt in 1..=attempts {
            match self.try_unlock(&target) {
                Ok(flag) => {
                    info!(path = %target.display(), attempt, "unlocked");
                    return Ok(UnlockOutcome {
                        path: target,
                        changed: true,
                        flag,
                        attempts: attempt,
                    });
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(path = %target.display(), attempt, error = %e, "unlock attempt failed");
                    if attempt < attempts {
                        thread::sleep(self.settings.unlock_backoff * attempt);
                    }
                }
            }
        }

        let report = self.diagnostics.diagnose(&target);
        Err(WardenError::UnlockVerificationFailed {
            path: target,
            attempts,
            report: Box::new(report),
        })
    }

    fn is_locked(&self, path: &Path) -> Result<bool> {
        let target = match self.validator.validate_path(path) {
            Ok(target) => target,
            Err(e) if resolution_error_reads_as_unlocked(&e) => {
                debug!(
                    path = %path.display(),
                    error = %e,
                    "path resolution failed; reporting unlocked"
                );
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if !target.exists() {
            return Ok(false);
        }

        match perms::is_writable(&target) {
            Ok(false) => Ok(true),
            Ok(true) => Ok(self.locks.is_file_locked(&target).unwrap_or_else(|e| {
                debug!(path = %target.display(), error = %e, "lock probe failed");
                false
            })),
            Err(e) => {
                debug!(path = %target.display(), error = %e, "write probe failed");
                Ok(false)
            }
        }
    }

    fn security_info(&self, path: &Path, include_checksum: bool) -> Result<SecurityInfo> {
        let target = self.validator.validate_path(path)?;
        let metadata = fs::metadata(&target).map_err(|e| WardenError::io("inspect", &target, e))?;

        let is_immutable = self.flag.query(&target).unwrap_or_else(|e| {
            debug!(path = %target.display(), error = %e, "flag inspection failed");
            false
        });
        let checksum = if include_checksum && metadata.is_file() {
            Some(sha256_file(&target)?)
        } else {
            None
        };

        Ok(SecurityInfo {
            is_read_only: metadata.permissions().readonly(),
            is_immutable,
            permission_bits: perms::permission_octal(&metadata),
            platform: self.kind,
            last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            checksum,
            path: target,
        })
    }

    fn diagnose(&self, path: &Path) -> Result<DiagnosticReport> {
        let target = self.validator.validate_path(path)?;
        Ok(self.diagnostics.diagnose(&target))
    }
}

/// Errors from resolving a path that `is_locked` reports as "unlocked".
///
/// Structural rejections (traversal, reserved names, over-long or malformed
/// input) still surface to the caller.
pub(crate) fn resolution_error_reads_as_unlocked(err: &WardenError) -> bool {
    matches!(
        err,
        WardenError::OutsideAllowedDirectories { .. }
            | WardenError::PermissionDenied { .. }
            | WardenError::NotFound { .. }
            | WardenError::Filesystem(_)
    )
}
