//! Platform adapters.
//!
//! An adapter turns abstract `lock`/`unlock` requests into OS permission
//! changes:
//!
//! - **Unix**: mode bits plus `chattr +i` (Linux) or `chflags uchg` (macOS/BSD)
//! - **Windows**: read-only attribute plus an optional `icacls` deny entry
//! - **WSL**: Unix semantics first, then permission-only Windows semantics
//!
//! The adapter is built once at process start with [`build_adapter`] and owned
//! by the caller; there is no process-wide instance.

mod diagnostics;
mod flags;
mod native;
mod perms;
mod types;
mod unix;
mod windows;
mod wsl;


pub use diagnostics::{DiagnosticReport, Diagnostics, FileDiagnostics};
pub use flags::{ImmutabilityFlag, NoFlag};
pub use native::NativeAdapter;
pub use perms::{LOCKED_MODE, UNLOCKED_MODE};
pub use types::{FlagStatus, LockOutcome, PlatformKind, SecurityInfo, UnlockOutcome};
pub use unix::{ChattrFlag, ChflagsFlag};
pub use windows::AclFlag;
pub use wsl::WslAdapter;

use crate::config::Config;
use crate::error::Result;
use crate::exec::CommandExecutor;
use crate::locks::AtomicFileManager;
use crate::paths::PathValidator;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Lock/unlock operations for one platform's semantics.
///
/// `lock_file` and `unlock_file` are idempotent: calling either on a file
/// already in the target state succeeds with `changed == false`.
pub trait PlatformAdapter: Send + Sync + fmt::Debug {
    fn kind(&self) -> PlatformKind;

    /// Make `path` read-only and, where possible, immutable.
    fn lock_file(&self, path: &Path) -> Result<LockOutcome>;

    /// Restore write access, retrying a bounded number of times.
    ///
    /// # Errors
    ///
    /// `UnlockVerificationFailed` with a [`DiagnosticReport`] when write
    /// access could not be verified after the last attempt.
    fn unlock_file(&self, path: &Path) -> Result<UnlockOutcome>;

    /// Locked means no write access or an active operation lock.
    ///
    /// Missing files and paths outside the adapter's authority are unlocked.
    fn is_locked(&self, path: &Path) -> Result<bool>;

    fn security_info(&self, path: &Path, include_checksum: bool) -> Result<SecurityInfo>;

    fn diagnose(&self, path: &Path) -> Result<DiagnosticReport>;
}

/// Timing and flag settings taken from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSettings {
    pub unlock_attempts: u32,
    pub unlock_backoff: Duration,
    pub settle_delay: Duration,
    pub use_immutable_flag: bool,
    pub allow_privilege_escalation: bool,
    pub windows_acl: bool,
}

impl AdapterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            unlock_attempts: config.unlock_attempts,
            unlock_backoff: Duration::from_millis(config.unlock_backoff_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            use_immutable_flag: config.use_immutable_flag,
            allow_privilege_escalation: config.allow_privilege_escalation,
            windows_acl: config.windows_acl,
        }
    }
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Shared collaborators every adapter needs.
#[derive(Debug, Clone)]
pub struct AdapterDeps {
    pub validator: Arc<PathValidator>,
    pub executor: Arc<CommandExecutor>,
    pub locks: Arc<AtomicFileManager>,
    pub settings: AdapterSettings,
}

impl AdapterDeps {
    /// Build the standard collaborators from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let validator = Arc::new(PathValidator::from_config(config)?);
        Ok(Self::with_validator(validator, config))
    }

    pub fn with_validator(validator: Arc<PathValidator>, config: &Config) -> Self {
        Self {
            executor: Arc::new(CommandExecutor::from_config(config)),
            locks: Arc::new(AtomicFileManager::from_config(validator.clone(), config)),
            validator,
            settings: AdapterSettings::from_config(config),
        }
    }

    /// Native adapter for `kind` with the given flag and default diagnostics.
    pub fn native(&self, kind: PlatformKind, flag: Arc<dyn ImmutabilityFlag>) -> NativeAdapter {
        let diagnostics = Arc::new(FileDiagnostics::new(flag.clone(), self.locks.clone()));
        NativeAdapter::new(
            kind,
            self.validator.clone(),
            self.locks.clone(),
            flag,
            diagnostics,
            self.settings.clone(),
        )
    }

    /// The immutability flag native to `kind` under the current settings.
    pub fn flag_for(&self, kind: PlatformKind) -> Arc<dyn ImmutabilityFlag> {
        if !self.settings.use_immutable_flag {
            return Arc::new(NoFlag::disabled());
        }
        match kind {
            PlatformKind::Windows => Arc::new(AclFlag::new(
                self.executor.clone(),
                self.settings.windows_acl,
            )),
            PlatformKind::Unix | PlatformKind::Wsl if cfg!(target_os = "linux") => Arc::new(
                ChattrFlag::new(self.executor.clone(), self.settings.allow_privilege_escalation),
            ),
            PlatformKind::Unix | PlatformKind::Wsl
                if cfg!(any(
                    target_os = "macos",
                    target_os = "freebsd",
                    target_os = "openbsd",
                    target_os = "netbsd",
                    target_os = "dragonfly"
                )) =>
            {
                Arc::new(ChflagsFlag::new(self.executor.clone()))
            }
            PlatformKind::Unix | PlatformKind::Wsl => Arc::new(NoFlag::unsupported()),
        }
    }
}

/// Build the adapter for `kind`.
///
/// WSL gets an ordered strategy list: Unix semantics, then Windows semantics
/// reduced to the read-only attribute (drvfs maps mode bits onto it; Windows
/// ACL tooling cannot address Linux paths).
pub fn build_adapter(kind: PlatformKind, deps: &AdapterDeps) -> Box<dyn PlatformAdapter> {
    match kind {
        PlatformKind::Unix | PlatformKind::Windows => {
            Box::new(deps.native(kind, deps.flag_for(kind)))
        }
        PlatformKind::Wsl => Box::new(WslAdapter::new(vec![
            Box::new(deps.native(PlatformKind::Unix, deps.flag_for(PlatformKind::Wsl))),
            Box::new(deps.native(PlatformKind::Windows, Arc::new(NoFlag::unsupported()))),
        ])),
    }
}
