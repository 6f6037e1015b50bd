//! Platform kinds, outcomes and the security snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Which OS semantics an adapter implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Unix,
    Windows,
    Wsl,
}

impl PlatformKind {
    /// Detect the platform this process runs on.
    pub fn detect() -> Self {
        if cfg!(windows) {
            PlatformKind::Windows
        } else if cfg!(target_os = "linux") && running_under_wsl() {
            PlatformKind::Wsl
        } else {
            PlatformKind::Unix
        }
    }

    /// Whether a `/proc/version` string belongs to a WSL kernel.
    pub fn is_wsl_release(version: &str) -> bool {
        let version = version.to_ascii_lowercase();
        version.contains("microsoft") || version.contains("wsl")
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Unix => "unix",
            PlatformKind::Windows => "windows",
            PlatformKind::Wsl => "wsl",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn running_under_wsl() -> bool {
    std::env::var_os("WSL_DISTRO_NAME").is_some()
        || std::fs::read_to_string("/proc/version")
            .map(|v| PlatformKind::is_wsl_release(&v))
            .unwrap_or(false)
}

/// Result of the immutability-flag step of a lock or unlock.
///
/// Flag failures never fail the operation; the status makes that decision visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum FlagStatus {
    /// The flag was set (or cleared).
    Applied,
    /// Flag handling is disabled, or there was nothing to do.
    Skipped,
    /// The platform or its tooling has no immutability flag.
    Unsupported,
    /// The flag command ran and failed.
    Failed(String),
}

impl FlagStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, FlagStatus::Failed(_))
    }
}

impl fmt::Display for FlagStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagStatus::Applied => write!(f, "applied"),
            FlagStatus::Skipped => write!(f, "skipped"),
            FlagStatus::Unsupported => write!(f, "unsupported"),
            FlagStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockOutcome {
    pub path: PathBuf,
    /// False when the file was already locked.
    pub changed: bool,
    pub flag: FlagStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlockOutcome {
    pub path: PathBuf,
    /// False when the file was already writable.
    pub changed: bool,
    pub flag: FlagStatus,
    /// Attempts used; zero when nothing had to change.
    pub attempts: u32,
}

/// Read-only snapshot of a file's protection state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityInfo {
    pub path: PathBuf,
    pub is_read_only: bool,
    pub is_immutable: bool,
    /// Octal permission string such as `644`.
    pub permission_bits: String,
    pub platform: PlatformKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}
