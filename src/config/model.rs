//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the protection engine.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Milliseconds after which an operation lock is considered stale.
    #[serde(default = "default_lock_stale_ms")]
    pub lock_stale_ms: u64,

    /// Milliseconds to keep retrying a contended lock before giving up.
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,

    /// Interval between acquisition attempts while waiting.
    #[serde(default = "default_lock_poll_ms")]
    pub lock_poll_ms: u64,

    /// Capture a content checksum at lock time and verify it on read/write.
    #[serde(default)]
    pub verify_integrity: bool,

    // =========================================================================
    // Command settings
    // =========================================================================
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Cap on combined stdout + stderr bytes kept per command.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    #[serde(default = "default_max_argument_length")]
    pub max_argument_length: usize,

    // =========================================================================
    // Unlock settings
    // =========================================================================
    #[serde(default = "default_unlock_attempts")]
    pub unlock_attempts: u32,

    /// Base backoff between unlock attempts; grows linearly per attempt.
    #[serde(default = "default_unlock_backoff_ms")]
    pub unlock_backoff_ms: u64,

    /// Pause between clearing the immutable flag and restoring permissions.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    // =========================================================================
    // Platform settings
    // =========================================================================
    /// Set the OS immutability flag in addition to read-only permissions.
    #[serde(default = "default_true")]
    pub use_immutable_flag: bool,

    /// Retry flag changes through `sudo -n` (never prompts).
    #[serde(default = "default_true")]
    pub allow_privilege_escalation: bool,

    /// Add a deny-write ACL entry on Windows.
    #[serde(default)]
    pub windows_acl: bool,

    /// Extra directories (absolute) accepted by the path validator.
    #[serde(default)]
    pub allowed_directories: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_stale_ms: default_lock_stale_ms(),
            lock_wait_ms: default_lock_wait_ms(),
            lock_poll_ms: default_lock_poll_ms(),
            verify_integrity: false,
            command_timeout_ms: default_command_timeout_ms(),
            max_output_bytes: default_max_output_bytes(),
            max_argument_length: default_max_argument_length(),
            unlock_attempts: default_unlock_attempts(),
            unlock_backoff_ms: default_unlock_backoff_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            use_immutable_flag: default_true(),
            allow_privilege_escalation: default_true(),
            windows_acl: false,
            allowed_directories: Vec::new(),
        }
    }
}
