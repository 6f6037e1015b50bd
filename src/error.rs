//! Error types for filewarden.
//!
//! Uses thiserror for derive macros. Every variant maps to an exit code and to
//! an [`ErrorCategory`], which drives retry and fail-safe decisions in the
//! sanitizing error handler (`crate::sanitize`).

use crate::exit_codes;
use crate::platform::DiagnosticReport;
use crate::sanitize::SanitizedError;
use serde::Serialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Coarse classification of an error, used for redaction, retry and fail-safe policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Security,
    Validation,
    Filesystem,
    Permission,
    Configuration,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Security => "security",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Filesystem => "filesystem",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for filewarden operations.
#[derive(Error, Debug)]
pub enum WardenError {
    /// The command name is not part of the executor's allow-list.
    #[error("command '{command}' is not permitted")]
    CommandNotAllowed { command: String },

    /// A command argument failed validation. The argument itself is not echoed.
    #[error("argument {index} rejected: {reason}")]
    DangerousArgument { index: usize, reason: String },

    /// An environment override failed validation.
    #[error("environment variable '{name}' rejected: {reason}")]
    DangerousEnvironment { name: String, reason: String },

    /// The command ran past its wall-clock limit and was terminated.
    #[error("command '{command}' timed out after {timeout_ms} ms")]
    TimedOut { command: String, timeout_ms: u64 },

    /// The command could not be spawned or waited on.
    #[error("command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },

    /// The path contains a parent-directory segment, raw or encoded.
    #[error("path traversal detected: {reason}")]
    PathTraversalDetected { reason: String },

    /// The path or one of its components exceeds the configured limit.
    #[error("path {what} too long ({length} > {max})")]
    PathTooLong {
        what: &'static str,
        length: usize,
        max: usize,
    },

    /// A component is a reserved device name such as `CON` or `LPT1`.
    #[error("path component '{component}' is a reserved device name")]
    ReservedName { component: String },

    /// The path is structurally invalid (empty, null byte, control character, wrong kind).
    #[error("invalid path: {reason}")]
    InvalidPath { reason: String },

    /// The resolved path is outside every registered allowed directory.
    #[error("path '{}' is outside the allowed directories", path.display())]
    OutsideAllowedDirectories { path: PathBuf },

    #[error("'{}' does not exist", path.display())]
    NotFound { path: PathBuf },

    /// Another holder owns the operation lock on this file.
    #[error("'{}' is locked by {owner} (held {age})", path.display())]
    AlreadyLocked {
        path: PathBuf,
        owner: String,
        age: String,
    },

    /// The lock id presented on release does not match the stored record.
    #[error("lock id does not match the lock held on '{}'", path.display())]
    InvalidLockId { path: PathBuf },

    #[error("'{}' has no operation lock", path.display())]
    NotLocked { path: PathBuf },

    /// Content changed outside the custody of the lock that captured its checksum.
    #[error("integrity check failed for '{}': content changed outside the lock", path.display())]
    IntegrityViolation { path: PathBuf },

    /// Unlocking did not restore write access within the retry budget.
    #[error("failed to unlock '{}' after {attempts} attempt(s): {}", path.display(), report.summary())]
    UnlockVerificationFailed {
        path: PathBuf,
        attempts: u32,
        report: Box<DiagnosticReport>,
    },

    #[error("permission denied while trying to {operation} '{}'", path.display())]
    PermissionDenied { path: PathBuf, operation: String },

    /// Any other filesystem failure.
    #[error("{0}")]
    Filesystem(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// An error that has already passed through the sanitizing handler.
    #[error("{0}")]
    Reported(Box<SanitizedError>),

    #[error("{0}")]
    Unknown(String),
}

impl WardenError {
    /// Map an I/O error encountered while performing `operation` on `path`.
    ///
    /// Permission and not-found failures keep their typed variants so callers
    /// can branch on them; everything else becomes `Filesystem`.
    pub fn io(operation: &str, path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => WardenError::PermissionDenied {
                path: path.to_path_buf(),
                operation: operation.to_string(),
            },
            io::ErrorKind::NotFound => WardenError::NotFound {
                path: path.to_path_buf(),
            },
            _ => WardenError::Filesystem(format!(
                "failed to {} '{}': {}",
                operation,
                path.display(),
                err
            )),
        }
    }

    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            WardenError::CommandNotAllowed { .. }
            | WardenError::DangerousArgument { .. }
            | WardenError::DangerousEnvironment { .. }
            | WardenError::PathTraversalDetected { .. }
            | WardenError::PathTooLong { .. }
            | WardenError::ReservedName { .. }
            | WardenError::InvalidPath { .. }
            | WardenError::OutsideAllowedDirectories { .. } => exit_codes::VALIDATION_FAILURE,
            WardenError::TimedOut { .. } | WardenError::CommandFailed { .. } => {
                exit_codes::COMMAND_FAILURE
            }
            WardenError::AlreadyLocked { .. }
            | WardenError::InvalidLockId { .. }
            | WardenError::NotLocked { .. } => exit_codes::LOCK_FAILURE,
            WardenError::IntegrityViolation { .. }
            | WardenError::UnlockVerificationFailed { .. } => exit_codes::INTEGRITY_FAILURE,
            WardenError::Reported(sanitized) => sanitized.exit_code,
            WardenError::NotFound { .. }
            | WardenError::PermissionDenied { .. }
            | WardenError::Filesystem(_)
            | WardenError::Config(_)
            | WardenError::Unknown(_) => exit_codes::USER_ERROR,
        }
    }

    /// Returns the category for typed variants.
    ///
    /// `Filesystem` and `Unknown` carry opaque text; the error handler
    /// refines those by inspecting the message.
    pub fn category(&self) -> ErrorCategory {
        match self {
            WardenError::CommandNotAllowed { .. }
            | WardenError::DangerousArgument { .. }
            | WardenError::DangerousEnvironment { .. }
            | WardenError::PathTraversalDetected { .. }
            | WardenError::OutsideAllowedDirectories { .. }
            | WardenError::IntegrityViolation { .. } => ErrorCategory::Security,
            WardenError::PathTooLong { .. }
            | WardenError::ReservedName { .. }
            | WardenError::InvalidPath { .. }
            | WardenError::InvalidLockId { .. } => ErrorCategory::Validation,
            WardenError::PermissionDenied { .. } | WardenError::UnlockVerificationFailed { .. } => {
                ErrorCategory::Permission
            }
            WardenError::NotFound { .. }
            | WardenError::AlreadyLocked { .. }
            | WardenError::NotLocked { .. }
            | WardenError::TimedOut { .. }
            | WardenError::CommandFailed { .. }
            | WardenError::Filesystem(_) => ErrorCategory::Filesystem,
            WardenError::Config(_) => ErrorCategory::Configuration,
            WardenError::Reported(sanitized) => sanitized.category,
            WardenError::Unknown(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether a bounded retry (unlock path) may be attempted after this error.
    ///
    /// Validation and security failures are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            WardenError::NotFound { .. } => false,
            _ => matches!(
                self.category(),
                ErrorCategory::Filesystem | ErrorCategory::Permission
            ),
        }
    }

    /// A concrete remediation suggestion, when one exists.
    pub fn remediation(&self) -> Option<String> {
        match self {
            WardenError::CommandNotAllowed { .. } => {
                Some("only allow-listed system commands may be executed".to_string())
            }
            WardenError::DangerousArgument { .. } | WardenError::DangerousEnvironment { .. } => {
                Some("remove shell metacharacters and encoded sequences from the input".to_string())
            }
            WardenError::TimedOut { .. } => {
                Some("raise command_timeout_ms in the configuration, then retry".to_string())
            }
            WardenError::PathTraversalDetected { .. } => {
                Some("pass a path without '..' segments or encoded equivalents".to_string())
            }
            WardenError::OutsideAllowedDirectories { .. } => Some(
                "run from the project directory or add the directory to allowed_directories"
                    .to_string(),
            ),
            WardenError::AlreadyLocked { path, .. } => Some(format!(
                "wait for the other operation to finish, or run `filewarden release {}` if its holder crashed",
                path.display()
            )),
            WardenError::IntegrityViolation { .. } => {
                Some("inspect the file for unexpected changes before retrying".to_string())
            }
            WardenError::UnlockVerificationFailed { report, .. } => {
                report.recommendations.first().cloned()
            }
            WardenError::PermissionDenied { .. } => Some(
                "clear the immutable flag (if set) and restore write permission, then retry"
                    .to_string(),
            ),
            WardenError::Reported(sanitized) => sanitized.remediation.clone(),
            _ => None,
        }
    }
}

/// Result type alias for filewarden operations.
pub type Result<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_not_allowed_is_security_validation_exit() {
        let err = WardenError::CommandNotAllowed {
            command: "rm".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Security);
        assert_eq!(err.exit_code(), exit_codes::VALIDATION_FAILURE);
        assert!(!err.is_retryable());
    }

    #[test]
    fn lock_errors_have_lock_exit_code() {
        let err = WardenError::AlreadyLocked {
            path: PathBuf::from("/tmp/a"),
            owner: "u@h".to_string(),
            age: "0m".to_string(),
        };
        assert_eq!(err.exit_code(), exit_codes::LOCK_FAILURE);

        let err = WardenError::InvalidLockId {
            path: PathBuf::from("/tmp/a"),
        };
        assert_eq!(err.exit_code(), exit_codes::LOCK_FAILURE);
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn io_errors_keep_permission_and_not_found_kinds() {
        let path = Path::new("/tmp/x");
        let err = WardenError::io(
            "open",
            path,
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, WardenError::PermissionDenied { .. }));
        assert!(err.is_retryable());

        let err = WardenError::io("open", path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, WardenError::NotFound { .. }));
        assert!(!err.is_retryable());

        let err = WardenError::io("open", path, io::Error::other("disk on fire"));
        assert!(matches!(err, WardenError::Filesystem(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = WardenError::PathTraversalDetected {
            reason: "parent segment".to_string(),
        };
        assert!(!err.is_retryable());
        let err = WardenError::ReservedName {
            component: "CON".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = WardenError::PathTooLong {
            what: "component",
            length: 300,
            max: 255,
        };
        assert_eq!(err.to_string(), "path component too long (300 > 255)");

        let err = WardenError::TimedOut {
            command: "chattr".to_string(),
            timeout_ms: 500,
        };
        assert_eq!(err.to_string(), "command 'chattr' timed out after 500 ms");
    }

    #[test]
    fn already_locked_suggests_release() {
        let err = WardenError::AlreadyLocked {
            path: PathBuf::from("/srv/a.txt"),
            owner: "u@h".to_string(),
            age: "1m".to_string(),
        };
        let fix = err.remediation().unwrap();
        assert!(fix.contains("filewarden release /srv/a.txt"));
    }
}
