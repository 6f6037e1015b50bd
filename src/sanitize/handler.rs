//! Classification and sanitization of errors before they reach logs or users.

use super::redact::{REDACTED, is_sensitive_key, redact};
use crate::error::{ErrorCategory, Result, WardenError};
use crate::exit_codes;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Longest message kept, in characters.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Largest serialized context kept, in bytes.
pub const MAX_CONTEXT_BYTES: usize = 2048;

/// Deepest context nesting kept.
pub const MAX_CONTEXT_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn for_category(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Security => Severity::Critical,
            ErrorCategory::Permission | ErrorCategory::Validation => Severity::High,
            ErrorCategory::Filesystem | ErrorCategory::Configuration => Severity::Medium,
            ErrorCategory::Unknown => Severity::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error with sensitive values redacted, ready to show or log.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedError {
    pub message: String,
    pub category: ErrorCategory,
    pub severity: Severity,
    /// The operation must abort rather than continue under uncertainty.
    pub should_fail_safe: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub context: Value,
}

impl fmt::Display for SanitizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Ordered text rules for opaque messages. OS error codes come before the
/// generic security phrasing so a plain `EACCES` stays a permission error.
static TEXT_RULES: LazyLock<Vec<(ErrorCategory, Regex)>> = LazyLock::new(|| {
    let rule = |category, pattern: &str| {
        (
            category,
            Regex::new(pattern).expect("invalid classification pattern"),
        )
    };
    vec![
        rule(
            ErrorCategory::Filesystem,
            r"(?i)\b(ENOENT|EEXIST|EISDIR|ENOTDIR|ENOTEMPTY|ENOSPC|EMFILE|ENFILE|EBUSY|EXDEV|EIO)\b|no such file|file exists|is a directory|not a directory|no space left|too many open files|resource busy",
        ),
        rule(
            ErrorCategory::Permission,
            r"(?i)\b(EACCES|EPERM|EROFS)\b|permission denied|operation not permitted|read-only file system",
        ),
        rule(
            ErrorCategory::Security,
            r"(?i)access denied|traversal|injection|unauthori[sz]ed|forbidden|malicious|not permitted|not allowed|security",
        ),
        rule(
            ErrorCategory::Validation,
            r"(?i)invalid|malformed|must be|too long|too large|out of range|reserved|expected",
        ),
        rule(
            ErrorCategory::Configuration,
            r"(?i)config|yaml|setting|missing key|unknown field",
        ),
    ]
});

/// First matching category for `message`, if any rule applies.
pub fn classify_text(message: &str) -> Option<ErrorCategory> {
    TEXT_RULES
        .iter()
        .find(|(_, regex)| regex.is_match(message))
        .map(|(category, _)| *category)
}

/// Security, validation and permission failures abort the operation.
pub fn fail_safe_default(category: ErrorCategory) -> bool {
    matches!(
        category,
        ErrorCategory::Security | ErrorCategory::Validation | ErrorCategory::Permission
    )
}

fn category_remediation(category: ErrorCategory) -> Option<&'static str> {
    match category {
        ErrorCategory::Security => {
            Some("the operation was blocked; review the input before retrying")
        }
        ErrorCategory::Validation => Some("correct the input and retry"),
        ErrorCategory::Permission => {
            Some("check file ownership and permissions (and any immutable flag), then retry")
        }
        ErrorCategory::Filesystem => {
            Some("check that the file exists and the disk is writable, then retry")
        }
        ErrorCategory::Configuration => Some("fix the configuration file and retry"),
        ErrorCategory::Unknown => None,
    }
}

/// Turns errors into [`SanitizedError`]s.
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    max_message_chars: usize,
    max_context_bytes: usize,
    max_depth: usize,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self {
            max_message_chars: MAX_MESSAGE_CHARS,
            max_context_bytes: MAX_CONTEXT_BYTES,
            max_depth: MAX_CONTEXT_DEPTH,
        }
    }
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify, redact and log `err`.
    ///
    /// Typed variants use their own category; `Filesystem` and `Unknown`
    /// carry opaque text and are refined by the text rules.
    pub fn handle(&self, err: &WardenError, context: &Value) -> SanitizedError {
        if let WardenError::Reported(sanitized) = err {
            return sanitized.as_ref().clone();
        }

        let raw = err.to_string();
        let category = match err {
            WardenError::Filesystem(text) | WardenError::Unknown(text) => {
                classify_text(text).unwrap_or(err.category())
            }
            _ => err.category(),
        };
        let remediation = err
            .remediation()
            .map(|fix| redact(&fix).into_owned())
            .or_else(|| category_remediation(category).map(str::to_string));

        self.build(&raw, category, remediation, err.exit_code(), context)
    }

    /// Classify an opaque message purely by its text.
    pub fn handle_message(&self, message: &str, context: &Value) -> SanitizedError {
        let category = classify_text(message).unwrap_or(ErrorCategory::Unknown);
        let remediation = category_remediation(category).map(str::to_string);
        let exit_code = match category {
            ErrorCategory::Security | ErrorCategory::Validation => exit_codes::VALIDATION_FAILURE,
            _ => exit_codes::USER_ERROR,
        };
        self.build(message, category, remediation, exit_code, context)
    }

    /// Handle `err` and return it as a `Reported` error.
    pub fn fail<T>(&self, err: &WardenError, context: &Value) -> Result<T> {
        Err(WardenError::Reported(Box::new(self.handle(err, context))))
    }

    /// Redact and truncate `message`.
    pub fn sanitize_message(&self, message: &str) -> String {
        let redacted = redact(message);
        truncate_chars(&redacted, self.max_message_chars)
    }

    /// Redact strings and sensitive keys, bound depth, then cap total size.
    pub fn sanitize_context(&self, context: &Value) -> Value {
        let cleaned = self.sanitize_value(context, 0);
        let size = serde_json::to_string(&cleaned).map(|s| s.len()).unwrap_or(0);
        if size > self.max_context_bytes {
            json!({ "truncated": true, "original_bytes": size })
        } else {
            cleaned
        }
    }

    fn sanitize_value(&self, value: &Value, depth: usize) -> Value {
        if depth >= self.max_depth {
            return Value::String("[TRUNCATED]".to_string());
        }
        match value {
            Value::String(s) => Value::String(redact(s).into_owned()),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.sanitize_value(item, depth + 1))
                    .collect(),
            ),
            Value::Object(entries) => {
                let mut out = Map::with_capacity(entries.len());
                for (key, item) in entries {
                    let cleaned = if is_sensitive_key(key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        self.sanitize_value(item, depth + 1)
                    };
                    out.insert(key.clone(), cleaned);
                }
                Value::Object(out)
            }
            other => other.clone(),
        }
    }

    fn build(
        &self,
        raw: &str,
        category: ErrorCategory,
        remediation: Option<String>,
        exit_code: i32,
        context: &Value,
    ) -> SanitizedError {
        let sanitized = SanitizedError {
            message: self.sanitize_message(raw),
            category,
            severity: Severity::for_category(category),
            should_fail_safe: fail_safe_default(category),
            remediation,
            exit_code,
            context: self.sanitize_context(context),
        };

        match sanitized.severity {
            Severity::Critical => warn!(
                category = %sanitized.category,
                message = %sanitized.message,
                "security failure"
            ),
            Severity::High => info!(
                category = %sanitized.category,
                message = %sanitized.message,
                "operation rejected"
            ),
            Severity::Medium | Severity::Low => debug!(
                category = %sanitized.category,
                message = %sanitized.message,
                "operation failed"
            ),
        }

        sanitized
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
