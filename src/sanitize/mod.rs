//! Secure error handling.
//!
//! Every error that leaves the crate through the CLI passes through
//! [`ErrorHandler`], which classifies it, redacts home directories,
//! credentials, addresses, hashes and encoded blobs, and decides whether the
//! caller must fail safe.

mod handler;
mod redact;

pub use handler::{
    ErrorHandler, MAX_CONTEXT_BYTES, MAX_CONTEXT_DEPTH, MAX_MESSAGE_CHARS, SanitizedError,
    Severity, classify_text, fail_safe_default,
};
pub use redact::{REDACTED, is_sensitive_key, redact};
