//! Secure path validation.
//!
//! Every path that reaches the filesystem or the command executor passes
//! through [`PathValidator`] first. The validator rejects traversal in raw,
//! percent-/hex-encoded and Unicode-confusable forms, reserved device names,
//! control characters and overlong input, then resolves the path against a
//! base directory and an allowed-directory set.

mod reserved;
mod validator;


pub use reserved::is_reserved_name;
pub use validator::{
    AccessMode, MAX_COMPONENT_LENGTH, MAX_PATH_LENGTH, PathKind, PathLimits, PathValidator,
};
