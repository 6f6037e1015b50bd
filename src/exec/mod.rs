//! Secure command execution.
//!
//! This module is the only place filewarden spawns processes. It provides:
//!
//! - A closed allow-list of bare command names, fixed at construction
//! - Argument validation (length, shell metacharacters, encoded traversal)
//! - Environment sanitization (loader and shell-override variables)
//! - A wall-clock timeout with process termination
//! - A cap on combined stdout + stderr bytes
//!
//! Processes are spawned with an argv vector; no shell is ever involved.

pub mod args;
pub mod env;
mod executor;

pub use executor::{
    CommandExecutor, CommandOutput, DEFAULT_ALLOWED_COMMANDS, ExecLimits, ExecOptions,
};
