//! Filewarden: write-protection for designated files.
//!
//! The protection engine is layered leaf-first:
//!
//! - [`exec`]: allow-listed subprocess execution with argument checks,
//!   timeouts and output caps
//! - [`paths`]: validation and canonicalization of untrusted path strings
//! - [`locks`]: marker-based operation locks, integrity checks and atomic writes
//! - [`platform`]: Unix, Windows and WSL adapters for `lock`/`unlock`
//! - [`sanitize`]: classification and redaction of errors
//!
//! The `filewarden` binary wires these together through [`commands`].

pub mod cli;
pub mod commands;
pub mod config;
pub mod decode;
pub mod error;
pub mod exec;
pub mod exit_codes;
pub mod fs;
pub mod locks;
pub mod logging;
pub mod paths;
pub mod platform;
pub mod sanitize;

#[cfg(test)]
mod test_support;

pub use error::{ErrorCategory, Result, WardenError};
