//! CLI argument parsing for filewarden.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use crate::logging::LogFormat;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Filewarden: write-protect files against accidental and agent-driven edits.
///
/// Locking sets the file read-only (0444) and, where available, the
/// platform immutability flag. Unlocking reverses both and verifies that
/// write access actually came back.
#[derive(Parser, Debug)]
#[command(name = "filewarden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (YAML). Defaults apply when omitted.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log line format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for filewarden.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write-protect files.
    ///
    /// Files that are already locked are left as they are.
    Lock(PathsArgs),

    /// Restore write access to files.
    ///
    /// Retries a bounded number of times and prints a diagnostic report
    /// when write access could not be restored.
    Unlock(PathsArgs),

    /// Report whether each file is locked.
    Status(PathsArgs),

    /// Show the protection state of a file.
    Info(InfoArgs),

    /// Diagnose why a file cannot be unlocked.
    Doctor(DoctorArgs),

    /// Remove a stuck or corrupt operation lock.
    ///
    /// Use this after a crashed process left `<file>.lock` behind.
    Release(ReleaseArgs),
}

/// One or more target files.
#[derive(Parser, Debug)]
pub struct PathsArgs {
    /// Files to operate on.
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<String>,
}

/// Arguments for the `info` command.
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// File to inspect.
    pub path: String,

    /// Include the SHA-256 of the file content.
    #[arg(long)]
    pub checksum: bool,

    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `doctor` command.
#[derive(Parser, Debug)]
pub struct DoctorArgs {
    /// File to diagnose.
    pub path: String,

    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `release` command.
#[derive(Parser, Debug)]
pub struct ReleaseArgs {
    /// File whose operation lock should be removed.
    pub path: String,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
