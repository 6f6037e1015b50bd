//! Tracing subscriber setup for the CLI.
//!
//! Logs go to stderr so stdout stays reserved for command output. `RUST_LOG`
//! overrides the level derived from `-v` flags.

use std::io::{self, IsTerminal};
use std::sync::OnceLock;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::error::{Result, WardenError};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Default filter directive for a `-v` count.
pub fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(verbose: u8, format: LogFormat) -> Result<()> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives)
            .map_err(|e| WardenError::Config(format!("invalid RUST_LOG filter: {}", e)))?,
        _ => EnvFilter::new(level_for_verbosity(verbose)),
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| WardenError::Unknown(format!("failed to install log subscriber: {}", e)))?;
    let _ = INSTALLED.set(());
    Ok(())
}
