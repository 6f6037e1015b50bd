//! Command implementations for filewarden.
//!
//! The dispatcher builds a [`Runtime`] once (configuration, collaborators and
//! the platform adapter) and routes each CLI command to its handler.
//! Multi-path commands keep going after a failure and report the first
//! failure's exit code.

mod display;


pub use display::*;

use crate::cli::{Cli, Command, DoctorArgs, InfoArgs, PathsArgs, ReleaseArgs};
use crate::config::Config;
use crate::error::{Result, WardenError};
use crate::platform::{AdapterDeps, PlatformAdapter, PlatformKind, build_adapter};
use crate::sanitize::{ErrorHandler, SanitizedError};
use serde_json::json;
use std::path::Path;
use tracing::debug;

/// Everything a command needs, built once per process.
#[derive(Debug)]
pub struct Runtime {
    pub deps: AdapterDeps,
    pub adapter: Box<dyn PlatformAdapter>,
    pub handler: ErrorHandler,
}

impl Runtime {
    pub fn new(deps: AdapterDeps, adapter: Box<dyn PlatformAdapter>) -> Self {
        Self {
            deps,
            adapter,
            handler: ErrorHandler::new(),
        }
    }

    /// Build collaborators from `config` and the adapter for the detected platform.
    pub fn from_config(config: &Config) -> Result<Self> {
        let deps = AdapterDeps::from_config(config)?;
        let kind = PlatformKind::detect();
        debug!(platform = %kind, "selected platform adapter");
        let adapter = build_adapter(kind, &deps);
        Ok(Self::new(deps, adapter))
    }
}

/// Load configuration from `--config`, or fall back to defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    }
}

/// Dispatch a parsed command line.
pub fn dispatch(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let runtime = Runtime::from_config(&config)?;
    run(&runtime, cli.command)
}

/// Run one command against an already-built runtime.
pub fn run(runtime: &Runtime, command: Command) -> Result<()> {
    match command {
        Command::Lock(args) => cmd_lock(runtime, args),
        Command::Unlock(args) => cmd_unlock(runtime, args),
        Command::Status(args) => cmd_status(runtime, args),
        Command::Info(args) => cmd_info(runtime, args),
        Command::Doctor(args) => cmd_doctor(runtime, args),
        Command::Release(args) => cmd_release(runtime, args),
    }
}

fn cmd_lock(runtime: &Runtime, args: PathsArgs) -> Result<()> {
    for_each_path(runtime, &args.paths, |path| {
        let outcome = runtime.adapter.lock_file(path)?;
        print_lock_outcome(&outcome);
        Ok(())
    })
}

fn cmd_unlock(runtime: &Runtime, args: PathsArgs) -> Result<()> {
    for_each_path(runtime, &args.paths, |path| {
        let result = runtime.adapter.unlock_file(path);
        if let Err(WardenError::UnlockVerificationFailed { report, .. }) = &result {
            print_report(report);
        }
        print_unlock_outcome(&result?);
        Ok(())
    })
}

fn cmd_status(runtime: &Runtime, args: PathsArgs) -> Result<()> {
    for_each_path(runtime, &args.paths, |path| {
        let locked = runtime.adapter.is_locked(path)?;
        print_status(path, locked);
        Ok(())
    })
}

fn cmd_info(runtime: &Runtime, args: InfoArgs) -> Result<()> {
    let info = runtime
        .adapter
        .security_info(Path::new(&args.path), args.checksum)?;
    if args.json {
        print_json(&info)
    } else {
        print_security_info(&info);
        Ok(())
    }
}

fn cmd_doctor(runtime: &Runtime, args: DoctorArgs) -> Result<()> {
    let report = runtime.adapter.diagnose(Path::new(&args.path))?;
    if args.json {
        print_json(&report)
    } else {
        print_report(&report);
        Ok(())
    }
}

fn cmd_release(runtime: &Runtime, args: ReleaseArgs) -> Result<()> {
    let record = runtime.deps.locks.force_release_lock(Path::new(&args.path))?;
    print_released(Path::new(&args.path), record.as_ref());
    Ok(())
}

/// Run `op` for every path.
///
/// A single path returns its error unchanged. With several paths each
/// failure is printed as it happens and the summary error carries the
/// first failure's exit code.
fn for_each_path(
    runtime: &Runtime,
    paths: &[String],
    mut op: impl FnMut(&Path) -> Result<()>,
) -> Result<()> {
    if let [single] = paths {
        return op(Path::new(single));
    }

    let mut first: Option<SanitizedError> = None;
    let mut failed = 0usize;
    for raw in paths {
        if let Err(err) = op(Path::new(raw)) {
            let sanitized = runtime.handler.handle(&err, &json!({ "path": raw }));
            print_path_error(raw, &sanitized);
            failed += 1;
            first.get_or_insert(sanitized);
        }
    }

    match first {
        None => Ok(()),
        Some(first) => Err(WardenError::Reported(Box::new(SanitizedError {
            message: format!("{} of {} paths failed", failed, paths.len()),
            context: serde_json::Value::Null,
            ..first
        }))),
    }
}
