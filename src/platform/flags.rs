//! Immutability flags: the OS attribute that blocks writes even by the owner.

use super::types::FlagStatus;
use crate::error::Result;
use crate::exec::{CommandExecutor, CommandOutput, ExecOptions};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// One platform's immutability primitive.
///
/// `set` and `clear` report their outcome as a [`FlagStatus`] instead of an
/// error; the adapter decides once whether a failure matters.
pub trait ImmutabilityFlag: Send + Sync + fmt::Debug {
    /// Short name for logs (`chattr`, `chflags`, `icacls`).
    fn name(&self) -> &'static str;

    fn set(&self, path: &Path) -> FlagStatus;

    fn clear(&self, path: &Path) -> FlagStatus;

    /// Whether the flag is currently set. Missing tooling reports `false`.
    fn query(&self, path: &Path) -> Result<bool>;

    /// Command a user can run by hand to clear the flag.
    fn manual_clear_command(&self, _path: &Path) -> Option<String> {
        None
    }
}

/// Stand-in used when flags are disabled or the platform has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoFlag {
    status: FlagStatus,
}

impl NoFlag {
    /// Flag handling turned off in configuration.
    pub fn disabled() -> Self {
        Self {
            status: FlagStatus::Skipped,
        }
    }

    /// The platform has no immutability primitive.
    pub fn unsupported() -> Self {
        Self {
            status: FlagStatus::Unsupported,
        }
    }
}

impl ImmutabilityFlag for NoFlag {
    fn name(&self) -> &'static str {
        "none"
    }

    fn set(&self, _path: &Path) -> FlagStatus {
        self.status.clone()
    }

    fn clear(&self, _path: &Path) -> FlagStatus {
        self.status.clone()
    }

    fn query(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }
}

/// Run a flag command and turn its result into a status.
pub(crate) fn run_flag_command(
    executor: &CommandExecutor,
    command: &str,
    args: &[&str],
) -> FlagStatus {
    match executor.execute(command, args, &ExecOptions::default()) {
        Ok(output) if output.success() => FlagStatus::Applied,
        Ok(output) => FlagStatus::Failed(failure_reason(command, &output)),
        Err(e) => FlagStatus::Failed(e.to_string()),
    }
}

/// First line of stderr, or the exit code when stderr is empty.
pub(crate) fn failure_reason(command: &str, output: &CommandOutput) -> String {
    let line = output.stderr.lines().map(str::trim).find(|l| !l.is_empty());
    match (line, output.exit_code) {
        (Some(line), _) => format!("{} failed: {}", command, line),
        (None, Some(code)) => format!("{} exited with status {}", command, code),
        (None, None) => format!("{} was terminated by a signal", command),
    }
}

/// Path argument for flag commands; non-UTF-8 paths cannot be passed safely.
pub(crate) fn path_arg(path: &Path) -> Option<&str> {
    let arg = path.to_str();
    if arg.is_none() {
        debug!(path = %path.display(), "path is not valid UTF-8; flag command skipped");
    }
    arg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn output(stderr: &str, exit_code: Option<i32>) -> CommandOutput {
        CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code,
            truncated: false,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn no_flag_reports_its_status() {
        let path = Path::new("/tmp/x");
        assert_eq!(NoFlag::disabled().set(path), FlagStatus::Skipped);
        assert_eq!(NoFlag::unsupported().clear(path), FlagStatus::Unsupported);
        assert!(!NoFlag::disabled().query(path).unwrap());
    }

    #[test]
    fn failure_reason_prefers_stderr() {
        let reason = failure_reason(
            "chattr",
            &output("\nchattr: Operation not permitted while setting flags\n", Some(1)),
        );
        assert_eq!(
            reason,
            "chattr failed: chattr: Operation not permitted while setting flags"
        );

        assert_eq!(
            failure_reason("chflags", &output("", Some(2))),
            "chflags exited with status 2"
        );
        assert_eq!(
            failure_reason("icacls", &output("", None)),
            "icacls was terminated by a signal"
        );
    }
}
