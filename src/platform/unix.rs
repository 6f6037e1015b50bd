//! Unix immutability flags: `chattr +i` on Linux, `chflags uchg` on macOS/BSD.

use super::flags::{ImmutabilityFlag, failure_reason, path_arg, run_flag_command};
use super::types::FlagStatus;
use crate::error::{Result, WardenError};
use crate::exec::{CommandExecutor, ExecOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Linux immutable attribute via `chattr`, queried with `lsattr -d`.
///
/// Setting the attribute needs `CAP_LINUX_IMMUTABLE`. When the direct call
/// fails and escalation is allowed, `sudo -n` is tried; it never prompts, so
/// it only succeeds where passwordless sudo is already configured.
#[derive(Debug)]
pub struct ChattrFlag {
    executor: Arc<CommandExecutor>,
    escalate: bool,
}

impl ChattrFlag {
    pub fn new(executor: Arc<CommandExecutor>, escalate: bool) -> Self {
        Self { executor, escalate }
    }

    fn apply(&self, op: &str, path: &Path) -> FlagStatus {
        if !self.executor.command_available("chattr") {
            return FlagStatus::Unsupported;
        }
        let Some(path) = path_arg(path) else {
            return FlagStatus::Failed("path is not valid UTF-8".to_string());
        };

        let direct = run_flag_command(&self.executor, "chattr", &[op, path]);
        if !direct.is_failure() || !self.escalate || is_root() {
            return direct;
        }
        if !self.executor.command_available("sudo") {
            return direct;
        }

        debug!(path, op, "retrying chattr through non-interactive sudo");
        match run_flag_command(&self.executor, "sudo", &["-n", "chattr", op, path]) {
            FlagStatus::Applied => FlagStatus::Applied,
            // Report the original failure; sudo's refusal is less informative.
            _ => direct,
        }
    }
}

impl ImmutabilityFlag for ChattrFlag {
    fn name(&self) -> &'static str {
        "chattr"
    }

    fn set(&self, path: &Path) -> FlagStatus {
        self.apply("+i", path)
    }

    fn clear(&self, path: &Path) -> FlagStatus {
        self.apply("-i", path)
    }

    fn query(&self, path: &Path) -> Result<bool> {
        if !self.executor.command_available("lsattr") {
            return Ok(false);
        }
        let Some(arg) = path_arg(path) else {
            return Ok(false);
        };

        let output = self
            .executor
            .execute("lsattr", &["-d", arg], &ExecOptions::default())?;
        if !output.success() {
            return Err(WardenError::CommandFailed {
                command: "lsattr".to_string(),
                reason: failure_reason("lsattr", &output),
            });
        }
        Ok(parse_lsattr(&output.stdout))
    }

    fn manual_clear_command(&self, path: &Path) -> Option<String> {
        let path = path.to_str()?;
        Some(shell_words::join(["sudo", "chattr", "-i", path]))
    }
}

/// BSD user-immutable flag via `chflags`, queried with `ls -ldO`.
#[derive(Debug)]
pub struct ChflagsFlag {
    executor: Arc<CommandExecutor>,
}

impl ChflagsFlag {
    pub fn new(executor: Arc<CommandExecutor>) -> Self {
        Self { executor }
    }

    fn apply(&self, flag: &str, path: &Path) -> FlagStatus {
        if !self.executor.command_available("chflags") {
            return FlagStatus::Unsupported;
        }
        match path_arg(path) {
            Some(path) => run_flag_command(&self.executor, "chflags", &[flag, path]),
            None => FlagStatus::Failed("path is not valid UTF-8".to_string()),
        }
    }
}

impl ImmutabilityFlag for ChflagsFlag {
    fn name(&self) -> &'static str {
        "chflags"
    }

    fn set(&self, path: &Path) -> FlagStatus {
        self.apply("uchg", path)
    }

    fn clear(&self, path: &Path) -> FlagStatus {
        self.apply("nouchg", path)
    }

    fn query(&self, path: &Path) -> Result<bool> {
        if !self.executor.command_available("ls") {
            return Ok(false);
        }
        let Some(arg) = path_arg(path) else {
            return Ok(false);
        };

        let output = self
            .executor
            .execute("ls", &["-ldO", arg], &ExecOptions::default())?;
        if !output.success() {
            return Err(WardenError::CommandFailed {
                command: "ls".to_string(),
                reason: failure_reason("ls", &output),
            });
        }
        Ok(parse_bsd_flags(&output.stdout))
    }

    fn manual_clear_command(&self, path: &Path) -> Option<String> {
        let path = path.to_str()?;
        Some(shell_words::join(["chflags", "nouchg", path]))
    }
}

/// `lsattr -d` prints `<attrs> <path>`; `i` in the attribute column means immutable.
pub(crate) fn parse_lsattr(stdout: &str) -> bool {
    stdout
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .is_some_and(|attrs| attrs.contains('i'))
}

/// `ls -ldO` prints a comma-separated flags column after the group.
pub(crate) fn parse_bsd_flags(stdout: &str) -> bool {
    stdout
        .lines()
        .next()
        .map(|line| {
            line.split_whitespace()
                .flat_map(|column| column.split(','))
                .any(|flag| flag == "uchg" || flag == "schg")
        })
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}
