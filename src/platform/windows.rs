//! Windows write restriction via an `icacls` deny entry for Everyone.

use super::flags::{ImmutabilityFlag, failure_reason, path_arg, run_flag_command};
use super::types::FlagStatus;
use crate::error::{Result, WardenError};
use crate::exec::{CommandExecutor, ExecOptions};
use std::path::Path;
use std::sync::Arc;

/// Well-known SID of the Everyone group.
const EVERYONE_SID: &str = "*S-1-1-0";

/// Deny-write ACL entry. Only applied when `windows_acl` is enabled.
#[derive(Debug)]
pub struct AclFlag {
    executor: Arc<CommandExecutor>,
    enabled: bool,
}

impl AclFlag {
    pub fn new(executor: Arc<CommandExecutor>, enabled: bool) -> Self {
        Self { executor, enabled }
    }

    fn apply(&self, args: &[&str], path: &Path) -> FlagStatus {
        if !self.enabled {
            return FlagStatus::Skipped;
        }
        if !self.executor.command_available("icacls") {
            return FlagStatus::Unsupported;
        }
        let Some(path) = path_arg(path) else {
            return FlagStatus::Failed("path is not valid UTF-8".to_string());
        };

        let mut full = vec![path];
        full.extend_from_slice(args);
        run_flag_command(&self.executor, "icacls", &full)
    }
}

impl ImmutabilityFlag for AclFlag {
    fn name(&self) -> &'static str {
        "icacls"
    }

    fn set(&self, path: &Path) -> FlagStatus {
        let deny = format!("{}:W", EVERYONE_SID);
        self.apply(&["/deny", &deny], path)
    }

    fn clear(&self, path: &Path) -> FlagStatus {
        self.apply(&["/remove:d", EVERYONE_SID], path)
    }

    fn query(&self, path: &Path) -> Result<bool> {
        if !self.executor.command_available("icacls") {
            return Ok(false);
        }
        let Some(arg) = path_arg(path) else {
            return Ok(false);
        };

        let output = self
            .executor
            .execute("icacls", &[arg], &ExecOptions::default())?;
        if !output.success() {
            return Err(WardenError::CommandFailed {
                command: "icacls".to_string(),
                reason: failure_reason("icacls", &output),
            });
        }
        Ok(parse_icacls_deny(&output.stdout))
    }

    fn manual_clear_command(&self, path: &Path) -> Option<String> {
        Some(format!(
            "icacls \"{}\" /remove:d {}",
            path.display(),
            EVERYONE_SID
        ))
    }
}

/// Whether `icacls` output lists a deny entry for Everyone.
pub(crate) fn parse_icacls_deny(stdout: &str) -> bool {
    stdout.lines().any(|line| {
        line.contains("(DENY)") && (line.contains("Everyone") || line.contains("S-1-1-0"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecLimits;

    #[test]
    fn parses_deny_entries() {
        let locked = "C:\\work\\a.txt Everyone:(DENY)(W)\n              BUILTIN\\Users:(RX)\n";
        assert!(parse_icacls_deny(locked));

        let unlocked = "C:\\work\\a.txt BUILTIN\\Administrators:(F)\n              BUILTIN\\Users:(RX)\n";
        assert!(!parse_icacls_deny(unlocked));
    }

    #[test]
    fn disabled_acl_is_skipped() {
        let executor = Arc::new(CommandExecutor::new(ExecLimits::default()));
        let flag = AclFlag::new(executor, false);

        assert_eq!(flag.set(Path::new("C:/work/a.txt")), FlagStatus::Skipped);
        assert_eq!(flag.clear(Path::new("C:/work/a.txt")), FlagStatus::Skipped);
    }
}
