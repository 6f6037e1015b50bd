//! Allow-listed subprocess executor.
//!
//! Executes a closed set of system commands with validated arguments, a
//! wall-clock timeout and a combined output cap.

use super::{args, env};
use crate::config::Config;
use crate::error::{Result, WardenError};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Commands the platform adapters need. Nothing else is reachable by default.
pub const DEFAULT_ALLOWED_COMMANDS: &[&str] = &[
    "attrib", "chattr", "chflags", "icacls", "id", "ls", "lsattr", "stat", "sudo",
];

/// Default wall-clock limit per invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cap on combined stdout + stderr bytes kept per invocation.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Default cap on a single argument's length in bytes.
pub const DEFAULT_MAX_ARGUMENT_LENGTH: usize = 4096;

/// Longest sleep between exit-status polls.
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Resource limits applied to every invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
    pub max_argument_length: usize,
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            max_argument_length: DEFAULT_MAX_ARGUMENT_LENGTH,
        }
    }
}

impl ExecLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_millis(config.command_timeout_ms),
            max_output_bytes: config.max_output_bytes,
            max_argument_length: config.max_argument_length,
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Overrides the executor's default timeout.
    pub timeout: Option<Duration>,
    /// Environment overrides, validated before spawning.
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl ExecOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code of the process (None if it was terminated by a signal).
    pub exit_code: Option<i32>,
    /// Whether output beyond the byte cap was discarded.
    pub truncated: bool,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Executes allow-listed commands without shell interpretation.
///
/// The allow-list is fixed at construction. Command names must be bare
/// (no path separators) and are resolved through `PATH` by the OS.
#[derive(Debug)]
pub struct CommandExecutor {
    allowed: BTreeSet<String>,
    limits: ExecLimits,
}

impl CommandExecutor {
    /// Create an executor with the default allow-list.
    pub fn new(limits: ExecLimits) -> Self {
        Self {
            allowed: DEFAULT_ALLOWED_COMMANDS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            limits,
        }
    }

    /// Create an executor with a custom allow-list.
    ///
    /// Every name must be a bare program name; anything path-like is rejected
    /// so the allow-list can never name a specific binary location.
    pub fn with_allowed<I, S>(commands: I, limits: ExecLimits) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut allowed = BTreeSet::new();
        for command in commands {
            let command = command.into();
            if !is_bare_name(&command) {
                return Err(WardenError::Config(format!(
                    "invalid allow-list entry '{}': expected a bare command name",
                    command
                )));
            }
            allowed.insert(command);
        }
        Ok(Self { allowed, limits })
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ExecLimits::from_config(config))
    }

    pub fn limits(&self) -> &ExecLimits {
        &self.limits
    }

    pub fn is_allowed(&self, command: &str) -> bool {
        is_bare_name(command) && self.allowed.contains(command)
    }

    pub fn allowed_commands(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    /// Whether an allow-listed command is installed on `PATH`.
    ///
    /// Used to degrade gracefully when optional tooling (lsattr, icacls) is absent.
    pub fn command_available(&self, command: &str) -> bool {
        if !self.is_allowed(command) {
            return false;
        }
        let Some(path) = std::env::var_os("PATH") else {
            return false;
        };
        std::env::split_paths(&path).any(|dir| {
            dir.join(command).is_file()
                || (cfg!(windows) && dir.join(format!("{command}.exe")).is_file())
        })
    }

    /// Execute an allow-listed command.
    ///
    /// Exactly one process is spawned per call and no retries are performed.
    /// A non-zero exit is not an error; callers inspect [`CommandOutput::exit_code`].
    ///
    /// # Errors
    ///
    /// * `CommandNotAllowed` - the command is not on the allow-list or is path-qualified
    /// * `DangerousArgument` / `DangerousEnvironment` - input failed validation
    /// * `TimedOut` - the process ran past its deadline and was killed
    /// * `CommandFailed` - the process could not be spawned or waited on
    pub fn execute(
        &self,
        command: &str,
        args: &[&str],
        options: &ExecOptions,
    ) -> Result<CommandOutput> {
        if !self.is_allowed(command) {
            return Err(WardenError::CommandNotAllowed {
                command: display_name(command),
            });
        }
        args::validate_args(args, self.limits.max_argument_length)?;
        env::validate_overrides(&options.env)?;

        let timeout = options.timeout.unwrap_or(self.limits.timeout);

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for name in env::inherited_to_strip() {
            cmd.env_remove(name);
        }
        cmd.envs(&options.env);
        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir);
        }

        debug!(command, args = %shell_words::join(args), "spawning command");

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| WardenError::CommandFailed {
            command: command.to_string(),
            reason: if e.kind() == io::ErrorKind::NotFound {
                "not installed or not on PATH".to_string()
            } else {
                e.to_string()
            },
        })?;

        let budget = Arc::new(AtomicUsize::new(self.limits.max_output_bytes));
        let stdout_reader = child
            .stdout
            .take()
            .map(|out| capture(out, Arc::clone(&budget)));
        let stderr_reader = child
            .stderr
            .take()
            .map(|err| capture(err, Arc::clone(&budget)));

        let status = match wait_with_timeout(&mut child, timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                // Reader threads are detached; they end once the pipes close.
                warn!(command, timeout_ms = timeout.as_millis() as u64, "command timed out");
                return Err(WardenError::TimedOut {
                    command: command.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            Err(e) => {
                kill_process(&mut child);
                return Err(WardenError::CommandFailed {
                    command: command.to_string(),
                    reason: format!("failed to check process status: {}", e),
                });
            }
        };

        let (stdout, stdout_truncated) = join_capture(stdout_reader);
        let (stderr, stderr_truncated) = join_capture(stderr_reader);
        let duration = start.elapsed();

        debug!(
            command,
            exit_code = ?status.code(),
            elapsed_ms = duration.as_millis() as u64,
            "command finished"
        );

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code(),
            truncated: stdout_truncated || stderr_truncated,
            duration,
        })
    }
}

fn is_bare_name(command: &str) -> bool {
    !command.is_empty()
        && command
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !command.starts_with('.')
}

/// Shorten a rejected command name for error messages.
fn display_name(command: &str) -> String {
    let escaped: String = command.escape_debug().collect();
    if escaped.chars().count() > 64 {
        format!("{}...", escaped.chars().take(64).collect::<String>())
    } else {
        escaped
    }
}

/// Wait for a child process with timeout.
///
/// Returns `None` if the deadline passed; the child has been killed by then.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    let mut poll_interval = Duration::from_millis(2);

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            kill_process(child);
            return Ok(None);
        }
        thread::sleep(poll_interval.min(timeout - elapsed));
        poll_interval = (poll_interval * 2).min(MAX_POLL_INTERVAL);
    }
}

/// Kill a process and wait for it to terminate.
fn kill_process(child: &mut Child) {
    // On Unix this is SIGKILL; on Windows it is TerminateProcess.
    let _ = child.kill();
    let _ = child.wait();
}

/// Drain a pipe on a background thread, keeping at most the shared budget.
///
/// Bytes beyond the budget are read and discarded so the child never blocks
/// on a full pipe.
fn capture<R: Read + Send + 'static>(
    mut reader: R,
    budget: Arc<AtomicUsize>,
) -> JoinHandle<(Vec<u8>, bool)> {
    thread::spawn(move || {
        let mut kept = Vec::new();
        let mut truncated = false;
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let granted = take_budget(&budget, n);
                    kept.extend_from_slice(&buf[..granted]);
                    if granted < n {
                        truncated = true;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        (kept, truncated)
    })
}

/// Atomically take up to `wanted` bytes from the shared budget.
fn take_budget(budget: &AtomicUsize, wanted: usize) -> usize {
    let previous = match budget.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
        Some(left - left.min(wanted))
    }) {
        Ok(prev) | Err(prev) => prev,
    };
    previous.min(wanted)
}

fn join_capture(handle: Option<JoinHandle<(Vec<u8>, bool)>>) -> (Vec<u8>, bool) {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn limits() -> ExecLimits {
        ExecLimits {
            timeout: Duration::from_secs(10),
            ..ExecLimits::default()
        }
    }

    #[cfg(unix)]
    fn test_executor() -> CommandExecutor {
        CommandExecutor::with_allowed(
            ["echo", "sleep", "head", "printenv", "false", "ls"],
            limits(),
        )
        .unwrap()
    }

    #[test]
    fn rm_is_never_allowed_by_default() {
        let executor = CommandExecutor::new(limits());
        let err = executor
            .execute("rm", &["-rf", "/"], &ExecOptions::default())
            .unwrap_err();
        assert!(matches!(err, WardenError::CommandNotAllowed { .. }));
    }

    #[test]
    fn default_allow_list_covers_platform_tools() {
        let executor = CommandExecutor::new(limits());
        for command in ["chattr", "lsattr", "chflags", "icacls", "attrib", "sudo"] {
            assert!(executor.is_allowed(command), "{command}");
        }
        assert!(!executor.is_allowed("sh"));
        assert!(!executor.is_allowed("bash"));
    }

    #[test]
    fn path_qualified_commands_are_rejected() {
        let executor = CommandExecutor::new(limits());
        for command in ["/usr/bin/chattr", "./chattr", "bin/chattr", r"C:\Windows\attrib"] {
            let err = executor
                .execute(command, &[], &ExecOptions::default())
                .unwrap_err();
            assert!(
                matches!(err, WardenError::CommandNotAllowed { .. }),
                "{command}"
            );
        }
    }

    #[test]
    fn allow_list_rejects_path_like_entries() {
        assert!(CommandExecutor::with_allowed(["/bin/ls"], limits()).is_err());
        assert!(CommandExecutor::with_allowed([".hidden"], limits()).is_err());
        assert!(CommandExecutor::with_allowed([""], limits()).is_err());
    }

    #[test]
    fn dangerous_arguments_are_rejected_before_spawn() {
        let executor = CommandExecutor::new(limits());
        for arg in ["a;b", "a&b", "a|b", "`id`", "$(id)"] {
            let err = executor
                .execute("ls", &[arg], &ExecOptions::default())
                .unwrap_err();
            assert!(
                matches!(err, WardenError::DangerousArgument { .. }),
                "{arg}"
            );
        }
    }

    #[test]
    fn dangerous_environment_is_rejected_before_spawn() {
        let executor = CommandExecutor::new(limits());
        let options = ExecOptions::default().with_env("LD_PRELOAD", "/tmp/evil.so");
        let err = executor.execute("ls", &[], &options).unwrap_err();
        assert!(matches!(err, WardenError::DangerousEnvironment { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn plain_arguments_execute() {
        let executor = test_executor();
        let output = executor
            .execute("echo", &["hello-world_1.txt"], &ExecOptions::default())
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello-world_1.txt");
        assert!(!output.truncated);
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_reported_not_raised() {
        let executor = test_executor();
        let output = executor
            .execute("false", &[], &ExecOptions::default())
            .unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, Some(1));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_the_process() {
        let executor = test_executor();
        let start = Instant::now();
        let err = executor
            .execute(
                "sleep",
                &["5"],
                &ExecOptions::default().with_timeout(Duration::from_millis(200)),
            )
            .unwrap_err();
        assert!(matches!(err, WardenError::TimedOut { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn output_is_capped() {
        let executor = CommandExecutor::with_allowed(
            ["head"],
            ExecLimits {
                max_output_bytes: 1024,
                ..limits()
            },
        )
        .unwrap();
        let output = executor
            .execute("head", &["-c", "100000", "/dev/zero"], &ExecOptions::default())
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.len(), 1024);
        assert!(output.truncated);
    }

    #[cfg(unix)]
    #[test]
    fn environment_overrides_reach_the_child() {
        let executor = test_executor();
        let options = ExecOptions::default().with_env("WARDEN_TEST_VAR", "test_value");
        let output = executor
            .execute("printenv", &["WARDEN_TEST_VAR"], &options)
            .unwrap();
        assert_eq!(output.stdout.trim(), "test_value");
    }

    #[cfg(unix)]
    #[test]
    fn working_dir_is_applied() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("marker.txt"), "x").unwrap();

        let executor = test_executor();
        let output = executor
            .execute("ls", &[], &ExecOptions::default().in_dir(temp_dir.path()))
            .unwrap();
        assert!(output.stdout.contains("marker.txt"));
    }

    #[test]
    fn missing_binary_is_a_command_failure() {
        let executor =
            CommandExecutor::with_allowed(["nonexistent_command_xyz_123"], limits()).unwrap();
        let err = executor
            .execute("nonexistent_command_xyz_123", &[], &ExecOptions::default())
            .unwrap_err();
        assert!(matches!(err, WardenError::CommandFailed { .. }));
        assert!(!executor.command_available("nonexistent_command_xyz_123"));
    }

    #[test]
    fn budget_is_shared_and_never_overdrawn() {
        let budget = AtomicUsize::new(10);
        assert_eq!(take_budget(&budget, 4), 4);
        assert_eq!(take_budget(&budget, 10), 6);
        assert_eq!(take_budget(&budget, 1), 0);
        assert_eq!(budget.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rejected_command_name_is_escaped_and_shortened() {
        let shown = display_name(&format!("evil\n{}", "x".repeat(100)));
        assert!(!shown.contains('\n'));
        assert!(shown.ends_with("..."));
    }
}
