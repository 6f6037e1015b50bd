use crate::config::Config;
use crate::locks::{AtomicFileManager, LockOptions};
use crate::paths::PathValidator;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use std::time::Duration;
use tempfile::TempDir;

static CWD_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub(crate) struct DirGuard {
    original: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl DirGuard {
    pub(crate) fn new(new_dir: &Path) -> Self {
        // Changing the process current working directory is global and not thread-safe.
        // Lock it so tests don't race even if a #[serial] annotation is missed.
        let lock = CWD_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(new_dir).unwrap();
        Self {
            original,
            _lock: lock,
        }
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.original);
    }
}

/// A temp directory with a validator restricted to it.
pub(crate) struct Sandbox {
    pub(crate) dir: TempDir,
    pub(crate) validator: Arc<PathValidator>,
}

impl Sandbox {
    pub(crate) fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let validator = Arc::new(PathValidator::restricted_to([dir.path()]).unwrap());
        Self { dir, validator }
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create a file with `content` and return its canonical path.
    pub(crate) fn file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path.canonicalize().unwrap()
    }

    pub(crate) fn manager(&self) -> AtomicFileManager {
        AtomicFileManager::with_defaults(self.validator.clone(), quick_lock_options())
    }
}

/// Lock options with short waits so contention tests finish quickly.
pub(crate) fn quick_lock_options() -> LockOptions {
    LockOptions {
        stale_after: Duration::from_secs(30),
        wait: Duration::from_millis(100),
        poll: Duration::from_millis(10),
        check_integrity: false,
        backup: false,
    }
}

/// Configuration without flag tooling or delays, for adapter tests.
pub(crate) fn quick_config() -> Config {
    Config {
        lock_wait_ms: 100,
        lock_poll_ms: 10,
        unlock_backoff_ms: 1,
        settle_delay_ms: 1,
        use_immutable_flag: false,
        allow_privilege_escalation: false,
        ..Config::default()
    }
}

#[cfg(unix)]
pub(crate) fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).unwrap().permissions().mode() & 0o777
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
}
