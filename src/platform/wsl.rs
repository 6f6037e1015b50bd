//! WSL: the same file may be mounted with Unix or Windows semantics.

use super::PlatformAdapter;
use super::diagnostics::DiagnosticReport;
use super::types::{LockOutcome, PlatformKind, SecurityInfo, UnlockOutcome};
use crate::error::{Result, WardenError};
use std::path::Path;
use tracing::debug;

/// Tries each strategy in order; the first success wins.
#[derive(Debug)]
pub struct WslAdapter {
    strategies: Vec<Box<dyn PlatformAdapter>>,
}

impl WslAdapter {
    pub fn new(strategies: Vec<Box<dyn PlatformAdapter>>) -> Self {
        Self { strategies }
    }

    /// Strategy kinds in the order they are tried.
    pub fn order(&self) -> Vec<PlatformKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    fn first_success<T>(
        &self,
        operation: &str,
        mut run: impl FnMut(&dyn PlatformAdapter) -> Result<T>,
    ) -> Result<T> {
        let mut last_error = None;
        for strategy in &self.strategies {
            match run(strategy.as_ref()) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(
                        operation,
                        strategy = %strategy.kind(),
                        error = %e,
                        "strategy failed; trying next"
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            WardenError::Config("WSL adapter has no strategies configured".to_string())
        }))
    }
}

impl PlatformAdapter for WslAdapter {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Wsl
    }

    fn lock_file(&self, path: &Path) -> Result<LockOutcome> {
        self.first_success("lock", |s| s.lock_file(path))
    }

    fn unlock_file(&self, path: &Path) -> Result<UnlockOutcome> {
        self.first_success("unlock", |s| s.unlock_file(path))
    }

    fn is_locked(&self, path: &Path) -> Result<bool> {
        self.first_success("is_locked", |s| s.is_locked(path))
    }

    fn security_info(&self, path: &Path, include_checksum: bool) -> Result<SecurityInfo> {
        let mut info =
            self.first_success("security_info", |s| s.security_info(path, include_checksum))?;
        info.platform = PlatformKind::Wsl;
        Ok(info)
    }

    fn diagnose(&self, path: &Path) -> Result<DiagnosticReport> {
        self.first_success("diagnose", |s| s.diagnose(path))
    }
}
