//! Diagnostic reports for files that refuse to unlock.

use super::flags::ImmutabilityFlag;
use super::perms;
use crate::locks::{AtomicFileManager, marker_path};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Structured snapshot of why a file is (or is not) writable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    pub path: PathBuf,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_bits: Option<String>,
    /// `None` when the probe itself failed.
    pub writable: Option<bool>,
    /// `None` when flag inspection failed.
    pub immutable: Option<bool>,
    pub atomic_lock_present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_stale: Option<bool>,
    pub diagnosis: Vec<String>,
    pub recommendations: Vec<String>,
}

impl DiagnosticReport {
    /// One-line summary: the first finding, or an all-clear.
    pub fn summary(&self) -> String {
        self.diagnosis
            .first()
            .cloned()
            .unwrap_or_else(|| "no problems detected".to_string())
    }

    pub fn is_healthy(&self) -> bool {
        self.diagnosis.is_empty()
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Produces a [`DiagnosticReport`] for a path.
///
/// Adapters receive an implementation at construction and call it when
/// unlocking exhausts its retries.
pub trait Diagnostics: Send + Sync + fmt::Debug {
    fn diagnose(&self, path: &Path) -> DiagnosticReport;
}

/// Default diagnostics: inspects mode bits, the immutability flag and the
/// atomic lock artifacts next to the file.
#[derive(Debug)]
pub struct FileDiagnostics {
    flag: Arc<dyn ImmutabilityFlag>,
    locks: Arc<AtomicFileManager>,
}

impl FileDiagnostics {
    pub fn new(flag: Arc<dyn ImmutabilityFlag>, locks: Arc<AtomicFileManager>) -> Self {
        Self { flag, locks }
    }
}

impl Diagnostics for FileDiagnostics {
    fn diagnose(&self, path: &Path) -> DiagnosticReport {
        let metadata = fs::metadata(path).ok();
        let mut report = DiagnosticReport {
            path: path.to_path_buf(),
            exists: metadata.is_some(),
            permission_bits: metadata.as_ref().map(perms::permission_octal),
            writable: None,
            immutable: None,
            atomic_lock_present: marker_path(path).exists(),
            lock_owner: None,
            lock_stale: None,
            diagnosis: Vec::new(),
            recommendations: Vec::new(),
        };

        let Some(metadata) = metadata else {
            report.diagnosis.push("file does not exist".to_string());
            report
                .recommendations
                .push("check the path; a missing file cannot be locked or unlocked".to_string());
            return report;
        };

        report.writable = perms::is_writable(path).ok();
        report.immutable = self.flag.query(path).ok();
        if let Ok(Some(record)) = self.locks.get_lock_info(path) {
            report.lock_owner = Some(record.owner_description());
            report.lock_stale = Some(record.is_stale());
        }

        if report.immutable == Some(true) {
            report
                .diagnosis
                .push(format!("immutable flag ({}) is set", self.flag.name()));
            report.recommendations.push(match self.flag.manual_clear_command(path) {
                Some(command) => format!("clear the immutable flag with `{}`, then retry", command),
                None => "clear the immutable flag, then retry".to_string(),
            });
        } else if report.immutable.is_none() {
            report
                .diagnosis
                .push(format!("could not inspect the {} flag", self.flag.name()));
        }

        if metadata.permissions().readonly() {
            report.diagnosis.push(format!(
                "permission bits {} deny writes",
                report.permission_bits.as_deref().unwrap_or("?")
            ));
            report.recommendations.push(if cfg!(windows) {
                format!("run `attrib -R \"{}\"`", path.display())
            } else {
                format!("run `chmod 644 {}`", shell_words::quote(&path.to_string_lossy()))
            });
        }

        if report.atomic_lock_present {
            match (&report.lock_owner, report.lock_stale) {
                (Some(owner), Some(false)) => {
                    report
                        .diagnosis
                        .push(format!("operation lock held by {}", owner));
                    report.recommendations.push(
                        "wait for the other operation to finish, then retry".to_string(),
                    );
                }
                (Some(_), Some(true)) => {
                    report.diagnosis.push("a stale operation lock is present".to_string());
                    report
                        .recommendations
                        .push(release_hint(path));
                }
                _ => {
                    report
                        .diagnosis
                        .push("operation lock metadata is missing or corrupt".to_string());
                    report.recommendations.push(release_hint(path));
                }
            }
        }

        if report.writable == Some(false)
            && report.immutable != Some(true)
            && !metadata.permissions().readonly()
        {
            report
                .diagnosis
                .push("the OS denies write access despite writable permission bits".to_string());
            report.recommendations.push(
                "check file ownership, ACLs and whether the filesystem is mounted read-only"
                    .to_string(),
            );
        }

        report
    }
}

fn release_hint(path: &Path) -> String {
    format!(
        "run `filewarden release {}` to remove it",
        shell_words::quote(&path.to_string_lossy())
    )
}
