//! Text rendering for command results.

use crate::error::{Result, WardenError};
use crate::locks::LockRecord;
use crate::platform::{DiagnosticReport, FlagStatus, LockOutcome, SecurityInfo, UnlockOutcome};
use crate::sanitize::SanitizedError;
use serde::Serialize;
use std::path::Path;

pub fn format_lock_outcome(outcome: &LockOutcome) -> String {
    let path = outcome.path.display();
    if !outcome.changed {
        return format!("{}: already locked", path);
    }
    match &outcome.flag {
        FlagStatus::Applied => format!("{}: locked (immutable)", path),
        FlagStatus::Failed(_) => format!("{}: locked (read-only; immutable flag not set)", path),
        FlagStatus::Skipped | FlagStatus::Unsupported => format!("{}: locked (read-only)", path),
    }
}

pub fn format_unlock_outcome(outcome: &UnlockOutcome) -> String {
    let path = outcome.path.display();
    if !outcome.changed {
        format!("{}: already unlocked", path)
    } else if outcome.attempts > 1 {
        format!("{}: unlocked after {} attempts", path, outcome.attempts)
    } else {
        format!("{}: unlocked", path)
    }
}

pub fn print_lock_outcome(outcome: &LockOutcome) {
    println!("{}", format_lock_outcome(outcome));
}

pub fn print_unlock_outcome(outcome: &UnlockOutcome) {
    println!("{}", format_unlock_outcome(outcome));
}

pub fn print_status(path: &Path, locked: bool) {
    println!(
        "{}: {}",
        path.display(),
        if locked { "locked" } else { "unlocked" }
    );
}

/// Print the protection state of a file.
pub fn print_security_info(info: &SecurityInfo) {
    println!("{}:", info.path.display());
    println!("  Platform:     {}", info.platform);
    println!("  Permissions:  {}", info.permission_bits);
    println!("  Read-only:    {}", yes_no(info.is_read_only));
    println!("  Immutable:    {}", yes_no(info.is_immutable));
    if let Some(modified) = info.last_modified {
        println!("  Modified:     {}", modified.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(checksum) = &info.checksum {
        println!("  SHA-256:      {}", checksum);
    }
}

/// Print a diagnostic report.
pub fn print_report(report: &DiagnosticReport) {
    println!("Diagnostics for {}:", report.path.display());
    if !report.exists {
        println!("  File does not exist.");
    }
    if let Some(bits) = &report.permission_bits {
        println!("  Permissions:  {}", bits);
    }
    println!("  Writable:     {}", tri_state(report.writable));
    println!("  Immutable:    {}", tri_state(report.immutable));
    println!("  Atomic lock:  {}", yes_no(report.atomic_lock_present));
    if let Some(owner) = &report.lock_owner {
        let stale = if report.lock_stale == Some(true) { " (stale)" } else { "" };
        println!("  Lock owner:   {}{}", owner, stale);
    }

    if report.is_healthy() {
        println!();
        println!("No problems detected.");
        return;
    }

    println!();
    println!("Findings ({}):", report.diagnosis.len());
    for (i, finding) in report.diagnosis.iter().enumerate() {
        println!("  {}. {}", i + 1, finding);
    }
    if !report.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for recommendation in &report.recommendations {
            println!("  - {}", recommendation);
        }
    }
}

pub fn print_released(path: &Path, record: Option<&LockRecord>) {
    match record {
        Some(record) => {
            println!("Released lock on {}:", path.display());
            println!("    Owner:      {}", record.owner_description());
            println!(
                "    Acquired:   {}",
                record.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("    Age:        {}", record.age_string());
            if record.is_stale() {
                println!("    Status:     STALE");
            }
        }
        None => println!(
            "Removed lock files for {} (metadata missing or unreadable).",
            path.display()
        ),
    }
}

/// Pretty-printed JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| WardenError::Unknown(format!("failed to render JSON: {}", e)))?;
    println!("{}", text);
    Ok(())
}

/// Per-path failure line for multi-path commands.
pub fn print_path_error(path: &str, error: &SanitizedError) {
    eprintln!("{}: {}", path, error.message);
}

/// The final user-facing error: message plus remediation.
pub fn print_error(error: &SanitizedError) {
    eprintln!("Error: {}", error.message);
    if let Some(fix) = &error.remediation {
        eprintln!("  Fix: {}", fix);
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn tri_state(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "yes",
        Some(false) => "no",
        None => "unknown",
    }
}
