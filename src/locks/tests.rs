//! Tests for the locks subsystem.

use super::manager::write_restoring;
use super::types::reclaim_guard_path;
use super::*;
use crate::error::WardenError;
use crate::fs::sha256_hex;
use crate::test_support::{Sandbox, quick_lock_options};
use chrono::{Duration as ChronoDuration, Utc};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn sample_record() -> LockRecord {
    LockRecord::new(
        "id-1".to_string(),
        PathBuf::from("/srv/a.txt"),
        30_000,
    )
}

#[test]
fn test_lock_record_creation() {
    let record = sample_record();

    assert!(record.owner_user.contains('@'));
    assert_eq!(record.owner_pid, std::process::id());
    assert!(record.checksum.is_none());
    assert!(record.age().num_seconds() < 60);
    #[cfg(unix)]
    assert!(record.owner_uid.is_some());
}

#[test]
fn test_lock_record_serialization() {
    let record = sample_record();
    let json = record.to_json().unwrap();

    assert!(json.contains("lock_id"));
    assert!(json.contains("acquired_at"));
    assert!(!json.contains("checksum"));

    let parsed: LockRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, record);
}

#[test]
fn test_lock_record_age_string() {
    let mut record = sample_record();
    assert!(record.age_string().ends_with('s'));

    record.acquired_at = Utc::now() - ChronoDuration::minutes(5);
    assert_eq!(record.age_string(), "5m");

    record.acquired_at = Utc::now() - ChronoDuration::hours(2);
    assert!(record.age_string().starts_with("2h"));

    record.acquired_at = Utc::now() - ChronoDuration::days(3);
    assert!(record.age_string().starts_with("3d"));
}

#[test]
fn test_lock_record_is_stale() {
    let mut record = sample_record();
    assert!(!record.is_stale());

    record.acquired_at = Utc::now() - ChronoDuration::seconds(31);
    assert!(record.is_stale());
}

#[test]
fn test_lock_record_with_huge_timeout_never_goes_stale() {
    let mut record = sample_record();
    record.stale_after_ms = u64::MAX;
    record.acquired_at = Utc::now() - ChronoDuration::days(365);
    assert!(!record.is_stale());

    // Clock skew: a record from the future is fresh, not stale.
    record.stale_after_ms = 0;
    record.acquired_at = Utc::now() + ChronoDuration::minutes(5);
    assert!(!record.is_stale());
}

#[test]
fn test_huge_stale_timeout_keeps_lock_exclusive() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    let manager = sandbox.manager();
    let options = quick_lock_options()
        .with_stale_after(Duration::from_millis(u64::MAX))
        .with_wait(Duration::ZERO);

    let first = manager.acquire_lock(&file, &options).unwrap();
    let err = manager.acquire_lock(&file, &options).unwrap_err();
    assert!(matches!(err, WardenError::AlreadyLocked { .. }));
    assert_eq!(manager.get_lock_info(&file).unwrap().unwrap().lock_id, first);
}

#[test]
fn test_acquire_creates_marker_and_metadata() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    let manager = sandbox.manager();

    let lock_id = manager.acquire_lock(&file, manager.defaults()).unwrap();

    let marker = marker_path(&file);
    assert_eq!(fs::read_to_string(&marker).unwrap(), lock_id);

    let record = LockRecord::from_file(metadata_path(&file)).unwrap();
    assert_eq!(record.lock_id, lock_id);
    assert_eq!(record.file_path, file);
    assert_eq!(record.stale_after_ms, 30_000);
    assert!(manager.is_file_locked(&file).unwrap());
}

#[test]
fn test_acquire_same_lock_twice_fails() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    let first = sandbox.manager();
    let second = sandbox.manager();

    let lock_id = first.acquire_lock(&file, first.defaults()).unwrap();

    let err = second.acquire_lock(&file, second.defaults()).unwrap_err();
    assert!(matches!(err, WardenError::AlreadyLocked { .. }));
    assert!(err.to_string().contains("pid"));

    first.release_lock(&file, &lock_id).unwrap();
    let again = second.acquire_lock(&file, second.defaults()).unwrap();
    assert_ne!(again, lock_id);
}

#[test]
fn test_acquire_waits_for_release() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    let holder = Arc::new(sandbox.manager());
    let lock_id = holder.acquire_lock(&file, holder.defaults()).unwrap();

    let releaser = {
        let holder = holder.clone();
        let file = file.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            holder.release_lock(&file, &lock_id).unwrap();
        })
    };

    let waiter = sandbox.manager();
    let options = quick_lock_options().with_wait(Duration::from_secs(5));
    assert!(waiter.acquire_lock(&file, &options).is_ok());
    releaser.join().unwrap();
}

#[test]
fn test_release_with_wrong_id_fails() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    let manager = sandbox.manager();
    let lock_id = manager.acquire_lock(&file, manager.defaults()).unwrap();

    let err = manager.release_lock(&file, "not-the-id").unwrap_err();
    assert!(matches!(err, WardenError::InvalidLockId { .. }));

    // The real holder is unaffected.
    assert!(manager.is_file_locked(&file).unwrap());
    manager.release_lock(&file, &lock_id).unwrap();
}

#[test]
fn test_release_removes_artifacts() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    let manager = sandbox.manager();
    let lock_id = manager.acquire_lock(&file, manager.defaults()).unwrap();

    manager.release_lock(&file, &lock_id).unwrap();

    assert!(!marker_path(&file).exists());
    assert!(!metadata_path(&file).exists());
    assert!(!manager.is_file_locked(&file).unwrap());
    assert!(manager.list_held().is_empty());
}

#[test]
fn test_release_unlocked_fails() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    let manager = sandbox.manager();

    let err = manager.release_lock(&file, "anything").unwrap_err();
    assert!(matches!(err, WardenError::NotLocked { .. }));
}

#[test]
fn test_stale_lock_is_reclaimed() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    let manager = sandbox.manager();
    let options = quick_lock_options().with_stale_after(Duration::from_millis(500));

    let first = manager.acquire_lock(&file, &options).unwrap();
    thread::sleep(Duration::from_millis(600));
    let second = manager.acquire_lock(&file, &options).unwrap();

    assert_ne!(first, second);
    let record = manager.get_lock_info(&file).unwrap().unwrap();
    assert_eq!(record.lock_id, second);

    let err = manager.release_lock(&file, &first).unwrap_err();
    assert!(matches!(err, WardenError::InvalidLockId { .. }));
}

#[test]
fn test_stale_lock_without_metadata_ages_by_marker() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    fs::write(marker_path(&file), "crashed-holder").unwrap();
    let manager = sandbox.manager();

    // Fresh orphan marker still blocks.
    let err = manager.acquire_lock(&file, manager.defaults()).unwrap_err();
    assert!(matches!(err, WardenError::AlreadyLocked { ref owner, .. } if owner == "unknown"));
    assert!(manager.is_file_locked(&file).unwrap());

    thread::sleep(Duration::from_millis(60));
    let options = quick_lock_options().with_stale_after(Duration::from_millis(20));
    let lock_id = manager.acquire_lock(&file, &options).unwrap();
    assert_eq!(fs::read_to_string(marker_path(&file)).unwrap(), lock_id);
}

#[test]
fn test_abandoned_reclaim_guard_blocks_until_stale() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    let crashed = sandbox.manager();
    let short = quick_lock_options().with_stale_after(Duration::from_millis(20));
    crashed.acquire_lock(&file, &short).unwrap();
    let guard = reclaim_guard_path(&marker_path(&file));
    fs::write(&guard, "").unwrap();
    thread::sleep(Duration::from_millis(60));

    let manager = sandbox.manager();
    let long_lived = quick_lock_options().with_wait(Duration::ZERO);
    let err = manager.acquire_lock(&file, &long_lived).unwrap_err();
    assert!(matches!(err, WardenError::AlreadyLocked { .. }));
    assert!(guard.exists());

    let lock_id = manager.acquire_lock(&file, &short).unwrap();
    assert_eq!(fs::read_to_string(marker_path(&file)).unwrap(), lock_id);
    assert!(!guard.exists());
}

#[test]
fn test_corrupt_metadata_reads_as_unlocked() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    fs::write(marker_path(&file), "some-id").unwrap();
    fs::write(metadata_path(&file), "{not json").unwrap();
    let manager = sandbox.manager();

    assert!(!manager.is_file_locked(&file).unwrap());
    assert!(manager.get_lock_info(&file).unwrap().is_none());
    // Not auto-repaired.
    assert!(metadata_path(&file).exists());

    assert!(manager.force_release_lock(&file).unwrap().is_none());
    assert!(!marker_path(&file).exists());
    assert!(!metadata_path(&file).exists());
}

#[test]
fn test_force_release_returns_record() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    let holder = sandbox.manager();
    let lock_id = holder.acquire_lock(&file, holder.defaults()).unwrap();

    let other = sandbox.manager();
    let record = other.force_release_lock(&file).unwrap().unwrap();
    assert_eq!(record.lock_id, lock_id);
    assert!(!other.is_file_locked(&file).unwrap());

    let err = other.force_release_lock(&file).unwrap_err();
    assert!(matches!(err, WardenError::NotLocked { .. }));
}

#[test]
fn test_concurrent_acquisitions_have_one_winner() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("contended.txt", "x");
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let validator = sandbox.validator.clone();
            let barrier = barrier.clone();
            let file = file.clone();
            thread::spawn(move || {
                let manager = AtomicFileManager::new(validator);
                let options = quick_lock_options().with_wait(Duration::ZERO);
                barrier.wait();
                // Keep the manager alive so a winner's lock is not released early.
                let result = manager.acquire_lock(&file, &options);
                (manager, result)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|(_, r)| r.is_ok()).count();
    assert_eq!(winners, 1);
    for (_, result) in &results {
        if let Err(e) = result {
            assert!(matches!(e, WardenError::AlreadyLocked { .. }), "{e}");
        }
    }
}

#[test]
fn test_concurrent_reclaim_of_stale_lock_has_one_winner() {
    let sandbox = Sandbox::new();

    for round in 0..10 {
        let file = sandbox.file(&format!("stale-{round}.txt"), "x");
        let crashed = sandbox.manager();
        let short = quick_lock_options().with_stale_after(Duration::from_millis(20));
        crashed.acquire_lock(&file, &short).unwrap();
        thread::sleep(Duration::from_millis(60));

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let validator = sandbox.validator.clone();
                let barrier = barrier.clone();
                let file = file.clone();
                thread::spawn(move || {
                    let manager = AtomicFileManager::new(validator);
                    // The stale record carries its own short timeout; new ones are long-lived.
                    let options = quick_lock_options().with_wait(Duration::ZERO);
                    barrier.wait();
                    let result = manager.acquire_lock(&file, &options);
                    (manager, result)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<&String> = results.iter().filter_map(|(_, r)| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1, "round {round}: {results:?}");
        assert_eq!(fs::read_to_string(marker_path(&file)).unwrap(), *winners[0]);
        for (_, result) in &results {
            if let Err(e) = result {
                assert!(matches!(e, WardenError::AlreadyLocked { .. }), "{e}");
            }
        }
    }
}

#[test]
fn test_guard_releases_on_drop() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    let manager = sandbox.manager();

    {
        let guard = manager.acquire_guard(&file, manager.defaults()).unwrap();
        assert_eq!(guard.path(), file);
        assert!(manager.is_file_locked(&file).unwrap());
    }

    assert!(!manager.is_file_locked(&file).unwrap());
    assert!(!marker_path(&file).exists());
}

#[test]
fn test_guard_manual_release() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    let manager = sandbox.manager();

    let guard = manager.acquire_guard(&file, manager.defaults()).unwrap();
    guard.release().unwrap();

    assert!(!marker_path(&file).exists());
}

#[test]
fn test_integrity_checksum_captured_at_acquisition() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    let manager = sandbox.manager();
    let options = quick_lock_options().with_integrity(true);

    manager.acquire_lock(&file, &options).unwrap();

    let record = manager.get_lock_info(&file).unwrap().unwrap();
    assert_eq!(record.checksum.as_deref(), Some(sha256_hex(b"hello").as_str()));
}

#[test]
fn test_out_of_band_modification_is_detected() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    let manager = sandbox.manager();
    manager
        .acquire_lock(&file, &quick_lock_options().with_integrity(true))
        .unwrap();

    fs::write(&file, "tampered").unwrap();

    let read = ReadOptions {
        verify_integrity: true,
    };
    let err = manager.atomic_read(&file, &read).unwrap_err();
    assert!(matches!(err, WardenError::IntegrityViolation { .. }));

    let write = WriteOptions {
        verify_integrity: true,
        ..WriteOptions::default()
    };
    let err = manager.atomic_write(&file, b"new", &write).unwrap_err();
    assert!(matches!(err, WardenError::IntegrityViolation { .. }));
    assert_eq!(fs::read_to_string(&file).unwrap(), "tampered");

    // Without verification the read still succeeds.
    assert_eq!(
        manager.atomic_read(&file, &ReadOptions::default()).unwrap(),
        b"tampered"
    );
}

#[test]
fn test_write_under_lock_refreshes_checksum() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "hello");
    let manager = sandbox.manager();
    manager
        .acquire_lock(&file, &quick_lock_options().with_integrity(true))
        .unwrap();

    let write = WriteOptions {
        verify_integrity: true,
        ..WriteOptions::default()
    };
    let outcome = manager.atomic_write(&file, b"updated", &write).unwrap();
    assert_eq!(outcome.checksum, Some(sha256_hex(b"updated")));

    let read = ReadOptions {
        verify_integrity: true,
    };
    assert_eq!(manager.atomic_read(&file, &read).unwrap(), b"updated");
}

#[test]
fn test_atomic_write_then_read_round_trip() {
    let sandbox = Sandbox::new();
    let manager = sandbox.manager();
    let file = sandbox.path().join("new.bin");
    let data: Vec<u8> = (0..=255).collect();

    let outcome = manager
        .atomic_write(&file, &data, &WriteOptions::default())
        .unwrap();
    assert_eq!(outcome.bytes_written, 256);
    assert!(outcome.backup.is_none());

    assert_eq!(
        manager.atomic_read(&file, &ReadOptions::default()).unwrap(),
        data
    );
}

#[test]
fn test_backup_kept_and_restored() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "original");
    let manager = sandbox.manager();

    let write = WriteOptions {
        backup: true,
        keep_backup: true,
        ..WriteOptions::default()
    };
    let outcome = manager.atomic_write(&file, b"replacement", &write).unwrap();
    let backup = outcome.backup.unwrap();
    assert_eq!(fs::read_to_string(&backup).unwrap(), "original");
    assert_eq!(fs::read_to_string(&file).unwrap(), "replacement");

    manager.restore_backup(&file, &backup).unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), "original");
    assert!(!backup.exists());
}

#[test]
fn test_failed_write_restores_original_from_backup() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "original");
    let backup = sandbox.path().join("a.txt.manual.bak");
    fs::copy(&file, &backup).unwrap();

    let err = write_restoring(&file, Some(&backup), || {
        fs::write(&file, "half-writ").unwrap();
        Err(WardenError::Filesystem("disk full".to_string()))
    })
    .unwrap_err();

    assert!(matches!(err, WardenError::Filesystem(ref msg) if msg == "disk full"));
    assert_eq!(fs::read_to_string(&file).unwrap(), "original");
    assert!(!backup.exists());
    let leftovers: Vec<_> = fs::read_dir(sandbox.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".bak") || name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn test_failed_write_without_backup_propagates() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "original");

    let err = write_restoring(&file, None, || {
        Err(WardenError::Filesystem("rename failed".to_string()))
    })
    .unwrap_err();
    assert!(matches!(err, WardenError::Filesystem(_)));
    assert_eq!(fs::read_to_string(&file).unwrap(), "original");
}

#[test]
fn test_successful_write_keeps_backup_for_caller() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "original");
    let backup = sandbox.path().join("a.txt.manual.bak");
    fs::copy(&file, &backup).unwrap();

    write_restoring(&file, Some(&backup), || {
        fs::write(&file, "new").map_err(|e| WardenError::io("write", &file, e))
    })
    .unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), "new");
    assert!(backup.exists());
}

#[test]
fn test_backup_removed_after_success() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "original");
    let manager = sandbox.manager();

    let write = WriteOptions {
        backup: true,
        ..WriteOptions::default()
    };
    manager.atomic_write(&file, b"replacement", &write).unwrap();

    let leftovers: Vec<_> = fs::read_dir(sandbox.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".bak"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn test_acquisition_backup_removed_on_release() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "snapshot me");
    let manager = sandbox.manager();

    let lock_id = manager
        .acquire_lock(&file, &quick_lock_options().with_backup(true))
        .unwrap();
    let backup = manager
        .get_lock_info(&file)
        .unwrap()
        .unwrap()
        .backup_path
        .unwrap();
    assert_eq!(fs::read_to_string(&backup).unwrap(), "snapshot me");

    manager.release_lock(&file, &lock_id).unwrap();
    assert!(!backup.exists());
}

#[test]
fn test_list_held_and_cleanup() {
    let sandbox = Sandbox::new();
    let a = sandbox.file("a.txt", "a");
    let b = sandbox.file("b.txt", "b");
    let manager = sandbox.manager();

    let id_a = manager.acquire_lock(&a, manager.defaults()).unwrap();
    manager.acquire_lock(&b, manager.defaults()).unwrap();

    let held = manager.list_held();
    assert_eq!(held.len(), 2);
    assert_eq!(held[0].path, a);
    assert_eq!(held[0].lock_id, id_a);

    assert_eq!(manager.cleanup().unwrap(), 2);
    assert!(manager.list_held().is_empty());
    assert!(!marker_path(&a).exists());
    assert!(!marker_path(&b).exists());
}

#[test]
fn test_cleanup_skips_locks_taken_over() {
    let sandbox = Sandbox::new();
    let file = sandbox.file("a.txt", "a");
    let manager = sandbox.manager();
    manager.acquire_lock(&file, manager.defaults()).unwrap();

    sandbox.manager().force_release_lock(&file).unwrap();

    assert_eq!(manager.cleanup().unwrap(), 0);
    assert!(manager.list_held().is_empty());
}

#[test]
fn test_paths_outside_validator_are_rejected() {
    let sandbox = Sandbox::new();
    let elsewhere = tempfile::TempDir::new().unwrap();
    let file = elsewhere.path().join("x.txt");
    fs::write(&file, "x").unwrap();
    let manager = sandbox.manager();

    let err = manager.acquire_lock(&file, manager.defaults()).unwrap_err();
    assert!(matches!(err, WardenError::OutsideAllowedDirectories { .. }));
    assert!(!marker_path(&file).exists());
}

#[test]
fn test_get_owner_string() {
    let owner = record::get_owner_string();
    assert!(owner.contains('@'));
}
