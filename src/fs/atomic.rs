//! Atomic filesystem writes.
//!
//! All atomic writes follow this pattern:
//! 1. Write content to a uniquely named temporary file in the same directory
//! 2. Copy the target's permission bits onto the temporary file
//! 3. Sync the file to disk (fsync)
//! 4. Atomically replace the original file
//!
//! # Cross-Platform Behavior
//!
//! - **POSIX (Linux, macOS)**: Uses `rename()` which is atomic if source and
//!   destination are on the same filesystem.
//! - **Windows**: Tries `std::fs::rename()` first and falls back to
//!   `MoveFileExW` with `MOVEFILE_REPLACE_EXISTING` for existing targets.
//!
//! On crash a temporary file named `.{filename}.{uuid}.tmp` may remain next
//! to the target. The target itself is always either old or new content.

use crate::error::{Result, WardenError};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomically write bytes to a file.
///
/// The target is never observed in a partial state: readers see either the
/// old content or the new content. When the target already exists its
/// permission bits carry over to the replacement.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| WardenError::io("create directory", parent, e))?;
    }

    let permissions = fs::metadata(path).ok().map(|m| m.permissions());
    let temp_path = temp_path_for(path)?;

    write_and_sync(&temp_path, content, permissions)?;
    atomic_replace(&temp_path, path)?;

    Ok(())
}

/// Atomically write a string to a file.
pub fn atomic_write_str<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

/// Temporary sibling path for `target`, unique per call.
pub(crate) fn temp_path_for(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| WardenError::InvalidPath {
            reason: format!("'{}' has no file name", target.display()),
        })?;

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    Ok(parent.join(format!(".{}.{}.tmp", filename, &suffix[..12])))
}

fn write_and_sync(path: &Path, content: &[u8], permissions: Option<fs::Permissions>) -> Result<()> {
    let mut file = File::options()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| WardenError::io("create temporary file", path, e))?;

    let result = file
        .write_all(content)
        .and_then(|()| match permissions {
            // A read-only source would make the temp file unwritable on Windows.
            Some(perms) if !perms.readonly() => file.set_permissions(perms),
            _ => Ok(()),
        })
        .and_then(|()| file.sync_all());

    if let Err(e) = result {
        let _ = fs::remove_file(path);
        return Err(WardenError::io("write temporary file", path, e));
    }

    Ok(())
}

#[cfg(unix)]
fn atomic_replace(source: &Path, target: &Path) -> Result<()> {
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        WardenError::io("atomically replace", target, e)
    })?;

    // Persist the directory entry.
    if let Some(parent) = target.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

#[cfg(windows)]
fn atomic_replace(source: &Path, target: &Path) -> Result<()> {
    use std::os::windows::ffi::OsStrExt;

    match fs::rename(source, target) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => {
            let _ = fs::remove_file(source);
            return Err(WardenError::io("atomically replace", target, e));
        }
    }

    unsafe {
        let source_wide: Vec<u16> = source
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let target_wide: Vec<u16> = target
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        const MOVEFILE_REPLACE_EXISTING: u32 = 0x1;
        const MOVEFILE_WRITE_THROUGH: u32 = 0x8;

        #[link(name = "kernel32")]
        unsafe extern "system" {
            fn MoveFileExW(
                lpExistingFileName: *const u16,
                lpNewFileName: *const u16,
                dwFlags: u32,
            ) -> i32;

            fn GetLastError() -> u32;
        }

        let result = MoveFileExW(
            source_wide.as_ptr(),
            target_wide.as_ptr(),
            MOVEFILE_REPLACE_EXISTING | MOVEFILE_WRITE_THROUGH,
        );

        if result == 0 {
            let error_code = GetLastError();
            let _ = fs::remove_file(source);
            return Err(WardenError::Filesystem(format!(
                "failed to atomically replace '{}': Windows error code {}",
                target.display(),
                error_code
            )));
        }
    }

    Ok(())
}
