//! Native permission-bit handling.

use crate::error::{Result, WardenError};
use std::fs;
use std::path::Path;

/// Mode applied when locking.
pub const LOCKED_MODE: u32 = 0o444;

/// Mode restored when unlocking.
pub const UNLOCKED_MODE: u32 = 0o644;

#[cfg(unix)]
pub fn set_read_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(LOCKED_MODE))
        .map_err(|e| WardenError::io("set read-only permissions on", path, e))
}

#[cfg(not(unix))]
pub fn set_read_only(path: &Path) -> Result<()> {
    set_readonly_attribute(path, true)
}

#[cfg(unix)]
pub fn set_writable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(UNLOCKED_MODE))
        .map_err(|e| WardenError::io("restore write permissions on", path, e))
}

#[cfg(not(unix))]
pub fn set_writable(path: &Path) -> Result<()> {
    set_readonly_attribute(path, false)
}

#[cfg(not(unix))]
fn set_readonly_attribute(path: &Path, readonly: bool) -> Result<()> {
    let mut permissions = fs::metadata(path)
        .map_err(|e| WardenError::io("inspect", path, e))?
        .permissions();
    permissions.set_readonly(readonly);
    fs::set_permissions(path, permissions)
        .map_err(|e| WardenError::io("change the read-only attribute of", path, e))
}

/// Octal permission string (`644`). Platforms without mode bits report `444`
/// or `666` from the read-only attribute.
pub fn permission_octal(metadata: &fs::Metadata) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        format!("{:03o}", metadata.permissions().mode() & 0o777)
    }
    #[cfg(not(unix))]
    {
        if metadata.permissions().readonly() {
            "444".to_string()
        } else {
            "666".to_string()
        }
    }
}

/// Whether the current process can write to `path`.
///
/// Mode bits are checked as well as `access(2)` so a root caller, which
/// `access` never denies, still sees a 0444 file as not writable.
///
/// # Errors
///
/// `NotFound` if the file is missing; other probe failures map to `Filesystem`.
#[cfg(unix)]
pub fn is_writable(path: &Path) -> Result<bool> {
    use nix::errno::Errno;
    use nix::unistd::{AccessFlags, access};
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(|e| WardenError::io("inspect", path, e))?;
    if metadata.permissions().mode() & 0o222 == 0 {
        return Ok(false);
    }

    match access(path, AccessFlags::W_OK) {
        Ok(()) => Ok(true),
        Err(Errno::EACCES | Errno::EPERM | Errno::EROFS | Errno::ETXTBSY) => Ok(false),
        Err(Errno::ENOENT) => Err(WardenError::NotFound {
            path: path.to_path_buf(),
        }),
        Err(errno) => Err(WardenError::Filesystem(format!(
            "failed to probe write access on '{}': {}",
            path.display(),
            errno.desc()
        ))),
    }
}

#[cfg(not(unix))]
pub fn is_writable(path: &Path) -> Result<bool> {
    let metadata = fs::metadata(path).map_err(|e| WardenError::io("inspect", path, e))?;
    Ok(!metadata.permissions().readonly())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_only_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("f.txt");
        fs::write(&file, "x").unwrap();

        assert!(is_writable(&file).unwrap());
        set_read_only(&file).unwrap();
        assert!(!is_writable(&file).unwrap());
        assert!(fs::metadata(&file).unwrap().permissions().readonly());

        set_writable(&file).unwrap();
        assert!(is_writable(&file).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn octal_reports_mode_bits() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("f.txt");
        fs::write(&file, "x").unwrap();

        set_read_only(&file).unwrap();
        assert_eq!(permission_octal(&fs::metadata(&file).unwrap()), "444");
        set_writable(&file).unwrap();
        assert_eq!(permission_octal(&fs::metadata(&file).unwrap()), "644");
    }

    #[test]
    fn missing_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let err = is_writable(&temp_dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, WardenError::NotFound { .. }));
    }
}
