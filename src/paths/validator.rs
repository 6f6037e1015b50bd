//! Path validation and canonicalization.

use super::reserved::is_reserved_name;
use crate::config::Config;
use crate::decode::{self, MAX_DECODE_ROUNDS};
use crate::error::{Result, WardenError};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Maximum total path length in bytes.
pub const MAX_PATH_LENGTH: usize = 4096;

/// Maximum length of a single path component in bytes.
pub const MAX_COMPONENT_LENGTH: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathLimits {
    pub max_path_length: usize,
    pub max_component_length: usize,
    pub decode_rounds: usize,
}

impl Default for PathLimits {
    fn default() -> Self {
        Self {
            max_path_length: MAX_PATH_LENGTH,
            max_component_length: MAX_COMPONENT_LENGTH,
            decode_rounds: MAX_DECODE_ROUNDS,
        }
    }
}

/// Expected kind of filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKind::File => write!(f, "file"),
            PathKind::Directory => write!(f, "directory"),
        }
    }
}

/// Access mode checked by [`PathValidator::validate_file_access`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    Execute,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => write!(f, "read"),
            AccessMode::Write => write!(f, "write"),
            AccessMode::Execute => write!(f, "execute"),
        }
    }
}

/// Validates untrusted path strings before they reach the filesystem or the
/// command executor.
///
/// Validation rejects rather than repairs: a path with a traversal segment,
/// a reserved device name or a control character is an error, never a
/// silently "fixed" path.
///
/// The allowed-directory set is seeded at construction and grows only
/// through [`PathValidator::allow_directory`].
#[derive(Debug)]
pub struct PathValidator {
    allowed: RwLock<Vec<PathBuf>>,
    enforce_allowed: bool,
    limits: PathLimits,
}

impl PathValidator {
    /// Create a validator whose allowed set is the working directory plus the
    /// system temp directories.
    pub fn new() -> Result<Self> {
        let validator = Self::restricted_to(std::iter::empty::<PathBuf>())?;
        let cwd = current_dir()?;
        validator.allow_directory(&cwd)?;
        for dir in temp_roots() {
            if let Err(e) = validator.allow_directory(&dir) {
                debug!(dir = %dir.display(), error = %e, "skipping temp directory");
            }
        }
        Ok(validator)
    }

    /// Create a validator that accepts only paths under `dirs`.
    pub fn restricted_to<I, P>(dirs: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let validator = Self {
            allowed: RwLock::new(Vec::new()),
            enforce_allowed: true,
            limits: PathLimits::default(),
        };
        for dir in dirs {
            validator.allow_directory(dir)?;
        }
        Ok(validator)
    }

    /// Create a validator that skips the allowed-directory check.
    ///
    /// Every other rule still applies. Intended for tests and ephemeral contexts.
    pub fn unrestricted() -> Self {
        Self {
            allowed: RwLock::new(Vec::new()),
            enforce_allowed: false,
            limits: PathLimits::default(),
        }
    }

    /// Create the default validator extended with the configured directories.
    pub fn from_config(config: &Config) -> Result<Self> {
        let validator = Self::new()?;
        for dir in &config.allowed_directories {
            validator.allow_directory(dir)?;
        }
        Ok(validator)
    }

    pub fn with_limits(mut self, limits: PathLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &PathLimits {
        &self.limits
    }

    /// Register an additional allowed root. Returns its canonical form.
    pub fn allow_directory(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        if !dir.is_absolute() {
            return Err(WardenError::InvalidPath {
                reason: format!("allowed directory '{}' must be absolute", dir.display()),
            });
        }
        let canonical = dir
            .canonicalize()
            .map_err(|e| WardenError::io("register allowed directory", dir, e))?;
        if !canonical.is_dir() {
            return Err(WardenError::InvalidPath {
                reason: format!("allowed directory '{}' is not a directory", dir.display()),
            });
        }

        let mut allowed = self.allowed.write().unwrap_or_else(PoisonError::into_inner);
        if !allowed.contains(&canonical) {
            allowed.push(canonical.clone());
        }
        Ok(canonical)
    }

    pub fn allowed_directories(&self) -> Vec<PathBuf> {
        self.allowed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a canonical path lies under a registered allowed directory.
    pub fn is_within_allowed(&self, path: &Path) -> bool {
        if !self.enforce_allowed {
            return true;
        }
        self.allowed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|dir| path.starts_with(dir))
    }

    /// Validate an untrusted path string and return its canonical absolute form.
    ///
    /// Relative input is resolved against `base_dir` (default: the working
    /// directory) and must stay inside it. Absolute input must stay inside
    /// `base_dir` when one is given; without one it only has to fall within
    /// the allowed-directory set. Existing symlinks are resolved before the
    /// containment checks run again.
    ///
    /// # Errors
    ///
    /// * `InvalidPath` - empty input, null byte, control character
    /// * `PathTooLong` - total or component length over the limit
    /// * `PathTraversalDetected` - raw, encoded or confusable `..`, or escape after resolution
    /// * `ReservedName` - a component is a device name
    /// * `OutsideAllowedDirectories` - the result is outside the allowed set
    pub fn validate_and_sanitize(&self, input: &str, base_dir: Option<&Path>) -> Result<PathBuf> {
        self.check_input(input)?;

        let base = match base_dir {
            Some(dir) if dir.is_absolute() => lexical_normalize(dir),
            Some(dir) => lexical_normalize(&current_dir()?.join(dir)),
            None => current_dir()?,
        };

        let candidate = Path::new(input);
        let contain_in_base = base_dir.is_some() || !candidate.is_absolute();
        let resolved = if candidate.is_absolute() {
            lexical_normalize(candidate)
        } else {
            lexical_normalize(&base.join(candidate))
        };

        if contain_in_base && !resolved.starts_with(&base) {
            return Err(WardenError::PathTraversalDetected {
                reason: "resolved path escapes the base directory".to_string(),
            });
        }

        let canonical = canonicalize_lenient(&resolved)?;
        if contain_in_base {
            let canonical_base = canonicalize_lenient(&base)?;
            if !canonical.starts_with(&canonical_base) {
                return Err(WardenError::PathTraversalDetected {
                    reason: "symbolic link resolves outside the base directory".to_string(),
                });
            }
        }

        if !self.is_within_allowed(&canonical) {
            return Err(WardenError::OutsideAllowedDirectories { path: canonical });
        }

        Ok(canonical)
    }

    /// Convenience wrapper for callers holding a `Path`.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf> {
        let input = path.to_str().ok_or_else(|| WardenError::InvalidPath {
            reason: "path is not valid UTF-8".to_string(),
        })?;
        self.validate_and_sanitize(input, None)
    }

    /// Confirm `path` exists and is of the expected kind.
    pub fn validate_path_type(&self, path: &Path, expected: PathKind) -> Result<()> {
        let metadata = fs::metadata(path).map_err(|e| WardenError::io("inspect", path, e))?;
        let actual = if metadata.is_dir() {
            PathKind::Directory
        } else if metadata.is_file() {
            PathKind::File
        } else {
            return Err(WardenError::InvalidPath {
                reason: format!("expected a {}, found a special file", expected),
            });
        };

        if actual != expected {
            return Err(WardenError::InvalidPath {
                reason: format!("expected a {}, found a {}", expected, actual),
            });
        }
        Ok(())
    }

    /// Confirm the requested access mode is currently satisfiable.
    pub fn validate_file_access(&self, path: &Path, mode: AccessMode) -> Result<()> {
        check_access(path, mode)
    }

    /// Structural checks on the raw string. Nothing touches the filesystem here.
    fn check_input(&self, input: &str) -> Result<()> {
        if input.trim().is_empty() {
            return Err(WardenError::InvalidPath {
                reason: "path is empty".to_string(),
            });
        }
        if input.len() > self.limits.max_path_length {
            return Err(WardenError::PathTooLong {
                what: "length",
                length: input.len(),
                max: self.limits.max_path_length,
            });
        }
        if input.contains('\0') {
            return Err(WardenError::InvalidPath {
                reason: "path contains a null byte".to_string(),
            });
        }
        if input.chars().any(char::is_control) {
            return Err(WardenError::InvalidPath {
                reason: "path contains a control character".to_string(),
            });
        }

        if decode::has_parent_segment(input)
            || decode::has_parent_segment(&normalize_separators(input))
        {
            return Err(WardenError::PathTraversalDetected {
                reason: "parent-directory segment".to_string(),
            });
        }

        for layer in decode::decode_layers(input, self.limits.decode_rounds) {
            let folded = decode::fold_confusables(&layer);
            if decode::has_parent_segment(&folded) {
                return Err(WardenError::PathTraversalDetected {
                    reason: if layer == input {
                        "unicode-confusable parent-directory segment".to_string()
                    } else {
                        "encoded parent-directory segment".to_string()
                    },
                });
            }
            if folded.chars().any(char::is_control) {
                return Err(WardenError::InvalidPath {
                    reason: "path contains an encoded control character".to_string(),
                });
            }
        }

        for component in input.split(['/', '\\']) {
            if component.len() > self.limits.max_component_length {
                return Err(WardenError::PathTooLong {
                    what: "component",
                    length: component.len(),
                    max: self.limits.max_component_length,
                });
            }
            if is_reserved_name(component) {
                return Err(WardenError::ReservedName {
                    component: component.to_string(),
                });
            }
        }

        Ok(())
    }
}

fn current_dir() -> Result<PathBuf> {
    env::current_dir()
        .map_err(|e| WardenError::Filesystem(format!("failed to get current directory: {}", e)))
}

/// System temp roots seeded into every default validator.
fn temp_roots() -> Vec<PathBuf> {
    let mut roots = vec![env::temp_dir()];
    if cfg!(unix) {
        roots.push(PathBuf::from("/tmp"));
        roots.push(PathBuf::from("/var/tmp"));
    }
    roots.retain(|dir| dir.is_dir());
    roots
}

/// Collapse separators and `.` segments without touching `..` (rejected earlier).
fn normalize_separators(input: &str) -> String {
    input
        .replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve `.` and `..` components lexically.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Canonicalize the longest existing ancestor and re-append the remainder.
///
/// Lets callers validate paths that do not exist yet (atomic writes create them).
fn canonicalize_lenient(path: &Path) -> Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut remainder = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(canonical) => {
                let mut result = canonical;
                for part in remainder.iter().rev() {
                    result.push(part);
                }
                return Ok(result);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let Some(name) = existing.file_name().map(|n| n.to_os_string()) else {
                    return Err(WardenError::io("resolve", path, e));
                };
                remainder.push(name);
                if !existing.pop() {
                    return Err(WardenError::io("resolve", path, e));
                }
            }
            Err(e) => return Err(WardenError::io("resolve", path, e)),
        }
    }
}

#[cfg(unix)]
fn check_access(path: &Path, mode: AccessMode) -> Result<()> {
    use nix::errno::Errno;
    use nix::unistd::{AccessFlags, access};

    let flags = match mode {
        AccessMode::Read => AccessFlags::R_OK,
        AccessMode::Write => AccessFlags::W_OK,
        AccessMode::Execute => AccessFlags::X_OK,
    };

    access(path, flags).map_err(|errno| match errno {
        Errno::ENOENT | Errno::ENOTDIR => WardenError::NotFound {
            path: path.to_path_buf(),
        },
        Errno::EACCES | Errno::EPERM | Errno::EROFS | Errno::ETXTBSY => {
            WardenError::PermissionDenied {
                path: path.to_path_buf(),
                operation: format!("{} access", mode),
            }
        }
        other => WardenError::Filesystem(format!(
            "failed to check {} access on '{}': {}",
            mode,
            path.display(),
            other.desc()
        )),
    })
}

#[cfg(not(unix))]
fn check_access(path: &Path, mode: AccessMode) -> Result<()> {
    let metadata = fs::metadata(path).map_err(|e| WardenError::io("inspect", path, e))?;
    let denied = || WardenError::PermissionDenied {
        path: path.to_path_buf(),
        operation: format!("{} access", mode),
    };
    match mode {
        AccessMode::Write if metadata.permissions().readonly() => Err(denied()),
        AccessMode::Read if metadata.is_file() => fs::File::open(path)
            .map(|_| ())
            .map_err(|e| WardenError::io("read", path, e)),
        _ => Ok(()),
    }
}
