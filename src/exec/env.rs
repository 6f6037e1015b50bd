//! Environment sanitization for spawned commands.

use crate::error::{Result, WardenError};
use std::collections::BTreeMap;

/// Maximum length of a single environment override value.
pub const MAX_ENV_VALUE_LENGTH: usize = 4096;

/// Variables that change which code a child loads or how a shell starts.
///
/// These are stripped from the inherited environment and may not be overridden.
pub const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "BASH_ENV",
    "ENV",
    "SHELL",
    "SHELLOPTS",
    "BASHOPTS",
    "PS4",
    "IFS",
    "PROMPT_COMMAND",
    "PATH",
];

/// Prefixes of variable families treated like [`DANGEROUS_ENV_VARS`].
pub const DANGEROUS_ENV_PREFIXES: &[&str] = &["DYLD_", "LD_", "BASH_FUNC_"];

/// Whether `name` is a dangerous variable name (case-insensitive).
pub fn is_dangerous(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    DANGEROUS_ENV_VARS.contains(&upper.as_str())
        || DANGEROUS_ENV_PREFIXES.iter().any(|p| upper.starts_with(p))
}

/// Validate caller-supplied overrides before they reach the child.
pub fn validate_overrides(overrides: &BTreeMap<String, String>) -> Result<()> {
    for (name, value) in overrides {
        let reject = |reason: &str| WardenError::DangerousEnvironment {
            name: name.clone(),
            reason: reason.to_string(),
        };

        if !is_valid_name(name) {
            return Err(reject("name must match [A-Za-z_][A-Za-z0-9_]*"));
        }
        if is_dangerous(name) {
            return Err(reject("variable may alter process loading or shell behavior"));
        }
        if value.len() > MAX_ENV_VALUE_LENGTH {
            return Err(reject("value exceeds the length limit"));
        }
        if value.contains('\0') {
            return Err(reject("value contains a null byte"));
        }
    }
    Ok(())
}

/// Inherited variable names that must be removed before spawning.
pub fn inherited_to_strip() -> Vec<String> {
    std::env::vars_os()
        .filter_map(|(name, _)| name.into_string().ok())
        .filter(|name| name != "PATH" && is_dangerous(name))
        .collect()
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn ordinary_overrides_pass() {
        assert!(validate_overrides(&overrides(&[("LC_ALL", "C"), ("MY_VAR_1", "x")])).is_ok());
    }

    #[test]
    fn loader_variables_are_rejected() {
        for name in ["LD_PRELOAD", "ld_preload", "DYLD_INSERT_LIBRARIES", "LD_AUDIT"] {
            let err = validate_overrides(&overrides(&[(name, "/tmp/evil.so")])).unwrap_err();
            assert!(matches!(err, WardenError::DangerousEnvironment { .. }), "{name}");
        }
    }

    #[test]
    fn shell_override_variables_are_rejected() {
        for name in ["BASH_ENV", "SHELL", "IFS", "PATH", "BASH_FUNC_ls%%"] {
            assert!(validate_overrides(&overrides(&[(name, "x")])).is_err(), "{name}");
        }
    }

    #[test]
    fn malformed_names_are_rejected() {
        assert!(validate_overrides(&overrides(&[("1ABC", "x")])).is_err());
        assert!(validate_overrides(&overrides(&[("A=B", "x")])).is_err());
        assert!(validate_overrides(&overrides(&[("", "x")])).is_err());
    }

    #[test]
    fn overlong_values_are_rejected() {
        let long = "v".repeat(MAX_ENV_VALUE_LENGTH + 1);
        let err = validate_overrides(&overrides(&[("LONG", long.as_str())])).unwrap_err();
        assert!(err.to_string().contains("length limit"));
    }

    #[test]
    fn path_is_never_stripped_from_inherited_env() {
        assert!(!inherited_to_strip().iter().any(|n| n == "PATH"));
    }
}
