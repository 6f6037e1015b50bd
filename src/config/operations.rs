//! Config loading and validation.

use super::model::Config;
use super::types::{MAX_DURATION_MS, MAX_UNLOCK_ATTEMPTS};
use crate::error::{Result, WardenError};
use std::path::Path;

impl Config {
    /// Load config from a YAML file.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(WardenError::Config)` - Read, parse or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            WardenError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes to unit, not a map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| WardenError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| WardenError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values.
    ///
    /// Validation rules:
    /// - durations and size limits must be positive
    /// - durations must not exceed one week
    /// - `unlock_attempts` must be between 1 and 10
    /// - `allowed_directories` entries must be absolute
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("lock_stale_ms", self.lock_stale_ms),
            ("lock_poll_ms", self.lock_poll_ms),
            ("command_timeout_ms", self.command_timeout_ms),
            ("max_output_bytes", self.max_output_bytes as u64),
            ("max_argument_length", self.max_argument_length as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(WardenError::Config(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        let durations = [
            ("lock_stale_ms", self.lock_stale_ms),
            ("lock_wait_ms", self.lock_wait_ms),
            ("lock_poll_ms", self.lock_poll_ms),
            ("command_timeout_ms", self.command_timeout_ms),
            ("unlock_backoff_ms", self.unlock_backoff_ms),
            ("settle_delay_ms", self.settle_delay_ms),
        ];
        for (name, value) in durations {
            if value > MAX_DURATION_MS {
                return Err(WardenError::Config(format!(
                    "{} must be at most {} (got {})",
                    name, MAX_DURATION_MS, value
                )));
            }
        }

        if self.unlock_attempts == 0 || self.unlock_attempts > MAX_UNLOCK_ATTEMPTS {
            return Err(WardenError::Config(format!(
                "unlock_attempts must be between 1 and {} (got {})",
                MAX_UNLOCK_ATTEMPTS, self.unlock_attempts
            )));
        }

        for dir in &self.allowed_directories {
            if !dir.is_absolute() {
                return Err(WardenError::Config(format!(
                    "allowed_directories entry '{}' must be an absolute path",
                    dir.display()
                )));
            }
        }

        Ok(())
    }
}
