//! Default value functions for the Config struct.

pub(crate) fn default_lock_stale_ms() -> u64 {
    30_000
}
pub(crate) fn default_lock_wait_ms() -> u64 {
    2_000
}
pub(crate) fn default_lock_poll_ms() -> u64 {
    50
}
pub(crate) fn default_command_timeout_ms() -> u64 {
    10_000
}
pub(crate) fn default_max_output_bytes() -> usize {
    1024 * 1024
}
pub(crate) fn default_max_argument_length() -> usize {
    4096
}
pub(crate) fn default_unlock_attempts() -> u32 {
    3
}
pub(crate) fn default_unlock_backoff_ms() -> u64 {
    250
}
pub(crate) fn default_settle_delay_ms() -> u64 {
    100
}
pub(crate) fn default_true() -> bool {
    true
}

/// Upper bound for `unlock_attempts`.
pub const MAX_UNLOCK_ATTEMPTS: u32 = 10;

/// Upper bound for every `*_ms` setting (one week).
pub const MAX_DURATION_MS: u64 = 7 * 24 * 60 * 60 * 1000;
