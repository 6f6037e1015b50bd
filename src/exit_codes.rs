//! Exit code constants for the filewarden CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, unreadable config)
//! - 2: Validation or security rejection (path, argument, allow-list)
//! - 3: External command failure (spawn failure, timeout)
//! - 4: Lock failure (held elsewhere, wrong lock id)
//! - 5: Integrity or unlock-verification failure

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration, or an unexpected internal failure.
pub const USER_ERROR: i32 = 1;

/// Validation failure: rejected path, argument, environment, or command.
pub const VALIDATION_FAILURE: i32 = 2;

/// External command failure: the command could not be spawned or timed out.
pub const COMMAND_FAILURE: i32 = 3;

/// Lock failure: the file is locked by another holder or the lock id did not match.
pub const LOCK_FAILURE: i32 = 4;

/// Integrity failure: out-of-band modification or an unlock that did not take effect.
pub const INTEGRITY_FAILURE: i32 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            SUCCESS,
            USER_ERROR,
            VALIDATION_FAILURE,
            COMMAND_FAILURE,
            LOCK_FAILURE,
            INTEGRITY_FAILURE,
        ];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }

    #[test]
    fn success_is_zero() {
        assert_eq!(SUCCESS, 0);
    }
}
