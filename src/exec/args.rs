//! Argument validation for the command executor.
//!
//! Arguments are passed to the OS as an argv vector (never through a shell),
//! so rejecting shell metacharacters closes the remaining injection surface:
//! a tool that re-interprets its own arguments through a shell.

use crate::decode::{self, MAX_DECODE_ROUNDS};
use crate::error::{Result, WardenError};

/// Characters that carry meaning to a POSIX or cmd.exe shell.
pub const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '<', '>', '\n', '\r', '\0',
];

/// Validate every argument, reporting the index of the first bad one.
pub fn validate_args(args: &[&str], max_len: usize) -> Result<()> {
    for (index, arg) in args.iter().enumerate() {
        validate_arg(index, arg, max_len)?;
    }
    Ok(())
}

fn validate_arg(index: usize, arg: &str, max_len: usize) -> Result<()> {
    let reject = |reason: String| WardenError::DangerousArgument { index, reason };

    if arg.len() > max_len {
        return Err(reject(format!(
            "length {} exceeds the {} byte limit",
            arg.len(),
            max_len
        )));
    }

    for layer in decode::decode_layers(arg, MAX_DECODE_ROUNDS) {
        let encoded = layer != arg;
        if let Some(c) = layer.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
            return Err(reject(format!(
                "{}shell metacharacter {:?}",
                if encoded { "encoded " } else { "" },
                c
            )));
        }
        if let Some(c) = layer.chars().find(|c| c.is_control()) {
            return Err(reject(format!(
                "{}control character {:?}",
                if encoded { "encoded " } else { "" },
                c
            )));
        }
        if decode::has_parent_segment(&decode::fold_confusables(&layer)) {
            return Err(reject(format!(
                "{}directory traversal sequence",
                if encoded { "encoded " } else { "" }
            )));
        }
    }

    Ok(())
}
