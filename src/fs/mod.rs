//! Filesystem utilities for filewarden.
//!
//! Atomic writes keep protected files and lock metadata from ever being
//! observed half-written; checksums back the optional integrity checks.

pub mod atomic;
pub mod checksum;

pub use atomic::{atomic_write, atomic_write_str};
pub use checksum::{sha256_file, sha256_hex};
