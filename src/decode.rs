//! Bounded multi-layer decoding of untrusted strings.
//!
//! Attackers hide `../` and shell metacharacters behind one or more layers of
//! percent-encoding (`%2e%2e%2f`, `%252e%252e%252f`), hex escapes (`\x2e`) and
//! IIS-style `%u002e` sequences. Both validators decode every layer up to a
//! fixed number of rounds and run their checks against each layer, so an
//! encoding that only becomes dangerous after the second decode is still caught.

use percent_encoding::percent_decode_str;
use regex::{Captures, Regex};
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Default number of decode rounds applied to untrusted input.
pub const MAX_DECODE_ROUNDS: usize = 3;

static HEX_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\x([0-9A-Fa-f]{2})|%[uU]([0-9A-Fa-f]{4})").expect("Invalid hex escape regex")
});

/// Decode `input` repeatedly, returning every distinct layer.
///
/// The first element is always the raw input. Decoding stops early once a
/// round produces no change.
pub fn decode_layers(input: &str, max_rounds: usize) -> Vec<String> {
    let mut layers = vec![input.to_string()];
    for _ in 0..max_rounds {
        let current = &layers[layers.len() - 1];
        let next = decode_once(current);
        if &next == current {
            break;
        }
        layers.push(next);
    }
    layers
}

/// Decode a single layer of hex escapes and percent-encoding.
fn decode_once(input: &str) -> String {
    let unescaped = HEX_ESCAPE.replace_all(input, |caps: &Captures<'_>| {
        let digits = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        u32::from_str_radix(digits, 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    percent_decode_str(&unescaped)
        .decode_utf8_lossy()
        .into_owned()
}

/// NFC-normalize and fold characters that render like `.`, `/` or `\`.
///
/// Folding happens after normalization so compatibility forms that NFC keeps
/// distinct (fullwidth full stop, division slash, ...) are still mapped.
pub fn fold_confusables(input: &str) -> String {
    input
        .nfc()
        .map(|c| match c {
            '\u{FF0E}' | '\u{2024}' | '\u{FE52}' | '\u{3002}' | '\u{FF61}' => '.',
            '\u{FF0F}' | '\u{2215}' | '\u{2044}' | '\u{29F8}' | '\u{1735}' => '/',
            '\u{FF3C}' | '\u{2216}' | '\u{29F5}' | '\u{29F9}' | '\u{FE68}' => '\\',
            other => other,
        })
        .collect()
}

/// Whether any `/`- or `\`-separated segment of `value` is exactly `..`.
pub fn has_parent_segment(value: &str) -> bool {
    value
        .split(['/', '\\'])
        .any(|segment| segment.trim_end_matches([' ', '.']).is_empty() && segment.starts_with(".."))
}
