//! Redaction of sensitive values in error text.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;
use tracing::trace;

/// The replacement text for redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// A pattern and how to rewrite a match.
struct RedactionRule {
    name: &'static str,
    regex: Regex,
    replacement: &'static str,
}

impl RedactionRule {
    fn new(name: &'static str, pattern: &str, replacement: &'static str) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).expect("invalid redaction pattern"),
            replacement,
        }
    }
}

/// Applied in order. Earlier rules keep their prefix so later rules see
/// `[REDACTED]` rather than the original value.
static RULES: LazyLock<Vec<RedactionRule>> = LazyLock::new(|| {
    vec![
        RedactionRule::new(
            "private_key",
            r"-----BEGIN[A-Z ]*PRIVATE KEY-----[\s\S]*?(-----END[A-Z ]*PRIVATE KEY-----|$)",
            REDACTED,
        ),
        RedactionRule::new(
            "key_value_secret",
            r#"(?i)\b(password|passwd|pwd|secret|token|api[_-]?key|access[_-]?key|credential)(['"]?\s*[:=]\s*['"]?)[^\s'",;]{4,}"#,
            "${1}${2}[REDACTED]",
        ),
        RedactionRule::new(
            "bearer_token",
            r"(?i)\b(bearer\s+)[A-Za-z0-9_.=~+/-]{8,}",
            "${1}[REDACTED]",
        ),
        RedactionRule::new(
            "prefixed_token",
            r"\b(sk-[A-Za-z0-9_-]{20,}|gh[pousr]_[A-Za-z0-9_]{20,}|AKIA[A-Z0-9]{16}|xox[baprs]-[A-Za-z0-9-]{10,})",
            REDACTED,
        ),
        RedactionRule::new("unix_home", r"(/home/|/Users/)[^/\s'\x22]+", "${1}[REDACTED]"),
        RedactionRule::new(
            "windows_home",
            r"(?i)\b([A-Z]:\\Users\\)[^\\\s'\x22]+",
            "${1}[REDACTED]",
        ),
        RedactionRule::new("ipv4", r"\b(?:\d{1,3}\.){3}\d{1,3}\b", REDACTED),
        RedactionRule::new(
            "ipv6",
            r"\b(?:[0-9A-Fa-f]{1,4}:){7}[0-9A-Fa-f]{1,4}\b",
            REDACTED,
        ),
        RedactionRule::new("hex_hash", r"\b[0-9A-Fa-f]{32,}\b", REDACTED),
    ]
});

static BASE64_CANDIDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/]{40,}={0,2}").expect("invalid base64 pattern"));

/// Replace recognized sensitive values in `input` with `[REDACTED]`.
pub fn redact(input: &str) -> Cow<'_, str> {
    let mut output = Cow::Borrowed(input);

    for rule in RULES.iter() {
        if rule.regex.is_match(&output) {
            trace!(rule = rule.name, "redacted sensitive value");
            output = Cow::Owned(
                rule.regex
                    .replace_all(&output, rule.replacement)
                    .into_owned(),
            );
        }
    }

    if BASE64_CANDIDATE.is_match(&output) {
        let replaced = BASE64_CANDIDATE.replace_all(&output, |caps: &Captures<'_>| {
            let candidate = &caps[0];
            if looks_like_base64(candidate) {
                REDACTED.to_string()
            } else {
                candidate.to_string()
            }
        });
        if let Cow::Owned(replaced) = replaced {
            output = Cow::Owned(replaced);
        }
    }

    output
}

/// Whether a context key names a credential.
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    ["password", "passwd", "secret", "token", "apikey", "api_key", "credential", "private_key"]
        .iter()
        .any(|needle| key.contains(needle))
}

/// Long runs of the base64 alphabet that are not file paths.
fn looks_like_base64(candidate: &str) -> bool {
    let slashes = candidate.matches('/').count();
    !candidate.starts_with('/')
        && slashes * 16 <= candidate.len()
        && candidate.chars().any(|c| c.is_ascii_digit())
        && candidate.chars().any(|c| c.is_ascii_uppercase())
        && candidate.chars().any(|c| c.is_ascii_lowercase())
}
