//! Reserved device names.
//!
//! Windows maps these names to devices in every directory, with or without an
//! extension (`CON`, `con.txt`, `LPT1.log`). Creating or opening them reaches
//! the device instead of a file, so they are rejected on every platform.

const RESERVED: &[&str] = &["CON", "PRN", "AUX", "NUL", "CONIN$", "CONOUT$"];

/// Whether `component` names a reserved device, case-insensitively.
pub fn is_reserved_name(component: &str) -> bool {
    let stem = component
        .split('.')
        .next()
        .unwrap_or(component)
        .trim_end_matches(' ')
        .to_ascii_uppercase();

    if RESERVED.contains(&stem.as_str()) {
        return true;
    }

    let numbered = stem
        .strip_prefix("COM")
        .or_else(|| stem.strip_prefix("LPT"));
    match numbered {
        Some(suffix) => {
            let mut chars = suffix.chars();
            matches!(
                (chars.next(), chars.next()),
                (Some('1'..='9' | '¹' | '²' | '³'), None)
            )
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_names_are_reserved() {
        for name in ["CON", "con", "Prn", "aux", "NUL", "COM1", "com9", "LPT1", "lpt9", "CONIN$"] {
            assert!(is_reserved_name(name), "{name}");
        }
    }

    #[test]
    fn extensions_do_not_hide_device_names() {
        for name in ["con.txt", "NUL.tar.gz", "lpt3.log", "COM1 .txt"] {
            assert!(is_reserved_name(name), "{name}");
        }
    }

    #[test]
    fn similar_names_are_not_reserved() {
        for name in ["console.txt", "COM10", "COM0", "LPT", "icon", "nullable.rs", "aux_data"] {
            assert!(!is_reserved_name(name), "{name}");
        }
    }
}
