//! Text normalization applied to every document before chunking.
//!
//! Steps, in order: lowercase, trim, drop every character that is not an
//! ASCII letter, ASCII digit, whitespace, or `.`, and collapse whitespace
//! runs to a single space. The output never starts or ends with a space,
//! so normalization is idempotent.
//!
//! ```rust
//! use passage_retrieval::normalize::normalize;
//!
//! assert_eq!(normalize("  Newton's  Laws,\n of Motion! "), "newtons laws of motion");
//! ```

/// Normalize raw document text.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_space = false;

    for c in lowered.trim().chars() {
        if c.is_whitespace() {
            pending_space = true;
        } else if c.is_ascii_alphanumeric() || c == '.' {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        }
        // Anything else is dropped without closing a whitespace run.
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_strips_punctuation() {
        assert_eq!(
            normalize("Newton formulated the laws of motion."),
            "newton formulated the laws of motion."
        );
        assert_eq!(normalize("Hello, World! (2020)"), "hello world 2020");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(normalize("a \t\n\n  b\r\nc"), "a b c");
    }

    #[test]
    fn test_removed_chars_leave_no_dangling_space() {
        assert_eq!(normalize("é hello"), "hello");
        assert_eq!(normalize("hello ©"), "hello");
        assert_eq!(normalize("a é b"), "a b");
    }

    #[test]
    fn test_empty_and_symbol_only() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize("!!! ??? ---"), "");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "",
            "Plain text.",
            "  Leading and trailing  ",
            "Ünïcödé — “quotes” and emoji 🚀 here",
            "Line one.\n\nLine two!\tTabbed, text?",
            "ÀÉÎ 1990s … 04 March 2022",
            "İstanbul",
            "...dots... and. more.",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_output_alphabet() {
        let out = normalize("Mixed: ÄBC-123_xyz.\u{00A0}end\u{2003}");
        assert!(out
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == ' '));
        assert!(!out.contains("  "));
    }
}
