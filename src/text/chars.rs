//! Code point classification shared by the scanner, escape codec, and
//! encoder.

/// Code points that terminate a line. CRLF is handled as a unit by callers.
pub const NEWLINE_CHARS: &[char] = &['\n', '\r', '\u{0085}', '\u{2028}', '\u{2029}'];

#[inline]
pub fn is_newline_char(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{0085}' | '\u{2028}' | '\u{2029}')
}

#[inline]
pub fn is_indent_char(c: char) -> bool {
    c == ' ' || c == '\t'
}

#[inline]
pub fn is_ascii_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

#[inline]
pub fn is_ascii_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

#[inline]
pub fn is_ident_start(c: char, only_ascii: bool) -> bool {
    if c.is_ascii() || only_ascii {
        is_ascii_ident_start(c)
    } else {
        c.is_alphabetic()
    }
}

#[inline]
pub fn is_ident_continue(c: char, only_ascii: bool) -> bool {
    if c.is_ascii() || only_ascii {
        is_ascii_ident_continue(c)
    } else {
        c.is_alphanumeric()
    }
}

/// Whether `text` is a valid unquoted key: identifier start followed by
/// identifier continue characters, with no spaces.
pub fn is_unquoted_key(text: &str, only_ascii: bool) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if is_ident_start(c, only_ascii) => {}
        _ => return false,
    }
    chars.all(|c| is_ident_continue(c, only_ascii))
}

/// Whether `text` is a valid unquoted value string: identifier-like words
/// joined by single spaces.
pub fn is_unquoted_value(text: &str, only_ascii: bool) -> bool {
    if text.is_empty() {
        return false;
    }
    text.split(' ').all(|word| is_unquoted_key(word, only_ascii))
        && !text.contains("  ")
        && !text.starts_with(' ')
        && !text.ends_with(' ')
}

#[inline]
pub fn digit_value(c: char, base: u32) -> Option<u32> {
    c.to_digit(base)
}

/// Code points that may never appear literally in a source document:
/// control characters other than tab and the newline set, mid-stream BOM,
/// bidi controls, and noncharacters.
pub fn is_disallowed_literal(c: char) -> bool {
    let n = c as u32;
    if n < 0x20 {
        return c != '\t' && !is_newline_char(c);
    }
    if n == 0x7F {
        return true;
    }
    if (0x80..=0x9F).contains(&n) {
        return c != '\u{0085}';
    }
    if c == '\u{FEFF}' {
        return true;
    }
    if matches!(
        n,
        0x061C | 0x200E | 0x200F | 0x202A..=0x202E | 0x2066..=0x2069
    ) {
        return true;
    }
    if (0xFDD0..=0xFDEF).contains(&n) {
        return true;
    }
    (n & 0xFFFE) == 0xFFFE
}

/// Literal validity under `only_ascii_source`: tab, newlines, and printable
/// ASCII only.
pub fn is_allowed_ascii_literal(c: char) -> bool {
    c == '\t' || is_newline_char(c) || (' '..='~').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    fn test_newline_set() {
        for c in NEWLINE_CHARS {
            assert!(is_newline_char(*c));
        }
        assert!(!is_newline_char('\t'));
        assert!(!is_newline_char('\u{00A0}'));
    }

    #[rstest::rstest]
    fn test_unquoted_key() {
        assert!(is_unquoted_key("key", true));
        assert!(is_unquoted_key("_private", true));
        assert!(is_unquoted_key("key-name_2", true));
        assert!(!is_unquoted_key("2key", true));
        assert!(!is_unquoted_key("key name", true));
        assert!(!is_unquoted_key("", true));
        assert!(!is_unquoted_key("caf\u{e9}", true));
        assert!(is_unquoted_key("caf\u{e9}", false));
    }

    #[rstest::rstest]
    fn test_unquoted_value() {
        assert!(is_unquoted_value("hello world", true));
        assert!(is_unquoted_value("one", true));
        assert!(!is_unquoted_value("double  space", true));
        assert!(!is_unquoted_value(" leading", true));
        assert!(!is_unquoted_value("trailing ", true));
    }

    #[rstest::rstest]
    fn test_disallowed_literals() {
        assert!(is_disallowed_literal('\u{0000}'));
        assert!(is_disallowed_literal('\u{007F}'));
        assert!(is_disallowed_literal('\u{202E}'));
        assert!(is_disallowed_literal('\u{FEFF}'));
        assert!(is_disallowed_literal('\u{FFFE}'));
        assert!(!is_disallowed_literal('\t'));
        assert!(!is_disallowed_literal('\n'));
        assert!(!is_disallowed_literal('\u{0085}'));
        assert!(!is_disallowed_literal('a'));
        assert!(!is_disallowed_literal('\u{00E9}'));
    }

    #[rstest::rstest]
    fn test_only_ascii_literals() {
        assert!(is_allowed_ascii_literal('a'));
        assert!(is_allowed_ascii_literal('~'));
        assert!(is_allowed_ascii_literal('\t'));
        assert!(is_allowed_ascii_literal('\n'));
        assert!(!is_allowed_ascii_literal('\u{00E9}'));
        assert!(!is_allowed_ascii_literal('\u{0007}'));
    }
}
