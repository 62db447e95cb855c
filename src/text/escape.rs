//! Backslash escape decoding and encoding for escaped string styles.

use std::fmt::Write as _;

use crate::text::chars::{is_disallowed_literal, is_newline_char};

/// Decode failure, positioned relative to the start of the decoded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapeError {
    pub offset: usize,
    pub message: String,
}

impl EscapeError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

fn short_escape(c: char) -> Option<char> {
    match c {
        '\\' => Some('\\'),
        '\'' => Some('\''),
        '"' => Some('"'),
        '`' => Some('`'),
        'a' => Some('\u{0007}'),
        'b' => Some('\u{0008}'),
        'e' => Some('\u{001B}'),
        'f' => Some('\u{000C}'),
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        'v' => Some('\u{000B}'),
        _ => None,
    }
}

fn hex_run(chars: &[char], start: usize, len: usize) -> Option<u32> {
    if start + len > chars.len() {
        return None;
    }
    let mut value: u32 = 0;
    for c in &chars[start..start + len] {
        value = value.checked_mul(16)?.checked_add(c.to_digit(16)?)?;
    }
    Some(value)
}

fn char_from_code(code: u32, offset: usize, raw: &str) -> Result<char, EscapeError> {
    if (0xD800..=0xDFFF).contains(&code) {
        return Err(EscapeError::new(
            offset,
            format!("escape {raw:?} names a surrogate code point"),
        ));
    }
    char::from_u32(code)
        .ok_or_else(|| EscapeError::new(offset, format!("escape {raw:?} is out of range")))
}

/// Replace every backslash escape in `raw` with its decoded form. Newlines in
/// `raw` must already be normalized to `\n`; the line-continuation escape
/// `\<spaces>\n` decodes to nothing.
pub fn unescape(raw: &str) -> Result<String, EscapeError> {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c != '\\' {
            out.push(c);
            i += 1;
            continue;
        }
        let esc_start = i;
        i += 1;
        let Some(&next) = chars.get(i) else {
            return Err(EscapeError::new(esc_start, "dangling backslash"));
        };
        if let Some(decoded) = short_escape(next) {
            out.push(decoded);
            i += 1;
            continue;
        }
        match next {
            'x' => {
                let code = hex_run(&chars, i + 1, 2).ok_or_else(|| {
                    EscapeError::new(esc_start, "\\x escape requires two hex digits")
                })?;
                out.push(char_from_code(code, esc_start, "\\xHH")?);
                i += 3;
            }
            'u' => {
                if chars.get(i + 1) == Some(&'{') {
                    let close = chars[i + 2..]
                        .iter()
                        .position(|c| *c == '}')
                        .ok_or_else(|| {
                            EscapeError::new(esc_start, "unterminated \\u{...} escape")
                        })?;
                    if close == 0 || close > 6 {
                        return Err(EscapeError::new(
                            esc_start,
                            "\\u{...} escape requires one to six hex digits",
                        ));
                    }
                    let code = hex_run(&chars, i + 2, close).ok_or_else(|| {
                        EscapeError::new(esc_start, "invalid hex digits in \\u{...} escape")
                    })?;
                    let raw_esc: String = chars[esc_start..i + 3 + close].iter().collect();
                    out.push(char_from_code(code, esc_start, &raw_esc)?);
                    i += 3 + close;
                } else {
                    let code = hex_run(&chars, i + 1, 4).ok_or_else(|| {
                        EscapeError::new(esc_start, "\\u escape requires four hex digits")
                    })?;
                    out.push(char_from_code(code, esc_start, "\\uHHHH")?);
                    i += 5;
                }
            }
            'U' => {
                let code = hex_run(&chars, i + 1, 8).ok_or_else(|| {
                    EscapeError::new(esc_start, "\\U escape requires eight hex digits")
                })?;
                out.push(char_from_code(code, esc_start, "\\UHHHHHHHH")?);
                i += 9;
            }
            ' ' | '\n' => {
                // `\<spaces><newline>` joins lines without inserting anything.
                let mut j = i;
                while chars.get(j) == Some(&' ') {
                    j += 1;
                }
                match chars.get(j) {
                    Some(c) if is_newline_char(*c) => {
                        i = j + 1;
                    }
                    _ => {
                        return Err(EscapeError::new(
                            esc_start,
                            "unrecognized escape sequence \"\\ \"",
                        ));
                    }
                }
            }
            other => {
                return Err(EscapeError::new(
                    esc_start,
                    format!("unrecognized escape sequence \"\\{other}\""),
                ));
            }
        }
    }
    Ok(out)
}

fn push_coded(out: &mut String, c: char) {
    let n = c as u32;
    if n < 0x100 {
        let _ = write!(out, "\\x{n:02x}");
    } else {
        let _ = write!(out, "\\u{{{n:x}}}");
    }
}

fn render_short(c: char) -> Option<&'static str> {
    match c {
        '\u{0007}' => Some("\\a"),
        '\u{0008}' => Some("\\b"),
        '\u{001B}' => Some("\\e"),
        '\u{000C}' => Some("\\f"),
        '\n' => Some("\\n"),
        '\r' => Some("\\r"),
        '\t' => Some("\\t"),
        '\u{000B}' => Some("\\v"),
        _ => None,
    }
}

/// Escape `s` for an escaped string delimited by `quote`. In single-line
/// context (`multiline == false`) newlines are escaped; in multiline context
/// they pass through literally.
pub fn escape_into(out: &mut String, s: &str, quote: char, multiline: bool, only_ascii: bool) {
    for c in s.chars() {
        if c == '\\' || c == quote {
            out.push('\\');
            out.push(c);
        } else if c == '\t' {
            out.push(c);
        } else if is_newline_char(c) {
            if multiline && c == '\n' {
                out.push(c);
            } else if let Some(short) = render_short(c) {
                out.push_str(short);
            } else {
                push_coded(out, c);
            }
        } else if is_disallowed_literal(c) {
            if let Some(short) = render_short(c) {
                out.push_str(short);
            } else {
                push_coded(out, c);
            }
        } else if only_ascii && !c.is_ascii() {
            push_coded(out, c);
        } else {
            out.push(c);
        }
    }
}

pub fn escape(s: &str, quote: char, multiline: bool, only_ascii: bool) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    escape_into(&mut out, s, quote, multiline, only_ascii);
    out
}
