//! Input decoding and source bookkeeping for error snippets.

use crate::error::{Error, LexErrorKind, Location};
use crate::text::chars::is_newline_char;

/// Decode raw input bytes into a string, auto-detecting a UTF-8, UTF-16, or
/// UTF-32 byte order mark. Without a BOM the input is taken as UTF-8.
pub fn decode_input(bytes: &[u8]) -> Result<String, Error> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return from_utf8(&bytes[3..]);
    }
    if bytes.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) {
        return from_utf32(&bytes[4..], false);
    }
    if bytes.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
        return from_utf32(&bytes[4..], true);
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return from_utf16(&bytes[2..], false);
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return from_utf16(&bytes[2..], true);
    }
    from_utf8(bytes)
}

fn from_utf8(bytes: &[u8]) -> Result<String, Error> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|err| {
            Error::lex(
                LexErrorKind::DisallowedCodePoint,
                format!("input is not valid UTF-8: {err}"),
            )
        })
}

fn from_utf16(bytes: &[u8], big_endian: bool) -> Result<String, Error> {
    if bytes.len() % 2 != 0 {
        return Err(Error::lex(
            LexErrorKind::DisallowedCodePoint,
            "UTF-16 input has an odd number of bytes",
        ));
    }
    let units = bytes.chunks_exact(2).map(|pair| {
        if big_endian {
            u16::from_be_bytes([pair[0], pair[1]])
        } else {
            u16::from_le_bytes([pair[0], pair[1]])
        }
    });
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|err| {
            Error::lex(
                LexErrorKind::DisallowedCodePoint,
                format!("input is not valid UTF-16: {err}"),
            )
        })
}

fn from_utf32(bytes: &[u8], big_endian: bool) -> Result<String, Error> {
    if bytes.len() % 4 != 0 {
        return Err(Error::lex(
            LexErrorKind::DisallowedCodePoint,
            "UTF-32 input length is not a multiple of four bytes",
        ));
    }
    let mut out = String::with_capacity(bytes.len() / 4);
    for quad in bytes.chunks_exact(4) {
        let code = if big_endian {
            u32::from_be_bytes([quad[0], quad[1], quad[2], quad[3]])
        } else {
            u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]])
        };
        let c = char::from_u32(code).ok_or_else(|| {
            Error::lex(
                LexErrorKind::DisallowedCodePoint,
                format!("input is not valid UTF-32: invalid code point {code:#x}"),
            )
        })?;
        out.push(c);
    }
    Ok(out)
}

/// Source text plus a line index for turning byte offsets into locations
/// and error snippets.
#[derive(Debug, Clone)]
pub struct SourceText {
    text: String,
    line_starts: Vec<usize>,
}

impl SourceText {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        let mut iter = text.char_indices().peekable();
        while let Some((idx, c)) = iter.next() {
            if !is_newline_char(c) {
                continue;
            }
            if c == '\r' {
                if let Some((_, '\n')) = iter.peek() {
                    iter.next();
                }
            }
            let next = match iter.peek() {
                Some((next_idx, _)) => *next_idx,
                None => text.len(),
            };
            line_starts.push(next);
        }
        Self { text, line_starts }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// 1-based line and column (in characters) for a byte offset.
    pub fn location(&self, offset: usize) -> Location {
        let offset = offset.min(self.text.len());
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let line_start = self.line_starts[line_idx];
        let column = self.text[line_start..offset].chars().count() + 1;
        Location::new(offset, line_idx + 1, column)
    }

    /// The text of the 1-based line, without its terminator.
    pub fn line_text(&self, line: usize) -> &str {
        if line == 0 || line > self.line_starts.len() {
            return "";
        }
        let start = self.line_starts[line - 1];
        let end = self
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(self.text.len());
        self.text[start..end].trim_end_matches(is_newline_char)
    }

    pub fn snippet(&self, offset: usize) -> String {
        let location = self.location(offset);
        self.line_text(location.line).to_string()
    }
}
