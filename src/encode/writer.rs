//! Low-level output buffer for the serializer.

use crate::num;
use crate::text::chars::{is_unquoted_key, is_unquoted_value};
use crate::text::escape::escape_into;
use crate::types::Key;

pub(crate) struct Writer {
    buffer: String,
    indent_unit: String,
    indent_cache: Vec<String>,
    only_ascii_unquoted: bool,
    only_ascii_source: bool,
}

impl Writer {
    pub fn new(indent_unit: &str, only_ascii_unquoted: bool, only_ascii_source: bool) -> Self {
        Self {
            buffer: String::new(),
            indent_unit: indent_unit.to_string(),
            indent_cache: vec![String::new()],
            only_ascii_unquoted,
            only_ascii_source,
        }
    }

    pub fn finish(self) -> String {
        self.buffer
    }

    pub fn push_str(&mut self, s: &str) {
        self.buffer.push_str(s);
    }

    pub fn push_char(&mut self, c: char) {
        self.buffer.push(c);
    }

    pub fn newline(&mut self) {
        self.buffer.push('\n');
    }

    pub fn indent(&mut self, depth: usize) {
        if depth == 0 || self.indent_unit.is_empty() {
            return;
        }
        while depth >= self.indent_cache.len() {
            let next = format!(
                "{}{}",
                self.indent_cache.last().expect("cache is never empty"),
                self.indent_unit
            );
            self.indent_cache.push(next);
        }
        let prefix = self.indent_cache[depth].clone();
        self.buffer.push_str(&prefix);
    }

    pub fn write_int(&mut self, value: i64) {
        let mut buf = itoa::Buffer::new();
        self.buffer.push_str(buf.format(value));
    }

    pub fn write_float(&mut self, value: f64, hex: bool) {
        self.buffer.push_str(&num::render_float(value, hex));
    }

    /// Keys render unquoted when identifier-shaped, otherwise single-quoted.
    pub fn write_key(&mut self, key: &Key) {
        match key {
            Key::None => self.push_str("none"),
            Key::Bool(true) => self.push_str("true"),
            Key::Bool(false) => self.push_str("false"),
            Key::Int(i) => self.write_int(*i),
            Key::Float(f) => self.write_float(f.get(), false),
            Key::Str(s) => {
                if is_unquoted_key(s, self.only_ascii_unquoted) && !crate::constants::is_keyword(s) {
                    self.push_str(s);
                } else {
                    self.write_quoted(s);
                }
            }
        }
    }

    /// Value strings render unquoted when they are identifier words joined
    /// by single spaces and could not be mistaken for another literal.
    pub fn write_str_value(&mut self, s: &str) {
        if is_unquoted_value(s, self.only_ascii_unquoted)
            && !crate::constants::is_keyword(s)
            && !s.starts_with(|c: char| c.is_ascii_digit())
        {
            self.push_str(s);
        } else {
            self.write_quoted(s);
        }
    }

    pub fn write_quoted(&mut self, s: &str) {
        let quote = if s.contains('\'') && !s.contains('"') {
            '"'
        } else {
            '\''
        };
        self.push_char(quote);
        let mut escaped = String::with_capacity(s.len());
        escape_into(&mut escaped, s, quote, false, self.only_ascii_source);
        self.push_str(&escaped);
        self.push_char(quote);
    }

    /// Overwrite trailing output, used to drop a separator that turned out
    /// to be final.
    pub fn truncate_by(&mut self, bytes: usize) {
        let len = self.buffer.len().saturating_sub(bytes);
        self.buffer.truncate(len);
    }

    pub fn ends_with(&self, suffix: &str) -> bool {
        self.buffer.ends_with(suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    fn test_indent_cache() {
        let mut writer = Writer::new("  ", true, false);
        writer.indent(3);
        writer.push_str("x");
        assert_eq!(writer.finish(), "      x");
    }

    #[rstest::rstest]
    fn test_write_key_quoting() {
        let mut writer = Writer::new("    ", true, false);
        writer.write_key(&Key::from("plain"));
        writer.push_char(' ');
        writer.write_key(&Key::from("needs quoting"));
        writer.push_char(' ');
        writer.write_key(&Key::Int(7));
        assert_eq!(writer.finish(), "plain 'needs quoting' 7");
    }

    #[rstest::rstest]
    fn test_write_str_value() {
        let mut writer = Writer::new("    ", true, false);
        writer.write_str_value("two words");
        writer.push_char(' ');
        writer.write_str_value("true");
        writer.push_char(' ');
        writer.write_str_value("5px");
        assert_eq!(writer.finish(), "two words 'true' '5px'");
    }

    #[rstest::rstest]
    fn test_quote_choice() {
        let mut writer = Writer::new("    ", true, false);
        writer.write_quoted("it's");
        assert_eq!(writer.finish(), "\"it's\"");
    }
}
