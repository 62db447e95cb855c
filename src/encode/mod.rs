//! Fresh serialization of a value graph.
//!
//! Output uses indentation style by default and switches to inline at
//! `inline_depth`. Label and alias handles re-emit as `(label=...)>` tags
//! and `$name` references; cycle checks run whether or not aliases are
//! enabled.

pub mod writer;

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use smol_str::SmolStr;

use crate::error::{Error, SemanticErrorKind};
use crate::num;
use crate::options::DumpOptions;
use crate::types::{Dict, Value};
use writer::Writer;

pub fn encode(value: &Value, options: &DumpOptions) -> Result<String, Error> {
    let mut encoder = Encoder::new(options);
    encoder.write_root(value)?;
    let mut out = encoder.writer.finish();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

/// Render a value for in-place substitution by the round-trip layer: no
/// trailing newline.
pub(crate) fn encode_fragment(
    value: &Value,
    options: &DumpOptions,
    inline: bool,
) -> Result<String, Error> {
    let mut encoder = Encoder::new(options);
    if inline {
        encoder.write_inline_value(value, 0)?;
    } else {
        encoder.write_root(value)?;
    }
    Ok(encoder.writer.finish())
}

struct Encoder<'a> {
    options: &'a DumpOptions,
    writer: Writer,
    active_labels: Vec<SmolStr>,
    seen_labels: HashSet<SmolStr>,
}

impl<'a> Encoder<'a> {
    fn new(options: &'a DumpOptions) -> Self {
        Self {
            options,
            writer: Writer::new(
                &options.nesting_indent,
                options.only_ascii_unquoted,
                options.only_ascii_source,
            ),
            active_labels: Vec::new(),
            seen_labels: HashSet::new(),
        }
    }

    fn check_depth(&self, depth: usize) -> Result<(), Error> {
        if depth > self.options.max_nesting_depth {
            return Err(Error::encode(format!(
                "nesting depth exceeds the configured maximum of {}",
                self.options.max_nesting_depth
            )));
        }
        Ok(())
    }

    fn write_root(&mut self, value: &Value) -> Result<(), Error> {
        match value {
            Value::Dict(map) if !map.is_empty() && self.options.inline_depth > 0 => {
                self.write_block_dict(map, "", 1, false)
            }
            Value::List(items) if !items.is_empty() && self.options.inline_depth > 0 => {
                self.write_block_list(items, "", 1, true)
            }
            Value::Labeled(labeled) => {
                self.open_label(&labeled.label)?;
                self.writer
                    .push_str(&format!("(label={})> ", labeled.label));
                self.write_inline_value(&labeled.value, 0)?;
                self.close_label();
                Ok(())
            }
            other => self.write_inline_value(other, 0),
        }
    }

    fn open_label(&mut self, label: &SmolStr) -> Result<(), Error> {
        if !self.options.aliases {
            return Err(Error::semantic(
                SemanticErrorKind::CircularReference,
                "value graph contains references but aliases are disabled",
            ));
        }
        self.active_labels.push(label.clone());
        self.seen_labels.insert(label.clone());
        Ok(())
    }

    fn close_label(&mut self) {
        self.active_labels.pop();
    }

    fn write_alias(&mut self, name: &SmolStr) -> Result<(), Error> {
        if !self.options.aliases {
            return Err(Error::semantic(
                SemanticErrorKind::CircularReference,
                "value graph contains references but aliases are disabled",
            ));
        }
        if self.active_labels.contains(name) && !self.options.circular_references {
            return Err(Error::semantic(
                SemanticErrorKind::CircularReference,
                format!("alias ${name} closes a cycle but circular_references is disabled"),
            ));
        }
        if !self.active_labels.contains(name) && !self.seen_labels.contains(name) {
            return Err(Error::semantic(
                SemanticErrorKind::UndefinedAlias,
                format!("alias ${name} has no matching label"),
            ));
        }
        self.writer.push_char('$');
        self.writer.push_str(name);
        Ok(())
    }

    fn write_scalar(&mut self, value: &Value) -> Result<(), Error> {
        match value {
            Value::None => self.writer.push_str("none"),
            Value::Bool(true) => self.writer.push_str("true"),
            Value::Bool(false) => self.writer.push_str("false"),
            Value::Int(i) => {
                if self.options.integers {
                    self.writer.write_int(*i);
                } else {
                    self.writer.write_float(*i as f64, self.options.hex_floats);
                }
            }
            Value::Float(f) => self.writer.write_float(*f, self.options.hex_floats),
            Value::Complex(c) => self.writer.push_str(&num::render_complex(c)),
            Value::Rational(r) => self.writer.push_str(&num::render_rational(r)),
            Value::Str(s) => self.writer.write_str_value(s),
            Value::Bytes(bytes) => self.write_bytes(bytes),
            other => {
                return Err(Error::encode(format!(
                    "cannot serialize {} as a scalar",
                    other.type_name()
                )));
            }
        }
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        let printable = bytes
            .iter()
            .all(|b| (0x20..=0x7E).contains(b) || matches!(b, b'\t'));
        if printable {
            self.writer.push_str("(bytes)> ");
            let text: String = bytes.iter().map(|b| *b as char).collect();
            self.writer.write_quoted(&text);
        } else {
            self.writer.push_str("(base64)> ");
            self.writer.push_char('\'');
            self.writer.push_str(&BASE64.encode(bytes));
            self.writer.push_char('\'');
        }
    }

    /// Write dict entries in block style. The cursor must sit at the start
    /// of a fresh line (after `prefix`-level indentation is due) unless
    /// `midline` marks the first entry as continuing the current line.
    fn write_block_dict(
        &mut self,
        map: &Dict,
        prefix: &str,
        depth: usize,
        midline: bool,
    ) -> Result<(), Error> {
        self.check_depth(depth)?;
        let mut first = true;
        for (key, value) in map {
            if first {
                if !midline {
                    self.writer.push_str(prefix);
                }
            } else {
                self.writer.newline();
                self.writer.push_str(prefix);
            }
            first = false;
            self.writer.write_key(key);
            self.writer.push_str(" =");
            self.write_entry_value(value, prefix, depth)?;
        }
        Ok(())
    }

    /// The value part of `key =`, choosing same-line scalar/inline form or a
    /// nested block on following lines.
    fn write_entry_value(&mut self, value: &Value, prefix: &str, depth: usize) -> Result<(), Error> {
        match value {
            Value::Dict(map) if !map.is_empty() && depth < self.options.inline_depth => {
                self.writer.newline();
                let child = format!("{}{}", prefix, self.options.nesting_indent);
                self.write_block_dict(map, &child, depth + 1, false)
            }
            Value::List(items) if !items.is_empty() && depth < self.options.inline_depth => {
                self.writer.newline();
                self.write_block_list(items, prefix, depth + 1, false)
            }
            Value::Labeled(labeled)
                if matches!(&labeled.value, Value::Dict(map) if !map.is_empty())
                    && depth < self.options.inline_depth =>
            {
                self.writer.push_char(' ');
                self.open_label(&labeled.label)?;
                self.writer.push_str(&format!("(label={})>", labeled.label));
                self.writer.newline();
                let child = format!("{}{}", prefix, self.options.nesting_indent);
                match &labeled.value {
                    Value::Dict(map) => self.write_block_dict(map, &child, depth + 1, false)?,
                    _ => unreachable!("guard matches dicts only"),
                }
                self.close_label();
                Ok(())
            }
            other => {
                self.writer.push_char(' ');
                self.write_inline_value(other, depth)
            }
        }
    }

    /// Write list items in block style. The item marker supplies the extra
    /// indentation relative to `prefix`.
    fn write_block_list(
        &mut self,
        items: &[Value],
        prefix: &str,
        depth: usize,
        at_root: bool,
    ) -> Result<(), Error> {
        self.check_depth(depth)?;
        let marker = if at_root && self.options.flush_start_list_item {
            self.options.start_list_item.trim_start().to_string()
        } else {
            self.options.start_list_item.clone()
        };
        let item_prefix = format!("{}{}", prefix, " ".repeat(marker.len()));
        let mut first = true;
        for item in items {
            if !first {
                self.writer.newline();
            }
            first = false;
            self.writer.push_str(prefix);
            self.writer.push_str(&marker);
            match item {
                Value::Dict(map) if !map.is_empty() && depth < self.options.inline_depth => {
                    self.write_block_dict(map, &item_prefix, depth + 1, true)?;
                }
                Value::List(nested) if !nested.is_empty() && depth < self.options.inline_depth => {
                    self.write_block_list(nested, &item_prefix, depth + 1, false)?;
                }
                other => self.write_inline_value(other, depth)?,
            }
        }
        Ok(())
    }

    fn write_inline_value(&mut self, value: &Value, depth: usize) -> Result<(), Error> {
        self.check_depth(depth)?;
        match value {
            Value::Dict(map) => self.write_inline_dict(map, depth),
            Value::List(items) => self.write_inline_list(items, depth),
            Value::Labeled(labeled) => {
                self.open_label(&labeled.label)?;
                self.writer
                    .push_str(&format!("(label={})> ", labeled.label));
                self.write_inline_value(&labeled.value, depth)?;
                self.close_label();
                Ok(())
            }
            Value::Alias(name) => self.write_alias(name),
            scalar => self.write_scalar(scalar),
        }
    }

    fn write_inline_dict(&mut self, map: &Dict, depth: usize) -> Result<(), Error> {
        self.check_depth(depth)?;
        self.writer.push_char('{');
        let mut first = true;
        for (key, value) in map {
            if !first {
                self.writer.push_char(',');
                if !self.options.compact_inline {
                    self.writer.push_char(' ');
                }
            }
            first = false;
            self.writer.write_key(key);
            if self.options.compact_inline {
                self.writer.push_char('=');
            } else {
                self.writer.push_str(" = ");
            }
            self.write_inline_value(value, depth + 1)?;
        }
        if self.options.trailing_commas && !map.is_empty() {
            self.writer.push_char(',');
        }
        self.writer.push_char('}');
        Ok(())
    }

    fn write_inline_list(&mut self, items: &[Value], depth: usize) -> Result<(), Error> {
        self.check_depth(depth)?;
        self.writer.push_char('[');
        let mut first = true;
        for item in items {
            if !first {
                self.writer.push_char(',');
                if !self.options.compact_inline {
                    self.writer.push_char(' ');
                }
            }
            first = false;
            self.write_inline_value(item, depth + 1)?;
        }
        if self.options.trailing_commas && !items.is_empty() {
            self.writer.push_char(',');
        }
        self.writer.push_char(']');
        Ok(())
    }
}
