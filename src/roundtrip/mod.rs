//! Layout-preserving AST: load, edit values/keys/comments, dump back with
//! byte-identical output outside the edited spans.
//!
//! Edits never reflow the document. A replacement re-renders one node in
//! its original style profile (numeric base, quote kind and delimiter
//! length, escape convention) and records the new text against the node's
//! source span; `dumps` splices the recorded texts into the original
//! source.

use std::collections::BTreeMap;

use crate::ast::{CollectionStyle, DictEntry, NodeId, RawKind, ScalarData, ScalarStyle};
use crate::decode::scanner::{FinalNewline, QuoteChar, Span, StringStyle};
use crate::decode::{resolver, RawDocument};
use crate::encode;
use crate::error::{Error, RoundtripErrorKind};
use crate::num::{self, FloatForm, NumberClass};
use crate::options::{DumpOptions, LoadOptions};
use crate::text::chars::{is_indent_char, is_unquoted_key, is_unquoted_value};
use crate::text::escape;
use crate::types::{Key, Value};

/// One hop of an edit path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSeg {
    Key(Key),
    Index(usize),
}

impl From<&str> for PathSeg {
    fn from(s: &str) -> Self {
        PathSeg::Key(Key::from(s))
    }
}

impl From<i64> for PathSeg {
    fn from(i: i64) -> Self {
        PathSeg::Key(Key::Int(i))
    }
}

impl From<usize> for PathSeg {
    fn from(i: usize) -> Self {
        PathSeg::Index(i)
    }
}

impl From<Key> for PathSeg {
    fn from(key: Key) -> Self {
        PathSeg::Key(key)
    }
}

/// Build a path from anything convertible to segments.
pub fn path<T: Into<PathSeg>, I: IntoIterator<Item = T>>(segments: I) -> Vec<PathSeg> {
    segments.into_iter().map(Into::into).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    StyleFallback,
}

/// Non-fatal notice recorded during an edit.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentAnchor {
    KeyDoc,
    ValueDoc,
    KeyTrailing,
    ValueTrailing,
    ValueStartTrailing,
    ValueEndTrailing,
}

#[derive(Debug)]
pub struct RoundtripAst {
    doc: RawDocument,
    options: LoadOptions,
    replacements: BTreeMap<(usize, usize), String>,
    diagnostics: Vec<Diagnostic>,
}

impl RoundtripAst {
    pub(crate) fn new(doc: RawDocument, options: LoadOptions) -> Self {
        Self {
            doc,
            options,
            replacements: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Resolve the (possibly edited) tree into a value graph.
    pub fn to_value(&self) -> Result<Value, Error> {
        resolver::resolve(&self.doc.tree, &self.options)
    }

    /// Cursor over a root dict entry.
    pub fn get(&self, key: impl Into<Key>) -> Result<Cursor<'_>, Error> {
        self.cursor(&[PathSeg::Key(key.into())])
    }

    /// Cursor over a root list item.
    pub fn at(&self, index: usize) -> Result<Cursor<'_>, Error> {
        self.cursor(&[PathSeg::Index(index)])
    }

    pub fn cursor(&self, path: &[PathSeg]) -> Result<Cursor<'_>, Error> {
        let (node, entry) = self.lookup(path)?;
        Ok(Cursor {
            ast: self,
            node,
            entry,
        })
    }

    fn lookup(&self, path: &[PathSeg]) -> Result<(NodeId, Option<DictEntry>), Error> {
        let mut node = self.doc.tree.root;
        let mut entry = None;
        for seg in path {
            match (seg, &self.doc.tree.node(node).kind) {
                (PathSeg::Key(key), RawKind::Dict(dict)) => {
                    let idx = dict.index.get(key).copied().ok_or_else(|| {
                        Error::roundtrip(
                            RoundtripErrorKind::PathNotFound,
                            format!("no key {} at this path", key.display_text()),
                        )
                    })?;
                    let found = dict.entries[idx];
                    entry = Some(found);
                    node = found.value;
                }
                (PathSeg::Index(index), RawKind::List(list)) => {
                    node = list.items.get(*index).copied().ok_or_else(|| {
                        Error::roundtrip(
                            RoundtripErrorKind::PathNotFound,
                            format!("no item at index {index}"),
                        )
                    })?;
                    entry = None;
                }
                (seg, _) => {
                    return Err(Error::roundtrip(
                        RoundtripErrorKind::PathNotFound,
                        format!("path segment {seg:?} does not match the value shape"),
                    ));
                }
            }
        }
        Ok((node, entry))
    }

    // ------------------------------------------------------------------
    // Value replacement

    pub fn replace_val(&mut self, path: &[PathSeg], value: Value) -> Result<(), Error> {
        let (node_id, _) = self.lookup(path)?;
        let node = self.doc.tree.node(node_id);
        if node.tag.is_some() {
            return Err(Error::roundtrip(
                RoundtripErrorKind::TypeMismatch,
                "tagged values cannot be replaced",
            ));
        }
        let span = node.span;
        match &node.kind {
            RawKind::Scalar(scalar) => {
                if self.options.enforce_types
                    && std::mem::discriminant(&scalar.value) != std::mem::discriminant(&value)
                {
                    return Err(Error::roundtrip(
                        RoundtripErrorKind::TypeMismatch,
                        format!(
                            "cannot replace a {} value with a {} value while enforce_types is on",
                            scalar.value.type_name(),
                            value.type_name()
                        ),
                    ));
                }
                let style = scalar.style;
                let (rendered, diagnostic) = self.render_scalar(&style, &value, span, false)?;
                if let Some(diagnostic) = diagnostic {
                    self.diagnostics.push(diagnostic);
                }
                if let RawKind::Scalar(scalar) = &mut self.doc.tree.node_mut(node_id).kind {
                    scalar.text = value.as_str().map(str::to_string);
                    scalar.value = value;
                }
                self.replacements.insert((span.start, span.end), rendered);
                Ok(())
            }
            RawKind::Dict(dict) => {
                if self.options.enforce_types && !matches!(value, Value::Dict(_)) {
                    return Err(Error::roundtrip(
                        RoundtripErrorKind::TypeMismatch,
                        format!(
                            "cannot replace a dict with a {} value while enforce_types is on",
                            value.type_name()
                        ),
                    ));
                }
                let inline = matches!(dict.style, CollectionStyle::Inline);
                self.replace_collection(node_id, span, value, inline)
            }
            RawKind::List(list) => {
                if self.options.enforce_types && !matches!(value, Value::List(_)) {
                    return Err(Error::roundtrip(
                        RoundtripErrorKind::TypeMismatch,
                        format!(
                            "cannot replace a list with a {} value while enforce_types is on",
                            value.type_name()
                        ),
                    ));
                }
                let inline = matches!(list.style, CollectionStyle::Inline);
                self.replace_collection(node_id, span, value, inline)
            }
            RawKind::Alias(_) => Err(Error::roundtrip(
                RoundtripErrorKind::TypeMismatch,
                "aliased values cannot be replaced through the alias",
            )),
        }
    }

    fn replace_collection(
        &mut self,
        node_id: NodeId,
        span: Span,
        value: Value,
        inline: bool,
    ) -> Result<(), Error> {
        let dump = DumpOptions::default();
        let mut rendered = encode::encode_fragment(&value, &dump, inline)?;
        if !inline {
            let indent = self.line_indent_at(span.start);
            if !indent.is_empty() {
                rendered = rendered
                    .split('\n')
                    .enumerate()
                    .map(|(i, line)| {
                        if i == 0 || line.is_empty() {
                            line.to_string()
                        } else {
                            format!("{indent}{line}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            if rendered.ends_with('\n') {
                rendered.pop();
            }
        }
        // The replaced subtree is opaque from here on; keep the resolved
        // value so `to_value` stays accurate.
        self.doc.tree.node_mut(node_id).kind = RawKind::Scalar(ScalarData {
            value,
            text: None,
            style: ScalarStyle::Keyword,
        });
        self.replacements.insert((span.start, span.end), rendered);
        Ok(())
    }

    /// Leading whitespace of the line containing `offset`.
    fn line_indent_at(&self, offset: usize) -> String {
        let src = self.doc.source.text();
        let start = src[..offset]
            .rfind(['\n', '\r', '\u{0085}', '\u{2028}', '\u{2029}'])
            .map(|i| i + 1)
            .unwrap_or(0);
        src[start..]
            .chars()
            .take_while(|c| is_indent_char(*c))
            .collect()
    }

    // ------------------------------------------------------------------
    // Key replacement

    pub fn replace_key(&mut self, path: &[PathSeg], new_key: Value) -> Result<(), Error> {
        let Some((last, parent_path)) = path.split_last() else {
            return Err(Error::roundtrip(
                RoundtripErrorKind::PathNotFound,
                "key replacement requires a non-empty path",
            ));
        };
        let PathSeg::Key(old_key) = last else {
            return Err(Error::roundtrip(
                RoundtripErrorKind::PathNotFound,
                "key replacement requires the path to end at a dict key",
            ));
        };
        let (parent_id, _) = self.lookup(parent_path)?;
        let RawKind::Dict(dict) = &self.doc.tree.node(parent_id).kind else {
            return Err(Error::roundtrip(
                RoundtripErrorKind::PathNotFound,
                "key replacement is only possible inside dicts",
            ));
        };
        let entry_idx = dict.index.get(old_key).copied().ok_or_else(|| {
            Error::roundtrip(
                RoundtripErrorKind::PathNotFound,
                format!("no key {} at this path", old_key.display_text()),
            )
        })?;
        let key_node_id = dict.entries[entry_idx].key;

        let replacement_key = crate::ast::scalar_to_key(&new_key).ok_or_else(|| {
            Error::roundtrip(
                RoundtripErrorKind::TypeMismatch,
                format!("a {} value cannot be a dict key", new_key.type_name()),
            )
        })?;
        if dict.index.contains_key(&replacement_key) && replacement_key != *old_key {
            return Err(Error::roundtrip(
                RoundtripErrorKind::KeyCollision,
                format!(
                    "key {} already exists in this dict",
                    replacement_key.display_text()
                ),
            ));
        }

        let key_node = self.doc.tree.node(key_node_id);
        if key_node.tag.is_some() {
            return Err(Error::roundtrip(
                RoundtripErrorKind::TypeMismatch,
                "tagged keys cannot be replaced",
            ));
        }
        let (style, old_value) = match &key_node.kind {
            RawKind::Scalar(scalar) => (scalar.style, scalar.value.clone()),
            _ => {
                return Err(Error::roundtrip(
                    RoundtripErrorKind::PathNotFound,
                    "key node is not a scalar",
                ));
            }
        };
        if self.options.enforce_types
            && std::mem::discriminant(&old_value) != std::mem::discriminant(&new_key)
        {
            return Err(Error::roundtrip(
                RoundtripErrorKind::TypeMismatch,
                format!(
                    "cannot replace a {} key with a {} key while enforce_types is on",
                    old_value.type_name(),
                    new_key.type_name()
                ),
            ));
        }

        let span = key_node.span;
        let occurrences = key_node.keypath_occurrences.clone();
        let (rendered, diagnostic) = self.render_scalar(&style, &new_key, span, true)?;
        if let Some(diagnostic) = diagnostic {
            self.diagnostics.push(diagnostic);
        }
        self.replacements
            .insert((span.start, span.end), rendered.clone());
        for occurrence in occurrences {
            self.replacements
                .insert((occurrence.start, occurrence.end), rendered.clone());
        }

        if let RawKind::Scalar(scalar) = &mut self.doc.tree.node_mut(key_node_id).kind {
            scalar.text = new_key.as_str().map(str::to_string);
            scalar.value = new_key;
        }
        if let RawKind::Dict(dict) = &mut self.doc.tree.node_mut(parent_id).kind {
            let mut renamed = indexmap::IndexMap::with_capacity(dict.index.len());
            for (key, idx) in dict.index.drain(..) {
                if idx == entry_idx {
                    renamed.insert(replacement_key.clone(), idx);
                } else {
                    renamed.insert(key, idx);
                }
            }
            dict.index = renamed;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Comments

    /// Replace an existing comment. New comments cannot be inserted where
    /// none exist.
    pub fn set_comment(
        &mut self,
        path: &[PathSeg],
        anchor: CommentAnchor,
        text: &str,
    ) -> Result<(), Error> {
        if text.contains('\n') {
            return Err(Error::roundtrip(
                RoundtripErrorKind::TypeMismatch,
                "comments must be single-line",
            ));
        }
        let (node_id, entry) = self.lookup(path)?;
        let target_id = match anchor {
            CommentAnchor::KeyDoc | CommentAnchor::KeyTrailing => entry
                .map(|e| e.key)
                .ok_or_else(|| {
                    Error::roundtrip(
                        RoundtripErrorKind::PathNotFound,
                        "key comments exist only for dict entries",
                    )
                })?,
            _ => node_id,
        };
        let node = self.doc.tree.node_mut(target_id);
        let slot = match anchor {
            CommentAnchor::KeyDoc | CommentAnchor::ValueDoc => &mut node.comments.doc,
            CommentAnchor::KeyTrailing | CommentAnchor::ValueTrailing => &mut node.comments.trailing,
            CommentAnchor::ValueStartTrailing => &mut node.comments.start_trailing,
            CommentAnchor::ValueEndTrailing => &mut node.comments.end_trailing,
        };
        let Some(comment) = slot.as_mut() else {
            return Err(Error::roundtrip(
                RoundtripErrorKind::PathNotFound,
                "no comment exists at this anchor; inserting new comments is not supported",
            ));
        };
        let rendered = match anchor {
            CommentAnchor::KeyDoc | CommentAnchor::ValueDoc => format!("### {text}"),
            _ => format!("# {text}"),
        };
        comment.text = text.to_string();
        let span = comment.span;
        self.replacements.insert((span.start, span.end), rendered);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Emission

    /// Re-emit the document: original bytes everywhere except recorded
    /// replacement spans.
    pub fn dumps(&self) -> String {
        let src = self.doc.source.text();
        let mut out = String::with_capacity(src.len());
        let mut cursor = 0usize;
        for ((start, end), text) in &self.replacements {
            if *start < cursor {
                // Subsumed by an earlier replacement of an enclosing span.
                continue;
            }
            out.push_str(&src[cursor..*start]);
            out.push_str(text);
            cursor = *end;
        }
        out.push_str(&src[cursor..]);
        out
    }

    // ------------------------------------------------------------------
    // Style-preserving rendering

    fn render_scalar(
        &self,
        style: &ScalarStyle,
        value: &Value,
        span: Span,
        as_key: bool,
    ) -> Result<(String, Option<Diagnostic>), Error> {
        match style {
            ScalarStyle::Keyword => Ok((canonical_scalar(value)?, None)),
            ScalarStyle::Number { class, stride } => {
                Ok((self.render_number(class, *stride, value)?, None))
            }
            ScalarStyle::Str(string_style) => {
                self.render_string(string_style, value, span, as_key)
            }
        }
    }

    fn render_number(
        &self,
        class: &NumberClass,
        stride: Option<usize>,
        value: &Value,
    ) -> Result<String, Error> {
        match (class, value) {
            (NumberClass::Int { base }, Value::Int(i)) => Ok(num::render_int(*i, *base, stride)),
            (NumberClass::Float { form }, Value::Float(f)) => {
                let hex = matches!(form, FloatForm::Hex) && f.is_finite();
                Ok(num::render_float(*f, hex))
            }
            (NumberClass::Complex, Value::Complex(c)) => Ok(num::render_complex(c)),
            (NumberClass::Rational, Value::Rational(r)) => Ok(num::render_rational(r)),
            // Cross-class replacement (enforce_types off): canonical form.
            (_, other) => canonical_scalar(other),
        }
    }

    fn render_string(
        &self,
        style: &StringStyle,
        value: &Value,
        span: Span,
        as_key: bool,
    ) -> Result<(String, Option<Diagnostic>), Error> {
        let Value::Str(text) = value else {
            return Ok((canonical_scalar(value)?, None));
        };
        let only_ascii = self.options.only_ascii_source;
        match style {
            StringStyle::Unquoted => {
                let fits = if as_key {
                    is_unquoted_key(text, self.options.only_ascii_unquoted)
                } else {
                    is_unquoted_value(text, self.options.only_ascii_unquoted)
                };
                if fits && !crate::constants::is_keyword(text) {
                    Ok((text.clone(), None))
                } else {
                    let escaped = escape::escape(text, '\'', false, only_ascii);
                    Ok((
                        format!("'{escaped}'"),
                        Some(Diagnostic {
                            kind: DiagnosticKind::StyleFallback,
                            message: format!(
                                "replacement {text:?} cannot stay unquoted; quoted style used"
                            ),
                            span,
                        }),
                    ))
                }
            }
            StringStyle::Quoted { quote, delim_len } => {
                self.render_quoted(*quote, *delim_len, text, span, only_ascii)
            }
            StringStyle::Block {
                quote,
                delim_len,
                final_newline,
            } => self.render_block(*quote, *delim_len, *final_newline, text, span, only_ascii),
        }
    }

    fn render_quoted(
        &self,
        quote: QuoteChar,
        delim_len: usize,
        text: &str,
        span: Span,
        only_ascii: bool,
    ) -> Result<(String, Option<Diagnostic>), Error> {
        let quote_char = quote.as_char();
        if quote.is_literal() {
            let has_newline = text.contains('\n');
            let boundary_quote =
                text.starts_with(quote_char) || text.ends_with(quote_char);
            if has_newline || boundary_quote || !text.chars().all(|c| !crate::text::chars::is_disallowed_literal(c)) {
                // Cannot be carried literally; fall back to an escaped style.
                let escaped = escape::escape(text, '"', false, only_ascii);
                return Ok((
                    format!("\"{escaped}\""),
                    Some(Diagnostic {
                        kind: DiagnosticKind::StyleFallback,
                        message: "replacement does not fit a literal string; escaped style used"
                            .to_string(),
                        span,
                    }),
                ));
            }
            let longest = longest_quote_run(text, quote_char);
            let mut new_len = delim_len;
            if longest >= new_len {
                new_len = (longest + 1).max(3);
            }
            let run: String = std::iter::repeat(quote_char).take(new_len).collect();
            Ok((format!("{run}{text}{run}"), None))
        } else {
            let escaped = escape::escape(text, quote_char, false, only_ascii);
            let run: String = std::iter::repeat(quote_char).take(delim_len).collect();
            Ok((format!("{run}{escaped}{run}"), None))
        }
    }

    fn render_block(
        &self,
        quote: QuoteChar,
        delim_len: usize,
        final_newline: FinalNewline,
        text: &str,
        span: Span,
        only_ascii: bool,
    ) -> Result<(String, Option<Diagnostic>), Error> {
        let _ = final_newline;
        let quote_char = quote.as_char();
        let indent = self.line_indent_at(span.end.saturating_sub(1));
        // The closing-delimiter suffix follows the replacement content: no
        // suffix keeps a final newline, `//` strips the one the block form
        // necessarily writes.
        let suffix = if text.ends_with('\n') { "" } else { "//" };
        let prepared = if quote.is_literal() {
            text.to_string()
        } else {
            escape::escape(text, quote_char, true, only_ascii)
        };
        let prepared_body = prepared.strip_suffix('\n').unwrap_or(&prepared);
        let mut new_len = delim_len;
        if quote.is_literal() {
            let longest = prepared_body
                .split('\n')
                .map(|line| longest_quote_run(line, quote_char))
                .max()
                .unwrap_or(0);
            if longest >= new_len {
                new_len = longest + 1;
            }
        }
        let run: String = std::iter::repeat(quote_char).take(new_len).collect();
        let mut out = String::with_capacity(prepared.len() + indent.len() * 4 + 16);
        out.push_str(&run);
        out.push('\n');
        for line in prepared_body.split('\n') {
            if !line.is_empty() {
                out.push_str(&indent);
                out.push_str(line);
            }
            out.push('\n');
        }
        out.push_str(&indent);
        out.push_str(&run);
        out.push_str(suffix);
        Ok((out, None))
    }
}

fn longest_quote_run(text: &str, quote_char: char) -> usize {
    let mut longest = 0usize;
    let mut current = 0usize;
    for c in text.chars() {
        if c == quote_char {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Canonical single-line rendering used for cross-type replacements.
fn canonical_scalar(value: &Value) -> Result<String, Error> {
    encode::encode_fragment(value, &DumpOptions::default(), true)
}

/// Read-only view of a node, exposing its key, value, and attached
/// comments.
pub struct Cursor<'a> {
    ast: &'a RoundtripAst,
    node: NodeId,
    entry: Option<DictEntry>,
}

impl<'a> Cursor<'a> {
    pub fn key(&self) -> Option<Value> {
        let entry = self.entry?;
        self.ast
            .doc
            .tree
            .node(entry.key)
            .as_scalar()
            .map(|s| s.value.clone())
    }

    /// The decoded scalar value at this cursor, if it is a scalar.
    pub fn value(&self) -> Option<&'a Value> {
        self.ast
            .doc
            .tree
            .node(self.node)
            .as_scalar()
            .map(|s| &s.value)
    }

    pub fn get(&self, key: impl Into<Key>) -> Result<Cursor<'a>, Error> {
        let key = key.into();
        let RawKind::Dict(dict) = &self.ast.doc.tree.node(self.node).kind else {
            return Err(Error::roundtrip(
                RoundtripErrorKind::PathNotFound,
                "cursor does not point at a dict",
            ));
        };
        let idx = dict.index.get(&key).copied().ok_or_else(|| {
            Error::roundtrip(
                RoundtripErrorKind::PathNotFound,
                format!("no key {} at this cursor", key.display_text()),
            )
        })?;
        let entry = dict.entries[idx];
        Ok(Cursor {
            ast: self.ast,
            node: entry.value,
            entry: Some(entry),
        })
    }

    pub fn at(&self, index: usize) -> Result<Cursor<'a>, Error> {
        let RawKind::List(list) = &self.ast.doc.tree.node(self.node).kind else {
            return Err(Error::roundtrip(
                RoundtripErrorKind::PathNotFound,
                "cursor does not point at a list",
            ));
        };
        let node = *list.items.get(index).ok_or_else(|| {
            Error::roundtrip(
                RoundtripErrorKind::PathNotFound,
                format!("no item at index {index}"),
            )
        })?;
        Ok(Cursor {
            ast: self.ast,
            node,
            entry: None,
        })
    }

    fn key_comments(&self) -> Option<&'a crate::ast::Comments> {
        let entry = self.entry?;
        Some(&self.ast.doc.tree.node(entry.key).comments)
    }

    fn value_comments(&self) -> &'a crate::ast::Comments {
        &self.ast.doc.tree.node(self.node).comments
    }

    pub fn key_doc_comment(&self) -> Option<&'a str> {
        self.key_comments()?.doc.as_ref().map(|c| c.text.as_str())
    }

    pub fn key_trailing_comment(&self) -> Option<&'a str> {
        self.key_comments()?
            .trailing
            .as_ref()
            .map(|c| c.text.as_str())
    }

    pub fn value_doc_comment(&self) -> Option<&'a str> {
        self.value_comments().doc.as_ref().map(|c| c.text.as_str())
    }

    pub fn value_trailing_comment(&self) -> Option<&'a str> {
        self.value_comments()
            .trailing
            .as_ref()
            .map(|c| c.text.as_str())
    }

    pub fn value_start_trailing_comment(&self) -> Option<&'a str> {
        self.value_comments()
            .start_trailing
            .as_ref()
            .map(|c| c.text.as_str())
    }

    pub fn value_end_trailing_comment(&self) -> Option<&'a str> {
        self.value_comments()
            .end_trailing
            .as_ref()
            .map(|c| c.text.as_str())
    }
}
