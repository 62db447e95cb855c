//! Layout-aware parser: assembles inline, indentation, section, and keypath
//! surface styles into one raw tree.
//!
//! The parser walks the token stream with a frame of (style, opening column,
//! pending tag, pending doc comment) state. It never converts between
//! surface styles; each collection records how it was written so the
//! round-trip layer and serializer can reproduce it.

use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::ast::{
    scalar_to_key, CollectionStyle, CommentRef, DictData, DictEntry, ListData, NodeId, RawKind,
    RawNode, RawTree, ScalarData, ScalarStyle, TagData,
};
use crate::constants::{is_tag_keyword, NEWLINE_OVERRIDES};
use crate::decode::scanner::{Span, StringStyle, Token, TokenKind};
use crate::decode::source::SourceText;
use crate::error::{Error, LexErrorKind, Location, ParseErrorKind};
use crate::num;
use crate::options::LoadOptions;
use crate::types::{Key, Value};

/// One segment of a dotted key path, with its source span.
type KeypathSegments = SmallVec<[(Key, Span); 4]>;

pub struct Parser<'a> {
    src: &'a str,
    tokens: &'a [Token],
    pos: usize,
    tree: RawTree,
    options: &'a LoadOptions,
    depth: usize,
    pending_doc: Option<CommentRef>,
    pending_tag: Option<TagData>,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str, tokens: &'a [Token], options: &'a LoadOptions) -> Self {
        Self {
            src,
            tokens,
            pos: 0,
            tree: RawTree::new(),
            options,
            depth: 0,
            pending_doc: None,
            pending_tag: None,
        }
    }

    /// Parse the whole document. Returns `None` for an empty document so the
    /// caller can apply `empty_default`.
    pub fn parse(mut self, source: &SourceText) -> Result<Option<RawTree>, Error> {
        self.skip_trivia()?;
        if self.at_eof() {
            if self.pending_tag.is_some() {
                return Err(self.err_here(ParseErrorKind::TagMismatch, "tag is not followed by a value"));
            }
            return Ok(None);
        }
        if matches!(self.kind(), TokenKind::TagOpen) && self.tag_on_own_line() {
            let tag = self.parse_tag()?;
            self.pending_tag = Some(tag);
            self.skip_trivia()?;
        }
        let root = if self.looks_like_key_line() || self.at_section_marker() {
            self.parse_root_dict()?
        } else if matches!(self.kind(), TokenKind::ListItem) {
            let indent = self.current().column - 1;
            let value = self.parse_block_list(indent)?;
            self.skip_trivia()?;
            if !self.at_eof() {
                return Err(self.err_here(
                    ParseErrorKind::Unexpected,
                    "only a single value is allowed at the root of a document",
                ));
            }
            value
        } else {
            let value = self.parse_value(self.current().line_indent)?;
            self.skip_trivia()?;
            if !self.at_eof() {
                return Err(self.err_here(
                    ParseErrorKind::Unexpected,
                    "only a single value is allowed at the root of a document",
                ));
            }
            value
        };
        self.tree.root = root;
        let mut tree = self.tree;
        attach_line_comments(&mut tree, self.tokens, self.src, source);
        Ok(Some(tree))
    }

    // ------------------------------------------------------------------
    // Token cursor helpers

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.kind(), TokenKind::Eof)
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn raw(&self, token: &Token) -> &'a str {
        &self.src[token.span.start..token.span.end]
    }

    fn token_location(&self, token: &Token) -> Location {
        Location::new(token.span.start, token.line, token.column)
    }

    fn err_at(&self, kind: ParseErrorKind, token: &Token, message: impl Into<String>) -> Error {
        Error::parse(kind, message).at(self.token_location(token))
    }

    fn err_here(&self, kind: ParseErrorKind, message: impl Into<String>) -> Error {
        self.err_at(kind, self.current(), message)
    }

    /// Skip newlines and comments. Doc comments become pending; a second doc
    /// comment before the first is consumed is an error.
    fn skip_trivia(&mut self) -> Result<(), Error> {
        loop {
            match self.kind() {
                TokenKind::Newline | TokenKind::LineComment => self.advance(),
                TokenKind::DocComment => {
                    if self.pending_doc.is_some() {
                        return Err(self.err_here(
                            ParseErrorKind::Unexpected,
                            "an object may have at most one doc comment",
                        ));
                    }
                    let token = self.current().clone();
                    let text = comment_text(self.raw(&token));
                    self.pending_doc = Some(CommentRef {
                        span: token.span,
                        text,
                    });
                    self.advance();
                }
                _ => return Ok(()),
            }
        }
    }

    /// Skip spaces within a line; the scanner already dropped them, so this
    /// only passes over comments that may sit before a line break.
    fn skip_inline_trivia(&mut self) {
        while matches!(self.kind(), TokenKind::LineComment) {
            self.advance();
        }
    }

    fn at_section_marker(&self) -> bool {
        matches!(self.kind(), TokenKind::SectionOpen | TokenKind::SectionClose)
    }

    /// Whether the tag at the cursor is followed by a line break, making it
    /// a standalone tag for the value that starts below.
    fn tag_on_own_line(&self) -> bool {
        let mut idx = self.pos;
        while idx < self.tokens.len() {
            if matches!(self.tokens[idx].kind, TokenKind::TagClose) {
                idx += 1;
                break;
            }
            idx += 1;
        }
        match self.tokens.get(idx) {
            Some(token) => matches!(token.kind, TokenKind::Newline | TokenKind::LineComment),
            None => false,
        }
    }

    /// Lookahead: scalar (`.` scalar)* `=` from the current token.
    fn looks_like_key_line(&self) -> bool {
        let mut idx = self.pos;
        if matches!(self.tokens[idx].kind, TokenKind::TagOpen) {
            while idx < self.tokens.len() {
                if matches!(self.tokens[idx].kind, TokenKind::TagClose) {
                    idx += 1;
                    break;
                }
                idx += 1;
            }
        }
        let mut saw_key = false;
        loop {
            if idx + 1 >= self.tokens.len() {
                return false;
            }
            match &self.tokens[idx].kind {
                TokenKind::Unquoted(_)
                | TokenKind::Str { .. }
                | TokenKind::BoolLit(_)
                | TokenKind::NoneLit
                | TokenKind::Number { .. } => {
                    saw_key = true;
                    idx += 1;
                }
                _ => return false,
            }
            match &self.tokens[idx].kind {
                TokenKind::Dot => idx += 1,
                TokenKind::Assign => return saw_key,
                _ => return false,
            }
        }
    }

    // ------------------------------------------------------------------
    // Depth accounting

    fn enter_collection(&mut self, token: &Token) -> Result<(), Error> {
        self.depth += 1;
        if self.depth > self.options.max_nesting_depth {
            return Err(self.err_at(
                ParseErrorKind::DepthExceeded,
                token,
                format!(
                    "nesting depth exceeds the configured maximum of {}",
                    self.options.max_nesting_depth
                ),
            ));
        }
        Ok(())
    }

    fn leave_collection(&mut self) {
        self.depth -= 1;
    }

    // ------------------------------------------------------------------
    // Scalars

    fn scalar_from_current(&mut self) -> Result<NodeId, Error> {
        let token = self.current().clone();
        let node = self.scalar_node_from_token(&token)?;
        self.advance();
        Ok(node)
    }

    fn scalar_node_from_token(&mut self, token: &Token) -> Result<NodeId, Error> {
        let data = match &token.kind {
            TokenKind::BoolLit(b) => ScalarData {
                value: Value::Bool(*b),
                text: None,
                style: ScalarStyle::Keyword,
            },
            TokenKind::NoneLit => ScalarData {
                value: Value::None,
                text: None,
                style: ScalarStyle::Keyword,
            },
            TokenKind::Number { class } => {
                let raw = self.raw(token);
                let value = num::parse_number(
                    raw,
                    *class,
                    self.options.integers,
                    self.options.float_overflow_to_inf,
                )
                .map_err(|e| {
                    if e.overflow {
                        Error::semantic(
                            crate::error::SemanticErrorKind::NumericOverflow,
                            e.message,
                        )
                        .at(self.token_location(token))
                    } else {
                        Error::lex(LexErrorKind::BadNumber, e.message)
                            .at(self.token_location(token))
                    }
                })?;
                let keyword = matches!(
                    value,
                    Value::Float(f) if f.is_nan() || f.is_infinite()
                ) && !raw.contains(|c: char| c.is_ascii_digit());
                ScalarData {
                    value,
                    text: None,
                    style: if keyword {
                        ScalarStyle::Keyword
                    } else {
                        ScalarStyle::Number {
                            class: *class,
                            stride: num::underscore_stride(raw),
                        }
                    },
                }
            }
            TokenKind::Str { decoded, style } => ScalarData {
                value: Value::Str(decoded.clone()),
                text: Some(decoded.clone()),
                style: ScalarStyle::Str(*style),
            },
            TokenKind::Unquoted(text) => ScalarData {
                value: Value::Str(text.clone()),
                text: Some(text.clone()),
                style: ScalarStyle::Str(StringStyle::Unquoted),
            },
            other => {
                return Err(self.err_at(
                    ParseErrorKind::Unexpected,
                    token,
                    format!("expected a scalar value, found {other:?}"),
                ));
            }
        };
        let mut node = RawNode::new(RawKind::Scalar(data), token.span);
        node.tag = self.pending_tag.take();
        node.comments.doc = self.pending_doc.take();
        Ok(self.tree.alloc(node))
    }

    /// Join wrapped continuation lines onto an unquoted scalar value. Each
    /// continuation line must be strictly more indented than the key line.
    fn join_unquoted_continuations(
        &mut self,
        node: NodeId,
        anchor_indent: usize,
    ) -> Result<(), Error> {
        loop {
            // Pattern: Newline, Unquoted-at-deeper-indent not itself a key.
            if !matches!(self.kind(), TokenKind::Newline) {
                return Ok(());
            }
            let next_idx = self.pos + 1;
            if next_idx >= self.tokens.len() {
                return Ok(());
            }
            let next = &self.tokens[next_idx];
            let TokenKind::Unquoted(text) = &next.kind else {
                return Ok(());
            };
            if next.line_indent <= anchor_indent {
                return Ok(());
            }
            if matches!(
                self.tokens[(next_idx + 1).min(self.tokens.len() - 1)].kind,
                TokenKind::Assign | TokenKind::Dot
            ) {
                return Err(self.err_at(
                    ParseErrorKind::Unexpected,
                    next,
                    "a key-value pair cannot appear inside a wrapped value",
                ));
            }
            let continuation = text.clone();
            let span_end = next.span.end;
            self.advance();
            self.advance();
            let raw_node = self.tree.node_mut(node);
            if let RawKind::Scalar(scalar) = &mut raw_node.kind {
                if let Value::Str(s) = &mut scalar.value {
                    s.push(' ');
                    s.push_str(&continuation);
                }
                if let Some(text) = &mut scalar.text {
                    text.push(' ');
                    text.push_str(&continuation);
                }
            }
            raw_node.span.end = span_end;
        }
    }

    // ------------------------------------------------------------------
    // Tags

    /// Parse `( ... )>` into tag data. The cursor is on `(`.
    fn parse_tag(&mut self) -> Result<TagData, Error> {
        let open = self.current().clone();
        if self.pending_tag.is_some() {
            return Err(self.err_at(
                ParseErrorKind::TagMismatch,
                &open,
                "a value may carry only one tag",
            ));
        }
        self.advance();
        let mut tag = TagData {
            span: open.span,
            ..TagData::default()
        };
        let mut first = true;
        loop {
            self.skip_trivia()?;
            match self.kind() {
                TokenKind::TagClose => {
                    tag.span.end = self.current().span.end;
                    self.advance();
                    break;
                }
                TokenKind::Unquoted(_)
                | TokenKind::Str { .. }
                | TokenKind::BoolLit(_)
                | TokenKind::NoneLit => {
                    let name_token = self.current().clone();
                    let name = match &name_token.kind {
                        TokenKind::Unquoted(text) => text.clone(),
                        TokenKind::Str { decoded, .. } => decoded.clone(),
                        TokenKind::BoolLit(true) => "true".to_string(),
                        TokenKind::BoolLit(false) => "false".to_string(),
                        TokenKind::NoneLit => "none".to_string(),
                        _ => unreachable!(),
                    };
                    self.advance();
                    if matches!(self.kind(), TokenKind::Assign) {
                        self.advance();
                        self.parse_tag_keyword(&mut tag, &name, &name_token)?;
                    } else {
                        if !first || tag.type_name.is_some() {
                            return Err(self.err_at(
                                ParseErrorKind::TagMismatch,
                                &name_token,
                                "a tag may carry at most one positional type name",
                            ));
                        }
                        tag.type_name = Some(SmolStr::new(&name));
                    }
                }
                other => {
                    return Err(self.err_here(
                        ParseErrorKind::TagMismatch,
                        format!("unexpected {other:?} in tag"),
                    ));
                }
            }
            first = false;
            self.skip_trivia()?;
            match self.kind() {
                TokenKind::Comma => self.advance(),
                TokenKind::TagClose => {}
                other => {
                    return Err(self.err_here(
                        ParseErrorKind::TagMismatch,
                        format!("expected ',' or ')>' in tag, found {other:?}"),
                    ));
                }
            }
        }
        Ok(tag)
    }

    fn parse_tag_keyword(
        &mut self,
        tag: &mut TagData,
        keyword: &str,
        name_token: &Token,
    ) -> Result<(), Error> {
        if !is_tag_keyword(keyword) {
            return Err(self.err_at(
                ParseErrorKind::TagMismatch,
                name_token,
                format!("unknown tag keyword {keyword:?}"),
            ));
        }
        let value_token = self.current().clone();
        match keyword {
            "type" => {
                if tag.type_name.is_some() {
                    return Err(self.dup_tag_keyword(name_token, keyword));
                }
                let name = self.tag_string_value(&value_token)?;
                tag.type_name = Some(SmolStr::new(&name));
            }
            "label" => {
                if tag.label.is_some() {
                    return Err(self.dup_tag_keyword(name_token, keyword));
                }
                let name = self.tag_string_value(&value_token)?;
                tag.label = Some(SmolStr::new(&name));
            }
            "indent" => {
                if tag.indent.is_some() {
                    return Err(self.dup_tag_keyword(name_token, keyword));
                }
                let text = self.tag_string_value(&value_token)?;
                if !text.chars().all(|c| c == ' ' || c == '\t') {
                    return Err(self.err_at(
                        ParseErrorKind::TagMismatch,
                        &value_token,
                        "the indent tag keyword takes a string of spaces and tabs",
                    ));
                }
                tag.indent = Some(text);
            }
            "newline" => {
                if tag.newline.is_some() {
                    return Err(self.dup_tag_keyword(name_token, keyword));
                }
                let text = self.tag_string_value(&value_token)?;
                if !NEWLINE_OVERRIDES.contains(&text.as_str()) {
                    return Err(self.err_at(
                        ParseErrorKind::TagMismatch,
                        &value_token,
                        "the newline tag keyword takes a newline sequence",
                    ));
                }
                tag.newline = Some(text);
            }
            "init" => {
                if tag.init.is_some() {
                    return Err(self.dup_tag_keyword(name_token, keyword));
                }
                match &value_token.kind {
                    TokenKind::Alias(name) => {
                        tag.init = Some(name.clone());
                        self.advance();
                    }
                    _ => {
                        return Err(self.err_at(
                            ParseErrorKind::TagMismatch,
                            &value_token,
                            "the init tag keyword takes an alias ($name)",
                        ));
                    }
                }
            }
            "overwrite" => {
                match &value_token.kind {
                    TokenKind::BoolLit(b) => {
                        tag.overwrite = *b;
                        self.advance();
                    }
                    _ => {
                        return Err(self.err_at(
                            ParseErrorKind::TagMismatch,
                            &value_token,
                            "the overwrite tag keyword takes true or false",
                        ));
                    }
                }
            }
            _ => unreachable!("keyword list is closed"),
        }
        Ok(())
    }

    fn dup_tag_keyword(&self, token: &Token, keyword: &str) -> Error {
        self.err_at(
            ParseErrorKind::TagMismatch,
            token,
            format!("duplicate tag keyword {keyword:?}"),
        )
    }

    fn tag_string_value(&mut self, token: &Token) -> Result<String, Error> {
        let text = match &token.kind {
            TokenKind::Unquoted(text) => text.clone(),
            TokenKind::Str { decoded, .. } => decoded.clone(),
            other => {
                return Err(self.err_at(
                    ParseErrorKind::TagMismatch,
                    token,
                    format!("expected a string tag argument, found {other:?}"),
                ));
            }
        };
        self.advance();
        Ok(text)
    }

    // ------------------------------------------------------------------
    // Values

    /// Parse a value in block context. `anchor_indent` is the indent width of
    /// the line owning this value (its key line or list-item line).
    fn parse_value(&mut self, anchor_indent: usize) -> Result<NodeId, Error> {
        while matches!(self.kind(), TokenKind::TagOpen) {
            let tag = self.parse_tag()?;
            self.pending_tag = Some(tag);
            self.skip_inline_trivia();
        }
        match self.kind().clone() {
            TokenKind::OpenDict => self.parse_inline_dict(),
            TokenKind::OpenList => self.parse_inline_list(),
            TokenKind::Alias(name) => {
                let token = self.current().clone();
                self.advance();
                let mut node = RawNode::new(RawKind::Alias(name), token.span);
                node.tag = self.pending_tag.take();
                node.comments.doc = self.pending_doc.take();
                Ok(self.tree.alloc(node))
            }
            TokenKind::Newline => self.parse_block_child(anchor_indent),
            TokenKind::Eof => Err(self.err_here(
                ParseErrorKind::EmptyCollectionItem,
                "a key must be followed by a value",
            )),
            TokenKind::Unquoted(_) => {
                let node = self.scalar_from_current()?;
                self.join_unquoted_continuations(node, anchor_indent)?;
                Ok(node)
            }
            _ => self.scalar_from_current(),
        }
    }

    /// Value written on the line(s) below its key: a nested block dict or
    /// block list at strictly greater indentation.
    fn parse_block_child(&mut self, anchor_indent: usize) -> Result<NodeId, Error> {
        self.skip_trivia()?;
        if self.at_eof() {
            return Err(self.err_here(
                ParseErrorKind::EmptyCollectionItem,
                "a key must be followed by a value",
            ));
        }
        let token = self.current().clone();
        if token.line_indent <= anchor_indent {
            return Err(self.err_at(
                ParseErrorKind::Indent,
                &token,
                "a nested value must be indented past its key line",
            ));
        }
        match &token.kind {
            TokenKind::ListItem => self.parse_block_list(token.line_indent),
            TokenKind::TagOpen => {
                let tag = self.parse_tag()?;
                self.pending_tag = Some(tag);
                self.parse_block_child_inner(token.line_indent)
            }
            TokenKind::Str {
                style: StringStyle::Block { .. },
                ..
            } => self.scalar_from_current(),
            _ if self.looks_like_key_line() => self.parse_block_dict(token.line_indent),
            _ => Err(self.err_at(
                ParseErrorKind::Unexpected,
                &token,
                "expected an indented collection after the key line",
            )),
        }
    }

    fn parse_block_child_inner(&mut self, indent: usize) -> Result<NodeId, Error> {
        self.skip_inline_trivia();
        if matches!(self.kind(), TokenKind::Newline) {
            self.skip_trivia()?;
        }
        match self.kind() {
            TokenKind::ListItem => self.parse_block_list(indent),
            TokenKind::OpenDict => self.parse_inline_dict(),
            TokenKind::OpenList => self.parse_inline_list(),
            TokenKind::Str {
                style: StringStyle::Block { .. },
                ..
            } => self.scalar_from_current(),
            _ if self.looks_like_key_line() => self.parse_block_dict(indent),
            other => Err(self.err_here(
                ParseErrorKind::Unexpected,
                format!("expected a collection after the tag, found {other:?}"),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Inline collections

    fn parse_inline_dict(&mut self) -> Result<NodeId, Error> {
        let open = self.current().clone();
        self.enter_collection(&open)?;
        let mut dict = DictData::new(CollectionStyle::Inline, open.column);
        dict.compact = true;
        let mut key_nodes: Vec<NodeId> = Vec::new();
        let tag = self.pending_tag.take();
        let doc = self.pending_doc.take();
        let overwrite = tag.as_ref().map(|t| t.overwrite).unwrap_or(false);
        self.advance();
        let mut pending_comma = false;
        loop {
            self.skip_trivia()?;
            match self.kind() {
                TokenKind::CloseDict => {
                    dict.trailing_comma = pending_comma && !dict.entries.is_empty();
                    break;
                }
                TokenKind::Eof => {
                    return Err(self.err_at(
                        ParseErrorKind::UnbalancedDelimiter,
                        &open,
                        "inline dict is never closed",
                    ));
                }
                TokenKind::Comma => {
                    return Err(self.err_here(
                        ParseErrorKind::EmptyCollectionItem,
                        "empty item in inline dict",
                    ));
                }
                _ => {}
            }
            if !dict.entries.is_empty() && !pending_comma {
                return Err(self.err_here(
                    ParseErrorKind::Unexpected,
                    "inline dict entries must be separated by ','",
                ));
            }
            pending_comma = false;
            if matches!(self.kind(), TokenKind::TagOpen) {
                let tag = self.parse_tag()?;
                self.pending_tag = Some(tag);
            }
            let segments = self.parse_key_segments()?;
            let key_tag = self.pending_tag.take();
            let key_doc = self.pending_doc.take();
            if !matches!(self.kind(), TokenKind::Assign) {
                return Err(self.err_here(
                    ParseErrorKind::Unexpected,
                    "expected '=' after dict key",
                ));
            }
            self.advance();
            self.skip_inline_trivia();
            let value = self.parse_inline_value()?;
            self.insert_entry(&mut dict, &mut key_nodes, segments, value, overwrite, key_tag, key_doc)?;
            self.skip_trivia()?;
            match self.kind() {
                TokenKind::Comma => {
                    let comma = self.current().clone();
                    if !compact_after(self.src, &comma) {
                        dict.compact = false;
                    }
                    pending_comma = true;
                    self.advance();
                }
                TokenKind::CloseDict => {}
                other => {
                    return Err(self.err_here(
                        ParseErrorKind::Unexpected,
                        format!("expected ',' or '}}' in inline dict, found {other:?}"),
                    ));
                }
            }
        }
        let close = self.current().clone();
        self.advance();
        self.leave_collection();
        if dict.entries.is_empty() {
            dict.compact = compact_between(self.src, &open, &close);
        }
        let mut node = RawNode::new(
            RawKind::Dict(dict),
            Span::new(open.span.start, close.span.end),
        );
        node.tag = tag;
        node.comments.doc = doc;
        Ok(self.tree.alloc(node))
    }

    fn parse_inline_list(&mut self) -> Result<NodeId, Error> {
        let open = self.current().clone();
        self.enter_collection(&open)?;
        let mut list = ListData::new(CollectionStyle::Inline, open.column);
        list.compact = true;
        let tag = self.pending_tag.take();
        let doc = self.pending_doc.take();
        self.advance();
        let mut pending_comma = false;
        loop {
            self.skip_trivia()?;
            match self.kind() {
                TokenKind::CloseList => {
                    list.trailing_comma = pending_comma && !list.items.is_empty();
                    break;
                }
                TokenKind::Eof => {
                    return Err(self.err_at(
                        ParseErrorKind::UnbalancedDelimiter,
                        &open,
                        "inline list is never closed",
                    ));
                }
                TokenKind::Comma => {
                    return Err(self.err_here(
                        ParseErrorKind::EmptyCollectionItem,
                        "empty item in inline list",
                    ));
                }
                _ => {}
            }
            if !list.items.is_empty() && !pending_comma {
                return Err(self.err_here(
                    ParseErrorKind::Unexpected,
                    "inline list items must be separated by ','",
                ));
            }
            pending_comma = false;
            let value = self.parse_inline_value()?;
            list.items.push(value);
            self.skip_trivia()?;
            match self.kind() {
                TokenKind::Comma => {
                    let comma = self.current().clone();
                    if !compact_after(self.src, &comma) {
                        list.compact = false;
                    }
                    pending_comma = true;
                    self.advance();
                }
                TokenKind::CloseList => {}
                other => {
                    return Err(self.err_here(
                        ParseErrorKind::Unexpected,
                        format!("expected ',' or ']' in inline list, found {other:?}"),
                    ));
                }
            }
        }
        let close = self.current().clone();
        self.advance();
        self.leave_collection();
        if list.items.is_empty() {
            list.compact = compact_between(self.src, &open, &close);
        }
        let mut node = RawNode::new(
            RawKind::List(list),
            Span::new(open.span.start, close.span.end),
        );
        node.tag = tag;
        node.comments.doc = doc;
        Ok(self.tree.alloc(node))
    }

    /// A value inside an inline collection: scalars, nested inline
    /// collections, aliases, and tagged forms. No wrapped continuations.
    fn parse_inline_value(&mut self) -> Result<NodeId, Error> {
        while matches!(self.kind(), TokenKind::TagOpen) {
            let tag = self.parse_tag()?;
            self.pending_tag = Some(tag);
            self.skip_trivia()?;
        }
        match self.kind().clone() {
            TokenKind::OpenDict => self.parse_inline_dict(),
            TokenKind::OpenList => self.parse_inline_list(),
            TokenKind::Alias(name) => {
                let token = self.current().clone();
                self.advance();
                let mut node = RawNode::new(RawKind::Alias(name), token.span);
                node.tag = self.pending_tag.take();
                node.comments.doc = self.pending_doc.take();
                Ok(self.tree.alloc(node))
            }
            _ => self.scalar_from_current(),
        }
    }

    // ------------------------------------------------------------------
    // Block collections

    fn parse_block_dict(&mut self, indent: usize) -> Result<NodeId, Error> {
        let open = self.current().clone();
        self.enter_collection(&open)?;
        let mut dict = DictData::new(CollectionStyle::Indent, open.column);
        let mut key_nodes: Vec<NodeId> = Vec::new();
        let tag = self.pending_tag.take();
        let overwrite = tag.as_ref().map(|t| t.overwrite).unwrap_or(false);
        let mut end = open.span.end;
        loop {
            self.skip_trivia()?;
            if self.at_eof() {
                break;
            }
            let token = self.current().clone();
            let col = token.column - 1;
            if col < indent {
                break;
            }
            if col > indent {
                return Err(self.err_at(
                    ParseErrorKind::Indent,
                    &token,
                    "dict keys must share the indentation of their first key",
                ));
            }
            if self.at_section_marker() {
                break;
            }
            if matches!(token.kind, TokenKind::ListItem) {
                return Err(self.err_at(
                    ParseErrorKind::Unexpected,
                    &token,
                    "a list item marker cannot appear inside a dict",
                ));
            }
            if matches!(self.kind(), TokenKind::TagOpen) && self.looks_like_key_line() {
                let parsed = self.parse_tag()?;
                self.pending_tag = Some(parsed);
            }
            if !self.looks_like_key_line() {
                break;
            }
            let segments = self.parse_key_segments()?;
            let key_tag = self.pending_tag.take();
            let key_doc = self.pending_doc.take();
            if !matches!(self.kind(), TokenKind::Assign) {
                return Err(self.err_here(
                    ParseErrorKind::Unexpected,
                    "expected '=' after dict key",
                ));
            }
            self.advance();
            self.skip_inline_trivia();
            let value = self.parse_value(indent)?;
            end = self.tree.node(value).span.end.max(end);
            self.insert_entry(&mut dict, &mut key_nodes, segments, value, overwrite, key_tag, key_doc)?;
            self.skip_inline_trivia();
            match self.kind() {
                TokenKind::Newline | TokenKind::Eof => {}
                other => {
                    return Err(self.err_here(
                        ParseErrorKind::Unexpected,
                        format!("expected end of line after dict value, found {other:?}"),
                    ));
                }
            }
        }
        self.leave_collection();
        let mut node = RawNode::new(RawKind::Dict(dict), Span::new(open.span.start, end));
        node.tag = tag;
        Ok(self.tree.alloc(node))
    }

    fn parse_block_list(&mut self, indent: usize) -> Result<NodeId, Error> {
        let open = self.current().clone();
        self.enter_collection(&open)?;
        let mut list = ListData::new(CollectionStyle::Indent, open.column);
        let tag = self.pending_tag.take();
        let mut end = open.span.end;
        loop {
            self.skip_trivia()?;
            if self.at_eof() {
                break;
            }
            let token = self.current().clone();
            let col = token.column - 1;
            if col != indent || !matches!(token.kind, TokenKind::ListItem) {
                break;
            }
            self.advance();
            self.skip_inline_trivia();
            let value = match self.kind() {
                TokenKind::Newline | TokenKind::Eof => {
                    // `*` alone opens a nested collection on following lines.
                    self.parse_item_child(&token)?
                }
                TokenKind::ListItem => {
                    // `* * value`: nested list opened on the item line.
                    let nested_indent = self.current().column - 1;
                    self.parse_block_list(nested_indent)?
                }
                _ if self.looks_like_key_line() => {
                    // `* key = value` starts a dict whose keys align with the
                    // first key after the marker.
                    let key_indent = self.current().column - 1;
                    self.parse_block_dict(key_indent)?
                }
                _ => self.parse_value(indent)?,
            };
            end = self.tree.node(value).span.end.max(end);
            list.items.push(value);
            self.skip_inline_trivia();
            match self.kind() {
                TokenKind::Newline | TokenKind::Eof => {}
                other => {
                    return Err(self.err_here(
                        ParseErrorKind::Unexpected,
                        format!("expected end of line after list item, found {other:?}"),
                    ));
                }
            }
        }
        self.leave_collection();
        if list.items.is_empty() {
            return Err(self.err_at(
                ParseErrorKind::EmptyCollectionItem,
                &open,
                "a list item marker must introduce a value",
            ));
        }
        let mut node = RawNode::new(RawKind::List(list), Span::new(open.span.start, end));
        node.tag = tag;
        Ok(self.tree.alloc(node))
    }

    fn parse_item_child(&mut self, marker: &Token) -> Result<NodeId, Error> {
        self.skip_trivia()?;
        if self.at_eof() {
            return Err(self.err_at(
                ParseErrorKind::EmptyCollectionItem,
                marker,
                "a list item marker must introduce a value",
            ));
        }
        let token = self.current().clone();
        if token.line_indent <= marker.column - 1 {
            return Err(self.err_at(
                ParseErrorKind::EmptyCollectionItem,
                marker,
                "a list item marker must introduce a value",
            ));
        }
        match &token.kind {
            TokenKind::ListItem => self.parse_block_list(token.line_indent),
            _ if self.looks_like_key_line() => self.parse_block_dict(token.line_indent),
            _ => self.parse_value(marker.column - 1),
        }
    }

    // ------------------------------------------------------------------
    // Keys, keypaths, and entry insertion

    /// Parse `key` or `a.b.c` before `=`. Returns the path segments with
    /// their spans.
    fn parse_key_segments(&mut self) -> Result<KeypathSegments, Error> {
        let mut segments = KeypathSegments::new();
        loop {
            let token = self.current().clone();
            let key = self.key_from_token(&token)?;
            self.advance();
            segments.push((key, token.span));
            if matches!(self.kind(), TokenKind::Dot) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(segments)
    }

    fn key_from_token(&mut self, token: &Token) -> Result<Key, Error> {
        let value = match &token.kind {
            TokenKind::BoolLit(b) => Value::Bool(*b),
            TokenKind::NoneLit => Value::None,
            TokenKind::Number { class } => {
                let raw = self.raw(token);
                num::parse_number(
                    raw,
                    *class,
                    self.options.integers,
                    self.options.float_overflow_to_inf,
                )
                .map_err(|e| {
                    Error::lex(LexErrorKind::BadNumber, e.message).at(self.token_location(token))
                })?
            }
            TokenKind::Str { decoded, .. } => Value::Str(decoded.clone()),
            TokenKind::Unquoted(text) => {
                if text.contains(' ') {
                    return Err(self.err_at(
                        ParseErrorKind::Unexpected,
                        token,
                        "dict keys may not contain spaces",
                    ));
                }
                Value::Str(text.clone())
            }
            other => {
                return Err(self.err_at(
                    ParseErrorKind::Unexpected,
                    token,
                    format!("expected a dict key, found {other:?}"),
                ));
            }
        };
        scalar_to_key(&value).ok_or_else(|| {
            Error::lex(
                LexErrorKind::BadNumber,
                "nan cannot be used as a dict key",
            )
            .at(self.token_location(token))
        })
    }

    /// Insert a (possibly dotted) entry into a dict, auto-creating keypath
    /// intermediates and enforcing the duplicate-key policy.
    #[allow(clippy::too_many_arguments)]
    fn insert_entry(
        &mut self,
        dict: &mut DictData,
        key_nodes: &mut Vec<NodeId>,
        segments: KeypathSegments,
        value: NodeId,
        overwrite: bool,
        key_tag: Option<TagData>,
        key_doc: Option<CommentRef>,
    ) -> Result<(), Error> {
        debug_assert!(!segments.is_empty());
        if segments.len() == 1 {
            let (key, span) = segments.into_iter().next().expect("one segment");
            return self.insert_direct(dict, key_nodes, key, span, value, overwrite, key_tag, key_doc);
        }
        if key_tag.is_some() {
            let (_, span) = &segments[0];
            return Err(Error::parse(
                ParseErrorKind::TagMismatch,
                "a dotted key cannot carry a tag",
            )
            .at(Location::new(span.start, 0, 0)));
        }
        // Dotted path: walk or create intermediates.
        let (first_key, first_span) = segments[0].clone();
        match dict.index.get(&first_key).copied() {
            Some(entry_idx) => {
                let entry = dict.entries[entry_idx];
                self.tree
                    .node_mut(entry.key)
                    .keypath_occurrences
                    .push(first_span);
                self.descend_keypath(entry.value, &segments[1..], value, overwrite, first_span, key_doc)
            }
            None => {
                let key_node = self.alloc_key_node(first_key.clone(), first_span);
                let child = self.alloc_keypath_dict(first_span);
                dict.index.insert(first_key, dict.entries.len());
                dict.entries.push(DictEntry {
                    key: key_node,
                    value: child,
                });
                key_nodes.push(key_node);
                self.descend_keypath(child, &segments[1..], value, overwrite, first_span, key_doc)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_direct(
        &mut self,
        dict: &mut DictData,
        key_nodes: &mut Vec<NodeId>,
        key: Key,
        span: Span,
        value: NodeId,
        overwrite: bool,
        key_tag: Option<TagData>,
        key_doc: Option<CommentRef>,
    ) -> Result<(), Error> {
        match dict.index.get(&key).copied() {
            Some(entry_idx) => {
                if !overwrite {
                    return Err(Error::parse(
                        ParseErrorKind::DuplicateKey,
                        format!("duplicate key {}", key.display_text()),
                    )
                    .at(Location::new(span.start, 0, 0)));
                }
                self.tree
                    .node_mut(dict.entries[entry_idx].key)
                    .keypath_occurrences
                    .push(span);
                dict.entries[entry_idx].value = value;
                Ok(())
            }
            None => {
                let key_node = self.alloc_key_node(key.clone(), span);
                let node = self.tree.node_mut(key_node);
                node.tag = key_tag;
                node.comments.doc = key_doc;
                dict.index.insert(key, dict.entries.len());
                dict.entries.push(DictEntry {
                    key: key_node,
                    value,
                });
                key_nodes.push(key_node);
                Ok(())
            }
        }
    }

    /// Walk the remaining keypath segments below an existing node.
    fn descend_keypath(
        &mut self,
        node: NodeId,
        rest: &[(Key, Span)],
        value: NodeId,
        overwrite: bool,
        at_span: Span,
        key_doc: Option<CommentRef>,
    ) -> Result<(), Error> {
        let merge_allowed = match &self.tree.node(node).kind {
            RawKind::Dict(dict) => {
                dict.keypath_created()
                    || overwrite
                    || self
                        .tree
                        .node(node)
                        .tag
                        .as_ref()
                        .map(|t| t.overwrite)
                        .unwrap_or(false)
            }
            _ => false,
        };
        if !merge_allowed {
            return Err(Error::parse(
                ParseErrorKind::DuplicateKey,
                "keypath would re-enter a dict that was not keypath-created or tagged overwrite",
            )
            .at(Location::new(at_span.start, 0, 0)));
        }
        let (key, span) = rest[0].clone();
        let target_overwrite = overwrite
            || self
                .tree
                .node(node)
                .tag
                .as_ref()
                .map(|t| t.overwrite)
                .unwrap_or(false);
        if rest.len() == 1 {
            let mut dict_data = match &mut self.tree.node_mut(node).kind {
                RawKind::Dict(dict) => std::mem::replace(
                    dict,
                    DictData::new(CollectionStyle::Keypath, 0),
                ),
                _ => unreachable!("merge_allowed guarantees a dict"),
            };
            let mut key_nodes = Vec::new();
            let result = self.insert_direct(
                &mut dict_data,
                &mut key_nodes,
                key,
                span,
                value,
                target_overwrite,
                None,
                key_doc,
            );
            if let RawKind::Dict(dict) = &mut self.tree.node_mut(node).kind {
                *dict = dict_data;
            }
            return result;
        }
        let next = match &self.tree.node(node).kind {
            RawKind::Dict(dict) => dict.index.get(&key).map(|idx| dict.entries[*idx]),
            _ => None,
        };
        match next {
            Some(entry) => {
                self.tree
                    .node_mut(entry.key)
                    .keypath_occurrences
                    .push(span);
                self.descend_keypath(entry.value, &rest[1..], value, overwrite, span, key_doc)
            }
            None => {
                let key_node = self.alloc_key_node(key.clone(), span);
                let child = self.alloc_keypath_dict(span);
                if let RawKind::Dict(dict) = &mut self.tree.node_mut(node).kind {
                    dict.index.insert(key, dict.entries.len());
                    dict.entries.push(DictEntry {
                        key: key_node,
                        value: child,
                    });
                }
                self.descend_keypath(child, &rest[1..], value, overwrite, span, key_doc)
            }
        }
    }

    fn alloc_key_node(&mut self, key: Key, span: Span) -> NodeId {
        let node = RawNode::new(
            RawKind::Scalar(ScalarData {
                value: key.to_value(),
                text: key.as_str().map(str::to_string),
                style: key_style(&key),
            }),
            span,
        );
        self.tree.alloc(node)
    }

    fn alloc_keypath_dict(&mut self, span: Span) -> NodeId {
        self.tree.alloc(RawNode::new(
            RawKind::Dict(DictData::new(CollectionStyle::Keypath, 0)),
            span,
        ))
    }

    // ------------------------------------------------------------------
    // Root dict and sections

    fn parse_root_dict(&mut self) -> Result<NodeId, Error> {
        let open = self.current().clone();
        self.enter_collection(&open)?;
        let root_indent = open.line_indent;
        let mut dict = DictData::new(CollectionStyle::Indent, open.column);
        let mut key_nodes: Vec<NodeId> = Vec::new();
        let root_tag = self.pending_tag.take();
        let overwrite = root_tag.as_ref().map(|t| t.overwrite).unwrap_or(false);
        // Key prefix established by the active section, if any.
        let mut section_prefix: Option<KeypathSegments> = None;
        // Close delimiters are optional, but once one section uses (or
        // omits) them, every section must agree.
        let mut sections_closed: Option<bool> = None;
        let mut end = open.span.end;
        loop {
            self.skip_trivia()?;
            if self.at_eof() {
                break;
            }
            let token = self.current().clone();
            match &token.kind {
                TokenKind::SectionOpen => {
                    self.advance();
                    let segments = self.parse_key_segments().map_err(|e| {
                        Error::parse(
                            ParseErrorKind::BadSection,
                            format!("invalid section header: {}", e.message),
                        )
                        .at(e.location.unwrap_or(Location::new(token.span.start, token.line, token.column)))
                    })?;
                    if segments.is_empty() {
                        return Err(self.err_at(
                            ParseErrorKind::BadSection,
                            &token,
                            "a section header must name a key path",
                        ));
                    }
                    self.skip_inline_trivia();
                    if !matches!(self.kind(), TokenKind::Newline | TokenKind::Eof) {
                        return Err(self.err_here(
                            ParseErrorKind::BadSection,
                            "a section header must end its line",
                        ));
                    }
                    if section_prefix.is_some() {
                        // The previous section ended without a close marker.
                        if sections_closed == Some(true) {
                            return Err(self.err_at(
                                ParseErrorKind::BadSection,
                                &token,
                                "section close markers must be used for every section once used",
                            ));
                        }
                        sections_closed = Some(false);
                    }
                    section_prefix = Some(segments);
                    continue;
                }
                TokenKind::SectionClose => {
                    self.advance();
                    self.skip_inline_trivia();
                    if !matches!(self.kind(), TokenKind::Newline | TokenKind::Eof) {
                        return Err(self.err_here(
                            ParseErrorKind::BadSection,
                            "a section close must end its line",
                        ));
                    }
                    if section_prefix.is_some() {
                        if sections_closed == Some(false) {
                            return Err(self.err_at(
                                ParseErrorKind::BadSection,
                                &token,
                                "section close markers must be used for every section once used",
                            ));
                        }
                        sections_closed = Some(true);
                    }
                    section_prefix = None;
                    continue;
                }
                _ => {}
            }
            if token.column - 1 != root_indent {
                return Err(self.err_at(
                    ParseErrorKind::Indent,
                    &token,
                    "top-level keys must share the same indentation",
                ));
            }
            if matches!(self.kind(), TokenKind::TagOpen) && self.looks_like_key_line() {
                let parsed = self.parse_tag()?;
                self.pending_tag = Some(parsed);
            }
            if !self.looks_like_key_line() {
                return Err(self.err_here(
                    ParseErrorKind::Unexpected,
                    "expected a key-value pair or section marker",
                ));
            }
            let mut segments = self.parse_key_segments()?;
            let key_tag = self.pending_tag.take();
            let key_doc = self.pending_doc.take();
            if let Some(prefix) = &section_prefix {
                let mut combined = prefix.clone();
                combined.extend(segments);
                segments = combined;
            }
            if !matches!(self.kind(), TokenKind::Assign) {
                return Err(self.err_here(
                    ParseErrorKind::Unexpected,
                    "expected '=' after dict key",
                ));
            }
            self.advance();
            self.skip_inline_trivia();
            let value = self.parse_value(root_indent)?;
            end = self.tree.node(value).span.end.max(end);
            self.insert_entry(&mut dict, &mut key_nodes, segments, value, overwrite, key_tag, key_doc)?;
            self.skip_inline_trivia();
            match self.kind() {
                TokenKind::Newline | TokenKind::Eof => {}
                other => {
                    return Err(self.err_here(
                        ParseErrorKind::Unexpected,
                        format!("expected end of line after dict value, found {other:?}"),
                    ));
                }
            }
        }
        if section_prefix.is_some() && sections_closed == Some(true) {
            return Err(self.err_here(
                ParseErrorKind::BadSection,
                "section close markers must be used for every section once used",
            ));
        }
        self.leave_collection();
        let mut node = RawNode::new(RawKind::Dict(dict), Span::new(open.span.start, end));
        node.tag = root_tag;
        Ok(self.tree.alloc(node))
    }
}

fn key_style(key: &Key) -> ScalarStyle {
    match key {
        Key::Str(_) => ScalarStyle::Str(StringStyle::Unquoted),
        Key::Int(_) => ScalarStyle::Number {
            class: crate::num::NumberClass::Int {
                base: crate::num::Base::Dec,
            },
            stride: None,
        },
        Key::Float(_) => ScalarStyle::Number {
            class: crate::num::NumberClass::Float {
                form: crate::num::FloatForm::Dec,
            },
            stride: None,
        },
        _ => ScalarStyle::Keyword,
    }
}

fn comment_text(raw: &str) -> String {
    raw.trim_start_matches('#').trim().to_string()
}

/// Whether the character immediately after a comma is non-space content.
fn compact_after(src: &str, comma: &Token) -> bool {
    !matches!(
        src.as_bytes().get(comma.span.end),
        Some(b' ') | Some(b'\n') | Some(b'\r')
    )
}

fn compact_between(src: &str, open: &Token, close: &Token) -> bool {
    open.span.end == close.span.start || !src[open.span.end..close.span.start].contains(' ')
}

/// Bind trailing line comments to the last node ending (or spanning) each
/// line, at the anchor the node's shape dictates.
fn attach_line_comments(tree: &mut RawTree, tokens: &[Token], src: &str, source: &SourceText) {
    let mut comments: Vec<(usize, Span, String)> = Vec::new();
    for token in tokens {
        if matches!(token.kind, TokenKind::LineComment) {
            comments.push((
                token.line,
                token.span,
                comment_text(&src[token.span.start..token.span.end]),
            ));
        }
    }
    if comments.is_empty() {
        return;
    }
    for (line, span, text) in comments {
        let mut best_end: Option<(usize, NodeId)> = None;
        let mut best_start: Option<(usize, NodeId)> = None;
        for id in 0..tree.len() {
            let node = tree.node(id);
            if node_is_virtual(node) || node.span.start >= span.start {
                continue;
            }
            let first_line = source.location(node.span.start).line;
            let last_line = source.location(node.span.end.saturating_sub(1)).line;
            if last_line == line && node.span.end <= span.start {
                if best_end.map(|(end, _)| node.span.end > end).unwrap_or(true) {
                    best_end = Some((node.span.end, id));
                }
            } else if first_line == line && last_line > line {
                if best_start
                    .map(|(start, _)| node.span.start > start)
                    .unwrap_or(true)
                {
                    best_start = Some((node.span.start, id));
                }
            }
        }
        let comment = CommentRef { span, text };
        // A collection whose opening line carries the comment wins over a
        // node that merely ends earlier on that line.
        let use_start = match (best_end, best_start) {
            (Some((end, _)), Some((start, _))) => start > end,
            (None, Some(_)) => true,
            _ => false,
        };
        if use_start {
            if let Some((_, id)) = best_start {
                let node = tree.node_mut(id);
                if matches!(node.kind, RawKind::Dict(_) | RawKind::List(_))
                    && node.comments.start_trailing.is_none()
                {
                    node.comments.start_trailing = Some(comment);
                }
            }
        } else if let Some((_, id)) = best_end {
            let node = tree.node_mut(id);
            match node.kind {
                RawKind::Dict(_) | RawKind::List(_) => {
                    if node.comments.end_trailing.is_none() {
                        node.comments.end_trailing = Some(comment);
                    }
                }
                _ => {
                    if node.comments.trailing.is_none() {
                        node.comments.trailing = Some(comment);
                    }
                }
            }
        }
    }
}

fn node_is_virtual(node: &RawNode) -> bool {
    matches!(
        &node.kind,
        RawKind::Dict(dict) if dict.keypath_created()
    )
}
