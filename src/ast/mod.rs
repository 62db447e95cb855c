//! Raw parse tree shared by the resolver and the round-trip layer.
//!
//! Nodes live in an index arena so labels and aliases can reference one
//! another (including cyclically) without ownership cycles. Each node keeps
//! its source span, surface style, pending tag, and attached comments.

use indexmap::IndexMap;

use smol_str::SmolStr;

use crate::decode::scanner::{Span, StringStyle};
use crate::num::NumberClass;
use crate::types::{Key, Value};

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStyle {
    Inline,
    Indent,
    Section,
    /// Intermediate dict auto-created by a keypath or section prefix.
    Keypath,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentRef {
    pub span: Span,
    pub text: String,
}

/// Comment anchors per node; `None` means no comment at that slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comments {
    pub doc: Option<CommentRef>,
    pub trailing: Option<CommentRef>,
    pub start_trailing: Option<CommentRef>,
    pub end_trailing: Option<CommentRef>,
}

/// Parsed `(...)>` tag arguments, applied by the resolver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagData {
    pub span: Span,
    pub type_name: Option<SmolStr>,
    pub label: Option<SmolStr>,
    pub indent: Option<String>,
    pub newline: Option<String>,
    pub init: Option<SmolStr>,
    pub overwrite: bool,
}

impl TagData {
    pub fn is_empty(&self) -> bool {
        self.type_name.is_none()
            && self.label.is_none()
            && self.indent.is_none()
            && self.newline.is_none()
            && self.init.is_none()
            && !self.overwrite
    }
}

/// Surface profile of a scalar, kept for round-trip re-rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarStyle {
    /// `true`, `false`, `none`, `inf`, `nan` spellings.
    Keyword,
    Number {
        class: NumberClass,
        stride: Option<usize>,
    },
    Str(StringStyle),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarData {
    /// Default (untagged) interpretation of the literal.
    pub value: Value,
    /// Decoded text for string-shaped literals, fed to typed-string parsers.
    pub text: Option<String>,
    pub style: ScalarStyle,
}

impl ScalarData {
    pub fn implicit_type(&self) -> &'static str {
        self.value.type_name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictEntry {
    pub key: NodeId,
    pub value: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DictData {
    pub entries: Vec<DictEntry>,
    /// Entry index by key, in first-occurrence order.
    pub index: IndexMap<Key, usize>,
    pub style: CollectionStyle,
    pub opening_column: usize,
    pub trailing_comma: bool,
    pub compact: bool,
}

impl DictData {
    pub fn new(style: CollectionStyle, opening_column: usize) -> Self {
        Self {
            entries: Vec::new(),
            index: IndexMap::new(),
            style,
            opening_column,
            trailing_comma: false,
            compact: false,
        }
    }

    pub fn keypath_created(&self) -> bool {
        matches!(self.style, CollectionStyle::Keypath)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListData {
    pub items: Vec<NodeId>,
    pub style: CollectionStyle,
    pub opening_column: usize,
    pub trailing_comma: bool,
    pub compact: bool,
}

impl ListData {
    pub fn new(style: CollectionStyle, opening_column: usize) -> Self {
        Self {
            items: Vec::new(),
            style,
            opening_column,
            trailing_comma: false,
            compact: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawKind {
    Scalar(ScalarData),
    Dict(DictData),
    List(ListData),
    Alias(SmolStr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    pub kind: RawKind,
    pub span: Span,
    pub tag: Option<TagData>,
    pub comments: Comments,
    /// Later spans where this key appears as a keypath segment.
    pub keypath_occurrences: Vec<Span>,
}

impl RawNode {
    pub fn new(kind: RawKind, span: Span) -> Self {
        Self {
            kind,
            span,
            tag: None,
            comments: Comments::default(),
            keypath_occurrences: Vec::new(),
        }
    }

    pub fn implicit_type(&self) -> &'static str {
        match &self.kind {
            RawKind::Scalar(scalar) => scalar.implicit_type(),
            RawKind::Dict(_) => "dict",
            RawKind::List(_) => "list",
            RawKind::Alias(_) => "alias",
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarData> {
        match &self.kind {
            RawKind::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&DictData> {
        match &self.kind {
            RawKind::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListData> {
        match &self.kind {
            RawKind::List(list) => Some(list),
            _ => None,
        }
    }
}

/// The arena plus the root node of the document.
#[derive(Debug, Clone)]
pub struct RawTree {
    nodes: Vec<RawNode>,
    pub root: NodeId,
}

impl RawTree {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: 0,
        }
    }

    pub fn alloc(&mut self, node: RawNode) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &RawNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut RawNode {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The key of a dict key node, when its scalar form is hashable.
    pub fn key_of(&self, id: NodeId) -> Option<Key> {
        scalar_to_key(&self.node(id).as_scalar()?.value)
    }
}

impl Default for RawTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a scalar value to a dict key. NaN floats and non-scalar shapes
/// have no key form.
pub fn scalar_to_key(value: &Value) -> Option<Key> {
    match value {
        Value::None => Some(Key::None),
        Value::Bool(b) => Some(Key::Bool(*b)),
        Value::Int(i) => Some(Key::Int(*i)),
        Value::Float(f) => crate::types::FloatKey::new(*f).map(Key::Float),
        Value::Str(s) => Some(Key::Str(s.clone())),
        _ => None,
    }
}
