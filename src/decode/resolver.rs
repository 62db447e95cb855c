//! Tag interpretation, label/alias wiring, and inheritance.
//!
//! Runs after the parser over the raw tree: applies explicit type tags via
//! the registry, binds labels in a document-scoped symbol table, resolves
//! aliases (with cycle detection bounded by the configured depth), seeds
//! `init` inheritance, and produces the final value graph.

use std::collections::{HashMap, HashSet};

use smol_str::SmolStr;

use crate::ast::{DictData, ListData, NodeId, RawKind, RawTree, ScalarData, TagData};
use crate::decode::scanner::StringStyle;
use crate::error::{Error, Location, ParseErrorKind, SemanticErrorKind};
use crate::options::LoadOptions;
use crate::types::{Complex, Dict, Key, Labeled, Rational, TypeRegistry, Value};

pub fn resolve(tree: &RawTree, options: &LoadOptions) -> Result<Value, Error> {
    let mut registry = TypeRegistry::core();
    if options.extended_types {
        registry.add_extended();
    }
    if options.python_types {
        registry.add_python_types();
    }
    for record in &options.custom_types {
        registry.insert(record.clone());
    }
    for (name, parser) in &options.custom_parsers {
        if !registry.replace_parser(name, parser.clone()) {
            return Err(Error::semantic(
                SemanticErrorKind::UnknownType,
                format!("custom parser targets unknown type {name:?}"),
            ));
        }
    }

    let mut resolver = Resolver {
        tree,
        options,
        registry,
        labels: HashMap::new(),
        resolved: HashMap::new(),
        in_progress: Vec::new(),
        cyclic_labels: HashSet::new(),
    };
    resolver.collect_labels()?;
    resolver.resolve_node(tree.root, 0)
}

struct Resolver<'a> {
    tree: &'a RawTree,
    options: &'a LoadOptions,
    registry: TypeRegistry,
    labels: HashMap<SmolStr, NodeId>,
    resolved: HashMap<NodeId, Value>,
    in_progress: Vec<NodeId>,
    cyclic_labels: HashSet<SmolStr>,
}

impl<'a> Resolver<'a> {
    fn node_location(&self, id: NodeId) -> Location {
        let span = self.tree.node(id).span;
        Location::new(span.start, 0, 0)
    }

    fn collect_labels(&mut self) -> Result<(), Error> {
        for id in 0..self.tree.len() {
            let node = self.tree.node(id);
            let Some(tag) = &node.tag else { continue };
            if let Some(label) = &tag.label {
                if !self.options.aliases {
                    return Err(Error::semantic(
                        SemanticErrorKind::UndefinedAlias,
                        "labels are not allowed when aliases are disabled",
                    )
                    .at(self.node_location(id)));
                }
                if self.labels.insert(label.clone(), id).is_some() {
                    return Err(Error::semantic(
                        SemanticErrorKind::LabelRedefinition,
                        format!("label {label:?} is declared more than once"),
                    )
                    .at(self.node_location(id)));
                }
            }
        }
        Ok(())
    }

    fn check_depth(&self, depth: usize, id: NodeId) -> Result<(), Error> {
        if depth > self.options.max_nesting_depth {
            return Err(Error::parse(
                ParseErrorKind::DepthExceeded,
                format!(
                    "resolution depth exceeds the configured maximum of {}",
                    self.options.max_nesting_depth
                ),
            )
            .at(self.node_location(id)));
        }
        Ok(())
    }

    fn resolve_node(&mut self, id: NodeId, depth: usize) -> Result<Value, Error> {
        self.check_depth(depth, id)?;
        if let Some(value) = self.resolved.get(&id) {
            return Ok(value.clone());
        }
        if self.in_progress.contains(&id) {
            let label = self
                .tree
                .node(id)
                .tag
                .as_ref()
                .and_then(|t| t.label.clone());
            let Some(label) = label else {
                return Err(Error::semantic(
                    SemanticErrorKind::CircularReference,
                    "value graph is circular",
                )
                .at(self.node_location(id)));
            };
            if !self.options.circular_references {
                return Err(Error::semantic(
                    SemanticErrorKind::CircularReference,
                    format!("alias ${label} creates a circular reference"),
                )
                .at(self.node_location(id)));
            }
            self.cyclic_labels.insert(label.clone());
            return Ok(Value::Alias(label));
        }

        self.in_progress.push(id);
        let node = self.tree.node(id);
        let result = match &node.kind {
            RawKind::Scalar(scalar) => self.resolve_scalar(id, scalar, node.tag.as_ref()),
            RawKind::Alias(name) => self.resolve_alias(id, name, depth),
            RawKind::Dict(dict) => self.resolve_dict(id, dict, node.tag.as_ref(), depth),
            RawKind::List(list) => self.resolve_list(id, list, node.tag.as_ref(), depth),
        };
        self.in_progress.pop();
        let mut value = result?;

        if let Some(tag) = &node.tag {
            if let Some(label) = &tag.label {
                if self.cyclic_labels.contains(label) {
                    value = Value::Labeled(Box::new(Labeled {
                        label: label.clone(),
                        value,
                    }));
                }
            }
        }
        self.resolved.insert(id, value.clone());
        Ok(value)
    }

    fn resolve_alias(&mut self, id: NodeId, name: &SmolStr, depth: usize) -> Result<Value, Error> {
        if !self.options.aliases {
            return Err(Error::semantic(
                SemanticErrorKind::UndefinedAlias,
                format!("alias ${name} is not allowed when aliases are disabled"),
            )
            .at(self.node_location(id)));
        }
        let Some(target) = self.labels.get(name).copied() else {
            return Err(Error::semantic(
                SemanticErrorKind::UndefinedAlias,
                format!("alias ${name} does not match any label"),
            )
            .at(self.node_location(id)));
        };
        if !self.options.circular_references && !self.in_progress.contains(&target) {
            let alias_start = self.tree.node(id).span.start;
            let target_end = self.tree.node(target).span.end;
            if target_end > alias_start {
                return Err(Error::semantic(
                    SemanticErrorKind::UndefinedAlias,
                    format!(
                        "alias ${name} refers forward; enable circular_references to allow it"
                    ),
                )
                .at(self.node_location(id)));
            }
        }
        self.resolve_node(target, depth + 1)
    }

    fn resolve_scalar(
        &mut self,
        id: NodeId,
        scalar: &ScalarData,
        tag: Option<&TagData>,
    ) -> Result<Value, Error> {
        let mut value = scalar.value.clone();
        let Some(tag) = tag else {
            return Ok(value);
        };
        if tag.init.is_some() {
            return Err(Error::parse(
                ParseErrorKind::TagMismatch,
                "the init tag keyword applies to dicts",
            )
            .at(self.node_location(id)));
        }
        if tag.overwrite {
            return Err(Error::parse(
                ParseErrorKind::TagMismatch,
                "the overwrite tag keyword applies to dicts",
            )
            .at(self.node_location(id)));
        }
        let is_block = matches!(scalar.style, crate::ast::ScalarStyle::Str(StringStyle::Block { .. }));
        if (tag.indent.is_some() || tag.newline.is_some()) && !is_block {
            return Err(Error::parse(
                ParseErrorKind::TagMismatch,
                "indent and newline tag keywords apply to block strings",
            )
            .at(self.node_location(id)));
        }
        if let Value::Str(text) = &mut value {
            if tag.newline.is_some() || tag.indent.is_some() {
                *text = reflow_block(text, tag.indent.as_deref(), tag.newline.as_deref());
            }
        }
        let Some(type_name) = &tag.type_name else {
            return Ok(value);
        };
        self.apply_scalar_type(id, scalar, value, type_name)
    }

    fn apply_scalar_type(
        &mut self,
        id: NodeId,
        scalar: &ScalarData,
        value: Value,
        type_name: &SmolStr,
    ) -> Result<Value, Error> {
        if matches!(type_name.as_str(), "none" | "bool" | "true" | "false") {
            return Err(Error::semantic(
                SemanticErrorKind::IncompatibleType,
                format!("explicit typing with {type_name:?} is forbidden"),
            )
            .at(self.node_location(id)));
        }
        let Some(record) = self.registry.get(type_name) else {
            return Err(Error::semantic(
                SemanticErrorKind::UnknownType,
                format!("unknown type {type_name:?}"),
            )
            .at(self.node_location(id)));
        };
        let implicit = scalar.implicit_type();
        if !record.accepts(implicit) {
            return Err(Error::semantic(
                SemanticErrorKind::IncompatibleType,
                format!("type {type_name:?} cannot be applied to a {implicit} value"),
            )
            .at(self.node_location(id)));
        }
        if let Some(parser) = &record.parser {
            let text = match &value {
                Value::Str(s) => s.clone(),
                other => other.to_json().to_string(),
            };
            return parser(&text).map_err(|message| {
                Error::semantic(SemanticErrorKind::IncompatibleType, message)
                    .at(self.node_location(id))
            });
        }
        let converted = match type_name.as_str() {
            "float" => match value {
                Value::Int(i) => Value::Float(i as f64),
                other => other,
            },
            "complex" => match value {
                Value::Int(i) => Value::Complex(Complex::new(i as f64, 0.0)),
                Value::Float(f) => Value::Complex(Complex::new(f, 0.0)),
                other => other,
            },
            "rational" => match value {
                Value::Int(i) => Value::Rational(
                    Rational::new(i, 1).expect("denominator one is nonzero"),
                ),
                other => other,
            },
            _ => value,
        };
        Ok(converted)
    }

    fn resolve_dict(
        &mut self,
        id: NodeId,
        dict: &DictData,
        tag: Option<&TagData>,
        depth: usize,
    ) -> Result<Value, Error> {
        if let Some(tag) = tag {
            if tag.indent.is_some() || tag.newline.is_some() {
                return Err(Error::parse(
                    ParseErrorKind::TagMismatch,
                    "indent and newline tag keywords apply to block strings",
                )
                .at(self.node_location(id)));
            }
            if let Some(type_name) = &tag.type_name {
                let record = self.registry.get(type_name).ok_or_else(|| {
                    Error::semantic(
                        SemanticErrorKind::UnknownType,
                        format!("unknown type {type_name:?}"),
                    )
                    .at(self.node_location(id))
                })?;
                if !record.accepts("dict") {
                    return Err(Error::semantic(
                        SemanticErrorKind::IncompatibleType,
                        format!("type {type_name:?} cannot be applied to a dict"),
                    )
                    .at(self.node_location(id)));
                }
            }
        }

        let mut out = Dict::new();
        if let Some(init) = tag.and_then(|t| t.init.as_ref()) {
            if !self.options.aliases {
                return Err(Error::semantic(
                    SemanticErrorKind::UndefinedAlias,
                    "init is not allowed when aliases are disabled",
                )
                .at(self.node_location(id)));
            }
            let Some(target) = self.labels.get(init).copied() else {
                return Err(Error::semantic(
                    SemanticErrorKind::UndefinedAlias,
                    format!("init target ${init} does not match any label"),
                )
                .at(self.node_location(id)));
            };
            let seed = self.resolve_node(target, depth + 1)?;
            match seed.unwrap_labeled() {
                Value::Dict(pairs) => {
                    for (k, v) in pairs {
                        out.insert(k.clone(), v.clone());
                    }
                }
                other => {
                    return Err(Error::semantic(
                        SemanticErrorKind::IncompatibleType,
                        format!("init target ${init} is a {}, not a dict", other.type_name()),
                    )
                    .at(self.node_location(id)));
                }
            }
        }

        for entry in &dict.entries {
            let key = self.tree.key_of(entry.key).ok_or_else(|| {
                Error::parse(ParseErrorKind::Unexpected, "dict key is not a scalar")
                    .at(self.node_location(entry.key))
            })?;
            let value = self.resolve_node(entry.value, depth + 1)?;
            self.insert_resolved(&mut out, key, value);
        }
        Ok(Value::Dict(out))
    }

    /// Later assignments replace earlier ones in place, keeping
    /// first-occurrence order (the parser has already enforced uniqueness
    /// where the overwrite policy demands it).
    fn insert_resolved(&self, out: &mut Dict, key: Key, value: Value) {
        match out.get_mut(&key) {
            Some(slot) => *slot = value,
            None => {
                out.insert(key, value);
            }
        }
    }

    fn resolve_list(
        &mut self,
        id: NodeId,
        list: &ListData,
        tag: Option<&TagData>,
        depth: usize,
    ) -> Result<Value, Error> {
        if let Some(tag) = tag {
            if tag.init.is_some() {
                return Err(Error::parse(
                    ParseErrorKind::TagMismatch,
                    "the init tag keyword applies to dicts",
                )
                .at(self.node_location(id)));
            }
            if tag.indent.is_some() || tag.newline.is_some() {
                return Err(Error::parse(
                    ParseErrorKind::TagMismatch,
                    "indent and newline tag keywords apply to block strings",
                )
                .at(self.node_location(id)));
            }
        }
        let mut items = Vec::with_capacity(list.items.len());
        for item in &list.items {
            items.push(self.resolve_node(*item, depth + 1)?);
        }
        if let Some(type_name) = tag.and_then(|t| t.type_name.as_ref()) {
            let record = self.registry.get(type_name).ok_or_else(|| {
                Error::semantic(
                    SemanticErrorKind::UnknownType,
                    format!("unknown type {type_name:?}"),
                )
                .at(self.node_location(id))
            })?;
            if !record.accepts("list") {
                return Err(Error::semantic(
                    SemanticErrorKind::IncompatibleType,
                    format!("type {type_name:?} cannot be applied to a list"),
                )
                .at(self.node_location(id)));
            }
            if type_name == "set" {
                for (i, a) in items.iter().enumerate() {
                    if items[..i].contains(a) {
                        return Err(Error::semantic(
                            SemanticErrorKind::IncompatibleType,
                            "set elements must be unique",
                        )
                        .at(self.node_location(id)));
                    }
                }
            }
        }
        Ok(Value::List(items))
    }
}

/// Apply `indent`/`newline` tag overrides to a decoded block string: every
/// line is re-prefixed with the indent unit and line breaks are rewritten.
fn reflow_block(text: &str, indent: Option<&str>, newline: Option<&str>) -> String {
    let newline = newline.unwrap_or("\n");
    let indent = indent.unwrap_or("");
    let mut out = String::with_capacity(text.len() + indent.len() * 4);
    let had_final_newline = text.ends_with('\n');
    let body = if had_final_newline {
        &text[..text.len() - 1]
    } else {
        text
    };
    for (i, line) in body.split('\n').enumerate() {
        if i > 0 {
            out.push_str(newline);
        }
        if !line.is_empty() {
            out.push_str(indent);
        }
        out.push_str(line);
    }
    if had_final_newline {
        out.push_str(newline);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    fn test_reflow_block() {
        assert_eq!(reflow_block("a\nb\n", None, Some("\r\n")), "a\r\nb\r\n");
        assert_eq!(reflow_block("a\nb\n", Some("  "), None), "  a\n  b\n");
        assert_eq!(
            reflow_block("a\n\nb\n", Some("\t"), None),
            "\ta\n\n\tb\n"
        );
    }
}
