//! Loading pipeline: input decoding, tokenizing, parsing, resolution.

pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod source;

use crate::ast::RawTree;
use crate::error::{Error, ParseErrorKind};
use crate::options::LoadOptions;
use crate::types::Value;
use scanner::Token;
use source::SourceText;

/// A parsed document before resolution: the source, its token stream, and
/// the raw tree. Owned by the round-trip layer after `parse_roundtrip`.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub source: SourceText,
    pub tokens: Vec<Token>,
    pub tree: RawTree,
}

/// Tokenize and parse without resolving. `None` means the document holds no
/// data (only trivia).
pub fn parse_raw(input: &str, options: &LoadOptions) -> Result<Option<RawDocument>, Error> {
    let source = SourceText::new(input);
    let tokens = scanner::tokenize(source.text(), options).map_err(|e| enrich(e, &source))?;
    let parser = parser::Parser::new(source.text(), &tokens, options);
    match parser.parse(&source).map_err(|e| enrich(e, &source))? {
        Some(tree) => Ok(Some(RawDocument {
            source,
            tokens,
            tree,
        })),
        None => Ok(None),
    }
}

pub fn parse_str(input: &str, options: &LoadOptions) -> Result<Value, Error> {
    match parse_raw(input, options)? {
        Some(doc) => resolver::resolve(&doc.tree, options).map_err(|e| enrich(e, &doc.source)),
        None => match &options.empty_default {
            Some(value) => Ok(value.clone()),
            None => Err(Error::parse(
                ParseErrorKind::Unexpected,
                "document contains no data",
            )),
        },
    }
}

pub fn parse_bytes(input: &[u8], options: &LoadOptions) -> Result<Value, Error> {
    let text = source::decode_input(input)?;
    parse_str(&text, options)
}

pub fn validate(input: &str, options: &LoadOptions) -> Result<(), Error> {
    parse_str(input, options).map(|_| ())
}

/// Recompute line/column from the error's byte offset and attach the source
/// line as a snippet.
pub(crate) fn enrich(mut err: Error, source: &SourceText) -> Error {
    if let Some(loc) = err.location {
        let fixed = source.location(loc.offset);
        err.location = Some(fixed);
        if err.snippet.is_none() {
            err.snippet = Some(source.line_text(fixed.line).to_string());
        }
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, SemanticErrorKind};
    use crate::types::{Key, Rational};
    use serde_json::json;

    fn parse(input: &str) -> Result<Value, Error> {
        parse_str(input, &LoadOptions::default())
    }

    fn parse_json(input: &str) -> serde_json::Value {
        parse(input).unwrap().to_json()
    }

    #[rstest::rstest]
    fn test_simple_load() {
        let value = parse("k = 1\n").unwrap();
        assert_eq!(value.get("k").and_then(Value::as_int), Some(1));
    }

    #[rstest::rstest]
    fn test_scalar_roots() {
        assert_eq!(parse("42\n").unwrap(), Value::Int(42));
        assert_eq!(parse("none\n").unwrap(), Value::None);
        assert_eq!(
            parse("'just text'\n").unwrap(),
            Value::Str("just text".to_string())
        );
    }

    #[rstest::rstest]
    fn test_indent_style() {
        let value = parse_json("outer =\n    inner = 1\n    other = two\n");
        assert_eq!(value, json!({"outer": {"inner": 1, "other": "two"}}));
    }

    #[rstest::rstest]
    fn test_block_list() {
        let value = parse_json("items =\n  * 1\n  * 2\n  * three\n");
        assert_eq!(value, json!({"items": [1, 2, "three"]}));
    }

    #[rstest::rstest]
    fn test_inline_styles() {
        let value = parse_json("d = {a = 1, b = [2, 3],}\n");
        assert_eq!(value, json!({"d": {"a": 1, "b": [2, 3]}}));
    }

    #[rstest::rstest]
    fn test_keypath_equivalence() {
        let dotted = parse("a.b.c = v\n").unwrap();
        let nested = parse("a = {b = {c = v}}\n").unwrap();
        let sectioned = parse("|=== a.b\nc = v\n|===/\n").unwrap();
        assert_eq!(dotted, nested);
        assert_eq!(dotted, sectioned);
    }

    #[rstest::rstest]
    fn test_keypath_merging() {
        let value = parse_json("a.b.x = 1\na.b.y = 2\na.c = 3\n");
        assert_eq!(value, json!({"a": {"b": {"x": 1, "y": 2}, "c": 3}}));
    }

    #[rstest::rstest]
    fn test_duplicate_key_rejected() {
        let err = parse("a = 1\na = 2\n").unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Parse(ParseErrorKind::DuplicateKey)
        );
    }

    #[rstest::rstest]
    fn test_overwrite_tag_allows_duplicates() {
        let value = parse("d = (overwrite=true)> {a = 1, b = 9, a = 2}\n").unwrap();
        let dict = value.get("d").and_then(Value::as_dict).unwrap().clone();
        let keys: Vec<_> = dict.keys().cloned().collect();
        assert_eq!(keys, vec![Key::from("a"), Key::from("b")]);
        assert_eq!(dict[&Key::from("a")], Value::Int(2));
    }

    #[rstest::rstest]
    fn test_keypath_cannot_reassign_terminal() {
        let err = parse("a.b = 1\na.b.c = 2\n").unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Parse(ParseErrorKind::DuplicateKey)
        );
    }

    #[rstest::rstest]
    fn test_hex_float_and_specials() {
        let value = parse("x = 0x4.3p2\ny = -inf\nz = nan\n").unwrap();
        assert_eq!(value.get("x").and_then(Value::as_float), Some(16.75));
        assert_eq!(
            value.get("y").and_then(Value::as_float),
            Some(f64::NEG_INFINITY)
        );
        assert!(value.get("z").and_then(Value::as_float).unwrap().is_nan());
    }

    #[rstest::rstest]
    fn test_nan_key_rejected() {
        let err = parse("nan = 1\n").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Lex(_)));
    }

    #[rstest::rstest]
    fn test_complex_and_rational() {
        let value = parse("c = 1+2i\nr = 3/4\n").unwrap();
        assert_eq!(
            value.get("c"),
            Some(&Value::Complex(crate::types::Complex::new(1.0, 2.0)))
        );
        assert_eq!(
            value.get("r"),
            Some(&Value::Rational(Rational::new(3, 4).unwrap()))
        );
    }

    #[rstest::rstest]
    fn test_typed_strings() {
        let value = parse("b = (bytes)> 'abc'\nh = (base16)> '4865'\n").unwrap();
        assert_eq!(value.get("b"), Some(&Value::Bytes(b"abc".to_vec())));
        assert_eq!(value.get("h"), Some(&Value::Bytes(vec![0x48, 0x65])));
    }

    #[rstest::rstest]
    fn test_alias_backward() {
        let value = parse_json("a = (label=x)> {n = 1}\nb = $x\n");
        assert_eq!(value, json!({"a": {"n": 1}, "b": {"n": 1}}));
    }

    #[rstest::rstest]
    fn test_alias_forward_requires_flag() {
        let err = parse("b = $x\na = (label=x)> {n = 1}\n").unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Semantic(SemanticErrorKind::UndefinedAlias)
        );
        let options = LoadOptions::default().with_circular_references(true);
        let value = parse_str("b = $x\na = (label=x)> {n = 1}\n", &options).unwrap();
        assert_eq!(value.to_json(), json!({"b": {"n": 1}, "a": {"n": 1}}));
    }

    #[rstest::rstest]
    fn test_cyclic_alias() {
        let src = "a = (label=a)> {self = $a}\n";
        let err = parse(src).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Semantic(SemanticErrorKind::CircularReference)
        );
        let options = LoadOptions::default().with_circular_references(true);
        let value = parse_str(src, &options).unwrap();
        let a = value.get("a").unwrap();
        match a {
            Value::Labeled(labeled) => {
                assert_eq!(labeled.label.as_str(), "a");
                assert_eq!(
                    labeled.value.get("self"),
                    Some(&Value::Alias("a".into()))
                );
            }
            other => panic!("expected labeled dict, got {other:?}"),
        }
    }

    #[rstest::rstest]
    fn test_init_inheritance() {
        let src = "base = (label=b)> {x = 1, y = 2}\nchild = (init=$b)> {y = 3, z = 4}\n";
        let value = parse_json(src);
        assert_eq!(
            value,
            json!({"base": {"x": 1, "y": 2}, "child": {"x": 1, "y": 3, "z": 4}})
        );
    }

    #[rstest::rstest]
    fn test_depth_bound() {
        let at_bound = "a = ".to_string() + &"[".repeat(3) + "1" + &"]".repeat(3) + "\n";
        let options = LoadOptions::default().with_max_nesting_depth(4);
        assert!(parse_str(&at_bound, &options).is_ok());
        let over = "a = ".to_string() + &"[".repeat(4) + "1" + &"]".repeat(4) + "\n";
        let err = parse_str(&over, &options).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Parse(ParseErrorKind::DepthExceeded)
        );
    }

    #[rstest::rstest]
    fn test_empty_document() {
        assert!(parse("# only a comment\n").is_err());
        let options =
            LoadOptions::default().with_empty_default(Some(Value::Dict(Default::default())));
        assert_eq!(
            parse_str("# only a comment\n", &options).unwrap(),
            Value::Dict(Default::default())
        );
    }

    #[rstest::rstest]
    fn test_extended_types() {
        let options = LoadOptions::default().with_extended_types(true);
        let value = parse_str("s = (set)> [1, 2, 3]\n", &options).unwrap();
        assert_eq!(value.to_json(), json!({"s": [1, 2, 3]}));
        let err = parse_str("s = (set)> [1, 1]\n", &options).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Semantic(SemanticErrorKind::IncompatibleType)
        );
        let err = parse("s = (set)> [1, 2]\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Semantic(SemanticErrorKind::UnknownType));
    }

    #[rstest::rstest]
    fn test_error_snippet() {
        let err = parse("good = 1\nbad = {a = 1,,}\n").unwrap_err();
        let location = err.location.unwrap();
        assert_eq!(location.line, 2);
        assert!(err.snippet.unwrap().contains("bad"));
    }

    #[rstest::rstest]
    fn test_wrapped_unquoted_value() {
        let value = parse_json("k = alpha beta\n    gamma delta\nnext = 1\n");
        assert_eq!(
            value,
            json!({"k": "alpha beta gamma delta", "next": 1})
        );
    }

    #[rstest::rstest]
    fn test_bom_input() {
        let value = parse_bytes(b"\xEF\xBB\xBFk = 1\n", &LoadOptions::default()).unwrap();
        assert_eq!(value.get("k").and_then(Value::as_int), Some(1));
    }

    #[rstest::rstest]
    fn test_section_reentry() {
        let src = "|=== a\nx = 1\n|===/\n|=== a\ny = 2\n|===/\n";
        let value = parse_json(src);
        assert_eq!(value, json!({"a": {"x": 1, "y": 2}}));
    }

    #[rstest::rstest]
    fn test_section_reset_without_close() {
        let src = "|=== a\nx = 1\n|=== b\ny = 2\n";
        let value = parse_json(src);
        assert_eq!(value, json!({"a": {"x": 1}, "b": {"y": 2}}));
    }

    #[rstest::rstest]
    fn test_integers_off() {
        let options = LoadOptions::default().with_integers(false);
        let value = parse_str("k = 3\n", &options).unwrap();
        assert_eq!(value.get("k"), Some(&Value::Float(3.0)));
    }

    #[rstest::rstest]
    fn test_doc_comment_binding() {
        let doc = parse_raw("### about k\nk = 1\n", &LoadOptions::default())
            .unwrap()
            .unwrap();
        let root = doc.tree.node(doc.tree.root);
        let dict = root.as_dict().unwrap();
        let key_node = doc.tree.node(dict.entries[0].key);
        assert_eq!(
            key_node.comments.doc.as_ref().map(|c| c.text.as_str()),
            Some("about k")
        );
    }

    #[rstest::rstest]
    fn test_trailing_comment_binding() {
        let doc = parse_raw("k = 1   # the answer\n", &LoadOptions::default())
            .unwrap()
            .unwrap();
        let root = doc.tree.node(doc.tree.root);
        let dict = root.as_dict().unwrap();
        let value_node = doc.tree.node(dict.entries[0].value);
        assert_eq!(
            value_node.comments.trailing.as_ref().map(|c| c.text.as_str()),
            Some("the answer")
        );
    }
}
