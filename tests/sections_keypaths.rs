use bespon::{parse, ErrorKind, LoadOptions, ParseErrorKind, Value};
use rstest::rstest;
use serde_json::json;

fn load(src: &str) -> Value {
    parse(src, &LoadOptions::default()).unwrap()
}

fn load_json(src: &str) -> serde_json::Value {
    load(src).to_json()
}

#[rstest]
fn surface_forms_are_equivalent() {
    let dotted = load("section.subsection.key = value\n");
    let nested = load("section = {subsection = {key = value}}\n");
    let sectioned = load("|=== section.subsection\nkey = value\n|===/\n");
    let historic = load("=== section.subsection\nkey = value\n===/\n");
    assert_eq!(dotted, nested);
    assert_eq!(dotted, sectioned);
    assert_eq!(dotted, historic);
}

#[rstest]
fn keypath_prefix_merging() {
    let src = concat!(
        "a.b.one = 1\n",
        "a.b.two = 2\n",
        "a.c = 3\n",
        "d = 4\n",
    );
    let value = load_json(src);
    assert_eq!(
        value,
        json!({"a": {"b": {"one": 1, "two": 2}, "c": 3}, "d": 4})
    );
}

#[rstest]
fn keypath_order_follows_first_occurrence() {
    let value = load("b.x = 1\na = 2\nb.y = 3\n");
    let keys: Vec<String> = value
        .as_dict()
        .unwrap()
        .keys()
        .map(|k| k.display_text())
        .collect();
    assert_eq!(keys, vec!["b", "a"]);
}

#[rstest]
fn keypath_cannot_reassign_terminal() {
    let err = parse("a.b = 1\na.b = 2\n", &LoadOptions::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse(ParseErrorKind::DuplicateKey));
    let err = parse("a.b = 1\na.b.c = 2\n", &LoadOptions::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse(ParseErrorKind::DuplicateKey));
}

#[rstest]
fn keypath_cannot_enter_explicit_dict() {
    // `a` was written as an explicit inline dict, not keypath-created, so a
    // later dotted key may not merge into it.
    let err = parse("a = {b = 1}\na.c = 2\n", &LoadOptions::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse(ParseErrorKind::DuplicateKey));
}

#[rstest]
fn keypath_enters_overwrite_tagged_dict() {
    let value = load_json("a = (overwrite=true)> {b = 1}\na.c = 2\n");
    assert_eq!(value, json!({"a": {"b": 1, "c": 2}}));
}

#[rstest]
fn sections_set_prefix() {
    let src = concat!(
        "top = 0\n",
        "|=== server.primary\n",
        "host = alpha\n",
        "port = 1\n",
        "|===/\n",
        "bottom = 9\n",
    );
    let value = load_json(src);
    assert_eq!(
        value,
        json!({
            "top": 0,
            "server": {"primary": {"host": "alpha", "port": 1}},
            "bottom": 9
        })
    );
}

#[rstest]
fn section_reentry_merges() {
    let src = concat!(
        "|=== a\n",
        "x = 1\n",
        "|===/\n",
        "|=== a\n",
        "y = 2\n",
        "|===/\n",
    );
    assert_eq!(load_json(src), json!({"a": {"x": 1, "y": 2}}));
}

#[rstest]
fn new_section_replaces_prefix() {
    let src = "|=== a\nx = 1\n|=== b\ny = 2\n";
    assert_eq!(load_json(src), json!({"a": {"x": 1}, "b": {"y": 2}}));
}

#[rstest]
fn section_close_returns_to_root() {
    let src = "|=== a\nx = 1\n|===/\ny = 2\n";
    assert_eq!(load_json(src), json!({"a": {"x": 1}, "y": 2}));
}

#[rstest]
fn section_header_must_end_line() {
    let err = parse("|=== a x = 1\n", &LoadOptions::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse(ParseErrorKind::BadSection));
}

#[rstest]
fn section_header_requires_keypath() {
    let err = parse("|===\nx = 1\n", &LoadOptions::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse(ParseErrorKind::BadSection));
}

#[rstest]
fn inconsistent_section_close_markers_rejected() {
    // First section closed, second left open.
    let err = parse(
        "|=== a\nx = 1\n|===/\n|=== b\ny = 2\n",
        &LoadOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse(ParseErrorKind::BadSection));

    // First section left open, second closed.
    let err = parse(
        "|=== a\nx = 1\n|=== b\ny = 2\n|===/\n",
        &LoadOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse(ParseErrorKind::BadSection));
}

#[rstest]
fn section_cannot_reassign_terminal_scalar() {
    let err = parse("a = 1\n|=== a\nx = 2\n", &LoadOptions::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse(ParseErrorKind::DuplicateKey));
}

#[rstest]
fn dotted_keys_inside_sections() {
    let src = "|=== app\ndb.host = local\ndb.port = 5\n|===/\n";
    assert_eq!(
        load_json(src),
        json!({"app": {"db": {"host": "local", "port": 5}}})
    );
}
