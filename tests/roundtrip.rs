use bespon::roundtrip::{path, CommentAnchor, DiagnosticKind, PathSeg};
use bespon::{
    parse_roundtrip, ErrorKind, LoadOptions, RoundtripErrorKind, SemanticErrorKind, Value,
};
use rstest::rstest;

fn ast(src: &str) -> bespon::RoundtripAst {
    parse_roundtrip(src, &LoadOptions::default()).unwrap()
}

#[rstest]
#[case("k = 1\n")]
#[case("a.b.c = v\n")]
#[case("d = {a = 1, b = [2, 3],}   # inline\n")]
#[case("### doc\nkey = 'quoted'\nitems =\n  * 1\n  * 2\n")]
#[case("|=== section.sub\nkey = value\n|===/\n")]
#[case("x = 0x4.3p2\ny = -inf\nbin = 0b1101\n")]
#[case("block =\n    '''\n    text here\n    '''\n")]
fn edit_free_roundtrip_is_identity(#[case] src: &str) {
    assert_eq!(ast(src).dumps(), src);
}

#[rstest]
fn rename_and_replace_with_style_preservation() {
    let src = concat!(
        "key.subkey.first = 123   # Comment\n",
        "key.subkey.second = 0b1101\n",
        "key.subkey.third = `literal \\string`\n",
    );
    let mut ast = ast(src);
    ast.replace_key(&path(["key", "subkey"]), Value::from("sk"))
        .unwrap();
    ast.replace_val(&path(["key", "sk", "second"]), Value::Int(7))
        .unwrap();
    ast.replace_val(
        &path(["key", "sk", "third"]),
        Value::from("\\another \\literal"),
    )
    .unwrap();
    ast.replace_key(&path(["key", "sk", "third"]), Value::from("fourth"))
        .unwrap();
    assert_eq!(
        ast.dumps(),
        concat!(
            "key.sk.first = 123   # Comment\n",
            "key.sk.second = 0b111\n",
            "key.sk.fourth = `\\another \\literal`\n",
        )
    );
}

#[rstest]
fn base_preservation() {
    let src = "hex = 0xff\noct = 0o755\nbin = 0b1\ndec = 1_000_000\n";
    let mut ast = ast(src);
    ast.replace_val(&path(["hex"]), Value::Int(16)).unwrap();
    ast.replace_val(&path(["oct"]), Value::Int(8)).unwrap();
    ast.replace_val(&path(["bin"]), Value::Int(5)).unwrap();
    ast.replace_val(&path(["dec"]), Value::Int(2_500_000)).unwrap();
    assert_eq!(
        ast.dumps(),
        "hex = 0x10\noct = 0o10\nbin = 0b101\ndec = 2_500_000\n"
    );
}

#[rstest]
fn hex_float_stays_hex() {
    let mut ast = ast("x = 0x4.3p2\n");
    ast.replace_val(&path(["x"]), Value::Float(3.0)).unwrap();
    assert_eq!(ast.dumps(), "x = 0x1.8p1\n");
}

#[rstest]
fn quote_style_preservation() {
    let src = "a = 'single'\nb = \"double\"\nc = `tick`\nd = plain\n";
    let mut ast = ast(src);
    ast.replace_val(&path(["a"]), Value::from("one")).unwrap();
    ast.replace_val(&path(["b"]), Value::from("two")).unwrap();
    ast.replace_val(&path(["c"]), Value::from("three")).unwrap();
    ast.replace_val(&path(["d"]), Value::from("four")).unwrap();
    assert_eq!(
        ast.dumps(),
        "a = 'one'\nb = \"two\"\nc = `three`\nd = four\n"
    );
    assert!(ast.diagnostics().is_empty());
}

#[rstest]
fn delimiter_run_promotion() {
    let mut ast = ast("k = `plain`\n");
    ast.replace_val(&path(["k"]), Value::from("has ` tick"))
        .unwrap();
    assert_eq!(ast.dumps(), "k = ```has ` tick```\n");
    assert!(ast.diagnostics().is_empty());
}

#[rstest]
fn style_fallback_with_diagnostic() {
    let mut ast = ast("k = `plain`\n");
    ast.replace_val(&path(["k"]), Value::from("multi\nline"))
        .unwrap();
    assert_eq!(ast.dumps(), "k = \"multi\\nline\"\n");
    assert_eq!(ast.diagnostics().len(), 1);
    assert_eq!(ast.diagnostics()[0].kind, DiagnosticKind::StyleFallback);
}

#[rstest]
fn unquoted_fallback_quotes_when_needed() {
    let mut ast = ast("k = word\n");
    ast.replace_val(&path(["k"]), Value::from("no longer: plain"))
        .unwrap();
    assert_eq!(ast.dumps(), "k = 'no longer: plain'\n");
    assert_eq!(ast.diagnostics().len(), 1);
}

#[rstest]
fn escape_convention_preserved() {
    let mut ast = ast("k = \"line\\nbreak\"\n");
    ast.replace_val(&path(["k"]), Value::from("tab\there"))
        .unwrap();
    assert_eq!(ast.dumps(), "k = \"tab\there\"\n");
}

#[rstest]
fn keypath_rename_touches_every_occurrence() {
    let src = concat!(
        "app.db.host = local\n",
        "app.db.port = 5\n",
        "app.cache = off\n",
    );
    let mut ast = ast(src);
    ast.replace_key(&path(["app", "db"]), Value::from("store"))
        .unwrap();
    assert_eq!(
        ast.dumps(),
        concat!(
            "app.store.host = local\n",
            "app.store.port = 5\n",
            "app.cache = off\n",
        )
    );
}

#[rstest]
fn rename_collision_rejected() {
    let mut ast = ast("a = 1\nb = 2\n");
    let err = ast.replace_key(&path(["a"]), Value::from("b")).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::Roundtrip(RoundtripErrorKind::KeyCollision)
    );
}

#[rstest]
fn semantic_errors_carry_location_and_snippet() {
    let err = parse_roundtrip("ok = 1\nbad = $missing\n", &LoadOptions::default()).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::Semantic(SemanticErrorKind::UndefinedAlias)
    );
    let location = err.location.unwrap();
    assert_eq!(location.line, 2);
    assert!(location.column > 1);
    assert!(err.snippet.unwrap().contains("$missing"));
}

#[rstest]
fn path_not_found() {
    let mut ast = ast("a = 1\n");
    let err = ast
        .replace_val(&path(["missing"]), Value::Int(2))
        .unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::Roundtrip(RoundtripErrorKind::PathNotFound)
    );
}

#[rstest]
fn enforce_types_guards_replacement() {
    let mut ast = ast("a = 1\n");
    let err = ast
        .replace_val(&path(["a"]), Value::from("text"))
        .unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::Roundtrip(RoundtripErrorKind::TypeMismatch)
    );

    let options = LoadOptions::default().with_enforce_types(false);
    let mut ast = parse_roundtrip("a = 1\n", &options).unwrap();
    ast.replace_val(&path(["a"]), Value::from("text")).unwrap();
    assert_eq!(ast.dumps(), "a = text\n");
}

#[rstest]
fn list_index_paths() {
    let mut ast = ast("items =\n  * 1\n  * 2\n");
    ast.replace_val(
        &[PathSeg::from("items"), PathSeg::Index(1)],
        Value::Int(20),
    )
    .unwrap();
    assert_eq!(ast.dumps(), "items =\n  * 1\n  * 20\n");
}

#[rstest]
fn untouched_bytes_survive_edits() {
    let src = concat!(
        "# header comment\n",
        "\n",
        "first = 1   # keep me\n",
        "second = {a = 1,  b = 2}\n",
        "third = 'unchanged'\n",
    );
    let mut ast = ast(src);
    ast.replace_val(&path(["first"]), Value::Int(9)).unwrap();
    let out = ast.dumps();
    assert_eq!(
        out,
        concat!(
            "# header comment\n",
            "\n",
            "first = 9   # keep me\n",
            "second = {a = 1,  b = 2}\n",
            "third = 'unchanged'\n",
        )
    );
}

#[rstest]
fn cursor_exposes_values_and_comments() {
    let src = concat!(
        "### documents the key\n",
        "key = 1   # trailing value note\n",
        "plain = 2\n",
    );
    let ast = ast(src);
    let cursor = ast.get("key").unwrap();
    assert_eq!(cursor.key(), Some(Value::from("key")));
    assert_eq!(cursor.value(), Some(&Value::Int(1)));
    assert_eq!(cursor.key_doc_comment(), Some("documents the key"));
    assert_eq!(cursor.value_trailing_comment(), Some("trailing value note"));
    assert_eq!(cursor.value_doc_comment(), None);

    let plain = ast.get("plain").unwrap();
    assert_eq!(plain.value_trailing_comment(), None);
    assert_eq!(plain.key_doc_comment(), None);
}

#[rstest]
fn collection_cursor_comments() {
    let src = "d = {  # starts here\n    a = 1,\n}  # ends here\n";
    let ast = ast(src);
    let cursor = ast.get("d").unwrap();
    assert_eq!(cursor.value_start_trailing_comment(), Some("starts here"));
    assert_eq!(cursor.value_end_trailing_comment(), Some("ends here"));
    let inner = cursor.get("a").unwrap();
    assert_eq!(inner.value(), Some(&Value::Int(1)));
}

#[rstest]
fn comment_rewrite_requires_existing_comment() {
    let mut ast = ast("a = 1   # old note\nb = 2\n");
    ast.set_comment(&path(["a"]), CommentAnchor::ValueTrailing, "new note")
        .unwrap();
    assert_eq!(ast.dumps(), "a = 1   # new note\nb = 2\n");

    let err = ast
        .set_comment(&path(["b"]), CommentAnchor::ValueTrailing, "nope")
        .unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::Roundtrip(RoundtripErrorKind::PathNotFound)
    );
}

#[rstest]
fn doc_comment_rewrite() {
    let mut ast = ast("### about a\na = 1\n");
    ast.set_comment(&path(["a"]), CommentAnchor::KeyDoc, "rewritten")
        .unwrap();
    assert_eq!(ast.dumps(), "### rewritten\na = 1\n");
}

#[rstest]
fn to_value_reflects_edits() {
    let mut ast = ast("a = 1\nb = two\n");
    ast.replace_val(&path(["a"]), Value::Int(5)).unwrap();
    let value = ast.to_value().unwrap();
    assert_eq!(value.get("a"), Some(&Value::Int(5)));
    assert_eq!(value.get("b").and_then(Value::as_str), Some("two"));
}

#[rstest]
fn collection_replacement() {
    let mut ast = ast("d = {a = 1}\n");
    let mut map = bespon::Dict::new();
    map.insert(bespon::Key::from("x"), Value::Int(9));
    ast.replace_val(&path(["d"]), Value::Dict(map)).unwrap();
    assert_eq!(ast.dumps(), "d = {x = 9}\n");
}

#[rstest]
fn block_string_replacement() {
    let src = "text =\n    '''\n    old body\n    '''\n";
    let mut ast = ast(src);
    ast.replace_val(&path(["text"]), Value::from("new body\nsecond\n"))
        .unwrap();
    assert_eq!(
        ast.dumps(),
        "text =\n    '''\n    new body\n    second\n    '''\n"
    );
}
