use bespon::{parse, serialize, DumpOptions, LoadOptions, Value};
use rstest::rstest;
use serde_json::json;

fn reload(out: &str) -> Value {
    parse(out, &LoadOptions::default()).unwrap()
}

#[rstest]
#[case("a = 1\nb = two words\nc = -2.5\n")]
#[case("nested = {x = 1, y = {z = 2}}\n")]
#[case("list = [1, two, 3.5, true, none]\n")]
#[case("deep =\n    one =\n        two = 3\n")]
#[case("c = 1.5+2.5i\nr = 3/4\n")]
#[case("specials = [inf, -inf]\n")]
#[case("text = 'with: punctuation'\n")]
fn serialize_then_parse_is_identity(#[case] src: &str) {
    let value = parse(src, &LoadOptions::default()).unwrap();
    let out = serialize(&value, &DumpOptions::default()).unwrap();
    assert_eq!(reload(&out), value, "output was: {out:?}");
}

#[rstest]
fn default_output_is_indent_style() {
    let value = parse("a = {b = {c = 1}}\n", &LoadOptions::default()).unwrap();
    let out = serialize(&value, &DumpOptions::default()).unwrap();
    assert_eq!(out, "a =\n    b =\n        c = 1\n");
}

#[rstest]
fn inline_depth_switch() {
    let value = parse("a = {b = {c = 1}}\n", &LoadOptions::default()).unwrap();
    let options = DumpOptions::default().with_inline_depth(2);
    let out = serialize(&value, &options).unwrap();
    assert_eq!(out, "a =\n    b = {c = 1}\n");
}

#[rstest]
fn trailing_commas_round_trip() {
    let value = parse("d = {a = 1, b = 2,}\n", &LoadOptions::default()).unwrap();
    let with = serialize(
        &value,
        &DumpOptions::default()
            .with_inline_depth(1)
            .with_trailing_commas(true),
    )
    .unwrap();
    assert_eq!(with, "d = {a = 1, b = 2,}\n");
    let without = serialize(&value, &DumpOptions::default().with_inline_depth(1)).unwrap();
    assert_eq!(without, "d = {a = 1, b = 2}\n");
}

#[rstest]
fn hex_floats_reload_equal() {
    let value = parse("x = 16.75\ny = 0.5\n", &LoadOptions::default()).unwrap();
    let out = serialize(&value, &DumpOptions::default().with_hex_floats(true)).unwrap();
    assert!(out.contains("0x"));
    assert_eq!(reload(&out), value);
}

#[rstest]
fn bytes_round_trip() {
    let value = parse("b = (base64)> 'aGVsbG8='\n", &LoadOptions::default()).unwrap();
    let out = serialize(&value, &DumpOptions::default()).unwrap();
    assert_eq!(out, "b = (bytes)> 'hello'\n");
    assert_eq!(reload(&out), value);
}

#[rstest]
fn cyclic_graph_round_trip() {
    let src = "a = (label=a)> {inner = $a}\n";
    let options = LoadOptions::default().with_circular_references(true);
    let value = parse(src, &options).unwrap();
    let dump_options = DumpOptions::default().with_circular_references(true);
    let out = serialize(&value, &dump_options).unwrap();
    let reloaded = parse(&out, &options).unwrap();
    assert_eq!(reloaded, value);
}

#[rstest]
fn shared_alias_round_trip() {
    let src = "base = (label=b)> {n = 1}\ncopy = $b\n";
    let value = parse(src, &LoadOptions::default()).unwrap();
    // Non-cyclic aliases resolve to plain copies, so fresh output repeats
    // the data rather than the reference.
    let out = serialize(&value, &DumpOptions::default()).unwrap();
    assert_eq!(
        reload(&out).to_json(),
        json!({"base": {"n": 1}, "copy": {"n": 1}})
    );
}

#[rstest]
fn list_rendering_styles() {
    let value = parse("items = [1, 2, 3]\n", &LoadOptions::default()).unwrap();
    let block = serialize(&value, &DumpOptions::default()).unwrap();
    assert_eq!(block, "items =\n  * 1\n  * 2\n  * 3\n");
    let custom = serialize(
        &value,
        &DumpOptions::default().with_start_list_item("    * "),
    )
    .unwrap();
    assert_eq!(custom, "items =\n    * 1\n    * 2\n    * 3\n");
}

#[rstest]
fn keys_requiring_quotes() {
    let value = parse("'spaced key' = 1\n", &LoadOptions::default()).unwrap();
    let out = serialize(&value, &DumpOptions::default()).unwrap();
    assert_eq!(out, "'spaced key' = 1\n");
    assert_eq!(reload(&out), value);
}

#[rstest]
fn strings_that_look_like_other_literals_get_quoted() {
    let mut map = bespon::Dict::new();
    map.insert(bespon::Key::from("a"), Value::from("true"));
    map.insert(bespon::Key::from("b"), Value::from("123"));
    map.insert(bespon::Key::from("c"), Value::from("none"));
    let value = Value::Dict(map);
    let out = serialize(&value, &DumpOptions::default()).unwrap();
    assert_eq!(out, "a = 'true'\nb = '123'\nc = 'none'\n");
    let reloaded = reload(&out);
    assert_eq!(reloaded, value);
}

#[rstest]
fn only_ascii_source_escapes_output() {
    let mut map = bespon::Dict::new();
    map.insert(bespon::Key::from("k"), Value::from("caf\u{e9}"));
    let value = Value::Dict(map);
    let out = serialize(
        &value,
        &DumpOptions::default().with_only_ascii_source(true),
    )
    .unwrap();
    assert!(out.is_ascii(), "output was: {out:?}");
    assert_eq!(reload(&out), value);
}
