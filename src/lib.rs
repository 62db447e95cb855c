//! Loader, round-trip AST, and serializer for the BespON configuration
//! language.
//!
//! BespON documents mix three interchangeable surface syntaxes (compact
//! inline collections, indentation style with `*` item markers, and
//! section/keypath style) with explicit typing tags, labels and aliases,
//! doc and line comments, and numeric literals in four bases.
//!
//! # Loading
//!
//! ```rust
//! use bespon::{parse, LoadOptions, Value};
//!
//! let value = parse("server.host = example\nserver.port = 8080\n", &LoadOptions::default())?;
//! assert_eq!(value.get("server").and_then(|s| s.get("port")), Some(&Value::Int(8080)));
//! # Ok::<(), bespon::Error>(())
//! ```
//!
//! # Round-trip editing
//!
//! ```rust
//! use bespon::{parse_roundtrip, roundtrip::path, LoadOptions, Value};
//!
//! let src = "retries = 0b11   # binary on purpose\n";
//! let mut ast = parse_roundtrip(src, &LoadOptions::default())?;
//! ast.replace_val(&path(["retries"]), Value::Int(5))?;
//! assert_eq!(ast.dumps(), "retries = 0b101   # binary on purpose\n");
//! # Ok::<(), bespon::Error>(())
//! ```
//!
//! # Serializing
//!
//! ```rust
//! use bespon::{parse, serialize, DumpOptions, LoadOptions};
//!
//! let value = parse("a = {b = 1}\n", &LoadOptions::default())?;
//! assert_eq!(serialize(&value, &DumpOptions::default())?, "a =\n    b = 1\n");
//! # Ok::<(), bespon::Error>(())
//! ```

pub mod ast;
pub mod constants;
pub mod decode;
pub mod encode;
pub mod error;
pub mod num;
pub mod options;
pub mod roundtrip;
pub mod text;
pub mod types;

pub use error::{
    Error, ErrorKind, LexErrorKind, Location, ParseErrorKind, RoundtripErrorKind,
    SemanticErrorKind,
};
pub use options::{DumpOptions, LoadOptions};
pub use roundtrip::{Cursor, PathSeg, RoundtripAst};
pub use types::{Complex, Dict, Key, Labeled, Rational, TypeRecord, Value};

pub type Result<T> = std::result::Result<T, Error>;

/// Parse a document into a resolved value graph.
pub fn parse(source: &str, options: &LoadOptions) -> Result<Value> {
    decode::parse_str(source, options)
}

/// Parse raw bytes, auto-detecting a UTF-8/16/32 byte order mark.
pub fn parse_bytes(source: &[u8], options: &LoadOptions) -> Result<Value> {
    decode::parse_bytes(source, options)
}

/// Parse a document into a round-trip AST that preserves its exact layout.
pub fn parse_roundtrip(source: &str, options: &LoadOptions) -> Result<RoundtripAst> {
    let doc = decode::parse_raw(source, options)?.ok_or_else(|| {
        Error::parse(
            error::ParseErrorKind::Unexpected,
            "document contains no data",
        )
    })?;
    // Surface semantic faults (unknown types, bad aliases) at load time.
    decode::resolver::resolve(&doc.tree, options)
        .map_err(|e| decode::enrich(e, &doc.source))?;
    Ok(RoundtripAst::new(doc, options.clone()))
}

/// Check a document for errors without keeping the result.
pub fn validate(source: &str, options: &LoadOptions) -> Result<()> {
    decode::validate(source, options)
}

/// Serialize a value graph as a fresh document.
pub fn serialize(value: &Value, options: &DumpOptions) -> Result<String> {
    encode::encode(value, options)
}
