use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use smol_str::SmolStr;

use crate::types::value::Value;

/// Conversion applied to a string-shaped value carrying an explicit type tag.
pub type ScalarParser = Arc<dyn Fn(&str) -> Result<Value, String> + Send + Sync>;

/// A registered type name usable in `(type)>` tags.
#[derive(Clone)]
pub struct TypeRecord {
    pub name: SmolStr,
    /// Implicit type names the tag may be applied to (`"str"`, `"dict"`, ...).
    pub compatible_implicit_types: Vec<SmolStr>,
    pub parser: Option<ScalarParser>,
    /// The typed string decodes to binary via the ASCII codec.
    pub ascii_bytes: bool,
    pub mutable: bool,
}

impl TypeRecord {
    pub fn new(name: &str, compatible: &[&str]) -> Self {
        Self {
            name: SmolStr::new(name),
            compatible_implicit_types: compatible.iter().map(|s| SmolStr::new(s)).collect(),
            parser: None,
            ascii_bytes: false,
            mutable: false,
        }
    }

    pub fn with_parser(mut self, parser: ScalarParser) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_ascii_bytes(mut self, ascii_bytes: bool) -> Self {
        self.ascii_bytes = ascii_bytes;
        self
    }

    pub fn with_mutable(mut self, mutable: bool) -> Self {
        self.mutable = mutable;
        self
    }

    pub fn accepts(&self, implicit_type: &str) -> bool {
        self.compatible_implicit_types
            .iter()
            .any(|t| t == implicit_type)
    }
}

impl fmt::Debug for TypeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRecord")
            .field("name", &self.name)
            .field("compatible_implicit_types", &self.compatible_implicit_types)
            .field("parser", &self.parser.as_ref().map(|_| "<fn>"))
            .field("ascii_bytes", &self.ascii_bytes)
            .field("mutable", &self.mutable)
            .finish()
    }
}

fn bytes_parser(s: &str) -> Result<Value, String> {
    if !s.is_ascii() {
        return Err("bytes strings must contain only ASCII code points".to_string());
    }
    Ok(Value::Bytes(s.as_bytes().to_vec()))
}

fn base16_parser(s: &str) -> Result<Value, String> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() % 2 != 0 {
        return Err("base16 data must contain an even number of hex digits".to_string());
    }
    let has_lower = compact.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = compact.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err("base16 data must not mix uppercase and lowercase digits".to_string());
    }
    let mut out = Vec::with_capacity(compact.len() / 2);
    let bytes = compact.as_bytes();
    for pair in bytes.chunks(2) {
        let hi = hex_digit(pair[0])?;
        let lo = hex_digit(pair[1])?;
        out.push(hi << 4 | lo);
    }
    Ok(Value::Bytes(out))
}

fn hex_digit(b: u8) -> Result<u8, String> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        other => Err(format!("invalid base16 digit {:?}", other as char)),
    }
}

fn base64_parser(s: &str) -> Result<Value, String> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map(Value::Bytes)
        .map_err(|err| format!("invalid base64 data: {err}"))
}

/// Lookup table from tag type names to their records, assembled once per
/// parse from the core set, the extended set, and any caller additions.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    records: HashMap<SmolStr, TypeRecord>,
}

impl TypeRegistry {
    pub fn core() -> Self {
        let mut registry = Self::default();
        registry.insert(TypeRecord::new("dict", &["dict"]).with_mutable(true));
        registry.insert(TypeRecord::new("list", &["list"]).with_mutable(true));
        registry.insert(TypeRecord::new("str", &["str"]));
        registry.insert(TypeRecord::new("int", &["int"]));
        registry.insert(TypeRecord::new("float", &["float", "int"]));
        registry.insert(
            TypeRecord::new("bytes", &["str"])
                .with_ascii_bytes(true)
                .with_parser(Arc::new(bytes_parser)),
        );
        registry.insert(
            TypeRecord::new("base16", &["str"])
                .with_ascii_bytes(true)
                .with_parser(Arc::new(base16_parser)),
        );
        registry.insert(
            TypeRecord::new("base64", &["str"])
                .with_ascii_bytes(true)
                .with_parser(Arc::new(base64_parser)),
        );
        registry
    }

    pub fn add_extended(&mut self) {
        self.insert(TypeRecord::new("odict", &["dict"]).with_mutable(true));
        self.insert(TypeRecord::new("set", &["list"]).with_mutable(true));
        self.insert(TypeRecord::new("complex", &["complex", "float", "int"]));
        self.insert(TypeRecord::new("rational", &["rational", "int"]));
    }

    pub fn add_python_types(&mut self) {
        self.insert(TypeRecord::new("tuple", &["list"]));
    }

    pub fn insert(&mut self, record: TypeRecord) {
        self.records.insert(record.name.clone(), record);
    }

    pub fn get(&self, name: &str) -> Option<&TypeRecord> {
        self.records.get(name)
    }

    pub fn replace_parser(&mut self, name: &str, parser: ScalarParser) -> bool {
        match self.records.get_mut(name) {
            Some(record) => {
                record.parser = Some(parser);
                true
            }
            None => false,
        }
    }
}
