use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use smol_str::SmolStr;

/// Insertion-ordered mapping used for every dict-like value.
pub type Dict = IndexMap<Key, Value>;

/// Complex number literal `a+bi`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

/// Rational number literal `p/q` with a nonzero, positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i64,
    den: i64,
}

impl Rational {
    /// The sign is carried on the numerator; a zero denominator is rejected.
    pub fn new(num: i64, den: i64) -> Option<Self> {
        if den == 0 {
            return None;
        }
        if den < 0 {
            Some(Self {
                num: num.checked_neg()?,
                den: den.checked_neg()?,
            })
        } else {
            Some(Self { num, den })
        }
    }

    pub fn num(&self) -> i64 {
        self.num
    }

    pub fn den(&self) -> i64 {
        self.den
    }
}

/// Hashable float wrapper for dict keys. NaN is rejected before construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloatKey(u64);

impl FloatKey {
    pub fn new(value: f64) -> Option<Self> {
        if value.is_nan() {
            return None;
        }
        // Normalize -0.0 so `0.0` and `-0.0` address the same entry.
        let value = if value == 0.0 { 0.0 } else { value };
        Some(Self(value.to_bits()))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// The scalar subset usable as a dict key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    None,
    Bool(bool),
    Int(i64),
    Float(FloatKey),
    Str(String),
}

impl Key {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::None => Value::None,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::Float(f) => Value::Float(f.get()),
            Key::Str(s) => Value::Str(s.clone()),
        }
    }

    /// Keys that render without quotes in error messages and key paths.
    pub fn display_text(&self) -> String {
        match self {
            Key::None => "none".to_string(),
            Key::Bool(true) => "true".to_string(),
            Key::Bool(false) => "false".to_string(),
            Key::Int(i) => i.to_string(),
            Key::Float(f) => f.get().to_string(),
            Key::Str(s) => s.clone(),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_text())
    }
}

/// A labeled node kept in the value graph because an alias refers back to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Labeled {
    pub label: SmolStr,
    pub value: Value,
}

/// Fully resolved BespON value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(Complex),
    Rational(Rational),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(Dict),
    Labeled(Box<Labeled>),
    Alias(SmolStr),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Complex(_) => "complex",
            Value::Rational(_) => "rational",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Labeled(_) => "labeled",
            Value::Alias(_) => "alias",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(map) => Some(map),
            _ => None,
        }
    }

    /// Dict member lookup by string key, looking through a label wrapper.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self.unwrap_labeled() {
            Value::Dict(map) => map.get(&Key::Str(key.to_string())),
            _ => None,
        }
    }

    /// List member lookup by index, looking through a label wrapper.
    pub fn at(&self, index: usize) -> Option<&Value> {
        match self.unwrap_labeled() {
            Value::List(items) => items.get(index),
            _ => None,
        }
    }

    pub fn unwrap_labeled(&self) -> &Value {
        match self {
            Value::Labeled(labeled) => &labeled.value,
            other => other,
        }
    }

    /// JSON projection: complex and rational render as their literal text,
    /// bytes as base64, non-string keys as their display text, and labels
    /// and aliases as `{"$label": ...}` / `"$name"`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::None => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Complex(c) => serde_json::Value::String(format!("{}+{}i", c.re, c.im)),
            Value::Rational(r) => serde_json::Value::String(format!("{}/{}", r.num(), r.den())),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(BASE64.encode(b)),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Dict(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.display_text(), v.to_json());
                }
                serde_json::Value::Object(out)
            }
            Value::Labeled(labeled) => {
                let mut out = serde_json::Map::with_capacity(1);
                out.insert(format!("${}", labeled.label), labeled.value.to_json());
                serde_json::Value::Object(out)
            }
            Value::Alias(name) => serde_json::Value::String(format!("${name}")),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::None => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Complex(c) => serializer.serialize_str(&format!("{}+{}i", c.re, c.im)),
            Value::Rational(r) => serializer.serialize_str(&format!("{}/{}", r.num(), r.den())),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_str(&BASE64.encode(b)),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dict(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(&k.display_text(), v)?;
                }
                out.end()
            }
            Value::Labeled(labeled) => {
                let mut out = serializer.serialize_map(Some(1))?;
                out.serialize_entry(&format!("${}", labeled.label), &labeled.value)?;
                out.end()
            }
            Value::Alias(name) => serializer.serialize_str(&format!("${name}")),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
