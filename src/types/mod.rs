pub mod registry;
pub mod value;

pub use registry::{ScalarParser, TypeRecord, TypeRegistry};
pub use value::{Complex, Dict, FloatKey, Key, Labeled, Rational, Value};
