use std::collections::HashMap;
use std::fmt;

use smol_str::SmolStr;

use crate::constants::{DEFAULT_MAX_NESTING_DEPTH, DEFAULT_NESTING_INDENT, DEFAULT_START_LIST_ITEM};
use crate::types::{ScalarParser, TypeRecord, Value};

/// Options threaded through scanning, parsing, and resolution.
#[derive(Clone)]
pub struct LoadOptions {
    pub aliases: bool,
    pub circular_references: bool,
    pub custom_parsers: HashMap<SmolStr, ScalarParser>,
    pub custom_types: Vec<TypeRecord>,
    pub extended_types: bool,
    pub float_overflow_to_inf: bool,
    pub integers: bool,
    pub max_nesting_depth: usize,
    pub only_ascii_source: bool,
    pub only_ascii_unquoted: bool,
    pub python_types: bool,
    pub empty_default: Option<Value>,
    /// Round-trip only: require replacement values to match the original type.
    pub enforce_types: bool,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aliases(mut self, aliases: bool) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_circular_references(mut self, circular_references: bool) -> Self {
        self.circular_references = circular_references;
        self
    }

    pub fn with_custom_parser(mut self, type_name: &str, parser: ScalarParser) -> Self {
        self.custom_parsers.insert(SmolStr::new(type_name), parser);
        self
    }

    pub fn with_custom_type(mut self, record: TypeRecord) -> Self {
        self.custom_types.push(record);
        self
    }

    pub fn with_extended_types(mut self, extended_types: bool) -> Self {
        self.extended_types = extended_types;
        self
    }

    pub fn with_float_overflow_to_inf(mut self, float_overflow_to_inf: bool) -> Self {
        self.float_overflow_to_inf = float_overflow_to_inf;
        self
    }

    pub fn with_integers(mut self, integers: bool) -> Self {
        self.integers = integers;
        self
    }

    pub fn with_max_nesting_depth(mut self, max_nesting_depth: usize) -> Self {
        self.max_nesting_depth = max_nesting_depth;
        self
    }

    pub fn with_only_ascii_source(mut self, only_ascii_source: bool) -> Self {
        self.only_ascii_source = only_ascii_source;
        self
    }

    pub fn with_only_ascii_unquoted(mut self, only_ascii_unquoted: bool) -> Self {
        self.only_ascii_unquoted = only_ascii_unquoted;
        self
    }

    pub fn with_python_types(mut self, python_types: bool) -> Self {
        self.python_types = python_types;
        self
    }

    pub fn with_empty_default(mut self, empty_default: Option<Value>) -> Self {
        self.empty_default = empty_default;
        self
    }

    pub fn with_enforce_types(mut self, enforce_types: bool) -> Self {
        self.enforce_types = enforce_types;
        self
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            aliases: true,
            circular_references: false,
            custom_parsers: HashMap::new(),
            custom_types: Vec::new(),
            extended_types: false,
            float_overflow_to_inf: false,
            integers: true,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            only_ascii_source: false,
            only_ascii_unquoted: true,
            python_types: false,
            empty_default: None,
            enforce_types: true,
        }
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("aliases", &self.aliases)
            .field("circular_references", &self.circular_references)
            .field("custom_parsers", &self.custom_parsers.keys())
            .field("custom_types", &self.custom_types)
            .field("extended_types", &self.extended_types)
            .field("float_overflow_to_inf", &self.float_overflow_to_inf)
            .field("integers", &self.integers)
            .field("max_nesting_depth", &self.max_nesting_depth)
            .field("only_ascii_source", &self.only_ascii_source)
            .field("only_ascii_unquoted", &self.only_ascii_unquoted)
            .field("python_types", &self.python_types)
            .field("empty_default", &self.empty_default)
            .field("enforce_types", &self.enforce_types)
            .finish()
    }
}

/// Options for fresh serialization.
#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub aliases: bool,
    pub baseclass: bool,
    pub circular_references: bool,
    pub compact_inline: bool,
    pub extended_types: bool,
    pub flush_start_list_item: bool,
    pub hex_floats: bool,
    pub inline_depth: usize,
    pub integers: bool,
    pub max_nesting_depth: usize,
    pub nesting_indent: String,
    pub only_ascii_source: bool,
    pub only_ascii_unquoted: bool,
    pub python_types: bool,
    pub trailing_commas: bool,
    pub start_list_item: String,
}

impl DumpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aliases(mut self, aliases: bool) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_baseclass(mut self, baseclass: bool) -> Self {
        self.baseclass = baseclass;
        self
    }

    pub fn with_circular_references(mut self, circular_references: bool) -> Self {
        self.circular_references = circular_references;
        self
    }

    pub fn with_compact_inline(mut self, compact_inline: bool) -> Self {
        self.compact_inline = compact_inline;
        self
    }

    pub fn with_extended_types(mut self, extended_types: bool) -> Self {
        self.extended_types = extended_types;
        self
    }

    pub fn with_flush_start_list_item(mut self, flush: bool) -> Self {
        self.flush_start_list_item = flush;
        self
    }

    pub fn with_hex_floats(mut self, hex_floats: bool) -> Self {
        self.hex_floats = hex_floats;
        self
    }

    pub fn with_inline_depth(mut self, inline_depth: usize) -> Self {
        self.inline_depth = inline_depth;
        self
    }

    pub fn with_integers(mut self, integers: bool) -> Self {
        self.integers = integers;
        self
    }

    pub fn with_max_nesting_depth(mut self, max_nesting_depth: usize) -> Self {
        self.max_nesting_depth = max_nesting_depth;
        self
    }

    pub fn with_nesting_indent(mut self, nesting_indent: impl Into<String>) -> Self {
        self.nesting_indent = nesting_indent.into();
        self
    }

    pub fn with_only_ascii_source(mut self, only_ascii_source: bool) -> Self {
        self.only_ascii_source = only_ascii_source;
        self
    }

    pub fn with_only_ascii_unquoted(mut self, only_ascii_unquoted: bool) -> Self {
        self.only_ascii_unquoted = only_ascii_unquoted;
        self
    }

    pub fn with_python_types(mut self, python_types: bool) -> Self {
        self.python_types = python_types;
        self
    }

    pub fn with_trailing_commas(mut self, trailing_commas: bool) -> Self {
        self.trailing_commas = trailing_commas;
        self
    }

    pub fn with_start_list_item(mut self, start_list_item: impl Into<String>) -> Self {
        self.start_list_item = start_list_item.into();
        self
    }
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            aliases: true,
            baseclass: false,
            circular_references: false,
            compact_inline: false,
            extended_types: false,
            flush_start_list_item: true,
            hex_floats: false,
            inline_depth: usize::MAX,
            integers: true,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            nesting_indent: DEFAULT_NESTING_INDENT.to_string(),
            only_ascii_source: false,
            only_ascii_unquoted: true,
            python_types: false,
            trailing_commas: false,
            start_list_item: DEFAULT_START_LIST_ITEM.to_string(),
        }
    }
}
