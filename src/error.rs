use std::fmt;

/// Lexical faults detected while tokenizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    InvalidEscape,
    UnterminatedString,
    MixedIndent,
    BadNumber,
    DisallowedCodePoint,
    InvalidLineBreak,
    UnknownToken,
}

/// Structural faults detected while assembling collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    Unexpected,
    Indent,
    DuplicateKey,
    BadSection,
    EmptyCollectionItem,
    TagMismatch,
    UnbalancedDelimiter,
    DepthExceeded,
}

/// Semantic faults detected while resolving tags and aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticErrorKind {
    UnknownType,
    IncompatibleType,
    UndefinedAlias,
    CircularReference,
    LabelRedefinition,
    NumericOverflow,
}

/// Faults raised by round-trip edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundtripErrorKind {
    PathNotFound,
    TypeMismatch,
    KeyCollision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex(LexErrorKind),
    Parse(ParseErrorKind),
    Semantic(SemanticErrorKind),
    Roundtrip(RoundtripErrorKind),
    Encode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<Location>,
    pub snippet: Option<String>,
}

impl Error {
    pub fn lex(kind: LexErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Lex(kind),
            message: message.into(),
            location: None,
            snippet: None,
        }
    }

    pub fn parse(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Parse(kind),
            message: message.into(),
            location: None,
            snippet: None,
        }
    }

    pub fn semantic(kind: SemanticErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Semantic(kind),
            message: message.into(),
            location: None,
            snippet: None,
        }
    }

    pub fn roundtrip(kind: RoundtripErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Roundtrip(kind),
            message: message.into(),
            location: None,
            snippet: None,
        }
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Encode,
            message: message.into(),
            location: None,
            snippet: None,
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{} (line {}, column {})",
                self.message, loc.line, loc.column
            )?,
            None => write!(f, "{}", self.message)?,
        }
        if let Some(snippet) = &self.snippet {
            write!(f, "\n  {snippet}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    fn test_display_with_location() {
        let err = Error::lex(LexErrorKind::BadNumber, "invalid digit group")
            .at(Location::new(10, 2, 5))
            .with_snippet("x = 1__2");
        let text = err.to_string();
        assert!(text.contains("invalid digit group"));
        assert!(text.contains("line 2"));
        assert!(text.contains("column 5"));
        assert!(text.contains("1__2"));
    }

    #[rstest::rstest]
    fn test_kind_grouping() {
        let err = Error::parse(ParseErrorKind::DuplicateKey, "duplicate key");
        assert_eq!(err.kind, ErrorKind::Parse(ParseErrorKind::DuplicateKey));
        assert!(err.location.is_none());
    }
}
