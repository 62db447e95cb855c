//! Position-tracking tokenizer.
//!
//! The scanner is context-free at the character level but context-sensitive
//! at the token level: a multiline string delimiter suspends the usual
//! newline and indentation rules until its matching closer. Tokens carry
//! byte spans into the source plus decoded text for strings, so later stages
//! never re-lex.

use smol_str::SmolStr;

use crate::error::{Error, LexErrorKind, Location};
use crate::num::{Base, FloatForm, NumberClass};
use crate::options::LoadOptions;
use crate::text::chars::{
    is_allowed_ascii_literal, is_disallowed_literal, is_ident_continue, is_ident_start,
    is_indent_char, is_newline_char,
};
use crate::text::escape;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteChar {
    Single,
    Double,
    Backtick,
}

impl QuoteChar {
    pub fn as_char(self) -> char {
        match self {
            QuoteChar::Single => '\'',
            QuoteChar::Double => '"',
            QuoteChar::Backtick => '`',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '\'' => Some(QuoteChar::Single),
            '"' => Some(QuoteChar::Double),
            '`' => Some(QuoteChar::Backtick),
            _ => None,
        }
    }

    /// Literal styles take their content verbatim; escaped styles decode
    /// backslash sequences.
    pub fn is_literal(self) -> bool {
        matches!(self, QuoteChar::Backtick)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinalNewline {
    #[default]
    Keep,
    Strip,
}

/// Surface profile of a string literal, kept for round-trip re-rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringStyle {
    Unquoted,
    Quoted {
        quote: QuoteChar,
        delim_len: usize,
    },
    Block {
        quote: QuoteChar,
        delim_len: usize,
        final_newline: FinalNewline,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LineComment,
    DocComment,
    Assign,
    OpenDict,
    CloseDict,
    OpenList,
    CloseList,
    ListItem,
    SectionOpen,
    SectionClose,
    Dot,
    TagOpen,
    TagClose,
    Comma,
    Newline,
    Alias(SmolStr),
    BoolLit(bool),
    NoneLit,
    Str { decoded: String, style: StringStyle },
    Number { class: NumberClass },
    Unquoted(String),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub line: usize,
    pub column: usize,
    /// Width in characters of the leading whitespace on this token's line.
    pub line_indent: usize,
    /// First token following the indentation on its line.
    pub at_line_start: bool,
}

pub fn tokenize(src: &str, options: &LoadOptions) -> Result<Vec<Token>, Error> {
    validate_literals(src, options)?;
    let mut scanner = Scanner::new(src, options);
    scanner.run()?;
    Ok(scanner.tokens)
}

fn validate_literals(src: &str, options: &LoadOptions) -> Result<(), Error> {
    let mut line = 1usize;
    let mut column = 1usize;
    let mut prev_cr = false;
    for (offset, c) in src.char_indices() {
        if is_disallowed_literal(c) {
            return Err(Error::lex(
                LexErrorKind::DisallowedCodePoint,
                format!("code point U+{:04X} may not appear literally", c as u32),
            )
            .at(Location::new(offset, line, column)));
        }
        if options.only_ascii_source && !is_allowed_ascii_literal(c) {
            return Err(Error::lex(
                LexErrorKind::DisallowedCodePoint,
                format!(
                    "code point U+{:04X} is not allowed with only_ascii_source",
                    c as u32
                ),
            )
            .at(Location::new(offset, line, column)));
        }
        if is_newline_char(c) {
            if c == '\n' && prev_cr {
                // The CR already advanced the line counter.
            } else {
                line += 1;
            }
            column = 1;
            prev_cr = c == '\r';
        } else {
            column += 1;
            prev_cr = false;
        }
    }
    Ok(())
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    line_indent: usize,
    at_bol: bool,
    pending_line_start: bool,
    indent_char: Option<char>,
    only_ascii_unquoted: bool,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str, options: &LoadOptions) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
            line_indent: 0,
            at_bol: true,
            pending_line_start: false,
            indent_char: None,
            only_ascii_unquoted: options.only_ascii_unquoted,
            tokens: Vec::new(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.rest().chars();
        chars.next();
        chars.next()
    }

    fn location(&self) -> Location {
        Location::new(self.pos, self.line, self.column)
    }

    fn err(&self, kind: LexErrorKind, message: impl Into<String>) -> Error {
        Error::lex(kind, message).at(self.location())
    }

    /// Advance over a non-newline character.
    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        self.column += 1;
        Some(c)
    }

    /// Advance over a newline (handling CRLF as one break).
    fn bump_newline(&mut self) {
        match self.peek() {
            Some('\r') => {
                self.pos += 1;
                if self.peek() == Some('\n') {
                    self.pos += 1;
                }
            }
            Some(c) if is_newline_char(c) => {
                self.pos += c.len_utf8();
            }
            _ => return,
        }
        self.line += 1;
        self.column = 1;
    }

    /// Consume the indentation of the current line and record its width.
    fn read_indent(&mut self) -> Result<(), Error> {
        let mut width = 0usize;
        while let Some(c) = self.peek() {
            if !is_indent_char(c) {
                break;
            }
            match self.indent_char {
                Some(locked) if locked != c => {
                    return Err(self.err(
                        LexErrorKind::MixedIndent,
                        "indentation mixes tabs and spaces",
                    ));
                }
                Some(_) => {}
                None => self.indent_char = Some(c),
            }
            self.bump();
            width += 1;
        }
        self.line_indent = width;
        self.pending_line_start = true;
        Ok(())
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: usize, column: usize) {
        let at_line_start = self.pending_line_start;
        self.pending_line_start = false;
        self.tokens.push(Token {
            kind,
            span: Span::new(start, self.pos),
            line,
            column,
            line_indent: self.line_indent,
            at_line_start,
        });
    }

    fn run(&mut self) -> Result<(), Error> {
        loop {
            if self.at_bol {
                self.read_indent()?;
                self.at_bol = false;
            }
            let start = self.pos;
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                self.push(TokenKind::Eof, start, line, column);
                return Ok(());
            };
            match c {
                c if is_newline_char(c) => {
                    self.bump_newline();
                    self.push(TokenKind::Newline, start, line, column);
                    self.at_bol = true;
                }
                ' ' | '\t' => {
                    self.bump();
                }
                '#' => self.scan_comment(start, line, column)?,
                '=' => self.scan_equals(start, line, column)?,
                '|' => self.scan_piped_section(start, line, column)?,
                '{' => {
                    self.bump();
                    self.push(TokenKind::OpenDict, start, line, column);
                }
                '}' => {
                    self.bump();
                    self.push(TokenKind::CloseDict, start, line, column);
                }
                '[' => {
                    self.bump();
                    self.push(TokenKind::OpenList, start, line, column);
                }
                ']' => {
                    self.bump();
                    self.push(TokenKind::CloseList, start, line, column);
                }
                ',' => {
                    self.bump();
                    self.push(TokenKind::Comma, start, line, column);
                }
                '(' => {
                    self.bump();
                    self.push(TokenKind::TagOpen, start, line, column);
                }
                ')' => {
                    self.bump();
                    if self.peek() == Some('>') {
                        self.bump();
                        self.push(TokenKind::TagClose, start, line, column);
                    } else {
                        return Err(self.err(
                            LexErrorKind::UnknownToken,
                            "')' must be followed by '>' to close a tag",
                        ));
                    }
                }
                '*' => {
                    self.bump();
                    self.push(TokenKind::ListItem, start, line, column);
                }
                '.' => {
                    self.bump();
                    self.push(TokenKind::Dot, start, line, column);
                }
                '$' => self.scan_alias(start, line, column)?,
                '\'' | '"' | '`' => self.scan_string(start, line, column)?,
                '+' | '-' => self.scan_signed(start, line, column)?,
                c if c.is_ascii_digit() => self.scan_number(start, line, column)?,
                c if is_ident_start(c, self.only_ascii_unquoted) => {
                    self.scan_unquoted(start, line, column)?
                }
                other => {
                    return Err(self.err(
                        LexErrorKind::UnknownToken,
                        format!("unexpected character {other:?}"),
                    ));
                }
            }
        }
    }

    fn scan_comment(&mut self, start: usize, line: usize, column: usize) -> Result<(), Error> {
        let mut run = 0usize;
        while self.peek() == Some('#') {
            self.bump();
            run += 1;
        }
        let kind = match run {
            1 => TokenKind::LineComment,
            3 => TokenKind::DocComment,
            _ => {
                return Err(self.err(
                    LexErrorKind::UnknownToken,
                    format!("a run of {run} '#' characters is reserved"),
                ));
            }
        };
        while let Some(c) = self.peek() {
            if is_newline_char(c) {
                break;
            }
            self.bump();
        }
        self.push(kind, start, line, column);
        Ok(())
    }

    fn scan_equals(&mut self, start: usize, line: usize, column: usize) -> Result<(), Error> {
        let mut run = 0usize;
        while self.peek() == Some('=') {
            self.bump();
            run += 1;
        }
        if run == 1 {
            self.push(TokenKind::Assign, start, line, column);
            return Ok(());
        }
        if run < 3 {
            return Err(self.err(LexErrorKind::UnknownToken, "'==' is not a valid token"));
        }
        if !self.pending_line_start {
            return Err(self.err(
                LexErrorKind::UnknownToken,
                "section markers must start a line",
            ));
        }
        if self.peek() == Some('/') {
            self.bump();
            self.push(TokenKind::SectionClose, start, line, column);
        } else {
            self.push(TokenKind::SectionOpen, start, line, column);
        }
        Ok(())
    }

    fn scan_piped_section(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
    ) -> Result<(), Error> {
        self.bump();
        let mut run = 0usize;
        while self.peek() == Some('=') {
            self.bump();
            run += 1;
        }
        if run < 3 {
            return Err(self.err(
                LexErrorKind::UnknownToken,
                "'|' must begin a '|===' section marker",
            ));
        }
        if !self.pending_line_start {
            return Err(self.err(
                LexErrorKind::UnknownToken,
                "section markers must start a line",
            ));
        }
        if self.peek() == Some('/') {
            self.bump();
            self.push(TokenKind::SectionClose, start, line, column);
        } else {
            self.push(TokenKind::SectionOpen, start, line, column);
        }
        Ok(())
    }

    fn scan_alias(&mut self, start: usize, line: usize, column: usize) -> Result<(), Error> {
        self.bump();
        let name_start = self.pos;
        match self.peek() {
            Some(c) if is_ident_start(c, self.only_ascii_unquoted) => {
                self.bump();
            }
            _ => {
                return Err(self.err(
                    LexErrorKind::UnknownToken,
                    "'$' must be followed by a label name",
                ));
            }
        }
        while let Some(c) = self.peek() {
            if is_ident_continue(c, self.only_ascii_unquoted) {
                self.bump();
            } else {
                break;
            }
        }
        let name = SmolStr::new(&self.src[name_start..self.pos]);
        self.push(TokenKind::Alias(name), start, line, column);
        Ok(())
    }

    fn scan_unquoted(&mut self, start: usize, line: usize, column: usize) -> Result<(), Error> {
        self.consume_unquoted_words();
        let text = &self.src[start..self.pos];
        let kind = match text {
            "true" => TokenKind::BoolLit(true),
            "false" => TokenKind::BoolLit(false),
            "none" => TokenKind::NoneLit,
            "inf" => TokenKind::Number {
                class: NumberClass::Float {
                    form: FloatForm::Inf,
                },
            },
            "nan" => TokenKind::Number {
                class: NumberClass::Float {
                    form: FloatForm::Nan,
                },
            },
            _ => TokenKind::Unquoted(text.to_string()),
        };
        self.push(kind, start, line, column);
        Ok(())
    }

    /// Consume identifier words joined by single spaces, leaving the cursor
    /// after the last word.
    fn consume_unquoted_words(&mut self) {
        loop {
            while let Some(c) = self.peek() {
                if is_ident_continue(c, self.only_ascii_unquoted) {
                    self.bump();
                } else {
                    break;
                }
            }
            if self.peek() == Some(' ') {
                if let Some(next) = self.peek_second() {
                    if is_ident_continue(next, self.only_ascii_unquoted) {
                        self.bump();
                        continue;
                    }
                }
            }
            break;
        }
    }

    fn scan_signed(&mut self, start: usize, line: usize, column: usize) -> Result<(), Error> {
        let after_sign = &self.rest()[1..];
        if after_sign.starts_with(|c: char| c.is_ascii_digit()) {
            self.bump();
            return self.scan_number(start, line, column);
        }
        for word in ["inf", "nan"] {
            if let Some(rest) = after_sign.strip_prefix(word) {
                let boundary = rest
                    .chars()
                    .next()
                    .map(|c| !is_ident_continue(c, self.only_ascii_unquoted))
                    .unwrap_or(true);
                if boundary {
                    self.bump();
                    for _ in 0..word.len() {
                        self.bump();
                    }
                    let form = if word == "inf" {
                        FloatForm::Inf
                    } else {
                        FloatForm::Nan
                    };
                    self.push(
                        TokenKind::Number {
                            class: NumberClass::Float { form },
                        },
                        start,
                        line,
                        column,
                    );
                    return Ok(());
                }
            }
        }
        Err(self.err(
            LexErrorKind::UnknownToken,
            "a sign must be followed by a numeric literal",
        ))
    }

    /// Consume `digit ( _? digit )*` in the given base. Returns how many
    /// digits were read.
    fn consume_digits(&mut self, radix: u32) -> Result<usize, Error> {
        let mut count = 0usize;
        let mut prev_underscore = false;
        loop {
            match self.peek() {
                Some('_') => {
                    if count == 0 || prev_underscore {
                        return Err(self.err(
                            LexErrorKind::BadNumber,
                            "'_' must separate digits in a numeric literal",
                        ));
                    }
                    prev_underscore = true;
                    self.bump();
                }
                Some(c) if c.to_digit(radix).is_some() => {
                    prev_underscore = false;
                    count += 1;
                    self.bump();
                }
                _ => break,
            }
        }
        if prev_underscore {
            return Err(self.err(
                LexErrorKind::BadNumber,
                "a numeric literal may not end with '_'",
            ));
        }
        Ok(count)
    }

    fn scan_number(&mut self, start: usize, line: usize, column: usize) -> Result<(), Error> {
        // The sign, if any, is already consumed.
        let body_start = self.pos;
        let class = if self.rest().starts_with("0x") || self.rest().starts_with("0X") {
            self.bump();
            self.bump();
            if self.peek() == Some('_') {
                self.bump();
            }
            self.scan_based_tail(16)?
        } else if self.rest().starts_with("0o") || self.rest().starts_with("0O") {
            self.bump();
            self.bump();
            if self.peek() == Some('_') {
                self.bump();
            }
            if self.consume_digits(8)? == 0 {
                return Err(self.err(LexErrorKind::BadNumber, "octal literal has no digits"));
            }
            self.reject_number_suffix()?;
            NumberClass::Int { base: Base::Oct }
        } else if self.rest().starts_with("0b") || self.rest().starts_with("0B") {
            self.bump();
            self.bump();
            if self.peek() == Some('_') {
                self.bump();
            }
            if self.consume_digits(2)? == 0 {
                return Err(self.err(LexErrorKind::BadNumber, "binary literal has no digits"));
            }
            self.reject_number_suffix()?;
            NumberClass::Int { base: Base::Bin }
        } else {
            let leading_zero = self.rest().starts_with('0');
            if self.consume_digits(10)? == 0 {
                return Err(self.err(LexErrorKind::BadNumber, "decimal literal has no digits"));
            }
            if leading_zero && self.pos > body_start + 1 {
                let second = self.src[body_start + 1..].chars().next();
                if matches!(second, Some(c) if c.is_ascii_digit() || c == '_') {
                    return Err(self.err(
                        LexErrorKind::BadNumber,
                        "decimal integers may not have leading zeros",
                    ));
                }
            }
            self.scan_dec_tail()?
        };
        let kind = self.finish_number(start, class)?;
        self.push(kind, start, line, column);
        Ok(())
    }

    /// Fraction, exponent, complex, and rational continuations of a decimal
    /// digit run.
    fn scan_dec_tail(&mut self) -> Result<NumberClass, Error> {
        let mut is_float = false;
        if self.peek() == Some('.') && matches!(self.peek_second(), Some(c) if c.is_ascii_digit()) {
            self.bump();
            self.consume_digits(10)?;
            is_float = true;
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut probe = self.rest().chars();
            probe.next();
            let mut next = probe.next();
            if matches!(next, Some('+') | Some('-')) {
                next = probe.next();
            }
            if matches!(next, Some(c) if c.is_ascii_digit()) {
                self.bump();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.bump();
                }
                self.consume_digits(10)?;
                is_float = true;
            }
        }
        if self.peek() == Some('i') {
            let after = self.peek_second();
            if !matches!(after, Some(c) if is_ident_continue(c, self.only_ascii_unquoted)) {
                self.bump();
                return Ok(NumberClass::Complex);
            }
        }
        if matches!(self.peek(), Some('+') | Some('-')) && self.complex_second_component()? {
            return Ok(NumberClass::Complex);
        }
        if !is_float && self.peek() == Some('/') {
            if matches!(self.peek_second(), Some(c) if c.is_ascii_digit() || c == '+' || c == '-') {
                self.bump();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.bump();
                }
                if self.consume_digits(10)? == 0 {
                    return Err(
                        self.err(LexErrorKind::BadNumber, "rational literal has no denominator")
                    );
                }
                self.reject_number_suffix()?;
                return Ok(NumberClass::Rational);
            }
        }
        if is_float {
            Ok(NumberClass::Float {
                form: FloatForm::Dec,
            })
        } else {
            Ok(NumberClass::Int { base: Base::Dec })
        }
    }

    /// Attempt `[+|-]imag i` following a leading component. Consumes it and
    /// returns true only when the full shape is present.
    fn complex_second_component(&mut self) -> Result<bool, Error> {
        let rest = self.rest();
        if !rest.starts_with('+') && !rest.starts_with('-') {
            return Ok(false);
        }
        // Probe without consuming: sign digits [.digits] [exp] 'i'.
        let probe = &rest[1..];
        let bytes = probe.as_bytes();
        let take_digits = |bytes: &[u8], mut idx: usize| -> usize {
            while idx < bytes.len()
                && (bytes[idx].is_ascii_digit() || bytes[idx] == b'_')
            {
                idx += 1;
            }
            idx
        };
        let after_int = take_digits(bytes, 0);
        if after_int == 0 {
            return Ok(false);
        }
        let mut len = after_int;
        if len < bytes.len() && bytes[len] == b'.' {
            let after_frac = take_digits(bytes, len + 1);
            if after_frac > len + 1 {
                len = after_frac;
            }
        }
        if len < bytes.len() && (bytes[len] == b'e' || bytes[len] == b'E') {
            let mut idx = len + 1;
            if idx < bytes.len() && (bytes[idx] == b'+' || bytes[idx] == b'-') {
                idx += 1;
            }
            let after_exp = take_digits(bytes, idx);
            if after_exp > idx {
                len = after_exp;
            }
        }
        if len < bytes.len() && bytes[len] == b'i' {
            let following = probe[len + 1..].chars().next();
            if !matches!(following, Some(c) if is_ident_continue(c, self.only_ascii_unquoted)) {
                // Shape confirmed; consume sign + component + 'i'.
                for _ in 0..len + 2 {
                    self.bump();
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Hex literal continuation: digits, optional fraction, optional
    /// p-exponent.
    fn scan_based_tail(&mut self, radix: u32) -> Result<NumberClass, Error> {
        if self.consume_digits(radix)? == 0 {
            return Err(self.err(LexErrorKind::BadNumber, "hex literal has no digits"));
        }
        let mut is_float = false;
        if self.peek() == Some('.')
            && matches!(self.peek_second(), Some(c) if c.to_digit(radix).is_some())
        {
            self.bump();
            self.consume_digits(radix)?;
            is_float = true;
        }
        if matches!(self.peek(), Some('p') | Some('P')) {
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.bump();
            }
            if self.consume_digits(10)? == 0 {
                return Err(self.err(
                    LexErrorKind::BadNumber,
                    "hex float exponent has no digits",
                ));
            }
            is_float = true;
        }
        self.reject_number_suffix()?;
        if is_float {
            Ok(NumberClass::Float {
                form: FloatForm::Hex,
            })
        } else {
            Ok(NumberClass::Int { base: Base::Hex })
        }
    }

    /// Based literals and rational/complex forms may not run into identifier
    /// characters.
    fn reject_number_suffix(&mut self) -> Result<(), Error> {
        if let Some(c) = self.peek() {
            if is_ident_continue(c, self.only_ascii_unquoted) {
                return Err(self.err(
                    LexErrorKind::BadNumber,
                    format!("unexpected character {c:?} after numeric literal"),
                ));
            }
        }
        Ok(())
    }

    /// Decimal literals followed by identifier characters become unquoted
    /// number-unit strings (`5px`, `1e`).
    fn finish_number(&mut self, start: usize, class: NumberClass) -> Result<TokenKind, Error> {
        let dec_shaped = matches!(
            class,
            NumberClass::Int { base: Base::Dec }
                | NumberClass::Float {
                    form: FloatForm::Dec
                }
        );
        if dec_shaped {
            if let Some(c) = self.peek() {
                if is_ident_continue(c, self.only_ascii_unquoted) {
                    self.consume_unquoted_words();
                    let text = self.src[start..self.pos].to_string();
                    return Ok(TokenKind::Unquoted(text));
                }
            }
        } else {
            self.reject_number_suffix()?;
        }
        Ok(TokenKind::Number { class })
    }

    fn scan_string(&mut self, start: usize, line: usize, column: usize) -> Result<(), Error> {
        let quote_char = self.peek().expect("string scan begins at a quote");
        let quote = QuoteChar::from_char(quote_char).expect("quote character");
        let mut delim_len = 0usize;
        while self.peek() == Some(quote_char) {
            self.bump();
            delim_len += 1;
        }
        if delim_len == 2 {
            self.push(
                TokenKind::Str {
                    decoded: String::new(),
                    style: StringStyle::Quoted {
                        quote,
                        delim_len: 1,
                    },
                },
                start,
                line,
                column,
            );
            return Ok(());
        }
        let block = delim_len >= 3 && self.line_is_blank_from_here();
        if block {
            self.scan_block_string(start, line, column, quote, delim_len)
        } else {
            self.scan_inline_string(start, line, column, quote, delim_len)
        }
    }

    fn line_is_blank_from_here(&self) -> bool {
        for c in self.rest().chars() {
            if is_newline_char(c) {
                return true;
            }
            if !is_indent_char(c) {
                return false;
            }
        }
        true
    }

    fn count_quote_run(&self, quote_char: char) -> usize {
        self.rest().chars().take_while(|c| *c == quote_char).count()
    }

    fn scan_inline_string(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
        quote: QuoteChar,
        delim_len: usize,
    ) -> Result<(), Error> {
        let quote_char = quote.as_char();
        let opening_indent = self.line_indent;
        let mut segments: Vec<String> = Vec::new();
        let mut current = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(Error::lex(
                    LexErrorKind::UnterminatedString,
                    "string is not closed before end of input",
                )
                .at(Location::new(start, line, column)));
            };
            if c == quote_char {
                let run = self.count_quote_run(quote_char);
                if run == delim_len {
                    for _ in 0..run {
                        self.bump();
                    }
                    break;
                }
                if run > delim_len {
                    return Err(self.err(
                        LexErrorKind::UnterminatedString,
                        "string delimiter run is longer than the opening delimiter",
                    ));
                }
                for _ in 0..run {
                    current.push(quote_char);
                    self.bump();
                }
                continue;
            }
            if c == '\\' && !quote.is_literal() {
                current.push('\\');
                self.bump();
                if let Some(next) = self.peek() {
                    if !is_newline_char(next) {
                        current.push(next);
                        self.bump();
                    }
                }
                continue;
            }
            if is_newline_char(c) {
                self.bump_newline();
                let mut indent = 0usize;
                while let Some(ic) = self.peek() {
                    if is_indent_char(ic) {
                        self.bump();
                        indent += 1;
                    } else {
                        break;
                    }
                }
                match self.peek() {
                    None => {
                        return Err(Error::lex(
                            LexErrorKind::UnterminatedString,
                            "string is not closed before end of input",
                        )
                        .at(Location::new(start, line, column)));
                    }
                    Some(nc) if is_newline_char(nc) => {
                        return Err(self.err(
                            LexErrorKind::InvalidLineBreak,
                            "a wrapped string may not contain an all-whitespace line",
                        ));
                    }
                    _ => {}
                }
                if indent <= opening_indent {
                    return Err(self.err(
                        LexErrorKind::InvalidLineBreak,
                        "a wrapped string continuation must be indented past its opening line",
                    ));
                }
                self.line_indent = indent;
                segments.push(std::mem::take(&mut current));
                continue;
            }
            current.push(c);
            self.bump();
        }
        segments.push(current);
        let joined = join_wrapped_segments(&segments, quote.is_literal());
        let decoded = if quote.is_literal() {
            joined
        } else {
            escape::unescape(&joined).map_err(|e| {
                Error::lex(LexErrorKind::InvalidEscape, e.message).at(Location::new(
                    start,
                    line,
                    column,
                ))
            })?
        };
        self.push(
            TokenKind::Str {
                decoded,
                style: StringStyle::Quoted { quote, delim_len },
            },
            start,
            line,
            column,
        );
        Ok(())
    }

    fn scan_block_string(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
        quote: QuoteChar,
        delim_len: usize,
    ) -> Result<(), Error> {
        let quote_char = quote.as_char();
        // Skip trailing whitespace on the opening line, then the newline.
        while matches!(self.peek(), Some(c) if is_indent_char(c)) {
            self.bump();
        }
        if !matches!(self.peek(), Some(c) if is_newline_char(c)) {
            return Err(self.err(
                LexErrorKind::UnterminatedString,
                "block string content must begin on a new line",
            ));
        }
        self.bump_newline();

        // Collect raw lines (without their indentation decided yet) until the
        // closing delimiter line.
        let mut raw_lines: Vec<(Span, usize)> = Vec::new();
        let (closing_indent, final_newline);
        loop {
            let line_start = self.pos;
            let mut indent = 0usize;
            while matches!(self.peek(), Some(c) if is_indent_char(c)) {
                self.bump();
                indent += 1;
            }
            if self.peek() == Some(quote_char) && self.count_quote_run(quote_char) == delim_len {
                let content_after = {
                    let after = &self.rest()[delim_len * quote_char.len_utf8()..];
                    after.chars().next()
                };
                let closes = match content_after {
                    None => true,
                    Some('/') => true,
                    Some(c) if is_newline_char(c) => true,
                    _ => false,
                };
                if closes {
                    for _ in 0..delim_len {
                        self.bump();
                    }
                    let mut mode = FinalNewline::Keep;
                    if self.peek() == Some('/') {
                        self.bump();
                        if self.peek() == Some('/') {
                            self.bump();
                            mode = FinalNewline::Strip;
                        }
                    }
                    closing_indent = indent;
                    final_newline = mode;
                    self.line_indent = indent;
                    break;
                }
            }
            // An ordinary content line: consume to the line break.
            loop {
                match self.peek() {
                    None => {
                        return Err(Error::lex(
                            LexErrorKind::UnterminatedString,
                            "block string is not closed before end of input",
                        )
                        .at(Location::new(start, line, column)));
                    }
                    Some(c) if is_newline_char(c) => {
                        raw_lines.push((Span::new(line_start, self.pos), indent));
                        self.bump_newline();
                        break;
                    }
                    _ => {
                        self.bump();
                    }
                }
            }
        }

        let mut decoded = String::new();
        for (span, indent) in &raw_lines {
            let text = &self.src[span.start..span.end];
            let stripped: &str = if *indent >= closing_indent {
                strip_indent_chars(text, closing_indent)
            } else if text.chars().all(is_indent_char) {
                ""
            } else {
                return Err(Error::lex(
                    LexErrorKind::MixedIndent,
                    "block string line is less indented than its closing delimiter",
                )
                .at(Location::new(span.start, line, column)));
            };
            decoded.push_str(stripped);
            decoded.push('\n');
        }
        if final_newline == FinalNewline::Strip && decoded.ends_with('\n') {
            decoded.pop();
        }
        let decoded = if quote.is_literal() {
            decoded
        } else {
            escape::unescape(&decoded).map_err(|e| {
                Error::lex(LexErrorKind::InvalidEscape, e.message).at(Location::new(
                    start,
                    line,
                    column,
                ))
            })?
        };
        self.push(
            TokenKind::Str {
                decoded,
                style: StringStyle::Block {
                    quote,
                    delim_len,
                    final_newline,
                },
            },
            start,
            line,
            column,
        );
        Ok(())
    }
}

fn strip_indent_chars(text: &str, count: usize) -> &str {
    let mut seen = 0usize;
    for (idx, c) in text.char_indices() {
        if seen == count {
            return &text[idx..];
        }
        if is_indent_char(c) {
            seen += 1;
        } else {
            return &text[idx..];
        }
    }
    ""
}

fn trailing_backslashes(s: &str) -> usize {
    s.chars().rev().take_while(|c| *c == '\\').count()
}

/// Join the physical lines of a wrapped single-line string: an escaped
/// trailing backslash joins without a space, otherwise the break becomes a
/// single space unless one is already present.
fn join_wrapped_segments(segments: &[String], literal: bool) -> String {
    let mut out = String::new();
    for (idx, segment) in segments.iter().enumerate() {
        if idx + 1 < segments.len() && !literal && trailing_backslashes(segment) % 2 == 1 {
            out.push_str(&segment[..segment.len() - 1]);
            continue;
        }
        out.push_str(segment);
        if idx + 1 < segments.len() && !out.ends_with(' ') {
            out.push(' ');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(src: &str) -> Vec<Token> {
        tokenize(src, &LoadOptions::default()).unwrap()
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        scan(src).into_iter().map(|t| t.kind).collect()
    }

    fn scan_err(src: &str) -> Error {
        tokenize(src, &LoadOptions::default()).unwrap_err()
    }

    #[rstest::rstest]
    fn test_structural_tokens() {
        let kinds = kinds("{}[],()>*.=");
        assert_eq!(
            kinds,
            vec![
                TokenKind::OpenDict,
                TokenKind::CloseDict,
                TokenKind::OpenList,
                TokenKind::CloseList,
                TokenKind::Comma,
                TokenKind::TagOpen,
                TokenKind::TagClose,
                TokenKind::ListItem,
                TokenKind::Dot,
                TokenKind::Assign,
                TokenKind::Eof,
            ]
        );
    }

    #[rstest::rstest]
    fn test_keywords_and_unquoted() {
        assert_eq!(
            kinds("true false none key"),
            vec![
                TokenKind::BoolLit(true),
                TokenKind::BoolLit(false),
                TokenKind::NoneLit,
                TokenKind::Unquoted("key".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[rstest::rstest]
    fn test_unquoted_value_with_spaces() {
        assert_eq!(
            kinds("hello brave world\n"),
            vec![
                TokenKind::Unquoted("hello brave world".to_string()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[rstest::rstest]
    fn test_number_classes() {
        let expect = |src: &str, class: NumberClass| {
            let tokens = scan(src);
            assert_eq!(
                tokens[0].kind,
                TokenKind::Number { class },
                "scanning {src:?}"
            );
        };
        expect("42", NumberClass::Int { base: Base::Dec });
        expect("-17", NumberClass::Int { base: Base::Dec });
        expect("0xff", NumberClass::Int { base: Base::Hex });
        expect("0o755", NumberClass::Int { base: Base::Oct });
        expect("0b1101", NumberClass::Int { base: Base::Bin });
        expect("1_000_000", NumberClass::Int { base: Base::Dec });
        expect(
            "1.5",
            NumberClass::Float {
                form: FloatForm::Dec,
            },
        );
        expect(
            "1e10",
            NumberClass::Float {
                form: FloatForm::Dec,
            },
        );
        expect(
            "0x4.3p2",
            NumberClass::Float {
                form: FloatForm::Hex,
            },
        );
        expect(
            "inf",
            NumberClass::Float {
                form: FloatForm::Inf,
            },
        );
        expect(
            "-inf",
            NumberClass::Float {
                form: FloatForm::Inf,
            },
        );
        expect(
            "nan",
            NumberClass::Float {
                form: FloatForm::Nan,
            },
        );
        expect("1+2i", NumberClass::Complex);
        expect("2i", NumberClass::Complex);
        expect("-1.5-2.5i", NumberClass::Complex);
        expect("3/4", NumberClass::Rational);
        expect("-3/4", NumberClass::Rational);
    }

    #[rstest::rstest]
    fn test_number_unit_strings() {
        assert_eq!(
            kinds("5px")[0],
            TokenKind::Unquoted("5px".to_string())
        );
        assert_eq!(kinds("1e")[0], TokenKind::Unquoted("1e".to_string()));
    }

    #[rstest::rstest]
    #[case("1__2")]
    #[case("1_")]
    #[case("0xg1")]
    #[case("05")]
    #[case("1/0x2")]
    #[case("0b12")]
    fn test_bad_numbers(#[case] src: &str) {
        let err = scan_err(src);
        match err.kind {
            crate::error::ErrorKind::Lex(kind) => {
                assert!(
                    matches!(
                        kind,
                        LexErrorKind::BadNumber | LexErrorKind::UnknownToken
                    ),
                    "got {kind:?} for {src:?}"
                );
            }
            other => panic!("expected lex error, got {other:?}"),
        }
    }

    #[rstest::rstest]
    fn test_quoted_strings() {
        let tokens = scan(r#"'one' "two\n" `back\slash`"#);
        assert_eq!(
            tokens[0].kind,
            TokenKind::Str {
                decoded: "one".to_string(),
                style: StringStyle::Quoted {
                    quote: QuoteChar::Single,
                    delim_len: 1
                },
            }
        );
        assert_eq!(
            tokens[1].kind,
            TokenKind::Str {
                decoded: "two\n".to_string(),
                style: StringStyle::Quoted {
                    quote: QuoteChar::Double,
                    delim_len: 1
                },
            }
        );
        assert_eq!(
            tokens[2].kind,
            TokenKind::Str {
                decoded: "back\\slash".to_string(),
                style: StringStyle::Quoted {
                    quote: QuoteChar::Backtick,
                    delim_len: 1
                },
            }
        );
    }

    #[rstest::rstest]
    fn test_empty_string() {
        let tokens = scan("''");
        assert_eq!(
            tokens[0].kind,
            TokenKind::Str {
                decoded: String::new(),
                style: StringStyle::Quoted {
                    quote: QuoteChar::Single,
                    delim_len: 1
                },
            }
        );
    }

    #[rstest::rstest]
    fn test_wrapped_string_collapses_breaks() {
        let tokens = scan("k = 'one\n    two'\n");
        let decoded = tokens
            .iter()
            .find_map(|t| match &t.kind {
                TokenKind::Str { decoded, .. } => Some(decoded.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(decoded, "one two");
    }

    #[rstest::rstest]
    fn test_wrapped_string_rejects_blank_line() {
        let err = scan_err("k = 'one\n\n    two'\n");
        assert_eq!(
            err.kind,
            crate::error::ErrorKind::Lex(LexErrorKind::InvalidLineBreak)
        );
    }

    #[rstest::rstest]
    fn test_long_delimiter_allows_inner_quotes() {
        let tokens = scan("'''it's fine'''");
        assert_eq!(
            tokens[0].kind,
            TokenKind::Str {
                decoded: "it's fine".to_string(),
                style: StringStyle::Quoted {
                    quote: QuoteChar::Single,
                    delim_len: 3
                },
            }
        );
    }

    #[rstest::rstest]
    fn test_block_string() {
        let src = "k =\n    '''\n    line one\n      indented\n    '''\n";
        let tokens = scan(src);
        let (decoded, style) = tokens
            .iter()
            .find_map(|t| match &t.kind {
                TokenKind::Str { decoded, style } => Some((decoded.clone(), *style)),
                _ => None,
            })
            .unwrap();
        assert_eq!(decoded, "line one\n  indented\n");
        assert_eq!(
            style,
            StringStyle::Block {
                quote: QuoteChar::Single,
                delim_len: 3,
                final_newline: FinalNewline::Keep,
            }
        );
    }

    #[rstest::rstest]
    fn test_block_string_strip_final_newline() {
        let src = "k =\n    \"\"\"\n    text\n    \"\"\"//\n";
        let tokens = scan(src);
        let decoded = tokens
            .iter()
            .find_map(|t| match &t.kind {
                TokenKind::Str { decoded, .. } => Some(decoded.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(decoded, "text");
    }

    #[rstest::rstest]
    fn test_block_string_escapes_active_in_double_quotes() {
        let src = "k =\n    \"\"\"\n    a\\tb\n    \"\"\"\n";
        let tokens = scan(src);
        let decoded = tokens
            .iter()
            .find_map(|t| match &t.kind {
                TokenKind::Str { decoded, .. } => Some(decoded.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(decoded, "a\tb\n");
    }

    #[rstest::rstest]
    fn test_unterminated_string() {
        let err = scan_err("'open\n   ");
        assert_eq!(
            err.kind,
            crate::error::ErrorKind::Lex(LexErrorKind::UnterminatedString)
        );
    }

    #[rstest::rstest]
    fn test_comments() {
        assert_eq!(
            kinds("# line\n### doc\n"),
            vec![
                TokenKind::LineComment,
                TokenKind::Newline,
                TokenKind::DocComment,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
        assert!(tokenize("## reserved\n", &LoadOptions::default()).is_err());
    }

    #[rstest::rstest]
    fn test_sections() {
        assert_eq!(
            kinds("|=== a.b\n|===/\n"),
            vec![
                TokenKind::SectionOpen,
                TokenKind::Unquoted("a".to_string()),
                TokenKind::Dot,
                TokenKind::Unquoted("b".to_string()),
                TokenKind::Newline,
                TokenKind::SectionClose,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("=== a\n===/\n")[0],
            TokenKind::SectionOpen
        );
    }

    #[rstest::rstest]
    fn test_alias_token() {
        assert_eq!(
            kinds("$target")[0],
            TokenKind::Alias(SmolStr::new("target"))
        );
        assert!(tokenize("$ name", &LoadOptions::default()).is_err());
    }

    #[rstest::rstest]
    fn test_mixed_indent_rejected() {
        let err = scan_err("a =\n    b = 1\n\tc = 2\n");
        assert_eq!(
            err.kind,
            crate::error::ErrorKind::Lex(LexErrorKind::MixedIndent)
        );
    }

    #[rstest::rstest]
    fn test_disallowed_code_point() {
        let err = scan_err("k = \u{0007}\n");
        assert_eq!(
            err.kind,
            crate::error::ErrorKind::Lex(LexErrorKind::DisallowedCodePoint)
        );
    }

    #[rstest::rstest]
    fn test_only_ascii_source() {
        let options = LoadOptions::default().with_only_ascii_source(true);
        assert!(tokenize("k = caf\u{e9}\n", &options).is_err());
        assert!(tokenize("k = cafe\n", &options).is_ok());
    }

    #[rstest::rstest]
    fn test_token_positions() {
        let tokens = scan("a = 1\nbb = 2\n");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[0].column, 1);
        assert!(tokens[0].at_line_start);
        let bb = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Unquoted("bb".to_string()))
            .unwrap();
        assert_eq!(bb.line, 2);
        assert_eq!(bb.column, 1);
        assert!(bb.at_line_start);
        let one = tokens
            .iter()
            .find(|t| {
                t.kind
                    == TokenKind::Number {
                        class: NumberClass::Int { base: Base::Dec },
                    }
            })
            .unwrap();
        assert!(!one.at_line_start);
        assert_eq!(one.column, 5);
    }

    #[rstest::rstest]
    fn test_crlf_counts_one_line() {
        let tokens = scan("a = 1\r\nb = 2\r\n");
        let b = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Unquoted("b".to_string()))
            .unwrap();
        assert_eq!(b.line, 2);
    }
}
