//! Numeric literal conversion and re-rendering.
//!
//! The scanner classifies number tokens (base, float form, complex or
//! rational shape) and validates digit-group layout; this module turns the
//! raw text into typed values and renders values back into a requested base
//! for round-trip edits and fresh serialization.

use std::fmt::Write as _;

use crate::types::{Complex, Rational, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    Dec,
    Hex,
    Oct,
    Bin,
}

impl Base {
    pub fn radix(self) -> u32 {
        match self {
            Base::Dec => 10,
            Base::Hex => 16,
            Base::Oct => 8,
            Base::Bin => 2,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Base::Dec => "",
            Base::Hex => "0x",
            Base::Oct => "0o",
            Base::Bin => "0b",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatForm {
    Dec,
    Hex,
    Inf,
    Nan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberClass {
    Int { base: Base },
    Float { form: FloatForm },
    Complex,
    Rational,
}

/// Conversion failure. `overflow` distinguishes out-of-range values from
/// malformed literals so callers can report the right error kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumError {
    pub message: String,
    pub overflow: bool,
}

impl NumError {
    fn bad(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            overflow: false,
        }
    }

    fn overflow(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            overflow: true,
        }
    }
}

fn strip_underscores(raw: &str) -> String {
    raw.chars().filter(|c| *c != '_').collect()
}

fn split_sign(raw: &str) -> (bool, &str) {
    match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    }
}

pub fn parse_int(raw: &str, base: Base) -> Result<i64, NumError> {
    let cleaned = strip_underscores(raw);
    let (negative, rest) = split_sign(&cleaned);
    let prefix = base.prefix();
    let digits = if prefix.is_empty() {
        rest
    } else if rest.len() >= 2 && rest[..2].eq_ignore_ascii_case(prefix) {
        &rest[2..]
    } else {
        rest
    }
    .trim_start_matches('_');
    let magnitude = u64::from_str_radix(digits, base.radix())
        .map_err(|_| NumError::bad(format!("invalid integer literal {raw:?}")))?;
    if negative {
        if magnitude > i64::MAX as u64 + 1 {
            return Err(NumError::overflow(format!(
                "integer literal {raw:?} is out of range"
            )));
        }
        Ok((magnitude as i128).wrapping_neg() as i64)
    } else {
        i64::try_from(magnitude)
            .map_err(|_| NumError::overflow(format!("integer literal {raw:?} is out of range")))
    }
}

pub fn parse_dec_float(raw: &str, overflow_to_inf: bool) -> Result<f64, NumError> {
    let cleaned = strip_underscores(raw);
    let value: f64 = cleaned
        .parse()
        .map_err(|_| NumError::bad(format!("invalid float literal {raw:?}")))?;
    if value.is_infinite() && !overflow_to_inf {
        return Err(NumError::overflow(format!(
            "float literal {raw:?} overflows"
        )));
    }
    Ok(value)
}

pub fn parse_hex_float(raw: &str, overflow_to_inf: bool) -> Result<f64, NumError> {
    let cleaned = strip_underscores(raw);
    let (negative, rest) = split_sign(&cleaned);
    let body = rest
        .strip_prefix("0x")
        .or_else(|| rest.strip_prefix("0X"))
        .ok_or_else(|| NumError::bad(format!("invalid hex float literal {raw:?}")))?;
    let (mantissa_text, exp_text) = match body.find(['p', 'P']) {
        Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
        None => (body, None),
    };
    let (int_text, frac_text) = match mantissa_text.find('.') {
        Some(idx) => (&mantissa_text[..idx], &mantissa_text[idx + 1..]),
        None => (mantissa_text, ""),
    };
    if int_text.is_empty() && frac_text.is_empty() {
        return Err(NumError::bad(format!(
            "hex float literal {raw:?} has no digits"
        )));
    }
    let mut mantissa = 0.0f64;
    for c in int_text.chars().chain(frac_text.chars()) {
        let digit = c
            .to_digit(16)
            .ok_or_else(|| NumError::bad(format!("invalid hex digit in {raw:?}")))?;
        mantissa = mantissa * 16.0 + digit as f64;
    }
    let exp: i32 = match exp_text {
        Some(text) => text
            .parse()
            .map_err(|_| NumError::bad(format!("invalid exponent in {raw:?}")))?,
        None => 0,
    };
    let scale = exp - 4 * frac_text.len() as i32;
    let value = mantissa * (scale as f64).exp2();
    if value.is_infinite() && mantissa.is_finite() && !overflow_to_inf {
        return Err(NumError::overflow(format!(
            "hex float literal {raw:?} overflows"
        )));
    }
    Ok(if negative { -value } else { value })
}

pub fn parse_float(raw: &str, form: FloatForm, overflow_to_inf: bool) -> Result<f64, NumError> {
    match form {
        FloatForm::Dec => parse_dec_float(raw, overflow_to_inf),
        FloatForm::Hex => parse_hex_float(raw, overflow_to_inf),
        FloatForm::Inf => {
            let (negative, _) = split_sign(raw.trim());
            Ok(if negative {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            })
        }
        FloatForm::Nan => Ok(f64::NAN),
    }
}

/// Parse `[real][+|-]imag i`. Either the real part or the leading sign may
/// be absent; components are decimal float or integer shaped.
pub fn parse_complex(raw: &str) -> Result<Complex, NumError> {
    let cleaned = strip_underscores(raw);
    let body = cleaned
        .strip_suffix('i')
        .ok_or_else(|| NumError::bad(format!("invalid complex literal {raw:?}")))?;
    let bytes = body.as_bytes();
    let mut split = None;
    for idx in (1..bytes.len()).rev() {
        let b = bytes[idx];
        if b == b'+' || b == b'-' {
            let prev = bytes[idx - 1];
            if prev == b'e' || prev == b'E' || prev == b'p' || prev == b'P' {
                continue;
            }
            split = Some(idx);
            break;
        }
    }
    let (real_text, imag_text) = match split {
        Some(idx) => (&body[..idx], &body[idx..]),
        None => ("", body),
    };
    let re = if real_text.is_empty() {
        0.0
    } else {
        real_text
            .parse()
            .map_err(|_| NumError::bad(format!("invalid real component in {raw:?}")))?
    };
    let im = match imag_text {
        "" | "+" => 1.0,
        "-" => -1.0,
        text => text
            .parse()
            .map_err(|_| NumError::bad(format!("invalid imaginary component in {raw:?}")))?,
    };
    Ok(Complex::new(re, im))
}

/// Parse `p/q` with optionally signed integer components and `q != 0`.
pub fn parse_rational(raw: &str) -> Result<Rational, NumError> {
    let cleaned = strip_underscores(raw);
    let (num_text, den_text) = cleaned
        .split_once('/')
        .ok_or_else(|| NumError::bad(format!("invalid rational literal {raw:?}")))?;
    let num: i64 = num_text
        .parse()
        .map_err(|_| NumError::bad(format!("invalid numerator in {raw:?}")))?;
    let den: i64 = den_text
        .parse()
        .map_err(|_| NumError::bad(format!("invalid denominator in {raw:?}")))?;
    Rational::new(num, den)
        .ok_or_else(|| NumError::bad(format!("rational literal {raw:?} has a zero denominator")))
}

/// Convert a classified literal into a value. With `integers == false` every
/// number loads as a float.
pub fn parse_number(
    raw: &str,
    class: NumberClass,
    integers: bool,
    overflow_to_inf: bool,
) -> Result<Value, NumError> {
    match class {
        NumberClass::Int { base } => {
            let value = parse_int(raw, base)?;
            if integers {
                Ok(Value::Int(value))
            } else {
                Ok(Value::Float(value as f64))
            }
        }
        NumberClass::Float { form } => Ok(Value::Float(parse_float(raw, form, overflow_to_inf)?)),
        NumberClass::Complex => Ok(Value::Complex(parse_complex(raw)?)),
        NumberClass::Rational => Ok(Value::Rational(parse_rational(raw)?)),
    }
}

/// Grouping stride of the original literal's integer digits, derived from
/// the distance between its last underscore and the end of the digit run.
pub fn underscore_stride(raw: &str) -> Option<usize> {
    let digits_end = raw
        .find(['.', 'p', 'P', 'e', 'E', '/', 'i'])
        .unwrap_or(raw.len());
    let digits = &raw[..digits_end];
    let last = digits.rfind('_')?;
    let stride = digits.len() - last - 1;
    if stride == 0 {
        None
    } else {
        Some(stride)
    }
}

fn group_digits(digits: &str, stride: usize) -> String {
    if stride == 0 || digits.len() <= stride {
        return digits.to_string();
    }
    let mut out = String::with_capacity(digits.len() + digits.len() / stride);
    let first = digits.len() % stride;
    let first = if first == 0 { stride } else { first };
    out.push_str(&digits[..first]);
    let mut pos = first;
    while pos < digits.len() {
        out.push('_');
        out.push_str(&digits[pos..pos + stride]);
        pos += stride;
    }
    out
}

/// Render an integer in the given base, reapplying underscore grouping at
/// `stride` when the original literal used it.
pub fn render_int(value: i64, base: Base, stride: Option<usize>) -> String {
    let magnitude = value.unsigned_abs();
    let digits = match base {
        Base::Dec => {
            let mut buffer = itoa::Buffer::new();
            buffer.format(magnitude).to_string()
        }
        Base::Hex => format!("{magnitude:x}"),
        Base::Oct => format!("{magnitude:o}"),
        Base::Bin => format!("{magnitude:b}"),
    };
    let digits = match stride {
        Some(stride) => group_digits(&digits, stride),
        None => digits,
    };
    let mut out = String::with_capacity(digits.len() + 3);
    if value < 0 {
        out.push('-');
    }
    out.push_str(base.prefix());
    out.push_str(&digits);
    out
}

pub fn render_dec_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    let mut buffer = ryu::Buffer::new();
    buffer.format(value).to_string()
}

pub fn render_hex_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() {
            "-0x0p0".to_string()
        } else {
            "0x0p0".to_string()
        };
    }
    let bits = value.to_bits();
    let negative = (bits >> 63) != 0;
    let exp_bits = ((bits >> 52) & 0x7FF) as i64;
    let frac = bits & ((1u64 << 52) - 1);
    let (leading, exp) = if exp_bits == 0 {
        (0u64, -1022i64)
    } else {
        (1u64, exp_bits - 1023)
    };
    let mut out = String::with_capacity(24);
    if negative {
        out.push('-');
    }
    let _ = write!(out, "0x{leading:x}");
    if frac != 0 {
        let mut hex = format!("{frac:013x}");
        while hex.ends_with('0') {
            hex.pop();
        }
        out.push('.');
        out.push_str(&hex);
    }
    let _ = write!(out, "p{exp}");
    out
}

pub fn render_float(value: f64, hex: bool) -> String {
    if hex && value.is_finite() {
        render_hex_float(value)
    } else {
        render_dec_float(value)
    }
}

pub fn render_complex(value: &Complex) -> String {
    let re = render_dec_float(value.re);
    let im = render_dec_float(value.im);
    if im.starts_with('-') {
        format!("{re}{im}i")
    } else {
        format!("{re}+{im}i")
    }
}

pub fn render_rational(value: &Rational) -> String {
    format!("{}/{}", value.num(), value.den())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case("0", Base::Dec, 0)]
    #[case("42", Base::Dec, 42)]
    #[case("-17", Base::Dec, -17)]
    #[case("1_000_000", Base::Dec, 1_000_000)]
    #[case("0xff", Base::Hex, 255)]
    #[case("-0xFF", Base::Hex, -255)]
    #[case("0o755", Base::Oct, 493)]
    #[case("0b1101", Base::Bin, 13)]
    fn test_parse_int(#[case] raw: &str, #[case] base: Base, #[case] expected: i64) {
        assert_eq!(parse_int(raw, base).unwrap(), expected);
    }

    #[rstest::rstest]
    fn test_parse_int_range() {
        assert_eq!(
            parse_int("9223372036854775807", Base::Dec).unwrap(),
            i64::MAX
        );
        assert_eq!(
            parse_int("-9223372036854775808", Base::Dec).unwrap(),
            i64::MIN
        );
        let err = parse_int("9223372036854775808", Base::Dec).unwrap_err();
        assert!(err.overflow);
    }

    #[rstest::rstest]
    fn test_parse_hex_float() {
        assert_eq!(parse_hex_float("0x4.3p2", false).unwrap(), 16.75);
        assert_eq!(parse_hex_float("0x1p0", false).unwrap(), 1.0);
        assert_eq!(parse_hex_float("-0x1.8p1", false).unwrap(), -3.0);
        assert_eq!(parse_hex_float("0xAp-1", false).unwrap(), 5.0);
    }

    #[rstest::rstest]
    fn test_parse_float_specials() {
        assert_eq!(
            parse_float("-inf", FloatForm::Inf, false).unwrap(),
            f64::NEG_INFINITY
        );
        assert!(parse_float("nan", FloatForm::Nan, false).unwrap().is_nan());
        let err = parse_dec_float("1e999", false).unwrap_err();
        assert!(err.overflow);
        assert_eq!(parse_dec_float("1e999", true).unwrap(), f64::INFINITY);
    }

    #[rstest::rstest]
    #[case("2i", 0.0, 2.0)]
    #[case("1+2i", 1.0, 2.0)]
    #[case("-1.5-2.5i", -1.5, -2.5)]
    #[case("1e2+3i", 100.0, 3.0)]
    #[case("-i", 0.0, -1.0)]
    fn test_parse_complex(#[case] raw: &str, #[case] re: f64, #[case] im: f64) {
        let c = parse_complex(raw).unwrap();
        assert_eq!(c.re, re);
        assert_eq!(c.im, im);
    }

    #[rstest::rstest]
    fn test_parse_rational() {
        let r = parse_rational("3/4").unwrap();
        assert_eq!((r.num(), r.den()), (3, 4));
        let r = parse_rational("-6/8").unwrap();
        assert_eq!((r.num(), r.den()), (-6, 8));
        assert!(parse_rational("1/0").is_err());
    }

    #[rstest::rstest]
    fn test_render_int_bases() {
        assert_eq!(render_int(13, Base::Bin, None), "0b1101");
        assert_eq!(render_int(7, Base::Bin, None), "0b111");
        assert_eq!(render_int(-255, Base::Hex, None), "-0xff");
        assert_eq!(render_int(1000000, Base::Dec, Some(3)), "1_000_000");
        assert_eq!(render_int(42, Base::Dec, Some(3)), "42");
    }

    #[rstest::rstest]
    fn test_underscore_stride() {
        assert_eq!(underscore_stride("1_000_000"), Some(3));
        assert_eq!(underscore_stride("0xff_ff"), Some(2));
        assert_eq!(underscore_stride("123"), None);
        assert_eq!(underscore_stride("1_000.5"), Some(3));
    }

    #[rstest::rstest]
    fn test_render_hex_float_roundtrip() {
        for value in [16.75f64, 1.0, -3.0, 0.5, 1024.0, 3.141592653589793] {
            let rendered = render_hex_float(value);
            assert_eq!(parse_hex_float(&rendered, false).unwrap(), value);
        }
        assert_eq!(render_hex_float(0.0), "0x0p0");
    }

    #[rstest::rstest]
    fn test_render_complex_rational() {
        assert_eq!(render_complex(&Complex::new(1.0, 2.0)), "1.0+2.0i");
        assert_eq!(render_complex(&Complex::new(0.0, -1.0)), "0.0-1.0i");
        assert_eq!(
            render_rational(&Rational::new(3, -4).unwrap()),
            "-3/4"
        );
    }
}
