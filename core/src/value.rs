//! Cell values, row keys and the normalization rules used for equality

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A raw cell value exactly as it arrived from the parsed tabular input.
///
/// Compare columns must hold scalars (null, bool, number, string). Other columns
/// may carry anything and are passed through untouched.
pub type Value = serde_json::Value;

/// Identifier value used to align rows across datasets.
///
/// Strings are kept verbatim. Numbers take their canonical decimal form, so `1`,
/// `1.0` and `"1"` address the same row while `"1.0"`, `" 1"` and `"1"` do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(String);

impl RowKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build a key from an identifier cell. Returns `None` for null, absent or
    /// non-scalar identifiers.
    pub fn from_value(value: Option<&Value>) -> Option<Self> {
        match value? {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => canonical_number(n).ok().map(Self),
            Value::Bool(b) => Some(Self(b.to_string())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl std::borrow::Borrow<str> for RowKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Comparison form of a cell value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NormalizedValue {
    /// Missing row, absent column or explicit null.
    NoValue,
    Text(String),
}

impl NormalizedValue {
    pub fn is_no_value(&self) -> bool {
        matches!(self, Self::NoValue)
    }
}

/// Knobs controlling how cell values are brought to comparison form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationOptions {
    /// Strip leading/trailing whitespace from strings
    pub trim_whitespace: bool,
    /// Treat plain decimal literals in strings as numbers ("1.0" == 1)
    pub numeric_strings: bool,
    /// When false, strings are compared lower-cased
    pub case_sensitive: bool,
}

impl Default for NormalizationOptions {
    fn default() -> Self {
        Self {
            trim_whitespace: true,
            numeric_strings: true,
            case_sensitive: true,
        }
    }
}

/// Applies [`NormalizationOptions`] to raw values.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    options: NormalizationOptions,
}

impl Normalizer {
    pub fn new(options: NormalizationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &NormalizationOptions {
        &self.options
    }

    /// Normalize one cell. `None` means the cell (or the whole row) is absent.
    ///
    /// Fails only for arrays and objects, which have no comparison form.
    pub fn normalize(&self, value: Option<&Value>) -> std::result::Result<NormalizedValue, String> {
        let text = match value {
            None | Some(Value::Null) => return Ok(NormalizedValue::NoValue),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Number(n)) => canonical_number(n)?,
            Some(Value::String(s)) => self.normalize_text(s),
            Some(Value::Array(_)) => return Err("array values cannot be compared".to_string()),
            Some(Value::Object(_)) => return Err("object values cannot be compared".to_string()),
        };
        Ok(NormalizedValue::Text(text))
    }

    fn normalize_text(&self, raw: &str) -> String {
        let text = if self.options.trim_whitespace { raw.trim() } else { raw };

        if self.options.numeric_strings && decimal_literal().is_match(text) {
            return canonical_decimal(text);
        }

        if self.options.case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        }
    }
}

fn decimal_literal() -> &'static Regex {
    static DECIMAL: OnceLock<Regex> = OnceLock::new();
    DECIMAL.get_or_init(|| {
        Regex::new(r"^[+-]?(0|[1-9][0-9]*)(\.[0-9]+)?$").expect("decimal literal pattern is valid")
    })
}

fn canonical_number(n: &serde_json::Number) -> std::result::Result<String, String> {
    if let Some(i) = n.as_i64() {
        return Ok(i.to_string());
    }
    if let Some(u) = n.as_u64() {
        return Ok(u.to_string());
    }
    match n.as_f64() {
        // f64's Display never uses exponent notation, so the output is a decimal literal
        Some(f) if f.is_finite() => Ok(canonical_decimal(&f.to_string())),
        _ => Err(format!("non-finite number {n}")),
    }
}

/// Canonicalize a decimal literal matched by [`decimal_literal`]: drop '+', trailing
/// fractional zeros, an empty fraction and the sign of zero.
fn canonical_decimal(text: &str) -> String {
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac)) => (int_part, frac.trim_end_matches('0')),
        None => (digits, ""),
    };

    let mut out = String::with_capacity(text.len());
    let is_zero = int_part == "0" && frac_part.is_empty();
    if negative && !is_zero {
        out.push('-');
    }
    out.push_str(int_part);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

/// Human-readable rendering of a raw value (null renders as "null").
pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
