//! Dynamically-typed values flowing through the evaluator.
//!
//! [`Value`] is the public-facing type for expression inputs and results. It
//! owns all its data and can be freely cloned, serialized, or stored. Objects
//! preserve insertion order, which matters when object literals are
//! constructed inside an expression.
//!
//! # JSON serialization
//!
//! `Value` serializes untagged, so the JSON form is the natural one:
//!
//! - `Null` and `Undefined` → JSON `null` (JSON cannot distinguish them;
//!   deserialization always yields `Null`)
//! - `Bool` ↔ JSON `true`/`false`
//! - `Number` ↔ JSON number (always an IEEE-754 double)
//! - `String` ↔ JSON string
//! - `Array` ↔ JSON array
//! - `Object` ↔ JSON object, insertion-ordered

use std::fmt::{self, Write};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A mutable variable environment supplied by the host for each evaluation.
///
/// Assignment expressions write through to this map; lookups of missing
/// names yield [`Value::Undefined`] without raising.
pub type Context = IndexMap<String, Value>;

/// A value produced or consumed by expression evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// An explicit null.
    Null,
    /// The distinguished "undefined" produced by missing lookups. Serializes
    /// as JSON `null`.
    Undefined,
    /// A boolean.
    Bool(bool),
    /// A number; always an IEEE-754 double.
    Number(f64),
    /// A UTF-8 string.
    String(String),
    /// An ordered sequence of values.
    Array(Vec<Value>),
    /// A mapping from string keys to values, insertion-order-preserved.
    Object(IndexMap<String, Value>),
}

impl Value {
    /// Returns whether this value counts as true in a condition.
    ///
    /// Everything is truthy except `false`, `0`, `NaN`, the empty string,
    /// `null`, and `undefined`.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null | Self::Undefined | Self::Bool(false) => false,
            Self::Bool(true) | Self::Array(_) | Self::Object(_) => true,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
        }
    }

    /// Returns whether this value is `Null` or `Undefined`.
    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Null | Self::Undefined)
    }

    /// Numeric coercion used by the arithmetic and comparison operators.
    ///
    /// Booleans become 0/1, `null` becomes 0, `undefined` and aggregates
    /// become NaN, and strings are parsed (an empty or blank string is 0).
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Null => 0.0,
            Self::Undefined | Self::Array(_) | Self::Object(_) => f64::NAN,
            Self::String(s) => str_to_number(s),
        }
    }

    /// Loose equality for the `==` and `!=` operators.
    ///
    /// This is specified rather than inherited from a host language:
    /// `null` equals `undefined`, numbers and strings compare after numeric
    /// parse, booleans coerce to numbers, same-tag aggregates compare
    /// structurally, and any other cross-tag pair is unequal.
    #[must_use]
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null | Self::Undefined, Self::Null | Self::Undefined) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(_), Self::Array(_)) | (Self::Object(_), Self::Object(_)) => self == other,
            (Self::Number(n), Self::String(s)) | (Self::String(s), Self::Number(n)) => str_to_number(s) == *n,
            (Self::Bool(b), other) | (other, Self::Bool(b)) => {
                Self::Number(f64::from(u8::from(*b))).loose_eq(other)
            }
            _ => false,
        }
    }
}

/// String-to-number coercion: blank is zero, unparsable is NaN.
fn str_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        0.0
    } else {
        trimmed.parse().unwrap_or(f64::NAN)
    }
}

/// Formats a double the way the host string conversion does: no trailing
/// `.0` on integral values, shortest round-trip form otherwise.
fn fmt_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        return f.write_str("NaN");
    }
    if n.is_infinite() {
        return f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" });
    }
    if n == 0.0 {
        // Covers negative zero, which prints as plain "0".
        return f.write_str("0");
    }
    if n == n.trunc() && n.abs() < 1e21 {
        return write!(f, "{n:.0}");
    }
    let mut buffer = ryu::Buffer::new();
    let printed = buffer.format(n);
    // ryu emits "1e-7"; match the conventional "+" on positive exponents.
    if let Some(pos) = printed.find('e')
        && !printed[pos + 1..].starts_with('-')
    {
        write!(f, "{}e+{}", &printed[..pos], &printed[pos + 1..])
    } else {
        f.write_str(printed)
    }
}

impl fmt::Display for Value {
    /// The host string conversion used by `+` concatenation and template
    /// interpolation: arrays join their elements with `,` (nullish elements
    /// become empty), objects render opaquely.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Undefined => f.write_str("undefined"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => fmt_number(*n, f),
            Self::String(s) => f.write_str(s),
            Self::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    if !item.is_nullish() {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Self::Object(_) => f.write_str("[object Object]"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(v)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(v: IndexMap<String, Value>) -> Self {
        Self::Object(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(entries) => {
                Self::Object(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    /// `Undefined` maps to JSON `null`; non-finite numbers, which JSON
    /// cannot carry, also map to `null`. Integral doubles become JSON
    /// integers.
    fn from(v: Value) -> Self {
        match v {
            Value::Null | Value::Undefined => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 => {
                Self::Number(serde_json::Number::from(n as i64))
            }
            Value::Number(n) => serde_json::Number::from_f64(n).map_or(Self::Null, Self::Number),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(entries) => {
                Self::Object(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// Builds a [`Context`] from a JSON object; returns `None` for any other
/// JSON value.
#[must_use]
pub fn context_from_json(value: serde_json::Value) -> Option<Context> {
    match Value::from(value) {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_the_falsy_list() {
        for falsy in [
            Value::Bool(false),
            Value::Number(0.0),
            Value::Number(f64::NAN),
            Value::String(String::new()),
            Value::Null,
            Value::Undefined,
        ] {
            assert!(!falsy.is_truthy(), "{falsy:?} should be falsy");
        }
        for truthy in [
            Value::Bool(true),
            Value::Number(-1.0),
            Value::from("0"),
            Value::Array(vec![]),
            Value::Object(IndexMap::new()),
        ] {
            assert!(truthy.is_truthy(), "{truthy:?} should be truthy");
        }
    }

    #[test]
    fn loose_eq_crosses_tags() {
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(Value::Number(1.0).loose_eq(&Value::from("1")));
        assert!(Value::from("1.5").loose_eq(&Value::Number(1.5)));
        assert!(Value::Bool(true).loose_eq(&Value::Number(1.0)));
        assert!(Value::Bool(false).loose_eq(&Value::from("")));
        assert!(!Value::Number(1.0).loose_eq(&Value::from("x")));
        assert!(!Value::Null.loose_eq(&Value::Number(0.0)));
        assert!(!Value::from("").loose_eq(&Value::Null));
    }

    #[test]
    fn loose_eq_nan_is_never_equal() {
        assert!(!Value::Number(f64::NAN).loose_eq(&Value::Number(f64::NAN)));
    }

    #[test]
    fn display_matches_host_string_conversion() {
        assert_eq!(Value::Number(20.0).to_string(), "20");
        assert_eq!(Value::Number(0.5).to_string(), "0.5");
        assert_eq!(Value::Number(-0.0).to_string(), "0");
        assert_eq!(Value::Number(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(
            Value::Array(vec![Value::from(1), Value::Null, Value::from("x")]).to_string(),
            "1,,x"
        );
        assert_eq!(Value::Object(IndexMap::new()).to_string(), "[object Object]");
    }

    #[test]
    fn json_round_trip_preserves_order() {
        let json = serde_json::json!({"b": 1, "a": [true, null], "c": {"k": "v"}});
        let value = Value::from(json.clone());
        let Value::Object(map) = &value else {
            panic!("expected object, got {value:?}");
        };
        assert_eq!(map.keys().collect::<Vec<_>>(), ["b", "a", "c"]);
        assert_eq!(serde_json::Value::from(value), json);
    }

    #[test]
    fn string_to_number_coercion() {
        assert_eq!(Value::from(" 12 ").to_number(), 12.0);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert!(Value::from("twelve").to_number().is_nan());
        assert_eq!(Value::Bool(true).to_number(), 1.0);
        assert_eq!(Value::Null.to_number(), 0.0);
        assert!(Value::Undefined.to_number().is_nan());
    }
}
