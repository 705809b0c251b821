//! Small accessors for picking values out of loosely typed payloads.
//!
//! Upstream payloads mix numbers, numeric strings and booleans freely, and
//! positional arrays grow new slots over time. Required fields go through
//! the `Result` accessors; optional ones use the `opt_*` forms, which fall
//! back to a default instead of failing.

use serde_json::Value;

use crate::NormalizeError;

pub(crate) fn get<'a>(v: &'a Value, key: &'static str) -> Result<&'a Value, NormalizeError> {
    v.get(key).ok_or(NormalizeError::MissingField(key))
}

pub(crate) fn at<'a>(
    v: &'a Value,
    idx: usize,
    field: &'static str,
) -> Result<&'a Value, NormalizeError> {
    v.get(idx).ok_or(NormalizeError::MissingField(field))
}

pub(crate) fn as_str<'a>(v: &'a Value, field: &'static str) -> Result<&'a str, NormalizeError> {
    v.as_str().ok_or(NormalizeError::WrongType {
        field,
        expected: "a string",
    })
}

pub(crate) fn as_i64(v: &Value, field: &'static str) -> Result<i64, NormalizeError> {
    number(v).map(|n| n as i64).ok_or(NormalizeError::WrongType {
        field,
        expected: "a number",
    })
}

pub(crate) fn as_f64(v: &Value, field: &'static str) -> Result<f64, NormalizeError> {
    number(v).ok_or(NormalizeError::WrongType {
        field,
        expected: "a number",
    })
}

pub(crate) fn as_array<'a>(
    v: &'a Value,
    field: &'static str,
) -> Result<&'a Vec<Value>, NormalizeError> {
    v.as_array().ok_or(NormalizeError::WrongType {
        field,
        expected: "an array",
    })
}

/// Accepts numbers and numeric strings.
fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}

pub(crate) fn opt_i64(v: &Value, key: &str) -> i64 {
    v.get(key).and_then(number).map(|n| n as i64).unwrap_or(0)
}

pub(crate) fn opt_f64(v: &Value, key: &str) -> f64 {
    v.get(key).and_then(number).unwrap_or(0.0)
}

pub(crate) fn opt_str<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Non-negative count or level, clamped into `u32`.
pub(crate) fn non_negative(n: i64) -> u32 {
    n.clamp(0, i64::from(u32::MAX)) as u32
}

/// JavaScript-style truthiness, which is how upstream flags are meant.
pub(crate) fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Renders an id-like value (number or string) as a string.
pub(crate) fn id_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
