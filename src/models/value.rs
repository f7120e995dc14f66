//! Scalar cell values and their coercion rules.
//!
//! Every backend decodes its cells into [`Value`]. The typed accessors on the
//! result cursor then coerce through the `coerce_*` methods here, so the rules
//! are identical for MySQL, PostgreSQL and SQLite.

use crate::error::{DbError, DbResult};
use serde_json::Value as JsonValue;

/// A decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Text, and anything rendered as text (DECIMAL, dates, UUIDs)
    Text(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
}

// i64::MIN and i64::MAX + 1 are exactly representable as f64.
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Json(JsonValue::Null))
    }

    /// Get the type name of this value for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }

    /// Convert a JSON scalar into the matching native variant.
    ///
    /// Arrays and objects stay JSON.
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Text(n.to_string())),
            },
            JsonValue::String(s) => Self::Text(s.clone()),
            other => Self::Json(other.clone()),
        }
    }

    /// Strings pass through, booleans render as "0"/"1", everything else
    /// uses its natural representation.
    pub fn coerce_string(&self) -> DbResult<String> {
        match self {
            Self::Null => Err(unexpected(self, "string")),
            Self::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
            Self::Int(i) => Ok(i.to_string()),
            Self::Float(f) => Ok(f.to_string()),
            Self::Text(s) => Ok(s.clone()),
            Self::Bytes(bytes) => Ok(bytes_to_string(bytes)),
            Self::Json(JsonValue::String(s)) => Ok(s.clone()),
            Self::Json(json) => match Self::from_json(json) {
                Self::Json(_) => Ok(json.to_string()),
                scalar => scalar.coerce_string(),
            },
        }
    }

    /// Accepts booleans, the words true/false, on/off, yes/no in any case,
    /// and the numbers 0 and 1.
    pub fn coerce_bool(&self) -> DbResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            Self::Int(0) => Ok(false),
            Self::Int(1) => Ok(true),
            Self::Float(f) if *f == 0.0 => Ok(false),
            Self::Float(f) if *f == 1.0 => Ok(true),
            Self::Text(s) => parse_bool(s).ok_or_else(|| unexpected(self, "bool")),
            Self::Bytes(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(parse_bool)
                .ok_or_else(|| unexpected(self, "bool")),
            Self::Json(json) => match Self::from_json(json) {
                Self::Json(_) => Err(unexpected(self, "bool")),
                scalar => scalar.coerce_bool(),
            },
            _ => Err(unexpected(self, "bool")),
        }
    }

    /// Integers pass through; floats and numeric strings must have no
    /// fractional part.
    pub fn coerce_int(&self) -> DbResult<i64> {
        match self {
            Self::Int(i) => Ok(*i),
            Self::Bool(b) => Ok(i64::from(*b)),
            Self::Float(f) => float_to_int(*f).ok_or_else(|| unexpected(self, "int")),
            Self::Text(s) => parse_int(s).ok_or_else(|| unexpected(self, "int")),
            Self::Bytes(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(parse_int)
                .ok_or_else(|| unexpected(self, "int")),
            Self::Json(json) => match Self::from_json(json) {
                Self::Json(_) => Err(unexpected(self, "int")),
                scalar => scalar.coerce_int(),
            },
            Self::Null => Err(unexpected(self, "int")),
        }
    }

    /// Floats pass through; strings must be numeric.
    pub fn coerce_float(&self) -> DbResult<f64> {
        match self {
            Self::Float(f) => Ok(*f),
            Self::Int(i) => Ok(*i as f64),
            Self::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) => parse_float(s).ok_or_else(|| unexpected(self, "float")),
            Self::Bytes(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(parse_float)
                .ok_or_else(|| unexpected(self, "float")),
            Self::Json(json) => match Self::from_json(json) {
                Self::Json(_) => Err(unexpected(self, "float")),
                scalar => scalar.coerce_float(),
            },
            Self::Null => Err(unexpected(self, "float")),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            return f.write_str("NULL");
        }
        match self.coerce_string() {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str("NULL"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Render binary data as text.
///
/// Valid UTF-8 is returned as-is, anything else is base64 encoded.
pub fn bytes_to_string(bytes: &[u8]) -> String {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => STANDARD.encode(bytes),
    }
}

fn unexpected(value: &Value, target: &str) -> DbError {
    DbError::unexpected_value(format!(
        "cannot convert {} value '{}' to {}",
        value.type_name(),
        value,
        target
    ))
}

fn parse_bool(s: &str) -> Option<bool> {
    let s = s.trim();
    for (word, result) in [
        ("true", true),
        ("false", false),
        ("on", true),
        ("off", false),
        ("yes", true),
        ("no", false),
    ] {
        if s.eq_ignore_ascii_case(word) {
            return Some(result);
        }
    }
    match parse_float(s)? {
        f if f == 0.0 => Some(false),
        f if f == 1.0 => Some(true),
        _ => None,
    }
}

fn parse_float(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(i);
    }
    parse_float(s).and_then(float_to_int)
}

fn float_to_int(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && (I64_LOWER..I64_UPPER).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_string() {
        assert_eq!(Value::from("abc").coerce_string().unwrap(), "abc");
        assert_eq!(Value::Bool(true).coerce_string().unwrap(), "1");
        assert_eq!(Value::Bool(false).coerce_string().unwrap(), "0");
        assert_eq!(Value::Int(-7).coerce_string().unwrap(), "-7");
        assert_eq!(Value::Float(2.5).coerce_string().unwrap(), "2.5");
        assert_eq!(Value::Float(2.0).coerce_string().unwrap(), "2");
        assert_eq!(Value::Bytes(b"hello".to_vec()).coerce_string().unwrap(), "hello");
        assert_eq!(
            Value::Json(serde_json::json!({"a": 1})).coerce_string().unwrap(),
            r#"{"a":1}"#
        );
    }

    #[test]
    fn test_coerce_bool_words() {
        for word in ["yes", "On", "TRUE", " true "] {
            assert!(Value::from(word).coerce_bool().unwrap(), "{word}");
        }
        for word in ["no", "off", "False"] {
            assert!(!Value::from(word).coerce_bool().unwrap(), "{word}");
        }
    }

    #[test]
    fn test_coerce_bool_numbers() {
        assert!(Value::Int(1).coerce_bool().unwrap());
        assert!(!Value::Int(0).coerce_bool().unwrap());
        assert!(Value::from("1").coerce_bool().unwrap());
        assert!(!Value::from("0").coerce_bool().unwrap());
        assert!(Value::Float(1.0).coerce_bool().unwrap());
    }

    #[test]
    fn test_coerce_bool_rejects_other_values() {
        assert!(matches!(
            Value::from("maybe").coerce_bool(),
            Err(DbError::UnexpectedValue { .. })
        ));
        assert!(matches!(
            Value::Int(2).coerce_bool(),
            Err(DbError::UnexpectedValue { .. })
        ));
        assert!(matches!(
            Value::from("2").coerce_bool(),
            Err(DbError::UnexpectedValue { .. })
        ));
    }

    #[test]
    fn test_coerce_int() {
        assert_eq!(Value::Int(42).coerce_int().unwrap(), 42);
        assert_eq!(Value::Float(2.0).coerce_int().unwrap(), 2);
        assert_eq!(Value::from("17").coerce_int().unwrap(), 17);
        assert_eq!(Value::from("2.0").coerce_int().unwrap(), 2);
        assert_eq!(Value::from("1e3").coerce_int().unwrap(), 1000);
        assert_eq!(Value::Bool(true).coerce_int().unwrap(), 1);
        assert_eq!(
            Value::from("9223372036854775807").coerce_int().unwrap(),
            i64::MAX
        );
    }

    #[test]
    fn test_coerce_int_rejects_fractions() {
        assert!(matches!(
            Value::Float(2.5).coerce_int(),
            Err(DbError::UnexpectedValue { .. })
        ));
        assert!(matches!(
            Value::from("2.5").coerce_int(),
            Err(DbError::UnexpectedValue { .. })
        ));
        assert!(matches!(
            Value::from("abc").coerce_int(),
            Err(DbError::UnexpectedValue { .. })
        ));
        assert!(Value::Float(1e20).coerce_int().is_err());
    }

    #[test]
    fn test_coerce_float() {
        assert_eq!(Value::Float(1.5).coerce_float().unwrap(), 1.5);
        assert_eq!(Value::Int(3).coerce_float().unwrap(), 3.0);
        assert_eq!(Value::from("0.25").coerce_float().unwrap(), 0.25);
        assert!(matches!(
            Value::from("abc").coerce_float(),
            Err(DbError::UnexpectedValue { .. })
        ));
        assert!(Value::from("inf").coerce_float().is_err());
    }

    #[test]
    fn test_null_never_coerces() {
        assert!(Value::Null.coerce_string().is_err());
        assert!(Value::Null.coerce_int().is_err());
        assert!(Value::Json(JsonValue::Null).is_null());
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    #[test]
    fn test_json_scalars_coerce_like_natives() {
        assert_eq!(Value::Json(serde_json::json!(5)).coerce_int().unwrap(), 5);
        assert!(Value::Json(serde_json::json!(true)).coerce_bool().unwrap());
        assert!(Value::Json(serde_json::json!([1])).coerce_int().is_err());
    }

    #[test]
    fn test_bytes_to_string_falls_back_to_base64() {
        assert_eq!(bytes_to_string(b"hello world"), "hello world");
        assert_eq!(bytes_to_string(&[0xFF, 0xFE, 0x00, 0x01]), "//4AAQ==");
        assert_eq!(bytes_to_string(&[]), "");
    }
}
