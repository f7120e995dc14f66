//! Database-agnostic type mappings.
//!
//! This module decodes native rows into [`Value`] cells.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! Raw SQL is sent unprepared, so MySQL and PostgreSQL return text-format
//! values. Columns the categories do not cover fall back to an unchecked text
//! decode. SQLite is dynamically typed and is classified by the storage class
//! of each individual value instead of the declared column type.

use crate::models::{DriverKind, Value};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Temporal,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, driver: DriverKind) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if driver == DriverKind::Sqlite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // Integer types; "interval" and "point" are not ones. TINYBLOB and
    // TINYTEXT fall through to binary and text below.
    if (lower.contains("int") && !lower.contains("interval") && !lower.contains("point"))
        || lower.contains("serial")
    {
        return TypeCategory::Integer;
    }

    // Boolean
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // Float types
    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    // JSON types
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    // Binary types
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("timestamp")
        || lower.contains("datetime")
        || lower == "date"
        || lower == "time"
        || lower == "timetz"
    {
        return TypeCategory::Temporal;
    }

    if lower.contains("char") || lower.contains("text") || lower == "string" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Row Decoding Trait
// =============================================================================

/// Trait for converting native rows into column names and values.
pub trait DecodeRow {
    fn column_names(&self) -> Vec<String>;
    fn decode_values(&self) -> Vec<Value>;
}

impl DecodeRow for MySqlRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn decode_values(&self) -> Vec<Value> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DriverKind::MySql);
                mysql::decode_column(self, idx, category)
            })
            .collect()
    }
}

impl DecodeRow for PgRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn decode_values(&self) -> Vec<Value> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DriverKind::Postgres);
                postgres::decode_column(self, idx, category)
            })
            .collect()
    }
}

impl DecodeRow for SqliteRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn decode_values(&self) -> Vec<Value> {
        (0..self.columns().len())
            .map(|idx| sqlite::decode_column(self, idx))
            .collect()
    }
}

/// Unchecked text decode, valid for text-format results.
fn decode_text_unchecked<R>(row: &R, idx: usize) -> Value
where
    R: Row,
    for<'r> String: Decode<'r, R::Database>,
    usize: sqlx::ColumnIndex<R>,
{
    row.try_get_unchecked::<Option<String>, _>(idx)
        .ok()
        .flatten()
        .map(Value::Text)
        .unwrap_or(Value::Null)
}

fn float_value(v: Option<f64>) -> Option<Value> {
    v.map(Value::Float)
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> Value {
        match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Err(_) => return Value::Null,
            Ok(_) => {}
        }

        let decoded = match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            _ => None,
        };
        decoded.unwrap_or_else(|| decode_text_unchecked(row, idx))
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> Option<Value> {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(v) => v.map(|d| Value::Text(d.0)),
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                None
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Option<Value> {
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return Some(Value::Int(v));
        }
        // BIGINT UNSIGNED beyond i64 stays exact as text
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return Some(
                i64::try_from(v)
                    .map(Value::Int)
                    .unwrap_or_else(|_| Value::Text(v.to_string())),
            );
        }
        None
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Option<Value> {
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        row.try_get::<Option<f32>, _>(idx)
            .ok()
            .and_then(|v| float_value(v.map(f64::from)))
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Json)
    }
}

mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> Value {
        match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Err(_) => return Value::Null,
            Ok(_) => {}
        }

        let decoded = match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            _ => None,
        };
        decoded.unwrap_or_else(|| decode_text_unchecked(row, idx))
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> Option<Value> {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(v) => v.map(|d| Value::Text(d.0)),
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                None
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Option<Value> {
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return Some(Value::Int(v));
        }
        None
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
    }

    fn decode_float(row: &PgRow, idx: usize) -> Option<Value> {
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        row.try_get::<Option<f32>, _>(idx)
            .ok()
            .and_then(|v| float_value(v.map(f64::from)))
    }

    fn decode_binary(row: &PgRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
    }

    fn decode_json(row: &PgRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Json)
    }

    fn decode_temporal(row: &PgRow, idx: usize) -> Option<Value> {
        if let Ok(Some(v)) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
            return Some(Value::Text(v.to_rfc3339()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return Some(Value::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDate>, _>(idx) {
            return Some(Value::Text(v.to_string()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveTime>, _>(idx) {
            return Some(Value::Text(v.to_string()));
        }
        None
    }
}

mod sqlite {
    use super::*;

    /// Decode by the value's storage class (INTEGER, REAL, TEXT, BLOB, NULL).
    pub fn decode_column(row: &SqliteRow, idx: usize) -> Value {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Ok(raw) => raw.type_info().name().to_string(),
            Err(_) => return Value::Null,
        };

        match categorize_type(&storage, DriverKind::Sqlite) {
            TypeCategory::Integer => row
                .try_get_unchecked::<i64, _>(idx)
                .map(Value::Int)
                .unwrap_or(Value::Null),
            TypeCategory::Float => row
                .try_get_unchecked::<f64, _>(idx)
                .map(Value::Float)
                .unwrap_or(Value::Null),
            TypeCategory::Binary => row
                .try_get_unchecked::<Vec<u8>, _>(idx)
                .map(Value::Bytes)
                .unwrap_or(Value::Null),
            _ => decode_text_unchecked(row, idx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DriverKind::MySql),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT", DriverKind::Postgres),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("TINYINT", DriverKind::MySql),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INT4", DriverKind::Postgres),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INTEGER", DriverKind::Sqlite),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_tiny_non_integers() {
        assert_eq!(
            categorize_type("TINYBLOB", DriverKind::MySql),
            TypeCategory::Binary
        );
        assert_eq!(
            categorize_type("TINYTEXT", DriverKind::MySql),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("TINYINT UNSIGNED", DriverKind::MySql),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("POINT", DriverKind::Postgres),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", DriverKind::MySql),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", DriverKind::Postgres),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("numeric", DriverKind::Sqlite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(
            categorize_type("TIMESTAMPTZ", DriverKind::Postgres),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("DATETIME", DriverKind::MySql),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("DATE", DriverKind::Postgres),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("INTERVAL", DriverKind::Postgres),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_categorize_type_misc() {
        assert_eq!(
            categorize_type("jsonb", DriverKind::Postgres),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("BOOLEAN", DriverKind::MySql),
            TypeCategory::Boolean
        );
        assert_eq!(
            categorize_type("BLOB", DriverKind::Sqlite),
            TypeCategory::Binary
        );
        assert_eq!(
            categorize_type("REAL", DriverKind::Sqlite),
            TypeCategory::Float
        );
        assert_eq!(
            categorize_type("VARCHAR", DriverKind::MySql),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("UUID", DriverKind::Postgres),
            TypeCategory::Unknown
        );
    }
}
