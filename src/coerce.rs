//! Null/zero-value normalization and typed emission.
//!
//! [`coerce`] applies the nullability policy of a column: nulls are rejected for `notnull`
//! columns, and zero values (`""`, `0`, `false`) become null on nullable columns or the
//! declared type's zero value on `notnull` ones. [`conform`] then brings the value to the
//! declared column type.

use tracing::{debug, error};

use crate::error::{PipelineError, PipelineResult};
use crate::types::{ColumnSchema, ColumnType, Value};

/// Apply `column`'s nullability policy to `value`.
pub fn coerce(column: &ColumnSchema, value: Value) -> PipelineResult<Value> {
    if value.is_null() {
        if column.not_null {
            error!(column = %column.name, "invalid null value for non-nullable column");
            return Err(PipelineError::NotNullViolation {
                column: column.name.clone(),
            });
        }
        return Ok(Value::Null);
    }

    if value.is_zero() {
        if column.not_null {
            return Ok(column.data_type.zero_value());
        }
        debug!(column = %column.name, value = %value, "zero value on nullable column, emitting null");
        return Ok(Value::Null);
    }

    Ok(value)
}

/// Convert a coerced value to `column`'s declared type.
///
/// Null passes through. Text parses into `Int`/`Bool`, integral floats become `Int`, and
/// scalars render to text for `String` columns. Anything else is a [`PipelineError::TypeMismatch`].
pub fn conform(column: &ColumnSchema, value: Value) -> PipelineResult<Value> {
    let mismatch = |raw: &Value| PipelineError::TypeMismatch {
        column: column.name.clone(),
        expected: column.data_type.to_string(),
        raw: raw.to_string(),
    };

    match (column.data_type, value) {
        (_, Value::Null) => Ok(Value::Null),

        (ColumnType::String, Value::String(s)) => Ok(Value::String(s)),
        (ColumnType::String, other) => Ok(Value::String(other.to_string())),

        (ColumnType::Int, Value::Int(i)) => Ok(Value::Int(i)),
        (ColumnType::Int, Value::Float(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            Ok(Value::Int(f as i64))
        }
        (ColumnType::Int, Value::Bool(b)) => Ok(Value::Int(i64::from(b))),
        (ColumnType::Int, Value::String(s)) => parse_int(&s).ok_or_else(|| mismatch(&Value::String(s))),
        (ColumnType::Int, other) => Err(mismatch(&other)),

        (ColumnType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
        (ColumnType::Bool, Value::Int(i @ (0 | 1))) => Ok(Value::Bool(i == 1)),
        (ColumnType::Bool, Value::String(s)) => parse_bool(&s).ok_or_else(|| mismatch(&Value::String(s))),
        (ColumnType::Bool, other) => Err(mismatch(&other)),
    }
}

fn parse_int(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Int(i));
    }
    // "3.0" from a spreadsheet export still counts as an integer
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| Value::Int(f as i64))
}

fn parse_bool(s: &str) -> Option<Value> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(Value::Bool(true)),
        "false" | "f" | "no" | "n" | "0" => Some(Value::Bool(false)),
        _ => None,
    }
}
