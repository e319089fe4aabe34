//! JSON and YAML decoding.
//!
//! Supported inputs:
//! - A JSON array of objects: `[{"a":1}, {"a":2}]`
//! - A single JSON object: `{"a":1}`
//! - Newline-delimited JSON (NDJSON): `{"a":1}\n{"a":2}\n`
//! - A YAML sequence of mappings, or a single mapping
//!
//! Documents are decoded in full before the first row is emitted. Nested arrays and objects
//! are kept as their JSON text.

use std::fs;
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{Row, Value};

use super::format::ReadStats;

pub fn read_json_rows(
    path: &Path,
    visit: &mut dyn FnMut(Row) -> PipelineResult<()>,
) -> PipelineResult<ReadStats> {
    let text = fs::read_to_string(path)?;
    let values = parse_json_str(&text)?;
    emit_objects(values, visit)
}

pub fn read_yaml_rows(
    path: &Path,
    visit: &mut dyn FnMut(Row) -> PipelineResult<()>,
) -> PipelineResult<ReadStats> {
    let text = fs::read_to_string(path)?;
    let values = parse_yaml_str(&text)?;
    emit_objects(values, visit)
}

pub type Object = serde_json::Map<String, serde_json::Value>;

/// Parse JSON text into a list of objects (array items, one object, or NDJSON lines).
pub fn parse_json_str(input: &str) -> PipelineResult<Vec<Object>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    // First try parsing as a single JSON value (array or object).
    let documents = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(v) => vec![v],
        Err(first_err) => {
            // Fall back to NDJSON; a single-line document keeps the original error.
            if !trimmed.contains('\n') {
                return Err(first_err.into());
            }
            trimmed
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(serde_json::from_str::<serde_json::Value>)
                .collect::<Result<_, _>>()?
        }
    };
    into_objects(documents, |msg| {
        <serde_json::Error as serde::de::Error>::custom(msg).into()
    })
}

/// Parse YAML text into a list of objects (sequence items or one mapping).
pub fn parse_yaml_str(input: &str) -> PipelineResult<Vec<Object>> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    let documents = match serde_yaml::from_str::<serde_json::Value>(input)? {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Null => Vec::new(),
        v => vec![v],
    };
    into_objects(documents, |msg| {
        <serde_yaml::Error as serde::de::Error>::custom(msg).into()
    })
}

fn into_objects(
    documents: Vec<serde_json::Value>,
    error: impl Fn(String) -> PipelineError,
) -> PipelineResult<Vec<Object>> {
    documents
        .into_iter()
        .enumerate()
        .map(|(idx0, v)| match v {
            serde_json::Value::Object(obj) => Ok(obj),
            other => Err(error(format!(
                "row {} is not an object (got {})",
                idx0 + 1,
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn emit_objects(
    objects: Vec<Object>,
    visit: &mut dyn FnMut(Row) -> PipelineResult<()>,
) -> PipelineResult<ReadStats> {
    let mut stats = ReadStats::default();
    for obj in objects {
        let row: Row = obj.iter().map(|(k, v)| (k.as_str(), Value::from_json(v))).collect();
        stats.rows_read += 1;
        visit(row)?;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: Vec<Object>) -> Vec<Row> {
        let mut out = Vec::new();
        emit_objects(values, &mut |row| {
            out.push(row);
            Ok(())
        })
        .unwrap();
        out
    }

    #[test]
    fn array_object_and_ndjson_inputs() {
        assert_eq!(parse_json_str(r#"[{"a":1},{"a":2}]"#).unwrap().len(), 2);
        assert_eq!(parse_json_str(r#"{"a":1}"#).unwrap().len(), 1);
        assert_eq!(parse_json_str("{\"a\":1}\n\n{\"a\":2}\n").unwrap().len(), 2);
        assert!(parse_json_str("   ").unwrap().is_empty());
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let err = parse_json_str(r#"[{"a":1}"#).unwrap_err();
        assert!(matches!(err, PipelineError::Json(_)));
        assert!(err.to_string().starts_with("error unmarshalling data from JSON"));
    }

    #[test]
    fn values_keep_their_decoded_types() {
        let r = rows(parse_json_str(r#"[{"i":3,"f":1.5,"s":"x","b":true,"n":null,"o":{"k":1}}]"#).unwrap());
        assert_eq!(r[0].get("i"), Some(&Value::Int(3)));
        assert_eq!(r[0].get("f"), Some(&Value::Float(1.5)));
        assert_eq!(r[0].get("b"), Some(&Value::Bool(true)));
        assert_eq!(r[0].get("n"), Some(&Value::Null));
        assert_eq!(r[0].get("o"), Some(&Value::from(r#"{"k":1}"#)));
    }

    #[test]
    fn yaml_sequences_and_mappings() {
        let r = rows(parse_yaml_str("- name: ada\n  age: 36\n- name: grace\n").unwrap());
        assert_eq!(r.len(), 2);
        assert_eq!(r[0].get("age"), Some(&Value::Int(36)));
        assert_eq!(r[1].get("age"), None);
        assert_eq!(parse_yaml_str("name: solo\n").unwrap().len(), 1);
        assert!(matches!(parse_yaml_str("- [unclosed"), Err(PipelineError::Yaml(_))));
    }

    #[test]
    fn non_object_documents_are_rejected() {
        let err = parse_json_str("[1, 2]").unwrap_err();
        assert!(matches!(err, PipelineError::Json(_)));
        assert!(err.to_string().contains("row 1 is not an object"));
        assert!(matches!(parse_yaml_str("- 1\n"), Err(PipelineError::Yaml(_))));
    }
}
