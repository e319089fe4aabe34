//! Declarative table configuration.
//!
//! A [`SourceSpec`] names a file, its format, and the root [`TableSpec`] read from it. Specs
//! are plain serde structs and can be loaded from YAML or JSON:
//!
//! ```rust
//! use rust_file_tables::spec::SourceSpec;
//!
//! let spec = SourceSpec::from_yaml_str(r#"
//! file: people.csv
//! format: csv
//! table:
//!   name: people
//!   filter: '_.active == "true"'
//!   columns:
//!     - { name: id, type: int, pk: true }
//!     - { name: name, type: string, transform: "{{ .Value | upper }}" }
//!     - { name: active, type: bool }
//!   relations:
//!     - name: admins
//!       filter: '_.role == "admin"'
//!       columns:
//!         - { name: id, type: int }
//! "#).unwrap();
//! assert_eq!(spec.table.columns.len(), 3);
//! assert_eq!(spec.table.relations[0].name, "admins");
//! ```
//!
//! Specs are never mutated by compilation; see [`crate::schema::compile_source`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Declarative description of one column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared type name; see [`crate::types::ColumnType::from_alias`].
    #[serde(default, rename = "type")]
    pub data_type: String,
    #[serde(default, alias = "pk")]
    pub key: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, rename = "notnull", alias = "not_null")]
    pub not_null: bool,
    /// Optional transform template source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            ..Default::default()
        }
    }

    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.key = true;
        self
    }
}

/// Declarative description of one table (root or relation).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional admission filter expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    /// Sub-tables re-filtering each row of this table. Only root tables may have them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<TableSpec>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name: name.into(),
            columns,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_relation(mut self, relation: TableSpec) -> Self {
        self.relations.push(relation);
        self
    }
}

/// A file and the table read from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub file: PathBuf,
    /// Format tag (`json`, `yaml`/`yml`, `csv`, `xlsx`/`xls`/`excel`), case-insensitive.
    pub format: String,
    /// CSV field separator; defaults to `,`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    /// Spreadsheet sheets to read, in order; defaults to the workbook's first sheet.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sheets: Vec<String>,
    pub table: TableSpec,
}

impl SourceSpec {
    pub fn new(file: impl Into<PathBuf>, format: impl Into<String>, table: TableSpec) -> Self {
        Self {
            file: file.into(),
            format: format.into(),
            table,
            ..Default::default()
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    pub fn with_sheets(mut self, sheets: Vec<String>) -> Self {
        self.sheets = sheets;
        self
    }

    pub fn from_yaml_str(input: &str) -> PipelineResult<Self> {
        Ok(serde_yaml::from_str(input)?)
    }

    pub fn from_json_str(input: &str) -> PipelineResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Load a spec file; `.json` is parsed as JSON, `.yaml`/`.yml` as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase());
        match ext.as_deref() {
            Some("json") => Self::from_json_str(&text),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            _ => Err(PipelineError::invalid_spec(format!(
                "cannot infer spec format from path ({})",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_accepts_legacy_column_keys() {
        let spec = SourceSpec::from_yaml_str(
            r#"
file: data.xlsx
format: XLSX
sheets: [First, Second]
table:
  name: t
  columns:
    - { name: id, type: i, pk: true, notnull: true, unique: true }
"#,
        )
        .unwrap();
        let col = &spec.table.columns[0];
        assert!(col.key && col.not_null && col.unique);
        assert_eq!(spec.sheets, vec!["First".to_string(), "Second".to_string()]);
        assert!(spec.separator.is_none());
    }

    #[test]
    fn json_spec_uses_same_shape() {
        let spec = SourceSpec::from_json_str(
            r#"{"file":"a.csv","format":"csv","separator":";",
                "table":{"name":"t","columns":[{"name":"a","type":"string","key":true}]}}"#,
        )
        .unwrap();
        assert_eq!(spec.separator.as_deref(), Some(";"));
        assert!(spec.table.columns[0].key);
    }

    #[test]
    fn from_path_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.toml");
        fs::write(&path, "file = 'x'").unwrap();
        let err = SourceSpec::from_path(&path).unwrap_err();
        assert!(err.to_string().contains("cannot infer spec format"));
    }
}
