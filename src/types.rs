//! Core data model types for the row pipeline.
//!
//! Decoders produce loosely-typed [`Row`]s; compiled tables describe their output with a
//! [`TableSchema`] (a list of typed [`ColumnSchema`]s) and emit [`TableRow`]s whose values
//! follow that schema's column order.

use std::fmt;
use std::sync::Arc;

/// Declared type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// UTF-8 string.
    String,
    /// 64-bit signed integer.
    Int,
    /// Boolean.
    Bool,
}

impl ColumnType {
    /// Resolve a declared type name (case-insensitive).
    ///
    /// Unknown names degrade to [`ColumnType::String`]; this never fails.
    pub fn from_alias(alias: &str) -> Self {
        match alias.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "s" => Self::String,
            "integer" | "int" | "i" => Self::Int,
            "boolean" | "bool" | "b" => Self::Bool,
            _ => Self::String,
        }
    }

    /// Returns `true` if `alias` names one of the known types.
    pub fn is_known_alias(alias: &str) -> bool {
        matches!(
            alias.trim().to_ascii_lowercase().as_str(),
            "string" | "str" | "s" | "integer" | "int" | "i" | "boolean" | "bool" | "b"
        )
    }

    /// The representative zero value for this type (`""`, `0`, `false`).
    pub fn zero_value(self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Int => Value::Int(0),
            Self::Bool => Value::Bool(false),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single dynamically-typed scalar, as decoded from a source file or emitted to a sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/explicitly empty value.
    Null,
    /// UTF-8 string.
    String(String),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float (only produced by decoders; columns never declare it).
    Float(f64),
    /// Boolean.
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` for the zero value of the value's own type: `""`, `0`, `0.0`, `false`.
    ///
    /// `Null` is not a zero value; callers check nullness separately.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => false,
            Self::String(s) => s.is_empty(),
            Self::Int(i) => *i == 0,
            Self::Float(f) => *f == 0.0,
            Self::Bool(b) => !*b,
        }
    }

    /// Short type label used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "nil",
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Convert a decoded JSON value into a scalar.
    ///
    /// Nested arrays and objects are kept as their JSON text.
    pub fn from_json(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    n.as_f64().map(Self::Float).unwrap_or(Self::Null)
                }
            }
            serde_json::Value::String(s) => Self::String(s.clone()),
            other => Self::String(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    /// Text rendering; `Null` renders as the empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::String(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// One decoded source row: field name -> value, in source order.
///
/// Field names are unique; inserting an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            fields: Vec::with_capacity(n),
        }
    }

    /// Set `name` to `value`, keeping the original position if the name already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

/// Externally visible descriptor of one output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: ColumnType,
    pub description: String,
    pub primary_key: bool,
    pub unique: bool,
    pub not_null: bool,
}

impl ColumnSchema {
    /// Create a nullable, non-key column with the default description.
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        let name = name.into();
        Self {
            description: default_column_description(&name),
            name,
            data_type,
            primary_key: false,
            unique: false,
            not_null: false,
        }
    }
}

pub(crate) fn default_column_description(name: &str) -> String {
    format!("The column mapping the {name:?} field from the input data")
}

/// Schema of one output table (root table or relation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub description: String,
    /// Name of the parent table when this table is a relation.
    pub parent: Option<String>,
    /// Ordered list of columns.
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Returns the index of a column by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Iterate column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// A fully resolved row, ready for the consumer.
///
/// `values` follow the order of `schema.columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub schema: Arc<TableSchema>,
    pub values: Vec<Value>,
}

impl TableRow {
    pub fn table(&self) -> &str {
        &self.schema.name
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.schema.index_of(column).and_then(|i| self.values.get(i))
    }

    /// Column-name -> value projection.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema.column_names().zip(self.values.iter())
    }
}

/// In-memory collection of the rows emitted for one table.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the schema columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    pub schema: Arc<TableSchema>,
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    pub fn new(schema: Arc<TableSchema>, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Value at (`row`, `column`), if both exist.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.schema.index_of(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// All values of one column, in row order.
    pub fn column(&self, column: &str) -> Option<Vec<&Value>> {
        let idx = self.schema.index_of(column)?;
        Some(self.rows.iter().filter_map(|r| r.get(idx)).collect())
    }
}
