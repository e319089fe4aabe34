//! Per-column value transforms.
//!
//! A column may carry a template whose rendering becomes the column's raw value before
//! coercion. Templates see the column name (`.Name`), the value read from the source
//! (`.Value`), the declared type (`.Type`) and the whole source row (`.Row`):
//!
//! ```text
//! {{ .Value | trim | upper }}
//! {{ printf "%s %s" .Row.first .Row.last }}
//! {{ index .Row "zip code" | default "00000" }}
//! ```
//!
//! The engine is pluggable through [`TemplateEngine`]; [`TextTemplateEngine`] is the
//! built-in implementation.

mod funcs;
mod template;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{ColumnSchema, ColumnType, Row, Value};

use funcs::Datum;
use template::{Node, Scope};

pub use funcs::FUNCTION_NAMES;

/// Error raised by a template engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("template parse error at offset {position}: {message}")]
    Parse { message: String, position: usize },

    #[error("function {0:?} not defined")]
    UndefinedFunction(String),

    #[error("error executing template: {0}")]
    Exec(String),
}

/// Everything a template can see while rendering one column of one row.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub name: &'a str,
    pub value: &'a Value,
    pub data_type: ColumnType,
    pub row: &'a Row,
}

/// A compiled template, shared across rows and threads.
pub trait Template: Send + Sync + fmt::Debug {
    fn render(&self, ctx: &TransformContext<'_>) -> Result<String, TemplateError>;

    fn source(&self) -> &str;
}

/// Compiles template sources into [`Template`]s.
pub trait TemplateEngine: Send + Sync {
    fn compile(&self, name: &str, source: &str) -> Result<Arc<dyn Template>, TemplateError>;
}

/// The built-in text-template engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextTemplateEngine;

impl TemplateEngine for TextTemplateEngine {
    fn compile(&self, name: &str, source: &str) -> Result<Arc<dyn Template>, TemplateError> {
        let nodes = template::parse(source)?;
        Ok(Arc::new(TextTemplate {
            name: name.to_string(),
            source: source.to_string(),
            nodes,
        }))
    }
}

#[derive(Debug)]
struct TextTemplate {
    name: String,
    source: String,
    nodes: Vec<Node>,
}

impl Template for TextTemplate {
    fn render(&self, ctx: &TransformContext<'_>) -> Result<String, TemplateError> {
        template::execute(&self.nodes, ctx).map_err(|e| match e {
            TemplateError::Exec(message) => TemplateError::Exec(format!("{}: {message}", self.name)),
            other => other,
        })
    }

    fn source(&self) -> &str {
        &self.source
    }
}

fn row_datum(row: &Row) -> Datum {
    Datum::Map(row.iter().map(|(k, v)| (k.to_string(), Datum::from(v))).collect())
}

impl Scope for TransformContext<'_> {
    fn dot(&self) -> Datum {
        Datum::Map(vec![
            ("Name".to_string(), Datum::Str(self.name.to_string())),
            ("Value".to_string(), Datum::from(self.value)),
            ("Type".to_string(), Datum::Str(self.data_type.as_str().to_string())),
            ("Row".to_string(), row_datum(self.row)),
        ])
    }

    fn field(&self, path: &[String]) -> Result<Datum, TemplateError> {
        let (head, tail) = match path.split_first() {
            Some(split) => split,
            None => return Ok(self.dot()),
        };
        match (head.as_str(), tail) {
            ("Name", []) => Ok(Datum::Str(self.name.to_string())),
            ("Value", []) => Ok(Datum::from(self.value)),
            ("Type", []) => Ok(Datum::Str(self.data_type.as_str().to_string())),
            ("Row", []) => Ok(row_datum(self.row)),
            // missing row fields render as nothing rather than failing
            ("Row", [field]) => Ok(self.row.get(field).map(Datum::from).unwrap_or(Datum::Null)),
            ("Name" | "Value" | "Type" | "Row", [next, ..]) => Err(TemplateError::Exec(format!(
                "can't evaluate field {next} in .{head}"
            ))),
            _ => Err(TemplateError::Exec(format!("can't evaluate field {head}"))),
        }
    }
}

/// Produce the raw value of `column` for `row`.
///
/// Without a template this is the row's value for the column (null when absent). With a
/// template the rendered text replaces it.
pub fn transform(
    column: &ColumnSchema,
    template: Option<&dyn Template>,
    row: &Row,
) -> PipelineResult<Value> {
    let value = row.get(&column.name).cloned().unwrap_or(Value::Null);
    let Some(template) = template else {
        return Ok(value);
    };
    let ctx = TransformContext {
        name: &column.name,
        value: &value,
        data_type: column.data_type,
        row,
    };
    template
        .render(&ctx)
        .map(Value::String)
        .map_err(|source| PipelineError::TransformRender {
            column: column.name.clone(),
            source,
        })
}
