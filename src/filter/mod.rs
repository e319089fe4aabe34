//! Row admission filters.
//!
//! A filter is a boolean expression over the row, bound as `_`:
//!
//! ```text
//! _.age >= 18 && _.status in ["active", "pending"]
//! lower(_["first name"]) startsWith "a"
//! int(_.count) % 2 == 0
//! ```
//!
//! Expressions are compiled once per table with [`Predicate::compile`], which resolves field
//! types against the table's zero-value row, and evaluated once per row with [`admit`].
//! Evaluation failures never abort a fetch: the row is rejected and the problem logged.

mod check;
mod eval;
mod lexer;
mod parser;

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{Row, Value};

use check::TypeChecker;
use eval::Operand;
use parser::Expr;

/// Error raised while compiling or evaluating a filter expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("syntax error at offset {position}: {message}")]
    Syntax { message: String, position: usize },

    #[error("unknown name {0}")]
    UnknownIdentifier(String),

    #[error("unknown function {0}()")]
    UnknownFunction(String),

    #[error("{function}() expects {expected} argument(s), got {actual}")]
    Arity {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("{0}")]
    Type(String),

    #[error("expression does not evaluate to bool: {0}")]
    NotBoolean(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

/// A compiled admission predicate.
///
/// Immutable once compiled; safe to share between concurrent fetches of the same table.
#[derive(Clone, PartialEq)]
pub struct Predicate {
    source: String,
    expr: Expr,
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").field("source", &self.source).finish()
    }
}

impl Predicate {
    /// Parse `source` and type-check it against `template_row`.
    ///
    /// `template_row` carries one zero value per declared column; it is only used to resolve
    /// identifier types and is never evaluated against.
    pub fn compile(source: &str, template_row: &Row) -> Result<Self, FilterError> {
        let expr = parser::parse(source)?;
        TypeChecker::new(template_row).check_predicate(&expr)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against `row`; anything but a boolean result is an error.
    pub fn evaluate(&self, row: &Row) -> Result<bool, FilterError> {
        match eval::evaluate(&self.expr, row)? {
            Operand::Value(Value::Bool(b)) => Ok(b),
            Operand::Value(v) => Err(FilterError::NotBoolean(format!(
                "expected bool, but got {}",
                v.type_name()
            ))),
            Operand::Row(_) => Err(FilterError::NotBoolean("expected bool, but got map".to_string())),
            Operand::Array(_) => Err(FilterError::NotBoolean("expected bool, but got array".to_string())),
        }
    }
}

/// Decide whether `row` is admitted.
///
/// No predicate admits everything. Evaluation errors and non-boolean results reject the row.
pub fn admit(table: &str, predicate: Option<&Predicate>, row: &Row) -> bool {
    let Some(predicate) = predicate else {
        return true;
    };
    match predicate.evaluate(row) {
        Ok(true) => {
            debug!(table, filter = predicate.source(), "accepting row");
            true
        }
        Ok(false) => {
            debug!(table, filter = predicate.source(), "rejecting row");
            false
        }
        Err(err) => {
            warn!(table, filter = predicate.source(), error = %err, "error running filter, rejecting row");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Row {
        [("age", Value::Int(0)), ("status", Value::String(String::new()))]
            .into_iter()
            .collect()
    }

    fn row(age: Value) -> Row {
        [("age", age), ("status", Value::from("active"))].into_iter().collect()
    }

    #[test]
    fn admits_only_matching_rows() {
        let p = Predicate::compile("_.age >= 18", &template()).unwrap();
        assert!(!admit("t", Some(&p), &row(Value::Int(17))));
        assert!(admit("t", Some(&p), &row(Value::Int(18))));
    }

    #[test]
    fn no_predicate_admits_everything() {
        assert!(admit("t", None, &row(Value::Null)));
    }

    #[test]
    fn runtime_errors_reject() {
        let p = Predicate::compile("_.age >= 18", &template()).unwrap();
        // CSV-style string value cannot be ordered against an int
        assert!(!admit("t", Some(&p), &row(Value::from("20"))));
        assert!(!admit("t", Some(&p), &row(Value::Null)));
    }

    #[test]
    fn dynamic_non_boolean_result_rejects() {
        let p = Predicate::compile("_.extra", &template()).unwrap();
        let mut r = row(Value::Int(1));
        r.insert("extra", Value::Int(5));
        assert!(matches!(p.evaluate(&r), Err(FilterError::NotBoolean(_))));
        assert!(!admit("t", Some(&p), &r));
    }

    #[test]
    fn compile_errors_are_reported() {
        assert!(matches!(
            Predicate::compile("_.age >=", &template()),
            Err(FilterError::Syntax { .. })
        ));
        assert!(matches!(
            Predicate::compile("int(_.age) + 1", &template()),
            Err(FilterError::NotBoolean(_))
        ));
    }
}
