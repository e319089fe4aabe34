//! Compile-time type resolution of filter expressions.
//!
//! Identifiers are resolved against an environment holding the table's zero-value row, so
//! `_.age` has the declared type of column `age` where it stands alone or under a unary
//! operator. As an operand of a binary operator or a function argument a row field is
//! [`Ty::Any`]: raw rows are untyped (CSV cells are text), so `_.age == "18"` must be
//! decided per row. Fields that are not declared columns are always [`Ty::Any`].

use crate::types::{Row, Value};

use super::FilterError;
use super::parser::{BinaryOperator, Expr, UnaryOperator};

/// Name under which the row is bound in the expression environment.
pub(crate) const ROW_IDENTIFIER: &str = "_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ty {
    Bool,
    Int,
    Float,
    String,
    Nil,
    Row,
    Array,
    Any,
}

impl Ty {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Nil,
            Value::String(_) => Self::String,
            Value::Int(_) => Self::Int,
            Value::Float(_) => Self::Float,
            Value::Bool(_) => Self::Bool,
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    fn accepts(self, other: Ty) -> bool {
        self == Ty::Any || other == Ty::Any || self == other
    }

    fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Nil => "nil",
            Self::Row => "map",
            Self::Array => "array",
            Self::Any => "interface",
        }
    }
}

/// Signature of a helper function: arity and result type.
pub(crate) fn function_signature(name: &str) -> Option<(usize, Ty)> {
    match name {
        "string" => Some((1, Ty::String)),
        "int" => Some((1, Ty::Int)),
        "float" => Some((1, Ty::Float)),
        "len" => Some((1, Ty::Int)),
        "lower" | "upper" | "trim" => Some((1, Ty::String)),
        _ => None,
    }
}

pub(crate) struct TypeChecker<'a> {
    template_row: &'a Row,
}

impl<'a> TypeChecker<'a> {
    pub(crate) fn new(template_row: &'a Row) -> Self {
        Self { template_row }
    }

    /// Check that `expr` is well-typed and can produce a boolean.
    pub(crate) fn check_predicate(&self, expr: &Expr) -> Result<(), FilterError> {
        match self.infer(expr)? {
            Ty::Bool | Ty::Any => Ok(()),
            other => Err(FilterError::NotBoolean(format!(
                "expected bool, but got {}",
                other.name()
            ))),
        }
    }

    pub(crate) fn infer(&self, expr: &Expr) -> Result<Ty, FilterError> {
        match expr {
            Expr::Literal(v) => Ok(Ty::of(v)),
            Expr::Identifier(name) if name == ROW_IDENTIFIER => Ok(Ty::Row),
            Expr::Identifier(name) => Err(FilterError::UnknownIdentifier(name.clone())),
            Expr::Member { object, field } => self.field_type(object, field),
            Expr::Index { object, index } => {
                let object_ty = self.infer(object)?;
                let index_ty = self.infer(index)?;
                match object_ty {
                    Ty::Row => match index.as_ref() {
                        Expr::Literal(Value::String(field)) => self.field_type(object, field),
                        _ if index_ty.accepts(Ty::String) => Ok(Ty::Any),
                        _ => Err(type_error(format!(
                            "cannot index map with {}",
                            index_ty.name()
                        ))),
                    },
                    Ty::Any => Ok(Ty::Any),
                    Ty::Array if index_ty.accepts(Ty::Int) => Ok(Ty::Any),
                    Ty::String if index_ty.accepts(Ty::Int) => Ok(Ty::String),
                    other => Err(type_error(format!(
                        "cannot index {} with {}",
                        other.name(),
                        index_ty.name()
                    ))),
                }
            }
            Expr::Unary { op, expr } => {
                let ty = self.infer(expr)?;
                match op {
                    UnaryOperator::Not if ty.accepts(Ty::Bool) => Ok(Ty::Bool),
                    UnaryOperator::Negate if ty.is_numeric() || ty == Ty::Any => Ok(ty),
                    UnaryOperator::Not => Err(type_error(format!("invalid operation: ! ({})", ty.name()))),
                    UnaryOperator::Negate => Err(type_error(format!("invalid operation: - ({})", ty.name()))),
                }
            }
            Expr::Binary { op, left, right } => {
                let l = self.operand(left)?;
                let r = self.operand(right)?;
                binary_type(*op, l, r)
            }
            Expr::Call { name, args } => {
                let (arity, result) =
                    function_signature(name).ok_or_else(|| FilterError::UnknownFunction(name.clone()))?;
                if args.len() != arity {
                    return Err(FilterError::Arity {
                        function: name.clone(),
                        expected: arity,
                        actual: args.len(),
                    });
                }
                for arg in args {
                    let ty = self.operand(arg)?;
                    if matches!(name.as_str(), "lower" | "upper" | "trim") && !ty.accepts(Ty::String) {
                        return Err(type_error(format!(
                            "{name}() expects a string argument, got {}",
                            ty.name()
                        )));
                    }
                }
                Ok(result)
            }
            Expr::Array(items) => {
                for item in items {
                    self.infer(item)?;
                }
                Ok(Ty::Array)
            }
        }
    }

    /// Type of `expr` used as an operand; row fields are dynamic there.
    fn operand(&self, expr: &Expr) -> Result<Ty, FilterError> {
        let ty = self.infer(expr)?;
        let object = match expr {
            Expr::Member { object, .. } | Expr::Index { object, .. } => Some(object),
            _ => None,
        };
        let row_field = match object {
            Some(object) => self.infer(object)? == Ty::Row,
            None => false,
        };
        Ok(if row_field { Ty::Any } else { ty })
    }

    fn field_type(&self, object: &Expr, field: &str) -> Result<Ty, FilterError> {
        match self.infer(object)? {
            Ty::Row => Ok(self
                .template_row
                .get(field)
                .map(Ty::of)
                .unwrap_or(Ty::Any)),
            Ty::Any => Ok(Ty::Any),
            other => Err(type_error(format!(
                "type {} has no field {field}",
                other.name()
            ))),
        }
    }
}

fn type_error(message: String) -> FilterError {
    FilterError::Type(message)
}

fn binary_type(op: BinaryOperator, l: Ty, r: Ty) -> Result<Ty, FilterError> {
    let mismatch = || {
        type_error(format!(
            "invalid operation: {} (mismatched types {} and {})",
            op.symbol(),
            l.name(),
            r.name()
        ))
    };
    let any = l == Ty::Any || r == Ty::Any;

    match op {
        BinaryOperator::Or | BinaryOperator::And => {
            if l.accepts(Ty::Bool) && r.accepts(Ty::Bool) {
                Ok(Ty::Bool)
            } else {
                Err(mismatch())
            }
        }
        BinaryOperator::Equal | BinaryOperator::NotEqual => {
            let comparable = any
                || l == Ty::Nil
                || r == Ty::Nil
                || l == r
                || (l.is_numeric() && r.is_numeric());
            if comparable { Ok(Ty::Bool) } else { Err(mismatch()) }
        }
        BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => {
            let ordered = ((l.is_numeric() || l == Ty::Any) && (r.is_numeric() || r == Ty::Any))
                || (l.accepts(Ty::String) && r.accepts(Ty::String));
            if ordered { Ok(Ty::Bool) } else { Err(mismatch()) }
        }
        BinaryOperator::In | BinaryOperator::NotIn => match r {
            Ty::Array | Ty::Any => Ok(Ty::Bool),
            Ty::Row | Ty::String if l.accepts(Ty::String) => Ok(Ty::Bool),
            _ => Err(mismatch()),
        },
        BinaryOperator::Contains | BinaryOperator::StartsWith | BinaryOperator::EndsWith => {
            if l.accepts(Ty::String) && r.accepts(Ty::String) {
                Ok(Ty::Bool)
            } else {
                Err(mismatch())
            }
        }
        BinaryOperator::Add if l == Ty::String && r == Ty::String => Ok(Ty::String),
        BinaryOperator::Add | BinaryOperator::Subtract | BinaryOperator::Multiply => {
            let operand = |t: Ty| t.is_numeric() || t == Ty::Any || (t == Ty::String && op == BinaryOperator::Add);
            if any && operand(l) && operand(r) {
                Ok(Ty::Any)
            } else if l == Ty::Int && r == Ty::Int {
                Ok(Ty::Int)
            } else if l.is_numeric() && r.is_numeric() {
                Ok(Ty::Float)
            } else {
                Err(mismatch())
            }
        }
        BinaryOperator::Divide => {
            if (l.is_numeric() || l == Ty::Any) && (r.is_numeric() || r == Ty::Any) {
                Ok(Ty::Float)
            } else {
                Err(mismatch())
            }
        }
        BinaryOperator::Modulo => {
            if l.accepts(Ty::Int) && r.accepts(Ty::Int) {
                Ok(Ty::Int)
            } else {
                Err(mismatch())
            }
        }
    }
}
