//! Evaluation of compiled filter expressions against a decoded row.
//!
//! Raw rows are loosely typed (a CSV field is always a string), so every operator re-checks
//! its operand types here and reports a [`FilterError::Runtime`] on mismatch.

use std::cmp::Ordering;

use crate::types::{Row, Value};

use super::FilterError;
use super::check::ROW_IDENTIFIER;
use super::parser::{BinaryOperator, Expr, UnaryOperator};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand<'r> {
    Value(Value),
    Row(&'r Row),
    Array(Vec<Operand<'r>>),
}

impl Operand<'_> {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Value(v) => v.type_name(),
            Self::Row(_) => "map",
            Self::Array(_) => "array",
        }
    }

    fn as_bool(&self, context: &str) -> Result<bool, FilterError> {
        match self {
            Self::Value(Value::Bool(b)) => Ok(*b),
            other => Err(runtime(format!(
                "{context}: expected bool, got {}",
                other.type_name()
            ))),
        }
    }

    fn as_str(&self, context: &str) -> Result<&str, FilterError> {
        match self {
            Self::Value(Value::String(s)) => Ok(s),
            other => Err(runtime(format!(
                "{context}: expected string, got {}",
                other.type_name()
            ))),
        }
    }

    fn to_text(&self) -> String {
        match self {
            Self::Value(v) => v.to_string(),
            Self::Row(row) => {
                let parts: Vec<String> = row.iter().map(|(k, v)| format!("{k}:{v}")).collect();
                format!("map[{}]", parts.join(" "))
            }
            Self::Array(items) => {
                let parts: Vec<String> = items.iter().map(Operand::to_text).collect();
                format!("[{}]", parts.join(" "))
            }
        }
    }
}

fn runtime(message: String) -> FilterError {
    FilterError::Runtime(message)
}

pub(crate) fn evaluate<'r>(expr: &Expr, row: &'r Row) -> Result<Operand<'r>, FilterError> {
    match expr {
        Expr::Literal(v) => Ok(Operand::Value(v.clone())),
        Expr::Identifier(name) if name == ROW_IDENTIFIER => Ok(Operand::Row(row)),
        Expr::Identifier(name) => Err(FilterError::UnknownIdentifier(name.clone())),
        Expr::Member { object, field } => member(evaluate(object, row)?, field),
        Expr::Index { object, index } => {
            let object = evaluate(object, row)?;
            match evaluate(index, row)? {
                Operand::Value(Value::String(field)) => member(object, &field),
                Operand::Value(Value::Int(i)) => element(object, i),
                other => Err(runtime(format!("cannot use {} as index", other.type_name()))),
            }
        }
        Expr::Unary { op, expr } => {
            let operand = evaluate(expr, row)?;
            match (*op, operand) {
                (UnaryOperator::Not, operand) => Ok(Operand::Value(Value::Bool(!operand.as_bool("!")?))),
                (UnaryOperator::Negate, Operand::Value(Value::Int(i))) => i
                    .checked_neg()
                    .map(|n| Operand::Value(Value::Int(n)))
                    .ok_or_else(|| runtime("integer overflow".to_string())),
                (UnaryOperator::Negate, Operand::Value(Value::Float(f))) => Ok(Operand::Value(Value::Float(-f))),
                (UnaryOperator::Negate, other) => Err(runtime(format!(
                    "invalid operation: - ({})",
                    other.type_name()
                ))),
            }
        }
        Expr::Binary {
            op: BinaryOperator::And,
            left,
            right,
        } => {
            if !evaluate(left, row)?.as_bool("&&")? {
                return Ok(Operand::Value(Value::Bool(false)));
            }
            let r = evaluate(right, row)?.as_bool("&&")?;
            Ok(Operand::Value(Value::Bool(r)))
        }
        Expr::Binary {
            op: BinaryOperator::Or,
            left,
            right,
        } => {
            if evaluate(left, row)?.as_bool("||")? {
                return Ok(Operand::Value(Value::Bool(true)));
            }
            let r = evaluate(right, row)?.as_bool("||")?;
            Ok(Operand::Value(Value::Bool(r)))
        }
        Expr::Binary { op, left, right } => {
            let l = evaluate(left, row)?;
            let r = evaluate(right, row)?;
            binary(*op, l, r)
        }
        Expr::Call { name, args } => {
            let args = args
                .iter()
                .map(|a| evaluate(a, row))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, args)
        }
        Expr::Array(items) => items
            .iter()
            .map(|i| evaluate(i, row))
            .collect::<Result<Vec<_>, _>>()
            .map(Operand::Array),
    }
}

fn member<'r>(object: Operand<'r>, field: &str) -> Result<Operand<'r>, FilterError> {
    match object {
        // a missing key reads as nil, like any map lookup
        Operand::Row(row) => Ok(Operand::Value(row.get(field).cloned().unwrap_or(Value::Null))),
        other => Err(runtime(format!(
            "cannot fetch {field} from {}",
            other.type_name()
        ))),
    }
}

fn element(object: Operand<'_>, index: i64) -> Result<Operand<'_>, FilterError> {
    let out_of_range = || runtime(format!("index out of range: {index}"));
    match object {
        Operand::Array(items) => {
            let len = items.len() as i64;
            let idx = if index < 0 { len + index } else { index };
            if idx < 0 || idx >= len {
                return Err(out_of_range());
            }
            Ok(items.into_iter().nth(idx as usize).ok_or_else(out_of_range)?)
        }
        Operand::Value(Value::String(s)) => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let idx = if index < 0 { len + index } else { index };
            if idx < 0 || idx >= len {
                return Err(out_of_range());
            }
            Ok(Operand::Value(Value::String(chars[idx as usize].to_string())))
        }
        other => Err(runtime(format!("cannot index {}", other.type_name()))),
    }
}

fn values_equal(l: &Operand<'_>, r: &Operand<'_>) -> bool {
    match (l, r) {
        (Operand::Value(a), Operand::Value(b)) => match (a, b) {
            (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
            _ => a == b,
        },
        (Operand::Array(a), Operand::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Operand::Row(a), Operand::Row(b)) => a == b,
        _ => false,
    }
}

fn compare(op: BinaryOperator, l: &Operand<'_>, r: &Operand<'_>) -> Result<Ordering, FilterError> {
    let ordering = match (l, r) {
        (Operand::Value(Value::Int(a)), Operand::Value(Value::Int(b))) => Some(a.cmp(b)),
        (Operand::Value(Value::Int(a)), Operand::Value(Value::Float(b))) => (*a as f64).partial_cmp(b),
        (Operand::Value(Value::Float(a)), Operand::Value(Value::Int(b))) => a.partial_cmp(&(*b as f64)),
        (Operand::Value(Value::Float(a)), Operand::Value(Value::Float(b))) => a.partial_cmp(b),
        (Operand::Value(Value::String(a)), Operand::Value(Value::String(b))) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.ok_or_else(|| {
        runtime(format!(
            "invalid operation: {} (mismatched types {} and {})",
            op.symbol(),
            l.type_name(),
            r.type_name()
        ))
    })
}

fn contains(haystack: &Operand<'_>, needle: &Operand<'_>) -> Result<bool, FilterError> {
    match haystack {
        Operand::Array(items) => Ok(items.iter().any(|i| values_equal(i, needle))),
        Operand::Row(row) => Ok(row.contains_key(needle.as_str("in")?)),
        Operand::Value(Value::String(s)) => Ok(s.contains(needle.as_str("in")?)),
        other => Err(runtime(format!(
            "invalid operation: in (right operand is {})",
            other.type_name()
        ))),
    }
}

fn arithmetic(op: BinaryOperator, l: Operand<'_>, r: Operand<'_>) -> Result<Value, FilterError> {
    let overflow = || runtime("integer overflow".to_string());
    match (op, l, r) {
        (BinaryOperator::Add, Operand::Value(Value::String(a)), Operand::Value(Value::String(b))) => {
            Ok(Value::String(a + &b))
        }
        (BinaryOperator::Divide, Operand::Value(a), Operand::Value(b)) => {
            let (a, b) = (as_f64(&a, op)?, as_f64(&b, op)?);
            if b == 0.0 {
                return Err(runtime("integer divide by zero".to_string()));
            }
            Ok(Value::Float(a / b))
        }
        (BinaryOperator::Modulo, Operand::Value(Value::Int(a)), Operand::Value(Value::Int(b))) => {
            if b == 0 {
                return Err(runtime("integer divide by zero".to_string()));
            }
            a.checked_rem(b).map(Value::Int).ok_or_else(overflow)
        }
        (op, Operand::Value(Value::Int(a)), Operand::Value(Value::Int(b))) => match op {
            BinaryOperator::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
            BinaryOperator::Subtract => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
            BinaryOperator::Multiply => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
            _ => Err(runtime(format!("invalid operation: {} (int and int)", op.symbol()))),
        },
        (op @ (BinaryOperator::Add | BinaryOperator::Subtract | BinaryOperator::Multiply), Operand::Value(a), Operand::Value(b)) => {
            let (a, b) = (as_f64(&a, op)?, as_f64(&b, op)?);
            Ok(Value::Float(match op {
                BinaryOperator::Add => a + b,
                BinaryOperator::Subtract => a - b,
                _ => a * b,
            }))
        }
        (op, l, r) => Err(runtime(format!(
            "invalid operation: {} (mismatched types {} and {})",
            op.symbol(),
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn as_f64(v: &Value, op: BinaryOperator) -> Result<f64, FilterError> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        other => Err(runtime(format!(
            "invalid operation: {} on {}",
            op.symbol(),
            other.type_name()
        ))),
    }
}

fn binary<'r>(op: BinaryOperator, l: Operand<'r>, r: Operand<'r>) -> Result<Operand<'r>, FilterError> {
    let boolean = |b: bool| Ok(Operand::Value(Value::Bool(b)));
    match op {
        BinaryOperator::Equal => boolean(values_equal(&l, &r)),
        BinaryOperator::NotEqual => boolean(!values_equal(&l, &r)),
        BinaryOperator::LessThan => boolean(compare(op, &l, &r)? == Ordering::Less),
        BinaryOperator::LessThanOrEqual => boolean(compare(op, &l, &r)? != Ordering::Greater),
        BinaryOperator::GreaterThan => boolean(compare(op, &l, &r)? == Ordering::Greater),
        BinaryOperator::GreaterThanOrEqual => boolean(compare(op, &l, &r)? != Ordering::Less),
        BinaryOperator::In => boolean(contains(&r, &l)?),
        BinaryOperator::NotIn => boolean(!contains(&r, &l)?),
        BinaryOperator::Contains => boolean(l.as_str("contains")?.contains(r.as_str("contains")?)),
        BinaryOperator::StartsWith => boolean(l.as_str("startsWith")?.starts_with(r.as_str("startsWith")?)),
        BinaryOperator::EndsWith => boolean(l.as_str("endsWith")?.ends_with(r.as_str("endsWith")?)),
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Modulo => arithmetic(op, l, r).map(Operand::Value),
        // short-circuit forms are handled in `evaluate`
        BinaryOperator::And | BinaryOperator::Or => boolean(l.as_bool(op.symbol())? && r.as_bool(op.symbol())?),
    }
}

fn call<'r>(name: &str, mut args: Vec<Operand<'r>>) -> Result<Operand<'r>, FilterError> {
    if args.len() != 1 {
        return Err(FilterError::Arity {
            function: name.to_string(),
            expected: 1,
            actual: args.len(),
        });
    }
    let arg = args.remove(0);
    let value = match name {
        "string" => Value::String(arg.to_text()),
        "int" => match &arg {
            Operand::Value(Value::Int(i)) => Value::Int(*i),
            Operand::Value(Value::Float(f)) => Value::Int(f.trunc() as i64),
            Operand::Value(Value::Bool(b)) => Value::Int(i64::from(*b)),
            Operand::Value(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| runtime(format!("int({s:?}): {e}")))?,
            other => return Err(runtime(format!("int() of {}", other.type_name()))),
        },
        "float" => match &arg {
            Operand::Value(Value::Int(i)) => Value::Float(*i as f64),
            Operand::Value(Value::Float(f)) => Value::Float(*f),
            Operand::Value(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| runtime(format!("float({s:?}): {e}")))?,
            other => return Err(runtime(format!("float() of {}", other.type_name()))),
        },
        "len" => match &arg {
            Operand::Value(Value::String(s)) => Value::Int(s.chars().count() as i64),
            Operand::Array(items) => Value::Int(items.len() as i64),
            Operand::Row(row) => Value::Int(row.len() as i64),
            other => return Err(runtime(format!("invalid argument for len (type {})", other.type_name()))),
        },
        "lower" => Value::String(arg.as_str("lower")?.to_lowercase()),
        "upper" => Value::String(arg.as_str("upper")?.to_uppercase()),
        "trim" => Value::String(arg.as_str("trim")?.trim().to_string()),
        _ => return Err(FilterError::UnknownFunction(name.to_string())),
    };
    Ok(Operand::Value(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parser::parse;

    fn eval_on(source: &str, row: &Row) -> Result<Operand<'static>, FilterError> {
        let expr = parse(source).unwrap();
        // detach from the row lifetime for assertions
        evaluate(&expr, row).map(|o| match o {
            Operand::Value(v) => Operand::Value(v),
            other => Operand::Value(Value::String(other.to_text())),
        })
    }

    fn row() -> Row {
        [
            ("age", Value::Int(18)),
            ("name", Value::String("Ada".to_string())),
            ("score", Value::Float(2.5)),
            ("note", Value::Null),
        ]
        .into_iter()
        .collect()
    }

    fn truth(source: &str) -> bool {
        match eval_on(source, &row()).unwrap() {
            Operand::Value(Value::Bool(b)) => b,
            other => panic!("not a bool: {other:?}"),
        }
    }

    #[test]
    fn comparisons_and_logic() {
        assert!(truth("_.age >= 18 && _.name == 'Ada'"));
        assert!(truth("_.age > 20 || _.score < 3"));
        assert!(truth("not (_.age < 18)"));
        assert!(truth("_.note == nil"));
        assert!(truth("_.missing == nil"));
    }

    #[test]
    fn membership_and_string_operators() {
        assert!(truth("_.name in ['Ada', 'Grace']"));
        assert!(truth("_.name not in ['Linus']"));
        assert!(truth("'age' in _"));
        assert!(truth("_.name startsWith 'A' and _.name endsWith 'a' and _.name contains 'd'"));
    }

    #[test]
    fn arithmetic_and_helpers() {
        assert!(truth("_.age * 2 + 1 == 37"));
        assert!(truth("_.age / 4 == 4.5"));
        assert!(truth("_.age % 5 == 3"));
        assert!(truth("string(_.age) == '18'"));
        assert!(truth("int('42') == 42"));
        assert!(truth("len(_.name) == 3 && upper(_.name) == 'ADA'"));
    }

    #[test]
    fn short_circuit_skips_broken_right_side() {
        assert!(!truth("_.age < 0 && _.name > 1"));
        assert!(truth("_.age > 0 || _.name > 1"));
    }

    #[test]
    fn type_errors_surface_at_runtime() {
        let r = row();
        assert!(matches!(eval_on("_.name > 1", &r), Err(FilterError::Runtime(_))));
        assert!(matches!(eval_on("_.note < 3", &r), Err(FilterError::Runtime(_))));
        assert!(matches!(eval_on("_.age / 0 > 1", &r), Err(FilterError::Runtime(_))));
    }

    #[test]
    fn integer_overflow_is_a_runtime_error() {
        let r: Row = [("x", Value::Int(i64::MIN)), ("y", Value::Int(i64::MAX))]
            .into_iter()
            .collect();
        for source in ["_.x % -1 == 0", "_.x - 1 < 0", "_.y + 1 > 0", "_.y * 2 > 0", "-_.x > 0", "_.x % 0 == 0"] {
            assert!(
                matches!(eval_on(source, &r), Err(FilterError::Runtime(_))),
                "{source} should fail"
            );
        }
        assert!(matches!(eval_on("_.y % -1 == 0", &r), Ok(Operand::Value(Value::Bool(true)))));
    }
}
