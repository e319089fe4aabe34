//! Function library available to transform templates.
//!
//! Argument order follows the usual template convention: the value flowing through a
//! pipeline is appended as the *last* argument, so `{{ .Value | trimPrefix "x-" }}` calls
//! `trimPrefix("x-", value)`.

use std::fmt;

use crate::types::Value;

use super::TemplateError;

/// Dynamic value manipulated while executing a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Datum>),
    Map(Vec<(String, Datum)>),
}

impl From<&Value> for Datum {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::String(s) => Self::Str(s.clone()),
            Value::Int(i) => Self::Int(*i),
            Value::Float(f) => Self::Float(*f),
            Value::Bool(b) => Self::Bool(*b),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("map[")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl Datum {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "nil",
            Self::Str(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Emptiness as used by `default`, `empty`, `coalesce` and the logic helpers.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Str(s) => s.is_empty(),
            Self::Int(i) => *i == 0,
            Self::Float(f) => *f == 0.0,
            Self::Bool(b) => !*b,
            Self::List(items) => items.is_empty(),
            Self::Map(entries) => entries.is_empty(),
        }
    }

    fn text(&self) -> String {
        self.to_string()
    }
}

/// Names of every function templates may call.
pub const FUNCTION_NAMES: &[&str] = &[
    // strings
    "upper", "lower", "title", "trim", "trimAll", "trimPrefix", "trimSuffix", "replace",
    "contains", "hasPrefix", "hasSuffix", "repeat", "substr", "trunc", "quote", "squote",
    "nospace", "cat", "toString", "printf",
    // defaults
    "default", "empty", "coalesce", "ternary",
    // comparison and logic
    "eq", "ne", "lt", "le", "gt", "ge", "and", "or", "not",
    // lists
    "list", "join", "first", "last", "splitList", "index", "len",
    // math
    "add", "sub", "mul", "div", "mod", "max", "min", "atoi",
];

pub fn is_defined(name: &str) -> bool {
    FUNCTION_NAMES.contains(&name)
}

fn exec(message: String) -> TemplateError {
    TemplateError::Exec(message)
}

fn expect_args(name: &str, args: &[Datum], n: usize) -> Result<(), TemplateError> {
    if args.len() != n {
        return Err(exec(format!(
            "wrong number of args for {name}: want {n} got {}",
            args.len()
        )));
    }
    Ok(())
}

fn expect_at_least(name: &str, args: &[Datum], n: usize) -> Result<(), TemplateError> {
    if args.len() < n {
        return Err(exec(format!(
            "wrong number of args for {name}: want at least {n} got {}",
            args.len()
        )));
    }
    Ok(())
}

fn to_i64(name: &str, d: &Datum) -> Result<i64, TemplateError> {
    match d {
        Datum::Null => Ok(0),
        Datum::Int(i) => Ok(*i),
        Datum::Float(f) => Ok(f.trunc() as i64),
        Datum::Bool(b) => Ok(i64::from(*b)),
        Datum::Str(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| exec(format!("{name}: cannot convert {s:?} to int: {e}"))),
        other => Err(exec(format!("{name}: cannot convert {} to int", other.type_name()))),
    }
}

fn to_f64(d: &Datum) -> Option<f64> {
    match d {
        Datum::Int(i) => Some(*i as f64),
        Datum::Float(f) => Some(*f),
        _ => None,
    }
}

fn compare(name: &str, a: &Datum, b: &Datum) -> Result<std::cmp::Ordering, TemplateError> {
    match (a, b) {
        (Datum::Int(x), Datum::Int(y)) => Ok(x.cmp(y)),
        (Datum::Str(x), Datum::Str(y)) => Ok(x.cmp(y)),
        _ => match (to_f64(a), to_f64(b)) {
            (Some(x), Some(y)) => x
                .partial_cmp(&y)
                .ok_or_else(|| exec(format!("{name}: cannot compare NaN"))),
            _ => Err(exec(format!(
                "{name}: incompatible types for comparison ({} and {})",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

fn equal(a: &Datum, b: &Datum) -> bool {
    match (to_f64(a), to_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn clamp_index(i: i64, len: usize) -> usize {
    i.clamp(0, len as i64) as usize
}

/// Longest string `repeat` may produce, in bytes.
const MAX_REPEAT_BYTES: usize = 1 << 20;

/// One parsed `%` directive: flags, width and precision.
#[derive(Debug, Default)]
struct Directive {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

impl Directive {
    /// Pad `body` to the directive's width. `numeric` bodies zero-pad after their sign.
    fn pad(&self, body: String, numeric: bool) -> String {
        let len = body.chars().count();
        let Some(width) = self.width.filter(|w| *w > len) else {
            return body;
        };
        let fill = width - len;
        if self.left {
            return body + &" ".repeat(fill);
        }
        if self.zero && numeric {
            let sign_len = usize::from(body.starts_with(['-', '+', ' ']));
            let (sign, digits) = body.split_at(sign_len);
            return format!("{sign}{}{digits}", "0".repeat(fill));
        }
        " ".repeat(fill) + &body
    }

    fn sign(&self, negative: bool) -> &'static str {
        match (negative, self.plus, self.space) {
            (true, _, _) => "-",
            (false, true, _) => "+",
            (false, false, true) => " ",
            _ => "",
        }
    }
}

fn parse_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut digits = String::new();
    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
        digits.push(d);
        chars.next();
    }
    digits.parse().ok()
}

/// Go-style `printf` supporting `%s %v %d %f %q %t %%` with the `- + 0 space` flags, a
/// width and a precision (`%-10s`, `%05d`, `%.2f`, `%8.3f`).
fn printf(format: &str, args: &[Datum]) -> Result<String, TemplateError> {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut directive = Directive::default();
        while let Some(flag) = chars.peek().copied() {
            match flag {
                '-' => directive.left = true,
                '0' => directive.zero = true,
                '+' => directive.plus = true,
                ' ' => directive.space = true,
                _ => break,
            }
            chars.next();
        }
        directive.width = parse_digits(&mut chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            directive.precision = Some(parse_digits(&mut chars).unwrap_or(0));
        }
        let verb = chars
            .next()
            .ok_or_else(|| exec("printf: format ends with '%'".to_string()))?;
        if verb == '%' {
            out.push('%');
            continue;
        }
        let arg = args
            .next()
            .ok_or_else(|| exec(format!("printf: missing argument for %{verb}")))?;
        let formatted = match verb {
            's' | 'v' | 't' => {
                let text = arg.text();
                let text = match directive.precision {
                    Some(p) => text.chars().take(p).collect(),
                    None => text,
                };
                directive.pad(text, false)
            }
            'd' => {
                let v = to_i64("printf", arg)?;
                let body = format!("{}{}", directive.sign(v < 0), v.unsigned_abs());
                directive.pad(body, true)
            }
            'f' => {
                let v = to_f64(arg)
                    .ok_or_else(|| exec(format!("printf: %f of {}", arg.type_name())))?;
                let digits = format!("{:.*}", directive.precision.unwrap_or(6), v.abs());
                let body = format!("{}{digits}", directive.sign(v.is_sign_negative() && v != 0.0));
                directive.pad(body, true)
            }
            'q' => directive.pad(format!("{:?}", arg.text()), false),
            other => return Err(exec(format!("printf: unsupported verb %{other}"))),
        };
        out.push_str(&formatted);
    }
    Ok(out)
}

/// Invoke library function `name` with already-evaluated arguments.
pub fn call(name: &str, args: Vec<Datum>) -> Result<Datum, TemplateError> {
    let s = |i: usize| args[i].text();
    let out = match name {
        "upper" => {
            expect_args(name, &args, 1)?;
            Datum::Str(s(0).to_uppercase())
        }
        "lower" => {
            expect_args(name, &args, 1)?;
            Datum::Str(s(0).to_lowercase())
        }
        "title" => {
            expect_args(name, &args, 1)?;
            Datum::Str(title_case(&s(0)))
        }
        "trim" => {
            expect_args(name, &args, 1)?;
            Datum::Str(s(0).trim().to_string())
        }
        "trimAll" => {
            expect_args(name, &args, 2)?;
            let cutset: Vec<char> = s(0).chars().collect();
            Datum::Str(s(1).trim_matches(|c: char| cutset.contains(&c)).to_string())
        }
        "trimPrefix" => {
            expect_args(name, &args, 2)?;
            let (prefix, value) = (s(0), s(1));
            Datum::Str(value.strip_prefix(&prefix).unwrap_or(&value).to_string())
        }
        "trimSuffix" => {
            expect_args(name, &args, 2)?;
            let (suffix, value) = (s(0), s(1));
            Datum::Str(value.strip_suffix(&suffix).unwrap_or(&value).to_string())
        }
        "replace" => {
            expect_args(name, &args, 3)?;
            Datum::Str(s(2).replace(&s(0), &s(1)))
        }
        "contains" => {
            expect_args(name, &args, 2)?;
            Datum::Bool(s(1).contains(&s(0)))
        }
        "hasPrefix" => {
            expect_args(name, &args, 2)?;
            Datum::Bool(s(1).starts_with(&s(0)))
        }
        "hasSuffix" => {
            expect_args(name, &args, 2)?;
            Datum::Bool(s(1).ends_with(&s(0)))
        }
        "repeat" => {
            expect_args(name, &args, 2)?;
            let n = to_i64(name, &args[0])?.max(0) as usize;
            let text = s(1);
            if text.len().checked_mul(n).is_none_or(|total| total > MAX_REPEAT_BYTES) {
                return Err(exec(format!(
                    "repeat: result of {n} x {} bytes exceeds {MAX_REPEAT_BYTES} bytes",
                    text.len()
                )));
            }
            Datum::Str(text.repeat(n))
        }
        "substr" => {
            expect_args(name, &args, 3)?;
            let chars: Vec<char> = s(2).chars().collect();
            let start = to_i64(name, &args[0])?;
            let end = to_i64(name, &args[1])?;
            let start = clamp_index(start, chars.len());
            // a negative end means "to the end of the string"
            let end = if end < 0 { chars.len() } else { clamp_index(end, chars.len()) };
            Datum::Str(chars[start..end.max(start)].iter().collect())
        }
        "trunc" => {
            expect_args(name, &args, 2)?;
            let chars: Vec<char> = s(1).chars().collect();
            let n = to_i64(name, &args[0])?;
            let kept: String = if n >= 0 {
                chars.iter().take(n as usize).collect()
            } else {
                let skip = chars.len().saturating_sub(n.unsigned_abs() as usize);
                chars[skip..].iter().collect()
            };
            Datum::Str(kept)
        }
        "quote" | "squote" => {
            let q = if name == "quote" { '"' } else { '\'' };
            let parts: Vec<String> = args
                .iter()
                .filter(|a| !matches!(a, Datum::Null))
                .map(|a| format!("{q}{}{q}", a.text()))
                .collect();
            Datum::Str(parts.join(" "))
        }
        "nospace" => {
            expect_args(name, &args, 1)?;
            Datum::Str(s(0).chars().filter(|c| !c.is_whitespace()).collect())
        }
        "cat" => {
            let parts: Vec<String> = args
                .iter()
                .filter(|a| !matches!(a, Datum::Null))
                .map(Datum::text)
                .collect();
            Datum::Str(parts.join(" "))
        }
        "toString" => {
            expect_args(name, &args, 1)?;
            Datum::Str(s(0))
        }
        "printf" => {
            expect_at_least(name, &args, 1)?;
            Datum::Str(printf(&s(0), &args[1..])?)
        }
        "default" => {
            expect_args(name, &args, 2)?;
            let mut args = args;
            let value = args.pop().unwrap_or(Datum::Null);
            let fallback = args.pop().unwrap_or(Datum::Null);
            if value.is_empty() { fallback } else { value }
        }
        "empty" => {
            expect_args(name, &args, 1)?;
            Datum::Bool(args[0].is_empty())
        }
        "coalesce" => args.into_iter().find(|a| !a.is_empty()).unwrap_or(Datum::Null),
        "ternary" => {
            expect_args(name, &args, 3)?;
            let mut args = args;
            let condition = args.pop().unwrap_or(Datum::Null);
            let if_false = args.pop().unwrap_or(Datum::Null);
            let if_true = args.pop().unwrap_or(Datum::Null);
            if condition.is_empty() { if_false } else { if_true }
        }
        "eq" => {
            expect_at_least(name, &args, 2)?;
            Datum::Bool(args[1..].iter().any(|b| equal(&args[0], b)))
        }
        "ne" => {
            expect_args(name, &args, 2)?;
            Datum::Bool(!equal(&args[0], &args[1]))
        }
        "lt" | "le" | "gt" | "ge" => {
            expect_args(name, &args, 2)?;
            let ord = compare(name, &args[0], &args[1])?;
            Datum::Bool(match name {
                "lt" => ord.is_lt(),
                "le" => ord.is_le(),
                "gt" => ord.is_gt(),
                _ => ord.is_ge(),
            })
        }
        "and" => {
            expect_at_least(name, &args, 1)?;
            let mut args = args;
            let last = args.len() - 1;
            let idx = args.iter().position(Datum::is_empty).unwrap_or(last);
            args.swap_remove(idx)
        }
        "or" => {
            expect_at_least(name, &args, 1)?;
            let mut args = args;
            let last = args.len() - 1;
            let idx = args.iter().position(|a| !a.is_empty()).unwrap_or(last);
            args.swap_remove(idx)
        }
        "not" => {
            expect_args(name, &args, 1)?;
            Datum::Bool(args[0].is_empty())
        }
        "list" => Datum::List(args),
        "join" => {
            expect_args(name, &args, 2)?;
            let sep = s(0);
            match &args[1] {
                Datum::List(items) => Datum::Str(
                    items.iter().map(Datum::text).collect::<Vec<_>>().join(&sep),
                ),
                other => Datum::Str(other.text()),
            }
        }
        "first" | "last" => {
            expect_args(name, &args, 1)?;
            match &args[0] {
                Datum::List(items) => {
                    let item = if name == "first" { items.first() } else { items.last() };
                    item.cloned().unwrap_or(Datum::Null)
                }
                other => return Err(exec(format!("{name}: expected list, got {}", other.type_name()))),
            }
        }
        "splitList" => {
            expect_args(name, &args, 2)?;
            let (sep, value) = (s(0), s(1));
            Datum::List(value.split(sep.as_str()).map(|p| Datum::Str(p.to_string())).collect())
        }
        "index" => {
            expect_at_least(name, &args, 1)?;
            let mut current = args[0].clone();
            for key in &args[1..] {
                current = match (&current, key) {
                    (Datum::Map(entries), key) => {
                        let key = key.text();
                        entries
                            .iter()
                            .find(|(k, _)| *k == key)
                            .map(|(_, v)| v.clone())
                            .unwrap_or(Datum::Null)
                    }
                    (Datum::List(items), key) => {
                        let i = to_i64(name, key)?;
                        usize::try_from(i)
                            .ok()
                            .and_then(|i| items.get(i).cloned())
                            .ok_or_else(|| exec(format!("index out of range: {i}")))?
                    }
                    (other, _) => {
                        return Err(exec(format!("can't index item of type {}", other.type_name())));
                    }
                };
            }
            current
        }
        "len" => {
            expect_args(name, &args, 1)?;
            let n = match &args[0] {
                Datum::Str(v) => v.chars().count(),
                Datum::List(items) => items.len(),
                Datum::Map(entries) => entries.len(),
                Datum::Null => 0,
                other => return Err(exec(format!("len of type {}", other.type_name()))),
            };
            Datum::Int(n as i64)
        }
        "add" | "mul" | "max" | "min" => {
            expect_at_least(name, &args, 1)?;
            let mut acc = to_i64(name, &args[0])?;
            for arg in &args[1..] {
                let v = to_i64(name, arg)?;
                acc = match name {
                    "add" => acc.checked_add(v),
                    "mul" => acc.checked_mul(v),
                    "max" => Some(acc.max(v)),
                    _ => Some(acc.min(v)),
                }
                .ok_or_else(|| exec(format!("{name}: integer overflow")))?;
            }
            Datum::Int(acc)
        }
        "sub" | "div" | "mod" => {
            expect_args(name, &args, 2)?;
            let a = to_i64(name, &args[0])?;
            let b = to_i64(name, &args[1])?;
            if name != "sub" && b == 0 {
                return Err(exec(format!("{name}: integer divide by zero")));
            }
            let v = match name {
                "sub" => a.checked_sub(b),
                "div" => a.checked_div(b),
                _ => a.checked_rem(b),
            }
            .ok_or_else(|| exec(format!("{name}: integer overflow")))?;
            Datum::Int(v)
        }
        "atoi" => {
            expect_args(name, &args, 1)?;
            Datum::Int(to_i64(name, &Datum::Str(s(0)))?)
        }
        other => return Err(TemplateError::UndefinedFunction(other.to_string())),
    };
    Ok(out)
}
