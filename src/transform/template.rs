//! Parser and executor for the built-in text-template language.
//!
//! Supported syntax: literal text, `{{ action }}` with `{{-`/`-}}` whitespace trimming,
//! `{{/* comments */}}`, field chains (`.Value`, `.Row.name`, `.`), function calls,
//! pipelines (`a | f x`), parenthesised sub-pipelines and string, number and boolean
//! literals.

use super::TemplateError;
use super::funcs::{self, Datum};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub(crate) commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub(crate) args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Arg {
    /// `.A.B`; an empty path is the dot itself.
    Field(Vec<String>),
    Function(String),
    Literal(Datum),
    Pipeline(Pipeline),
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Field(Vec<String>),
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Pipe,
    LeftParen,
    RightParen,
}

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Split `source` into text and action nodes.
pub(crate) fn parse(source: &str) -> Result<Vec<Node>, TemplateError> {
    let mut nodes = Vec::new();
    let mut rest = source;
    let mut offset = 0;
    let mut trim_next_text = false;

    while let Some(start) = rest.find(OPEN) {
        let mut text = &rest[..start];
        if trim_next_text {
            text = text.trim_start();
        }
        let after_open = &rest[start + OPEN.len()..];
        let trim_left = starts_with_trim_marker(after_open);
        if trim_left {
            text = text.trim_end();
        }
        if !text.is_empty() {
            nodes.push(Node::Text(text.to_string()));
        }

        let body_start = if trim_left { 2 } else { 0 };
        let action_offset = offset + start + OPEN.len() + body_start;
        let body_and_rest = &after_open[body_start..];
        let end = body_and_rest.find(CLOSE).ok_or(TemplateError::Parse {
            message: "unclosed action".to_string(),
            position: offset + start,
        })?;
        let mut body = &body_and_rest[..end];
        trim_next_text = ends_with_trim_marker(body);
        if trim_next_text {
            body = &body[..body.len() - 2];
        }

        let trimmed = body.trim();
        if !(trimmed.starts_with("/*") && trimmed.ends_with("*/")) {
            let tokens = lex(body, action_offset)?;
            if tokens.is_empty() {
                return Err(TemplateError::Parse {
                    message: "missing value for command".to_string(),
                    position: action_offset,
                });
            }
            let mut parser = ActionParser {
                tokens,
                pos: 0,
                position: action_offset,
            };
            let pipeline = parser.pipeline()?;
            if parser.pos < parser.tokens.len() {
                return Err(parser.error("unexpected token after pipeline"));
            }
            nodes.push(Node::Action(pipeline));
        }

        let consumed = start + OPEN.len() + body_start + end + CLOSE.len();
        offset += consumed;
        rest = &rest[consumed..];
    }

    let text = if trim_next_text { rest.trim_start() } else { rest };
    if !text.is_empty() {
        nodes.push(Node::Text(text.to_string()));
    }
    Ok(nodes)
}

/// Whitespace inside actions and around trim markers is ASCII only.
fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn starts_with_trim_marker(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('-') && chars.next().is_some_and(is_space)
}

fn ends_with_trim_marker(s: &str) -> bool {
    let mut chars = s.chars().rev();
    chars.next() == Some('-') && chars.next().is_some_and(is_space)
}

fn lex(body: &str, base: usize) -> Result<Vec<Tok>, TemplateError> {
    let chars: Vec<(usize, char)> = body.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let err = |message: String, at: usize| TemplateError::Parse {
        message,
        position: base + at,
    };

    while i < chars.len() {
        let (at, c) = chars[i];
        match c {
            c if is_space(c) => i += 1,
            '|' => {
                tokens.push(Tok::Pipe);
                i += 1;
            }
            '(' => {
                tokens.push(Tok::LeftParen);
                i += 1;
            }
            ')' => {
                tokens.push(Tok::RightParen);
                i += 1;
            }
            '.' => {
                let mut path = Vec::new();
                while i < chars.len() && chars[i].1 == '.' {
                    i += 1;
                    let start = i;
                    while i < chars.len() && is_ident_char(chars[i].1) {
                        i += 1;
                    }
                    let segment: String = chars[start..i].iter().map(|(_, c)| c).collect();
                    if segment.is_empty() {
                        // a bare dot is only valid on its own
                        if !path.is_empty() {
                            return Err(err("empty field name".to_string(), chars[start - 1].0));
                        }
                        break;
                    }
                    path.push(segment);
                }
                tokens.push(Tok::Field(path));
            }
            '"' | '`' => {
                let quote = c;
                i += 1;
                let mut value = String::new();
                let mut closed = false;
                while i < chars.len() {
                    let ch = chars[i].1;
                    i += 1;
                    if ch == quote {
                        closed = true;
                        break;
                    }
                    if ch == '\\' && quote == '"' {
                        let escaped = chars.get(i).map(|(_, e)| *e);
                        i += 1;
                        value.push(match escaped {
                            Some('n') => '\n',
                            Some('t') => '\t',
                            Some('r') => '\r',
                            Some('\\') => '\\',
                            Some('"') => '"',
                            Some(other) => {
                                return Err(err(format!("unknown escape sequence \\{other}"), at));
                            }
                            None => return Err(err("unterminated quoted string".to_string(), at)),
                        });
                    } else {
                        value.push(ch);
                    }
                }
                if !closed {
                    return Err(err("unterminated quoted string".to_string(), at));
                }
                tokens.push(Tok::Str(value));
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|(_, d)| d.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                let mut is_float = false;
                while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    is_float |= chars[i].1 == '.';
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
                let token = if is_float {
                    text.parse().map(Tok::Float).ok()
                } else {
                    text.parse().map(Tok::Int).ok()
                };
                tokens.push(token.ok_or_else(|| err(format!("bad number syntax: {text}"), at))?);
            }
            c if is_ident_char(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i].1) {
                    i += 1;
                }
                tokens.push(Tok::Ident(chars[start..i].iter().map(|(_, c)| c).collect()));
            }
            other => return Err(err(format!("unexpected character {other:?} in action"), at)),
        }
    }
    Ok(tokens)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

struct ActionParser {
    tokens: Vec<Tok>,
    pos: usize,
    position: usize,
}

impl ActionParser {
    fn error(&self, message: &str) -> TemplateError {
        TemplateError::Parse {
            message: message.to_string(),
            position: self.position,
        }
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn pipeline(&mut self) -> Result<Pipeline, TemplateError> {
        let mut commands = vec![self.command()?];
        while self.peek() == Some(&Tok::Pipe) {
            self.pos += 1;
            let command = self.command()?;
            if !matches!(command.args.first(), Some(Arg::Function(_))) {
                return Err(self.error("non executable command in pipeline stage"));
            }
            commands.push(command);
        }
        Ok(Pipeline { commands })
    }

    fn command(&mut self) -> Result<Command, TemplateError> {
        let mut args = Vec::new();
        while let Some(tok) = self.peek().cloned() {
            let arg = match tok {
                Tok::Pipe | Tok::RightParen => break,
                Tok::Field(path) => Arg::Field(path),
                Tok::Str(s) => Arg::Literal(Datum::Str(s)),
                Tok::Int(i) => Arg::Literal(Datum::Int(i)),
                Tok::Float(f) => Arg::Literal(Datum::Float(f)),
                Tok::Ident(name) => match name.as_str() {
                    "true" => Arg::Literal(Datum::Bool(true)),
                    "false" => Arg::Literal(Datum::Bool(false)),
                    "nil" => Arg::Literal(Datum::Null),
                    _ if funcs::is_defined(&name) => Arg::Function(name),
                    _ => return Err(TemplateError::UndefinedFunction(name)),
                },
                Tok::LeftParen => {
                    self.pos += 1;
                    let inner = self.pipeline()?;
                    if self.peek() != Some(&Tok::RightParen) {
                        return Err(self.error("unclosed left paren"));
                    }
                    Arg::Pipeline(inner)
                }
            };
            self.pos += 1;
            args.push(arg);
        }
        if args.is_empty() {
            return Err(self.error("missing value for command"));
        }
        if args.len() > 1 && !matches!(args[0], Arg::Function(_)) {
            return Err(self.error("can't give argument to non-function"));
        }
        Ok(Command { args })
    }
}

/// Resolves field chains during execution.
pub(crate) trait Scope {
    fn dot(&self) -> Datum;
    fn field(&self, path: &[String]) -> Result<Datum, TemplateError>;
}

pub(crate) fn execute(nodes: &[Node], scope: &dyn Scope) -> Result<String, TemplateError> {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Action(pipeline) => out.push_str(&eval_pipeline(pipeline, scope)?.to_string()),
        }
    }
    Ok(out)
}

fn eval_pipeline(pipeline: &Pipeline, scope: &dyn Scope) -> Result<Datum, TemplateError> {
    let mut carried: Option<Datum> = None;
    for command in &pipeline.commands {
        carried = Some(eval_command(command, scope, carried)?);
    }
    Ok(carried.unwrap_or(Datum::Null))
}

fn eval_command(
    command: &Command,
    scope: &dyn Scope,
    carried: Option<Datum>,
) -> Result<Datum, TemplateError> {
    match command.args.as_slice() {
        [Arg::Function(name), rest @ ..] => {
            let mut args = rest
                .iter()
                .map(|a| eval_arg(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            args.extend(carried);
            funcs::call(name, args)
        }
        [single] => eval_arg(single, scope),
        _ => Err(TemplateError::Exec("can't give argument to non-function".to_string())),
    }
}

fn eval_arg(arg: &Arg, scope: &dyn Scope) -> Result<Datum, TemplateError> {
    match arg {
        Arg::Field(path) if path.is_empty() => Ok(scope.dot()),
        Arg::Field(path) => scope.field(path),
        Arg::Function(name) => funcs::call(name, Vec::new()),
        Arg::Literal(d) => Ok(d.clone()),
        Arg::Pipeline(p) => eval_pipeline(p, scope),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MapScope(Vec<(String, Datum)>);

    impl Scope for MapScope {
        fn dot(&self) -> Datum {
            Datum::Map(self.0.clone())
        }

        fn field(&self, path: &[String]) -> Result<Datum, TemplateError> {
            self.0
                .iter()
                .find(|(k, _)| *k == path[0])
                .map(|(_, v)| v.clone())
                .ok_or_else(|| TemplateError::Exec(format!("can't evaluate field {}", path[0])))
        }
    }

    fn render(source: &str) -> Result<String, TemplateError> {
        let scope = MapScope(vec![("Value".into(), Datum::Str(" Ada ".into()))]);
        execute(&parse(source)?, &scope)
    }

    #[test]
    fn text_and_fields() {
        assert_eq!(render("hi {{.Value}}!").unwrap(), "hi  Ada !");
        assert_eq!(render("plain").unwrap(), "plain");
    }

    #[test]
    fn pipelines_pass_value_last() {
        assert_eq!(render("{{ .Value | trim | upper }}").unwrap(), "ADA");
        assert_eq!(render(r#"{{ .Value | trim | printf "<%s>" }}"#).unwrap(), "<Ada>");
        assert_eq!(render(r#"{{ upper (trim .Value) }}"#).unwrap(), "ADA");
    }

    #[test]
    fn trim_markers_and_comments() {
        assert_eq!(render("a  {{- 1 -}}  b").unwrap(), "a1b");
        assert_eq!(render("x{{/* note */}}y").unwrap(), "xy");
        assert_eq!(render("{{-3}}").unwrap(), "-3");
    }

    #[test]
    fn non_ascii_space_is_not_a_trim_marker() {
        assert!(matches!(render("{{ .Value\u{a0}-}}"), Err(TemplateError::Parse { .. })));
        assert!(matches!(render("{{-\u{a0}.Value }}"), Err(TemplateError::Parse { .. })));
        assert_eq!(render("{{ .Value\t-}} x").unwrap(), " Ada x");
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(render("{{ .Value"), Err(TemplateError::Parse { .. })));
        assert!(matches!(render("{{ nosuch .Value }}"), Err(TemplateError::UndefinedFunction(_))));
        assert!(matches!(render("{{ .Value .Value }}"), Err(TemplateError::Parse { .. })));
        assert!(matches!(render("{{ }}"), Err(TemplateError::Parse { .. })));
        assert!(matches!(render(r#"{{ "open }}"#), Err(TemplateError::Parse { .. })));
    }

    #[test]
    fn execution_errors() {
        assert!(matches!(render("{{ .Missing }}"), Err(TemplateError::Exec(_))));
        assert!(matches!(render(r#"{{ "x" | atoi }}"#), Err(TemplateError::Exec(_))));
    }
}
