//! Tokenization of filter expressions.

use super::FilterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenType {
    // Literals and identifiers
    Identifier,
    String,
    Integer,
    Float,
    True,
    False,
    Nil,

    // Punctuation
    Dot,
    Comma,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Logical and membership
    And,
    Or,
    Not,
    In,
    Contains,
    StartsWith,
    EndsWith,

    Eof,
}

/// A token with its type, text and byte offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub position: usize,
}

impl Token {
    fn new(token_type: TokenType, value: impl Into<String>, position: usize) -> Self {
        Self {
            token_type,
            value: value.into(),
            position,
        }
    }
}

fn keyword(word: &str) -> Option<TokenType> {
    match word {
        "and" => Some(TokenType::And),
        "or" => Some(TokenType::Or),
        "not" => Some(TokenType::Not),
        "in" => Some(TokenType::In),
        "contains" => Some(TokenType::Contains),
        "startsWith" => Some(TokenType::StartsWith),
        "endsWith" => Some(TokenType::EndsWith),
        "true" => Some(TokenType::True),
        "false" => Some(TokenType::False),
        "nil" | "null" => Some(TokenType::Nil),
        _ => None,
    }
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' || ch == '$' {
            let mut word = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                    word.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let token_type = keyword(&word).unwrap_or(TokenType::Identifier);
            tokens.push(Token::new(token_type, word, pos));
            continue;
        }

        if ch.is_ascii_digit() {
            let mut number = String::new();
            let mut is_float = false;
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_digit() || c == '_' {
                    if c != '_' {
                        number.push(c);
                    }
                    chars.next();
                } else if c == '.' && !is_float {
                    // `1.5` is a float, `x.1` never reaches here and `1..` is rejected below
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    match lookahead.peek() {
                        Some(&(_, d)) if d.is_ascii_digit() => {
                            is_float = true;
                            number.push('.');
                            chars.next();
                        }
                        _ => break,
                    }
                } else {
                    break;
                }
            }
            let token_type = if is_float {
                TokenType::Float
            } else {
                TokenType::Integer
            };
            tokens.push(Token::new(token_type, number, pos));
            continue;
        }

        if ch == '"' || ch == '\'' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                match c {
                    '\\' => {
                        let (_, escaped) = chars.next().ok_or_else(|| FilterError::Syntax {
                            message: "unterminated escape sequence".to_string(),
                            position: pos,
                        })?;
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            other => other,
                        });
                    }
                    c if c == ch => {
                        closed = true;
                        break;
                    }
                    c => text.push(c),
                }
            }
            if !closed {
                return Err(FilterError::Syntax {
                    message: "unterminated string literal".to_string(),
                    position: pos,
                });
            }
            tokens.push(Token::new(TokenType::String, text, pos));
            continue;
        }

        chars.next();
        let next = chars.peek().map(|&(_, c)| c);
        let (token_type, text) = match (ch, next) {
            ('=', Some('=')) => (TokenType::Equal, "=="),
            ('!', Some('=')) => (TokenType::NotEqual, "!="),
            ('<', Some('=')) => (TokenType::LessThanOrEqual, "<="),
            ('>', Some('=')) => (TokenType::GreaterThanOrEqual, ">="),
            ('&', Some('&')) => (TokenType::And, "&&"),
            ('|', Some('|')) => (TokenType::Or, "||"),
            ('<', _) => (TokenType::LessThan, "<"),
            ('>', _) => (TokenType::GreaterThan, ">"),
            ('!', _) => (TokenType::Not, "!"),
            ('+', _) => (TokenType::Plus, "+"),
            ('-', _) => (TokenType::Minus, "-"),
            ('*', _) => (TokenType::Star, "*"),
            ('/', _) => (TokenType::Slash, "/"),
            ('%', _) => (TokenType::Percent, "%"),
            ('.', _) => (TokenType::Dot, "."),
            (',', _) => (TokenType::Comma, ","),
            ('(', _) => (TokenType::LeftParen, "("),
            (')', _) => (TokenType::RightParen, ")"),
            ('[', _) => (TokenType::LeftBracket, "["),
            (']', _) => (TokenType::RightBracket, "]"),
            _ => {
                return Err(FilterError::Syntax {
                    message: format!("unexpected character {ch:?}"),
                    position: pos,
                });
            }
        };
        if text.len() == 2 {
            chars.next();
        }
        tokens.push(Token::new(token_type, text, pos));
    }

    tokens.push(Token::new(TokenType::Eof, "", input.len()));
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(input: &str) -> Vec<TokenType> {
        tokenize(input).unwrap().into_iter().map(|t| t.token_type).collect()
    }

    #[test]
    fn member_access_and_comparison() {
        assert_eq!(
            types("_.age >= 18"),
            vec![
                TokenType::Identifier,
                TokenType::Dot,
                TokenType::Identifier,
                TokenType::GreaterThanOrEqual,
                TokenType::Integer,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_symbolic_operators() {
        assert_eq!(
            types("not a && b or c"),
            vec![
                TokenType::Not,
                TokenType::Identifier,
                TokenType::And,
                TokenType::Identifier,
                TokenType::Or,
                TokenType::Identifier,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn strings_and_floats() {
        let tokens = tokenize(r#"'it\'s' 2.50 "x""#).unwrap();
        assert_eq!(tokens[0].value, "it's");
        assert_eq!(tokens[1].token_type, TokenType::Float);
        assert_eq!(tokens[1].value, "2.50");
        assert_eq!(tokens[2].value, "x");
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let err = tokenize("_.a == \"abc").unwrap_err();
        assert!(matches!(err, FilterError::Syntax { position: 7, .. }));
    }
}
