//! Recursive-descent parser for filter expressions.
//!
//! Precedence, lowest first:
//!
//! ```text
//! or          := and ( ("||" | "or") and )*
//! and         := comparison ( ("&&" | "and") comparison )*
//! comparison  := additive ( (== | != | < | <= | > | >= | in | not in
//!                           | contains | startsWith | endsWith) additive )*
//! additive    := multiplicative ( (+ | -) multiplicative )*
//! multiplicative := unary ( (* | / | %) unary )*
//! unary       := ("!" | "not" | "-") unary | postfix
//! postfix     := primary ( "." ident | "[" or "]" )*
//! primary     := literal | ident | ident "(" args ")" | "[" args "]" | "(" or ")"
//! ```

use crate::types::Value;

use super::FilterError;
use super::lexer::{Token, TokenType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOperator {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOperator {
    Or,
    And,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOperator {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Contains => "contains",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Identifier(String),
    Member {
        object: Box<Expr>,
        field: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Array(Vec<Expr>),
}

pub(crate) struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    /// Parse a complete expression; trailing tokens are an error.
    pub(crate) fn parse(mut self) -> Result<Expr, FilterError> {
        let expr = self.parse_or()?;
        let token = self.current_token();
        if token.token_type != TokenType::Eof {
            return Err(FilterError::Syntax {
                message: format!("unexpected token {:?}", token.value),
                position: token.position,
            });
        }
        Ok(expr)
    }

    fn current_token(&self) -> &Token {
        // the lexer always terminates the stream with Eof
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_type(&self, offset: usize) -> TokenType {
        self.tokens
            .get(self.current + offset)
            .map(|t| t.token_type)
            .unwrap_or(TokenType::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.current_token().clone();
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
        token
    }

    fn expect(&mut self, expected: TokenType) -> Result<Token, FilterError> {
        let token = self.current_token();
        if token.token_type == expected {
            Ok(self.advance())
        } else {
            Err(FilterError::Syntax {
                message: format!("expected {expected:?}, found {:?}", token.value),
                position: token.position,
            })
        }
    }

    fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_and()?;
        while self.current_token().token_type == TokenType::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Self::binary(BinaryOperator::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_comparison()?;
        while self.current_token().token_type == TokenType::And {
            self.advance();
            let right = self.parse_comparison()?;
            left = Self::binary(BinaryOperator::And, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current_token().token_type {
                TokenType::Equal => BinaryOperator::Equal,
                TokenType::NotEqual => BinaryOperator::NotEqual,
                TokenType::LessThan => BinaryOperator::LessThan,
                TokenType::LessThanOrEqual => BinaryOperator::LessThanOrEqual,
                TokenType::GreaterThan => BinaryOperator::GreaterThan,
                TokenType::GreaterThanOrEqual => BinaryOperator::GreaterThanOrEqual,
                TokenType::In => BinaryOperator::In,
                TokenType::Contains => BinaryOperator::Contains,
                TokenType::StartsWith => BinaryOperator::StartsWith,
                TokenType::EndsWith => BinaryOperator::EndsWith,
                TokenType::Not if self.peek_type(1) == TokenType::In => {
                    self.advance(); // consume NOT, IN is consumed below
                    BinaryOperator::NotIn
                }
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current_token().token_type {
                TokenType::Plus => BinaryOperator::Add,
                TokenType::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current_token().token_type {
                TokenType::Star => BinaryOperator::Multiply,
                TokenType::Slash => BinaryOperator::Divide,
                TokenType::Percent => BinaryOperator::Modulo,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, FilterError> {
        let op = match self.current_token().token_type {
            TokenType::Not => UnaryOperator::Not,
            TokenType::Minus => UnaryOperator::Negate,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let expr = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, FilterError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current_token().token_type {
                TokenType::Dot => {
                    self.advance();
                    let token = self.current_token().clone();
                    // keywords are valid field names after a dot (`_.in`, `_.not`)
                    let is_name = matches!(
                        token.token_type,
                        TokenType::Identifier
                            | TokenType::And
                            | TokenType::Or
                            | TokenType::Not
                            | TokenType::In
                            | TokenType::Contains
                            | TokenType::StartsWith
                            | TokenType::EndsWith
                            | TokenType::True
                            | TokenType::False
                            | TokenType::Nil
                    );
                    if !is_name {
                        return Err(FilterError::Syntax {
                            message: format!("expected field name after '.', found {:?}", token.value),
                            position: token.position,
                        });
                    }
                    self.advance();
                    expr = Expr::Member {
                        object: Box::new(expr),
                        field: token.value,
                    };
                }
                TokenType::LeftBracket => {
                    self.advance();
                    let index = self.parse_or()?;
                    self.expect(TokenType::RightBracket)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, FilterError> {
        let token = self.advance();
        match token.token_type {
            TokenType::Integer => token
                .value
                .parse::<i64>()
                .map(|i| Expr::Literal(Value::Int(i)))
                .map_err(|e| FilterError::Syntax {
                    message: format!("invalid integer literal {:?}: {e}", token.value),
                    position: token.position,
                }),
            TokenType::Float => token
                .value
                .parse::<f64>()
                .map(|f| Expr::Literal(Value::Float(f)))
                .map_err(|e| FilterError::Syntax {
                    message: format!("invalid float literal {:?}: {e}", token.value),
                    position: token.position,
                }),
            TokenType::String => Ok(Expr::Literal(Value::String(token.value))),
            TokenType::True => Ok(Expr::Literal(Value::Bool(true))),
            TokenType::False => Ok(Expr::Literal(Value::Bool(false))),
            TokenType::Nil => Ok(Expr::Literal(Value::Null)),
            TokenType::Identifier => {
                if self.current_token().token_type == TokenType::LeftParen {
                    self.advance();
                    let args = self.parse_list(TokenType::RightParen)?;
                    Ok(Expr::Call {
                        name: token.value,
                        args,
                    })
                } else {
                    Ok(Expr::Identifier(token.value))
                }
            }
            TokenType::LeftBracket => Ok(Expr::Array(self.parse_list(TokenType::RightBracket)?)),
            TokenType::LeftParen => {
                let expr = self.parse_or()?;
                self.expect(TokenType::RightParen)?;
                Ok(expr)
            }
            TokenType::Eof => Err(FilterError::Syntax {
                message: "unexpected end of expression".to_string(),
                position: token.position,
            }),
            _ => Err(FilterError::Syntax {
                message: format!("unexpected token {:?}", token.value),
                position: token.position,
            }),
        }
    }

    /// Comma-separated expressions up to (and consuming) `close`.
    fn parse_list(&mut self, close: TokenType) -> Result<Vec<Expr>, FilterError> {
        let mut items = Vec::new();
        if self.current_token().token_type == close {
            self.advance();
            return Ok(items);
        }
        loop {
            items.push(self.parse_or()?);
            if self.current_token().token_type == TokenType::Comma {
                self.advance();
                continue;
            }
            self.expect(close)?;
            return Ok(items);
        }
    }
}

pub(crate) fn parse(source: &str) -> Result<Expr, FilterError> {
    let tokens = super::lexer::tokenize(source)?;
    Parser::new(tokens).parse()
}
