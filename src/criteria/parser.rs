//! Criteria parser
//!
//! Recursive descent over the token stream. Precedence, lowest first:
//!
//! ```text
//! assignment   := logical_or ( '=' assignment )?
//! logical_or   := logical_and ( '||' logical_and )*
//! logical_and  := equality ( '&&' equality )*
//! equality     := relational ( ( '==' | '!=' | '===' | '!==' ) relational )*
//! relational   := unary ( ( '<' | '<=' | '>' | '>=' ) unary )*
//! unary        := ( '!' | '-' ) unary | postfix
//! postfix      := primary ( '.' name | '.' index | '[' assignment ']' | '.' method '(' args ')' )*
//! primary      := 'resource' | literal | '(' assignment ')'
//! ```

use serde_json::Value;

use super::lexer::{tokenize, Spanned, Token};
use super::{MAX_CRITERIA_LEN, MAX_DEPTH, RESOURCE_VAR};
use crate::error::EvaluationError;

/// Helper methods callable on values
pub const METHODS: &[&str] = &[
    "startsWith",
    "endsWith",
    "contains",
    "includes",
    "toLowerCase",
    "toUpperCase",
    "trim",
    "length",
    "size",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// The single bound variable
    Resource,
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call {
        target: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Target is always a place rooted at [`Expr::Resource`]
    Assign(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn is_place(&self) -> bool {
        match self {
            Expr::Member(base, _) | Expr::Index(base, _) => {
                matches!(**base, Expr::Resource) || base.is_place()
            }
            _ => false,
        }
    }
}

pub fn parse(input: &str) -> Result<Expr, EvaluationError> {
    if input.len() > MAX_CRITERIA_LEN {
        return Err(EvaluationError::new(format!(
            "criteria longer than {} bytes",
            MAX_CRITERIA_LEN
        )));
    }

    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.assignment()?;
    let trailing = parser.peek();
    if trailing.token != Token::Eof {
        return Err(EvaluationError::at(
            format!("unexpected {}", trailing.token.describe()),
            trailing.pos,
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Spanned {
        // the token stream always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Spanned {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        &self.peek().token == token
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<Spanned, EvaluationError> {
        if self.check(&token) {
            Ok(self.advance())
        } else {
            let found = self.peek();
            Err(EvaluationError::at(
                format!("expected {}, found {}", what, found.token.describe()),
                found.pos,
            ))
        }
    }

    fn enter(&mut self) -> Result<(), EvaluationError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvaluationError::at(
                format!("criteria nested deeper than {}", MAX_DEPTH),
                self.peek().pos,
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn assignment(&mut self) -> Result<Expr, EvaluationError> {
        self.enter()?;
        let start = self.peek().pos;
        let target = self.logical_or()?;

        let expr = if self.check(&Token::Assign) {
            self.advance();
            if !target.is_place() {
                return Err(EvaluationError::at(
                    format!("can only assign to fields of '{}'", RESOURCE_VAR),
                    start,
                ));
            }
            let value = self.assignment()?;
            Expr::Assign(Box::new(target), Box::new(value))
        } else {
            target
        };
        self.leave();
        Ok(expr)
    }

    fn logical_or(&mut self) -> Result<Expr, EvaluationError> {
        let mut left = self.logical_and()?;
        let mut chained = 0;
        while self.check(&Token::Or) {
            self.advance();
            self.enter()?;
            chained += 1;
            let right = self.logical_and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        self.depth -= chained;
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, EvaluationError> {
        let mut left = self.equality()?;
        let mut chained = 0;
        while self.check(&Token::And) {
            self.advance();
            self.enter()?;
            chained += 1;
            let right = self.equality()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        self.depth -= chained;
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, EvaluationError> {
        let mut left = self.relational()?;
        let mut chained = 0;
        loop {
            let op = match self.peek().token {
                Token::Eq => BinOp::Eq,
                Token::NotEq => BinOp::NotEq,
                Token::StrictEq => BinOp::StrictEq,
                Token::StrictNotEq => BinOp::StrictNotEq,
                _ => break,
            };
            self.advance();
            self.enter()?;
            chained += 1;
            let right = self.relational()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth -= chained;
        Ok(left)
    }

    fn relational(&mut self) -> Result<Expr, EvaluationError> {
        let mut left = self.unary()?;
        let mut chained = 0;
        loop {
            let op = match self.peek().token {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            self.enter()?;
            chained += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth -= chained;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, EvaluationError> {
        match self.peek().token {
            Token::Not => {
                self.advance();
                self.enter()?;
                let operand = self.unary()?;
                self.leave();
                Ok(Expr::Not(Box::new(operand)))
            }
            Token::Minus => {
                self.advance();
                self.enter()?;
                let operand = self.unary()?;
                self.leave();
                Ok(Expr::Neg(Box::new(operand)))
            }
            _ => self.postfix(),
        }
    }

    /// Every accessor deepens the tree, so chains share the nesting budget
    fn postfix(&mut self) -> Result<Expr, EvaluationError> {
        let mut expr = self.primary()?;
        let mut chained = 0;
        loop {
            match self.peek().token {
                Token::Dot => {
                    self.advance();
                    self.enter()?;
                    chained += 1;
                    let next = self.advance();
                    expr = match next.token {
                        Token::Ident(name) if self.check(&Token::LParen) => {
                            self.call(expr, name, next.pos)?
                        }
                        Token::Ident(name) => Expr::Member(Box::new(expr), name),
                        Token::Number(n) if n.fract() == 0.0 && n >= 0.0 => {
                            Expr::Index(Box::new(expr), Box::new(Expr::Literal(number(n))))
                        }
                        other => {
                            return Err(EvaluationError::at(
                                format!("expected field name after '.', found {}", other.describe()),
                                next.pos,
                            ))
                        }
                    };
                }
                Token::LBracket => {
                    self.advance();
                    self.enter()?;
                    chained += 1;
                    let index = self.assignment()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        self.depth -= chained;
        Ok(expr)
    }

    fn call(&mut self, target: Expr, method: String, pos: usize) -> Result<Expr, EvaluationError> {
        if !METHODS.contains(&method.as_str()) {
            return Err(EvaluationError::at(
                format!("method '{}' is not allowed", method),
                pos,
            ));
        }
        self.expect(Token::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                args.push(self.assignment()?);
                if self.check(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "')'")?;
        Ok(Expr::Call {
            target: Box::new(target),
            method,
            args,
        })
    }

    fn primary(&mut self) -> Result<Expr, EvaluationError> {
        let next = self.advance();
        match next.token {
            Token::Ident(ref name) if name == RESOURCE_VAR => Ok(Expr::Resource),
            Token::Ident(name) => Err(EvaluationError::at(
                format!("unknown identifier '{}', only '{}' is bound", name, RESOURCE_VAR),
                next.pos,
            )),
            Token::Number(n) => Ok(Expr::Literal(number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::LParen => {
                let inner = self.assignment()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            other => Err(EvaluationError::at(
                format!("unexpected {}", other.describe()),
                next.pos,
            )),
        }
    }
}

/// JSON number, integral when possible so it compares like stored integers
pub(crate) fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
