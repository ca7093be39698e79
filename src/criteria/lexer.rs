//! Criteria tokenizer
//!
//! Turns a criteria string into tokens tagged with their byte offset.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::EvaluationError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Null,

    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,

    Not,
    Minus,
    /// `=`
    Assign,
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,

    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Number(n) => format!("number {}", n),
            Token::Str(s) => format!("string '{}'", s),
            Token::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    /// Byte offset of the first character
    pub pos: usize,
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Spanned>, EvaluationError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let Some(&(pos, c)) = self.chars.peek() else {
                tokens.push(Spanned {
                    token: Token::Eof,
                    pos: self.input.len(),
                });
                return Ok(tokens);
            };

            let token = match c {
                '.' if follows_operand(&tokens) || !self.next_is_digit_after_dot() => {
                    self.chars.next();
                    Token::Dot
                }
                ',' => self.single(Token::Comma),
                '(' => self.single(Token::LParen),
                ')' => self.single(Token::RParen),
                '[' => self.single(Token::LBracket),
                ']' => self.single(Token::RBracket),
                '-' => self.single(Token::Minus),
                '!' => {
                    self.chars.next();
                    if self.eat('=') {
                        if self.eat('=') {
                            Token::StrictNotEq
                        } else {
                            Token::NotEq
                        }
                    } else {
                        Token::Not
                    }
                }
                '=' => {
                    self.chars.next();
                    if self.eat('=') {
                        if self.eat('=') {
                            Token::StrictEq
                        } else {
                            Token::Eq
                        }
                    } else {
                        Token::Assign
                    }
                }
                '<' => {
                    self.chars.next();
                    if self.eat('=') {
                        Token::Le
                    } else {
                        Token::Lt
                    }
                }
                '>' => {
                    self.chars.next();
                    if self.eat('=') {
                        Token::Ge
                    } else {
                        Token::Gt
                    }
                }
                '&' => {
                    self.chars.next();
                    if !self.eat('&') {
                        return Err(EvaluationError::at("expected '&&'", pos));
                    }
                    Token::And
                }
                '|' => {
                    self.chars.next();
                    if !self.eat('|') {
                        return Err(EvaluationError::at("expected '||'", pos));
                    }
                    Token::Or
                }
                '\'' | '"' => self.read_string(pos, c)?,
                c if c.is_ascii_digit() || c == '.' => self.read_number(pos)?,
                c if c.is_alphabetic() || c == '_' || c == '$' => self.read_word(),
                other => {
                    return Err(EvaluationError::at(
                        format!("unexpected character '{}'", other),
                        pos,
                    ))
                }
            };

            tokens.push(Spanned { token, pos });
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.chars.next();
        token
    }

    fn eat(&mut self, expected: char) -> bool {
        if matches!(self.chars.peek(), Some(&(_, c)) if c == expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some(&(_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    /// `.5` is a number, `a.b` is member access
    fn next_is_digit_after_dot(&self) -> bool {
        let mut ahead = self.chars.clone();
        ahead.next();
        matches!(ahead.peek(), Some(&(_, c)) if c.is_ascii_digit())
    }

    fn read_string(&mut self, start: usize, quote: char) -> Result<Token, EvaluationError> {
        self.chars.next();
        let mut value = String::new();
        loop {
            match self.chars.next() {
                None => return Err(EvaluationError::at("unterminated string literal", start)),
                Some((_, c)) if c == quote => return Ok(Token::Str(value)),
                Some((pos, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, c @ ('\\' | '\'' | '"'))) => value.push(c),
                    Some((_, other)) => {
                        return Err(EvaluationError::at(
                            format!("unknown escape '\\{}'", other),
                            pos,
                        ))
                    }
                    None => return Err(EvaluationError::at("unterminated string literal", start)),
                },
                Some((_, c)) => value.push(c),
            }
        }
    }

    fn read_number(&mut self, start: usize) -> Result<Token, EvaluationError> {
        let mut end = start;
        let mut seen_dot = false;
        while let Some(&(pos, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                end = pos + 1;
            } else if c == '.' && !seen_dot && self.next_is_digit_after_dot() {
                seen_dot = true;
                end = pos + 1;
            } else {
                break;
            }
            self.chars.next();
        }

        let text = &self.input[start..end];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| EvaluationError::at(format!("invalid number '{}'", text), start))
    }

    fn read_word(&mut self) -> Token {
        let mut word = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                word.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        match word.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => Token::Ident(word),
        }
    }
}

/// A dot right after an operand is always member access
fn follows_operand(tokens: &[Spanned]) -> bool {
    matches!(
        tokens.last().map(|t| &t.token),
        Some(Token::Ident(_) | Token::Number(_) | Token::Str(_) | Token::RParen | Token::RBracket)
    )
}

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, EvaluationError> {
    Lexer::new(input).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_member_access_and_call() {
        assert_eq!(
            kinds("resource.hostName.startsWith('test')"),
            vec![
                Token::Ident("resource".into()),
                Token::Dot,
                Token::Ident("hostName".into()),
                Token::Dot,
                Token::Ident("startsWith".into()),
                Token::LParen,
                Token::Str("test".into()),
                Token::RParen,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("= == === != !== ! < <= > >= && || -"),
            vec![
                Token::Assign,
                Token::Eq,
                Token::StrictEq,
                Token::NotEq,
                Token::StrictNotEq,
                Token::Not,
                Token::Lt,
                Token::Le,
                Token::Gt,
                Token::Ge,
                Token::And,
                Token::Or,
                Token::Minus,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("4 3.25 .5"),
            vec![
                Token::Number(4.0),
                Token::Number(3.25),
                Token::Number(0.5),
                Token::Eof
            ]
        );
        // trailing dot is member access, not a fraction
        assert_eq!(
            kinds("4.x"),
            vec![
                Token::Number(4.0),
                Token::Dot,
                Token::Ident("x".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_dot_after_operand_is_member_access() {
        assert_eq!(
            kinds("tags.0"),
            vec![
                Token::Ident("tags".into()),
                Token::Dot,
                Token::Number(0.0),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "say \"hi\"""#),
            vec![
                Token::Str("it's".into()),
                Token::Str("say \"hi\"".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("a  ==  'b'").unwrap();
        let positions: Vec<_> = tokens.iter().map(|t| t.pos).collect();
        assert_eq!(positions, vec![0, 3, 7, 10]);
    }

    #[test]
    fn test_errors() {
        assert_eq!(tokenize("'open").unwrap_err().position, Some(0));
        assert_eq!(tokenize("a & b").unwrap_err().position, Some(2));
        assert_eq!(tokenize("a | b").unwrap_err().position, Some(2));
        assert_eq!(tokenize("a # b").unwrap_err().position, Some(2));
        assert!(tokenize(r"'\q'").is_err());
    }
}
