//! Tokenizer and recursive-descent parser for rule expressions.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or       := and ("||" and)*
//! and      := equality ("&&" equality)*
//! equality := compare (("==" | "!=") compare)?
//! compare  := additive (("<" | "<=" | ">" | ">=") additive)?
//! additive := unary ("+" unary)*
//! unary    := "!" unary | postfix
//! postfix  := primary ("." ident | "." method "(" expr ")")*
//! primary  := literal | ident | "env" "(" expr ")" | "(" or ")"
//! ```

use thiserror::Error;

use super::Kind;

/// Error produced while parsing an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected character {0:?} at byte {1}")]
    UnexpectedChar(char, usize),

    #[error("unterminated string literal starting at byte {0}")]
    UnterminatedString(usize),

    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("trailing input after expression: {0:?}")]
    TrailingInput(String),

    #[error("unknown method {0:?}")]
    UnknownMethod(String),

    #[error("integer literal out of range: {0}")]
    IntOutOfRange(String),
}

/// String methods supported on the postfix position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    StartsWith,
    EndsWith,
    Contains,
    Matches,
}

impl Method {
    fn from_name(name: &str) -> Option<Method> {
        match name {
            "startsWith" => Some(Method::StartsWith),
            "endsWith" => Some(Method::EndsWith),
            "contains" => Some(Method::Contains),
            "matches" => Some(Method::Matches),
            _ => None,
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    /// Dotted field path; the first segment is the scope root.
    Field(Vec<String>),
    /// `env(<expr>)`
    Env(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `<recv>.method(<arg>)`
    Method(Method, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Statically inferable result kind.
    pub fn kind(&self) -> Kind {
        match self {
            Expr::Null => Kind::Dynamic,
            Expr::Bool(_) => Kind::Bool,
            Expr::Int(_) => Kind::Int,
            Expr::Str(_) => Kind::Str,
            Expr::Field(_) => Kind::Dynamic,
            Expr::Env(_) => Kind::Str,
            Expr::Not(_) => Kind::Bool,
            Expr::Method(_, _, _) => Kind::Bool,
            Expr::Binary(op, lhs, rhs) => match op {
                BinOp::Or
                | BinOp::And
                | BinOp::Eq
                | BinOp::Ne
                | BinOp::Lt
                | BinOp::Le
                | BinOp::Gt
                | BinOp::Ge => Kind::Bool,
                BinOp::Add => match (lhs.kind(), rhs.kind()) {
                    (Kind::Str, _) | (_, Kind::Str) => Kind::Str,
                    (Kind::Int, Kind::Int) => Kind::Int,
                    _ => Kind::Dynamic,
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Dot,
    Comma,
    LParen,
    RParen,
    Bang,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(ParseError::UnexpectedChar('=', i));
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(ParseError::UnexpectedChar('&', i));
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(ParseError::UnexpectedChar('|', i));
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '"' | '\'' => {
                let quote = c;
                let start = i;
                i += 1;
                let mut value = String::new();
                loop {
                    match bytes.get(i) {
                        None => return Err(ParseError::UnterminatedString(start)),
                        Some(&b) if b as char == quote => {
                            i += 1;
                            break;
                        }
                        Some(&b'\\') => {
                            // Escapes: \" \' \\ \n \t; anything else passes
                            // the escaped character through.
                            match bytes.get(i + 1) {
                                None => return Err(ParseError::UnterminatedString(start)),
                                Some(&b'n') => value.push('\n'),
                                Some(&b't') => value.push('\t'),
                                Some(&other) => value.push(other as char),
                            }
                            i += 2;
                        }
                        Some(&b) => {
                            // Collect the full UTF-8 character.
                            let ch_len = utf8_len(b);
                            let end = (i + ch_len).min(bytes.len());
                            value.push_str(
                                std::str::from_utf8(&bytes[i..end])
                                    .map_err(|_| ParseError::UnterminatedString(start))?,
                            );
                            i = end;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            '0'..='9' => {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let text = &input[start..i];
                let n: i64 = text
                    .parse()
                    .map_err(|_| ParseError::IntOutOfRange(text.to_string()))?;
                tokens.push(Token::Int(n));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(input[start..i].to_string()));
            }
            other => return Err(ParseError::UnexpectedChar(other, i)),
        }
    }
    Ok(tokens)
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(ParseError::UnexpectedToken(format!("{token:?}"))),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_equality()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_compare()?;
        let op = match self.peek() {
            Some(Token::EqEq) => BinOp::Eq,
            Some(Token::NotEq) => BinOp::Ne,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_compare()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_compare(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some(&Token::Plus) {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(BinOp::Add, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == Some(&Token::Bang) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        while self.peek() == Some(&Token::Dot) {
            self.advance();
            let name = match self.advance() {
                Some(Token::Ident(name)) => name,
                Some(token) => return Err(ParseError::UnexpectedToken(format!("{token:?}"))),
                None => return Err(ParseError::UnexpectedEnd),
            };
            if self.peek() == Some(&Token::LParen) {
                // Method call.
                let method = Method::from_name(&name)
                    .ok_or_else(|| ParseError::UnknownMethod(name.clone()))?;
                self.advance();
                let arg = self.parse_or()?;
                self.expect(&Token::RParen)?;
                expr = Expr::Method(method, Box::new(expr), Box::new(arg));
            } else {
                // Field selection; extend an existing path in place.
                expr = match expr {
                    Expr::Field(mut path) => {
                        path.push(name);
                        Expr::Field(path)
                    }
                    other => {
                        return Err(ParseError::UnexpectedToken(format!(
                            "field access on non-field expression {other:?}"
                        )))
                    }
                };
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            None => Err(ParseError::UnexpectedEnd),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Int(n)) => Ok(Expr::Int(n)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "env" if self.peek() == Some(&Token::LParen) => {
                    self.advance();
                    let arg = self.parse_or()?;
                    self.expect(&Token::RParen)?;
                    Ok(Expr::Env(Box::new(arg)))
                }
                _ => Ok(Expr::Field(vec![name])),
            },
            Some(token) => Err(ParseError::UnexpectedToken(format!("{token:?}"))),
        }
    }
}

/// Parses a complete expression; trailing tokens are an error.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::UnexpectedEnd);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(ParseError::TrailingInput(format!("{token:?}")));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_field_paths() {
        let expr = parse("change.file.mimeType").unwrap();
        assert_eq!(
            expr,
            Expr::Field(vec![
                "change".to_string(),
                "file".to_string(),
                "mimeType".to_string()
            ])
        );
    }

    #[test]
    fn parses_method_call() {
        let expr = parse(r#"name.startsWith("a")"#).unwrap();
        match expr {
            Expr::Method(Method::StartsWith, recv, arg) => {
                assert_eq!(*recv, Expr::Field(vec!["name".to_string()]));
                assert_eq!(*arg, Expr::Str("a".to_string()));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_method_rejected() {
        assert_eq!(
            parse(r#"name.bogus("a")"#).unwrap_err(),
            ParseError::UnknownMethod("bogus".to_string())
        );
    }

    #[test]
    fn precedence_and_binds_tighter_than_or() {
        // a || b && c  ==  a || (b && c)
        let expr = parse("a || b && c").unwrap();
        match expr {
            Expr::Binary(BinOp::Or, _, rhs) => match *rhs {
                Expr::Binary(BinOp::And, _, _) => {}
                other => panic!("unexpected rhs: {other:?}"),
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn equality_binds_tighter_than_and() {
        // a == b && c == d  ==  (a == b) && (c == d)
        let expr = parse(r#"a == "x" && b == "y""#).unwrap();
        match expr {
            Expr::Binary(BinOp::And, lhs, rhs) => {
                assert!(matches!(*lhs, Expr::Binary(BinOp::Eq, _, _)));
                assert!(matches!(*rhs, Expr::Binary(BinOp::Eq, _, _)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn plus_binds_tighter_than_comparison() {
        let expr = parse(r#"a + b == "xy""#).unwrap();
        match expr {
            Expr::Binary(BinOp::Eq, lhs, _) => {
                assert!(matches!(*lhs, Expr::Binary(BinOp::Add, _, _)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn single_and_double_quotes() {
        assert_eq!(parse(r#""abc""#).unwrap(), Expr::Str("abc".to_string()));
        assert_eq!(parse("'abc'").unwrap(), Expr::Str("abc".to_string()));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            parse(r#""a\"b""#).unwrap(),
            Expr::Str("a\"b".to_string())
        );
        assert_eq!(parse(r#""a\\b""#).unwrap(), Expr::Str("a\\b".to_string()));
    }

    #[test]
    fn parenthesized_grouping() {
        let expr = parse("(a || b) && c").unwrap();
        assert!(matches!(expr, Expr::Binary(BinOp::And, _, _)));
    }

    #[test]
    fn rejects_trailing_tokens() {
        assert!(matches!(
            parse("true false").unwrap_err(),
            ParseError::TrailingInput(_)
        ));
    }

    #[test]
    fn rejects_dangling_operators() {
        assert!(parse("a &&").is_err());
        assert!(parse("== b").is_err());
        assert!(parse("a = b").is_err());
    }

    #[test]
    fn rejects_hyphenated_words() {
        // Bucket names like "my-bucket" must not parse; the config layer
        // falls back to treating them as static strings.
        assert!(parse("my-bucket").is_err());
    }

    #[test]
    fn null_literal() {
        assert_eq!(parse("null").unwrap(), Expr::Null);
    }

    #[test]
    fn env_call() {
        let expr = parse(r#"env("HOME")"#).unwrap();
        assert_eq!(expr, Expr::Env(Box::new(Expr::Str("HOME".to_string()))));
    }

    #[test]
    fn env_as_plain_field_when_not_called() {
        assert_eq!(parse("env").unwrap(), Expr::Field(vec!["env".to_string()]));
    }
}
