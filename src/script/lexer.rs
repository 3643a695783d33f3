//! Lexer: rule/command text → token sequence.
//!
//! Dispatch order, first match wins:
//!
//! 1. whitespace (skipped)
//! 2. arithmetic operators `+ - * / ^ %`
//! 3. boolean operators `&& || !` (`!=` is handed to the comparison branch)
//! 4. array literal `[...]`, kept verbatim up to the closing `]`; the
//!    body must split into strings, numbers and identifiers
//! 5. string literal `"..."`
//! 6. numeric literal (digits and one `.`, no exponent)
//! 7. parentheses
//! 8. comparison operators `< <= > >= == !=`
//! 9. identifiers `[A-Za-z0-9_]+`
//! 10. separators `,` `;`
//!
//! A `-` is folded into a numeric literal only when it sits directly
//! against the digits and appears where an operand is expected, so
//! `3 - 5` is a subtraction while `(-5)` and `x * -2` carry a signed
//! literal.

use crate::error::{SyntaxError, SyntaxErrorKind};

use super::token::{Token, TokenKind};

/// Tokenize `text`.
pub fn tokenize(text: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(text).run()
}

/// Split the body of an array literal into its element strings.
///
/// Accepts the full lexeme (`["a", "b"]`) or just the body.  String
/// elements lose their quotes; bare numbers and identifiers are taken as
/// written.
pub fn tokenize_array_body(lexeme: &str) -> Result<Vec<String>, SyntaxError> {
    let trimmed = lexeme.trim();
    let body = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);

    let mut elements = Vec::new();
    for token in tokenize(body)? {
        match token.kind {
            TokenKind::StringLiteral => elements.push(unquote(&token.lexeme).to_string()),
            TokenKind::NumericLiteral | TokenKind::Identifier => elements.push(token.lexeme),
            TokenKind::Separator => {}
            _ => {
                let c = token.lexeme.chars().next().unwrap_or('?');
                return Err(SyntaxError::new(SyntaxErrorKind::UnexpectedCharacter(c), 0));
            }
        }
    }
    Ok(elements)
}

/// Strip one pair of surrounding double quotes, if present.
pub fn unquote(lexeme: &str) -> &str {
    lexeme
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(lexeme)
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'+' | b'-' | b'*' | b'/' | b'^' | b'%' => self.arithmetic(b),
                b'&' | b'|' => self.boolean(b)?,
                b'!' if self.peek_at(1) == Some(b'=') => self.comparison(b)?,
                b'!' => self.single(TokenKind::BooleanOp),
                b'[' => self.array()?,
                b'"' => self.string()?,
                b'0'..=b'9' | b'.' => self.number(self.pos)?,
                b'(' => self.single(TokenKind::LeftParen),
                b')' => self.single(TokenKind::RightParen),
                b'<' | b'>' | b'=' => self.comparison(b)?,
                b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.identifier(),
                b',' | b';' => self.single(TokenKind::Separator),
                _ => {
                    let c = self.src[self.pos..].chars().next().unwrap_or('?');
                    return Err(self.error(SyntaxErrorKind::UnexpectedCharacter(c)));
                }
            }
        }
        Ok(self.tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn error(&self, kind: SyntaxErrorKind) -> SyntaxError {
        SyntaxError::new(kind, self.pos)
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token::new(kind, &self.src[start..end]));
        self.pos = end;
    }

    fn single(&mut self, kind: TokenKind) {
        self.push(kind, self.pos, self.pos + 1);
    }

    /// True when the previous token leaves us expecting an operand.
    fn expects_operand(&self) -> bool {
        match self.tokens.last() {
            None => true,
            Some(t) => matches!(
                t.kind,
                TokenKind::LeftParen
                    | TokenKind::Separator
                    | TokenKind::ArithmeticOp
                    | TokenKind::BooleanOp
                    | TokenKind::ComparisonOp
            ),
        }
    }

    fn arithmetic(&mut self, b: u8) {
        let signed_literal = b == b'-'
            && matches!(self.peek_at(1), Some(b'0'..=b'9' | b'.'))
            && self.expects_operand();
        if signed_literal {
            let start = self.pos;
            self.pos += 1;
            // A bad number after the sign is reported by `number` itself.
            if self.number(start).is_ok() {
                return;
            }
            self.pos = start;
        }
        self.single(TokenKind::ArithmeticOp);
    }

    fn boolean(&mut self, b: u8) -> Result<(), SyntaxError> {
        if self.peek_at(1) == Some(b) {
            self.push(TokenKind::BooleanOp, self.pos, self.pos + 2);
            Ok(())
        } else {
            Err(self.error(SyntaxErrorKind::MalformedOperator))
        }
    }

    fn comparison(&mut self, b: u8) -> Result<(), SyntaxError> {
        let followed_by_eq = self.peek_at(1) == Some(b'=');
        match (b, followed_by_eq) {
            (b'<' | b'>', false) => self.single(TokenKind::ComparisonOp),
            (_, true) => self.push(TokenKind::ComparisonOp, self.pos, self.pos + 2),
            _ => return Err(self.error(SyntaxErrorKind::MalformedOperator)),
        }
        Ok(())
    }

    fn array(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        let mut i = self.pos + 1;
        let mut in_string = false;
        while let Some(&c) = self.bytes.get(i) {
            match c {
                b'"' => in_string = !in_string,
                b'[' if !in_string => {
                    return Err(SyntaxError::new(SyntaxErrorKind::UnexpectedCharacter('['), i));
                }
                b']' if !in_string => {
                    // Element errors are reported relative to the body.
                    tokenize_array_body(&self.src[start + 1..i])
                        .map_err(|e| SyntaxError::new(e.kind, start + 1 + e.position))?;
                    self.push(TokenKind::ArrayLiteral, start, i + 1);
                    return Ok(());
                }
                _ => {}
            }
            i += 1;
        }
        Err(self.error(SyntaxErrorKind::UnterminatedArray))
    }

    fn string(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        match self.bytes[start + 1..].iter().position(|&c| c == b'"') {
            Some(len) => {
                self.push(TokenKind::StringLiteral, start, start + len + 2);
                Ok(())
            }
            None => Err(self.error(SyntaxErrorKind::UnterminatedString)),
        }
    }

    /// Consume digits and at most one `.` from the current position.
    /// `start` may point at a leading `-`.
    fn number(&mut self, start: usize) -> Result<(), SyntaxError> {
        let mut end = self.pos;
        let mut dots = 0;
        let mut digits = 0;
        while let Some(&c) = self.bytes.get(end) {
            match c {
                b'0'..=b'9' => digits += 1,
                b'.' => dots += 1,
                _ => break,
            }
            end += 1;
        }
        if dots > 1 || digits == 0 {
            return Err(SyntaxError::new(SyntaxErrorKind::MalformedNumber, start));
        }
        self.push(TokenKind::NumericLiteral, start, end);
        Ok(())
    }

    fn identifier(&mut self) {
        let start = self.pos;
        let len = self.bytes[start..]
            .iter()
            .take_while(|c| c.is_ascii_alphanumeric() || **c == b'_')
            .count();
        self.push(TokenKind::Identifier, start, start + len);
    }
}
