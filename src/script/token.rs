//! Token model shared by the lexer, the shunting-yard converter, the
//! evaluator and the command separator.

use core::fmt;

/// Lexical category of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    /// `[...]` kept verbatim; elements are split out on demand.
    ArrayLiteral,
    /// `+ - * / ^ %`
    ArithmeticOp,
    /// `&& || !`
    BooleanOp,
    /// `< <= > >= == !=`
    ComparisonOp,
    /// `"..."`, lexeme includes the quotes.
    StringLiteral,
    NumericLiteral,
    Identifier,
    /// `,` or `;`
    Separator,
}

impl TokenKind {
    pub fn is_operator(self) -> bool {
        matches!(
            self,
            Self::ArithmeticOp | Self::BooleanOp | Self::ComparisonOp
        )
    }

    /// Tokens that push a value onto the evaluator stack.
    pub fn is_operand(self) -> bool {
        matches!(
            self,
            Self::ArrayLiteral | Self::StringLiteral | Self::NumericLiteral | Self::Identifier
        )
    }
}

/// A single lexeme with its category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
        }
    }

    /// Encode an intermediate evaluation result.
    pub fn number(value: f64) -> Self {
        Self::new(TokenKind::NumericLiteral, format!("{value}"))
    }

    /// Encode a boolean result as `1` / `0`.
    pub fn boolean(value: bool) -> Self {
        Self::new(TokenKind::NumericLiteral, if value { "1" } else { "0" })
    }

    pub fn is(&self, kind: TokenKind, lexeme: &str) -> bool {
        self.kind == kind && self.lexeme == lexeme
    }

    /// Unary boolean NOT.
    pub fn is_not(&self) -> bool {
        self.is(TokenKind::BooleanOp, "!")
    }

    /// Binding strength used by the shunting-yard converter.  Higher binds
    /// tighter; non-operators return 0.
    ///
    /// Operator kinds are ordered Boolean < Comparison < Arithmetic, and
    /// each kind is refined internally (`||` below `&&`, `+ -` below
    /// `* / %` below `^`).  Unary `!` binds tightest.
    pub fn precedence(&self) -> u8 {
        match (self.kind, self.lexeme.as_str()) {
            (TokenKind::BooleanOp, "||") => 1,
            (TokenKind::BooleanOp, "&&") => 2,
            (TokenKind::ComparisonOp, "==" | "!=") => 3,
            (TokenKind::ComparisonOp, _) => 4,
            (TokenKind::ArithmeticOp, "+" | "-") => 5,
            (TokenKind::ArithmeticOp, "^") => 7,
            (TokenKind::ArithmeticOp, _) => 6,
            // Unary NOT applies to the operand directly after it.
            (TokenKind::BooleanOp, _) => 8,
            _ => 0,
        }
    }

    /// `^` and unary `!` associate to the right.
    pub fn is_right_associative(&self) -> bool {
        self.is(TokenKind::ArithmeticOp, "^") || self.is_not()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lexeme)
    }
}

/// Re-join a token run with single spaces.
pub fn join(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.lexeme.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
