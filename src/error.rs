//! Unified error types for the PowerCtl firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! control loop's error handling uniform.  Interpreter errors fall into
//! two families:
//!
//! - [`SyntaxError`]: raised when a rule, expression or command string is
//!   first parsed, so a malformed rule fails to load.
//! - [`EvaluationError`]: raised during a tick; the rule engine catches
//!   it per rule and treats that rule as non-matching.

use core::fmt;

use crate::app::ports::{ConfigError, StorageError};

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Lexing or parsing failed.
    Syntax(SyntaxError),
    /// A token stream could not be evaluated.
    Evaluation(EvaluationError),
    /// A command named a function that is not registered.
    UnknownFunction(String),
    /// A registered function rejected its arguments.
    Callback(&'static str),
    /// The engine already holds its configured maximum number of rules.
    RuleLimit(usize),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
    /// Persistent storage failed.
    Storage(&'static str),
    /// A persisted blob or remote payload could not be decoded.
    Decode(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(e) => write!(f, "syntax: {e}"),
            Self::Evaluation(e) => write!(f, "evaluation: {e}"),
            Self::UnknownFunction(name) => write!(f, "unknown function '{name}'"),
            Self::Callback(msg) => write!(f, "callback: {msg}"),
            Self::RuleLimit(max) => write!(f, "rule limit of {max} reached"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Storage(msg) => write!(f, "storage: {msg}"),
            Self::Decode(what) => write!(f, "could not decode {what}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Syntax errors
// ---------------------------------------------------------------------------

/// A lex/parse failure, tagged with the byte offset where it was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    /// Byte offset into the source text (0 when not applicable).
    pub position: usize,
}

impl SyntaxError {
    pub const fn new(kind: SyntaxErrorKind, position: usize) -> Self {
        Self { kind, position }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    /// `"` without a closing quote.
    UnterminatedString,
    /// `[` without a closing bracket.
    UnterminatedArray,
    /// A character no token can start with.
    UnexpectedCharacter(char),
    /// Lone `&`, lone `|`, lone `=`.
    MalformedOperator,
    /// Numeric literal with more than one decimal point.
    MalformedNumber,
    /// Parentheses do not pair up.
    UnbalancedParentheses,
    /// Command text does not follow `name(arg, ...); ...`.
    MalformedCommand,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SyntaxErrorKind::UnterminatedString => write!(f, "unterminated string literal")?,
            SyntaxErrorKind::UnterminatedArray => write!(f, "unterminated array literal")?,
            SyntaxErrorKind::UnexpectedCharacter(c) => write!(f, "unexpected character '{c}'")?,
            SyntaxErrorKind::MalformedOperator => write!(f, "malformed operator")?,
            SyntaxErrorKind::MalformedNumber => write!(f, "malformed numeric literal")?,
            SyntaxErrorKind::UnbalancedParentheses => write!(f, "unbalanced parentheses")?,
            SyntaxErrorKind::MalformedCommand => write!(f, "malformed command")?,
        }
        write!(f, " at offset {}", self.position)
    }
}

impl From<SyntaxError> for Error {
    fn from(e: SyntaxError) -> Self {
        Self::Syntax(e)
    }
}

// ---------------------------------------------------------------------------
// Evaluation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    /// The value stack underflowed or did not end with exactly one value.
    UnbalancedExpression,
    /// Strings only support `==` and `!=`.
    UnsupportedStringOperator(String),
    /// Arrays only support `==`, `!=`, `&&` and `||`.
    UnknownArrayComparison(String),
    /// The final value was not numeric, or a token sat where an operator
    /// was expected.
    TypeMismatch(String),
    /// `/` or `%` with a zero right-hand side.
    DivisionByZero,
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnbalancedExpression => write!(f, "unbalanced expression"),
            Self::UnsupportedStringOperator(op) => {
                write!(f, "operator '{op}' is not supported on strings")
            }
            Self::UnknownArrayComparison(op) => write!(f, "unknown array comparison '{op}'"),
            Self::TypeMismatch(lexeme) => write!(f, "type mismatch at '{lexeme}'"),
            Self::DivisionByZero => write!(f, "division by zero"),
        }
    }
}

impl From<EvaluationError> for Error {
    fn from(e: EvaluationError) -> Self {
        Self::Evaluation(e)
    }
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
            ConfigError::NotFound => Self::Config("not found"),
            ConfigError::Corrupted => Self::Config("corrupted"),
            ConfigError::StorageFull => Self::Config("storage full"),
            ConfigError::IoError => Self::Config("I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => Self::Storage("key not found"),
            StorageError::Full => Self::Storage("storage full"),
            StorageError::IoError => Self::Storage("I/O error"),
            StorageError::Corrupted => Self::Storage("corrupted blob"),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
