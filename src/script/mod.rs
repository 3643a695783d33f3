//! On-device rule language.
//!
//! ```text
//!  condition text ──▶ lexer ──▶ shunting_yard ──▶ RPN ──▶ evaluator ──▶ bool
//!                                                            ▲
//!                                                 VariableStorage (host state)
//!
//!  command text ──▶ lexer ──▶ command::separate ──▶ FunctionRegistry::execute
//! ```
//!
//! The language has literals (numbers, `"strings"`, `["arrays"]`),
//! identifiers, `&& || ! + - * / ^ % == != < <= > >=` and parentheses.
//! There are no loops, user functions or scopes beyond one flat variable
//! table per engine.

pub mod command;
pub mod evaluator;
pub mod lexer;
pub mod shunting_yard;
pub mod token;
pub mod variables;

pub use command::{ArgumentGroup, Command, Function, FunctionRegistry};
pub use token::{Token, TokenKind};
pub use variables::{Bound, FromValue, Value, VariableStorage, VariableType};

use crate::error::SyntaxError;

/// Lex and convert an infix expression to RPN.
pub fn compile(expression: &str) -> Result<Vec<Token>, SyntaxError> {
    shunting_yard::apply(&lexer::tokenize(expression)?)
}
