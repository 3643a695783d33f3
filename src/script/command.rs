//! Command separation and dispatch.
//!
//! Command grammar: `name(arg, arg, ...); name2(...)`.  Commands are split
//! on top-level `;`, arguments on `,` inside the command's parentheses.
//! Each argument is a flat token run (no nested parentheses) that the
//! callback may evaluate as a sub-expression.  A bare `name` is a
//! command with no arguments.

use std::collections::HashMap;
use std::fmt;

use log::warn;

use crate::error::{Error, Result, SyntaxError, SyntaxErrorKind};

use super::evaluator;
use super::lexer::{tokenize, unquote};
use super::shunting_yard;
use super::token::{self, Token, TokenKind};
use super::variables::VariableStorage;

/// One argument: a flat token run.
pub type ArgumentGroup = Vec<Token>;

/// A named function call with its argument groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub arguments: Vec<ArgumentGroup>,
}

impl Command {
    pub fn argument(&self, index: usize) -> Option<&[Token]> {
        self.arguments.get(index).map(Vec::as_slice)
    }

    /// Evaluate argument `index` as an expression.
    pub fn eval_argument(&self, index: usize, vars: &VariableStorage) -> Result<f64> {
        let group = self
            .argument(index)
            .ok_or(Error::Callback("missing argument"))?;
        let rpn = shunting_yard::apply(group)?;
        Ok(evaluator::evaluate(&rpn, vars)?)
    }

    /// Argument `index` as text.  A single string literal loses its
    /// quotes, a single bound identifier reads its value, anything else is
    /// the lexemes joined with spaces.
    pub fn argument_text(&self, index: usize, vars: &VariableStorage) -> Option<String> {
        match self.argument(index)? {
            [t] if t.kind == TokenKind::StringLiteral => Some(unquote(&t.lexeme).to_string()),
            [t] if t.kind == TokenKind::Identifier && vars.contains(&t.lexeme) => {
                Some(vars.get::<String>(&t.lexeme))
            }
            group => Some(token::join(group)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.arguments.iter().map(|g| token::join(g)).collect();
        write!(f, "{}({})", self.name, args.join(", "))
    }
}

/// Lex and separate command text.
pub fn parse(text: &str) -> core::result::Result<Vec<Command>, SyntaxError> {
    separate(&tokenize(text)?)
}

/// Split a command token sequence into commands.
pub fn separate(tokens: &[Token]) -> core::result::Result<Vec<Command>, SyntaxError> {
    let malformed = || SyntaxError::new(SyntaxErrorKind::MalformedCommand, 0);
    let mut commands = Vec::new();
    let mut iter = tokens.iter().peekable();

    while let Some(head) = iter.next() {
        if head.is(TokenKind::Separator, ";") {
            continue;
        }
        if head.kind != TokenKind::Identifier {
            return Err(malformed());
        }
        let mut command = Command {
            name: head.lexeme.clone(),
            arguments: Vec::new(),
        };

        if iter.peek().is_some_and(|t| t.kind == TokenKind::LeftParen) {
            iter.next();
            let mut group: ArgumentGroup = Vec::new();
            let mut closed = false;
            for t in iter.by_ref() {
                match t.kind {
                    TokenKind::RightParen => {
                        if group.is_empty() && !command.arguments.is_empty() {
                            return Err(malformed());
                        }
                        if !group.is_empty() {
                            command.arguments.push(core::mem::take(&mut group));
                        }
                        closed = true;
                        break;
                    }
                    TokenKind::Separator if t.lexeme == "," => {
                        if group.is_empty() {
                            return Err(malformed());
                        }
                        command.arguments.push(core::mem::take(&mut group));
                    }
                    TokenKind::Separator | TokenKind::LeftParen => return Err(malformed()),
                    _ => group.push(t.clone()),
                }
            }
            if !closed {
                return Err(SyntaxError::new(SyntaxErrorKind::UnbalancedParentheses, 0));
            }
        }

        match iter.next() {
            None => {}
            Some(t) if t.is(TokenKind::Separator, ";") => {}
            Some(_) => return Err(malformed()),
        }
        commands.push(command);
    }

    Ok(commands)
}

// ---------------------------------------------------------------------------
// Function registry
// ---------------------------------------------------------------------------

/// Native implementation of a named command.  `Ok(false)` and `Err` both
/// count as a failed command.
pub type Function = Box<dyn Fn(&Command, &VariableStorage) -> Result<bool>>;

/// Name → native function table.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Function>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Command, &VariableStorage) -> Result<bool> + 'static,
    {
        self.functions.insert(name.into(), Box::new(f));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Run one command.
    pub fn call(&self, command: &Command, vars: &VariableStorage) -> Result<bool> {
        let f = self
            .functions
            .get(&command.name)
            .ok_or_else(|| Error::UnknownFunction(command.name.clone()))?;
        f(command, vars)
    }

    /// Run every command in order and AND their outcomes.  A failing
    /// command does not stop the ones after it.
    pub fn execute(&self, commands: &[Command], vars: &VariableStorage) -> bool {
        let mut all_ok = true;
        for command in commands {
            match self.call(command, vars) {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Executor: {} reported failure", command);
                    all_ok = false;
                }
                Err(e) => {
                    warn!("Executor: {} failed: {}", command, e);
                    all_ok = false;
                }
            }
        }
        all_ok
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}
