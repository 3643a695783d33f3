//! A single prioritised rule.

use crate::error::{EvaluationError, SyntaxError};
use crate::script::command::{self, Command};
use crate::script::{evaluator, lexer, shunting_yard, Token, VariableStorage};

use super::record::RuleRecord;

/// `{priority, condition, command}`, parsed once and immutable afterwards.
///
/// The condition is cached in RPN order; the command is kept both as its
/// raw token run and pre-separated into [`Command`]s so dispatch does no
/// parsing.
#[derive(Debug, Clone)]
pub struct Rule {
    priority: i32,
    condition: Vec<Token>,
    command: Vec<Token>,
    commands: Vec<Command>,
    expression_text: String,
    command_text: String,
}

impl Rule {
    /// Parse a rule.  Fails on any lex/parse error in either string.
    pub fn parse(priority: i32, expression: &str, command: &str) -> Result<Self, SyntaxError> {
        let condition = shunting_yard::apply(&lexer::tokenize(expression)?)?;
        let command_tokens = lexer::tokenize(command)?;
        let commands = command::separate(&command_tokens)?;
        Ok(Self {
            priority,
            condition,
            command: command_tokens,
            commands,
            expression_text: expression.to_string(),
            command_text: command.to_string(),
        })
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Condition in RPN order.
    pub fn condition(&self) -> &[Token] {
        &self.condition
    }

    /// Command as lexed.
    pub fn command(&self) -> &[Token] {
        &self.command
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn expression_text(&self) -> &str {
        &self.expression_text
    }

    pub fn command_text(&self) -> &str {
        &self.command_text
    }

    pub fn evaluate(&self, vars: &VariableStorage) -> Result<bool, EvaluationError> {
        evaluator::evaluate_bool(&self.condition, vars)
    }

    /// Source form, for persistence.
    pub fn record(&self) -> RuleRecord {
        RuleRecord {
            priority: self.priority,
            expression: self.expression_text.clone(),
            command: self.command_text.clone(),
        }
    }
}

impl TryFrom<&RuleRecord> for Rule {
    type Error = SyntaxError;

    fn try_from(record: &RuleRecord) -> Result<Self, Self::Error> {
        Self::parse(record.priority, &record.expression, &record.command)
    }
}
