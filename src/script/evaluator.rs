//! RPN stack machine.
//!
//! Operands (literals, identifiers, array literals) are pushed as tokens.
//! Each operator pops its operands (one for `!`, two otherwise), picks a
//! branch from the operands' types, and pushes a numeric-literal token, so
//! every intermediate and final result is a number (`0`/`1` for booleans).
//!
//! Branch selection, in order:
//!
//! 1. either operand is a string → only `==` / `!=`
//! 2. either operand is an array → set comparisons (see [`eval_array`])
//! 3. otherwise by operator kind: boolean on truthiness, arithmetic on
//!    doubles, comparison as `u64` when either side is `UInt64` and both
//!    are whole non-negative numbers, as `f64` otherwise.
//!
//! Doubles compare exactly (IEEE `==`), so `inf == inf` holds and
//! `0.1 + 0.2 == 0.3` does not.

use log::trace;

use crate::error::EvaluationError;

use super::token::{Token, TokenKind};
use super::variables::{Value, VariableStorage, VariableType};

/// Evaluate an RPN token stream to a number.
pub fn evaluate(rpn: &[Token], vars: &VariableStorage) -> Result<f64, EvaluationError> {
    let mut stack: Vec<Token> = Vec::with_capacity(rpn.len());

    for token in rpn {
        if token.kind.is_operand() {
            stack.push(token.clone());
            continue;
        }
        if !token.kind.is_operator() {
            return Err(EvaluationError::TypeMismatch(token.lexeme.clone()));
        }

        let result = if token.is_not() {
            let operand = stack.pop().ok_or(EvaluationError::UnbalancedExpression)?;
            eval_not(&operand, vars)?
        } else {
            let rhs = stack.pop().ok_or(EvaluationError::UnbalancedExpression)?;
            let lhs = stack.pop().ok_or(EvaluationError::UnbalancedExpression)?;
            eval_binary(token, &lhs, &rhs, vars)?
        };
        trace!("eval: {} -> {}", token.lexeme, result.lexeme);
        stack.push(result);
    }

    match stack.as_slice() {
        [only] => final_value(only, vars),
        _ => Err(EvaluationError::UnbalancedExpression),
    }
}

/// Evaluate and interpret the result as a condition (`value != 0`).
pub fn evaluate_bool(rpn: &[Token], vars: &VariableStorage) -> Result<bool, EvaluationError> {
    evaluate(rpn, vars).map(|v| v != 0.0)
}

/// A lone numeric literal is the normal end state.  A lone identifier is
/// accepted too, so a bare `GRID` condition reads the variable directly.
fn final_value(token: &Token, vars: &VariableStorage) -> Result<f64, EvaluationError> {
    match token.kind {
        TokenKind::NumericLiteral | TokenKind::Identifier => {
            match classify(token, vars) {
                VariableType::String | VariableType::Array => {
                    Err(EvaluationError::TypeMismatch(token.lexeme.clone()))
                }
                _ => Ok(vars.get::<f64>(&token.lexeme)),
            }
        }
        _ => Err(EvaluationError::TypeMismatch(token.lexeme.clone())),
    }
}

/// Operand type before coercion.
fn classify(token: &Token, vars: &VariableStorage) -> VariableType {
    match token.kind {
        TokenKind::StringLiteral => VariableType::String,
        TokenKind::ArrayLiteral => VariableType::Array,
        TokenKind::NumericLiteral => VariableType::Double,
        _ => vars.var_type(&token.lexeme),
    }
}

fn truthy(token: &Token, vars: &VariableStorage) -> bool {
    vars.get::<bool>(&token.lexeme)
}

fn eval_not(operand: &Token, vars: &VariableStorage) -> Result<Token, EvaluationError> {
    match classify(operand, vars) {
        VariableType::String => Err(EvaluationError::UnsupportedStringOperator("!".into())),
        VariableType::Array => Err(EvaluationError::UnknownArrayComparison("!".into())),
        _ => Ok(Token::boolean(!truthy(operand, vars))),
    }
}

fn eval_binary(
    op: &Token,
    lhs: &Token,
    rhs: &Token,
    vars: &VariableStorage,
) -> Result<Token, EvaluationError> {
    let lt = classify(lhs, vars);
    let rt = classify(rhs, vars);

    if lt == VariableType::String || rt == VariableType::String {
        return eval_string(op, lhs, rhs, vars);
    }
    if lt == VariableType::Array || rt == VariableType::Array {
        return eval_array(op, lhs, rhs, vars);
    }

    match op.kind {
        TokenKind::BooleanOp => {
            let (a, b) = (truthy(lhs, vars), truthy(rhs, vars));
            let result = match op.lexeme.as_str() {
                "&&" => a && b,
                "||" => a || b,
                _ => return Err(EvaluationError::TypeMismatch(op.lexeme.clone())),
            };
            Ok(Token::boolean(result))
        }
        TokenKind::ArithmeticOp => eval_arithmetic(op, lhs, rhs, vars).map(Token::number),
        TokenKind::ComparisonOp => {
            let unsigned = lt == VariableType::UInt64 || rt == VariableType::UInt64;
            let result = match (unsigned, exact_u64(lhs, vars), exact_u64(rhs, vars)) {
                (true, Some(a), Some(b)) => compare(&op.lexeme, a, b),
                _ => compare(
                    &op.lexeme,
                    vars.get::<f64>(&lhs.lexeme),
                    vars.get::<f64>(&rhs.lexeme),
                ),
            };
            result.map(Token::boolean)
        }
        _ => Err(EvaluationError::TypeMismatch(op.lexeme.clone())),
    }
}

/// Operand as an exact `u64`, or `None` when it is fractional, negative,
/// out of range or not numeric.
fn exact_u64(token: &Token, vars: &VariableStorage) -> Option<u64> {
    let whole = |v: f64| {
        (v >= 0.0 && v.fract() == 0.0 && v < 18_446_744_073_709_551_616.0).then_some(v as u64)
    };
    match vars.value(&token.lexeme) {
        Some(Value::UInt64(v)) => Some(v),
        Some(Value::Int(v)) => u64::try_from(v).ok(),
        Some(Value::Bool(v)) => Some(u64::from(v)),
        Some(Value::Double(v)) => whole(v),
        Some(_) => None,
        None => {
            let text = token.lexeme.trim();
            text.parse::<u64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(whole))
        }
    }
}

fn compare<T: PartialOrd>(op: &str, a: T, b: T) -> Result<bool, EvaluationError> {
    Ok(match op {
        "==" => a == b,
        "!=" => a != b,
        "<" => a < b,
        "<=" => a <= b,
        ">" => a > b,
        ">=" => a >= b,
        other => return Err(EvaluationError::TypeMismatch(other.to_string())),
    })
}

fn eval_arithmetic(
    op: &Token,
    lhs: &Token,
    rhs: &Token,
    vars: &VariableStorage,
) -> Result<f64, EvaluationError> {
    let a = vars.get::<f64>(&lhs.lexeme);
    let b = vars.get::<f64>(&rhs.lexeme);
    match op.lexeme.as_str() {
        "+" => Ok(a + b),
        "-" => Ok(a - b),
        "*" => Ok(a * b),
        "/" if b == 0.0 => Err(EvaluationError::DivisionByZero),
        "/" => Ok(a / b),
        "^" => Ok(a.powf(b)),
        "%" => {
            let (a, b) = (a as i64, b as i64);
            if b == 0 {
                return Err(EvaluationError::DivisionByZero);
            }
            Ok(a.wrapping_rem(b) as f64)
        }
        other => Err(EvaluationError::TypeMismatch(other.to_string())),
    }
}

fn eval_string(
    op: &Token,
    lhs: &Token,
    rhs: &Token,
    vars: &VariableStorage,
) -> Result<Token, EvaluationError> {
    let a = vars.get::<String>(&lhs.lexeme);
    let b = vars.get::<String>(&rhs.lexeme);
    match op.lexeme.as_str() {
        "==" => Ok(Token::boolean(a == b)),
        "!=" => Ok(Token::boolean(a != b)),
        other => Err(EvaluationError::UnsupportedStringOperator(other.to_string())),
    }
}

/// Array comparisons, all order-independent and boolean-valued:
///
/// - `==` both sides hold exactly the same elements (same cardinality,
///   every element matched once)
/// - `!=` negation of `==`
/// - `||` the sides share at least one element
/// - `&&` every element of the right side is present on the left
fn eval_array(
    op: &Token,
    lhs: &Token,
    rhs: &Token,
    vars: &VariableStorage,
) -> Result<Token, EvaluationError> {
    let elements = |t: &Token| {
        vars.try_get::<Vec<String>>(&t.lexeme)
            .ok_or_else(|| EvaluationError::TypeMismatch(t.lexeme.clone()))
    };
    let (a, b) = (elements(lhs)?, elements(rhs)?);
    let result = match op.lexeme.as_str() {
        "==" => set_equal(&a, &b),
        "!=" => !set_equal(&a, &b),
        "||" => a.iter().any(|x| b.contains(x)),
        "&&" => b.iter().all(|x| a.contains(x)),
        other => return Err(EvaluationError::UnknownArrayComparison(other.to_string())),
    };
    Ok(Token::boolean(result))
}

fn set_equal(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|x| {
        match b
            .iter()
            .enumerate()
            .position(|(i, y)| !used[i] && x == y)
        {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}
