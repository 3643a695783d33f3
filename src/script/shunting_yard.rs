//! Infix → RPN conversion (shunting-yard).
//!
//! Operands go straight to the output; an incoming binary operator first
//! pops every stacked operator that binds at least as tightly (strictly
//! tighter for right-associative operators).  Unary `!` never pops on
//! arrival because it has no left operand.  Separators are dropped.

use crate::error::{SyntaxError, SyntaxErrorKind};

use super::token::{Token, TokenKind};

/// Convert an infix token sequence to postfix order.
pub fn apply(tokens: &[Token]) -> Result<Vec<Token>, SyntaxError> {
    let mut output: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut stack: Vec<&Token> = Vec::new();

    for token in tokens {
        match token.kind {
            TokenKind::LeftParen => stack.push(token),
            TokenKind::RightParen => loop {
                match stack.pop() {
                    Some(top) if top.kind == TokenKind::LeftParen => break,
                    Some(top) => output.push(top.clone()),
                    None => {
                        return Err(SyntaxError::new(SyntaxErrorKind::UnbalancedParentheses, 0));
                    }
                }
            },
            TokenKind::Separator => {}
            kind if kind.is_operator() => {
                if !token.is_not() {
                    while let Some(top) = stack.last() {
                        if top.kind == TokenKind::LeftParen || !pops_before(top, token) {
                            break;
                        }
                        output.push((*top).clone());
                        stack.pop();
                    }
                }
                stack.push(token);
            }
            _ => output.push(token.clone()),
        }
    }

    while let Some(top) = stack.pop() {
        if top.kind == TokenKind::LeftParen {
            return Err(SyntaxError::new(SyntaxErrorKind::UnbalancedParentheses, 0));
        }
        output.push(top.clone());
    }

    Ok(output)
}

fn pops_before(top: &Token, incoming: &Token) -> bool {
    if incoming.is_right_associative() {
        top.precedence() > incoming.precedence()
    } else {
        top.precedence() >= incoming.precedence()
    }
}
