//! Property and fuzz-style tests for robustness of the rule language.
//!
//! Runs on host (x86_64) only: proptest is not available for ESP32 targets.
//! On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use powerctl::script::token::join;
use powerctl::script::{self, command, evaluator, lexer, VariableStorage};
use proptest::prelude::*;

// ── Lexer robustness ─────────────────────────────────────────

proptest! {
    /// Arbitrary text either lexes or yields a SyntaxError; it never panics.
    #[test]
    fn lexer_never_panics(text in "\\PC{0,64}") {
        let _ = lexer::tokenize(&text);
    }

    /// The full pipeline never panics on arbitrary printable input.
    #[test]
    fn pipeline_never_panics(text in "[ -~]{0,48}") {
        let vars = VariableStorage::new();
        if let Ok(rpn) = script::compile(&text) {
            let _ = evaluator::evaluate(&rpn, &vars);
        }
        let _ = command::parse(&text);
    }
}

// ── Round-trip ───────────────────────────────────────────────

fn arb_operand() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u32..10_000).prop_map(|n| n.to_string()),
        (0u32..1000, 1u32..100).prop_map(|(a, b)| format!("{a}.{b}")),
        "[A-Z][A-Z0-9_]{0,6}",
        "[a-z]{0,6}".prop_map(|s| format!("\"{s}\"")),
        proptest::collection::vec("[a-z]{1,4}", 0..3)
            .prop_map(|v| format!("[{}]", v.iter().map(|s| format!("\"{s}\"")).collect::<Vec<_>>().join(","))),
    ]
}

fn arb_operator() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("+"), Just("-"), Just("*"), Just("/"), Just("^"), Just("%"),
        Just("&&"), Just("||"),
        Just("=="), Just("!="), Just("<"), Just("<="), Just(">"), Just(">="),
    ]
}

fn arb_expression() -> impl Strategy<Value = String> {
    (arb_operand(), proptest::collection::vec((arb_operator(), arb_operand()), 0..6)).prop_map(
        |(first, rest)| {
            let mut s = first;
            for (op, operand) in rest {
                s.push(' ');
                s.push_str(op);
                s.push(' ');
                s.push_str(&operand);
            }
            s
        },
    )
}

proptest! {
    /// Re-joining lexemes with single spaces and re-lexing yields the same
    /// token sequence.
    #[test]
    fn lexeme_rejoin_round_trip(expr in arb_expression()) {
        let tokens = lexer::tokenize(&expr).unwrap();
        let again = lexer::tokenize(&join(&tokens)).unwrap();
        prop_assert_eq!(tokens, again);
    }
}

// ── Evaluation ───────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Expr {
    Num(u8),
    Var(usize),
    Bin(Box<Expr>, &'static str, Box<Expr>),
}

const VAR_NAMES: [&str; 3] = ["A", "B", "C"];
const VAR_VALUES: [f64; 3] = [3.0, 7.0, 12.0];

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![(0u8..20).prop_map(Expr::Num), (0usize..3).prop_map(Expr::Var)];
    leaf.prop_recursive(4, 24, 2, |inner| {
        (
            inner.clone(),
            prop_oneof![Just("+"), Just("-"), Just("*"), Just("&&"), Just("||"), Just("<"), Just("==")],
            inner,
        )
            .prop_map(|(l, op, r)| Expr::Bin(Box::new(l), op, Box::new(r)))
    })
}

/// Every sub-expression wrapped in parentheses.
fn render(e: &Expr) -> String {
    match e {
        Expr::Num(n) => n.to_string(),
        Expr::Var(i) => VAR_NAMES[*i].to_string(),
        Expr::Bin(l, op, r) => format!("({} {} {})", render(l), op, render(r)),
    }
}

fn compute(e: &Expr) -> f64 {
    let truth = |v: f64| v != 0.0;
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    match e {
        Expr::Num(n) => f64::from(*n),
        Expr::Var(i) => VAR_VALUES[*i],
        Expr::Bin(l, op, r) => {
            let (a, b) = (compute(l), compute(r));
            match *op {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                "&&" => flag(truth(a) && truth(b)),
                "||" => flag(truth(a) || truth(b)),
                "<" => flag(a < b),
                "==" => flag(a == b),
                _ => unreachable!(),
            }
        }
    }
}

fn vars() -> VariableStorage {
    let mut vars = VariableStorage::new();
    for (name, value) in VAR_NAMES.iter().zip(VAR_VALUES) {
        vars.set_constant(*name, value);
    }
    vars
}

proptest! {
    /// Fully parenthesised expressions evaluate to the directly computed
    /// value whatever the precedence table says.
    #[test]
    fn parenthesised_expressions_match_direct_computation(e in arb_expr()) {
        let text = render(&e);
        let rpn = script::compile(&text).unwrap();
        let got = evaluator::evaluate(&rpn, &vars()).unwrap();
        prop_assert!((got - compute(&e)).abs() < 1e-6, "{} gave {}", text, got);
    }

    /// Same RPN against unchanged variables gives the same answer.
    #[test]
    fn evaluation_is_deterministic(expr in arb_expression()) {
        let vars = vars();
        if let Ok(rpn) = script::compile(&expr) {
            let first = evaluator::evaluate(&rpn, &vars);
            let second = evaluator::evaluate(&rpn, &vars);
            match (first, second) {
                (Ok(a), Ok(b)) => prop_assert!(a == b || (a.is_nan() && b.is_nan())),
                (a, b) => prop_assert_eq!(a, b),
            }
        }
    }
}
