//! Integration tests for the rule language end to end: lexer →
//! shunting-yard → evaluator → command dispatch → priority selection.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use powerctl::error::{Error, EvaluationError, SyntaxErrorKind};
use powerctl::rules::{RuleEngine, LAST_EXECUTION_TIME};
use powerctl::script::{self, command, evaluator, lexer, VariableStorage};

use crate::mock_adapters::MockClock;

/// Engine whose `FIRE(n)` appends `n` to the returned log.
fn engine_with_log(clock: Rc<MockClock>) -> (RuleEngine, Rc<RefCell<Vec<i64>>>) {
    let mut engine = RuleEngine::new("it", clock, 16);
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    engine.register_function("FIRE", move |cmd, vars| {
        sink.borrow_mut().push(cmd.eval_argument(0, vars)? as i64);
        Ok(true)
    });
    (engine, log)
}

// ── Priority selection ───────────────────────────────────────

#[test]
fn equal_priority_rules_all_fire_until_a_higher_tier_matches() {
    let (mut engine, log) = engine_with_log(Rc::new(MockClock::at(0)));
    engine.set_var("R1", true);
    engine.set_var("R2", true);
    engine.set_var("R3", false);
    engine.add_rule(5, "R1", "FIRE(1)").unwrap();
    engine.add_rule(5, "R2", "FIRE(2)").unwrap();
    engine.add_rule(10, "R3", "FIRE(3)").unwrap();

    engine.reason();
    assert_eq!(*log.borrow(), vec![1, 2]);

    log.borrow_mut().clear();
    engine.set_var("R3", true);
    engine.reason();
    assert_eq!(*log.borrow(), vec![3], "R1/R2 skipped while R3 holds");
}

#[test]
fn tier_executes_in_storage_order_not_priority_position() {
    let (mut engine, log) = engine_with_log(Rc::new(MockClock::at(0)));
    engine.add_rule(7, "1", "FIRE(30)").unwrap();
    engine.add_rule(2, "1", "FIRE(99)").unwrap();
    engine.add_rule(7, "1", "FIRE(10); FIRE(20)").unwrap();
    engine.reason();
    assert_eq!(*log.borrow(), vec![30, 10, 20]);
}

#[test]
fn negative_priorities_still_select_the_maximum() {
    let (mut engine, log) = engine_with_log(Rc::new(MockClock::at(0)));
    engine.add_rule(-5, "1", "FIRE(1)").unwrap();
    engine.add_rule(-1, "1", "FIRE(2)").unwrap();
    assert_eq!(engine.reason().tier, Some(-1));
    assert_eq!(*log.borrow(), vec![2]);
}

#[test]
fn erroring_rule_never_blocks_the_tick() {
    let (mut engine, log) = engine_with_log(Rc::new(MockClock::at(0)));
    engine.set_var("NAME", "pump");
    engine.add_rule(100, "NAME > 3", "FIRE(100)").unwrap();
    engine.add_rule(100, "1 +", "FIRE(101)").unwrap();
    engine.add_rule(1, "NAME == \"pump\"", "FIRE(1)").unwrap();

    let report = engine.reason();
    assert_eq!(report.errors, 2);
    assert_eq!(report.tier, Some(1));
    assert_eq!(*log.borrow(), vec![1]);
}

// ── Time variables ───────────────────────────────────────────

#[test]
fn rate_limited_rule_uses_last_execution_time() {
    let clock = Rc::new(MockClock::at(500));
    let (mut engine, log) = engine_with_log(Rc::clone(&clock));
    engine
        .add_rule(1, "CURRENT_TIME - LAST_EXECUTION_TIME >= 300", "FIRE(1)")
        .unwrap();

    engine.reason();
    assert_eq!(engine.get_var::<u64>(LAST_EXECUTION_TIME), 500);

    clock.advance(299);
    engine.reason();
    clock.advance(1);
    engine.reason();
    assert_eq!(*log.borrow(), vec![1, 1]);
    assert_eq!(engine.get_var::<u64>(LAST_EXECUTION_TIME), 800);
}

#[test]
fn large_unsigned_times_compare_exactly() {
    let clock = Rc::new(MockClock::at(u64::MAX - 1));
    let (mut engine, _) = engine_with_log(Rc::clone(&clock));
    engine.set_var("DEADLINE", u64::MAX);
    assert!(engine.execute_if("CURRENT_TIME < DEADLINE", "FIRE(1)").unwrap());
    clock.set(u64::MAX);
    assert!(!engine.execute_if("CURRENT_TIME < DEADLINE", "FIRE(1)").unwrap());
}

// ── Evaluator scenarios ──────────────────────────────────────

#[test]
fn accessor_rebinding_changes_outcome() {
    let tap = Rc::new(Cell::new(4.0));
    let mut vars = VariableStorage::new();
    let t = Rc::clone(&tap);
    vars.set_accessor("TAP", move || t.get());
    vars.set_accessor("PS", || true);

    let rpn = script::compile("(TAP <= 5) && (PS == 1)").unwrap();
    assert!(evaluator::evaluate_bool(&rpn, &vars).unwrap());

    vars.set_accessor("TAP", || 6.0);
    assert!(!evaluator::evaluate_bool(&rpn, &vars).unwrap());
}

#[test]
fn array_set_semantics() {
    let mut vars = VariableStorage::new();
    vars.set_constant("UTL", vec!["b".to_string(), "a".to_string()]);

    let eval = |expr: &str| evaluator::evaluate_bool(&script::compile(expr).unwrap(), &vars);
    assert!(eval("UTL == [\"a\",\"b\"]").unwrap());
    assert!(!eval("UTL == [\"a\"]").unwrap());
    assert!(eval("UTL != [\"a\",\"c\"]").unwrap());
    assert!(eval("UTL || [\"a\",\"c\"]").unwrap());
    assert!(!eval("UTL || [\"x\",\"y\"]").unwrap());
    assert!(eval("UTL && [\"a\"]").unwrap());
    assert_eq!(
        eval("UTL < [\"a\"]"),
        Err(EvaluationError::UnknownArrayComparison("<".into()))
    );
}

#[test]
fn malformed_array_literal_is_rejected_at_load() {
    let (mut engine, log) = engine_with_log(Rc::new(MockClock::at(0)));
    engine.set_var("UTL", Vec::<String>::new());
    assert!(matches!(
        engine.add_rule(1, "UTL == [1 + 2]", "FIRE(1)"),
        Err(Error::Syntax(_))
    ));
    assert!(matches!(
        engine.add_rule(1, "UTL != [a & b]", "FIRE(2)"),
        Err(Error::Syntax(_))
    ));
    assert!(engine.rules().is_empty());
    engine.reason();
    assert!(log.borrow().is_empty());
}

#[test]
fn unsigned_time_compares_against_fractions_and_negatives() {
    let (mut engine, _) = engine_with_log(Rc::new(MockClock::at(0)));
    assert!(!engine.execute_if("CURRENT_TIME >= 0.5", "FIRE(1)").unwrap());
    assert!(engine.execute_if("CURRENT_TIME > -1", "FIRE(1)").unwrap());
}

#[test]
fn string_operands_only_support_equality() {
    let vars = VariableStorage::new();
    let rpn = script::compile("\"a\" + \"b\"").unwrap();
    assert!(matches!(
        evaluator::evaluate(&rpn, &vars),
        Err(EvaluationError::UnsupportedStringOperator(_))
    ));
}

#[test]
fn trailing_operator_is_an_unbalanced_expression() {
    let rpn = script::compile("3 + ").unwrap();
    assert_eq!(
        evaluator::evaluate(&rpn, &VariableStorage::new()),
        Err(EvaluationError::UnbalancedExpression)
    );
}

#[test]
fn unterminated_string_fails_at_lex_time() {
    let err = lexer::tokenize("\"unterminated").unwrap_err();
    assert_eq!(err.kind, SyntaxErrorKind::UnterminatedString);
}

// ── Commands ─────────────────────────────────────────────────

#[test]
fn command_text_separates_into_named_groups() {
    let commands = command::parse("fn_0(Val0); fn_1(res0)").unwrap();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].name, "fn_0");
    assert_eq!(commands[0].arguments.len(), 1);
    assert_eq!(commands[0].arguments[0][0].lexeme, "Val0");
    assert_eq!(commands[1].name, "fn_1");
    assert_eq!(commands[1].arguments[0][0].lexeme, "res0");
}

#[test]
fn arguments_evaluate_against_engine_variables() {
    let (mut engine, log) = engine_with_log(Rc::new(MockClock::at(0)));
    engine.set_var("Val0", 10_i64);
    assert!(engine.execute("FIRE(Val0 * 3); FIRE(Val0 % 4)").unwrap());
    assert_eq!(*log.borrow(), vec![30, 2]);
}

#[test]
fn unknown_function_fails_the_command_but_not_the_rest() {
    let (engine, log) = engine_with_log(Rc::new(MockClock::at(0)));
    assert!(!engine.execute("NOPE(1); FIRE(2)").unwrap());
    assert_eq!(*log.borrow(), vec![2]);
    assert_eq!(
        engine
            .functions()
            .call(&command::parse("NOPE()").unwrap()[0], engine.variables()),
        Err(Error::UnknownFunction("NOPE".into()))
    );
}
