//! Fuzz target: arbitrary condition/command text through the interpreter.
//!
//! Splits the input at the first NUL into an expression and a command,
//! loads them as a rule and runs a tick.  Any panic is a bug; syntax and
//! evaluation errors are expected outcomes.

#![no_main]

use std::rc::Rc;

use libfuzzer_sys::fuzz_target;
use powerctl::app::ports::Clock;
use powerctl::rules::RuleEngine;
use powerctl::script::{self, evaluator};

struct FixedClock;

impl Clock for FixedClock {
    fn now_secs(&self) -> u64 {
        1_700_000_000
    }
}

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let (expression, command) = text.split_once('\0').unwrap_or((text, "NOOP()"));

    let mut engine = RuleEngine::new("fuzz", Rc::new(FixedClock), 4);
    engine.register_function("NOOP", |_, _| Ok(true));
    engine.set_var("X", 42_i64);
    engine.set_var("TAGS", vec!["a".to_string(), "b".to_string()]);

    if let Ok(rpn) = script::compile(expression) {
        let _ = evaluator::evaluate(&rpn, engine.variables());
    }
    if engine.add_rule(1, expression, command).is_ok() {
        let _ = engine.reason();
    }
    let _ = engine.execute(command);
});
