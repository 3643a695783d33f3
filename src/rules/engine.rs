//! Rule engine: priority-tier selection over a rule set.
//!
//! ```text
//!   Idle ──add_rule──▶ Loaded ──reason()──▶ Evaluating ──▶ Dispatching ──▶ Idle
//! ```
//!
//! Each [`reason`](RuleEngine::reason) tick:
//!
//! 1. evaluates every rule's cached condition in storage order; a rule
//!    whose evaluation errors is logged and treated as non-matching;
//! 2. takes the highest priority value among the true rules;
//! 3. runs the commands of **every** true rule at that priority, in
//!    storage order;
//! 4. if anything ran, stores the tick time in `LAST_EXECUTION_TIME`.
//!
//! One engine exists per owning object (the unit and each module); there
//! is no shared global state between engines.

use std::rc::Rc;

use log::{debug, info, warn};

use crate::app::ports::Clock;
use crate::error::{Error, Result};
use crate::script::command::{self, Command, FunctionRegistry};
use crate::script::{evaluator, FromValue, TokenKind, Value, VariableStorage};

use super::record::{RuleRecord, RuleUpdate, UpdateMode, UpdateReport};
use super::rule::Rule;

/// Engine clock, read live on every lookup.
pub const CURRENT_TIME: &str = "CURRENT_TIME";
/// Time of the last tick that dispatched commands.
pub const LAST_EXECUTION_TIME: &str = "LAST_EXECUTION_TIME";

/// What one [`RuleEngine::reason`] tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Indices of rules whose condition held.
    pub matched: Vec<usize>,
    /// Indices of rules whose commands ran (the winning tier).
    pub executed: Vec<usize>,
    /// Priority of the winning tier.
    pub tier: Option<i32>,
    /// Rules whose evaluation raised an error.
    pub errors: usize,
    /// AND of every dispatched command's outcome (`true` when nothing ran).
    pub success: bool,
}

pub struct RuleEngine {
    /// Owner label for log lines.
    name: String,
    rules: Vec<Rule>,
    vars: VariableStorage,
    functions: FunctionRegistry,
    clock: Rc<dyn Clock>,
    max_rules: usize,
}

impl RuleEngine {
    /// Create an engine with the reserved time variables bound.
    pub fn new(name: impl Into<String>, clock: Rc<dyn Clock>, max_rules: usize) -> Self {
        let mut vars = VariableStorage::new();
        let c = Rc::clone(&clock);
        vars.set_accessor(CURRENT_TIME, move || c.now_secs());
        vars.set_constant(LAST_EXECUTION_TIME, 0_u64);
        Self {
            name: name.into(),
            rules: Vec::new(),
            vars,
            functions: FunctionRegistry::new(),
            clock,
            max_rules,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Rule set ──────────────────────────────────────────────

    /// Parse and append a rule.  A malformed rule is rejected here rather
    /// than failing silently on every tick.
    pub fn add_rule(&mut self, priority: i32, expression: &str, command: &str) -> Result<()> {
        if self.rules.len() >= self.max_rules {
            return Err(Error::RuleLimit(self.max_rules));
        }
        let rule = Rule::parse(priority, expression, command).map_err(|e| {
            warn!("[{}] rejected rule '{}': {}", self.name, expression, e);
            Error::from(e)
        })?;
        self.warn_unbound(&rule);
        self.rules.push(rule);
        Ok(())
    }

    pub fn clear_rules(&mut self) {
        if !self.rules.is_empty() {
            info!("[{}] cleared {} rule(s)", self.name, self.rules.len());
        }
        self.rules.clear();
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Source form of the current rule set, in storage order.
    pub fn records(&self) -> Vec<RuleRecord> {
        self.rules.iter().map(Rule::record).collect()
    }

    /// Apply a remote/stored update.  Each record loads independently; bad
    /// records are skipped and reported.
    pub fn apply_update(&mut self, update: &RuleUpdate) -> UpdateReport {
        if update.mode == UpdateMode::Replace {
            self.clear_rules();
        }
        let mut report = UpdateReport::default();
        for (i, record) in update.rules.iter().enumerate() {
            match self.add_rule(record.priority, &record.expression, &record.command) {
                Ok(()) => report.loaded += 1,
                Err(e) => report.rejected.push((i, e)),
            }
        }
        info!(
            "[{}] rule update ({:?}): {} loaded, {} rejected",
            self.name,
            update.mode,
            report.loaded,
            report.rejected.len()
        );
        report
    }

    // ── Variables & functions ─────────────────────────────────

    pub fn set_var(&mut self, id: impl Into<String>, value: impl Into<Value>) {
        self.vars.set_constant(id, value);
    }

    pub fn get_var<T: FromValue>(&self, id: &str) -> T {
        self.vars.get(id)
    }

    pub fn variables(&self) -> &VariableStorage {
        &self.vars
    }

    pub fn variables_mut(&mut self) -> &mut VariableStorage {
        &mut self.vars
    }

    pub fn register_function<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Command, &VariableStorage) -> Result<bool> + 'static,
    {
        self.functions.register(name, f);
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    // ── Direct execution ──────────────────────────────────────

    /// Run a command string unconditionally.
    pub fn execute(&self, command_text: &str) -> Result<bool> {
        let commands = command::parse(command_text)?;
        Ok(self.functions.execute(&commands, &self.vars))
    }

    /// Evaluate one ad hoc condition and, if it holds, run the command.
    /// Both strings are parsed before anything runs.  Returns `Ok(false)`
    /// when the condition is false or a command failed.
    pub fn execute_if(&self, expression: &str, command_text: &str) -> Result<bool> {
        let rule = Rule::parse(0, expression, command_text)?;
        if !rule.evaluate(&self.vars)? {
            debug!("[{}] execute_if: '{}' is false", self.name, expression);
            return Ok(false);
        }
        Ok(self.functions.execute(rule.commands(), &self.vars))
    }

    // ── Tick ──────────────────────────────────────────────────

    /// Run one evaluation tick.
    pub fn reason(&mut self) -> TickReport {
        let now = self.clock.now_secs();
        let mut report = TickReport {
            success: true,
            ..TickReport::default()
        };

        for (i, rule) in self.rules.iter().enumerate() {
            match rule.evaluate(&self.vars) {
                Ok(true) => report.matched.push(i),
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        "[{}] rule #{} '{}' not evaluated: {}",
                        self.name,
                        i,
                        rule.expression_text(),
                        e
                    );
                    report.errors += 1;
                }
            }
        }

        let Some(tier) = report.matched.iter().map(|&i| self.rules[i].priority()).max() else {
            return report;
        };
        report.tier = Some(tier);
        report.executed = report
            .matched
            .iter()
            .copied()
            .filter(|&i| self.rules[i].priority() == tier)
            .collect();

        debug!(
            "[{}] tier {}: executing rule(s) {:?}",
            self.name, tier, report.executed
        );
        for &i in &report.executed {
            let ok = self.functions.execute(self.rules[i].commands(), &self.vars);
            report.success &= ok;
        }

        self.vars.set_constant(LAST_EXECUTION_TIME, now);
        report
    }

    // ── Internal ──────────────────────────────────────────────

    /// Unbound identifiers read as literals/defaults, which hides typos.
    fn warn_unbound(&self, rule: &Rule) {
        for token in rule.condition() {
            if token.kind == TokenKind::Identifier && !self.vars.contains(&token.lexeme) {
                warn!(
                    "[{}] rule '{}' references unbound identifier '{}'",
                    self.name,
                    rule.expression_text(),
                    token.lexeme
                );
            }
        }
    }
}

impl core::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("name", &self.name)
            .field("rules", &self.rules.len())
            .field("vars", &self.vars.len())
            .field("functions", &self.functions)
            .finish_non_exhaustive()
    }
}

/// Evaluate a standalone expression against `vars`.
pub fn evaluate_expression(expression: &str, vars: &VariableStorage) -> Result<f64> {
    let rpn = crate::script::compile(expression)?;
    Ok(evaluator::evaluate(&rpn, vars)?)
}
