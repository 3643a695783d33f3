//! The controller unit: site-wide readings and the top-level rule engine.
//!
//! Variables bound on the unit engine: `TOTAL_POWER` (Double, W),
//! `GRID` (Bool, mains present), `MODULES_ONLINE` (UInt64) and `UTL`
//! (Array, unit tag list), plus `CURRENT_TIME` / `LAST_EXECUTION_TIME`.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use log::info;

use crate::error::Result;
use crate::rules::{record, RuleEngine, RuleUpdate, UpdateMode, UpdateReport};

use super::actions::{register_default_functions, ActionQueue};
use super::ports::{Clock, StoragePort};
use super::tags::TagList;

/// Storage namespace for the unit's rules and tags.
pub const UNIT_NAMESPACE: &str = "unit";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitState {
    pub total_power_w: f64,
    pub grid_up: bool,
    pub modules_online: u64,
    pub tags: TagList,
}

#[derive(Debug)]
pub struct Unit {
    state: Rc<RefCell<UnitState>>,
    engine: RuleEngine,
}

impl Unit {
    pub fn new(clock: Rc<dyn Clock>, queue: &ActionQueue, max_rules: usize) -> Self {
        let state = Rc::new(RefCell::new(UnitState::default()));
        let mut engine = RuleEngine::new(UNIT_NAMESPACE, clock, max_rules);

        let vars = engine.variables_mut();
        let s = Rc::clone(&state);
        vars.set_accessor("TOTAL_POWER", move || s.borrow().total_power_w);
        let s = Rc::clone(&state);
        vars.set_accessor("GRID", move || s.borrow().grid_up);
        let s = Rc::clone(&state);
        vars.set_accessor("MODULES_ONLINE", move || s.borrow().modules_online);
        let s = Rc::clone(&state);
        vars.set_accessor("UTL", move || Vec::<String>::from(&s.borrow().tags));

        register_default_functions(&mut engine, queue, None);
        Self { state, engine }
    }

    pub fn state(&self) -> Ref<'_, UnitState> {
        self.state.borrow()
    }

    /// Refresh the site-wide aggregates after a polling round.
    pub fn update_totals(&self, total_power_w: f64, modules_online: u64) {
        let mut s = self.state.borrow_mut();
        s.total_power_w = total_power_w;
        s.modules_online = modules_online;
    }

    pub fn set_grid(&self, up: bool) {
        self.state.borrow_mut().grid_up = up;
    }

    pub fn tags(&self) -> TagList {
        self.state.borrow().tags.clone()
    }

    pub fn add_tag(&self, tag: &str) -> bool {
        self.state.borrow_mut().tags.add(tag)
    }

    pub fn remove_tag(&self, tag: &str) -> bool {
        self.state.borrow_mut().tags.remove(tag)
    }

    pub fn set_tags<S: AsRef<str>>(&self, tags: &[S]) {
        self.state.borrow_mut().tags.replace(tags);
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RuleEngine {
        &mut self.engine
    }

    pub fn persist(&self, storage: &mut dyn StoragePort) -> Result<()> {
        record::save_rules(storage, UNIT_NAMESPACE, &self.engine.records())?;
        record::save_tags(storage, UNIT_NAMESPACE, self.state.borrow().tags.as_slice())
    }

    pub fn restore(&mut self, storage: &dyn StoragePort) -> Result<UpdateReport> {
        let tags = record::load_tags(storage, UNIT_NAMESPACE)?;
        let rules = record::load_rules(storage, UNIT_NAMESPACE)?;
        self.set_tags(&tags);
        let report = self.engine.apply_update(&RuleUpdate {
            mode: UpdateMode::Replace,
            rules,
        });
        info!(
            "Unit: restored {} rule(s), {} tag(s)",
            report.loaded,
            tags.len()
        );
        Ok(report)
    }
}
