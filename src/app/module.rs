//! A power-switching module on the serial bus, with its own rule engine.
//!
//! Variables bound on every module engine:
//!
//! | Name        | Type   | Source                         |
//! |-------------|--------|--------------------------------|
//! | `POWER`     | Double | last polled power draw (W)     |
//! | `IS_ON`     | Bool   | relay state                    |
//! | `ONLINE`    | Bool   | answered the last poll         |
//! | `MODULE_ID` | Int    | bus address (constant)         |
//! | `MTL`       | Array  | module tag list                |
//!
//! plus the engine-wide `CURRENT_TIME` / `LAST_EXECUTION_TIME`.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use log::info;

use crate::error::Result;
use crate::rules::{record, RuleEngine, RuleUpdate, UpdateMode, UpdateReport};

use super::actions::{register_default_functions, ActionQueue};
use super::ports::{Clock, StoragePort};
use super::tags::TagList;

/// Live readings of one module, shared with its variable accessors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleState {
    pub id: u8,
    pub power_w: f64,
    pub is_on: bool,
    pub online: bool,
    pub tags: TagList,
}

#[derive(Debug)]
pub struct Module {
    state: Rc<RefCell<ModuleState>>,
    engine: RuleEngine,
}

impl Module {
    pub fn new(id: u8, clock: Rc<dyn Clock>, queue: &ActionQueue, max_rules: usize) -> Self {
        let state = Rc::new(RefCell::new(ModuleState {
            id,
            ..ModuleState::default()
        }));
        let mut engine = RuleEngine::new(format!("mod{id}"), clock, max_rules);

        let vars = engine.variables_mut();
        let s = Rc::clone(&state);
        vars.set_accessor("POWER", move || s.borrow().power_w);
        let s = Rc::clone(&state);
        vars.set_accessor("IS_ON", move || s.borrow().is_on);
        let s = Rc::clone(&state);
        vars.set_accessor("ONLINE", move || s.borrow().online);
        vars.set_constant("MODULE_ID", i64::from(id));
        let s = Rc::clone(&state);
        vars.set_accessor("MTL", move || Vec::<String>::from(&s.borrow().tags));

        register_default_functions(&mut engine, queue, Some(id));
        Self { state, engine }
    }

    pub fn id(&self) -> u8 {
        self.state.borrow().id
    }

    /// Storage namespace for this module's rules and tags.
    pub fn namespace(&self) -> String {
        format!("mod{}", self.id())
    }

    pub fn state(&self) -> Ref<'_, ModuleState> {
        self.state.borrow()
    }

    /// Record a poll result.
    pub fn update_reading(&self, power_w: f64, is_on: bool) {
        let mut s = self.state.borrow_mut();
        s.power_w = power_w;
        s.is_on = is_on;
        s.online = true;
    }

    /// Mark the module as not answering; its last reading is kept.
    pub fn mark_offline(&self) {
        self.state.borrow_mut().online = false;
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

    /// Save rules and tags under [`namespace`](Self::namespace).
    pub fn persist(&self, storage: &mut dyn StoragePort) -> Result<()> {
        let ns = self.namespace();
        record::save_rules(storage, &ns, &self.engine.records())?;
        record::save_tags(storage, &ns, self.state.borrow().tags.as_slice())
    }

    /// Replace rules and tags with what is stored.
    pub fn restore(&mut self, storage: &dyn StoragePort) -> Result<UpdateReport> {
        let ns = self.namespace();
        let tags = record::load_tags(storage, &ns)?;
        let rules = record::load_rules(storage, &ns)?;
        self.set_tags(&tags);
        let report = self.engine.apply_update(&RuleUpdate {
            mode: UpdateMode::Replace,
            rules,
        });
        info!(
            "Module {}: restored {} rule(s), {} tag(s)",
            self.id(),
            report.loaded,
            tags.len()
        );
        Ok(report)
    }
}
