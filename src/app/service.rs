//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the unit, its modules and the action queue their
//! rule callbacks feed.  All I/O flows through port traits injected at
//! call sites, making the entire service testable with mock adapters.
//!
//! ```text
//!  AppCommand ──▶ ┌────────────────────────┐ ──▶ EventSink
//!                 │       AppService        │
//!  StoragePort ◀─▶│  Unit · Modules · Queue │
//!                 └────────────────────────┘
//! ```
//!
//! Per tick the unit engine reasons first, then each module in the order
//! it was added; the actions they enqueue are emitted afterwards in FIFO
//! order.  A `DELAY(n)` action holds everything queued behind it until
//! `n` seconds have passed.

use std::collections::VecDeque;
use std::rc::Rc;

use log::{info, warn};

use crate::config::SystemConfig;
use crate::error::{Error, Result};
use crate::rules::{TickReport, UpdateReport};

use super::actions::{Action, ActionQueue};
use super::commands::{AppCommand, Target};
use super::events::{AppEvent, TelemetryData};
use super::module::Module;
use super::ports::{Clock, ConfigPort, EventSink, StoragePort};
use super::unit::Unit;

/// Seconds a rule/tag change stays unsaved before auto-save.
const AUTO_SAVE_DELAY_SECS: f32 = 5.0;

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService {
    unit: Unit,
    modules: Vec<Module>,
    queue: ActionQueue,
    clock: Rc<dyn Clock>,
    config: SystemConfig,
    /// Actions held back by a `DELAY`.
    held: VecDeque<Action>,
    hold_until: Option<u64>,
    tick_count: u64,
    last_telemetry: u64,
    rules_dirty: bool,
    dirty_since_tick: u64,
}

impl AppService {
    pub fn new(config: SystemConfig, clock: Rc<dyn Clock>) -> Self {
        let queue = ActionQueue::new();
        let unit = Unit::new(
            Rc::clone(&clock),
            &queue,
            usize::from(config.max_rules_per_engine),
        );
        let last_telemetry = clock.now_secs();
        Self {
            unit,
            modules: Vec::new(),
            queue,
            clock,
            config,
            held: VecDeque::new(),
            hold_until: None,
            tick_count: 0,
            last_telemetry,
            rules_dirty: false,
            dirty_since_tick: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Register a module discovered on the bus.
    pub fn add_module(&mut self, id: u8) -> Result<()> {
        if self.module(id).is_some() {
            return Err(Error::Config("duplicate module id"));
        }
        if self.modules.len() >= usize::from(self.config.max_modules) {
            return Err(Error::Config("module limit reached"));
        }
        self.modules.push(Module::new(
            id,
            Rc::clone(&self.clock),
            &self.queue,
            usize::from(self.config.max_rules_per_engine),
        ));
        info!("AppService: module {} added", id);
        Ok(())
    }

    /// Load stored rules and tags for the unit and every module.
    ///
    /// A missing or corrupted blob leaves that owner empty and logs; it
    /// does not stop the others from loading.
    pub fn restore(&mut self, storage: &impl StoragePort) -> UpdateReport {
        let mut total = UpdateReport::default();
        let mut merge = |r: Result<UpdateReport>, owner: Target| match r {
            Ok(r) => {
                total.loaded += r.loaded;
                total.rejected.extend(r.rejected);
            }
            Err(e) => warn!("AppService: restore of {} failed: {}", owner, e),
        };
        merge(self.unit.restore(storage), Target::Unit);
        for m in &mut self.modules {
            let id = m.id();
            merge(m.restore(storage), Target::Module(id));
        }
        total
    }

    pub fn start(&mut self, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Started {
            modules: self.modules.len(),
        });
        info!("AppService started with {} module(s)", self.modules.len());
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one reasoning cycle: aggregates → unit → modules → actions.
    pub fn tick(&mut self, sink: &mut impl EventSink) {
        self.tick_count += 1;
        self.refresh_totals();

        let report = self.unit.engine_mut().reason();
        emit_tick(sink, Target::Unit, report);
        for m in &mut self.modules {
            let id = m.id();
            let report = m.engine_mut().reason();
            emit_tick(sink, Target::Module(id), report);
        }

        self.dispatch_actions(sink);

        let now = self.clock.now_secs();
        if now.saturating_sub(self.last_telemetry) >= u64::from(self.config.telemetry_interval_secs)
        {
            self.last_telemetry = now;
            sink.emit(&AppEvent::Telemetry(self.build_telemetry()));
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) {
        match cmd {
            AppCommand::UpdateRules { target, update } => {
                let Some(engine) = self.engine_mut(target) else {
                    warn!("UpdateRules: no such target {}", target);
                    return;
                };
                let report = engine.apply_update(&update);
                for (index, error) in &report.rejected {
                    sink.emit(&AppEvent::RuleRejected {
                        target,
                        index: *index,
                        error: error.clone(),
                    });
                }
                sink.emit(&AppEvent::RulesUpdated {
                    target,
                    loaded: report.loaded,
                    rejected: report.rejected.len(),
                });
                self.mark_rules_dirty();
            }
            AppCommand::SetTags { target, tags } => {
                match target {
                    Target::Unit => self.unit.set_tags(&tags),
                    Target::Module(id) => match self.module(id) {
                        Some(m) => m.set_tags(&tags),
                        None => {
                            warn!("SetTags: no such target {}", target);
                            return;
                        }
                    },
                }
                self.mark_rules_dirty();
            }
            AppCommand::Execute { target, command } => {
                let result = match self.engine(target) {
                    Some(engine) => engine.execute(&command),
                    None => Err(Error::Config("no such target")),
                };
                sink.emit(&AppEvent::Executed { target, result });
                self.dispatch_actions(sink);
            }
            AppCommand::ExecuteIf {
                target,
                expression,
                command,
            } => {
                let result = match self.engine(target) {
                    Some(engine) => engine.execute_if(&expression, &command),
                    None => Err(Error::Config("no such target")),
                };
                sink.emit(&AppEvent::Executed { target, result });
                self.dispatch_actions(sink);
            }
            AppCommand::ModuleReading { id, power_w, is_on } => match self.module(id) {
                Some(m) => m.update_reading(power_w, is_on),
                None => warn!("ModuleReading: unknown module {}", id),
            },
            AppCommand::ModuleOffline(id) => {
                if let Some(m) = self.module(id) {
                    m.mark_offline();
                }
            }
            AppCommand::GridChanged(up) => {
                info!("Grid {}", if up { "up" } else { "down" });
                self.unit.set_grid(up);
            }
            AppCommand::UpdateConfig(new_config) => match new_config.validate() {
                Ok(()) => {
                    self.config = new_config;
                    info!("Configuration updated at runtime");
                }
                Err(e) => warn!("UpdateConfig rejected: {}", e),
            },
            AppCommand::SaveRules => {
                if self.save_all(storage).is_ok() {
                    sink.emit(&AppEvent::RulesSaved);
                }
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn build_telemetry(&self) -> TelemetryData {
        let unit = self.unit.state();
        TelemetryData {
            total_power_w: unit.total_power_w,
            grid_up: unit.grid_up,
            modules_online: unit.modules_online,
            modules_total: self.modules.len(),
            rules_total: self.unit.engine().rules().len()
                + self
                    .modules
                    .iter()
                    .map(|m| m.engine().rules().len())
                    .sum::<usize>(),
            tick_count: self.tick_count,
        }
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn unit_mut(&mut self) -> &mut Unit {
        &mut self.unit
    }

    pub fn module(&self, id: u8) -> Option<&Module> {
        self.modules.iter().find(|m| m.id() == id)
    }

    pub fn module_mut(&mut self, id: u8) -> Option<&mut Module> {
        self.modules.iter_mut().find(|m| m.id() == id)
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn current_config(&self) -> SystemConfig {
        self.config.clone()
    }

    /// Actions currently held back by a `DELAY`.
    pub fn held_actions(&self) -> usize {
        self.held.len()
    }

    // ── Internal ──────────────────────────────────────────────

    fn engine(&self, target: Target) -> Option<&crate::rules::RuleEngine> {
        match target {
            Target::Unit => Some(self.unit.engine()),
            Target::Module(id) => self.module(id).map(Module::engine),
        }
    }

    fn engine_mut(&mut self, target: Target) -> Option<&mut crate::rules::RuleEngine> {
        match target {
            Target::Unit => Some(self.unit.engine_mut()),
            Target::Module(id) => self.module_mut(id).map(Module::engine_mut),
        }
    }

    /// Recompute the unit aggregates from the module readings.
    fn refresh_totals(&self) {
        let (power, online) = self
            .modules
            .iter()
            .filter(|m| m.state().online)
            .fold((0.0, 0_u64), |(p, n), m| (p + m.state().power_w, n + 1));
        self.unit.update_totals(power, online);
    }

    /// Emit queued actions in order, honouring `DELAY`.
    fn dispatch_actions(&mut self, sink: &mut impl EventSink) {
        self.held.extend(self.queue.drain());
        let now = self.clock.now_secs();
        if self.hold_until.is_some_and(|t| now < t) {
            return;
        }
        self.hold_until = None;

        while let Some(action) = self.held.pop_front() {
            if let Action::Delay { secs } = action {
                if secs > 0 {
                    self.hold_until = Some(now.saturating_add(u64::from(secs)));
                    break;
                }
                continue;
            }
            sink.emit(&AppEvent::Action(action));
        }
    }

    fn save_all(&self, storage: &mut impl StoragePort) -> Result<()> {
        let result = self
            .unit
            .persist(storage)
            .and_then(|()| self.modules.iter().try_for_each(|m| m.persist(storage)));
        match &result {
            Ok(()) => info!("Rules saved for unit and {} module(s)", self.modules.len()),
            Err(e) => warn!("Rule save failed: {}", e),
        }
        result
    }

    // ── Dirty-flag management ─────────────────────────────────

    /// Mark rules/tags as modified.
    pub fn mark_rules_dirty(&mut self) {
        if !self.rules_dirty {
            self.rules_dirty = true;
            self.dirty_since_tick = self.tick_count;
        }
    }

    /// Check if auto-save should trigger (5 seconds after last change).
    /// Returns `true` if rules were saved.
    pub fn auto_save_if_needed(&mut self, storage: &mut impl StoragePort) -> bool {
        if !self.rules_dirty {
            return false;
        }
        let ticks_since_dirty = self.tick_count.saturating_sub(self.dirty_since_tick);
        if (ticks_since_dirty as f32 * self.config.tick_secs()) < AUTO_SAVE_DELAY_SECS {
            return false;
        }
        if self.save_all(storage).is_ok() {
            self.rules_dirty = false;
            true
        } else {
            false
        }
    }

    /// Force-save if dirty (call before restart).
    pub fn force_save_if_dirty(&mut self, storage: &mut impl StoragePort) {
        if self.rules_dirty && self.save_all(storage).is_ok() {
            self.rules_dirty = false;
        }
    }

    pub fn is_rules_dirty(&self) -> bool {
        self.rules_dirty
    }

    /// Persist the live configuration.
    pub fn save_config(&self, config_port: &impl ConfigPort) -> Result<()> {
        config_port.save(&self.config)?;
        Ok(())
    }
}

/// Emit a tick report when it carries news.
fn emit_tick(sink: &mut impl EventSink, target: Target, report: TickReport) {
    if report.matched.is_empty() && report.errors == 0 {
        return;
    }
    sink.emit(&AppEvent::TickCompleted { target, report });
}
