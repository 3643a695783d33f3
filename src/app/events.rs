//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, publish over MQTT,
//! drive the bus.

use crate::error::Error;
use crate::rules::TickReport;

use super::actions::Action;
use super::commands::Target;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The service has started with this many modules.
    Started { modules: usize },

    /// A rule update was applied.
    RulesUpdated {
        target: Target,
        loaded: usize,
        rejected: usize,
    },

    /// One record of an update failed to load.
    RuleRejected {
        target: Target,
        index: usize,
        error: Error,
    },

    /// Rule sets and tags were written to storage.
    RulesSaved,

    /// A rule command asked for something to happen.
    Action(Action),

    /// An engine finished a tick that matched at least one rule or hit an
    /// evaluation error.
    TickCompleted { target: Target, report: TickReport },

    /// Outcome of a remote `Execute` / `ExecuteIf`.
    Executed {
        target: Target,
        result: Result<bool, Error>,
    },

    /// Periodic telemetry snapshot.
    Telemetry(TelemetryData),
}

/// A point-in-time telemetry snapshot suitable for logging or transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryData {
    pub total_power_w: f64,
    pub grid_up: bool,
    pub modules_online: u64,
    pub modules_total: usize,
    pub rules_total: usize,
    pub tick_count: u64,
}
