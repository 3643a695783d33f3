//! Inbound commands to the application service.
//!
//! These represent requests from the outside world (MQTT, serial console,
//! the bus poller) that the [`AppService`](super::service::AppService)
//! interprets and acts upon.

use crate::config::SystemConfig;
use crate::rules::RuleUpdate;

/// Which rule engine a command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Unit,
    Module(u8),
}

impl core::fmt::Display for Target {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unit => write!(f, "unit"),
            Self::Module(id) => write!(f, "mod{id}"),
        }
    }
}

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Replace or extend a rule set (remote update).
    UpdateRules { target: Target, update: RuleUpdate },

    /// Replace a tag list.
    SetTags { target: Target, tags: Vec<String> },

    /// Run a command string immediately.
    Execute { target: Target, command: String },

    /// Run a command string if an ad hoc condition holds.
    ExecuteIf {
        target: Target,
        expression: String,
        command: String,
    },

    /// Result of polling one module on the bus.
    ModuleReading { id: u8, power_w: f64, is_on: bool },

    /// A module did not answer its poll.
    ModuleOffline(u8),

    /// Mains presence changed.
    GridChanged(bool),

    /// Hot-reload configuration.
    UpdateConfig(SystemConfig),

    /// Persist all rule sets and tag lists immediately.
    SaveRules,
}
