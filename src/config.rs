//! System configuration parameters
//!
//! All tunable parameters for the PowerCtl controller.
//! Values can be overridden via NVS or a remote `UpdateConfig` command.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Upper bound for `max_rules_per_engine`; keeps a stored rule blob
/// within one NVS entry.
pub const RULES_PER_ENGINE_LIMIT: u16 = 128;

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Rules ---
    /// Interval between rule evaluation ticks (milliseconds)
    pub reason_interval_ms: u32,
    /// Rules accepted by each engine before `add_rule` fails
    pub max_rules_per_engine: u16,

    // --- Bus ---
    /// Modules the controller will manage
    pub max_modules: u8,

    // --- Timing ---
    /// Telemetry report interval (seconds)
    pub telemetry_interval_secs: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            reason_interval_ms: 1000, // 1 Hz
            max_rules_per_engine: 32,
            max_modules: 8,
            telemetry_interval_secs: 60, // 1/min
        }
    }
}

impl SystemConfig {
    /// Range-check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(100..=60_000).contains(&self.reason_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "reason_interval_ms must be 100-60000",
            ));
        }
        if self.max_rules_per_engine == 0 || self.max_rules_per_engine > RULES_PER_ENGINE_LIMIT {
            return Err(ConfigError::ValidationFailed(
                "max_rules_per_engine must be 1-128",
            ));
        }
        if self.max_modules == 0 || self.max_modules > 32 {
            return Err(ConfigError::ValidationFailed("max_modules must be 1-32"));
        }
        if self.telemetry_interval_secs == 0 || self.telemetry_interval_secs > 86_400 {
            return Err(ConfigError::ValidationFailed(
                "telemetry_interval_secs must be 1-86400",
            ));
        }
        Ok(())
    }

    pub fn tick_secs(&self) -> f32 {
        self.reason_interval_ms as f32 / 1000.0
    }
}
