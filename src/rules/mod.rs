//! Prioritised rules and the engine that selects among them.

pub mod engine;
pub mod record;
pub mod rule;

pub use engine::{RuleEngine, TickReport, CURRENT_TIME, LAST_EXECUTION_TIME};
pub use record::{RuleRecord, RuleUpdate, UpdateMode, UpdateReport};
pub use rule::Rule;
