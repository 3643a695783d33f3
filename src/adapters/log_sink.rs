//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! An MQTT publisher would implement the same trait.

use log::{debug, info, warn};

use crate::app::actions::Action;
use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { modules } => {
                info!("START | modules={}", modules);
            }
            AppEvent::RulesUpdated {
                target,
                loaded,
                rejected,
            } => {
                info!("RULES | {} loaded={} rejected={}", target, loaded, rejected);
            }
            AppEvent::RuleRejected {
                target,
                index,
                error,
            } => {
                warn!("RULES | {} record #{} rejected: {}", target, index, error);
            }
            AppEvent::RulesSaved => info!("RULES | saved"),
            AppEvent::Action(action) => match action {
                Action::SwitchModule { module, on } => {
                    info!("ACTION | module {} -> {}", module, if *on { "ON" } else { "OFF" });
                }
                Action::Notify { message } => info!("ACTION | notify \"{}\"", message),
                Action::Restart => info!("ACTION | restart"),
                Action::Delay { secs } => info!("ACTION | delay {}s", secs),
            },
            AppEvent::TickCompleted { target, report } => {
                debug!(
                    "TICK | {} matched={:?} tier={:?} executed={:?} errors={} ok={}",
                    target,
                    report.matched,
                    report.tier,
                    report.executed,
                    report.errors,
                    report.success
                );
            }
            AppEvent::Executed { target, result } => match result {
                Ok(ok) => info!("EXEC | {} ok={}", target, ok),
                Err(e) => warn!("EXEC | {} failed: {}", target, e),
            },
            AppEvent::Telemetry(t) => {
                info!(
                    "TELEM | P={:.0}W | grid={} | modules={}/{} | rules={} | ticks={}",
                    t.total_power_w,
                    if t.grid_up { "UP" } else { "DOWN" },
                    t.modules_online,
                    t.modules_total,
                    t.rules_total,
                    t.tick_count,
                );
            }
        }
    }
}
