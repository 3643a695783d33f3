//! PowerCtl Firmware: Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │     LogEventSink         NvsAdapter          Esp32Time         │
//! │     (EventSink)          (Config+Storage)    (Clock)           │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  Unit engine · Module engines · ActionQueue            │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};

use powerctl::adapters::log_sink::LogEventSink;
use powerctl::adapters::nvs::NvsAdapter;
use powerctl::adapters::time::Esp32TimeAdapter;
use powerctl::app::actions::Action;
use powerctl::app::events::AppEvent;
use powerctl::app::ports::{ConfigPort, EventSink};
use powerctl::app::service::AppService;
use powerctl::config::SystemConfig;

/// Logs every event and latches a rule-requested restart.
struct FirmwareSink {
    log: LogEventSink,
    restart_requested: bool,
}

impl EventSink for FirmwareSink {
    fn emit(&mut self, event: &AppEvent) {
        self.log.emit(event);
        if matches!(event, AppEvent::Action(Action::Restart)) {
            self.restart_requested = true;
        }
    }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  PowerCtl v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let mut nvs = NvsAdapter::new().map_err(|e| anyhow::anyhow!("NVS init failed: {e}"))?;
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };

    // ── 3. Construct app service ──────────────────────────────
    let clock = Rc::new(Esp32TimeAdapter::new());
    let mut app = AppService::new(config.clone(), clock);

    // Modules answer at bus addresses 1..=max_modules; each stays offline
    // until its first poll succeeds.
    for id in 1..=config.max_modules {
        if let Err(e) = app.add_module(id) {
            error!("Module {} not registered: {}", id, e);
        }
    }

    let restored = app.restore(&nvs);
    if !restored.is_clean() {
        warn!("{} stored rule(s) failed to load", restored.rejected.len());
    }

    let mut sink = FirmwareSink {
        log: LogEventSink::new(),
        restart_requested: false,
    };
    app.start(&mut sink);
    info!("System ready. Entering event loop.");

    // ── 4. Event loop ─────────────────────────────────────────
    let interval = Duration::from_millis(u64::from(config.reason_interval_ms));
    loop {
        std::thread::sleep(interval);

        app.tick(&mut sink);

        // Rule/tag auto-save (5s debounce after last change).
        app.auto_save_if_needed(&mut nvs);

        if sink.restart_requested {
            info!("Restart requested by rule");
            app.force_save_if_dirty(&mut nvs);
            // SAFETY: esp_restart never returns.
            unsafe { esp_idf_svc::sys::esp_restart() };
        }
    }
}
