//! ESP32 time adapter.
//!
//! Implements [`Clock`] for the rule engines' `CURRENT_TIME`.
//!
//! - **`target_os = "espidf"`**: Unix time from `gettimeofday()` once the
//!   wall clock has been synced (SNTP), otherwise seconds since boot from
//!   the ESP-IDF high-resolution timer.
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` for
//!   host-side testing and simulation.

use crate::app::ports::Clock;

/// Anything earlier than 2020-01-01 means the wall clock is not synced.
#[cfg(target_os = "espidf")]
const EPOCH_2020: i64 = 1_577_836_800;

/// Time adapter for the ESP32 platform.
pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Seconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_secs(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000_000
    }

    /// Seconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    /// Unix time in seconds, `None` until the wall clock is synced.
    #[cfg(target_os = "espidf")]
    pub fn unix_secs(&self) -> Option<u64> {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        let secs = i64::from(tv.tv_sec);
        (secs >= EPOCH_2020).then_some(secs as u64)
    }

    /// Unix time in seconds.  Simulation never reports a synced clock.
    #[cfg(not(target_os = "espidf"))]
    pub fn unix_secs(&self) -> Option<u64> {
        None
    }
}

impl Clock for Esp32TimeAdapter {
    fn now_secs(&self) -> u64 {
        self.unix_secs().unwrap_or_else(|| self.uptime_secs())
    }
}
