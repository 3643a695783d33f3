//! Mock adapters for integration tests.
//!
//! A hand-driven clock, an in-memory store that can be told to fail, and
//! a sink that records every event so tests can assert on the full
//! history.

use std::cell::Cell;
use std::collections::HashMap;

use powerctl::app::actions::Action;
use powerctl::app::events::AppEvent;
use powerctl::app::ports::{Clock, EventSink, StorageError, StoragePort};

// ── MockClock ─────────────────────────────────────────────────

pub struct MockClock(Cell<u64>);

#[allow(dead_code)]
impl MockClock {
    pub fn at(secs: u64) -> Self {
        Self(Cell::new(secs))
    }

    pub fn set(&self, secs: u64) {
        self.0.set(secs);
    }

    pub fn advance(&self, secs: u64) {
        self.0.set(self.0.get() + secs);
    }
}

impl Clock for MockClock {
    fn now_secs(&self) -> u64 {
        self.0.get()
    }
}

// ── MockNvs ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockNvs {
    store: HashMap<String, Vec<u8>>,
    pub fail_writes: bool,
    pub writes: usize,
}

#[allow(dead_code)]
impl MockNvs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn corrupt(&mut self, namespace: &str, key: &str) {
        self.store
            .insert(format!("{namespace}::{key}"), vec![0xFF, 0xFF, 0xFF]);
    }
}

impl StoragePort for MockNvs {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self
            .store
            .get(&format!("{namespace}::{key}"))
            .ok_or(StorageError::NotFound)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.writes += 1;
        self.store
            .insert(format!("{namespace}::{key}"), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.store.remove(&format!("{namespace}::{key}"));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.store.contains_key(&format!("{namespace}::{key}"))
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions emitted so far, in order.
    pub fn actions(&self) -> Vec<Action> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Action(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
