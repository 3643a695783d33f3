//! PowerCtl firmware library.
//!
//! Exposes the rule interpreter and the pure-logic application core for
//! integration testing. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod rules;
pub mod script;

pub use error::{Error, EvaluationError, Result, SyntaxError, SyntaxErrorKind};
