//! Application core: pure domain logic, zero I/O.
//!
//! The unit and its modules each own a rule engine; the service routes
//! remote commands to them and drives their ticks.  All interaction with
//! storage, clocks and the outside world happens through **port traits**
//! defined in [`ports`], keeping this layer fully testable on the host.

pub mod actions;
pub mod commands;
pub mod events;
pub mod module;
pub mod ports;
pub mod service;
pub mod tags;
pub mod unit;
