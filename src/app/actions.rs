//! Outbound actions produced by rule commands.
//!
//! Command callbacks never touch the bus directly; they push an [`Action`]
//! into a bounded [`ActionQueue`] which the
//! [`AppService`](super::service::AppService) drains once per tick.  Each
//! service owns its own queue; handles are cheap `Rc` clones captured by
//! the callbacks.

use std::cell::RefCell;
use std::rc::Rc;

use heapless::Deque;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rules::RuleEngine;
use crate::script::{Command, VariableStorage};

/// Queue depth between two drains.
pub const ACTION_QUEUE_DEPTH: usize = 32;

/// Something the controller should do on behalf of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Switch a module's relay.
    SwitchModule { module: u8, on: bool },
    /// Publish an operator notification.
    Notify { message: String },
    /// Restart the controller.
    Restart,
    /// Hold further actions for `secs` seconds.
    Delay { secs: u32 },
}

/// Bounded FIFO of pending [`Action`]s, shared by handle.
#[derive(Clone, Default)]
pub struct ActionQueue {
    inner: Rc<RefCell<Deque<Action, ACTION_QUEUE_DEPTH>>>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an action.  Returns `false` when the queue is full.
    pub fn push(&self, action: Action) -> bool {
        match self.inner.borrow_mut().push_back(action) {
            Ok(()) => true,
            Err(dropped) => {
                warn!("ActionQueue: full, dropping {:?}", dropped);
                false
            }
        }
    }

    /// Remove and return every pending action in FIFO order.
    pub fn drain(&self) -> Vec<Action> {
        let mut q = self.inner.borrow_mut();
        let mut out = Vec::with_capacity(q.len());
        while let Some(a) = q.pop_front() {
            out.push(a);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}

impl core::fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ActionQueue")
            .field("pending", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Default command set
// ---------------------------------------------------------------------------

/// Register `ON`, `OFF`, `NOTIFY`, `RESTART` and `DELAY` on `engine`.
///
/// `own_module` is the id `ON()`/`OFF()` fall back to when called without
/// an argument; the unit passes `None` and must name a module.
pub fn register_default_functions(
    engine: &mut RuleEngine,
    queue: &ActionQueue,
    own_module: Option<u8>,
) {
    for (name, on) in [("ON", true), ("OFF", false)] {
        let q = queue.clone();
        engine.register_function(name, move |cmd, vars| {
            let module = target_module(cmd, vars, own_module)?;
            Ok(q.push(Action::SwitchModule { module, on }))
        });
    }

    let q = queue.clone();
    engine.register_function("NOTIFY", move |cmd, vars| {
        let parts: Vec<String> = (0..cmd.arguments.len())
            .filter_map(|i| cmd.argument_text(i, vars))
            .collect();
        Ok(q.push(Action::Notify {
            message: parts.join(" "),
        }))
    });

    let q = queue.clone();
    engine.register_function("RESTART", move |_, _| Ok(q.push(Action::Restart)));

    let q = queue.clone();
    engine.register_function("DELAY", move |cmd, vars| {
        let secs = cmd.eval_argument(0, vars)?;
        if !(0.0..=f64::from(u32::MAX)).contains(&secs) {
            return Err(Error::Callback("DELAY out of range"));
        }
        Ok(q.push(Action::Delay { secs: secs as u32 }))
    });

    debug!("[{}] default functions registered", engine.name());
}

fn target_module(cmd: &Command, vars: &VariableStorage, own: Option<u8>) -> Result<u8> {
    if cmd.arguments.is_empty() {
        return own.ok_or(Error::Callback("module id required"));
    }
    let id = cmd.eval_argument(0, vars)?;
    if id.fract() != 0.0 || !(0.0..=f64::from(u8::MAX)).contains(&id) {
        return Err(Error::Callback("invalid module id"));
    }
    Ok(id as u8)
}
