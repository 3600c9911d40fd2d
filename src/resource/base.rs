//! The common header every concrete resource (§4.F) embeds by
//! composition: a name, an optional time-series recording of its state,
//! and the bookkeeping a resource guard's observers need. `§9`'s design
//! note asks for this to be "an interface/trait implemented by each
//! concrete type" where the original used a `resource_base` struct plus
//! function pointers (`scram`, `reprio`); here the header itself is a
//! plain struct embedded by value (no vtable needed for `name`/history),
//! while the `scram`/`reprio` hooks become ordinary trait methods
//! implemented directly on the concrete resource (`Scram` below) —
//! static dispatch does the same job the original's function pointers
//! did, with no indirection to set up.

use std::cell::{Cell, RefCell};

use crate::event;
use crate::process::Process;

/// One `(time, value)` sample of a resource's state, appended whenever
/// recording is enabled. `value` is whatever the concrete resource
/// considers countable — on-hand units, buffer length, 0/1 for a
/// single-unit resource's held state.
pub type Sample = (f64, i64);

pub struct ResourceBase {
    name: RefCell<String>,
    recording: Cell<bool>,
    history: RefCell<Vec<Sample>>,
}

impl ResourceBase {
    pub fn new(name: &str) -> ResourceBase {
        ResourceBase {
            name: RefCell::new(name.to_string()),
            recording: Cell::new(false),
            history: RefCell::new(Vec::new()),
        }
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.borrow_mut() = name.to_string();
    }

    pub fn is_recording(&self) -> bool {
        self.recording.get()
    }

    /// Toggles recording. The core never decides *what* to do with the
    /// history beyond holding it — computing statistics over it is an
    /// external collaborator's job (§1).
    pub fn set_recording(&self, on: bool) {
        self.recording.set(on);
    }

    /// Appends `(now, value)` to the history if recording is on. A
    /// no-op (and so free) otherwise.
    pub fn record(&self, value: i64) {
        if self.recording.get() {
            self.history.borrow_mut().push((event::now(), value));
        }
    }

    pub fn history(&self) -> Vec<Sample> {
        self.history.borrow().clone()
    }

    pub fn clear_history(&self) {
        self.history.borrow_mut().clear();
    }
}

/// The "scram" hook from the original's `resource_base`: forcibly
/// reclaim up to `amount` units from whoever currently holds them.
/// Semantics of *who* gets picked are entirely up to the concrete
/// resource (§4.F calls this "application-defined"); the core only
/// requires that it returns how much was actually reclaimed.
pub trait Scram {
    fn scram(&self, amount: u64, signal: crate::signal::Signal) -> u64;
}

/// The "reprio" hook: a concrete resource's way of moving a process
/// already queued on one of its guards to a new priority without
/// disturbing anything else about its wait.
pub trait Reprio {
    fn reprioritize_waiter(&self, process: &Process, new_priority: i64);
}
