//! A two-sided bounded buffer (§4.F "Buffer"): `put`/`get` move an
//! amount in or out, gated by two guards — `front` holds producers
//! waiting for room, `rear` holds consumers waiting for content. Each
//! successful side signals the *other* guard, since freeing room helps
//! producers and adding content helps consumers.

use std::cell::Cell;
use std::rc::Rc;

use crate::guard::{Demand, Guard};
use crate::process::Process;
use crate::resource::base::{Reprio, ResourceBase};
use crate::signal::{self, Signal};

pub struct Buffer {
    base: Rc<ResourceBase>,
    capacity: u64,
    length: Rc<Cell<u64>>,
    front: Guard,
    rear: Guard,
}

impl Buffer {
    pub fn new(name: &str, capacity: u64) -> Buffer {
        Buffer {
            base: Rc::new(ResourceBase::new(name)),
            capacity,
            length: Rc::new(Cell::new(0)),
            front: Guard::new(),
            rear: Guard::new(),
        }
    }

    pub fn base(&self) -> &ResourceBase {
        self.base.as_ref()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn length(&self) -> u64 {
        self.length.get()
    }

    pub fn front_queue_len(&self) -> usize {
        self.front.len()
    }

    pub fn rear_queue_len(&self) -> usize {
        self.rear.len()
    }

    /// Toggles recording on `base()`. Turning it on immediately samples
    /// the current length, so the history's first entry is the length
    /// at the moment recording started rather than whatever it happens
    /// to be after the next `put`/`get`.
    pub fn set_recording(&self, on: bool) {
        self.base.set_recording(on);
        if on {
            self.base.record(self.length.get() as i64);
        }
    }

    /// Blocks a producer until `length + n <= capacity`, then adds `n`.
    /// Wakes the `rear` guard (consumers) on success, since there is
    /// now more to get. A call that has to block still samples the
    /// (unchanged) length at the moment it finds out it can't proceed —
    /// §8's S5 trace counts that blocked attempt as its own sample.
    pub fn put(&self, n: u64) -> Signal {
        kernel_assert!(n <= self.capacity, "Buffer::put: n exceeds capacity");
        if self.length.get() + n <= self.capacity {
            self.length.set(self.length.get() + n);
            self.base.record(self.length.get() as i64);
            self.rear.signal();
            return signal::SUCCESS;
        }
        self.base.record(self.length.get() as i64);
        let length = self.length.clone();
        let base = self.base.clone();
        let capacity = self.capacity;
        let demand: Demand = Rc::new(move || {
            if length.get() + n <= capacity {
                length.set(length.get() + n);
                base.record(length.get() as i64);
                true
            } else {
                false
            }
        });
        let sig = self.front.wait(demand);
        if sig == signal::SUCCESS {
            self.rear.signal();
        }
        sig
    }

    /// Blocks a consumer until `length >= n`, then removes `n`. Wakes
    /// the `front` guard (producers) on success, since there is now
    /// more room. A call that has to block still samples the
    /// (unchanged) length at the moment it finds out it can't proceed.
    pub fn get(&self, n: u64) -> Signal {
        if self.length.get() >= n {
            self.length.set(self.length.get() - n);
            self.base.record(self.length.get() as i64);
            self.front.signal();
            return signal::SUCCESS;
        }
        self.base.record(self.length.get() as i64);
        let length = self.length.clone();
        let base = self.base.clone();
        let demand: Demand = Rc::new(move || {
            if length.get() >= n {
                length.set(length.get() - n);
                base.record(length.get() as i64);
                true
            } else {
                false
            }
        });
        let sig = self.rear.wait(demand);
        if sig == signal::SUCCESS {
            self.front.signal();
        }
        sig
    }
}

impl Reprio for Buffer {
    /// `process` is queued on at most one of `front`/`rear` at a time
    /// (a producer or a consumer, never both); try both and let
    /// `Guard::reprioritize`'s own waiter check no-op on the one it
    /// isn't queued on.
    fn reprioritize_waiter(&self, process: &Process, new_priority: i64) {
        if !self.front.reprioritize(process, new_priority) {
            self.rear.reprioritize(process, new_priority);
        }
    }
}
