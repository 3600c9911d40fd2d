//! An object queue (§4.F "Object queue"): the same front/rear back-
//! pressure engine as `Buffer`, but carrying actual FIFO items instead
//! of a bare amount, each stamped with its enqueue time so a caller can
//! compute per-item wait-time statistics (the core only stamps; it
//! does not itself aggregate — see §1).

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::event;
use crate::guard::{Demand, Guard};
use crate::process::Process;
use crate::resource::base::{Reprio, ResourceBase};
use crate::signal::{self, Signal};

struct Slot<T> {
    enqueued_at: f64,
    item: T,
}

pub struct ObjectQueue<T> {
    base: Rc<ResourceBase>,
    capacity: u64,
    items: Rc<RefCell<VecDeque<Slot<T>>>>,
    length: Rc<Cell<u64>>,
    front: Guard,
    rear: Guard,
}

impl<T: 'static> ObjectQueue<T> {
    pub fn new(name: &str, capacity: u64) -> ObjectQueue<T> {
        ObjectQueue {
            base: Rc::new(ResourceBase::new(name)),
            capacity,
            items: Rc::new(RefCell::new(VecDeque::new())),
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
}

impl<T: Clone + 'static> ObjectQueue<T> {
    /// Blocks until there is room for one more item, then appends it,
    /// stamped with the current simulated time. Wakes `rear`.
    pub fn put(&self, item: T) -> Signal {
        if self.length.get() < self.capacity {
            self.push(item);
            self.rear.signal();
            return signal::SUCCESS;
        }
        let length = self.length.clone();
        let items = self.items.clone();
        let base = self.base.clone();
        let capacity = self.capacity;
        // The item must be moved into the demand closure, which may run
        // exactly once (the closure is `Fn`, not `FnOnce`, since `Guard`
        // needs to be able to re-evaluate it on every `signal()`; a
        // `RefCell<Option<T>>` lets it be taken the one time it fires).
        let pending = Rc::new(RefCell::new(Some(item)));
        let demand: Demand = Rc::new(move || {
            if length.get() < capacity {
                if let Some(item) = pending.borrow_mut().take() {
                    items.borrow_mut().push_back(Slot {
                        enqueued_at: event::now(),
                        item,
                    });
                    length.set(length.get() + 1);
                    base.record(length.get() as i64);
                }
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

    fn push(&self, item: T) {
        self.items.borrow_mut().push_back(Slot {
            enqueued_at: event::now(),
            item,
        });
        self.length.set(self.length.get() + 1);
        self.base.record(self.length.get() as i64);
    }

    /// Blocks until an item is available, then pops the oldest one.
    /// Returns the item's `(wait_time, value)` on success, or `None` if
    /// the wait was cut short (cancelled/interrupted) — in which case no
    /// item was removed. Wakes `front`.
    pub fn get(&self) -> (Signal, Option<(f64, T)>) {
        if let Some(pair) = self.try_pop() {
            self.front.signal();
            return (signal::SUCCESS, Some(pair));
        }
        let items = self.items.clone();
        let length = self.length.clone();
        let base = self.base.clone();
        let result = Rc::new(RefCell::new(None));
        let result2 = result.clone();
        let demand: Demand = Rc::new(move || {
            let mut items = items.borrow_mut();
            if let Some(slot) = items.pop_front() {
                length.set(length.get() - 1);
                base.record(length.get() as i64);
                *result2.borrow_mut() = Some((event::now() - slot.enqueued_at, slot.item));
                true
            } else {
                false
            }
        });
        let sig = self.rear.wait(demand);
        if sig == signal::SUCCESS {
            self.front.signal();
        }
        (sig, result.borrow_mut().take())
    }

    fn try_pop(&self) -> Option<(f64, T)> {
        let mut items = self.items.borrow_mut();
        let slot = items.pop_front()?;
        self.length.set(self.length.get() - 1);
        self.base.record(self.length.get() as i64);
        Some((event::now() - slot.enqueued_at, slot.item))
    }
}

impl<T: 'static> Reprio for ObjectQueue<T> {
    fn reprioritize_waiter(&self, process: &Process, new_priority: i64) {
        if !self.front.reprioritize(process, new_priority) {
            self.rear.reprioritize(process, new_priority);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event;
    use std::cell::RefCell as StdRefCell;

    fn reset() {
        event::terminate();
        event::initialize(0.0);
        crate::process::reset_thread_state();
    }

    #[test]
    fn fifo_order_and_wait_time_are_preserved() {
        reset();
        let q: Rc<ObjectQueue<&'static str>> = Rc::new(ObjectQueue::new("q", 10));
        q.put("a");
        q.put("b");

        let q2 = q.clone();
        let seen = Rc::new(StdRefCell::new(Vec::new()));
        let seen2 = seen.clone();
        let p = Process::new("consumer", 0, 0, move |_p, _ctx| {
            let (sig, item) = q2.get();
            seen2.borrow_mut().push((sig, item));
            let (sig, item) = q2.get();
            seen2.borrow_mut().push((sig, item));
            0
        });
        p.start();
        event::execute();

        let got = seen.borrow();
        assert_eq!(got[0].0, signal::SUCCESS);
        assert_eq!(got[0].1.as_ref().unwrap().1, "a");
        assert_eq!(got[1].1.as_ref().unwrap().1, "b");
        event::terminate();
    }

    #[test]
    fn get_on_empty_queue_blocks_until_put() {
        reset();
        let q: Rc<ObjectQueue<i32>> = Rc::new(ObjectQueue::new("q", 5));
        let q2 = q.clone();
        let observed = Rc::new(StdRefCell::new(None));
        let obs2 = observed.clone();
        let consumer = Process::new("c", 0, 0, move |_p, _ctx| {
            let (sig, item) = q2.get();
            obs2.borrow_mut().replace((sig, item));
            0
        });
        consumer.start();
        event::execute_next(); // bootstrap: consumer blocks on empty queue
        assert!(q.rear_queue_len() == 1);

        let q3 = q.clone();
        Process::new("producer_bootstrap", 0, 0, move |_p, _ctx| {
            q3.put(42);
            0
        })
        .start();
        event::execute();

        let got = observed.borrow();
        let (sig, item) = got.as_ref().unwrap();
        assert_eq!(*sig, signal::SUCCESS);
        assert_eq!(item.as_ref().unwrap().1, 42);
        event::terminate();
    }
}
