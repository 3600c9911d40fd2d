//! A condition variable (§4.F "Condition"): no countable contents of
//! its own, just a guard plus whatever shared state the application
//! wants to gate on. `wait` is a thin wrapper over `Guard::wait`;
//! `signal` re-evaluates the head demand the same way every other
//! guard-backed resource does.

use std::cell::RefCell;
use std::rc::Rc;

use crate::guard::{Demand, Guard};
use crate::process::Process;
use crate::resource::base::{Reprio, ResourceBase};
use crate::signal::Signal;

pub struct Condition<T> {
    base: ResourceBase,
    guard: Guard,
    state: Rc<RefCell<T>>,
}

impl<T> Condition<T> {
    pub fn new(name: &str, initial: T) -> Condition<T> {
        Condition {
            base: ResourceBase::new(name),
            guard: Guard::new(),
            state: Rc::new(RefCell::new(initial)),
        }
    }

    pub fn base(&self) -> &ResourceBase {
        &self.base
    }

    /// A clone of the handle to the condition's shared state, for a
    /// caller to build a `Demand` closure that reads (or mutates) it.
    pub fn state(&self) -> Rc<RefCell<T>> {
        self.state.clone()
    }

    pub fn queue_len(&self) -> usize {
        self.guard.len()
    }

    /// Suspends the calling process until `demand` holds.
    pub fn wait(&self, demand: Demand) -> Signal {
        self.guard.wait(demand)
    }

    /// Re-evaluates the head of the wait queue; `true` if it was woken.
    pub fn signal(&self) -> bool {
        self.guard.signal()
    }
}

impl<T> Reprio for Condition<T> {
    fn reprioritize_waiter(&self, process: &Process, new_priority: i64) {
        self.guard.reprioritize(process, new_priority);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event;
    use std::cell::Cell;
    use std::rc::Rc as StdRc;

    fn reset() {
        event::terminate();
        event::initialize(0.0);
        crate::process::reset_thread_state();
    }

    #[test]
    fn wait_suspends_until_predicate_holds_over_shared_state() {
        reset();
        let cv = Rc::new(Condition::new("ready", false));
        let order = StdRc::new(RefCell::new(Vec::new()));

        let cv2 = cv.clone();
        let order2 = order.clone();
        let waiter = Process::new("waiter", 0, 0, move |_p, _ctx| {
            let state = cv2.state();
            let demand: Demand = Rc::new(move || *state.borrow());
            cv2.wait(demand);
            order2.borrow_mut().push("woken");
            0
        });
        waiter.start();
        event::execute();
        assert!(cv.queue_len() == 1);
        assert!(order.borrow().is_empty());

        *cv.state().borrow_mut() = true;
        cv.signal();
        event::execute();

        assert_eq!(order.borrow().as_slice(), &["woken"]);
        event::terminate();
    }

    #[test]
    fn signal_with_unmet_predicate_leaves_waiter_queued() {
        reset();
        let cv = Rc::new(Condition::new("ready", false));
        let woken = StdRc::new(Cell::new(false));

        let cv2 = cv.clone();
        let woken2 = woken.clone();
        let waiter = Process::new("waiter", 0, 0, move |_p, _ctx| {
            let state = cv2.state();
            let demand: Demand = Rc::new(move || *state.borrow());
            cv2.wait(demand);
            woken2.set(true);
            0
        });
        waiter.start();
        event::execute();

        cv.signal(); // state is still false
        event::execute();
        assert!(!woken.get());
        assert_eq!(cv.queue_len(), 1);
        event::terminate();
    }
}
