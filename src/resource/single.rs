//! A single-unit resource (§4.F "Resource"): at most one process holds
//! it at a time; everyone else queues on one guard, highest priority
//! first, FIFO among ties.

use std::cell::RefCell;
use std::rc::Rc;

use crate::guard::{Demand, Guard};
use crate::process::Process;
use crate::resource::base::{Reprio, ResourceBase};
use crate::signal::{self, Signal};

pub struct Resource {
    base: Rc<ResourceBase>,
    guard: Guard,
    owner: Rc<RefCell<Option<Process>>>,
}

impl Resource {
    pub fn new(name: &str) -> Resource {
        Resource {
            base: Rc::new(ResourceBase::new(name)),
            guard: Guard::new(),
            owner: Rc::new(RefCell::new(None)),
        }
    }

    pub fn base(&self) -> &ResourceBase {
        self.base.as_ref()
    }

    pub fn is_held(&self) -> bool {
        self.owner.borrow().is_some()
    }

    pub fn owner(&self) -> Option<Process> {
        self.owner.borrow().clone()
    }

    pub fn queue_len(&self) -> usize {
        self.guard.len()
    }

    /// Takes the resource immediately if free, else queues the calling
    /// process on the demand "owner is none". The demand closure both
    /// checks *and*, on success, performs the grant itself — the same
    /// instant the guard's `signal()` loop finds it satisfiable, not
    /// deferred to when the woken coroutine actually resumes. That
    /// matters once more than one waiter is serviced in the same
    /// `signal()` pass (see `Store::release`): later waiters in that
    /// pass must see the effects of earlier ones immediately. Returns
    /// the eventual signal: `SUCCESS` for a clean acquire, anything
    /// else means the wait was cut short (cancelled/preempted/
    /// interrupted) and the resource was *not* granted.
    pub fn acquire(&self) -> Signal {
        let me = Process::get_current().expect("Resource::acquire: no current process");
        if self.owner.borrow().is_none() {
            *self.owner.borrow_mut() = Some(me);
            self.base.record(1);
            return signal::SUCCESS;
        }
        let owner = self.owner.clone();
        let base = self.base.clone();
        let granted_to = me;
        let demand: Demand = Rc::new(move || {
            if owner.borrow().is_none() {
                *owner.borrow_mut() = Some(granted_to.clone());
                base.record(1);
                true
            } else {
                false
            }
        });
        self.guard.wait(demand)
    }

    /// Requires the caller currently owns the resource. Clears
    /// ownership and signals the guard so the next waiter (if its
    /// demand still holds) gets it.
    pub fn release(&self) {
        let me = Process::get_current().expect("Resource::release: no current process");
        kernel_assert!(
            self.owner.borrow().as_ref() == Some(&me),
            "Resource::release: caller does not hold this resource"
        );
        *self.owner.borrow_mut() = None;
        self.base.record(0);
        self.guard.signal();
    }

    /// Takes the resource unconditionally. If someone already held it,
    /// that process is interrupted with `PREEMPTED` — it does not
    /// itself call `release`, since it never chose to give the resource
    /// up.
    pub fn preempt(&self) {
        let me = Process::get_current().expect("Resource::preempt: no current process");
        let previous = self.owner.replace(Some(me));
        self.base.record(1);
        if let Some(prev_owner) = previous {
            let pri = prev_owner.priority();
            prev_owner.interrupt(signal::PREEMPTED, pri);
        }
    }
}

impl Reprio for Resource {
    /// Moves a still-queued waiter to a new place in the guard's
    /// priority order. A no-op if `process` already holds the resource
    /// or isn't queued on it at all.
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
    fn acquire_when_free_succeeds_immediately() {
        reset();
        let r = Rc::new(Resource::new("r"));
        let r2 = r.clone();
        let observed = StdRc::new(Cell::new(None));
        let obs2 = observed.clone();
        let p = Process::new("p", 0, 0, move |_p, _ctx| {
            obs2.set(Some(r2.acquire()));
            0
        });
        p.start();
        event::execute();
        assert_eq!(observed.get(), Some(signal::SUCCESS));
        assert!(r.is_held());
        event::terminate();
    }

    // S4 — resource priority: higher-priority waiter wakes first on release.
    #[test]
    fn s4_release_wakes_highest_priority_waiter() {
        reset();
        let r = Rc::new(Resource::new("r"));
        let held = r.clone();
        let o = Process::new("o", 0, 0, move |_p, _ctx| {
            held.acquire();
            0
        });
        o.start();
        event::execute();
        assert!(r.is_held());

        let order = StdRc::new(RefCell::new(Vec::new()));
        let r_l = r.clone();
        let order_l = order.clone();
        let low = Process::new("low", 1, 0, move |_p, _ctx| {
            r_l.acquire();
            order_l.borrow_mut().push("low");
            0
        });
        low.start();
        event::execute();

        let r_h = r.clone();
        let order_h = order.clone();
        let high = Process::new("high", 5, 0, move |_p, _ctx| {
            r_h.acquire();
            order_h.borrow_mut().push("high");
            0
        });
        high.start();
        event::execute();

        assert_eq!(r.queue_len(), 2);
        r.release();
        event::execute();
        assert_eq!(order.borrow().as_slice(), &["high"]);
        assert_eq!(r.queue_len(), 1);
        event::terminate();
    }

    #[test]
    fn preempt_interrupts_previous_owner() {
        reset();
        let r = Rc::new(Resource::new("r"));
        let signal_seen = StdRc::new(Cell::new(None));
        let sig2 = signal_seen.clone();
        let r1 = r.clone();
        let victim = Process::new("victim", 0, 0, move |_p, _ctx| {
            r1.acquire();
            let s = Process::hold(1000.0);
            sig2.set(Some(s));
            0
        });
        victim.start();
        event::execute_next(); // bootstrap: acquires then holds

        let r2 = r.clone();
        let taker = Process::new("taker", 0, 0, move |_p, _ctx| {
            r2.preempt();
            0
        });
        taker.start();
        event::execute();

        assert_eq!(signal_seen.get(), Some(signal::PREEMPTED));
        assert_eq!(r.owner().map(|p| p.name()), Some("taker".to_string()));
        event::terminate();
    }
}
