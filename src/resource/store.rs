//! A counted store (§4.F "Store"): up to `capacity` interchangeable
//! units on hand; `acquire(n)`/`release(n)` move amounts in and out
//! rather than granting exclusive ownership the way `Resource` does.

use std::cell::Cell;
use std::rc::Rc;

use crate::guard::{Demand, Guard};
use crate::process::Process;
use crate::resource::base::{Reprio, ResourceBase, Scram};
use crate::signal::{self, Signal};

pub struct Store {
    base: Rc<ResourceBase>,
    guard: Guard,
    capacity: u64,
    on_hand: Rc<Cell<u64>>,
}

impl Store {
    pub fn new(name: &str, capacity: u64) -> Store {
        Store {
            base: Rc::new(ResourceBase::new(name)),
            guard: Guard::new(),
            capacity,
            on_hand: Rc::new(Cell::new(capacity)),
        }
    }

    pub fn base(&self) -> &ResourceBase {
        self.base.as_ref()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn on_hand(&self) -> u64 {
        self.on_hand.get()
    }

    pub fn queue_len(&self) -> usize {
        self.guard.len()
    }

    /// Blocks until at least `n` units are available, then takes them.
    /// The demand closure performs the decrement itself at the instant
    /// it is found satisfiable (see `Resource::acquire` for why this
    /// can't be deferred to the woken coroutine's resume) — this is
    /// what makes `release`'s service-the-whole-queue loop correct
    /// when several queued amounts together add up to what was freed.
    pub fn acquire(&self, n: u64) -> Signal {
        kernel_assert!(n <= self.capacity, "Store::acquire: n exceeds capacity");
        if self.on_hand.get() >= n {
            self.on_hand.set(self.on_hand.get() - n);
            self.base.record(self.on_hand.get() as i64);
            return signal::SUCCESS;
        }
        let on_hand = self.on_hand.clone();
        let base = self.base.clone();
        let demand: Demand = Rc::new(move || {
            if on_hand.get() >= n {
                on_hand.set(on_hand.get() - n);
                base.record(on_hand.get() as i64);
                true
            } else {
                false
            }
        });
        self.guard.wait(demand)
    }

    /// Returns `n` units, then re-evaluates the queue head repeatedly —
    /// every waiter whose demand is now satisfiable in turn, not just
    /// the first — since one release can unblock more than one small
    /// `acquire`.
    pub fn release(&self, n: u64) {
        kernel_assert!(
            self.on_hand.get() + n <= self.capacity,
            "Store::release: would exceed capacity"
        );
        self.on_hand.set(self.on_hand.get() + n);
        self.base.record(self.on_hand.get() as i64);
        while self.guard.signal() {}
    }
}

impl Scram for Store {
    /// Forcibly reclaims up to `amount` units from the pool itself
    /// (not from a specific holder — a `Store`'s units are fungible and
    /// untracked per-acquirer, unlike `Resource::preempt`). Returns how
    /// much was actually reclaimed, which may be less than `amount` if
    /// fewer units are on hand. Delivers `signal` to no one — a
    /// `Store` does not know who holds its units once acquired — it is
    /// the caller's responsibility to notify whoever needs to know.
    fn scram(&self, amount: u64, _signal: Signal) -> u64 {
        let taken = amount.min(self.on_hand.get());
        self.on_hand.set(self.on_hand.get() - taken);
        self.base.record(self.on_hand.get() as i64);
        taken
    }
}

impl Reprio for Store {
    fn reprioritize_waiter(&self, process: &Process, new_priority: i64) {
        self.guard.reprioritize(process, new_priority);
    }
}
