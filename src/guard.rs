//! Component E — the resource guard.
//!
//! A guard is a priority-ordered wait queue in front of some resource:
//! processes block on a demand predicate rather than a fixed condition,
//! so the same engine drives a single-unit resource, a counted store, a
//! two-sided buffer and a condition variable alike. The guard never
//! touches the resource's own accounting — that's the demand closure's
//! job — it only orders waiters and delivers wakes.

use std::cell::RefCell;
use std::rc::Rc;

use crate::heap::{IndexedHeap, Key};
use crate::process::{self, Process, WaitsFor};
use crate::signal::{self, Signal};

/// A demand predicate: "can the head of the queue proceed right now?"
/// Closures stand in for the `(resource_base, process, ctx)` triple —
/// idiomatic Rust already captures whatever a concrete resource needs.
pub type Demand = Rc<dyn Fn() -> bool>;

struct Waiting {
    process: Process,
    demand: Demand,
}

struct GuardInner {
    heap: RefCell<IndexedHeap<Waiting>>,
    observers: RefCell<Vec<Guard>>,
}

fn guard_less(a: &Key, b: &Key) -> bool {
    (-a.ikey, a.handle.raw()) < (-b.ikey, b.handle.raw())
}

/// A handle to a guard object — cheap to clone, identity via `Rc`.
#[derive(Clone)]
pub struct Guard(Rc<GuardInner>);

impl PartialEq for Guard {
    fn eq(&self, other: &Guard) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Guard {}

impl Default for Guard {
    fn default() -> Guard {
        Guard::new()
    }
}

impl Guard {
    pub fn new() -> Guard {
        Guard(Rc::new(GuardInner {
            heap: RefCell::new(IndexedHeap::new(guard_less)),
            observers: RefCell::new(Vec::new()),
        }))
    }

    pub fn len(&self) -> usize {
        self.0.heap.borrow().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.heap.borrow().is_empty()
    }

    /// Requires a current process not already waiting on anything.
    /// Enqueues it at `ikey = process priority`, yields, and returns the
    /// signal it was eventually woken with.
    pub fn wait(&self, demand: Demand) -> Signal {
        let me = Process::get_current().expect("guard wait: no current process");
        kernel_assert!(
            me.waits_for_snapshot() == WaitsFor::None,
            "guard wait: process is already waiting on something"
        );
        let handle = self.0.heap.borrow_mut().enqueue(
            Waiting {
                process: me.clone(),
                demand,
            },
            0.0,
            me.priority(),
            0,
        );
        me.set_waits_for(WaitsFor::Resource(self.clone(), handle));
        let sig = crate::coroutine::Coro::yield_now(0);
        me.set_waits_for(WaitsFor::None);
        sig
    }

    /// Evaluates the head waiter's demand. If satisfied, dequeues it and
    /// schedules a wake with `SUCCESS` (delivered only if the process is
    /// still running when the wake fires), forwards to every observer,
    /// and returns `true`. Never looks past the head — a later waiter's
    /// satisfiable demand does not jump the queue.
    pub fn signal(&self) -> bool {
        let head = {
            let heap = self.0.heap.borrow();
            heap.peek_root()
                .map(|w| (w.process.clone(), w.demand.clone()))
        };
        let Some((p, demand)) = head else {
            return false;
        };
        if !(demand)() {
            return false;
        }
        self.0.heap.borrow_mut().dequeue();
        p.set_waits_for(WaitsFor::None);
        process::schedule_conditional_wake(&p, signal::SUCCESS);
        for observer in self.0.observers.borrow().clone() {
            observer.signal();
        }
        true
    }

    /// Removes `p` from the queue (if present) and wakes it with
    /// `CANCELLED`.
    pub fn cancel(&self, p: &Process) -> bool {
        self.take_handle_for(p)
            .map(|h| {
                self.0.heap.borrow_mut().cancel(h);
                p.set_waits_for(WaitsFor::None);
                process::schedule_wake_now(p, signal::CANCELLED);
            })
            .is_some()
    }

    /// Like `cancel`, but does not wake `p` — used when something else
    /// is already delivering a wake (e.g. `Process::stop`'s own path).
    pub(crate) fn remove_handle(&self, handle: crate::handle::Handle) -> bool {
        self.0.heap.borrow_mut().cancel(handle)
    }

    /// Removes `p` from the queue without waking it at all.
    pub fn remove(&self, p: &Process) -> bool {
        self.take_handle_for(p)
            .map(|h| {
                self.0.heap.borrow_mut().cancel(h);
            })
            .is_some()
    }

    /// Re-settles `p`'s queued entry at a new `ikey`. §9's open question
    /// on priority changes between enqueue and wake is resolved here:
    /// the waiter immediately moves to its new place in FIFO-among-equal
    /// order, exactly as if it had originally enqueued at that priority.
    /// A no-op if `p` isn't currently queued on this guard.
    pub fn reprioritize(&self, p: &Process, new_priority: i64) -> bool {
        match self.take_handle_for(p) {
            Some(h) => {
                self.0.heap.borrow_mut().reprioritize(h, new_priority);
                true
            }
            None => false,
        }
    }

    fn take_handle_for(&self, p: &Process) -> Option<crate::handle::Handle> {
        match p.waits_for_snapshot() {
            WaitsFor::Resource(ref g, h) if *g == *self => Some(h),
            _ => None,
        }
    }

    /// Adds `other` to the set of guards re-signalled whenever this one
    /// services its head. Refuses to create an observer cycle.
    pub fn register(&self, other: &Guard) {
        kernel_assert!(
            !other.reaches(self),
            "guard::register: would create an observer cycle"
        );
        self.0.observers.borrow_mut().push(other.clone());
    }

    pub fn unregister(&self, other: &Guard) {
        self.0.observers.borrow_mut().retain(|g| g != other);
    }

    fn reaches(&self, target: &Guard) -> bool {
        if self == target {
            return true;
        }
        self.0
            .observers
            .borrow()
            .iter()
            .any(|o| o.reaches(target))
    }
}
