//! Component C — the event queue and simulated clock.
//!
//! One `EventQueue` lives in thread-local storage per trial, holding the
//! current simulated time and a handle-heap ordered `(time ascending,
//! priority descending, handle ascending)` — earlier first, then higher
//! priority, FIFO among exact ties. Everything above it (process holds,
//! resource-guard wakeups) is just a particular choice of `action`.

use std::cell::RefCell;
use std::io::{self, Write};

use crate::handle::Handle;
use crate::heap::{IndexedHeap, Key};

/// An opaque, word-sized tag — a process id, a guard-queue slot, or
/// whatever the caller wants attached to an event. A tagged integer
/// stands in for a raw pointer so payloads stay comparable and `Send`.
pub type Tag = usize;

/// `action(subject, object)`, invoked synchronously when the event fires.
pub type Action = fn(Tag, Tag);

#[derive(Clone, Copy)]
pub struct EventPayload {
    pub action: Action,
    pub subject: Tag,
    pub object: Tag,
}

/// A search descriptor for `find`/`count`/`pattern_cancel`. `None` in any
/// field means "match anything here" — the explicit sum-type wildcard
/// the design notes ask for, rather than a magic sentinel value.
#[derive(Clone, Copy, Default)]
pub struct Pattern {
    pub action: Option<Action>,
    pub subject: Option<Tag>,
    pub object: Option<Tag>,
}

impl Pattern {
    pub fn any() -> Pattern {
        Pattern::default()
    }

    pub fn matches(&self, p: &EventPayload) -> bool {
        self.action.is_none_or(|a| a == p.action)
            && self.subject.is_none_or(|s| s == p.subject)
            && self.object.is_none_or(|o| o == p.object)
    }
}

fn event_less(a: &Key, b: &Key) -> bool {
    (a.dkey, -a.ikey, a.handle.raw()) < (b.dkey, -b.ikey, b.handle.raw())
}

/// Extension point for higher layers that need to observe *any* event
/// firing or being cancelled without the event queue knowing what a
/// process or a wait list is — `wait_event` is built entirely on this.
pub type Observer = fn(Handle);

pub struct EventQueue {
    heap: IndexedHeap<EventPayload>,
    now: f64,
}

impl EventQueue {
    fn new(start_time: f64) -> EventQueue {
        EventQueue {
            heap: IndexedHeap::new(event_less),
            now: start_time,
        }
    }
}

thread_local! {
    static QUEUE: RefCell<Option<EventQueue>> = const { RefCell::new(None) };
    static FIRE_HOOK: std::cell::Cell<Option<Observer>> = const { std::cell::Cell::new(None) };
    static CANCEL_HOOK: std::cell::Cell<Option<Observer>> = const { std::cell::Cell::new(None) };
}

/// Installs (or clears, with `None`) the callback run just after an event
/// is popped and dispatched.
pub fn set_fire_hook(hook: Option<Observer>) {
    FIRE_HOOK.with(|h| h.set(hook));
}

/// Installs (or clears, with `None`) the callback run just after an event
/// is cancelled.
pub fn set_cancel_hook(hook: Option<Observer>) {
    CANCEL_HOOK.with(|h| h.set(hook));
}

fn with_queue<R>(f: impl FnOnce(&EventQueue) -> R) -> R {
    QUEUE.with(|q| {
        let q = q.borrow();
        let q = q.as_ref().expect("event queue not initialized");
        f(q)
    })
}

fn with_queue_mut<R>(f: impl FnOnce(&mut EventQueue) -> R) -> R {
    QUEUE.with(|q| {
        let mut q = q.borrow_mut();
        let q = q.as_mut().expect("event queue not initialized");
        f(q)
    })
}

/// Fails (release assert) if a queue already exists on this thread.
pub fn initialize(start_time: f64) {
    QUEUE.with(|q| {
        let mut q = q.borrow_mut();
        kernel_assert!(q.is_none(), "event::initialize called twice on this thread");
        *q = Some(EventQueue::new(start_time));
    });
}

/// Frees the queue; `now()` is undefined until the next `initialize`.
pub fn terminate() {
    QUEUE.with(|q| {
        q.borrow_mut().take();
    });
}

/// Removes every pending event without tearing down the queue itself —
/// the idiom for "stop the simulation" from inside a running event.
pub fn clear() {
    with_queue_mut(|q| q.heap = IndexedHeap::new(event_less));
}

pub fn now() -> f64 {
    with_queue(|q| q.now)
}

/// Like `now()`, but `None` instead of a contract-violation panic if no
/// queue has been initialized on this thread. Used by the logger, which
/// may be asked to format a line before/after a trial's queue exists.
pub fn try_now() -> Option<f64> {
    QUEUE.with(|q| q.borrow().as_ref().map(|q| q.now))
}

/// Requires `time >= now()`. Returns the handle of the scheduled event.
pub fn schedule(action: Action, subject: Tag, object: Tag, time: f64, priority: i64) -> Handle {
    with_queue_mut(|q| {
        kernel_assert!(
            time >= q.now,
            "schedule: cannot schedule an event in the past ({} < {})",
            time,
            q.now
        );
        q.heap.enqueue(
            EventPayload {
                action,
                subject,
                object,
            },
            time,
            priority,
            0,
        )
    })
}

/// Pops and runs the earliest event, advancing `now` to its time first.
/// Returns `false` if the queue was empty.
pub fn execute_next() -> bool {
    let popped = with_queue_mut(|q| {
        if q.heap.is_empty() {
            return None;
        }
        let key = q.heap.peek_key().expect("checked non-empty");
        q.now = key.dkey;
        Some((key.handle, q.heap.dequeue()))
    });
    match popped {
        Some((handle, event)) => {
            log::trace!(
                "event: firing at t={} (subject={}, object={})",
                now(),
                event.subject,
                event.object
            );
            if let Some(hook) = FIRE_HOOK.with(|h| h.get()) {
                hook(handle);
            }
            (event.action)(event.subject, event.object);
            true
        }
        None => false,
    }
}

/// Runs `execute_next` until the queue drains.
pub fn execute() {
    while execute_next() {}
}

pub fn is_scheduled(handle: Handle) -> bool {
    with_queue(|q| q.heap.contains(handle))
}

pub fn time(handle: Handle) -> Option<f64> {
    with_queue(|q| q.heap.key_of(handle).map(|k| k.dkey))
}

pub fn priority(handle: Handle) -> Option<i64> {
    with_queue(|q| q.heap.key_of(handle).map(|k| k.ikey))
}

/// Idempotent: returns `false` (no-op) if `handle` is not (or no longer)
/// scheduled.
pub fn cancel(handle: Handle) -> bool {
    let cancelled = with_queue_mut(|q| q.heap.cancel(handle));
    if cancelled {
        if let Some(hook) = CANCEL_HOOK.with(|h| h.get()) {
            hook(handle);
        }
    }
    cancelled
}

pub fn reschedule(handle: Handle, new_time: f64) {
    with_queue_mut(|q| {
        kernel_assert!(
            new_time >= q.now,
            "reschedule: cannot move an event into the past"
        );
        q.heap.reschedule(handle, new_time);
    });
}

pub fn reprioritize(handle: Handle, new_priority: i64) {
    with_queue_mut(|q| q.heap.reprioritize(handle, new_priority));
}

pub fn find(pattern: Pattern) -> Option<Handle> {
    with_queue(|q| q.heap.find_by(|p| pattern.matches(p)))
}

pub fn count(pattern: Pattern) -> usize {
    with_queue(|q| q.heap.count_by(|p| pattern.matches(p)))
}

pub fn pattern_cancel(pattern: Pattern) -> usize {
    let mut cancelled = 0;
    while let Some(h) = find(pattern) {
        if cancel(h) {
            cancelled += 1;
        } else {
            break;
        }
    }
    cancelled
}

/// Debug-only dump: one line per entry, `handle\ttime\tpriority\tsubject\tobject\taction`.
pub fn queue_print(sink: &mut dyn Write) -> io::Result<()> {
    with_queue(|q| {
        for (handle, key, payload) in q.heap.iter() {
            writeln!(
                sink,
                "{}\t{}\t{}\t{}\t{}\t{:p}",
                handle.raw(),
                key.dkey,
                key.ikey,
                payload.subject,
                payload.object,
                payload.action as *const ()
            )?;
        }
        Ok(())
    })
}
