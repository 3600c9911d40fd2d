//! Component D — the process runtime.
//!
//! A process is a named, prioritized coroutine with a single "what am I
//! waiting for" slot. Every suspend/resume path — `hold`, `wait_event`,
//! `wait_process`, a resource guard's `wait` — ultimately bottoms out in
//! a coroutine `yield`/`resume`; this module's job is to make sure the
//! resume always arrives as a *scheduled* event, never a direct call,
//! so a canceller always finishes its own turn before the woken process
//! runs.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::coroutine::{Coro, CoroState, DEFAULT_STACK_SIZE};
use crate::event::{self, Tag};
use crate::guard::Guard;
use crate::handle::Handle;
use crate::signal::{self, Signal};

const MAX_NAME_LEN: usize = 63;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FinishKind {
    /// Ran to completion (or called `Process::exit` itself).
    Exited,
    /// Finished early by someone else calling `Process::stop`.
    Stopped,
}

#[derive(Clone, PartialEq)]
pub(crate) enum WaitsFor {
    None,
    Clock(Handle),
    Event(Handle),
    Process,
    Resource(Guard, Handle),
}

type Entry = Rc<dyn Fn(Process, usize) -> i64>;

struct Inner {
    id: u64,
    coro: Coro,
    priority: Cell<i64>,
    stack_size: usize,
    ctx: Cell<usize>,
    entry: Entry,
    waits_for: RefCell<WaitsFor>,
    joiners: RefCell<Vec<u64>>,
    finish_kind: Cell<FinishKind>,
    finished_handled: Cell<bool>,
}

/// A handle to a process object — cheap to clone, identity via `Rc`.
#[derive(Clone)]
pub struct Process(Rc<Inner>);

impl PartialEq for Process {
    fn eq(&self, other: &Process) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Process {}

thread_local! {
    static CURRENT: RefCell<Option<Process>> = const { RefCell::new(None) };
    static REGISTRY: RefCell<HashMap<u64, Process>> = RefCell::new(HashMap::new());
    static NEXT_ID: Cell<u64> = const { Cell::new(1) };
    static EVENT_WAITERS: RefCell<HashMap<u64, Vec<u64>>> = RefCell::new(HashMap::new());
    static HOOKS_INSTALLED: Cell<bool> = const { Cell::new(false) };
}

fn next_id() -> u64 {
    NEXT_ID.with(|c| {
        let id = c.get();
        c.set(id + 1);
        id
    })
}

fn register(p: &Process) {
    REGISTRY.with(|r| r.borrow_mut().insert(p.0.id, p.clone()));
}

fn lookup(id: u64) -> Option<Process> {
    REGISTRY.with(|r| r.borrow().get(&id).cloned())
}

fn unregister(id: u64) {
    REGISTRY.with(|r| r.borrow_mut().remove(&id));
}

/// Resets all thread-local process-runtime state. Paired with
/// `thread_state::init_thread_state`/`teardown_thread_state`.
pub(crate) fn reset_thread_state() {
    CURRENT.with(|c| c.borrow_mut().take());
    REGISTRY.with(|r| r.borrow_mut().clear());
    NEXT_ID.with(|c| c.set(1));
    EVENT_WAITERS.with(|w| w.borrow_mut().clear());
    install_event_hooks();
}

fn install_event_hooks() {
    if !HOOKS_INSTALLED.with(|h| h.replace(true)) {
        event::set_fire_hook(Some(on_event_fired));
        event::set_cancel_hook(Some(on_event_cancelled));
    }
}

impl Process {
    /// Creates and fully initializes a process: allocates its coroutine,
    /// stack and identity, and remembers `f`/`ctx`/`priority` so `start`
    /// (and any later restart) can invoke `f(self, ctx)`.
    pub fn new<F>(name: &str, priority: i64, ctx: usize, f: F) -> Process
    where
        F: Fn(Process, usize) -> i64 + 'static,
    {
        Self::with_stack_size(name, priority, ctx, DEFAULT_STACK_SIZE, f)
    }

    pub fn with_stack_size<F>(name: &str, priority: i64, ctx: usize, stack_size: usize, f: F) -> Process
    where
        F: Fn(Process, usize) -> i64 + 'static,
    {
        let coro = Coro::create(stack_size);
        coro.set_name(&truncate_name(name));
        let p = Process(Rc::new(Inner {
            id: next_id(),
            coro,
            priority: Cell::new(priority),
            stack_size,
            ctx: Cell::new(ctx),
            entry: Rc::new(f),
            waits_for: RefCell::new(WaitsFor::None),
            joiners: RefCell::new(Vec::new()),
            finish_kind: Cell::new(FinishKind::Exited),
            finished_handled: Cell::new(false),
        }));
        register(&p);
        p
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> String {
        self.0.coro.name()
    }

    pub fn set_name(&self, name: &str) {
        self.0.coro.set_name(&truncate_name(name));
    }

    pub fn priority(&self) -> i64 {
        self.0.priority.get()
    }

    /// Returns the previous priority. Does not move an already-enqueued
    /// resource-guard wait: see the design note on this in `guard`.
    pub fn set_priority(&self, priority: i64) -> i64 {
        self.0.priority.replace(priority)
    }

    pub fn is_finished(&self) -> bool {
        self.0.coro.is_finished()
    }

    /// Valid only once `is_finished()`; otherwise `0` (there is no value
    /// yet, matching the "warning + no value" contract).
    pub fn exit_value(&self) -> i64 {
        if self.is_finished() {
            self.0.coro.exit_value()
        } else {
            log::warn!("get_exit_value: process {} has not finished", self.name());
            0
        }
    }

    pub fn finish_kind(&self) -> Option<FinishKind> {
        self.is_finished().then(|| self.0.finish_kind.get())
    }

    /// The process currently executing, or `None` if control is in the
    /// dispatcher/main coroutine.
    pub fn get_current() -> Option<Process> {
        CURRENT.with(|c| c.borrow().clone())
    }

    pub(crate) fn waits_for_snapshot(&self) -> WaitsFor {
        self.0.waits_for.borrow().clone()
    }

    pub(crate) fn set_waits_for(&self, wf: WaitsFor) {
        *self.0.waits_for.borrow_mut() = wf;
    }

    /// Schedules the zero-duration bootstrap event. Legal from `Created`
    /// or `Finished` (a restart); resets the coroutine first on restart.
    pub fn start(&self) {
        if self.0.coro.is_finished() {
            self.0.coro.reset(self.0.stack_size);
            self.0.finished_handled.set(false);
        }
        kernel_assert!(
            self.0.coro.state() == CoroState::Created,
            "start: process must be freshly created or finished"
        );
        event::schedule(
            process_start_action,
            self.id() as Tag,
            0,
            event::now(),
            self.priority(),
        );
    }

    /// Requires a current process, and `dur >= 0`. Suspends the calling
    /// process until `now + dur`, returning `0` on a normal wake or the
    /// interrupt signal that preempted it.
    pub fn hold(dur: f64) -> Signal {
        kernel_assert!(dur >= 0.0, "hold: duration must be non-negative");
        let me = Process::get_current().expect("hold: no current process");
        kernel_assert!(
            me.waits_for_snapshot() == WaitsFor::None,
            "hold: process is already waiting on something"
        );
        let h = event::schedule(
            wake_clock_action,
            me.id() as Tag,
            0,
            event::now() + dur,
            me.priority(),
        );
        me.set_waits_for(WaitsFor::Clock(h));
        Coro::yield_now(0)
    }

    /// Delivers `sig` (nonzero) to `self` at the current time if it is
    /// still holding when the interrupt event runs. A process already
    /// awake, or already claimed by an earlier interrupt, ignores this.
    pub fn interrupt(&self, sig: Signal, priority: i64) {
        kernel_assert!(sig != 0, "interrupt: signal must be nonzero");
        event::schedule(
            interrupt_action,
            self.id() as Tag,
            sig as u64 as Tag,
            event::now(),
            priority,
        );
    }

    /// Schedules a stop event: sets `exit_value`, marks the coroutine
    /// finished, cancels any outstanding wait, and wakes joiners with
    /// `STOPPED`. Never switches — the process that called `stop` keeps
    /// running until it next yields.
    pub fn stop(&self, retval: i64) {
        event::schedule(
            process_stop_action,
            self.id() as Tag,
            retval as u64 as Tag,
            event::now(),
            self.priority(),
        );
    }

    /// Callable only from inside the running process itself.
    pub fn exit(retval: i64) -> ! {
        Coro::exit(retval)
    }

    /// Waits for `evt` (a handle previously returned by `event::schedule`)
    /// to fire or be cancelled. Requires `evt` to currently be scheduled.
    pub fn wait_event(evt: Handle) -> Signal {
        let me = Process::get_current().expect("wait_event: no current process");
        kernel_assert!(
            event::is_scheduled(evt),
            "wait_event: event is not currently scheduled"
        );
        kernel_assert!(
            me.waits_for_snapshot() == WaitsFor::None,
            "wait_event: process is already waiting on something"
        );
        EVENT_WAITERS.with(|w| w.borrow_mut().entry(evt.raw()).or_default().push(me.id()));
        me.set_waits_for(WaitsFor::Event(evt));
        Coro::yield_now(0)
    }

    /// If `other` has already finished, returns immediately with
    /// `NORMAL` or `STOPPED` depending on how. Otherwise joins `other`'s
    /// waiter list and is woken by its terminator.
    pub fn wait_process(&self) -> Signal {
        let me = Process::get_current().expect("wait_process: no current process");
        if self.is_finished() {
            return match self.0.finish_kind.get() {
                FinishKind::Exited => signal::NORMAL,
                FinishKind::Stopped => signal::STOPPED,
            };
        }
        kernel_assert!(
            me.waits_for_snapshot() == WaitsFor::None,
            "wait_process: process is already waiting on something"
        );
        self.0.joiners.borrow_mut().push(me.id());
        me.set_waits_for(WaitsFor::Process);
        Coro::yield_now(0)
    }

    fn cancel_wait(&self) {
        let wf = std::mem::replace(&mut *self.0.waits_for.borrow_mut(), WaitsFor::None);
        match wf {
            WaitsFor::Clock(h) | WaitsFor::Event(h) => {
                event::cancel(h);
            }
            WaitsFor::Resource(guard, h) => {
                guard.remove_handle(h);
            }
            WaitsFor::Process | WaitsFor::None => {}
        }
    }

    fn finish(&self, kind: FinishKind) {
        if self.0.finished_handled.replace(true) {
            return;
        }
        self.0.finish_kind.set(kind);
        let sig = match kind {
            FinishKind::Exited => signal::NORMAL,
            FinishKind::Stopped => signal::STOPPED,
        };
        for joiner_id in self.0.joiners.borrow_mut().drain(..) {
            if let Some(joiner) = lookup(joiner_id) {
                if joiner.waits_for_snapshot() == WaitsFor::Process {
                    joiner.set_waits_for(WaitsFor::None);
                    schedule_wake_now(&joiner, sig);
                }
            }
        }
    }

    /// Frees the process from the registry. Requires it has finished.
    pub fn destroy(self) {
        kernel_assert!(self.is_finished(), "destroy: process has not finished");
        unregister(self.0.id);
    }
}

fn truncate_name(name: &str) -> String {
    let mut owned = name.to_string();
    if owned.len() > MAX_NAME_LEN {
        let cut = owned
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|&i| i <= MAX_NAME_LEN)
            .last()
            .unwrap_or(0);
        owned.truncate(cut);
    }
    owned
}

fn run_as_current<R>(p: &Process, f: impl FnOnce() -> R) -> R {
    let prev = CURRENT.with(|c| c.borrow_mut().replace(p.clone()));
    let result = f();
    CURRENT.with(|c| *c.borrow_mut() = prev);
    result
}

/// Unconditionally schedules a zero-delay wake for `p` carrying `sig`.
/// Used everywhere a resume must arrive as a scheduled event rather than
/// a direct call.
pub(crate) fn schedule_wake_now(p: &Process, sig: Signal) {
    event::schedule(
        deliver_signal_action,
        p.id() as Tag,
        sig as u64 as Tag,
        event::now(),
        p.priority(),
    );
}

/// Like `schedule_wake_now`, but the wake action re-checks that `p` is
/// still the running coroutine state at fire time — used by a resource
/// guard's `signal`, whose head may have been stopped out from under it
/// between the call and the event actually running.
pub(crate) fn schedule_conditional_wake(p: &Process, sig: Signal) {
    event::schedule(
        guard_wake_action,
        p.id() as Tag,
        sig as u64 as Tag,
        event::now(),
        p.priority(),
    );
}

fn activate(p: &Process, arg: i64) {
    run_as_current(p, || {
        let _ = p.0.coro.resume(arg);
    });
}

fn process_start_action(subject: Tag, _object: Tag) {
    let Some(p) = lookup(subject as u64) else {
        return;
    };
    let entry = p.0.entry.clone();
    let ctx = p.0.ctx.get();
    let coro = p.0.coro.clone();
    let started = p.clone();
    run_as_current(&p, || {
        coro.start(
            move |_c, arg| {
                let ret = (entry)(started.clone(), arg as usize);
                started.finish(FinishKind::Exited);
                ret
            },
            ctx as i64,
        );
    });
}

fn wake_clock_action(subject: Tag, _object: Tag) {
    let Some(p) = lookup(subject as u64) else {
        return;
    };
    if !matches!(p.waits_for_snapshot(), WaitsFor::Clock(_)) {
        return;
    }
    p.set_waits_for(WaitsFor::None);
    activate(&p, signal::NORMAL);
}

fn interrupt_action(subject: Tag, object: Tag) {
    let Some(p) = lookup(subject as u64) else {
        return;
    };
    let sig = object as u64 as i64;
    if let WaitsFor::Clock(h) = p.waits_for_snapshot() {
        if event::is_scheduled(h) {
            event::cancel(h);
            p.set_waits_for(WaitsFor::None);
            activate(&p, sig);
        }
    }
}

fn process_stop_action(subject: Tag, object: Tag) {
    let Some(p) = lookup(subject as u64) else {
        return;
    };
    let retval = object as u64 as i64;
    p.cancel_wait();
    p.0.coro.stop(retval);
    p.finish(FinishKind::Stopped);
}

fn deliver_signal_action(subject: Tag, object: Tag) {
    let Some(p) = lookup(subject as u64) else {
        return;
    };
    activate(&p, object as u64 as i64);
}

fn guard_wake_action(subject: Tag, object: Tag) {
    let Some(p) = lookup(subject as u64) else {
        return;
    };
    if p.0.coro.state() == CoroState::Running {
        activate(&p, object as u64 as i64);
    }
}

fn on_event_fired(h: Handle) {
    wake_event_waiters(h, signal::NORMAL);
}

fn on_event_cancelled(h: Handle) {
    wake_event_waiters(h, signal::CANCELLED);
}

fn wake_event_waiters(h: Handle, sig: Signal) {
    let ids = EVENT_WAITERS.with(|w| w.borrow_mut().remove(&h.raw()));
    let Some(ids) = ids else { return };
    for id in ids {
        if let Some(p) = lookup(id) {
            if p.waits_for_snapshot() == WaitsFor::Event(h) {
                p.set_waits_for(WaitsFor::None);
                schedule_wake_now(&p, sig);
            }
        }
    }
}
