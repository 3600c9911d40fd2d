//! Component B — the stackful coroutine engine.
//!
//! Built directly on the `context` crate, an asymmetric stackful
//! context-switching library: each non-main coroutine owns a
//! `ProtectedFixedSizeStack` and a single saved
//! `Context` — "the context to jump to in order to continue this
//! coroutine from its last suspension point." A transfer is then just:
//! take the target's saved context, `.resume()` into it, and stash
//! whatever context comes back as the target's new saved point. That
//! single rule is symmetric and handles every direction of switch
//! (start, transfer, yield, resume) uniformly; only the very first entry
//! into a freshly created coroutine needs one extra bootstrap step,
//! handled by the trampoline below.
//!
//! Only one coroutine per host thread ever runs at a time; a thread owns
//! exactly two globals, `current` and `main`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use context::stack::ProtectedFixedSizeStack;
use context::{Context, Transfer};

/// Default stack size for a process coroutine.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

const MAX_NAME_LEN: usize = 63;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CoroState {
    Created,
    Running,
    Finished,
}

struct Inner {
    stack: RefCell<Option<ProtectedFixedSizeStack>>,
    saved: RefCell<Option<Context>>,
    state: Cell<CoroState>,
    exit_value: Cell<i64>,
    parent: RefCell<Option<Coro>>,
    caller: RefCell<Option<Coro>>,
    name: RefCell<String>,
    entry: RefCell<Option<Box<dyn FnOnce(Coro, i64) -> i64>>>,
}

/// A handle to a coroutine object: a cheap, reference-counted clone of a
/// stack + saved context + bookkeeping. Single-threaded by construction —
/// a trial never runs two coroutines concurrently — so plain `Rc`
/// suffices here; a work-stealing scheduler spreading coroutines across
/// threads would need `Arc` instead.
#[derive(Clone)]
pub struct Coro(Rc<Inner>);

impl PartialEq for Coro {
    fn eq(&self, other: &Coro) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Coro {}

thread_local! {
    static CURRENT: RefCell<Option<Coro>> = const { RefCell::new(None) };
    static MAIN: RefCell<Option<Coro>> = const { RefCell::new(None) };
}

struct Boot {
    coro: Coro,
    arg: i64,
}

impl Coro {
    /// Allocates a coroutine object and its stack. Lazily creates the
    /// thread's main coroutine on first call. State starts `Created`.
    pub fn create(stack_size: usize) -> Coro {
        ensure_main();
        let stack = ProtectedFixedSizeStack::new(stack_size)
            .expect("failed to allocate a guarded coroutine stack");
        let context = unsafe { Context::new(&stack, trampoline) };
        Coro(Rc::new(Inner {
            stack: RefCell::new(Some(stack)),
            saved: RefCell::new(Some(context)),
            state: Cell::new(CoroState::Created),
            exit_value: Cell::new(0),
            parent: RefCell::new(None),
            caller: RefCell::new(None),
            name: RefCell::new(String::new()),
            entry: RefCell::new(None),
        }))
    }

    /// The coroutine currently executing, or `None`/`main` if control is
    /// in the dispatcher.
    pub fn current() -> Option<Coro> {
        CURRENT.with(|c| c.borrow().clone())
    }

    pub fn is_main(&self) -> bool {
        MAIN.with(|m| m.borrow().as_ref() == Some(self))
    }

    pub fn state(&self) -> CoroState {
        self.0.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.state() == CoroState::Finished
    }

    pub fn exit_value(&self) -> i64 {
        self.0.exit_value.get()
    }

    pub fn name(&self) -> String {
        self.0.name.borrow().clone()
    }

    /// Truncating setter: names are capped at `MAX_NAME_LEN` bytes.
    pub fn set_name(&self, name: &str) {
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
        *self.0.name.borrow_mut() = owned;
    }

    pub fn parent(&self) -> Option<Coro> {
        self.0.parent.borrow().clone()
    }

    pub fn caller(&self) -> Option<Coro> {
        self.0.caller.borrow().clone()
    }

    /// Legal only in `Created` state. Sets `parent = caller = current`,
    /// `state = Running`, and transfers control into `f(self, arg)`.
    /// Returns whatever value is eventually passed back via `yield`,
    /// `resume`, or the coroutine's own return/exit.
    pub fn start<F>(&self, f: F, arg: i64) -> i64
    where
        F: FnOnce(Coro, i64) -> i64 + 'static,
    {
        kernel_assert!(
            self.state() == CoroState::Created,
            "start: coroutine must be in the Created state"
        );
        *self.0.entry.borrow_mut() = Some(Box::new(f));
        let starter = Coro::current();
        *self.0.parent.borrow_mut() = starter.clone();
        *self.0.caller.borrow_mut() = starter;
        self.0.state.set(CoroState::Running);
        let boot_arg = self.bootstrap_arg(arg);
        do_switch(self, boot_arg)
    }

    /// Symmetric switch into an already-started coroutine. Requires
    /// `self.state() == Running`.
    pub fn transfer(&self, arg: i64) -> i64 {
        kernel_assert!(
            self.state() == CoroState::Running,
            "transfer: target coroutine is not running"
        );
        do_switch(self, arg)
    }

    /// `transfer(current.caller, arg)`.
    pub fn yield_now(arg: i64) -> i64 {
        let current = Coro::current().expect("yield_now called with no current coroutine");
        let caller = current
            .caller()
            .expect("yield_now: current coroutine has no caller");
        do_switch(&caller, arg)
    }

    /// `transfer(cp, arg)`, asserting `cp` isn't already current.
    pub fn resume(&self, arg: i64) -> i64 {
        kernel_assert!(
            Coro::current().as_ref() != Some(self),
            "resume: target is already the current coroutine"
        );
        self.transfer(arg)
    }

    /// Legal only for the currently running, non-main coroutine. Marks
    /// `Finished`, stores `retval`, transfers to `parent`. Never returns.
    pub fn exit(retval: i64) -> ! {
        exit_current(retval)
    }

    /// If `self` is current, behaves like `exit`. Otherwise marks
    /// `Finished` without switching; its stack is reclaimed at `destroy`.
    pub fn stop(&self, retval: i64) {
        if Coro::current().as_ref() == Some(self) {
            exit_current(retval);
        } else {
            self.0.exit_value.set(retval);
            self.0.state.set(CoroState::Finished);
        }
    }

    /// Requires `self` is `Finished` and not main. Reallocates the stack
    /// and rewinds the coroutine to `Created`, so `start` can be called
    /// again on the same handle — a restart, not a fresh object.
    pub fn reset(&self, stack_size: usize) {
        kernel_assert!(
            self.state() == CoroState::Finished,
            "reset: coroutine must be Finished before it can restart"
        );
        kernel_assert!(!self.is_main(), "reset: cannot reset the main coroutine");
        let stack = ProtectedFixedSizeStack::new(stack_size)
            .expect("failed to allocate a guarded coroutine stack");
        let context = unsafe { Context::new(&stack, trampoline) };
        *self.0.stack.borrow_mut() = Some(stack);
        *self.0.saved.borrow_mut() = Some(context);
        *self.0.parent.borrow_mut() = None;
        *self.0.caller.borrow_mut() = None;
        self.0.exit_value.set(0);
        self.0.state.set(CoroState::Created);
    }

    /// Requires `self` is neither current nor main. Frees the stack.
    pub fn destroy(self) {
        kernel_assert!(
            Coro::current().as_ref() != Some(&self),
            "destroy: cannot destroy the running coroutine"
        );
        kernel_assert!(!self.is_main(), "destroy: cannot destroy the main coroutine");
        self.0.stack.borrow_mut().take();
        self.0.saved.borrow_mut().take();
    }
}

fn ensure_main() {
    MAIN.with(|m| {
        if m.borrow().is_some() {
            return;
        }
        let main = Coro(Rc::new(Inner {
            stack: RefCell::new(None),
            saved: RefCell::new(None),
            state: Cell::new(CoroState::Running),
            exit_value: Cell::new(0),
            parent: RefCell::new(None),
            caller: RefCell::new(None),
            name: RefCell::new("main".to_string()),
            entry: RefCell::new(None),
        }));
        *m.borrow_mut() = Some(main.clone());
        CURRENT.with(|c| {
            let mut c = c.borrow_mut();
            if c.is_none() {
                *c = Some(main);
            }
        });
    });
}

fn set_current(c: Coro) {
    CURRENT.with(|cell| *cell.borrow_mut() = Some(c));
}

/// The single primitive underlying `start`/`transfer`/`yield_now`/
/// `resume`: sets `to.caller`, makes `to` current, switches into its
/// saved context, and on return stashes the freshly received context as
/// `to`'s new suspension point.
fn do_switch(to: &Coro, arg: i64) -> i64 {
    let from = Coro::current();
    *to.0.caller.borrow_mut() = from;
    set_current(to.clone());

    let ctx = to
        .0
        .saved
        .borrow_mut()
        .take()
        .expect("do_switch: target coroutine is not suspended anywhere");
    let Transfer { context, data } = ctx.resume(arg as usize);
    *to.0.saved.borrow_mut() = Some(context);
    data as i64
}

fn exit_current(retval: i64) -> ! {
    let me = Coro::current().expect("exit called with no current coroutine");
    kernel_assert!(!me.is_main(), "exit: the main coroutine cannot exit");
    me.0.exit_value.set(retval);
    me.0.state.set(CoroState::Finished);

    let parent = me.parent().expect("exiting coroutine has no parent");
    set_current(parent.clone());
    let ctx = parent
        .0
        .saved
        .borrow_mut()
        .take()
        .expect("exit_current: parent is not suspended");
    // This switch never returns to us: our stack is done and will be
    // reclaimed whenever the owner calls `destroy`.
    let _ = ctx.resume(retval as usize);
    unreachable!("a finished coroutine's stack was resumed");
}

extern "C" fn trampoline(t: Transfer) -> ! {
    let boot = unsafe { Box::from_raw(t.data as *mut Boot) };
    let Boot { coro, arg } = *boot;

    if let Some(caller) = coro.caller() {
        *caller.0.saved.borrow_mut() = Some(t.context);
    }
    set_current(coro.clone());

    let entry = coro
        .0
        .entry
        .borrow_mut()
        .take()
        .expect("trampoline: coroutine started with no entry function");
    let ret = entry(coro, arg);
    exit_current(ret)
}

impl Coro {
    /// Packages the bootstrap payload and performs the very first
    /// transfer into a freshly created coroutine. Called internally by
    /// `start` via `do_switch`, except `do_switch`'s plain `arg` doesn't
    /// carry the `Coro` handle the trampoline needs on its first entry —
    /// so `start` boxes a `Boot` and pokes it through as `arg` instead.
    fn bootstrap_arg(&self, arg: i64) -> i64 {
        let boxed = Box::new(Boot {
            coro: self.clone(),
            arg,
        });
        Box::into_raw(boxed) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc as StdRc;

    #[test]
    fn start_and_yield_roundtrip() {
        let log = StdRc::new(StdRefCell::new(Vec::new()));
        let coro = Coro::create(DEFAULT_STACK_SIZE);
        coro.set_name("worker");

        let log2 = log.clone();
        let ret = coro.start(
            move |_self, arg| {
                log2.borrow_mut().push(("entered", arg));
                let back = Coro::yield_now(100);
                log2.borrow_mut().push(("resumed", back));
                200
            },
            1,
        );
        assert_eq!(ret, 100);
        assert_eq!(log.borrow().as_slice(), &[("entered", 1)]);

        let ret2 = coro.resume(7);
        assert_eq!(ret2, 200);
        assert!(coro.is_finished());
        assert_eq!(
            log.borrow().as_slice(),
            &[("entered", 1), ("resumed", 7)]
        );
    }

    #[test]
    fn exit_returns_to_parent_not_last_caller() {
        let coro = Coro::create(DEFAULT_STACK_SIZE);
        let ret = coro.start(|_self, arg| arg * 2, 21);
        assert_eq!(ret, 42);
        assert!(coro.is_finished());
        assert_eq!(coro.exit_value(), 42);
    }

    #[test]
    fn reset_allows_restart() {
        let coro = Coro::create(DEFAULT_STACK_SIZE);
        let ret = coro.start(|_self, arg| arg + 1, 1);
        assert_eq!(ret, 2);
        assert!(coro.is_finished());

        coro.reset(DEFAULT_STACK_SIZE);
        assert_eq!(coro.state(), CoroState::Created);
        let ret2 = coro.start(|_self, arg| arg * 10, 3);
        assert_eq!(ret2, 30);
        assert!(coro.is_finished());
    }

    #[test]
    fn name_is_truncated() {
        let coro = Coro::create(DEFAULT_STACK_SIZE);
        coro.set_name(&"x".repeat(200));
        assert_eq!(coro.name().len(), MAX_NAME_LEN);
    }
}
