//! §9 "Global, thread-local state": the bundle of thread-local state a
//! trial owns — the event queue/clock (`event`), the current/main
//! coroutine pointers and the process registry (`coroutine`/`process`).
//! A PRNG and a logger mask are external collaborators per §1 and are
//! not reimplemented here; the driver wires its own into the `log`
//! facade the way any `log`-based crate expects.
//!
//! Lifecycle: `init_thread_state(start_time)` at the top of a trial,
//! `teardown_thread_state()` at the bottom. The experiment driver
//! (external, one worker thread per trial) is responsible for calling
//! both around each trial — nothing here spans threads.

use crate::event;
use crate::process;

/// Initializes this thread's event queue/clock and process runtime for
/// one trial. Must be paired with exactly one `teardown_thread_state`
/// before the thread is reused for another trial.
pub fn init_thread_state(start_time: f64) {
    event::initialize(start_time);
    process::reset_thread_state();
    log::trace!("thread_state: initialized at t={}", start_time);
}

/// Tears down this thread's event queue, releasing every pending event.
/// Process and coroutine state is dropped along with whatever held
/// `Rc`s to them; nothing here attempts to run outstanding processes to
/// completion first — that is what `event::execute()` is for, called
/// by the trial body before teardown.
pub fn teardown_thread_state() {
    event::terminate();
    log::trace!("thread_state: torn down");
}
