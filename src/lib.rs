//! Cimba — a process-interaction discrete-event simulation kernel.
//!
//! A user writes *processes*: ordinary functions that run on their own
//! stackful coroutine, advance through simulated time with [`Process::hold`],
//! and block on shared [resources](resource) via a demand predicate. The
//! kernel orders and dispatches everything on one single-threaded,
//! cooperative event queue per trial.
//!
//! ```text
//! heap       — component A: the indexed priority queue backing both
//!              the event queue and every resource guard's wait queue.
//! coroutine  — component B: asymmetric stackful coroutines.
//! event      — component C: the event queue and simulated clock.
//! process    — component D: named, prioritized coroutines with
//!              hold/interrupt/wait primitives.
//! guard      — component E: a resource's priority-ordered wait queue,
//!              driven by a demand predicate.
//! resource   — component F: Resource/Store/Buffer/ObjectQueue/Condition,
//!              each built on one or more guards.
//! ```
//!
//! Everything outside the kernel — statistics, numeric distributions,
//! the PRNG, the experiment driver that spawns one worker thread per
//! trial — is an external collaborator the host application supplies;
//! see [`thread_state`] for the per-trial lifecycle hooks it calls, and
//! [`logging`] for the one textual log format this crate reproduces for
//! compatibility.
//!
//! All state here is thread-local: a trial is one thread, with its own
//! clock, event queue, coroutine set and process registry. There are no
//! locks inside a trial because there is no data race — only one
//! coroutine ever runs at a time (§5).

#[macro_use]
mod assert;

pub mod coroutine;
pub mod event;
pub mod guard;
pub mod handle;
pub mod heap;
pub mod logging;
pub mod process;
pub mod resource;
pub mod signal;
pub mod thread_state;

pub use coroutine::Coro;
pub use guard::Guard;
pub use handle::Handle;
pub use process::Process;
pub use signal::Signal;
