//! The observable return values of blocking calls.
//!
//! A signal is never an error in the Rust sense: a process receiving a
//! nonzero signal out of a blocking call hasn't failed, it has learned
//! something. So this stays a plain integer, not an enum — the caller
//! owns the meaning of anything `>= 10`, and `STOPPED`/`PREEMPTED` are
//! themselves application-defined constants the host picks.

/// A signed 64-bit reason code returned from a blocking call. Zero means
/// normal completion; nonzero always means abnormal (cancelled,
/// interrupted, preempted, or an application-defined value).
pub type Signal = i64;

/// Wake happened for the expected reason.
pub const SUCCESS: Signal = 0;
/// Alias for `SUCCESS` used at `hold`/clock wake sites.
pub const NORMAL: Signal = 0;
/// Application-defined interrupt delivered via `Process::interrupt`.
pub const INTERRUPTED: Signal = 1;
/// The thing being waited on was cancelled before it fired.
pub const CANCELLED: Signal = 2;

/// `wait_process` target was finished by an external `Process::stop`
/// rather than running to completion. §6 leaves this value
/// application-defined; the kernel itself has to pick one to return it
/// from `wait_process`, so it reserves this slot below `USER_BASE`.
pub const STOPPED: Signal = 3;

/// A single-unit `Resource` was reassigned out from under its holder by
/// `Resource::preempt`. Same rationale as `STOPPED`: the kernel, not just
/// the application, needs one fixed value to deliver.
pub const PREEMPTED: Signal = 4;

/// Smallest value an application is free to assign its own meaning to.
pub const USER_BASE: Signal = 10;
