//! Contract-violation checks.
//!
//! Two tiers: `kernel_assert!` guards *preconditions* — invalid handle,
//! negative duration, double-initialize, scheduling in the past, calling
//! process-only APIs from the dispatcher, stack exhaustion. It runs in
//! release builds by default and is compiled out only under the
//! `hardened` feature. Ordinary `debug_assert!` covers *postconditions*
//! and internal invariants and is left to compile out of `--release` the
//! usual way, same as any ordinary `debug_assert!` call.

#[cfg(not(feature = "hardened"))]
#[macro_export]
macro_rules! kernel_assert {
    ($cond:expr) => {
        assert!($cond)
    };
    ($cond:expr, $($arg:tt)+) => {
        assert!($cond, $($arg)+)
    };
}

#[cfg(feature = "hardened")]
#[macro_export]
macro_rules! kernel_assert {
    ($cond:expr) => {{
        let _ = &$cond;
    }};
    ($cond:expr, $($arg:tt)+) => {{
        let _ = &$cond;
    }};
}

#[cfg(not(feature = "hardened"))]
#[macro_export]
macro_rules! kernel_assert_eq {
    ($a:expr, $b:expr) => {
        assert_eq!($a, $b)
    };
    ($a:expr, $b:expr, $($arg:tt)+) => {
        assert_eq!($a, $b, $($arg)+)
    };
}

#[cfg(feature = "hardened")]
#[macro_export]
macro_rules! kernel_assert_eq {
    ($a:expr, $b:expr) => {{
        let _ = (&$a, &$b);
    }};
    ($a:expr, $b:expr, $($arg:tt)+) => {{
        let _ = (&$a, &$b);
    }};
}
