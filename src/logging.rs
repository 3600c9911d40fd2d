//! §1 calls the pseudo-random generator, statistics and "per-thread
//! experiment driver" external collaborators; logging is the one piece
//! among them §6 pins down a textual format for, so the core ships one
//! `log::Log` backend that reproduces it exactly:
//!
//! ```text
//! [trial_index] [seed] <time> <process_name> <func>(<line>): [<Level>] <msg>
//! ```
//!
//! `trial_index` is omitted for a single-trial run; `seed` appears only
//! at `Warn` and above. This is opt-in — `TrialLogger` is just one
//! `log::Log` implementation among any the host application might
//! install; the kernel itself only ever calls the `log` facade macros
//! and never assumes a particular backend is active.

use std::cell::Cell;
use std::io::Write;

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::event;
use crate::process::Process;

thread_local! {
    static TRIAL_INDEX: Cell<Option<u64>> = const { Cell::new(None) };
    static SEED: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Tags every subsequent log line on this thread with a trial index.
/// `None` (the default) omits the `[trial_index]` field, the
/// single-trial case §6 calls out.
pub fn set_trial_index(index: Option<u64>) {
    TRIAL_INDEX.with(|c| c.set(index));
}

pub fn trial_index() -> Option<u64> {
    TRIAL_INDEX.with(|c| c.get())
}

/// Records the PRNG seed for this thread's trial, emitted on `Warn`-
/// and-above lines so a failure is reproducible.
pub fn set_seed(seed: Option<u64>) {
    SEED.with(|c| c.set(seed));
}

pub fn seed() -> Option<u64> {
    SEED.with(|c| c.get())
}

/// A `log::Log` backend that writes the `[trial] [seed] <time>
/// <process>  <func>(<line>): [<Level>] <msg>` line shape to a sink.
/// Stdout/stderr are the common choices; tests typically use a buffer
/// to assert on the rendered line instead.
pub struct TrialLogger<W> {
    level: LevelFilter,
    sink: std::sync::Mutex<W>,
}

impl<W: Write + Send> TrialLogger<W> {
    pub fn new(level: LevelFilter, sink: W) -> TrialLogger<W> {
        TrialLogger {
            level,
            sink: std::sync::Mutex::new(sink),
        }
    }
}

impl<W: Write + Send> Log for TrialLogger<W> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(record);
        if let Ok(mut sink) = self.sink.lock() {
            let _ = writeln!(sink, "{line}");
        }
    }

    fn flush(&self) {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = sink.flush();
        }
    }
}

fn format_line(record: &Record) -> String {
    let mut out = String::new();
    if let Some(idx) = trial_index() {
        out.push_str(&format!("[{idx}] "));
    }
    if record.level() <= Level::Warn {
        if let Some(s) = seed() {
            out.push_str(&format!("[{s}] "));
        }
    }
    let time = event::try_now().unwrap_or(0.0);
    let process_name = Process::get_current()
        .map(|p| p.name())
        .unwrap_or_else(|| "-".to_string());
    let func = record.target();
    let line_no = record.line().unwrap_or(0);
    out.push_str(&format!(
        "{time} {process_name} {func}({line_no}): [{}] {}",
        record.level(),
        record.args()
    ));
    out
}

/// Installs a `TrialLogger` writing to stderr as the global `log`
/// backend for the whole process. Like any `log::set_boxed_logger`
/// call, this may only succeed once per process; a driver that wants
/// per-trial control over `trial_index`/`seed` should call
/// `set_trial_index`/`set_seed` per-thread instead of reinstalling the
/// logger.
pub fn init(level: LevelFilter) {
    let logger = TrialLogger::new(level, std::io::stderr());
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct VecSink(Arc<Mutex<Vec<u8>>>);

    impl Write for VecSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn omits_trial_index_when_unset_and_seed_below_warn() {
        set_trial_index(None);
        set_seed(Some(42));
        let buf = Arc::new(Mutex::new(Vec::new()));
        let logger = TrialLogger::new(LevelFilter::Trace, VecSink(buf.clone()));

        let record = Record::builder()
            .args(format_args!("hello"))
            .level(Level::Info)
            .target("my_module")
            .line(Some(7))
            .build();
        logger.log(&record);

        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(!text.contains('['), "info line should carry no [trial]/[seed] prefix: {text}");
        assert!(text.contains("my_module(7): [INFO] hello"));
        set_seed(None);
    }

    #[test]
    fn includes_trial_index_and_seed_at_warn() {
        set_trial_index(Some(3));
        set_seed(Some(99));
        let buf = Arc::new(Mutex::new(Vec::new()));
        let logger = TrialLogger::new(LevelFilter::Trace, VecSink(buf.clone()));

        let record = Record::builder()
            .args(format_args!("uh oh"))
            .level(Level::Warn)
            .target("m")
            .line(Some(1))
            .build();
        logger.log(&record);

        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(text.starts_with("[3] [99] "));
        set_trial_index(None);
        set_seed(None);
    }
}
