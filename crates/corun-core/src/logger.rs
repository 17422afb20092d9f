//! Leveled stderr backend for the `log` facade
//!
//! Thread-safe, optionally-flushing output in the style of a kernel printk.
//! Lines emitted from a processor thread carry that processor's index.
//!
//! # Environment Variables
//!
//! - `CORUN_LOG_LEVEL=<level>` - off, error, warn, info, debug, trace (or 0..5)
//! - `CORUN_FLUSH_EPRINT=1` - Flush stderr after each line (useful when chasing crashes)
//!
//! # Usage
//!
//! ```ignore
//! corun_core::logger::init();
//! log::info!("processor {} started", idx);
//! ```
//!
//! Output looks like `[INFO]  [p2] processor 2 started`.

use crate::env::env_get_bool;

use log::{LevelFilter, Log, Metadata, Record};
use std::cell::Cell;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static LOGGER: StderrLogger = StderrLogger {
    flush: AtomicBool::new(false),
};
static INIT: Once = Once::new();

thread_local! {
    static PROCESSOR: Cell<Option<usize>> = const { Cell::new(None) };
}

struct StderrLogger {
    flush: AtomicBool,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        let _ = write!(handle, "{} ", prefix(record.level()));
        if let Some(idx) = current_processor() {
            let _ = write!(handle, "[p{}] ", idx);
        }
        let _ = handle.write_fmt(*record.args());
        let _ = handle.write_all(b"\n");
        if self.flush.load(Ordering::Relaxed) {
            let _ = handle.flush();
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn prefix(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "[ERROR]",
        log::Level::Warn => "[WARN] ",
        log::Level::Info => "[INFO] ",
        log::Level::Debug => "[DEBUG]",
        log::Level::Trace => "[TRACE]",
    }
}

/// Parse a level name or number; unknown values fall back to `Info`
pub fn parse_level(val: &str) -> LevelFilter {
    match val.trim().to_lowercase().as_str() {
        "off" | "0" => LevelFilter::Off,
        "error" | "1" => LevelFilter::Error,
        "warn" | "2" => LevelFilter::Warn,
        "info" | "3" => LevelFilter::Info,
        "debug" | "4" => LevelFilter::Debug,
        "trace" | "5" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Install the stderr logger and read the level from the environment.
///
/// Idempotent. If another logger is already installed it is left alone.
pub fn init() {
    INIT.call_once(|| {
        LOGGER
            .flush
            .store(env_get_bool("CORUN_FLUSH_EPRINT", false), Ordering::Relaxed);
        let level = std::env::var("CORUN_LOG_LEVEL")
            .map(|v| parse_level(&v))
            .unwrap_or(LevelFilter::Info);
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(level);
        }
    });
}

/// Override the level after `init()`
pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
}

/// Override the flush mode after `init()`
pub fn set_flush_enabled(enabled: bool) {
    LOGGER.flush.store(enabled, Ordering::Relaxed);
}

/// Tag log lines from this thread with a processor index
pub fn set_processor_context(idx: usize) {
    PROCESSOR.with(|p| p.set(Some(idx)));
}

pub fn clear_processor_context() {
    PROCESSOR.with(|p| p.set(None));
}

/// Processor index of the calling thread, if it runs a processor
#[inline]
pub fn current_processor() -> Option<usize> {
    PROCESSOR.with(|p| p.get())
}
