/*
 * Serial-backed `log` implementation
 *
 * Installed first in the boot sequence, before anything else that might
 * want to report its own progress, so that a capture of COM1 is a complete
 * account of the boot.
 */

use core::fmt::Write;
use log::{Level, LevelFilter, Log, Metadata, Record};

struct SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Trace
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let mut port = crate::drivers::serial::COM1.lock();
            let _ = writeln!(port, "[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Installs the global logger. Must run exactly once, before `thread_init`.
pub fn init(level: LevelFilter) {
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(level))
        .expect("logger already initialized");
}
