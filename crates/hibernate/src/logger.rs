//! TEAM_430: Logger for the hibernation subsystem.
//!
//! Implements `log::Log` on top of whatever line sink the kernel provides
//! (usually the serial console). Supports a runtime level filter and muting
//! noisy targets by prefix.

use core::fmt;

use log::{LevelFilter, Metadata, Record, SetLoggerError};

/// Destination for formatted log lines.
pub trait LogSink: Send + Sync {
    fn write_line(&self, args: fmt::Arguments<'_>);
}

/// `log::Log` implementation writing to a [`LogSink`].
pub struct SinkLogger<S: LogSink> {
    sink: S,
    max_level: LevelFilter,
    muted: &'static [&'static str],
}

impl<S: LogSink> SinkLogger<S> {
    pub const fn new(sink: S, max_level: LevelFilter) -> Self {
        Self {
            sink,
            max_level,
            muted: &[],
        }
    }

    /// Drop records whose target starts with any of `prefixes`.
    #[must_use]
    pub fn muting(mut self, prefixes: &'static [&'static str]) -> Self {
        self.muted = prefixes;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: LogSink> log::Log for SinkLogger<S> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
            && !self
                .muted
                .iter()
                .any(|prefix| metadata.target().starts_with(prefix))
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            // Subsystem prefixes are part of the message already.
            self.sink.write_line(*record.args());
        }
    }

    fn flush(&self) {}
}

/// Install `logger` as the global logger.
///
/// Fails if a logger is already installed.
pub fn init<S: LogSink + 'static>(logger: &'static SinkLogger<S>) -> Result<(), SetLoggerError> {
    log::set_logger(logger)?;
    log::set_max_level(logger.max_level);
    Ok(())
}
