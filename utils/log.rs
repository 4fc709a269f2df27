//! Console logger for Bcmvisor
//!
//! Implements the `log` facade on top of a console sink registered by the
//! platform. Verbosity is fixed at build time by the `debug` and `verbose`
//! features.

use ::core::fmt;

use log::{LevelFilter, Log, Metadata, Record};

use crate::core::sync::SpinLock;
use crate::{Error, Result};

/// Console output function: receives one fully formatted line
pub type ConsoleSink = fn(fmt::Arguments<'_>);

/// Get the compile-time log level
pub const fn level() -> LevelFilter {
    if cfg!(all(feature = "debug", feature = "verbose")) {
        LevelFilter::Trace
    } else if cfg!(feature = "debug") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// The hypervisor logger
pub struct HypLogger {
    sink: SpinLock<Option<ConsoleSink>>,
}

impl HypLogger {
    /// Create a logger with no sink attached
    pub const fn new() -> Self {
        Self {
            sink: SpinLock::new(None),
        }
    }

    /// Attach the console sink
    pub fn set_sink(&self, sink: ConsoleSink) {
        *self.sink.lock() = Some(sink);
    }

    fn sink(&self) -> Option<ConsoleSink> {
        *self.sink.lock()
    }
}

impl Log for HypLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if let Some(sink) = self.sink() {
            // Format: [LEVEL] target: message
            sink(format_args!(
                "[{:5}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            ));
        }
    }

    fn flush(&self) {}
}

static LOGGER: HypLogger = HypLogger::new();

/// Install the logger with `sink` as console output
///
/// Fails with [`Error::ResourceBusy`] when another logger already owns the
/// `log` facade; the sink is still attached so a later re-init is harmless.
pub fn init(sink: ConsoleSink) -> Result<()> {
    LOGGER.set_sink(sink);
    log::set_logger(&LOGGER).map_err(|_| Error::ResourceBusy)?;
    log::set_max_level(level());
    Ok(())
}
