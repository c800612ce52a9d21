//! Stderr logger
//!
//! Stdout may carry the protocol itself, so log records only ever go to
//! stderr.

use crate::config::DaemonError;
use log::{LevelFilter, Log, Metadata, Record};
use std::io::{self, Write};

/// Writes each record as one line on stderr
pub struct StderrLogger {
    level: LevelFilter,
}

impl StderrLogger {
    pub fn new(level: LevelFilter) -> Self {
        Self { level }
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut stderr = io::stderr().lock();
        // Nowhere left to report a failed log write.
        let _ = writeln!(
            stderr,
            "[{:<5} {}] {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

/// Installs the stderr logger as the global logger
pub fn init(level: LevelFilter) -> Result<(), DaemonError> {
    log::set_boxed_logger(Box::new(StderrLogger::new(level)))
        .map_err(|e| DaemonError::Logger(e.to_string()))?;
    log::set_max_level(level);
    Ok(())
}
