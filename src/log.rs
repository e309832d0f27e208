use log::{Record, Level, Metadata, LevelFilter, SetLoggerError};

/// Cible utilisée par toutes les macros de log du crate.
pub const TARGET: &str = "cddio_tickets";

#[macro_use]
pub mod macros {
    #[doc(alias = "log::error")]
    #[macro_export]
    macro_rules! log_error {
        ($($arg:tt)*) => {
            log::error!(target: $crate::log::TARGET, $($arg)*)
        };
    }
    #[doc(alias = "log::warn")]
    #[macro_export]
    macro_rules! log_warn {
        ($($arg:tt)*) => {
            log::warn!(target: $crate::log::TARGET, $($arg)*)
        };
    }
    #[doc(alias = "log::info")]
    #[macro_export]
    macro_rules! log_info {
        ($($arg:tt)*) => {
            log::info!(target: $crate::log::TARGET, $($arg)*)
        };
    }
    #[doc(alias = "log::debug")]
    #[macro_export]
    macro_rules! log_debug {
        ($($arg:tt)*) => {
            log::debug!(target: $crate::log::TARGET, $($arg)*)
        };
    }
}

struct SimpleLogger {
    level: Level,
}

impl log::Log for SimpleLogger {
    #[inline]
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) && record.target() == TARGET {
            println!("[{}] {}", record.level(), record.args());
        }
    }
    #[inline]
    fn flush(&self) {}
}

static LOGGER: SimpleLogger = SimpleLogger {
    level: if cfg!(debug_assertions) { Level::Debug } else { Level::Info },
};

pub fn init() -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)
        .map(|_| log::set_max_level( if cfg!(debug_assertions) {LevelFilter::Debug} else {LevelFilter::Info} ))
}
