use chrono::Local;
use colored::*;
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

struct LocalTimeLogger {
    max_level: LevelFilter,
}

impl log::Log for LocalTimeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = Local::now().format("%Y-%m-%d %H:%M:%S");
            let level = record.level();

            let colored_level = match level {
                Level::Error => level.to_string().red(),
                Level::Warn => level.to_string().yellow(),
                Level::Info => level.to_string().cyan(),
                Level::Debug => level.to_string().purple(),
                Level::Trace => level.to_string().normal(),
            };

            println!(
                "{} [{}] {} - {}",
                now,
                colored_level,
                record.target().dimmed(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

/// Console logger with local-time prefixes. `LOG_LEVEL=debug` widens the
/// default info-level output.
pub fn init_logger() -> Result<(), SetLoggerError> {
    let max_level = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    log::set_boxed_logger(Box::new(LocalTimeLogger { max_level }))
        .map(|()| log::set_max_level(max_level))
}
