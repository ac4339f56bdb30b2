//! File-based logger initialization, gated explicitly by [`crate::configuration::EngineConfig`]
//! rather than as a global side effect (§2a).

use std::fs::File;

use time::format_description::{self, parse};
use time::OffsetDateTime;
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

use crate::configuration::EngineConfig;

/// Initialize the global tracing subscriber according to `config`, if logging is
/// enabled. A no-op when `config` carries no log directory.
///
/// # Panics
///
/// Panics if the log file cannot be created or a global subscriber is already set.
pub fn init_logger(config: &EngineConfig) {
    let Some(log_dir) = &config.log_dir else {
        return;
    };

    let file_path = log_dir.join(get_log_file_name());
    let file = File::create(file_path).unwrap();
    let writer = BoxMakeWriter::new(file);
    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]").unwrap(),
    );

    let max_level = if config.verbose { Level::TRACE } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(max_level)
        .with_ansi(false)
        .with_timer(timer)
        .with_writer(writer)
        .finish();

    set_global_default(subscriber).expect(
        "Could not set global default tracing subscriber. Consider disabling logs if you are already setting a subscriber.",
    );
}

fn get_log_file_name() -> String {
    let format = parse("[year]-[month]-[day]_[hour]:[minute]:[second]_log.txt").unwrap();
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format).unwrap()
}
