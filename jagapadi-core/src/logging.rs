//! Tracing setup for the client.
//!
//! Events go to one file per day in `$XDG_STATE_HOME/jagapadi/`, named
//! `jagapadi.YYYY-MM-DD.log` after the UTC date (tracing-appender rotates on
//! UTC midnight). `RUST_LOG` overrides the configured level.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};

const FILE_PREFIX: &str = "jagapadi";
const FILE_SUFFIX: &str = "log";

/// Daily files kept before the oldest is deleted.
const RETAINED_FILES: usize = 14;

/// Flushes buffered file output when dropped; hold it for the life of the process.
pub struct LoggingGuard {
    _file: WorkerGuard,
}

/// Install the global subscriber.
///
/// With `echo_warnings`, warnings and errors are also written to stderr so a
/// command-line user sees failures the core only logs (e.g. history that
/// could not be saved).
pub fn init(config: &LoggingConfig, echo_warnings: bool) -> Result<LoggingGuard> {
    let dir = log_dir();
    std::fs::create_dir_all(&dir)?;

    let (writer, guard) = tracing_appender::non_blocking(file_appender(&dir)?);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    let stderr_layer = echo_warnings.then(|| {
        fmt::layer()
            .compact()
            .without_time()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(LevelFilter::WARN)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install logger: {}", e)))?;

    tracing::info!(file = %current_log_file().display(), level = %config.level, "Logging to file");
    Ok(LoggingGuard { _file: guard })
}

/// Test subscriber writing through the test harness; safe to call repeatedly.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Directory holding the daily log files.
pub fn log_dir() -> PathBuf {
    Config::state_dir()
}

/// Name of the log file written on `date` (UTC).
pub fn log_file_name(date: NaiveDate) -> String {
    format!("{}.{}.{}", FILE_PREFIX, date.format("%Y-%m-%d"), FILE_SUFFIX)
}

/// The file receiving today's events.
pub fn current_log_file() -> PathBuf {
    log_dir().join(log_file_name(Utc::now().date_naive()))
}

fn file_appender(dir: &Path) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(FILE_PREFIX)
        .filename_suffix(FILE_SUFFIX)
        .max_log_files(RETAINED_FILES)
        .build(dir)
        .map_err(|e| Error::Config(format!("failed to open log file in {:?}: {}", dir, e)))
}
