//! Logging setup.
//!
//! Installs a tracing subscriber with two outputs: compact lines on stderr
//! and a daily-rolling file under the configured log directory. `RUST_LOG`
//! overrides the configured level; `verbose` forces `debug`.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use time::macros::format_description;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Prefix of the rolling log files.
pub const LOG_FILE_PREFIX: &str = "modsync.log";

/// Errors from [`init_logging`].
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log directory could not be created.
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The level string is not a valid filter.
    #[error("invalid log filter '{0}'")]
    InvalidFilter(String),

    /// A global subscriber is already installed.
    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Keeps the background log writer alive. Drop it last.
#[must_use = "logs are lost when the guard is dropped"]
pub struct LoggingGuard {
    _file: WorkerGuard,
}

/// Build the filter from `RUST_LOG`, the verbose flag or `default_level`.
pub fn build_filter(default_level: &str, verbose: bool) -> Result<EnvFilter, LoggingError> {
    if verbose {
        return Ok(EnvFilter::new("debug"));
    }
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_level)
            .map_err(|_| LoggingError::InvalidFilter(default_level.to_string())),
    }
}

/// Install the global subscriber.
pub fn init_logging(
    log_dir: &Path,
    default_level: &str,
    verbose: bool,
) -> Result<LoggingGuard, LoggingError> {
    std::fs::create_dir_all(log_dir).map_err(|e| LoggingError::CreateDir {
        path: log_dir.to_path_buf(),
        source: e,
    })?;

    let filter = build_filter(default_level, verbose)?;

    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = OffsetTime::new(
        offset,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"),
    );

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_timer(timer.clone())
                .compact(),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(timer)
                .compact(),
        )
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(LoggingGuard { _file: guard })
}
