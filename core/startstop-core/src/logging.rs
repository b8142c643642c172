//! Log file setup for the agent.
//!
//! The log lives next to the executable and is truncated once per process
//! start. Whether it existed before truncation is how the shell tells a
//! first run from later ones.
//!
//! Lines are written through a non-blocking appender, so the returned
//! [`LogSession`] must outlive every log call that should reach the file.

use crate::error::{Result, StartStopError};
use chrono::Local;
use std::env;
use std::fmt;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const DEBUG_ENV: &str = "VR_STARTSTOP_DEBUG_LOG";

/// `[YYYY-MM-DD HH:MM:SS.mmm]` in local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTimestamp;

impl FormatTime for LogTimestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "[{}]", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// A truncated, ready-to-append log file.
#[derive(Debug)]
pub struct PreparedLog {
    pub first_run: bool,
    file: fs_err::File,
}

/// Checks whether the log exists, then truncates (or creates) it.
pub fn prepare_log_file(path: &Path) -> Result<PreparedLog> {
    let log_error = |source| StartStopError::LogFile {
        path: path.to_path_buf(),
        source,
    };

    let first_run = !path.exists();
    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent).map_err(log_error)?;
    }
    fs_err::write(path, b"").map_err(log_error)?;
    let file = fs_err::OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(log_error)?;

    Ok(PreparedLog { first_run, file })
}

/// Keeps the file writer alive; drop it last.
pub struct LogSession {
    pub first_run: bool,
    _guard: WorkerGuard,
}

/// Installs the global subscriber: the log file plus an env-filtered stderr
/// layer.
pub fn init(log: PreparedLog) -> Result<LogSession> {
    let (writer, guard) = tracing_appender::non_blocking(log.file);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_timer(LogTimestamp)
        .with_ansi(false)
        .with_level(false)
        .with_target(false)
        .with_filter(EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LogTimestamp)
        .with_target(false)
        .with_filter(stderr_filter());

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|_| StartStopError::LoggingInitialized)?;

    Ok(LogSession {
        first_run: log.first_run,
        _guard: guard,
    })
}

fn stderr_filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}
