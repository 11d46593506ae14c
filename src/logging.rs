use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    fs,
    path::Path,
    sync::OnceLock,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

const LOG_FILE_PREFIX: &str = "coin-flip.log";
const DEFAULT_FILTER: &str = "info";

// Dropping the guard stops the background writer, so it lives for the process.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Sends `tracing` output to a daily rolling file in `log_dir`. The terminal
/// belongs to the UI, so nothing is written to stdout or stderr.
pub fn init_file_logging(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir).wrap_err_with(|| {
        format!("Failed to create log directory {}", log_dir.display())
    })?;
    let appender = rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    if LOG_GUARD.set(guard).is_err() {
        return Err(eyre!("File logging already initialised"));
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| eyre!("Failed to install tracing subscriber: {e}"))
}
