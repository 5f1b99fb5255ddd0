//! Structured logging init: `tracing` + `tracing-subscriber` for formatted
//! console output, `tracing-appender` for a non-blocking rolling log file.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber with a rolling daily file
/// appender under `<data_root>/logs/sharkoder.log`, plus an `EnvFilter`
/// driven stderr layer for interactive runs.
///
/// The returned [`WorkerGuard`] must be kept alive for the process lifetime
/// (dropping it stops the background log-flush thread).
pub fn init(log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "sharkoder.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    Ok(guard)
}
