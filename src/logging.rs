use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "BIRTHDAYS_LOG";
pub const DEFAULT_FILTER: &str = "birthdays=info,sqlx=warn";

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// JSON logs on stderr. Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(DEFAULT_FILTER))
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Warnings on stderr plus a daily-rolling JSON file under `log_dir` filtered by
/// `filter`. Keep the returned guard alive for as long as records should reach
/// the file.
pub fn init_with_file(log_dir: &Path, filter: &str) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("create log directory {}", log_dir.display()))?;
    let appender = tracing_appender::rolling::daily(log_dir, "birthdays.log");
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    // `try_init` also installs the `log` bridge.
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::io::stderr)
                .with_filter(LevelFilter::WARN),
        )
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(EnvFilter::new(filter)),
        )
        .try_init()
        .context("install tracing subscriber")?;

    tracing::info!(target: "birthdays", event = "logging_ready", dir = %log_dir.display());
    Ok(guard)
}
