//! Tracing subscriber setup for the runner.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;

pub const LOG_FILE_PREFIX: &str = "malpkg-harvest.log";

/// Harvester crates at `info`; HTTP and TLS internals only when they warn.
pub const DEFAULT_FILTER: &str = "warn,malpkg_harvester=info,malpkg_harvest=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. `RUST_LOG` replaces [`DEFAULT_FILTER`].
///
/// With `log_to_file` set, output goes to daily files under `log_dir` and
/// the returned guard must live until exit so buffered lines get flushed.
/// If `log_dir` cannot be created the runner logs to stdout instead.
pub fn init_logging(config: &Config) -> Option<WorkerGuard> {
    if config.log_to_file {
        if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
            init_stdout();
            tracing::warn!(log_dir = %config.log_dir.display(), error = %e, "Cannot create log directory, logging to stdout");
            return None;
        }
        Some(init_file(&config.log_dir))
    } else {
        init_stdout();
        None
    }
}

fn init_file(log_dir: &Path) -> WorkerGuard {
    let file_appender = rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    guard
}

fn init_stdout() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(false))
        .init();
}
