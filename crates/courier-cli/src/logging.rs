//! Log setup. stdout carries the protocol, so nothing is ever logged there.

use anyhow::Result;
use courier_core::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

const LOG_FILE_PREFIX: &str = "courier.log";

/// Installs the global subscriber.
///
/// Logs always go to stderr. When `config.directory` is set they are also
/// written to a daily rolling file there; keep the returned guard alive so
/// the file writer drains on exit.
pub fn init(config: &LoggingConfig, level: Option<&str>) -> Result<Option<WorkerGuard>> {
    let level = level.unwrap_or(&config.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);

    let (file, guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init()?;
    Ok(guard)
}
