//! Tracing subscriber setup
//!
//! `RUST_LOG` wins over the configured level. With a log directory set,
//! events also go to a daily-rolling file through a non-blocking writer; keep
//! the returned guard alive until shutdown so buffered lines are flushed.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::core::{FrameworkError, FrameworkResult};

/// File name prefix for rolled log files
pub const LOG_FILE_PREFIX: &str = "slosh-kernel.log";

/// Filter from `RUST_LOG`, falling back to `level`
pub fn build_filter(level: &str) -> FrameworkResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| FrameworkError::invalid_config(format!("log level '{}': {}", level, e)))
}

/// Install the global subscriber
pub fn init_logging(config: &LoggingConfig) -> FrameworkResult<Option<WorkerGuard>> {
    let filter = build_filter(&config.level)?;

    let console = if config.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .boxed()
    };

    let (file, guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = if config.json {
                fmt::layer().json().with_writer(writer).boxed()
            } else {
                fmt::layer().with_ansi(false).with_writer(writer).boxed()
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| FrameworkError::invalid_config(format!("logging already initialised: {}", e)))?;

    tracing::debug!("[Logging] Initialised at level {}", config.level);
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(build_filter("info,slosh_kernel=debug").is_ok());
        let err = build_filter("slosh_kernel=loud").unwrap_err();
        assert!(matches!(err, FrameworkError::InvalidConfig(_)));
    }
}
