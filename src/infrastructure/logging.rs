//! Logging system configuration and initialization.
//!
//! Console output via `tracing-subscriber` with an `EnvFilter`, plus an
//! optional daily-rolled log file. The non-blocking writer guard must stay
//! alive for the process lifetime, so it is parked in a global.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::infrastructure::config::LoggingConfig;

lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

/// Resolve the log directory: configured value, or `<config dir>/logs`.
fn log_directory(config: &LoggingConfig) -> PathBuf {
    if config.file_dir.is_empty() {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("marketplace-harvester")
            .join("logs")
    } else {
        PathBuf::from(&config.file_dir)
    }
}

/// Initialize the global tracing subscriber from config.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("marketplace_harvester={}", config.level)));

    let mut layers = Vec::new();

    if config.json_format {
        layers.push(tracing_subscriber::fmt::layer().json().boxed());
    } else {
        layers.push(tracing_subscriber::fmt::layer().boxed());
    }

    if config.file_output {
        let dir = log_directory(config);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        let appender = rolling::daily(&dir, "harvester.log");
        let (writer, guard) = non_blocking(appender);
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow::anyhow!("log guard mutex poisoned"))?
            .push(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_directory_prefers_configured_path() {
        let config = LoggingConfig {
            file_dir: "/tmp/harvester-logs".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(log_directory(&config), PathBuf::from("/tmp/harvester-logs"));
    }
}
