//! Logging setup.
//!
//! Logs go to stderr so that command results on stdout stay machine
//! readable.

use crate::config::LogConfig;
use crate::error::{CtlError, Result};
use ::tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = build_filter(&config.level)?;
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| CtlError::Config(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
            .map_err(|e| CtlError::Config(format!("Failed to init logging: {}", e)))?;
    }

    debug!(level = %config.level, json = config.json, "Logging initialized");
    Ok(())
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| CtlError::Config(format!("invalid log level {:?}: {}", level, e))),
    }
}
