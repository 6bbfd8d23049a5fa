//! Tracing subscriber setup

use anyhow::{anyhow, Result};
use tracing_subscriber::filter::EnvFilter;

use crate::config::LoggingConfig;

/// `RUST_LOG` wins over the configured level
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow!("invalid log level '{}': {e}", config.level))
}

pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.with_level(true).compact().try_init()
    };
    installed.map_err(|e| anyhow!("logging already initialized: {e}"))
}
