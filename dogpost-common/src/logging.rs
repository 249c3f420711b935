//! Tracing subscriber initialisation
//!
//! `RUST_LOG` overrides the configured level when set.

use crate::config::LoggingConfig;
use crate::{Error, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber described by `config`
///
/// Logs go to stderr unless `config.file` is set, in which case they are
/// appended to that file without ANSI colouring.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", config.level, e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    result.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {}", e)))
}
