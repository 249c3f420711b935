//! Configuration file discovery and layered value resolution
//!
//! Bootstrap configuration lives in a TOML file. Secrets and folder
//! identifiers may additionally be supplied through environment variables,
//! which take precedence over the file.
//!
//! Config file priority order:
//! 1. Command-line argument (highest priority)
//! 2. `DOGPOST_CONFIG` environment variable
//! 3. User config file (`~/.config/dogpost/config.toml` on Linux)
//! 4. System config file (`/etc/dogpost/config.toml`, Linux only)
//!
//! A missing config file is not fatal: a warning is logged and built-in
//! defaults are used.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "DOGPOST_CONFIG";

/// Directory name used under the platform config directory
const APP_DIR: &str = "dogpost";

/// Config file name inside [`APP_DIR`]
const CONFIG_FILE_NAME: &str = "config.toml";

/// Logging configuration (`[logging]` table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error or a full
    /// `EnvFilter` directive such as `dogpost_publisher=debug`)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where a resolved configuration value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Process environment
    Environment,
    /// TOML config file
    Toml,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Environment => write!(f, "environment"),
            ValueSource::Toml => write!(f, "TOML"),
        }
    }
}

/// Locate the config file to load, if any
///
/// An explicit path (CLI argument or `DOGPOST_CONFIG`) is returned as-is even
/// when it does not exist, so that [`load_toml`] can report it. Discovered
/// default locations are only returned when present on disk.
pub fn locate_config_file(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if is_valid_value(&path) {
            return Some(PathBuf::from(path));
        }
    }

    if let Some(user_config) = dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE_NAME)) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE_NAME);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML config file into `T`, falling back to `T::default()`
///
/// Missing files degrade gracefully (warning + defaults). A path naming a
/// directory is invalid input; a file that exists but cannot be read or
/// parsed is a configuration error.
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} does not exist, using built-in defaults",
            path.display()
        );
        return Ok(T::default());
    }
    if !path.is_file() {
        return Err(Error::InvalidInput(format!(
            "Config path {} is not a file",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Resolve a value from the environment first, then from the TOML file
///
/// Blank values are treated as absent at both tiers. When both tiers carry a
/// value a warning is logged and the environment wins.
pub fn resolve_value(env_key: &str, toml_value: Option<&str>) -> Option<(String, ValueSource)> {
    let env_value = std::env::var(env_key).ok().filter(|v| is_valid_value(v));
    let toml_value = toml_value.filter(|v| is_valid_value(v));

    match (env_value, toml_value) {
        (Some(env), Some(_)) => {
            warn!(
                "{} found in both environment and TOML. Using environment (highest priority).",
                env_key
            );
            Some((env, ValueSource::Environment))
        }
        (Some(env), None) => Some((env, ValueSource::Environment)),
        (None, Some(toml)) => Some((toml.to_string(), ValueSource::Toml)),
        (None, None) => None,
    }
}

/// Validate a configuration value (non-empty, non-whitespace)
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}
