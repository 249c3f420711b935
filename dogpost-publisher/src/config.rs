//! Configuration for dogpost-publisher
//!
//! Built once at startup and passed down to constructors; nothing below
//! this module reads the environment.
//!
//! **Priority:** ENV → TOML → built-in defaults. Secrets and folder keys
//! may come from the environment:
//!
//! | ENV                   | TOML                         |
//! |-----------------------|------------------------------|
//! | `ALLOWED_EMAIL`       | `submission.allowed_email`   |
//! | `GEMINI_API_KEY`      | `gemini.api_key`             |
//! | `GITHUB_TOKEN`        | `github.token`               |
//! | `GITHUB_REPO`         | `github.repo`                |
//! | `FOLDER_ID`           | `sweep.folder`               |
//! | `PROCESSED_FOLDER_ID` | `sweep.processed_folder`     |

use chrono::FixedOffset;
use dogpost_common::config::{load_toml, resolve_value, LoggingConfig};
use dogpost_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::services::artifact_namer::NamingStrategy;
use crate::services::folder_sweep::SweepConfig;
use crate::services::gemini_client::GeminiConfig;
use crate::services::geolocation::GeolocationConfig;
use crate::services::github_client::GitHubConfig;
use crate::services::image_source::ImageSourceConfig;
use crate::services::normalizer::NormalizerConfig;

pub const ENV_ALLOWED_EMAIL: &str = "ALLOWED_EMAIL";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_GITHUB_REPO: &str = "GITHUB_REPO";
pub const ENV_FOLDER_ID: &str = "FOLDER_ID";
pub const ENV_PROCESSED_FOLDER_ID: &str = "PROCESSED_FOLDER_ID";

/// Artifact naming settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub strategy: NamingStrategy,
    /// Offset of publication timestamps and time-based names
    pub utc_offset_hours: i32,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            strategy: NamingStrategy::TimeSlug,
            utc_offset_hours: 9,
        }
    }
}

/// Status surface settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Also write the current marker to this file
    pub file: Option<PathBuf>,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5730".to_string(),
        }
    }
}

/// Complete publisher configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub submission: NormalizerConfig,
    pub gemini: GeminiConfig,
    pub github: GitHubConfig,
    pub geolocation: GeolocationConfig,
    pub images: ImageSourceConfig,
    pub naming: NamingConfig,
    pub sweep: SweepConfig,
    pub status: StatusConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl PublisherConfig {
    /// Load the TOML file (if any) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config: Self = load_toml(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Overlay the environment keys onto the TOML values
    pub fn apply_env_overrides(&mut self) {
        overlay(ENV_ALLOWED_EMAIL, &mut self.submission.allowed_email);
        overlay(ENV_GEMINI_API_KEY, &mut self.gemini.api_key);
        overlay(ENV_GITHUB_TOKEN, &mut self.github.token);
        overlay(ENV_GITHUB_REPO, &mut self.github.repo);
        overlay_path(ENV_FOLDER_ID, &mut self.sweep.folder);
        overlay_path(ENV_PROCESSED_FOLDER_ID, &mut self.sweep.processed_folder);
    }

    /// UTC offset for publication timestamps
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        self.naming
            .utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                Error::Config(format!(
                    "naming.utc_offset_hours out of range: {}",
                    self.naming.utc_offset_hours
                ))
            })
    }
}

fn overlay(env_key: &str, slot: &mut Option<String>) {
    match resolve_value(env_key, slot.as_deref()) {
        Some((value, source)) => {
            info!("{} loaded from {}", env_key, source);
            *slot = Some(value);
        }
        None => *slot = None,
    }
}

fn overlay_path(env_key: &str, slot: &mut Option<PathBuf>) {
    let mut text = slot.as_ref().map(|p| p.to_string_lossy().into_owned());
    overlay(env_key, &mut text);
    *slot = text.map(PathBuf::from);
}
