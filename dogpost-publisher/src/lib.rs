//! dogpost-publisher library interface
//!
//! Exposes the pipeline, its services and the HTTP router for the binary
//! and for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult, PipelineError, PipelineResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::config::PublisherConfig;
use crate::services::{
    ArtifactNamer, CompositeStatus, FileStatus, FolderSweeper, GeminiClient, GeolocationResolver,
    GitHubClient, ImageFetcher, LogStatus, NominatimGeocoder, SharedStatus, SubmissionNormalizer,
};
use crate::types::{StatusSurface, SystemClock};
use crate::workflow::{Pipeline, PipelineComponents};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Present when both sweep folders are configured
    pub sweeper: Option<Arc<FolderSweeper>>,
    /// Marker served by `GET /status`
    pub status: SharedStatus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        pipeline: Arc<Pipeline>,
        sweeper: Option<Arc<FolderSweeper>>,
        status: SharedStatus,
    ) -> Self {
        Self {
            pipeline,
            sweeper,
            status,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_error(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::trigger_routes())
        .merge(api::sweep_routes())
        .merge(api::status_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Production wiring of the pipeline
pub struct Services {
    pub pipeline: Arc<Pipeline>,
    pub sweeper: Option<Arc<FolderSweeper>>,
    pub status: SharedStatus,
}

impl Services {
    /// Construct every service from configuration
    ///
    /// Fails when a required secret (API key, token, repository) is missing.
    /// The sweeper is only built when both sweep folders are configured.
    pub fn build(config: &PublisherConfig) -> PipelineResult<Self> {
        let geocoder = NominatimGeocoder::new(&config.geolocation)
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let status = SharedStatus::new();
        let mut surfaces: Vec<Arc<dyn StatusSurface>> =
            vec![Arc::new(status.clone()), Arc::new(LogStatus)];
        if let Some(path) = &config.status.file {
            surfaces.push(Arc::new(FileStatus::new(path)));
        }

        let components = PipelineComponents {
            image_source: Arc::new(ImageFetcher::new(&config.images)?),
            location: Arc::new(GeolocationResolver::new(
                config.geolocation.enabled_categories.clone(),
                Arc::new(geocoder),
            )),
            generator: Arc::new(GeminiClient::new(&config.gemini)?),
            store: Arc::new(GitHubClient::new(&config.github)?),
            status: Arc::new(CompositeStatus::new(surfaces)),
            clock: Arc::new(SystemClock::new(config.utc_offset()?)),
        };

        let pipeline = Arc::new(Pipeline::new(
            components,
            SubmissionNormalizer::new(config.submission.clone()),
            ArtifactNamer::new(config.naming.strategy),
        ));

        let sweeper = match (&config.sweep.folder, &config.sweep.processed_folder) {
            (Some(_), Some(_)) => Some(Arc::new(
                FolderSweeper::new(&config.sweep, Arc::clone(&pipeline))
                    .map_err(|e| PipelineError::Config(e.to_string()))?,
            )),
            _ => None,
        };

        Ok(Self {
            pipeline,
            sweeper,
            status,
        })
    }
}
