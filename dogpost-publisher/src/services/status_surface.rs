//! Status surfaces
//!
//! Where the operator sees the current submission's state. Exactly one
//! marker is visible at a time; each `set` replaces the previous one and
//! returns only after the new marker is observable.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::PipelineResult;
use crate::types::{StatusMarker, StatusSurface};

/// In-memory marker shared with the HTTP API (`GET /status`)
#[derive(Debug, Clone, Default)]
pub struct SharedStatus {
    current: Arc<RwLock<Option<StatusMarker>>>,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marker currently shown, if any
    pub async fn current(&self) -> Option<StatusMarker> {
        self.current.read().await.clone()
    }
}

#[async_trait]
impl StatusSurface for SharedStatus {
    async fn set(&self, marker: &StatusMarker) -> PipelineResult<()> {
        *self.current.write().await = Some(marker.clone());
        Ok(())
    }
}

/// Marker text written to a file, overwritten and synced on every change
#[derive(Debug, Clone)]
pub struct FileStatus {
    path: PathBuf,
}

impl FileStatus {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StatusSurface for FileStatus {
    async fn set(&self, marker: &StatusMarker) -> PipelineResult<()> {
        let mut file = tokio::fs::File::create(&self.path).await?;
        file.write_all(format!("{}\n", marker).as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }
}

/// Marker emitted as a log line only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatus;

#[async_trait]
impl StatusSurface for LogStatus {
    async fn set(&self, marker: &StatusMarker) -> PipelineResult<()> {
        info!(status = %marker, "Status changed");
        Ok(())
    }
}

/// Fans one marker out to several surfaces in order
pub struct CompositeStatus {
    surfaces: Vec<Arc<dyn StatusSurface>>,
}

impl CompositeStatus {
    pub fn new(surfaces: Vec<Arc<dyn StatusSurface>>) -> Self {
        Self { surfaces }
    }
}

#[async_trait]
impl StatusSurface for CompositeStatus {
    async fn set(&self, marker: &StatusMarker) -> PipelineResult<()> {
        for surface in &self.surfaces {
            surface.set(marker).await?;
        }
        Ok(())
    }
}
