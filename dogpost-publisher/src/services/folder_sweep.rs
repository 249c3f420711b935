//! Watch-folder sweep
//!
//! Publishes every JPEG/PNG sitting directly inside the watch folder, one
//! at a time through the pipeline. Published files move to the processed
//! folder; failed files stay put and are retried on the next sweep.
//!
//! A wall-clock budget is checked before each file so that one sweep never
//! runs unbounded. When it is spent the sweep stops cleanly and reports how
//! many files are left.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::services::normalizer::{FolderEntry, TriggerEvent};
use crate::workflow::Pipeline;

/// Image types picked up from the watch folder
const SWEPT_MIME_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// Folder sweep errors
#[derive(Debug, Error)]
pub enum SweepError {
    /// Watch or processed folder not configured
    #[error("Folder not configured: {0}")]
    NotConfigured(&'static str),

    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Folder sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Watch folder (`FOLDER_ID` overrides)
    pub folder: Option<PathBuf>,
    /// Destination for published files (`PROCESSED_FOLDER_ID` overrides)
    pub processed_folder: Option<PathBuf>,
    /// Wall-clock budget per sweep
    pub budget_secs: u64,
    /// Files published per sweep; 0 = unlimited. Failed files do not count.
    pub max_files_per_run: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            folder: None,
            processed_folder: None,
            budget_secs: 300,
            max_files_per_run: 0,
        }
    }
}

/// Sweep statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Published and moved
    pub processed: usize,
    /// Attempted but not published
    pub failed: usize,
    /// Not a JPEG/PNG
    pub skipped: usize,
    /// Eligible files left for the next sweep
    pub remaining: usize,
    /// Sweep stopped because the time budget ran out
    pub budget_exhausted: bool,
}

/// Watch-folder sweeper
pub struct FolderSweeper {
    folder: PathBuf,
    processed_folder: PathBuf,
    budget: Duration,
    max_files_per_run: usize,
    pipeline: Arc<Pipeline>,
}

impl FolderSweeper {
    pub fn new(config: &SweepConfig, pipeline: Arc<Pipeline>) -> Result<Self, SweepError> {
        let folder = config
            .folder
            .clone()
            .ok_or(SweepError::NotConfigured("FOLDER_ID"))?;
        let processed_folder = config
            .processed_folder
            .clone()
            .ok_or(SweepError::NotConfigured("PROCESSED_FOLDER_ID"))?;

        Ok(Self {
            folder,
            processed_folder,
            budget: Duration::from_secs(config.budget_secs),
            max_files_per_run: config.max_files_per_run,
            pipeline,
        })
    }

    /// Eligible images (sorted by name) and the count of other files
    pub fn scan(&self) -> Result<(Vec<PathBuf>, usize), SweepError> {
        check_directory(&self.folder)?;

        let mut files: Vec<PathBuf> = WalkDir::new(&self.folder)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Error accessing entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();
        files.sort();

        let total = files.len();
        let images: Vec<PathBuf> = files.into_iter().filter(|path| is_swept_image(path)).collect();
        let skipped = total - images.len();

        debug!(
            "Scanned {}: {} images, {} skipped",
            self.folder.display(),
            images.len(),
            skipped
        );
        Ok((images, skipped))
    }

    /// Run one sweep
    pub async fn sweep(&self) -> Result<SweepReport, SweepError> {
        let started = Instant::now();
        check_directory(&self.processed_folder)?;
        let (images, skipped) = self.scan()?;

        let mut report = SweepReport {
            skipped,
            ..Default::default()
        };

        for (index, path) in images.iter().enumerate() {
            if started.elapsed() >= self.budget {
                report.budget_exhausted = true;
                report.remaining = images.len() - index;
                warn!(
                    remaining = report.remaining,
                    "Sweep budget of {:?} exhausted, stopping",
                    self.budget
                );
                break;
            }
            if self.max_files_per_run > 0 && report.processed >= self.max_files_per_run {
                report.remaining = images.len() - index;
                break;
            }

            let outcome = self
                .pipeline
                .process(&TriggerEvent::Folder(FolderEntry { path: path.clone() }))
                .await;

            if outcome.is_published() {
                report.processed += 1;
                if let Err(e) = self.move_to_processed(path).await {
                    // Published but still in the watch folder: the next sweep will republish it
                    error!(path = %path.display(), "Failed to move published file: {}", e);
                }
            } else {
                report.failed += 1;
                warn!(path = %path.display(), "File left in watch folder for the next sweep");
            }
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            skipped = report.skipped,
            remaining = report.remaining,
            "Sweep complete in {:?}",
            started.elapsed()
        );
        Ok(report)
    }

    async fn move_to_processed(&self, path: &Path) -> std::io::Result<()> {
        let file_name = path.file_name().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
        })?;
        let destination = free_destination(&self.processed_folder, Path::new(file_name)).await?;

        if tokio::fs::rename(path, &destination).await.is_err() {
            // Cross-device moves cannot rename
            tokio::fs::copy(path, &destination).await?;
            tokio::fs::remove_file(path).await?;
        }
        debug!(from = %path.display(), to = %destination.display(), "Moved to processed folder");
        Ok(())
    }
}

/// First unused name in `dir`: `name`, then `stem-1.ext`, `stem-2.ext`, ...
///
/// Camera file names repeat, and rename/copy would overwrite an earlier
/// processed original.
async fn free_destination(dir: &Path, file_name: &Path) -> std::io::Result<PathBuf> {
    let candidate = dir.join(file_name);
    if !tokio::fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }

    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = file_name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{}-{}{}", stem, n, extension));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

fn check_directory(path: &Path) -> Result<(), SweepError> {
    if !path.exists() {
        return Err(SweepError::PathNotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(SweepError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}

/// JPEG or PNG by magic bytes, regardless of extension
fn is_swept_image(path: &Path) -> bool {
    match infer::get_from_path(path) {
        Ok(Some(kind)) => SWEPT_MIME_TYPES.contains(&kind.mime_type()),
        Ok(None) => false,
        Err(e) => {
            warn!("Error verifying {}: {}", path.display(), e);
            false
        }
    }
}
