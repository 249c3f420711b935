//! Core Types and Trait Definitions for dogpost-publisher
//!
//! Defines the submission data model and the traits at every external seam
//! of the pipeline:
//! - [`ImageSource`] resolves an image reference to bytes
//! - [`LocationResolver`] turns image metadata or free text into a location
//! - [`ContentGenerator`] produces an [`ArticleDraft`] from the image
//! - [`DocumentStore`] commits files to the content repository
//! - [`StatusSurface`] shows the operator what the pipeline is doing
//! - [`Clock`] supplies the publication timestamp
//!
//! The orchestrator only talks to these traits, so every stage can be
//! replaced with an in-memory fake in tests.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::PipelineResult;

// ============================================================================
// Submission
// ============================================================================

/// Which trigger shape produced a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Form-submission event (named answers)
    Form,
    /// Spreadsheet edit event (positional row snapshot)
    Sheet,
    /// Watch-folder sweep entry
    Folder,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Form => write!(f, "form"),
            TriggerSource::Sheet => write!(f, "sheet"),
            TriggerSource::Folder => write!(f, "folder"),
        }
    }
}

/// Opaque handle resolvable to image bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    /// File stored in the form's upload drive, identified by its file ID
    DriveFile { id: String },
    /// File on the local filesystem (folder sweep)
    LocalFile { path: PathBuf },
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::DriveFile { id } => write!(f, "drive:{}", id),
            ImageRef::LocalFile { path } => write!(f, "file:{}", path.display()),
        }
    }
}

/// Canonical submission, immutable once normalized
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    /// Correlation ID for logs and events
    pub submission_id: Uuid,
    /// Trigger shape this record was normalized from
    pub source: TriggerSource,
    /// Image to publish
    pub image_ref: ImageRef,
    /// Free-text location typed by the submitter
    pub location: Option<String>,
    /// Post category
    pub category: Option<String>,
    /// Situation memo, used as guidance for the generator
    pub memo: Option<String>,
    /// Submitter identity (email) when the trigger carries one
    pub respondent_identity: Option<String>,
    /// Whether the submitter asked for publication
    pub publish_requested: bool,
}

/// Image bytes plus the metadata needed for naming and upload
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlob {
    /// Raw file content
    pub bytes: Vec<u8>,
    /// MIME type (e.g. `image/jpeg`)
    pub mime_type: String,
    /// Original file name, used for the extension
    pub name: String,
}

// ============================================================================
// Location
// ============================================================================

/// Base URL for coordinate map links
const MAPS_POINT_URL: &str = "https://www.google.com/maps";

/// Base URL for free-text search map links
const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/";

/// Decimal-degree coordinates (both-or-neither by construction)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Resolved location of a photo
///
/// Three shapes are possible: metadata-derived (coordinates, map link,
/// optional address), text-derived (address and search link, no
/// coordinates) or empty. A map link is present whenever an address or
/// coordinates are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationResolution {
    address_text: Option<String>,
    map_link: Option<String>,
    coordinates: Option<Coordinates>,
}

impl LocationResolution {
    /// Resolution with nothing known
    pub fn empty() -> Self {
        Self::default()
    }

    /// Metadata-derived resolution; `address` may be absent when reverse
    /// geocoding failed
    pub fn from_coordinates(coordinates: Coordinates, address: Option<String>) -> Self {
        Self {
            address_text: address.filter(|a| !a.trim().is_empty()),
            map_link: Some(format!(
                "{}?q={},{}",
                MAPS_POINT_URL, coordinates.lat, coordinates.lng
            )),
            coordinates: Some(coordinates),
        }
    }

    /// Text-derived resolution with a search-style map link
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();
        let link = reqwest::Url::parse_with_params(MAPS_SEARCH_URL, &[("api", "1"), ("query", text)])
            .expect("static maps URL is valid");
        Self {
            address_text: Some(text.to_string()),
            map_link: Some(link.to_string()),
            coordinates: None,
        }
    }

    pub fn address_text(&self) -> Option<&str> {
        self.address_text.as_deref()
    }

    pub fn map_link(&self) -> Option<&str> {
        self.map_link.as_deref()
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates
    }

    /// True when nothing about the location is known
    pub fn is_empty(&self) -> bool {
        self.address_text.is_none() && self.map_link.is_none() && self.coordinates.is_none()
    }

    /// Human-readable location for the generation prompt
    pub fn prompt_text(&self) -> Option<String> {
        match (&self.address_text, self.coordinates) {
            (Some(address), _) => Some(address.clone()),
            (None, Some(c)) => Some(format!("{}, {}", c.lat, c.lng)),
            (None, None) => None,
        }
    }
}

/// Result of the (category-gated) location stage
#[derive(Debug, Clone, PartialEq)]
pub enum LocationOutcome {
    /// Category is location-enabled; resolution may still be empty
    Resolved(LocationResolution),
    /// Category is not location-enabled; nothing was read
    Skipped,
}

impl LocationOutcome {
    /// Resolution to use for assembly (empty when skipped)
    pub fn resolution(&self) -> LocationResolution {
        match self {
            LocationOutcome::Resolved(resolution) => resolution.clone(),
            LocationOutcome::Skipped => LocationResolution::empty(),
        }
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Context block passed to the generator alongside the image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentContext {
    /// Location text, if any location data exists
    pub location_text: Option<String>,
    pub category: Option<String>,
    pub memo: Option<String>,
}

/// Article produced by the generative model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDraft {
    /// Suggested file name slug (sanitized before use)
    #[serde(default)]
    pub filename: String,
    /// Post title (the model is asked for at most 30 characters)
    pub title: String,
    /// Markdown body
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

// ============================================================================
// Artifacts
// ============================================================================

/// Paths of the image/post pair derived from one base name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub base_name: String,
    pub extension: String,
    /// `static/images/{base}.{ext}`
    pub image_path: String,
    /// `content/posts/{base}.md`
    pub post_path: String,
    /// `/images/{base}.{ext}`, as served by the site
    pub cover_image: String,
}

impl ArtifactNames {
    pub fn new(base_name: impl Into<String>, extension: impl Into<String>) -> Self {
        let base_name = base_name.into();
        let extension = extension.into();
        Self {
            image_path: format!("static/images/{}.{}", base_name, extension),
            post_path: format!("content/posts/{}.md", base_name),
            cover_image: format!("/images/{}.{}", base_name, extension),
            base_name,
            extension,
        }
    }

    /// `{base}.{ext}`
    pub fn image_file_name(&self) -> String {
        format!("{}.{}", self.base_name, self.extension)
    }
}

/// A file write against the document store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    pub content_base64: String,
    pub commit_message: String,
    /// Prior revision token; `Some` means update-in-place
    pub revision_token: Option<String>,
}

/// Outcome of a successful store write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub path: String,
    /// True when the write created the file, false when it updated it
    pub created: bool,
    /// Revision token of the new content, when the store reports one
    pub revision_token: Option<String>,
}

// ============================================================================
// Status
// ============================================================================

/// Marker shown on the status surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StatusMarker {
    InProgress,
    Published { title: String },
    Failed { message: String },
}

impl fmt::Display for StatusMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMarker::InProgress => write!(f, "⏳ Processing..."),
            StatusMarker::Published { title } => write!(f, "✅ {}", title),
            StatusMarker::Failed { message } => write!(f, "❌ {}", message),
        }
    }
}

// ============================================================================
// Seam traits
// ============================================================================

/// Resolves image references to bytes
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, image_ref: &ImageRef) -> PipelineResult<ImageBlob>;
}

/// Category-gated location resolution
///
/// Never fails: degraded lookups yield partial or empty resolutions.
#[async_trait]
pub trait LocationResolver: Send + Sync {
    async fn resolve(
        &self,
        image: &ImageBlob,
        category: Option<&str>,
        location_text: Option<&str>,
    ) -> LocationOutcome;
}

/// Generative content backend
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        image: &ImageBlob,
        context: &ContentContext,
    ) -> PipelineResult<ArticleDraft>;
}

/// Versioned content repository
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or update `path` with `content_base64`
    async fn upload(
        &self,
        path: &str,
        content_base64: &str,
        commit_message: &str,
    ) -> PipelineResult<UploadReceipt>;
}

/// Visible status indicator
///
/// `set` returns only once the marker is observable by others.
#[async_trait]
pub trait StatusSurface: Send + Sync {
    async fn set(&self, marker: &StatusMarker) -> PipelineResult<()>;
}

/// Source of "now" for publication timestamps and time-based names
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock in a fixed UTC offset
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

// ============================================================================
// Tests
// ============================================================================
