//! Artifact naming
//!
//! Derives the base name shared by the uploaded image and its post. Two
//! strategies exist; one is chosen in configuration and applied to every
//! submission:
//! - **Content hash**: `hex(sha256(image bytes))`. Identical images map to
//!   the same paths, so re-submitting updates instead of duplicating.
//! - **Time + slug**: `{yyyyMMddHHmmssSSS}-{slug}`, using the model's
//!   suggested file name.
//!
//! Both produce names made only of `[a-z0-9-]`, safe as a path segment and
//! as a URL segment.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{ArtifactNames, ImageBlob};

/// Slug used when the suggested file name sanitizes to nothing
const DEFAULT_SLUG: &str = "image";

/// Extension used when neither the file name nor the mime type gives one
const DEFAULT_EXTENSION: &str = "jpg";

/// Naming strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingStrategy {
    /// SHA-256 of the image content
    ContentHash,
    /// Millisecond timestamp plus the sanitized model slug
    #[default]
    TimeSlug,
}

/// Artifact namer
#[derive(Debug, Clone, Copy)]
pub struct ArtifactNamer {
    strategy: NamingStrategy,
}

impl ArtifactNamer {
    pub fn new(strategy: NamingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> NamingStrategy {
        self.strategy
    }

    /// Name the image/post pair for one submission
    pub fn name(
        &self,
        image: &ImageBlob,
        suggested_slug: &str,
        timestamp: DateTime<FixedOffset>,
    ) -> ArtifactNames {
        let base_name = match self.strategy {
            NamingStrategy::ContentHash => content_hash(&image.bytes),
            NamingStrategy::TimeSlug => format!(
                "{}-{}",
                timestamp.format("%Y%m%d%H%M%S%3f"),
                sanitize_slug(suggested_slug)
            ),
        };
        ArtifactNames::new(base_name, file_extension(&image.name, &image.mime_type))
    }
}

/// Lowercase hex SHA-256 digest
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Keep `[A-Za-z0-9-]`, lowercase, trim stray hyphens; `image` if empty
pub fn sanitize_slug(slug: &str) -> String {
    let kept: String = slug
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect::<String>()
        .to_ascii_lowercase();
    let trimmed = kept.trim_matches('-');
    if trimmed.is_empty() {
        DEFAULT_SLUG.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Extension from the original file name, else from the mime type
pub fn file_extension(file_name: &str, mime_type: &str) -> String {
    let from_name = file_name
        .rsplit_once('.')
        .map(|(_, ext)| {
            ext.chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|ext| !ext.is_empty());

    if let Some(ext) = from_name {
        return ext;
    }

    match mime_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/heic" => "heic",
        _ => DEFAULT_EXTENSION,
    }
    .to_string()
}
