//! Image source
//!
//! Resolves [`ImageRef`]s to bytes: drive file IDs are downloaded over
//! HTTP, local paths are read from disk. The mime type comes from the
//! `Content-Type` header when it names an image, otherwise from the file's
//! magic bytes.

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::types::{ImageBlob, ImageRef, ImageSource};

const DRIVE_DOWNLOAD_URL: &str = "https://drive.google.com/uc?export=download&id={id}";

const FALLBACK_MIME: &str = "application/octet-stream";

/// Image source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSourceConfig {
    /// Download URL; `{id}` is replaced by the file ID
    pub download_url_template: String,
    /// Bearer token sent with downloads, if any
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ImageSourceConfig {
    fn default() -> Self {
        Self {
            download_url_template: DRIVE_DOWNLOAD_URL.to_string(),
            access_token: None,
            timeout_secs: 30,
        }
    }
}

/// Fetches drive-hosted and local images
pub struct ImageFetcher {
    http_client: Client,
    url_template: String,
    access_token: Option<String>,
}

impl ImageFetcher {
    pub fn new(config: &ImageSourceConfig) -> PipelineResult<Self> {
        if !config.download_url_template.contains("{id}") {
            return Err(PipelineError::Config(format!(
                "download_url_template must contain {{id}}: {}",
                config.download_url_template
            )));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url_template: config.download_url_template.clone(),
            access_token: config.access_token.clone().filter(|t| !t.trim().is_empty()),
        })
    }

    /// Download URL for a drive file ID
    pub fn download_url(&self, id: &str) -> String {
        self.url_template.replace("{id}", id)
    }

    async fn fetch_drive(&self, id: &str) -> PipelineResult<ImageBlob> {
        let url = self.download_url(id);
        debug!(file_id = id, "Downloading image");

        let mut request = self.http_client.get(&url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let operation = format!("image download {}", id);
        let response = request.send().await.map_err(|e| {
            PipelineError::from_transport(&operation, e, |e| PipelineError::ImageFetch(e.to_string()))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::ImageFetch(format!(
                "download of {} returned {}",
                id, status
            )));
        }

        let headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(|e| {
            PipelineError::from_transport(&operation, e, |e| PipelineError::ImageFetch(e.to_string()))
        })?;

        let declared = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase());
        if declared.as_deref() == Some("text/html") {
            // Interstitial pages (sign-in, virus-scan warning) instead of the file
            return Err(PipelineError::ImageFetch(format!(
                "download of {} returned an HTML page",
                id
            )));
        }

        let name = headers
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename)
            .unwrap_or_else(|| id.to_string());

        let mime_type = resolve_mime(declared.as_deref(), &bytes);
        info!(file_id = id, name = %name, mime = %mime_type, size = bytes.len(), "Image downloaded");

        Ok(ImageBlob {
            bytes: bytes.to_vec(),
            mime_type,
            name,
        })
    }

    async fn fetch_local(&self, path: &Path) -> PipelineResult<ImageBlob> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            PipelineError::ImageFetch(format!("{}: {}", path.display(), e))
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = resolve_mime(None, &bytes);
        debug!(path = %path.display(), mime = %mime_type, "Image read from disk");

        Ok(ImageBlob {
            bytes,
            mime_type,
            name,
        })
    }
}

#[async_trait]
impl ImageSource for ImageFetcher {
    async fn fetch(&self, image_ref: &ImageRef) -> PipelineResult<ImageBlob> {
        match image_ref {
            ImageRef::DriveFile { id } => self.fetch_drive(id).await,
            ImageRef::LocalFile { path } => self.fetch_local(path).await,
        }
    }
}

/// Declared image type if any, else sniffed from the bytes
pub fn resolve_mime(declared: Option<&str>, bytes: &[u8]) -> String {
    if let Some(declared) = declared.filter(|d| d.starts_with("image/")) {
        return declared.to_string();
    }
    infer::get(bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

/// File name from a Content-Disposition header
///
/// The RFC 5987 `filename*=UTF-8''...` form (sent for non-ASCII names) wins
/// over plain `filename="..."`.
fn disposition_filename(value: &str) -> Option<String> {
    let params: Vec<&str> = value.split(';').map(str::trim).collect();

    params
        .iter()
        .find_map(|part| part.strip_prefix("filename*="))
        .and_then(decode_extended_value)
        .or_else(|| {
            params
                .iter()
                .find_map(|part| part.strip_prefix("filename="))
                .map(|name| name.trim_matches('"').to_string())
        })
        .filter(|name| !name.is_empty())
}

/// `charset'language'percent-encoded`; only UTF-8 is accepted
fn decode_extended_value(value: &str) -> Option<String> {
    let mut parts = value.trim_matches('"').splitn(3, '\'');
    let charset = parts.next()?;
    let _language = parts.next()?;
    let encoded = parts.next()?;
    if !charset.eq_ignore_ascii_case("utf-8") {
        return None;
    }
    percent_decode_str(encoded)
        .decode_utf8()
        .ok()
        .map(|name| name.into_owned())
}
