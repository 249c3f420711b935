//! Geolocation resolver
//!
//! Resolves where a photo was taken, in this order:
//! 1. Embedded EXIF GPS coordinates, reverse-geocoded to an address
//! 2. The submitter's free-text location, with a search-style map link
//! 3. Nothing (empty resolution, not an error)
//!
//! Resolution only runs for categories on the location allow-list. Other
//! categories (e.g. home) may reveal private places, so they are skipped
//! before the image metadata is even read.
//!
//! Reverse geocoding uses a Nominatim-compatible `/reverse` endpoint,
//! limited to 1 request/second as the public OpenStreetMap service requires.

use async_trait::async_trait;
use exif::{In, Reader, Tag, Value};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{Coordinates, ImageBlob, LocationOutcome, LocationResolution, LocationResolver};

const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const USER_AGENT: &str = concat!("dogpost/", env!("CARGO_PKG_VERSION"));

/// Free-text answers meaning "I don't know"
const UNKNOWN_PLACEHOLDERS: [&str; 2] = ["unknown", "不明"];

/// Geolocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    /// Categories for which location may be published
    pub enabled_categories: Vec<String>,
    /// Reverse geocoding service base URL
    pub base_url: String,
    /// Address language (`accept-language`)
    pub language: String,
    pub timeout_secs: u64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            enabled_categories: ["park", "travel", "dog-run", "shop"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            base_url: NOMINATIM_BASE_URL.to_string(),
            language: "ja".to_string(),
            timeout_secs: 10,
        }
    }
}

// ============================================================================
// EXIF
// ============================================================================

/// Read EXIF GPS coordinates from image bytes
///
/// Returns `None` when the image has no EXIF block, no GPS fields, or
/// malformed GPS values.
pub fn read_gps_coordinates(bytes: &[u8]) -> Option<Coordinates> {
    let exif = Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;

    let lat = dms_field(&exif, Tag::GPSLatitude)?;
    let lng = dms_field(&exif, Tag::GPSLongitude)?;
    let lat_ref = ref_field(&exif, Tag::GPSLatitudeRef).unwrap_or('N');
    let lng_ref = ref_field(&exif, Tag::GPSLongitudeRef).unwrap_or('E');

    let lat = if lat_ref == 'S' { -lat } else { lat };
    let lng = if lng_ref == 'W' { -lng } else { lng };

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        debug!(lat, lng, "Ignoring out-of-range GPS coordinates");
        return None;
    }

    Some(Coordinates { lat, lng })
}

fn dms_field(exif: &exif::Exif, tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match field.value {
        Value::Rational(ref parts) if parts.len() >= 3 => {
            let degrees = parts[0].to_f64();
            let minutes = parts[1].to_f64();
            let seconds = parts[2].to_f64();
            let decimal = dms_to_decimal(degrees, minutes, seconds);
            decimal.is_finite().then_some(decimal)
        }
        _ => None,
    }
}

fn ref_field(exif: &exif::Exif, tag: Tag) -> Option<char> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match field.value {
        Value::Ascii(ref values) => values
            .first()
            .and_then(|v| v.first())
            .map(|b| (*b as char).to_ascii_uppercase()),
        _ => None,
    }
}

/// Degrees/minutes/seconds to decimal degrees
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}

// ============================================================================
// Reverse geocoding
// ============================================================================

/// Reverse geocoding errors
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Coordinates → address
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// `Ok(None)` when the service has no address for the point
    async fn reverse(&self, coordinates: Coordinates) -> Result<Option<String>, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
    error: Option<String>,
}

/// Nominatim-compatible reverse geocoding client
pub struct NominatimGeocoder {
    http_client: Client,
    base_url: String,
    language: String,
    /// 1 request per second (Nominatim usage policy)
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl NominatimGeocoder {
    pub fn new(config: &GeolocationConfig) -> Result<Self, GeocodeError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GeocodeError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            rate_limiter: RateLimiter::direct(Quota::per_second(
                NonZeroU32::new(1).expect("1 is non-zero"),
            )),
        })
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, coordinates: Coordinates) -> Result<Option<String>, GeocodeError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/reverse", self.base_url);
        debug!(lat = coordinates.lat, lng = coordinates.lng, "Reverse geocoding");

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", coordinates.lat.to_string()),
                ("lon", coordinates.lng.to_string()),
                ("accept-language", self.language.clone()),
            ])
            .send()
            .await
            .map_err(|e| GeocodeError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Api(status.as_u16(), body));
        }

        let parsed: ReverseResponse = response
            .json()
            .await
            .map_err(|e| GeocodeError::Parse(e.to_string()))?;

        if let Some(error) = parsed.error {
            debug!("Reverse geocoder has no address: {}", error);
            return Ok(None);
        }

        Ok(parsed.display_name.filter(|name| !name.trim().is_empty()))
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Category-gated geolocation resolver
pub struct GeolocationResolver {
    enabled_categories: Vec<String>,
    geocoder: Arc<dyn ReverseGeocoder>,
}

impl GeolocationResolver {
    pub fn new(enabled_categories: Vec<String>, geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        Self {
            enabled_categories: enabled_categories
                .into_iter()
                .map(|c| c.trim().to_lowercase())
                .collect(),
            geocoder,
        }
    }

    /// Whether location may be resolved for `category`
    pub fn is_location_enabled(&self, category: Option<&str>) -> bool {
        category
            .map(|c| c.trim().to_lowercase())
            .is_some_and(|c| self.enabled_categories.contains(&c))
    }
}

/// True for blank answers and "unknown" placeholders
fn is_unknown_location(text: &str) -> bool {
    let text = text.trim();
    text.is_empty()
        || UNKNOWN_PLACEHOLDERS
            .iter()
            .any(|p| text.eq_ignore_ascii_case(p))
}

#[async_trait]
impl LocationResolver for GeolocationResolver {
    async fn resolve(
        &self,
        image: &ImageBlob,
        category: Option<&str>,
        location_text: Option<&str>,
    ) -> LocationOutcome {
        if !self.is_location_enabled(category) {
            info!(
                category = category.unwrap_or("<unset>"),
                "Category may be a private place, skipping location lookup"
            );
            return LocationOutcome::Skipped;
        }

        if let Some(coordinates) = read_gps_coordinates(&image.bytes) {
            let address = match self.geocoder.reverse(coordinates).await {
                Ok(address) => address,
                Err(e) => {
                    warn!(
                        lat = coordinates.lat,
                        lng = coordinates.lng,
                        "Reverse geocoding failed, keeping coordinates only: {}",
                        e
                    );
                    None
                }
            };
            info!(
                lat = coordinates.lat,
                lng = coordinates.lng,
                address = address.as_deref().unwrap_or("<none>"),
                "Location taken from image metadata"
            );
            return LocationOutcome::Resolved(LocationResolution::from_coordinates(
                coordinates,
                address,
            ));
        }

        match location_text.filter(|text| !is_unknown_location(text)) {
            Some(text) => {
                info!(location = text.trim(), "Location taken from submitter text");
                LocationOutcome::Resolved(LocationResolution::from_text(text))
            }
            None => {
                info!("No usable location for location-enabled category");
                LocationOutcome::Resolved(LocationResolution::empty())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
