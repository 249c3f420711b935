//! Shared test fixtures: in-memory fakes for every pipeline seam, a local
//! HTTP server for API clients, and a JPEG carrying EXIF GPS tags.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, FixedOffset, TimeZone};
use dogpost_publisher::error::{PipelineError, PipelineResult};
use dogpost_publisher::services::geolocation::{GeocodeError, ReverseGeocoder};
use dogpost_publisher::services::normalizer::{FormEvent, NormalizerConfig};
use dogpost_publisher::services::{ArtifactNamer, GeolocationResolver, NamingStrategy, SubmissionNormalizer};
use dogpost_publisher::types::{
    ArticleDraft, Clock, ContentContext, ContentGenerator, Coordinates, DocumentStore, ImageBlob,
    ImageRef, ImageSource, StatusMarker, StatusSurface, UploadReceipt,
};
use dogpost_publisher::workflow::{Pipeline, PipelineComponents};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const OWNER_EMAIL: &str = "owner@example.com";

// ============================================================================
// Fakes
// ============================================================================

/// Serves one fixed image for every reference
pub struct FakeImageSource {
    pub blob: ImageBlob,
    pub requests: Mutex<Vec<ImageRef>>,
}

impl FakeImageSource {
    pub fn new(blob: ImageBlob) -> Self {
        Self {
            blob,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageSource for FakeImageSource {
    async fn fetch(&self, image_ref: &ImageRef) -> PipelineResult<ImageBlob> {
        self.requests.lock().unwrap().push(image_ref.clone());
        Ok(self.blob.clone())
    }
}

/// Replays scripted generation results and records each context
pub struct FakeGenerator {
    responses: Mutex<VecDeque<PipelineResult<ArticleDraft>>>,
    pub contexts: Mutex<Vec<ContentContext>>,
}

impl FakeGenerator {
    pub fn new(responses: Vec<PipelineResult<ArticleDraft>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(draft: ArticleDraft) -> Self {
        Self::new(vec![Ok(draft)])
    }

    pub fn calls(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn generate(
        &self,
        _image: &ImageBlob,
        context: &ContentContext,
    ) -> PipelineResult<ArticleDraft> {
        self.contexts.lock().unwrap().push(context.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PipelineError::AllModelsFailed {
                last_error: "no scripted response".to_string(),
            }))
    }
}

/// One recorded store write
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub path: String,
    pub message: String,
    pub content: Vec<u8>,
    pub created: bool,
}

/// Versioned in-memory store; optionally fails writes to one path
#[derive(Default)]
pub struct InMemoryStore {
    revisions: Mutex<HashMap<String, u32>>,
    pub commits: Mutex<Vec<Commit>>,
    pub fail_path_suffix: Option<String>,
}

impl InMemoryStore {
    pub fn failing_on(suffix: &str) -> Self {
        Self {
            fail_path_suffix: Some(suffix.to_string()),
            ..Default::default()
        }
    }

    pub fn commits(&self) -> Vec<Commit> {
        self.commits.lock().unwrap().clone()
    }

    pub fn file_count(&self) -> usize {
        self.revisions.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn upload(
        &self,
        path: &str,
        content_base64: &str,
        commit_message: &str,
    ) -> PipelineResult<UploadReceipt> {
        if self
            .fail_path_suffix
            .as_deref()
            .is_some_and(|suffix| path.ends_with(suffix))
        {
            return Err(PipelineError::StoreWriteFailed {
                path: path.to_string(),
                status_body: "422 Unprocessable Entity".to_string(),
            });
        }

        let content = BASE64
            .decode(content_base64)
            .map_err(|e| PipelineError::StoreWriteFailed {
                path: path.to_string(),
                status_body: e.to_string(),
            })?;

        let mut revisions = self.revisions.lock().unwrap();
        let revision = revisions.entry(path.to_string()).or_insert(0);
        let created = *revision == 0;
        *revision += 1;

        self.commits.lock().unwrap().push(Commit {
            path: path.to_string(),
            message: commit_message.to_string(),
            content,
            created,
        });

        Ok(UploadReceipt {
            path: path.to_string(),
            created,
            revision_token: Some(format!("rev-{}", revision)),
        })
    }
}

/// Records every marker set
#[derive(Default)]
pub struct RecordingStatus {
    pub markers: Mutex<Vec<StatusMarker>>,
}

impl RecordingStatus {
    pub fn markers(&self) -> Vec<StatusMarker> {
        self.markers.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusSurface for RecordingStatus {
    async fn set(&self, marker: &StatusMarker) -> PipelineResult<()> {
        self.markers.lock().unwrap().push(marker.clone());
        Ok(())
    }
}

/// Geocoder that counts calls and returns a fixed result
pub struct FakeGeocoder {
    pub address: Option<String>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeGeocoder {
    pub fn returning(address: &str) -> Self {
        Self {
            address: Some(address.to_string()),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            address: None,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReverseGeocoder for FakeGeocoder {
    async fn reverse(&self, _coordinates: Coordinates) -> Result<Option<String>, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GeocodeError::Api(503, "Service Unavailable".to_string()));
        }
        Ok(self.address.clone())
    }
}

/// Clock pinned to one instant
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// 2024-05-01 09:30:15.123 +09:00
pub fn fixed_time() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(9 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 5, 1, 9, 30, 15)
        .unwrap()
        + chrono::Duration::milliseconds(123)
}

// ============================================================================
// Harness
// ============================================================================

/// Pipeline wired to fakes, with handles to inspect them
pub struct Harness {
    pub pipeline: Pipeline,
    pub images: Arc<FakeImageSource>,
    pub generator: Arc<FakeGenerator>,
    pub store: Arc<InMemoryStore>,
    pub status: Arc<RecordingStatus>,
    pub geocoder: Arc<FakeGeocoder>,
}

pub struct HarnessBuilder {
    image: ImageBlob,
    generator: FakeGenerator,
    store: InMemoryStore,
    geocoder: FakeGeocoder,
    normalizer: NormalizerConfig,
    naming: NamingStrategy,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            image: plain_jpeg(),
            generator: FakeGenerator::succeeding(draft("first-walk", "First walk")),
            store: InMemoryStore::default(),
            geocoder: FakeGeocoder::returning("Yoyogi Park, Shibuya, Tokyo"),
            normalizer: NormalizerConfig {
                allowed_email: Some(OWNER_EMAIL.to_string()),
                ..Default::default()
            },
            naming: NamingStrategy::TimeSlug,
        }
    }

    pub fn image(mut self, image: ImageBlob) -> Self {
        self.image = image;
        self
    }

    pub fn generator(mut self, generator: FakeGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn store(mut self, store: InMemoryStore) -> Self {
        self.store = store;
        self
    }

    pub fn geocoder(mut self, geocoder: FakeGeocoder) -> Self {
        self.geocoder = geocoder;
        self
    }

    pub fn normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn naming(mut self, naming: NamingStrategy) -> Self {
        self.naming = naming;
        self
    }

    pub fn build(self) -> Harness {
        self.build_with(|components, normalizer, namer| Pipeline::new(components, normalizer, namer))
    }

    pub fn build_with<F>(self, make: F) -> Harness
    where
        F: FnOnce(PipelineComponents, SubmissionNormalizer, ArtifactNamer) -> Pipeline,
    {
        let images = Arc::new(FakeImageSource::new(self.image));
        let generator = Arc::new(self.generator);
        let store = Arc::new(self.store);
        let status = Arc::new(RecordingStatus::default());
        let geocoder = Arc::new(self.geocoder);

        let location = GeolocationResolver::new(
            ["park", "travel", "dog-run", "shop"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            geocoder.clone(),
        );

        let components = PipelineComponents {
            image_source: images.clone(),
            location: Arc::new(location),
            generator: generator.clone(),
            store: store.clone(),
            status: status.clone(),
            clock: Arc::new(FixedClock(fixed_time())),
        };

        let pipeline = make(
            components,
            SubmissionNormalizer::new(self.normalizer),
            ArtifactNamer::new(self.naming),
        );

        Harness {
            pipeline,
            images,
            generator,
            store,
            status,
            geocoder,
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

pub fn draft(filename: &str, title: &str) -> ArticleDraft {
    ArticleDraft {
        filename: filename.to_string(),
        title: title.to_string(),
        content: "## A good day\nWe walked along the river.".to_string(),
        tags: vec!["walk".to_string(), "shiba".to_string()],
    }
}

/// Form answers keyed by the default question titles
pub fn form_event(answers: &[(&str, &str)]) -> FormEvent {
    FormEvent {
        named_values: answers
            .iter()
            .map(|(title, value)| (title.to_string(), vec![value.to_string()]))
            .collect(),
    }
}

/// Complete publish-requesting form from the allowed submitter
pub fn publish_form(category: &str, location: &str, memo: &str) -> FormEvent {
    form_event(&[
        ("Email Address", OWNER_EMAIL),
        ("Photo", "https://drive.google.com/open?id=1AbC_dEf-23"),
        ("Location", location),
        ("Category", category),
        ("Memo", memo),
        ("Publish", "publish"),
    ])
}

// ============================================================================
// Images
// ============================================================================

/// Minimal JPEG without metadata
pub fn plain_jpeg() -> ImageBlob {
    ImageBlob {
        bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0xFF, 0xD9],
        mime_type: "image/jpeg".to_string(),
        name: "IMG_0001.JPG".to_string(),
    }
}

/// JPEG whose EXIF block places it at 35°40'18.12"N 139°41'41.64"E
pub fn gps_jpeg() -> ImageBlob {
    ImageBlob {
        bytes: jpeg_with_gps(
            b'N',
            [(35, 1), (40, 1), (1812, 100)],
            b'E',
            [(139, 1), (41, 1), (4164, 100)],
        ),
        mime_type: "image/jpeg".to_string(),
        name: "IMG_0002.JPG".to_string(),
    }
}

/// Build a JPEG with an APP1 EXIF segment holding only GPS tags
///
/// TIFF layout (little endian): header at 0, IFD0 at 8 with the GPS IFD
/// pointer, GPS IFD at 26 with four entries, rationals at 80 and 104.
pub fn jpeg_with_gps(
    lat_ref: u8,
    lat: [(u32, u32); 3],
    lng_ref: u8,
    lng: [(u32, u32); 3],
) -> Vec<u8> {
    const GPS_IFD_OFFSET: u32 = 26;
    const LAT_OFFSET: u32 = 80;
    const LNG_OFFSET: u32 = 104;
    const ASCII: u16 = 2;
    const LONG: u16 = 4;
    const RATIONAL: u16 = 5;

    fn entry(tiff: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: [u8; 4]) {
        tiff.extend_from_slice(&tag.to_le_bytes());
        tiff.extend_from_slice(&kind.to_le_bytes());
        tiff.extend_from_slice(&count.to_le_bytes());
        tiff.extend_from_slice(&value);
    }

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());

    // IFD0: GPSInfo pointer only
    tiff.extend_from_slice(&1u16.to_le_bytes());
    entry(&mut tiff, 0x8825, LONG, 1, GPS_IFD_OFFSET.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());
    assert_eq!(tiff.len(), GPS_IFD_OFFSET as usize);

    // GPS IFD
    tiff.extend_from_slice(&4u16.to_le_bytes());
    entry(&mut tiff, 0x0001, ASCII, 2, [lat_ref, 0, 0, 0]);
    entry(&mut tiff, 0x0002, RATIONAL, 3, LAT_OFFSET.to_le_bytes());
    entry(&mut tiff, 0x0003, ASCII, 2, [lng_ref, 0, 0, 0]);
    entry(&mut tiff, 0x0004, RATIONAL, 3, LNG_OFFSET.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());
    assert_eq!(tiff.len(), LAT_OFFSET as usize);

    for (num, den) in lat.iter().chain(lng.iter()) {
        tiff.extend_from_slice(&num.to_le_bytes());
        tiff.extend_from_slice(&den.to_le_bytes());
    }
    assert_eq!(tiff.len(), 128);

    let segment_len = (2 + 6 + tiff.len()) as u16;
    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
    jpeg.extend_from_slice(&segment_len.to_be_bytes());
    jpeg.extend_from_slice(b"Exif\0\0");
    jpeg.extend_from_slice(&tiff);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

// ============================================================================
// HTTP
// ============================================================================

/// Serve `router` on an ephemeral local port; returns `http://127.0.0.1:{port}`
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
