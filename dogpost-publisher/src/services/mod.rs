//! Service modules for the publishing pipeline
//!
//! Implementations behind the seam traits in [`crate::types`], plus the
//! pure helpers (normalization, naming, prompt) they share.

pub mod artifact_namer;
pub mod folder_sweep;
pub mod gemini_client;
pub mod geolocation;
pub mod github_client;
pub mod image_source;
pub mod normalizer;
pub mod prompt;
pub mod status_surface;

pub use artifact_namer::{ArtifactNamer, NamingStrategy};
pub use folder_sweep::{FolderSweeper, SweepConfig, SweepError, SweepReport};
pub use gemini_client::{GeminiClient, GeminiConfig, ModelStrategy};
pub use geolocation::{GeolocationConfig, GeolocationResolver, NominatimGeocoder, ReverseGeocoder};
pub use github_client::{GitHubClient, GitHubConfig};
pub use image_source::{ImageFetcher, ImageSourceConfig};
pub use normalizer::{
    FolderEntry, FormEvent, NormalizerConfig, PublishGateMode, SheetEditEvent,
    SubmissionNormalizer, TriggerEvent,
};
pub use status_surface::{CompositeStatus, FileStatus, LogStatus, SharedStatus};
