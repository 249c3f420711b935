//! Submission workflow
//!
//! One submission runs start-to-finish in a single pass:
//!
//! `Received → Normalized → LocationResolved | LocationSkipped →
//! ContentGenerated → Named → ImageUploaded → PostUploaded → Published`
//!
//! Any stage may instead end in `Failed`. Each transition is logged and,
//! when a channel is attached, emitted as a [`WorkflowEvent`].

pub mod markdown;
pub mod pipeline;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::TriggerSource;

pub use markdown::build_markdown;
pub use pipeline::{Pipeline, PipelineComponents};

/// Pipeline stage of one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    Normalized,
    LocationResolved,
    LocationSkipped,
    ContentGenerated,
    Named,
    ImageUploaded,
    PostUploaded,
    Published,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::Normalized => "normalized",
            PipelineStage::LocationResolved => "location_resolved",
            PipelineStage::LocationSkipped => "location_skipped",
            PipelineStage::ContentGenerated => "content_generated",
            PipelineStage::Named => "named",
            PipelineStage::ImageUploaded => "image_uploaded",
            PipelineStage::PostUploaded => "post_uploaded",
            PipelineStage::Published => "published",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Progress events for observers of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkflowEvent {
    /// A trigger arrived (before normalization, so no submission ID yet)
    Received {
        source: TriggerSource,
        /// Unix timestamp (seconds since epoch)
        timestamp: i64,
    },

    /// Submission entered a stage
    StageEntered {
        submission_id: Uuid,
        stage: PipelineStage,
        timestamp: i64,
    },

    /// Submission failed during `stage`
    Failed {
        submission_id: Uuid,
        stage: PipelineStage,
        /// [`crate::error::PipelineError::kind`]
        kind: String,
        message: String,
    },
}

/// Terminal result of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Image and post committed
    Published {
        submission_id: Uuid,
        title: String,
        image_path: String,
        post_path: String,
    },
    /// Trigger was not a publish request
    Skipped { reason: String },
    /// Submitter rejected by the authorization gate
    Unauthorized { identity: Option<String> },
    /// Pipeline aborted
    Failed {
        submission_id: Option<Uuid>,
        stage: PipelineStage,
        kind: String,
        message: String,
    },
}

impl PipelineOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, PipelineOutcome::Published { .. })
    }
}
