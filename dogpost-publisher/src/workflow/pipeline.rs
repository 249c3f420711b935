//! Pipeline Orchestrator
//!
//! Drives one submission through normalization, location, generation,
//! naming and the two uploads, and keeps the status surface in step.
//!
//! # Error Handling
//! - Normalization is local. Skipped triggers and unauthorized submitters
//!   return before the status surface is touched.
//! - Every later failure sets `❌ {error}` and ends the run; nothing is
//!   retried here (model fallback lives in the generator).
//! - A failed post upload after a successful image upload leaves the image
//!   committed. There is no rollback.
//!
//! # Example
//! ```rust,ignore
//! let pipeline = Pipeline::new(components, normalizer, namer);
//! let outcome = pipeline.process(&TriggerEvent::Form(form)).await;
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{build_markdown, PipelineOutcome, PipelineStage, WorkflowEvent};
use crate::error::{PipelineError, PipelineResult};
use crate::services::artifact_namer::ArtifactNamer;
use crate::services::normalizer::{Normalized, SubmissionNormalizer, TriggerEvent};
use crate::types::{
    ArtifactNames, Clock, ContentContext, ContentGenerator, DocumentStore, ImageSource,
    LocationOutcome, LocationResolver, StatusMarker, StatusSurface, SubmissionRecord,
    TriggerSource,
};

/// External collaborators of the pipeline
#[derive(Clone)]
pub struct PipelineComponents {
    pub image_source: Arc<dyn ImageSource>,
    pub location: Arc<dyn LocationResolver>,
    pub generator: Arc<dyn ContentGenerator>,
    pub store: Arc<dyn DocumentStore>,
    pub status: Arc<dyn StatusSurface>,
    pub clock: Arc<dyn Clock>,
}

/// Submission pipeline
pub struct Pipeline {
    components: PipelineComponents,
    normalizer: SubmissionNormalizer,
    namer: ArtifactNamer,
    /// Held for a whole run: one submission at a time per process
    run_lock: Mutex<()>,
    event_tx: Option<mpsc::Sender<WorkflowEvent>>,
}

/// Fields a successful run reports
struct Published {
    title: String,
    names: ArtifactNames,
}

impl Pipeline {
    pub fn new(
        components: PipelineComponents,
        normalizer: SubmissionNormalizer,
        namer: ArtifactNamer,
    ) -> Self {
        Self {
            components,
            normalizer,
            namer,
            run_lock: Mutex::new(()),
            event_tx: None,
        }
    }

    /// Create pipeline with event channel for progress reporting
    pub fn with_events(
        components: PipelineComponents,
        normalizer: SubmissionNormalizer,
        namer: ArtifactNamer,
        event_tx: mpsc::Sender<WorkflowEvent>,
    ) -> Self {
        Self {
            event_tx: Some(event_tx),
            ..Self::new(components, normalizer, namer)
        }
    }

    /// Run one trigger to a terminal outcome
    pub async fn process(&self, event: &TriggerEvent) -> PipelineOutcome {
        let _run = self.run_lock.lock().await;
        let source = event.source();

        self.emit_event(WorkflowEvent::Received {
            source,
            timestamp: chrono::Utc::now().timestamp(),
        })
        .await;

        let record = match self.normalizer.normalize(event) {
            Ok(Normalized::Ready(record)) => record,
            Ok(Normalized::Skipped { reason }) => {
                debug!(source = %source, "Trigger skipped: {}", reason);
                return PipelineOutcome::Skipped { reason };
            }
            Err(PipelineError::Unauthorized { identity }) => {
                warn!(source = %source, "Submission halted by authorization gate");
                return PipelineOutcome::Unauthorized { identity };
            }
            Err(err @ PipelineError::PublishNotRequested(_)) => {
                info!(source = %source, "Submission rejected: {}", err);
                return PipelineOutcome::Failed {
                    submission_id: None,
                    stage: PipelineStage::Received,
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                };
            }
            Err(err) => {
                // Publish was requested, so the submitter needs to see this
                return self.fail(None, source, PipelineStage::Received, err).await;
            }
        };

        let mut stage = PipelineStage::Received;
        match self.run(&record, &mut stage).await {
            Ok(published) => PipelineOutcome::Published {
                submission_id: record.submission_id,
                title: published.title,
                image_path: published.names.image_path,
                post_path: published.names.post_path,
            },
            Err(err) => {
                self.fail(Some(record.submission_id), record.source, stage, err)
                    .await
            }
        }
    }

    /// Stages after normalization; `stage` tracks the last stage reached
    async fn run(
        &self,
        record: &SubmissionRecord,
        stage: &mut PipelineStage,
    ) -> PipelineResult<Published> {
        let id = record.submission_id;
        let c = &self.components;
        info!(submission_id = %id, source = %record.source, image = %record.image_ref, "Processing submission");

        self.advance(id, stage, PipelineStage::Normalized).await;
        c.status.set(&StatusMarker::InProgress).await?;

        let image = c.image_source.fetch(&record.image_ref).await?;

        let location = c
            .location
            .resolve(
                &image,
                record.category.as_deref(),
                record.location.as_deref(),
            )
            .await;
        let next = match location {
            LocationOutcome::Resolved(_) => PipelineStage::LocationResolved,
            LocationOutcome::Skipped => PipelineStage::LocationSkipped,
        };
        self.advance(id, stage, next).await;
        let resolution = location.resolution();

        let context = ContentContext {
            location_text: resolution.prompt_text(),
            category: record.category.clone(),
            memo: record.memo.clone(),
        };
        let draft = c.generator.generate(&image, &context).await?;
        self.advance(id, stage, PipelineStage::ContentGenerated).await;

        let published_at = c.clock.now();
        let names = self.namer.name(&image, &draft.filename, published_at);
        debug!(submission_id = %id, base_name = %names.base_name, "Artifacts named");
        self.advance(id, stage, PipelineStage::Named).await;

        c.store
            .upload(
                &names.image_path,
                &BASE64.encode(&image.bytes),
                &image_commit_message(&names),
            )
            .await?;
        self.advance(id, stage, PipelineStage::ImageUploaded).await;

        let markdown = build_markdown(
            &draft,
            &names,
            record.category.as_deref(),
            &resolution,
            published_at,
        );
        c.store
            .upload(
                &names.post_path,
                &BASE64.encode(markdown.as_bytes()),
                &post_commit_message(&draft.title),
            )
            .await?;
        self.advance(id, stage, PipelineStage::PostUploaded).await;

        c.status
            .set(&StatusMarker::Published {
                title: draft.title.clone(),
            })
            .await?;
        self.advance(id, stage, PipelineStage::Published).await;

        info!(submission_id = %id, path = %names.post_path, title = %draft.title, "Published");
        Ok(Published {
            title: draft.title,
            names,
        })
    }

    /// Report a failure on every channel and build the outcome
    async fn fail(
        &self,
        submission_id: Option<Uuid>,
        source: TriggerSource,
        stage: PipelineStage,
        err: PipelineError,
    ) -> PipelineOutcome {
        let message = err.to_string();
        error!(
            submission_id = ?submission_id,
            stage = %stage,
            source = %source,
            kind = err.kind(),
            "Submission failed: {}",
            message
        );

        if let Err(status_err) = self
            .components
            .status
            .set(&StatusMarker::Failed {
                message: message.clone(),
            })
            .await
        {
            error!("Failed to record failure status: {}", status_err);
        }

        if let Some(submission_id) = submission_id {
            self.emit_event(WorkflowEvent::Failed {
                submission_id,
                stage,
                kind: err.kind().to_string(),
                message: message.clone(),
            })
            .await;
            self.emit_event(WorkflowEvent::StageEntered {
                submission_id,
                stage: PipelineStage::Failed,
                timestamp: chrono::Utc::now().timestamp(),
            })
            .await;
        }

        PipelineOutcome::Failed {
            submission_id,
            stage,
            kind: err.kind().to_string(),
            message,
        }
    }

    async fn advance(&self, submission_id: Uuid, stage: &mut PipelineStage, next: PipelineStage) {
        *stage = next;
        debug!(submission_id = %submission_id, stage = %next, "Stage entered");
        self.emit_event(WorkflowEvent::StageEntered {
            submission_id,
            stage: next,
            timestamp: chrono::Utc::now().timestamp(),
        })
        .await;
    }

    /// Emit workflow event if channel configured
    async fn emit_event(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}

fn image_commit_message(names: &ArtifactNames) -> String {
    format!("Add image: {}", names.image_file_name())
}

fn post_commit_message(title: &str) -> String {
    format!("Add post: {}", title)
}

// ============================================================================
// Tests
// ============================================================================
