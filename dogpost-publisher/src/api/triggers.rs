//! Trigger endpoints
//!
//! Each request carries one form-submission or sheet-edit event and runs
//! the pipeline to completion before responding.
//!
//! Response codes:
//! - 200 `published` or `failed` (failures are reported on the status
//!   surface, not as an error page)
//! - 202 `skipped` (not a publish request)
//! - 403 unauthorized submitter (status surface untouched)

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::services::normalizer::{FormEvent, SheetEditEvent, TriggerEvent};
use crate::workflow::PipelineOutcome;
use crate::AppState;

/// Trigger response body
#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResponse {
    /// `published`, `skipped` or `failed`
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// POST /triggers/form
pub async fn form_trigger(
    State(state): State<AppState>,
    Json(event): Json<FormEvent>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    run_trigger(&state, TriggerEvent::Form(event)).await
}

/// POST /triggers/sheet-edit
pub async fn sheet_edit_trigger(
    State(state): State<AppState>,
    Json(event): Json<SheetEditEvent>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    run_trigger(&state, TriggerEvent::SheetEdit(event)).await
}

async fn run_trigger(
    state: &AppState,
    event: TriggerEvent,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    let outcome = state.pipeline.process(&event).await;

    let (status, response) = match outcome {
        PipelineOutcome::Published {
            title, post_path, ..
        } => (
            StatusCode::OK,
            TriggerResponse {
                outcome: "published".to_string(),
                title: Some(title),
                post_path: Some(post_path),
                message: None,
            },
        ),
        PipelineOutcome::Skipped { reason } => (
            StatusCode::ACCEPTED,
            TriggerResponse {
                outcome: "skipped".to_string(),
                title: None,
                post_path: None,
                message: Some(reason),
            },
        ),
        PipelineOutcome::Unauthorized { .. } => {
            return Err(ApiError::Forbidden(
                "Submitter is not allowed to publish".to_string(),
            ));
        }
        PipelineOutcome::Failed { message, .. } => {
            state.record_error(message.clone()).await;
            (
                StatusCode::OK,
                TriggerResponse {
                    outcome: "failed".to_string(),
                    title: None,
                    post_path: None,
                    message: Some(message),
                },
            )
        }
    };

    Ok((status, Json(response)))
}

/// Build trigger routes
pub fn trigger_routes() -> Router<AppState> {
    Router::new()
        .route("/triggers/form", post(form_trigger))
        .route("/triggers/sheet-edit", post(sheet_edit_trigger))
}
