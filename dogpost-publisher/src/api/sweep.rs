//! Folder sweep endpoint

use axum::{extract::State, routing::post, Json, Router};
use tracing::error;

use crate::error::{ApiError, ApiResult};
use crate::services::folder_sweep::SweepReport;
use crate::AppState;

/// POST /sweep
///
/// Runs one sweep of the watch folder and returns its report.
pub async fn run_sweep(State(state): State<AppState>) -> ApiResult<Json<SweepReport>> {
    let sweeper = state
        .sweeper
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("Folder sweep is not configured".to_string()))?;

    match sweeper.sweep().await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            error!("Sweep failed: {}", e);
            state.record_error(e.to_string()).await;
            Err(ApiError::Internal(e.to_string()))
        }
    }
}

pub fn sweep_routes() -> Router<AppState> {
    Router::new().route("/sweep", post(run_sweep))
}
