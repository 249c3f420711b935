//! Status surface endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::types::StatusMarker;
use crate::AppState;

/// Current marker, as text and as structured state
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// e.g. `✅ Park day`; null before the first submission
    pub status: Option<String>,
    pub marker: Option<StatusMarker>,
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let marker = state.status.current().await;
    Json(StatusResponse {
        status: marker.as_ref().map(ToString::to_string),
        marker,
    })
}

pub fn status_routes() -> Router<AppState> {
    Router::new().route("/status", get(get_status))
}
