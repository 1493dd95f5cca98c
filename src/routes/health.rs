//! Health check endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    /// Whether an upload currently holds the upload lock
    pub upload_in_flight: bool,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: "proofset-uploader",
        upload_in_flight: state.orchestrator().is_busy(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}
