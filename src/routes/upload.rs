//! Upload Routes
//!
//! HTTP endpoints in front of the upload orchestrator.
//!
//! Endpoints:
//! - POST /api/v1/upload[?sessionId=..] - Upload the raw request body
//! - GET /api/v1/upload/:upload_id - Get the record of an upload run

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;
use crate::state::AppState;
use crate::upload::{UploadRecord, UploadRequest, UploadResult};

// ============================================================================
// Error Response
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: String,
    code: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<u64>,
}

impl UploadError {
    /// HTTP status reported for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            UploadError::InsufficientCapacity { .. } => StatusCode::PAYMENT_REQUIRED,
            UploadError::SessionResolution(_)
            | UploadError::Preflight(_)
            | UploadError::Transfer(_) => StatusCode::BAD_GATEWAY,
            UploadError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            UploadError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            UploadError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> axum::response::Response {
        let (required, available) = match &self {
            UploadError::InsufficientCapacity { required, available } => {
                (Some(*required), Some(*available))
            }
            _ => (None, None),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.kind(),
            required,
            available,
        });

        (self.status_code(), body).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the upload router
///
/// Bodies above `max_payload_size` are refused with 413 before they reach
/// the orchestrator.
pub fn router(max_payload_size: u64) -> Router<AppState> {
    let limit = usize::try_from(max_payload_size).unwrap_or(usize::MAX);

    Router::new()
        .route("/", post(upload))
        .route("/:upload_id", get(get_upload))
        .layer(DefaultBodyLimit::max(limit))
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadQuery {
    session_id: Option<String>,
}

/// POST /api/v1/upload
///
/// Upload the body as one payload. Answers once the commitment is submitted;
/// confirmation is reported through GET /api/v1/upload/:upload_id.
async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResult>), UploadError> {
    let mut request = UploadRequest::new(body.to_vec());
    if let Some(session_id) = query.session_id.filter(|s| !s.is_empty()) {
        request = request.with_session(session_id);
    }

    let result = state.orchestrator().upload(request).await?;

    tracing::info!(
        upload_id = %result.upload_id,
        content_id = %result.content_id,
        session_id = %result.session_id,
        size = result.size,
        "Upload submitted"
    );

    Ok((StatusCode::ACCEPTED, Json(result)))
}

/// GET /api/v1/upload/:upload_id
///
/// Get the current record of an upload run.
async fn get_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<Json<UploadRecord>, (StatusCode, Json<ErrorResponse>)> {
    state.tracker().get_by_str(&upload_id).await.map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Upload not found: {}", upload_id),
                code: "UPLOAD_NOT_FOUND",
                required: None,
                available: None,
            }),
        )
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::events::NoopSink;
    use crate::network::mock::MockNetwork;
    use crate::upload::{UploadLock, UploadOrchestrator, UploadPhase};

    fn state_with(network: MockNetwork) -> AppState {
        let config = Config::default();
        let events = Arc::new(NoopSink);
        let orchestrator = UploadOrchestrator::new(
            Arc::new(network),
            UploadLock::new(events.clone()),
            events,
            config.upload.clone(),
        );
        AppState::new(config, orchestrator)
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_returns_result() {
        let app = crate::routes::app(state_with(MockNetwork::new()));

        let response = app.oneshot(post("/api/v1/upload", vec![7u8; 128])).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = json(response).await;
        assert_eq!(body["size"], 128);
        assert!(body["contentId"].as_str().unwrap().starts_with("mock-"));
        assert!(body["uploadId"].is_string());
    }

    #[tokio::test]
    async fn test_upload_record_is_queryable() {
        let state = state_with(MockNetwork::new());
        let app = crate::routes::app(state.clone());

        let response = app
            .clone()
            .oneshot(post("/api/v1/upload", vec![1u8; 100]))
            .await
            .unwrap();
        let upload_id = json(response).await["uploadId"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/upload/{}", upload_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let record = json(response).await;
        assert_eq!(record["id"], upload_id.as_str());
        let phase: UploadPhase = serde_json::from_value(record["phase"].clone()).unwrap();
        assert!(matches!(phase, UploadPhase::Submitted | UploadPhase::Confirmed));
    }

    #[tokio::test]
    async fn test_unknown_upload_is_not_found() {
        let app = crate::routes::app(state_with(MockNetwork::new()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/upload/not-a-run")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["code"], "UPLOAD_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_insufficient_capacity_maps_to_payment_required() {
        let app = crate::routes::app(state_with(MockNetwork::new().with_available(10)));

        let response = app.oneshot(post("/api/v1/upload", vec![0u8; 100])).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        let body = json(response).await;
        assert_eq!(body["code"], "INSUFFICIENT_CAPACITY");
        assert_eq!(body["required"], 100);
        assert_eq!(body["available"], 10);
    }

    #[tokio::test]
    async fn test_small_payload_is_bad_request() {
        let app = crate::routes::app(state_with(MockNetwork::new()));

        let response = app.oneshot(post("/api/v1/upload", vec![0u8; 10])).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["code"], "INVALID_PAYLOAD");
    }

    #[tokio::test]
    async fn test_resolution_failure_maps_to_bad_gateway() {
        let app = crate::routes::app(state_with(MockNetwork::new().without_providers()));

        let response = app.oneshot(post("/api/v1/upload", vec![0u8; 100])).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(json(response).await["code"], "SESSION_RESOLUTION");
    }

    #[tokio::test]
    async fn test_shutdown_maps_to_service_unavailable() {
        let state = state_with(MockNetwork::new());
        state.shutdown();
        let app = crate::routes::app(state);

        let response = app.oneshot(post("/api/v1/upload", vec![0u8; 100])).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health_reports_idle_lock() {
        let app = crate::routes::app(state_with(MockNetwork::new()));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["service"], "proofset-uploader");
        assert_eq!(body["uploadInFlight"], false);
    }
}
