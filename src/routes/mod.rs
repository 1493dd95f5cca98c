//! HTTP routes

pub mod health;
pub mod upload;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/health", health::router())
        .nest("/api/v1/health", health::router())
        .nest("/api/v1/upload", upload::router(state.config().upload.max_payload_size))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
