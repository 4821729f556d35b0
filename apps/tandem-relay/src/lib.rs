pub mod cli;
pub mod config;
pub mod error;
pub mod matchmaker;
pub mod registry;
pub mod websocket;

use axum::{response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::websocket::{websocket_handler, RelayState};

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Assemble the relay router. Exposed so tests can mount it on an
/// ephemeral port without going through the binary.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
