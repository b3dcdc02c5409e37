//! HTTP API for the ledgerlift service.
//!
//! This module provides the REST endpoints for:
//! - Health monitoring
//! - Document upload, listing, and deletion
//! - Step-level progress polling
//! - CSV artifact download
//! - WebSocket progress push

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::pipeline::Dispatcher;
use crate::service::ExtractionService;
use crate::ws::handle_ws_connection;

pub mod documents;
use documents::{
    delete_document_handler, download_artifact_handler, get_document_handler,
    get_document_steps_handler, list_documents_handler, upload_document_handler,
};

/// Application state
pub struct AppState {
    pub service: Arc<ExtractionService>,
    pub dispatcher: Dispatcher,
    pub start_time: Instant,
}

/// Build the API router
pub fn router(service: Arc<ExtractionService>, dispatcher: Dispatcher) -> Router {
    let max_body_size = service.config.pipeline.max_document_size_bytes as usize;

    let state = Arc::new(AppState {
        service,
        dispatcher,
        start_time: Instant::now(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/documents", get(list_documents_handler))
        .route(
            "/documents",
            post(upload_document_handler).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/documents/{id}", get(get_document_handler))
        .route("/documents/{id}", delete(delete_document_handler))
        .route("/documents/{id}/steps", get(get_document_steps_handler))
        .route("/documents/{id}/download", get(download_artifact_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: String,
    uptime_seconds: u64,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state.service.clone()))
}
