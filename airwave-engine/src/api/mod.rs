//! HTTP/SSE surface
//!
//! The engine is embedded-player-agnostic: the player shim feeds
//! observations in over `POST /api/v1/observer/*` and receives pause/resume
//! commands (and everything else the engine emits) back over the
//! `/api/v1/events` SSE stream.

mod handlers;
mod sse;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::EngineHandle;
use crate::pipeline::GenerationPipeline;
use crate::providers::{InMemorySettings, ObserverUpdate};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub observer_tx: mpsc::Sender<ObserverUpdate>,
    pub settings: Arc<InMemorySettings>,
    pub pipeline: Arc<GenerationPipeline>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/status", get(handlers::status))
        .route("/api/v1/events", get(sse::events))
        .route(
            "/api/v1/settings",
            get(handlers::get_settings).put(handlers::put_settings),
        )
        .route(
            "/api/v1/observer/track-changed",
            post(handlers::observer_track),
        )
        .route(
            "/api/v1/observer/queue-updated",
            post(handlers::observer_queue),
        )
        .route("/api/v1/observer/tick", post(handlers::observer_tick))
        .route("/api/v1/observer/resume", post(handlers::observer_resume))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
