//! Request handlers
//!
//! Observer ingestion endpoints translate the player shim's JSON into
//! [`ObserverUpdate`]s and push them at the engine's channel; a full channel
//! or stopped engine maps to 503 so the shim can back off.

use airwave_common::types::TrackRef;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::clock::ElementSample;
use crate::providers::{ObserverUpdate, SettingsStore, SettingsUpdate};
use crate::state::StatusSnapshot;

use super::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Status payload: engine snapshot plus ambient gauges.
#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub engine: StatusSnapshot,
    pub cache_entries: usize,
    pub enabled: bool,
}

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.engine.state.snapshot().await;
    let settings = state.settings.snapshot().await;
    Json(StatusResponse {
        engine,
        cache_entries: state.pipeline.cache_len(),
        enabled: settings.enabled,
    })
}

pub async fn get_settings(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.settings.snapshot().await)
}

pub async fn put_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> impl IntoResponse {
    Json(state.settings.apply(update).await)
}

#[derive(Debug, Deserialize)]
pub struct TrackChangedRequest {
    pub previous: Option<TrackRef>,
    pub current: TrackRef,
    #[serde(default)]
    pub upcoming: Option<TrackRef>,
    #[serde(default)]
    pub raw_position: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
}

pub async fn observer_track(
    State(state): State<AppState>,
    Json(req): Json<TrackChangedRequest>,
) -> impl IntoResponse {
    forward(
        &state,
        ObserverUpdate::TrackChanged {
            previous: req.previous,
            current: req.current,
            upcoming: req.upcoming,
            raw_position: req.raw_position,
            duration: req.duration,
        },
    )
    .await
}

#[derive(Debug, Deserialize)]
pub struct QueueUpdatedRequest {
    pub upcoming: Option<TrackRef>,
}

pub async fn observer_queue(
    State(state): State<AppState>,
    Json(req): Json<QueueUpdatedRequest>,
) -> impl IntoResponse {
    forward(
        &state,
        ObserverUpdate::QueueUpdated {
            upcoming: req.upcoming,
        },
    )
    .await
}

#[derive(Debug, Deserialize)]
pub struct TickRequest {
    pub samples: Vec<ElementSample>,
}

pub async fn observer_tick(
    State(state): State<AppState>,
    Json(req): Json<TickRequest>,
) -> impl IntoResponse {
    forward(
        &state,
        ObserverUpdate::Tick {
            samples: req.samples,
        },
    )
    .await
}

pub async fn observer_resume(State(state): State<AppState>) -> impl IntoResponse {
    forward(&state, ObserverUpdate::ResumeSignal).await
}

async fn forward(state: &AppState, update: ObserverUpdate) -> (StatusCode, Json<serde_json::Value>) {
    match state.observer_tx.try_send(update) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "accepted": true }))),
        Err(e) => {
            warn!(error = %e, "observer update rejected");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "accepted": false, "error": "engine unavailable" })),
            )
        }
    }
}
