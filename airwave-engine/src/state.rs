//! Shared engine state
//!
//! One `Arc<SharedState>` is cloned into the engine loop, the HTTP handlers,
//! and the SSE stream. Read-heavy fields sit behind RwLocks; counters are
//! atomics so the status endpoint never contends with the engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use airwave_common::events::EventBus;
use airwave_common::types::{TrackRef, TransitionKey};
use serde::Serialize;
use tokio::sync::RwLock;

/// Where the engine currently is in the announce cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPhase {
    /// No transition in flight.
    Idle,
    /// Pre-warm dispatched; playback still running.
    PreWarmScheduled,
    /// Playback paused, announcement being produced.
    Locked,
    /// Announcement audio playing.
    Announcing,
    /// Resume issued, waiting for the track change to land.
    Resuming,
}

/// Snapshot returned by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub phase: TransitionPhase,
    pub current: Option<TrackRef>,
    pub upcoming: Option<TrackRef>,
    pub active_key: Option<TransitionKey>,
    pub announcements_total: u64,
    pub forced_resumes_total: u64,
    pub uptime_secs: u64,
}

pub struct SharedState {
    pub event_bus: EventBus,
    pub phase: RwLock<TransitionPhase>,
    pub current: RwLock<Option<TrackRef>>,
    pub upcoming: RwLock<Option<TrackRef>>,
    pub active_key: RwLock<Option<TransitionKey>>,
    pub announcements_total: AtomicU64,
    pub forced_resumes_total: AtomicU64,
    started_at: std::time::Instant,
}

impl SharedState {
    pub fn new(event_bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            event_bus,
            phase: RwLock::new(TransitionPhase::Idle),
            current: RwLock::new(None),
            upcoming: RwLock::new(None),
            active_key: RwLock::new(None),
            announcements_total: AtomicU64::new(0),
            forced_resumes_total: AtomicU64::new(0),
            started_at: std::time::Instant::now(),
        })
    }

    pub async fn set_phase(&self, phase: TransitionPhase) {
        *self.phase.write().await = phase;
    }

    pub async fn phase(&self) -> TransitionPhase {
        *self.phase.read().await
    }

    pub fn record_announcement(&self) {
        self.announcements_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forced_resume(&self) {
        self.forced_resumes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            phase: *self.phase.read().await,
            current: self.current.read().await.clone(),
            upcoming: self.upcoming.read().await.clone(),
            active_key: self.active_key.read().await.clone(),
            announcements_total: self.announcements_total.load(Ordering::Relaxed),
            forced_resumes_total: self.forced_resumes_total.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_snapshot_reflects_state() {
        let state = SharedState::new(EventBus::new(16));
        assert_eq!(state.phase().await, TransitionPhase::Idle);

        state.set_phase(TransitionPhase::Locked).await;
        *state.current.write().await = Some(TrackRef::new("Hello", "Adele"));
        state.record_announcement();
        state.record_forced_resume();

        let snap = state.snapshot().await;
        assert_eq!(snap.phase, TransitionPhase::Locked);
        assert_eq!(snap.current.unwrap().title, "Hello");
        assert_eq!(snap.announcements_total, 1);
        assert_eq!(snap.forced_resumes_total, 1);
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        let json = serde_json::to_string(&TransitionPhase::PreWarmScheduled).unwrap();
        assert_eq!(json, "\"pre_warm_scheduled\"");
    }
}
