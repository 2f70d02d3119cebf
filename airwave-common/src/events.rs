//! Event types for the Airwave event system
//!
//! Provides the closed event enum shared by the engine, the HTTP/SSE surface,
//! and the embedding player shim, plus the EventBus they communicate over.
//!
//! # Architecture
//!
//! Airwave uses hybrid communication:
//! - **EventBus** (tokio::broadcast): one-to-many event broadcasting
//! - **Command channels** (tokio::mpsc): request → single handler
//! - **Shared state** (Arc<RwLock<T>>): read-heavy access
//!
//! Every consumer matches the enum exhaustively; the union is closed and each
//! variant's payload is a fixed record.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{ResumeReason, TrackRef, TransitionKey};

/// Which safety layer forced a resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutLayer {
    /// Short request-phase watchdog: announcement never became ready.
    Request,
    /// Primary safety timer (armed at lock).
    Primary,
    /// Extended safety timer (armed once playback start is confirmed).
    Extended,
}

impl std::fmt::Display for TimeoutLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutLayer::Request => write!(f, "request"),
            TimeoutLayer::Primary => write!(f, "primary"),
            TimeoutLayer::Extended => write!(f, "extended"),
        }
    }
}

/// Commands the engine issues to the embedding player (delivered over SSE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerCommand {
    Pause,
    Resume,
}

/// Airwave event types
///
/// Events are broadcast via the EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AirwaveEvent {
    /// The observed current track changed.
    ///
    /// `prev` is absent for the first track of a session.
    TrackChanged {
        prev: Option<TrackRef>,
        next: Option<TrackRef>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The upcoming queue entry changed while the current track kept playing.
    QueueUpdated {
        next: Option<TrackRef>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The logical clock crossed the trigger window for a transition.
    ApproachingEnd {
        key: TransitionKey,
        time_remaining_secs: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A pre-warm request was dispatched to the generation pipeline.
    PreWarmDispatched {
        key: TransitionKey,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback was paused and the transition entered the Locked phase.
    TransitionLocked {
        key: TransitionKey,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Announcement playback started.
    ///
    /// The extended safety timer supersedes the primary one at this point.
    TtsStarted {
        key: TransitionKey,
        cached: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Announcement finished (success or handled failure).
    AnnouncementDone {
        key: TransitionKey,
        ok: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A safety timer forced a resume while a transition was in flight.
    ForcedResume {
        key: TransitionKey,
        layer: TimeoutLayer,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A resume command was issued (for any reason).
    Resume {
        reason: ResumeReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Command for the embedding player (pause/resume the media source).
    PlayerCommand {
        command: PlayerCommand,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl AirwaveEvent {
    /// Get event type as string for SSE event naming and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            AirwaveEvent::TrackChanged { .. } => "TrackChanged",
            AirwaveEvent::QueueUpdated { .. } => "QueueUpdated",
            AirwaveEvent::ApproachingEnd { .. } => "ApproachingEnd",
            AirwaveEvent::PreWarmDispatched { .. } => "PreWarmDispatched",
            AirwaveEvent::TransitionLocked { .. } => "TransitionLocked",
            AirwaveEvent::TtsStarted { .. } => "TtsStarted",
            AirwaveEvent::AnnouncementDone { .. } => "AnnouncementDone",
            AirwaveEvent::ForcedResume { .. } => "ForcedResume",
            AirwaveEvent::Resume { .. } => "Resume",
            AirwaveEvent::PlayerCommand { .. } => "PlayerCommand",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for application-wide events
///
/// Built on tokio::broadcast, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AirwaveEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events.
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<AirwaveEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` when no subscriber is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AirwaveEvent,
    ) -> Result<usize, broadcast::error::SendError<AirwaveEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscribers case.
    ///
    /// Used for informational events where nobody listening is fine.
    pub fn emit_lossy(&self, event: AirwaveEvent) {
        let _ = self.tx.send(event);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(100);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(100);
        let event = AirwaveEvent::Resume {
            reason: ResumeReason::External,
            timestamp: chrono::Utc::now(),
        };

        // Should return error when no subscribers
        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = Arc::new(EventBus::new(100));
        let mut rx = bus.subscribe();

        let key = TransitionKey::from_titles("A", "B");
        let event = AirwaveEvent::TransitionLocked {
            key: key.clone(),
            timestamp: chrono::Utc::now(),
        };

        assert!(bus.emit(event).is_ok());

        let received = rx.recv().await.unwrap();
        match received {
            AirwaveEvent::TransitionLocked { key: got, .. } => assert_eq!(got, key),
            _ => panic!("Wrong event type received"),
        }
    }

    #[tokio::test]
    async fn test_eventbus_emit_lossy() {
        let bus = EventBus::new(100);
        // Should not panic even without subscribers
        bus.emit_lossy(AirwaveEvent::QueueUpdated {
            next: None,
            timestamp: chrono::Utc::now(),
        });
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = AirwaveEvent::ApproachingEnd {
            key: TransitionKey::from_titles("A", "B"),
            time_remaining_secs: 2.1,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"ApproachingEnd\""));
        assert!(json.contains("\"key\":\"A::B\""));

        let back: AirwaveEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "ApproachingEnd");
    }

    #[test]
    fn test_event_type_names() {
        let event = AirwaveEvent::PlayerCommand {
            command: PlayerCommand::Pause,
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(event.event_type(), "PlayerCommand");

        let event = AirwaveEvent::ForcedResume {
            key: TransitionKey::from_titles("A", "B"),
            layer: TimeoutLayer::Primary,
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(event.event_type(), "ForcedResume");
    }
}
