//! External collaborator contracts
//!
//! Everything the engine talks to — text generation, speech synthesis, the
//! media source, settings — sits behind one of these traits. Provider
//! implementations live in the submodules; tests substitute mocks.

pub mod media;
pub mod settings;
pub mod speech;
pub mod text;

use std::sync::Arc;

use airwave_common::error::Result;
use airwave_common::types::TrackRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::clock::ElementSample;

pub use media::BusMediaController;
pub use settings::{InMemorySettings, Settings, SettingsUpdate};
pub use speech::{LocalServerSynthesizer, RemoteSynthesizer};
pub use text::{LocalServerGenerator, RemoteGenerator};

/// Synthesized announcement audio.
///
/// Cheap to clone; the encoded bytes are shared. `provider` is the id of the
/// synthesizer that produced it and participates in pending-work keying.
#[derive(Debug, Clone)]
pub struct AudioHandle {
    pub data: Arc<[u8]>,
    pub mime: String,
    pub provider: String,
}

impl AudioHandle {
    pub fn new(data: Vec<u8>, mime: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            data: Arc::from(data),
            mime: mime.into(),
            provider: provider.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Context passed to text generation.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    /// Local wall-clock time as "HH:MM", used to set the mood of the intro.
    pub time_of_day: Option<String>,
}

impl GenerationContext {
    pub fn now() -> Self {
        Self {
            time_of_day: Some(chrono::Local::now().format("%H:%M").to_string()),
        }
    }
}

/// Generates the spoken transition text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Stable identifier of this provider.
    fn provider_id(&self) -> &str;

    async fn generate(
        &self,
        prev: &TrackRef,
        next: &TrackRef,
        ctx: &GenerationContext,
    ) -> Result<String>;
}

/// Renders announcement text to audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Stable identifier; part of the pending-work key `(text, provider)`.
    fn provider_id(&self) -> &str;

    async fn synthesize(&self, text: &str) -> Result<AudioHandle>;
}

/// Pauses and resumes the underlying media source.
///
/// Both operations must be idempotent: pausing an already-paused source is a
/// no-op, as is resuming a playing one.
#[async_trait]
pub trait MediaController: Send + Sync {
    async fn pause(&self);
    async fn resume(&self);
    async fn is_paused(&self) -> bool;

    /// Record a resume that happened outside the engine (user action or the
    /// player's own watchdog). No command should be issued back.
    async fn note_external_resume(&self) {}
}

/// Read-only settings view.
///
/// Snapshots are taken at transition start; changes never apply mid-flight.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn snapshot(&self) -> Settings;
}

/// One observation delivered by the playback source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ObserverUpdate {
    /// The current track changed. `previous` is absent for the first track
    /// of a session. Position fields, when present, recalibrate the logical
    /// clock for the new track.
    TrackChanged {
        previous: Option<TrackRef>,
        current: TrackRef,
        upcoming: Option<TrackRef>,
        raw_position: Option<f64>,
        duration: Option<f64>,
    },

    /// The upcoming queue entry changed without a track change.
    QueueUpdated { upcoming: Option<TrackRef> },

    /// Raw position samples from the playback elements.
    Tick { samples: Vec<ElementSample> },

    /// Playback resumed outside the engine's control (user action, or the
    /// embedding player's own watchdog).
    ResumeSignal,
}

/// Source of playback observations.
#[async_trait]
pub trait PlaybackObserver: Send {
    /// Next observation, or `None` when the source is gone.
    async fn next_update(&mut self) -> Option<ObserverUpdate>;
}

/// Channel-backed observer; the HTTP ingest endpoints feed the sender side.
pub struct ChannelObserver {
    rx: mpsc::Receiver<ObserverUpdate>,
}

impl ChannelObserver {
    pub fn new(capacity: usize) -> (mpsc::Sender<ObserverUpdate>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl PlaybackObserver for ChannelObserver {
    async fn next_update(&mut self) -> Option<ObserverUpdate> {
        self.rx.recv().await
    }
}
