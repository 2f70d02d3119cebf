//! Announcement audio playback
//!
//! [`AnnouncementSink`] abstracts the output device so the orchestrator and
//! tests never depend on real audio hardware. [`RodioSink`] is the production
//! implementation; it decodes the encoded bytes in an [`AudioHandle`] and
//! blocks a dedicated thread until the clip finishes or is stopped.
//!
//! [`AnnouncementPlayer`] serializes playback: at most one announcement is
//! audible at a time and starting a new one stops its predecessor.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use airwave_common::error::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::providers::AudioHandle;

/// Plays one announcement clip to completion.
#[async_trait]
pub trait AnnouncementSink: Send + Sync {
    /// Play the clip; resolves when playback finishes or is stopped.
    async fn play(&self, audio: &AudioHandle) -> Result<()>;

    /// Stop the currently playing clip, if any. Idempotent.
    fn stop(&self);
}

/// Sink backed by the default audio output device.
///
/// The rodio output stream is not `Send`, so each play builds it inside a
/// blocking task and keeps it alive for the clip's duration. Only the
/// `rodio::Sink` handle is shared out, for `stop`.
pub struct RodioSink {
    current: Arc<Mutex<Option<Arc<rodio::Sink>>>>,
}

impl RodioSink {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(None)),
        }
    }
}

impl Default for RodioSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnnouncementSink for RodioSink {
    async fn play(&self, audio: &AudioHandle) -> Result<()> {
        let data = Arc::clone(&audio.data);
        let slot = Arc::clone(&self.current);

        let outcome = tokio::task::spawn_blocking(move || -> Result<()> {
            let (_stream, handle) = rodio::OutputStream::try_default()
                .map_err(|e| Error::Playback(format!("opening output device: {e}")))?;
            let sink = rodio::Sink::try_new(&handle)
                .map_err(|e| Error::Playback(format!("creating sink: {e}")))?;
            let sink = Arc::new(sink);

            let source = rodio::Decoder::new(Cursor::new(data))
                .map_err(|e| Error::Playback(format!("decoding announcement audio: {e}")))?;

            *slot.lock().unwrap() = Some(Arc::clone(&sink));
            sink.append(source);
            sink.sleep_until_end();
            slot.lock().unwrap().take();
            Ok(())
        })
        .await
        .map_err(|e| Error::Playback(format!("playback task failed: {e}")))?;

        outcome
    }

    fn stop(&self) {
        if let Some(sink) = self.current.lock().unwrap().take() {
            debug!("stopping in-flight announcement");
            sink.stop();
        }
    }
}

/// Serializes announcement playback over a sink.
pub struct AnnouncementPlayer {
    sink: Arc<dyn AnnouncementSink>,
    playing: tokio::sync::Mutex<()>,
}

impl AnnouncementPlayer {
    pub fn new(sink: Arc<dyn AnnouncementSink>) -> Self {
        Self {
            sink,
            playing: tokio::sync::Mutex::new(()),
        }
    }

    /// Play `audio`, stopping any announcement still in flight first.
    pub async fn play(&self, audio: &AudioHandle) -> Result<()> {
        // Unblocks a predecessor holding the lock; its play resolves early.
        self.sink.stop();
        let _guard = self.playing.lock().await;

        info!(
            bytes = audio.len(),
            mime = %audio.mime,
            provider = %audio.provider,
            "playing announcement"
        );
        match self.sink.play(audio).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "announcement playback failed");
                Err(e)
            }
        }
    }

    pub fn stop(&self) {
        self.sink.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeSink {
        plays: AtomicUsize,
        stops: AtomicUsize,
        delay: Duration,
    }

    impl FakeSink {
        fn new(delay: Duration) -> Self {
            Self {
                plays: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl AnnouncementSink for FakeSink {
        async fn play(&self, _audio: &AudioHandle) -> Result<()> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn clip() -> AudioHandle {
        AudioHandle::new(vec![0u8; 16], "audio/wav", "test")
    }

    #[tokio::test(start_paused = true)]
    async fn test_player_serializes_playback() {
        let sink = Arc::new(FakeSink::new(Duration::from_millis(100)));
        let player = Arc::new(AnnouncementPlayer::new(
            Arc::clone(&sink) as Arc<dyn AnnouncementSink>
        ));

        let a = {
            let player = Arc::clone(&player);
            tokio::spawn(async move { player.play(&clip()).await })
        };
        let b = {
            let player = Arc::clone(&player);
            tokio::spawn(async move { player.play(&clip()).await })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(sink.plays.load(Ordering::SeqCst), 2);
        // Each play() stops whatever was in flight before it.
        assert_eq!(sink.stops.load(Ordering::SeqCst), 2);
    }
}
