//! Transition orchestrator
//!
//! Owns the announce cycle for one playback session:
//!
//! 1. Ticks drive the logical clock; crossing the pre-warm threshold
//!    dispatches a speculative generation, crossing the trigger window
//!    pauses playback and locks a transition.
//! 2. While locked, the pipeline produces the announcement; request and
//!    primary safety timers guard the paused window.
//! 3. Announcement playback arms the extended timer; completion (or any
//!    handled failure) resumes playback and marks the key as alerted.
//!
//! The engine is a single task over three channels (commands, timer firings,
//! observer updates); all transition state is confined to it. Every resume
//! path is explicit and every timer firing carries the transition id it was
//! armed for, so nothing stale can act on a later transition.

pub mod timers;

use std::sync::Arc;

use airwave_common::config::EngineConfig;
use airwave_common::events::{AirwaveEvent, TimeoutLayer};
use airwave_common::types::{ResumeReason, TrackRef, TransitionKey};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{ElementSample, LogicalClock};
use crate::pipeline::{Announcement, GenerationPipeline};
use crate::playback::AnnouncementPlayer;
use crate::providers::{
    MediaController, ObserverUpdate, PlaybackObserver, Settings, SettingsStore, SpeechSynthesizer,
};
use crate::session::SessionState;
use crate::state::{SharedState, TransitionPhase};
use timers::{TimerBank, TimerEvent};

/// Commands delivered to the engine loop from spawned work and the outside.
#[derive(Debug)]
pub enum EngineCommand {
    /// The pipeline finished producing an announcement.
    AnnouncementReady {
        transition_id: Uuid,
        announcement: Announcement,
    },
    /// Announcement playback finished (or never started).
    PlaybackFinished { transition_id: Uuid, ok: bool },
    Shutdown,
}

/// Cloneable handle for talking to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    pub state: Arc<SharedState>,
}

impl EngineHandle {
    pub async fn shutdown(&self) {
        let _ = self.tx.send(EngineCommand::Shutdown).await;
    }
}

/// One in-flight transition.
struct ActiveTransition {
    id: Uuid,
    key: TransitionKey,
}

pub struct TransitionEngine {
    core: EngineCore,
    cmd_rx: mpsc::Receiver<EngineCommand>,
    timer_rx: mpsc::Receiver<TimerEvent>,
    observer: Box<dyn PlaybackObserver>,
}

impl TransitionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        state: Arc<SharedState>,
        pipeline: Arc<GenerationPipeline>,
        media: Arc<dyn MediaController>,
        player: Arc<AnnouncementPlayer>,
        settings: Arc<dyn SettingsStore>,
        fallback_synth: Option<Arc<dyn SpeechSynthesizer>>,
        observer: Box<dyn PlaybackObserver>,
    ) -> (Self, EngineHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (timer_tx, timer_rx) = mpsc::channel(8);

        let clock = LogicalClock::new(
            config.min_track_duration_secs,
            config.past_end_tolerance_secs,
        );
        let session = SessionState::new(config.bounded_set_cap, config.alerted_ttl());

        let handle = EngineHandle {
            tx: cmd_tx.clone(),
            state: Arc::clone(&state),
        };

        let core = EngineCore {
            config,
            state,
            pipeline,
            media,
            player,
            settings,
            fallback_synth,
            clock,
            session,
            timers: TimerBank::new(timer_tx),
            cmd_tx,
            active: None,
        };

        (
            Self {
                core,
                cmd_rx,
                timer_rx,
                observer,
            },
            handle,
        )
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let TransitionEngine {
            mut core,
            mut cmd_rx,
            mut timer_rx,
            mut observer,
        } = self;

        info!("transition engine running");
        loop {
            tokio::select! {
                Some(cmd) = cmd_rx.recv() => {
                    if matches!(cmd, EngineCommand::Shutdown) {
                        info!("shutdown requested");
                        break;
                    }
                    core.handle_command(cmd).await;
                }
                Some(event) = timer_rx.recv() => core.handle_timer(event).await,
                update = observer.next_update() => match update {
                    Some(update) => core.handle_update(update).await,
                    None => {
                        info!("observer stream closed");
                        break;
                    }
                }
            }
        }
        core.shutdown().await;
        info!("transition engine stopped");
    }
}

struct EngineCore {
    config: EngineConfig,
    state: Arc<SharedState>,
    pipeline: Arc<GenerationPipeline>,
    media: Arc<dyn MediaController>,
    player: Arc<AnnouncementPlayer>,
    settings: Arc<dyn SettingsStore>,
    /// Secondary synthesizer tried when the announcement has no audio.
    fallback_synth: Option<Arc<dyn SpeechSynthesizer>>,
    clock: LogicalClock,
    session: SessionState,
    timers: TimerBank,
    cmd_tx: mpsc::Sender<EngineCommand>,
    active: Option<ActiveTransition>,
}

impl EngineCore {
    async fn handle_update(&mut self, update: ObserverUpdate) {
        match update {
            ObserverUpdate::Tick { samples } => self.handle_tick(&samples).await,
            ObserverUpdate::TrackChanged {
                previous,
                current,
                upcoming,
                raw_position,
                duration,
            } => {
                self.handle_track_changed(previous, current, upcoming, raw_position, duration)
                    .await
            }
            ObserverUpdate::QueueUpdated { upcoming } => {
                *self.state.upcoming.write().await = upcoming.clone();
                self.state.event_bus.emit_lossy(AirwaveEvent::QueueUpdated {
                    next: upcoming,
                    timestamp: chrono::Utc::now(),
                });
            }
            ObserverUpdate::ResumeSignal => self.handle_external_resume().await,
        }
    }

    async fn handle_tick(&mut self, samples: &[ElementSample]) {
        let Some(reading) = self.clock.on_tick(samples) else {
            return;
        };
        if self.active.is_some() {
            return;
        }

        let (current, upcoming) = {
            let current = self.state.current.read().await.clone();
            let upcoming = self.state.upcoming.read().await.clone();
            (current, upcoming)
        };
        let (Some(current), Some(upcoming)) = (current, upcoming) else {
            return;
        };

        let key = TransitionKey::new(&current, &upcoming);
        if self.session.alerted.contains(&key) {
            return;
        }

        let settings = self.settings.snapshot().await;
        if !settings.enabled {
            return;
        }

        if reading.time_remaining <= self.config.trigger_window_secs {
            self.state.event_bus.emit_lossy(AirwaveEvent::ApproachingEnd {
                key: key.clone(),
                time_remaining_secs: reading.time_remaining,
                timestamp: chrono::Utc::now(),
            });
            self.begin_transition(key, current, upcoming, settings).await;
        } else if reading.progress >= self.config.prewarm_progress
            && self.session.prewarmed.insert(key.clone())
        {
            self.dispatch_prewarm(key, current, upcoming, settings).await;
        }
    }

    async fn dispatch_prewarm(
        &mut self,
        key: TransitionKey,
        prev: TrackRef,
        next: TrackRef,
        settings: Settings,
    ) {
        info!(%key, "dispatching pre-warm");
        self.state.set_phase(TransitionPhase::PreWarmScheduled).await;
        self.state
            .event_bus
            .emit_lossy(AirwaveEvent::PreWarmDispatched {
                key: key.clone(),
                timestamp: chrono::Utc::now(),
            });

        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move {
            if let Err(e) = pipeline
                .request(key.clone(), &prev, &next, true, &settings)
                .await
            {
                warn!(%key, error = %e, "pre-warm failed");
            }
        });

        // Pre-warm runs in the background; the session is idle again once
        // the request is dispatched.
        self.state.set_phase(TransitionPhase::Idle).await;
    }

    async fn begin_transition(
        &mut self,
        key: TransitionKey,
        prev: TrackRef,
        next: TrackRef,
        settings: Settings,
    ) {
        let id = Uuid::new_v4();
        info!(%key, transition_id = %id, "locking transition");

        self.media.pause().await;
        self.state.set_phase(TransitionPhase::Locked).await;
        *self.state.active_key.write().await = Some(key.clone());
        self.state
            .event_bus
            .emit_lossy(AirwaveEvent::TransitionLocked {
                key: key.clone(),
                timestamp: chrono::Utc::now(),
            });

        self.timers
            .arm(TimeoutLayer::Request, id, self.config.request_timeout());
        self.timers
            .arm(TimeoutLayer::Primary, id, self.config.primary_timeout());
        self.active = Some(ActiveTransition { id, key: key.clone() });

        let pipeline = Arc::clone(&self.pipeline);
        let tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let cmd = match pipeline
                .request(key.clone(), &prev, &next, false, &settings)
                .await
            {
                Ok(announcement) => EngineCommand::AnnouncementReady {
                    transition_id: id,
                    announcement,
                },
                Err(e) => {
                    warn!(%key, error = %e, "announcement production failed");
                    EngineCommand::PlaybackFinished {
                        transition_id: id,
                        ok: false,
                    }
                }
            };
            let _ = tx.send(cmd).await;
        });
    }

    async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::AnnouncementReady {
                transition_id,
                announcement,
            } => self.handle_announcement_ready(transition_id, announcement).await,
            EngineCommand::PlaybackFinished { transition_id, ok } => {
                self.finish_transition(transition_id, ok).await
            }
            EngineCommand::Shutdown => {}
        }
    }

    async fn handle_announcement_ready(&mut self, transition_id: Uuid, announcement: Announcement) {
        let Some(active) = &self.active else {
            debug!(%transition_id, "announcement ready but no transition in flight");
            return;
        };
        if active.id != transition_id {
            debug!(%transition_id, "announcement ready for a superseded transition");
            return;
        }

        // Validation guard: the observed track must still match the key.
        // The pause can land either just before or just after the flip, so
        // both sides of the transition are acceptable.
        let observed = self.state.current.read().await.clone();
        let valid = match &observed {
            Some(track) => {
                track.title == active.key.next_title() || track.title == active.key.prev_title()
            }
            None => true,
        };
        if !valid {
            info!(
                key = %active.key,
                observed = ?observed.map(|t| t.title),
                "playback context no longer matches transition, aborting"
            );
            self.abort_stale().await;
            return;
        }

        // Announcement is ready; the request watchdog has done its job.
        self.timers.cancel(TimeoutLayer::Request);
        self.start_announcement(announcement).await;
    }

    async fn start_announcement(&mut self, announcement: Announcement) {
        let Some(active) = &self.active else {
            return;
        };
        let id = active.id;
        let key = active.key.clone();

        self.state.set_phase(TransitionPhase::Announcing).await;
        self.state.event_bus.emit_lossy(AirwaveEvent::TtsStarted {
            key,
            cached: announcement.cached,
            timestamp: chrono::Utc::now(),
        });

        // Playback has its own, longer guard.
        self.timers.cancel(TimeoutLayer::Primary);
        self.timers
            .arm(TimeoutLayer::Extended, id, self.config.extended_timeout());

        let player = Arc::clone(&self.player);
        let fallback = self.fallback_synth.clone();
        let tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let audio = match announcement.audio {
                Some(audio) => Some(audio),
                None => match fallback {
                    Some(synth) => match synth.synthesize(&announcement.text).await {
                        Ok(audio) => Some(audio),
                        Err(e) => {
                            warn!(error = %e, "fallback synthesis failed");
                            None
                        }
                    },
                    None => None,
                },
            };

            let ok = match audio {
                Some(audio) => player.play(&audio).await.is_ok(),
                None => false,
            };
            let _ = tx
                .send(EngineCommand::PlaybackFinished {
                    transition_id: id,
                    ok,
                })
                .await;
        });
    }

    /// Close out the active transition: mark it alerted, resume playback.
    /// Runs for both successful playback and handled failures; the key is
    /// marked alerted either way so the same gap is not announced twice.
    async fn finish_transition(&mut self, transition_id: Uuid, ok: bool) {
        let Some(active) = &self.active else {
            debug!(%transition_id, "playback finished but no transition in flight");
            return;
        };
        if active.id != transition_id {
            debug!(%transition_id, "playback finished for a superseded transition");
            return;
        }
        let key = self.active.take().map(|a| a.key);
        let Some(key) = key else { return };

        self.timers.clear();

        if ok {
            self.state.record_announcement();
        } else {
            // A poisoned handle must not be replayed on retry.
            self.pipeline.evict(&key);
        }
        self.session.alerted.insert(key.clone());

        info!(%key, ok, "transition complete, resuming playback");
        self.state
            .event_bus
            .emit_lossy(AirwaveEvent::AnnouncementDone {
                key: key.clone(),
                ok,
                timestamp: chrono::Utc::now(),
            });

        self.state.set_phase(TransitionPhase::Resuming).await;
        self.resume(ResumeReason::AnnouncementDone).await;
        self.state.set_phase(TransitionPhase::Idle).await;
        *self.state.active_key.write().await = None;
    }

    async fn handle_timer(&mut self, event: TimerEvent) {
        let Some(active) = &self.active else {
            debug!(layer = %event.layer, "timer fired with no transition in flight");
            return;
        };
        if active.id != event.transition_id {
            debug!(layer = %event.layer, "timer fired for a superseded transition");
            return;
        }
        let key = active.key.clone();

        warn!(%key, layer = %event.layer, "safety timer fired, forcing resume");
        self.state.record_forced_resume();
        self.state.event_bus.emit_lossy(AirwaveEvent::ForcedResume {
            key,
            layer: event.layer,
            timestamp: chrono::Utc::now(),
        });

        // The key is deliberately not marked alerted: if the track is still
        // approaching its end, a later tick may retry the announcement.
        self.active = None;
        self.timers.clear();
        self.player.stop();

        let reason = match event.layer {
            TimeoutLayer::Request => ResumeReason::RequestTimeout,
            TimeoutLayer::Primary => ResumeReason::SafetyPrimary,
            TimeoutLayer::Extended => ResumeReason::SafetyExtended,
        };
        self.resume(reason).await;
        self.state.set_phase(TransitionPhase::Idle).await;
        *self.state.active_key.write().await = None;
    }

    async fn handle_track_changed(
        &mut self,
        previous: Option<TrackRef>,
        current: TrackRef,
        upcoming: Option<TrackRef>,
        raw_position: Option<f64>,
        duration: Option<f64>,
    ) {
        info!(
            prev = ?previous.as_ref().map(|t| &t.title),
            current = %current.title,
            "track changed"
        );

        self.clock
            .recalibrate(duration, raw_position.unwrap_or(0.0), None);
        *self.state.current.write().await = Some(current.clone());
        *self.state.upcoming.write().await = upcoming;

        self.state.event_bus.emit_lossy(AirwaveEvent::TrackChanged {
            prev: previous.clone(),
            next: Some(current.clone()),
            timestamp: chrono::Utc::now(),
        });

        if let Some(active) = &self.active {
            if current.title == active.key.next_title() {
                debug!(key = %active.key, "expected flip landed during transition");
            } else {
                info!(
                    key = %active.key,
                    observed = %current.title,
                    "track changed away from active transition, aborting"
                );
                // The new pair gets announced by its own triggers, if ever;
                // pausing again right after a skip is not one of them.
                self.abort_stale().await;
            }
            return;
        }

        // Primary trigger: the flip itself starts a transition, announcing
        // the track that just began. The fallback tick trigger races this
        // path; whichever ran first has marked the key alerted.
        if let Some(prev) = &previous {
            let key = TransitionKey::new(prev, &current);
            if !self.session.alerted.contains(&key) {
                let settings = self.settings.snapshot().await;
                if settings.enabled {
                    self.begin_transition(key, prev.clone(), current.clone(), settings)
                        .await;
                    return;
                }
            }
        }

        // A pause with nothing in flight must never outlive its track.
        if self.media.is_paused().await {
            let reason = if self.settings.snapshot().await.enabled {
                ResumeReason::StaleContext
            } else {
                ResumeReason::Disabled
            };
            warn!("paused with no transition in flight, resuming");
            self.resume(reason).await;
        }
        self.state.set_phase(TransitionPhase::Idle).await;
    }

    async fn handle_external_resume(&mut self) {
        self.media.note_external_resume().await;
        let Some(active) = self.active.take() else {
            return;
        };

        info!(key = %active.key, "playback resumed externally, cancelling transition");
        self.timers.clear();
        self.player.stop();

        // Re-pausing right after the user pressed play would be hostile, so
        // the key is marked alerted even though nothing was announced.
        self.session.alerted.insert(active.key);

        self.state.event_bus.emit_lossy(AirwaveEvent::Resume {
            reason: ResumeReason::External,
            timestamp: chrono::Utc::now(),
        });
        self.state.set_phase(TransitionPhase::Idle).await;
        *self.state.active_key.write().await = None;
    }

    /// Abort without announcing: the transition's context is gone.
    /// Not marked alerted; nothing was played for this key.
    async fn abort_stale(&mut self) {
        self.active = None;
        self.timers.clear();
        self.player.stop();

        if self.media.is_paused().await {
            self.resume(ResumeReason::StaleContext).await;
        }
        self.state.set_phase(TransitionPhase::Idle).await;
        *self.state.active_key.write().await = None;
    }

    async fn resume(&self, reason: ResumeReason) {
        self.media.resume().await;
        self.state.event_bus.emit_lossy(AirwaveEvent::Resume {
            reason,
            timestamp: chrono::Utc::now(),
        });
    }

    async fn shutdown(&mut self) {
        self.player.stop();
        self.timers.clear();
        if self.media.is_paused().await {
            self.resume(ResumeReason::External).await;
        }
    }
}
