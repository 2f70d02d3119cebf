//! Bus-backed media control
//!
//! The engine never touches the media source directly; it publishes
//! [`PlayerCommand`] events on the bus and the embedding player executes
//! them on its side of the SSE stream. Pause state is tracked here so both
//! operations stay idempotent and so safety logic can ask "are we paused?"
//! without a round trip.
//!
//! A command the player never acts on is exactly the situation the safety
//! timers exist for, so no delivery acknowledgment is required.

use std::sync::atomic::{AtomicBool, Ordering};

use airwave_common::events::{AirwaveEvent, EventBus, PlayerCommand};
use async_trait::async_trait;
use tracing::{debug, info};

use super::MediaController;

pub struct BusMediaController {
    bus: EventBus,
    paused: AtomicBool,
}

impl BusMediaController {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            paused: AtomicBool::new(false),
        }
    }

}

#[async_trait]
impl MediaController for BusMediaController {
    async fn pause(&self) {
        if self.paused.swap(true, Ordering::SeqCst) {
            debug!("pause requested while already paused, skipping");
            return;
        }
        info!("issuing pause command");
        self.bus.emit_lossy(AirwaveEvent::PlayerCommand {
            command: PlayerCommand::Pause,
            timestamp: chrono::Utc::now(),
        });
    }

    async fn resume(&self) {
        if !self.paused.swap(false, Ordering::SeqCst) {
            debug!("resume requested while already playing, skipping");
            return;
        }
        info!("issuing resume command");
        self.bus.emit_lossy(AirwaveEvent::PlayerCommand {
            command: PlayerCommand::Resume,
            timestamp: chrono::Utc::now(),
        });
    }

    async fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    async fn note_external_resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            debug!("external resume observed, clearing paused state");
        }
    }
}
