//! Layered safety timers
//!
//! Three watchdog layers guard the paused window:
//!
//! - request: armed at lock, resumes if no announcement is ready
//! - primary: armed at lock, the main "never stay paused" guard
//! - extended: armed when announcement playback starts, superseding primary
//!
//! Each fired timer carries the transition id it was armed for. The engine
//! drops firings whose id no longer matches the active transition, so a
//! timer from an already-finished transition can never resume a later one.

use std::time::Duration;

use airwave_common::events::TimeoutLayer;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// A safety timer expired.
#[derive(Debug, Clone, Copy)]
pub struct TimerEvent {
    pub transition_id: Uuid,
    pub layer: TimeoutLayer,
}

/// Owns the per-layer timer tasks for the engine loop.
///
/// Arming a layer replaces any timer already running on it; cancelled and
/// replaced timers are aborted and never fire.
pub struct TimerBank {
    tx: mpsc::Sender<TimerEvent>,
    request: Option<JoinHandle<()>>,
    primary: Option<JoinHandle<()>>,
    extended: Option<JoinHandle<()>>,
}

impl TimerBank {
    pub fn new(tx: mpsc::Sender<TimerEvent>) -> Self {
        Self {
            tx,
            request: None,
            primary: None,
            extended: None,
        }
    }

    pub fn arm(&mut self, layer: TimeoutLayer, transition_id: Uuid, after: Duration) {
        debug!(%layer, %transition_id, ?after, "arming safety timer");
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx
                .send(TimerEvent {
                    transition_id,
                    layer,
                })
                .await;
        });

        if let Some(old) = self.slot(layer).replace(handle) {
            old.abort();
        }
    }

    pub fn cancel(&mut self, layer: TimeoutLayer) {
        if let Some(handle) = self.slot(layer).take() {
            debug!(%layer, "cancelling safety timer");
            handle.abort();
        }
    }

    /// Cancel all layers; called when a transition completes or aborts.
    pub fn clear(&mut self) {
        self.cancel(TimeoutLayer::Request);
        self.cancel(TimeoutLayer::Primary);
        self.cancel(TimeoutLayer::Extended);
    }

    fn slot(&mut self, layer: TimeoutLayer) -> &mut Option<JoinHandle<()>> {
        match layer {
            TimeoutLayer::Request => &mut self.request,
            TimeoutLayer::Primary => &mut self.primary,
            TimeoutLayer::Extended => &mut self.extended,
        }
    }
}

impl Drop for TimerBank {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_with_id_and_layer() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut bank = TimerBank::new(tx);
        let id = Uuid::new_v4();

        bank.arm(TimeoutLayer::Primary, id, Duration::from_secs(6));
        tokio::time::advance(Duration::from_secs(7)).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.transition_id, id);
        assert_eq!(event.layer, TimeoutLayer::Primary);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut bank = TimerBank::new(tx);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        bank.arm(TimeoutLayer::Request, first, Duration::from_secs(4));
        tokio::time::advance(Duration::from_secs(2)).await;
        bank.arm(TimeoutLayer::Request, second, Duration::from_secs(4));
        tokio::time::advance(Duration::from_secs(10)).await;

        // Only the replacement fires.
        let event = rx.recv().await.unwrap();
        assert_eq!(event.transition_id, second);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_silences_all_layers() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut bank = TimerBank::new(tx);
        let id = Uuid::new_v4();

        bank.arm(TimeoutLayer::Request, id, Duration::from_secs(4));
        bank.arm(TimeoutLayer::Primary, id, Duration::from_secs(6));
        bank.arm(TimeoutLayer::Extended, id, Duration::from_secs(30));
        bank.clear();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }
}
