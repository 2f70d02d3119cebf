//! Per-session bookkeeping sets
//!
//! Two bounded sets of transition keys keep memory flat over long sessions:
//! `prewarmed` remembers which pairs already have a speculative generation in
//! flight or cached, and `alerted` remembers which pairs have already been
//! announced. `alerted` entries expire after a couple of minutes so a looping
//! playlist can be announced again.

use std::collections::HashMap;
use std::time::Duration;

use airwave_common::types::TransitionKey;
use tokio::time::Instant;
use tracing::debug;

/// Set of transition keys with a capacity cap and optional per-entry TTL.
///
/// On overflow the whole set is cleared: simpler than LRU, and the worst case
/// is one repeated announcement, never unbounded growth.
pub struct BoundedKeySet {
    cap: usize,
    ttl: Option<Duration>,
    entries: HashMap<TransitionKey, Instant>,
}

impl BoundedKeySet {
    pub fn new(cap: usize, ttl: Option<Duration>) -> Self {
        Self {
            cap,
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Insert a key. Returns `false` if the key was already present (and not
    /// expired), leaving its original timestamp untouched.
    pub fn insert(&mut self, key: TransitionKey) -> bool {
        self.purge_expired();

        if self.contains(&key) {
            return false;
        }

        if self.entries.len() >= self.cap {
            debug!(cap = self.cap, "key set at capacity, clearing");
            self.entries.clear();
        }

        self.entries.insert(key, Instant::now());
        true
    }

    pub fn contains(&self, key: &TransitionKey) -> bool {
        match self.entries.get(key) {
            Some(inserted_at) => !self.is_expired(*inserted_at),
            None => false,
        }
    }

    pub fn remove(&mut self, key: &TransitionKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, inserted_at: Instant) -> bool {
        match self.ttl {
            Some(ttl) => inserted_at.elapsed() >= ttl,
            None => false,
        }
    }

    fn purge_expired(&mut self) {
        if let Some(ttl) = self.ttl {
            self.entries.retain(|_, at| at.elapsed() < ttl);
        }
    }
}

/// The two bookkeeping sets owned by the orchestrator.
pub struct SessionState {
    pub prewarmed: BoundedKeySet,
    pub alerted: BoundedKeySet,
}

impl SessionState {
    pub fn new(cap: usize, alerted_ttl: Duration) -> Self {
        Self {
            prewarmed: BoundedKeySet::new(cap, None),
            alerted: BoundedKeySet::new(cap, Some(alerted_ttl)),
        }
    }
}
