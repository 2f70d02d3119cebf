//! Announcement cache
//!
//! TTL-bounded storage for generated text and synthesized audio, keyed by
//! transition key. Owned exclusively by the pipeline; readers never mutate
//! entries. Entries die on expiry or on explicit eviction after a failure.

use std::collections::HashMap;
use std::time::Duration;

use airwave_common::types::TransitionKey;
use tokio::time::Instant;
use tracing::debug;

use crate::providers::AudioHandle;

/// One cached announcement.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: TransitionKey,
    pub text: String,
    pub audio: Option<AudioHandle>,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(key: TransitionKey, text: String, ttl: Duration) -> Self {
        Self {
            key,
            text,
            audio: None,
            created_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

/// TTL cache over transition keys.
pub struct AnnouncementCache {
    ttl: Duration,
    entries: HashMap<TransitionKey, CacheEntry>,
}

impl AnnouncementCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Look up an unexpired entry. An expired entry is removed on the way.
    pub fn get(&mut self, key: &TransitionKey) -> Option<&CacheEntry> {
        if self.entries.get(key).is_some_and(|e| e.is_expired()) {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key)
    }

    /// Store freshly generated text, resetting the entry's clock.
    pub fn put_text(&mut self, key: TransitionKey, text: String) {
        let entry = CacheEntry::new(key.clone(), text, self.ttl);
        self.entries.insert(key, entry);
    }

    /// Attach synthesized audio to an existing entry, if still present.
    pub fn attach_audio(&mut self, key: &TransitionKey, audio: AudioHandle) {
        if let Some(entry) = self.entries.get_mut(key) {
            if !entry.is_expired() {
                entry.audio = Some(audio);
            }
        }
    }

    /// Drop an entry, e.g. after its audio handle failed to play.
    pub fn evict(&mut self, key: &TransitionKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove all expired entries; returns how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired());
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(dropped, "purged expired announcement cache entries");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
