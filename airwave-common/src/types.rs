//! Track and transition identity types
//!
//! A transition is the boundary between one track ending and the next
//! beginning. Its canonical identity is the pair of titles, joined as
//! `prev::next`. Titles are free-form and never assumed unique across a
//! session; the pair is sufficient for cache and dedup bookkeeping.

use serde::{Deserialize, Serialize};

/// Reference to a single track as observed from the player.
///
/// Identity is `(title, artist)`; album is advisory metadata only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRef {
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
}

impl TrackRef {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            album: None,
        }
    }

    /// Identity tuple used for equality checks against observed playback.
    pub fn identity(&self) -> (&str, &str) {
        (&self.title, &self.artist)
    }
}

impl std::fmt::Display for TrackRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} by {}", self.title, self.artist)
    }
}

/// Canonical identifier for a (previous track, next track) pair.
///
/// Derived once per observed transition and stable for the lifetime of that
/// transition's processing. Used for cache lookup, request dedup, and
/// already-announced bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionKey(String);

impl TransitionKey {
    const SEPARATOR: &'static str = "::";

    pub fn new(prev: &TrackRef, next: &TrackRef) -> Self {
        Self::from_titles(&prev.title, &next.title)
    }

    pub fn from_titles(prev_title: &str, next_title: &str) -> Self {
        Self(format!("{prev_title}{}{next_title}", Self::SEPARATOR))
    }

    /// Title of the track the transition leads into.
    ///
    /// This is the title the validation guard compares against the track
    /// actually playing before any audio is allowed to start.
    pub fn next_title(&self) -> &str {
        match self.0.split_once(Self::SEPARATOR) {
            Some((_, next)) => next,
            None => &self.0,
        }
    }

    /// Title of the track the transition leads out of.
    pub fn prev_title(&self) -> &str {
        match self.0.split_once(Self::SEPARATOR) {
            Some((prev, _)) => prev,
            None => &self.0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a resume command was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeReason {
    /// Announcement finished playing (success or handled failure).
    AnnouncementDone,
    /// The short request-phase watchdog fired before any result arrived.
    RequestTimeout,
    /// The primary safety timer fired while still locked/announcing.
    SafetyPrimary,
    /// The extended safety timer fired after playback start was confirmed.
    SafetyExtended,
    /// Validation guard found the current track no longer matches the key.
    StaleContext,
    /// The engine is disabled; transitions pass through untouched.
    Disabled,
    /// Resume signal arrived from outside (user action or embedding player).
    External,
}

impl std::fmt::Display for ResumeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResumeReason::AnnouncementDone => "announcement_done",
            ResumeReason::RequestTimeout => "request_timeout",
            ResumeReason::SafetyPrimary => "safety_primary",
            ResumeReason::SafetyExtended => "safety_extended",
            ResumeReason::StaleContext => "stale_context",
            ResumeReason::Disabled => "disabled",
            ResumeReason::External => "external",
        };
        f.write_str(s)
    }
}
