//! Error types for the Airwave workspace
//!
//! Defines the shared error taxonomy using thiserror. Every failure mode in
//! the engine maps to one of these variants and each has a defined recovery
//! path; none of them is allowed to leave the session paused.

use thiserror::Error;

/// Main error type shared across Airwave crates
#[derive(Error, Debug)]
pub enum Error {
    /// Text generation upstream failed or was unavailable.
    ///
    /// Recovered locally with a deterministic fallback announcement; never
    /// surfaced to the caller of the pipeline.
    #[error("Generation error: {0}")]
    Generation(String),

    /// Speech synthesis failed.
    ///
    /// The orchestrator falls back to a secondary synthesizer if configured,
    /// otherwise skips audio and proceeds straight to resume.
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Announcement audio failed to play.
    ///
    /// The cached entry for that text is evicted so a retry resynthesizes
    /// rather than replaying a poisoned handle.
    #[error("Playback error: {0}")]
    Playback(String),

    /// A collaborator never responded within its timeout.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The currently playing track no longer matches the transition key.
    ///
    /// Silent abort: no announcement plays, resume is issued if still paused.
    #[error("Stale context: {0}")]
    StaleContext(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Outbound HTTP errors (provider endpoints)
    #[error("HTTP error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the shared Error
pub type Result<T> = std::result::Result<T, Error>;
