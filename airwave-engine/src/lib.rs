//! Airwave transition engine
//!
//! Watches a media player's playback position, predicts the end of the
//! current track, and fills the gap with a generated spoken DJ transition:
//! pause, announce, resume. Never leaves the player paused; layered safety
//! timers force a resume if any step stalls.

pub mod api;
pub mod clock;
pub mod engine;
pub mod pipeline;
pub mod playback;
pub mod providers;
pub mod session;
pub mod state;
