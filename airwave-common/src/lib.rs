//! # Airwave Common Library
//!
//! Shared code for the Airwave transition announcement engine:
//! - Event types (AirwaveEvent enum) and EventBus
//! - Error taxonomy
//! - Track / transition key data model
//! - Bootstrap configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
pub use types::{TrackRef, TransitionKey};
