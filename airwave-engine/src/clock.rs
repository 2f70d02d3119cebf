//! Logical playback clock
//!
//! Converts raw, possibly jumpy position samples from one or more playback
//! elements into a stable time-remaining estimate for the current logical
//! track.
//!
//! Raw positions drift: re-buffering restarts element positions, outro
//! padding extends past the official duration, and several media elements may
//! exist at once. The clock records an anchor offset at each logical track
//! start so raw jumps do not corrupt the estimate, and picks the sample that
//! is most plausibly the active one.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One raw position sample from a playback element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSample {
    /// Raw element position in seconds.
    pub raw_position: f64,

    /// The element's own duration in seconds. May be NaN or infinite while
    /// the element is loading or streaming live.
    #[serde(default = "nan")]
    pub duration: f64,

    #[serde(default)]
    pub paused: bool,
}

fn nan() -> f64 {
    f64::NAN
}

/// Stable reading derived from one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockReading {
    /// Seconds until the logical end. Negative once the logical position has
    /// passed the official duration (bounded by the configured tolerance).
    pub time_remaining: f64,

    /// Fraction of the track elapsed, in `[0, 1]`.
    pub progress: f64,

    /// Duration used for this reading.
    pub duration: f64,
}

/// Per-track logical clock.
pub struct LogicalClock {
    /// Tracks at or below this duration are ads or glitches; never trigger.
    min_track_duration: f64,

    /// Seconds past the official end still reported (rather than ignored).
    past_end_tolerance: f64,

    /// Offset between raw element position and the logical track position,
    /// recorded at track start or seek.
    anchor: f64,

    /// Authoritative duration for the current track, when known.
    official_duration: Option<f64>,
}

impl LogicalClock {
    pub fn new(min_track_duration: f64, past_end_tolerance: f64) -> Self {
        Self {
            min_track_duration,
            past_end_tolerance,
            anchor: 0.0,
            official_duration: None,
        }
    }

    /// Re-anchor the clock. Called on track start and after seeks.
    ///
    /// `api_logical_position` is the authoritative position reported by the
    /// player's API, when one exists; without it the raw position itself
    /// becomes the anchor (the logical track is assumed to start here).
    pub fn recalibrate(
        &mut self,
        official_duration: Option<f64>,
        raw_position: f64,
        api_logical_position: Option<f64>,
    ) {
        self.anchor = raw_position - api_logical_position.unwrap_or(0.0);
        self.official_duration = official_duration.filter(|d| d.is_finite() && *d > 0.0);
        debug!(
            anchor = self.anchor,
            duration = ?self.official_duration,
            "clock recalibrated"
        );
    }

    /// Process one batch of samples and produce a reading, if a trustworthy
    /// one exists.
    ///
    /// Returns `None` when no usable duration is known (live/loading) or the
    /// track is too short to consider.
    pub fn on_tick(&mut self, samples: &[ElementSample]) -> Option<ClockReading> {
        let sample = Self::select_sample(samples)?;

        let duration = self
            .official_duration
            .or_else(|| Some(sample.duration).filter(|d| d.is_finite() && *d > 0.0))?;

        if duration <= self.min_track_duration {
            return None;
        }

        // Clamp below at zero; allow exceeding the official duration by the
        // tolerance so outro padding still reports a (negative) remainder.
        let logical = (sample.raw_position - self.anchor)
            .clamp(0.0, duration + self.past_end_tolerance);

        Some(ClockReading {
            time_remaining: duration - logical,
            progress: (logical / duration).min(1.0),
            duration,
        })
    }

    /// Pick the sample most plausibly belonging to the active element:
    /// unpaused samples win over paused ones, highest position breaks ties.
    fn select_sample(samples: &[ElementSample]) -> Option<&ElementSample> {
        fn best<'a>(
            iter: impl Iterator<Item = &'a ElementSample>,
        ) -> Option<&'a ElementSample> {
            iter.max_by(|a, b| {
                a.raw_position
                    .partial_cmp(&b.raw_position)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        }

        let active = samples
            .iter()
            .filter(|s| !s.paused && s.raw_position.is_finite());
        if let Some(sample) = best(active) {
            return Some(sample);
        }
        best(samples.iter().filter(|s| s.raw_position.is_finite()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(raw_position: f64, duration: f64, paused: bool) -> ElementSample {
        ElementSample {
            raw_position,
            duration,
            paused,
        }
    }

    fn clock() -> LogicalClock {
        LogicalClock::new(10.0, 8.0)
    }

    #[test]
    fn test_time_remaining_from_official_duration() {
        let mut clock = clock();
        clock.recalibrate(Some(200.0), 0.0, None);

        let reading = clock.on_tick(&[sample(40.0, 200.0, false)]).unwrap();
        assert_eq!(reading.time_remaining, 160.0);
        assert!((reading.progress - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_anchor_corrects_raw_jump() {
        let mut clock = clock();
        // Element restarted its raw position at 500 while the track is
        // logically at 12s.
        clock.recalibrate(Some(180.0), 500.0, Some(12.0));

        let reading = clock.on_tick(&[sample(530.0, f64::NAN, false)]).unwrap();
        // logical = 530 - (500 - 12) = 42
        assert_eq!(reading.time_remaining, 138.0);
    }

    #[test]
    fn test_nonfinite_duration_ignored() {
        let mut clock = clock();
        clock.recalibrate(None, 0.0, None);
        assert!(clock.on_tick(&[sample(30.0, f64::INFINITY, false)]).is_none());
        assert!(clock.on_tick(&[sample(30.0, f64::NAN, false)]).is_none());
    }

    #[test]
    fn test_short_track_ignored() {
        let mut clock = clock();
        clock.recalibrate(Some(8.0), 0.0, None);
        // 8s <= 10s floor: treated as ad/glitch
        assert!(clock.on_tick(&[sample(5.0, 8.0, false)]).is_none());
    }

    #[test]
    fn test_official_duration_falls_back_to_element() {
        let mut clock = clock();
        clock.recalibrate(None, 0.0, None);
        let reading = clock.on_tick(&[sample(30.0, 120.0, false)]).unwrap();
        assert_eq!(reading.duration, 120.0);
        assert_eq!(reading.time_remaining, 90.0);
    }

    #[test]
    fn test_past_end_tolerance_yields_negative_remaining() {
        let mut clock = clock();
        clock.recalibrate(Some(100.0), 0.0, None);

        let reading = clock.on_tick(&[sample(104.0, 100.0, false)]).unwrap();
        assert_eq!(reading.time_remaining, -4.0);

        // Beyond the tolerance the position clamps at duration + tolerance.
        let reading = clock.on_tick(&[sample(150.0, 100.0, false)]).unwrap();
        assert_eq!(reading.time_remaining, -8.0);
    }

    #[test]
    fn test_position_clamped_below_at_zero() {
        let mut clock = clock();
        clock.recalibrate(Some(100.0), 50.0, None);
        // Raw position behind the anchor (buffering rewind) reads as 0.
        let reading = clock.on_tick(&[sample(45.0, 100.0, false)]).unwrap();
        assert_eq!(reading.time_remaining, 100.0);
        assert_eq!(reading.progress, 0.0);
    }

    #[test]
    fn test_sample_selection_prefers_unpaused_then_highest() {
        let samples = vec![
            sample(90.0, 200.0, true),
            sample(40.0, 200.0, false),
            sample(55.0, 200.0, false),
        ];
        let selected = LogicalClock::select_sample(&samples).unwrap();
        assert_eq!(selected.raw_position, 55.0);

        // All paused: fall back to highest position.
        let samples = vec![sample(90.0, 200.0, true), sample(40.0, 200.0, true)];
        let selected = LogicalClock::select_sample(&samples).unwrap();
        assert_eq!(selected.raw_position, 90.0);

        assert!(LogicalClock::select_sample(&[]).is_none());
    }
}
