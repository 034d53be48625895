// src/scheduler.rs

use crate::error::ConfigError;
use crate::state::{Interpolation, Preset};

/// Instantaneous synthesis target at one point of the session timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyTarget {
    /// Beat frequency in Hz.
    pub beat_hz: f64,

    /// Carrier frequency in Hz.
    pub carrier_hz: f64,

    /// Index of the active breakpoint.
    pub index: usize,
}

/// Compiles a preset's envelope into a function of elapsed time.
///
/// This struct:
/// - is built once per session (validation happens here)
/// - is immutable afterwards
/// - answers lookups in O(log n) via a cumulative offset table
///
/// Intervals are half-open `[start, end)`, except the last which is closed
/// so the final instant resolves to the final breakpoint.
#[derive(Debug, Clone)]
pub struct EnvelopeScheduler {
    /// Start offset of each breakpoint (seconds).
    offsets: Vec<f64>,

    /// Duration of each breakpoint (seconds).
    durations: Vec<f64>,

    beats: Vec<f64>,
    carriers: Vec<f64>,

    total: f64,
    interpolation: Interpolation,
}

impl EnvelopeScheduler {
    /// Build a scheduler for `preset`.
    ///
    /// Fails with a configuration error for malformed presets, so a
    /// session can never start with an unplayable envelope.
    pub fn new(preset: &Preset) -> Result<Self, ConfigError> {
        preset.validate()?;

        let len = preset.envelope.len();
        let mut offsets = Vec::with_capacity(len);
        let mut durations = Vec::with_capacity(len);
        let mut beats = Vec::with_capacity(len);
        let mut carriers = Vec::with_capacity(len);

        let mut cursor = 0.0;
        for (index, bp) in preset.envelope.iter().enumerate() {
            offsets.push(cursor);
            durations.push(bp.duration_secs);
            beats.push(bp.beat_hz);
            carriers.push(preset.carrier_at(index));
            cursor += bp.duration_secs;
        }

        Ok(Self {
            offsets,
            durations,
            beats,
            carriers,
            total: preset.duration_secs,
            interpolation: preset.interpolation,
        })
    }

    #[inline]
    pub fn total_duration(&self) -> f64 {
        self.total
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Start offset of breakpoint `index`.
    #[inline]
    pub fn offset_of(&self, index: usize) -> Option<f64> {
        self.offsets.get(index).copied()
    }

    /// Index of the breakpoint active at `elapsed`.
    pub fn interval_at(&self, elapsed: f64) -> usize {
        let last = self.offsets.len() - 1;
        let t = elapsed.max(0.0);

        if t >= self.total {
            return last;
        }

        // First offset strictly greater than t, minus one.
        self.offsets
            .partition_point(|&start| start <= t)
            .saturating_sub(1)
            .min(last)
    }

    /// Target frequencies at `elapsed` seconds.
    ///
    /// Negative values clamp to the start, values past the end hold the
    /// last breakpoint. Never extrapolates.
    pub fn target_at(&self, elapsed: f64) -> FrequencyTarget {
        let t = elapsed.max(0.0);
        let index = self.interval_at(t);

        if t >= self.total {
            return FrequencyTarget {
                beat_hz: self.beats[index],
                carrier_hz: self.carriers[index],
                index,
            };
        }

        let fraction = ((t - self.offsets[index]) / self.durations[index]).clamp(0.0, 1.0);

        FrequencyTarget {
            beat_hz: self.sample(&self.beats, index, fraction),
            carrier_hz: self.sample(&self.carriers, index, fraction),
            index,
        }
    }

    /// Convenience: beat frequency only.
    #[inline]
    pub fn beat_at(&self, elapsed: f64) -> f64 {
        self.target_at(elapsed).beat_hz
    }

    #[inline]
    fn sample(&self, values: &[f64], index: usize, fraction: f64) -> f64 {
        let last = values.len() - 1;
        match self.interpolation {
            Interpolation::GlideToNext if index < last => {
                lerp(values[index], values[index + 1], fraction)
            }
            Interpolation::GlideFromPrevious if index > 0 => {
                lerp(values[index - 1], values[index], fraction)
            }
            _ => values[index],
        }
    }
}

#[inline]
fn lerp(from: f64, to: f64, fraction: f64) -> f64 {
    from + (to - from) * fraction
}
