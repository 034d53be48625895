// src/state/config.rs
//
// Engine configuration.
//
// Every latency-sensitive behavior (fades, ramps, crossfades) is bounded by
// one of these fixed durations rather than by timeouts.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Fade-in when a session starts.
    pub start_fade_ms: f64,

    /// Fade-out before the graph is disconnected on stop/complete.
    pub stop_fade_ms: f64,

    /// Fade used by pause and resume.
    pub pause_fade_ms: f64,

    /// Ramp for volume changes.
    pub volume_ramp_ms: f64,

    /// Crossfade between binaural and isochronic modes.
    pub mode_crossfade_ms: f64,

    /// Upper bound on a frequency ramp. Ramps otherwise track the tick interval.
    pub max_frequency_ramp_ms: f64,

    /// Ramp used on the first tick after start/resume, when no interval is known.
    pub first_tick_ramp_ms: f64,

    /// Number of samples held by the analyser tap.
    pub analyser_size: usize,

    /// Volume before the host calls `set_volume`.
    pub default_volume: f32,

    /// Largest block a backend will render in one call.
    pub max_block_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            start_fade_ms: 500.0,
            stop_fade_ms: 500.0,
            pause_fade_ms: 300.0,
            volume_ramp_ms: 80.0,
            mode_crossfade_ms: 40.0,
            max_frequency_ramp_ms: 100.0,
            first_tick_ramp_ms: 16.0,
            analyser_size: 2048,
            default_volume: 0.7,
            max_block_size: 512,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Convert milliseconds to a whole number of frames.
#[inline]
pub fn ms_to_frames(ms: f64, sample_rate: f64) -> u32 {
    (ms.max(0.0) * 0.001 * sample_rate).round() as u32
}
