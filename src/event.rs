// src/event.rs

use crate::nodes::AmbientTrack;

/// Commands sent from the control side to the render graph.
///
/// Per-tick frequency targets do not travel here; see
/// `GraphHandle::set_frequency`.
///
/// All durations are already converted to frames at the context sample
/// rate, so the audio thread does no unit conversion.
#[derive(Debug, Clone)]
pub enum ToneCommand {
    /// Jump to frequencies with no ramp (before the first audible sample).
    SnapFrequency { beat_hz: f32, carrier_hz: f32 },

    /// Crossfade between binaural (false) and isochronic (true) paths.
    SetMode { isochronic: bool, crossfade_frames: u32 },

    /// Ramp the user volume on the master stage.
    SetVolume { volume: f32, ramp_frames: u32 },

    /// Ramp the session fade on the master stage (0 = silent, 1 = open).
    Fade { target: f32, ramp_frames: u32 },

    /// Replace the ambient bed.
    SetAmbient { track: Option<AmbientTrack> },

    /// Ramp the ambient bed gain.
    SetAmbientGain { gain: f32, ramp_frames: u32 },

    /// Fade out, then mark the graph finished so the backend releases it.
    Shutdown { fade_frames: u32 },
}
