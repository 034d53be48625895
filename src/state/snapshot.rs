// src/state/snapshot.rs
//
// Read-only engine state for the presentation layer.
//
// Recomputed on every tick and every control operation. The UI polls it
// and never mutates it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Preset;

/// Named segment of the session timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Intro,
    Main,
    Outro,
    Complete,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Intro => "intro",
            Phase::Main => "main",
            Phase::Outro => "outro",
            Phase::Complete => "complete",
        }
    }
}

/// Lifecycle of the session clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Running,
    Paused,
    /// Ended early by `stop`.
    Stopped,
    /// Reached the preset duration naturally.
    Complete,
}

impl PlaybackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Running => "running",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Stopped => "stopped",
            PlaybackStatus::Complete => "complete",
        }
    }

    /// Stopped and complete sessions accept no further ticks.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackStatus::Stopped | PlaybackStatus::Complete)
    }
}

/// Complete externally-observable engine snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioEngineState {
    /// Preset of the current (or most recent) session.
    pub preset: Option<Arc<Preset>>,

    pub status: PlaybackStatus,

    pub phase: Phase,

    /// Display label: band name during `main`, segment name otherwise.
    pub phase_label: String,

    pub elapsed_secs: f64,
    pub duration_secs: f64,
    pub remaining_secs: f64,

    /// Instantaneous beat frequency from the envelope.
    pub beat_hz: f64,

    /// Instantaneous carrier frequency from the envelope.
    pub carrier_hz: f64,

    pub is_playing: bool,
    pub is_paused: bool,

    /// Master volume (0.0 - 1.0).
    pub volume: f32,

    pub ambient_volume: f32,

    pub isochronic: bool,
    pub breathing_guide: bool,
}

impl AudioEngineState {
    pub fn idle(volume: f32, isochronic: bool, breathing_guide: bool) -> Self {
        Self {
            preset: None,
            status: PlaybackStatus::Idle,
            phase: Phase::Intro,
            phase_label: String::new(),
            elapsed_secs: 0.0,
            duration_secs: 0.0,
            remaining_secs: 0.0,
            beat_hz: 0.0,
            carrier_hz: 0.0,
            is_playing: false,
            is_paused: false,
            volume,
            ambient_volume: 0.0,
            isochronic,
            breathing_guide,
        }
    }

    /// Fraction of the session elapsed, clamped to [0, 1].
    pub fn progress(&self) -> f64 {
        if self.duration_secs <= 0.0 {
            return 0.0;
        }
        (self.elapsed_secs / self.duration_secs).clamp(0.0, 1.0)
    }

    pub fn preset_id(&self) -> Option<&str> {
        self.preset.as_deref().map(|p| p.id.as_str())
    }
}

/// Fired exactly once when a session reaches its natural end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub preset_id: String,

    /// Nominal session duration.
    pub duration_secs: f64,

    /// Clock value at the tick that detected completion.
    pub completed_at_elapsed: f64,
}
