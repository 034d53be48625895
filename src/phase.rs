// src/phase.rs
//
// Phase derivation.
//
// A phase is a pure function of elapsed time and the preset's declared
// boundaries. The tracker on top only remembers the previous phase so the
// facade can report transitions.

use crate::state::{BandTable, Phase, Preset};

pub const INTRO_LABEL: &str = "Settling";
pub const OUTRO_LABEL: &str = "Returning";
pub const COMPLETE_LABEL: &str = "Complete";

/// Resolved phase boundary offsets for one preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseMap {
    intro_end: f64,
    outro_start: f64,
    duration: f64,
}

impl PhaseMap {
    pub fn new(preset: &Preset) -> Self {
        let (intro_end, outro_start) = preset.phases.resolve(preset.duration_secs);
        Self {
            intro_end,
            outro_start,
            duration: preset.duration_secs,
        }
    }

    #[inline]
    pub fn intro_end(&self) -> f64 {
        self.intro_end
    }

    #[inline]
    pub fn outro_start(&self) -> f64 {
        self.outro_start
    }

    /// Phase at `elapsed`. `Complete` iff `elapsed >= duration`.
    pub fn phase_at(&self, elapsed: f64) -> Phase {
        if elapsed >= self.duration {
            Phase::Complete
        } else if elapsed >= self.outro_start {
            Phase::Outro
        } else if elapsed < self.intro_end {
            Phase::Intro
        } else {
            Phase::Main
        }
    }
}

/// Display label for a phase. `Main` is labelled by the band of the
/// instantaneous beat frequency.
pub fn phase_label(phase: Phase, beat_hz: f64, bands: &BandTable) -> String {
    match phase {
        Phase::Intro => INTRO_LABEL.to_string(),
        Phase::Main => bands.classify(beat_hz).to_string(),
        Phase::Outro => OUTRO_LABEL.to_string(),
        Phase::Complete => COMPLETE_LABEL.to_string(),
    }
}

/// A change of phase observed between two ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    /// `None` on the first observation of a session.
    pub from: Option<Phase>,
    pub to: Phase,
}

/// Remembers the last observed phase to report transitions.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    map: PhaseMap,
    current: Option<Phase>,
}

impl PhaseTracker {
    pub fn new(map: PhaseMap) -> Self {
        Self { map, current: None }
    }

    #[inline]
    pub fn map(&self) -> &PhaseMap {
        &self.map
    }

    /// Observe `elapsed`; returns the transition if the phase changed.
    pub fn observe(&mut self, elapsed: f64) -> Option<PhaseTransition> {
        let phase = self.map.phase_at(elapsed);
        if self.current == Some(phase) {
            return None;
        }
        let from = self.current.replace(phase);
        Some(PhaseTransition { from, to: phase })
    }
}
