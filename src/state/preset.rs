// src/state/preset.rs
//
// Session presets.
//
// A Preset is the static, immutable definition of one guided session: its
// beat-frequency envelope, carrier tone, and phase layout. Presets are
// loaded once at session start and never mutated while playing.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tolerance when comparing summed breakpoint durations to the total.
const DURATION_TOLERANCE_SECS: f64 = 1e-3;

// ═══════════════════════════════════════════════════════════════════
// Envelope Breakpoint
// ═══════════════════════════════════════════════════════════════════

/// One segment of a frequency envelope.
///
/// Breakpoint `i` is active for a contiguous window starting at the sum of
/// the durations of breakpoints `0..i`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeBreakpoint {
    /// Beat frequency in Hz.
    pub beat_hz: f64,

    /// How long this breakpoint is active, in seconds.
    pub duration_secs: f64,

    /// Carrier override for this breakpoint. Falls back to the preset carrier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_hz: Option<f64>,
}

impl EnvelopeBreakpoint {
    pub fn new(beat_hz: f64, duration_secs: f64) -> Self {
        Self {
            beat_hz,
            duration_secs,
            carrier_hz: None,
        }
    }

    pub fn with_carrier(mut self, carrier_hz: f64) -> Self {
        self.carrier_hz = Some(carrier_hz);
        self
    }
}

// ═══════════════════════════════════════════════════════════════════
// Interpolation & Phase Layout
// ═══════════════════════════════════════════════════════════════════

/// How frequencies move between breakpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Interpolation {
    /// Interval `i` glides from breakpoint `i` toward breakpoint `i + 1`.
    /// The final interval holds its own value.
    #[default]
    GlideToNext,

    /// Interval `i` glides from breakpoint `i - 1` toward breakpoint `i`.
    /// The first interval holds breakpoint 0.
    GlideFromPrevious,

    /// Each interval holds its breakpoint's value.
    Step,
}

/// Length of an intro or outro segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "unit", content = "value")]
pub enum BoundarySpan {
    /// Fixed number of seconds.
    Seconds(f64),

    /// Fraction of the total session duration (0.0 - 1.0).
    Fraction(f64),
}

impl BoundarySpan {
    /// Resolve to seconds for a session of `total` seconds.
    #[inline]
    pub fn resolve(&self, total: f64) -> f64 {
        let secs = match *self {
            BoundarySpan::Seconds(s) => s,
            BoundarySpan::Fraction(f) => f * total,
        };
        secs.clamp(0.0, total.max(0.0))
    }

    fn validate(&self, which: &str) -> Result<(), ConfigError> {
        match *self {
            BoundarySpan::Seconds(s) if !s.is_finite() || s < 0.0 => Err(
                ConfigError::InvalidPhaseSpan(format!("{which} seconds must be >= 0, got {s}")),
            ),
            BoundarySpan::Fraction(f) if !(0.0..=1.0).contains(&f) => Err(
                ConfigError::InvalidPhaseSpan(format!("{which} fraction must be in [0, 1], got {f}")),
            ),
            _ => Ok(()),
        }
    }
}

/// Where the intro ends and the outro begins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseBoundaries {
    pub intro: BoundarySpan,
    pub outro: BoundarySpan,
}

impl Default for PhaseBoundaries {
    fn default() -> Self {
        Self {
            intro: BoundarySpan::Fraction(0.1),
            outro: BoundarySpan::Fraction(0.1),
        }
    }
}

impl PhaseBoundaries {
    pub fn seconds(intro: f64, outro: f64) -> Self {
        Self {
            intro: BoundarySpan::Seconds(intro),
            outro: BoundarySpan::Seconds(outro),
        }
    }

    pub fn fractions(intro: f64, outro: f64) -> Self {
        Self {
            intro: BoundarySpan::Fraction(intro),
            outro: BoundarySpan::Fraction(outro),
        }
    }

    /// Resolve to `(intro_end, outro_start)` offsets in seconds.
    ///
    /// The intro is resolved first; the outro gets whatever remains, so
    /// `intro_end <= outro_start` always holds.
    pub fn resolve(&self, total: f64) -> (f64, f64) {
        let intro = self.intro.resolve(total);
        let outro = self.outro.resolve(total).min(total - intro);
        (intro, total - outro)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Preset
// ═══════════════════════════════════════════════════════════════════

/// Static definition of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: String,
    pub name: String,

    /// Accent color for the presentation layer (opaque to the engine).
    #[serde(default)]
    pub color: String,

    /// Classification label of the band this preset targets.
    #[serde(default)]
    pub target_band: String,

    /// Ordered, non-empty list of breakpoints.
    pub envelope: Vec<EnvelopeBreakpoint>,

    /// Total nominal duration in seconds.
    pub duration_secs: f64,

    /// Base carrier frequency in Hz.
    pub carrier_hz: f64,

    #[serde(default)]
    pub phases: PhaseBoundaries,

    #[serde(default)]
    pub interpolation: Interpolation,
}

impl Preset {
    /// Build a preset whose total duration is the sum of its breakpoints.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        carrier_hz: f64,
        envelope: Vec<EnvelopeBreakpoint>,
    ) -> Self {
        let duration_secs = envelope.iter().map(|b| b.duration_secs).sum();
        Self {
            id: id.into(),
            name: name.into(),
            color: String::new(),
            target_band: String::new(),
            envelope,
            duration_secs,
            carrier_hz,
            phases: PhaseBoundaries::default(),
            interpolation: Interpolation::default(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_target_band(mut self, band: impl Into<String>) -> Self {
        self.target_band = band.into();
        self
    }

    pub fn with_phases(mut self, phases: PhaseBoundaries) -> Self {
        self.phases = phases;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Override the declared duration. Validation still requires it to
    /// match the breakpoint sum.
    pub fn with_duration(mut self, duration_secs: f64) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    /// Parse a single preset from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let preset: Preset = serde_json::from_str(json)?;
        preset.validate()?;
        Ok(preset)
    }

    /// Carrier in effect for breakpoint `index`.
    #[inline]
    pub fn carrier_at(&self, index: usize) -> f64 {
        self.envelope
            .get(index)
            .and_then(|b| b.carrier_hz)
            .unwrap_or(self.carrier_hz)
    }

    /// Check every invariant a playable preset must satisfy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.envelope.is_empty() {
            return Err(ConfigError::EmptyEnvelope);
        }

        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(ConfigError::NonPositiveDuration(self.duration_secs));
        }

        if !self.carrier_hz.is_finite() || self.carrier_hz <= 0.0 {
            return Err(ConfigError::InvalidCarrier(self.carrier_hz));
        }

        for (index, bp) in self.envelope.iter().enumerate() {
            if !bp.beat_hz.is_finite() || bp.beat_hz <= 0.0 {
                return Err(ConfigError::InvalidBreakpoint {
                    index,
                    reason: format!("beat frequency must be positive, got {}", bp.beat_hz),
                });
            }
            if !bp.duration_secs.is_finite() || bp.duration_secs <= 0.0 {
                return Err(ConfigError::InvalidBreakpoint {
                    index,
                    reason: format!("duration must be positive, got {}", bp.duration_secs),
                });
            }
            let carrier = self.carrier_at(index);
            if !carrier.is_finite() || carrier <= 0.0 {
                return Err(ConfigError::InvalidCarrier(carrier));
            }
            // Left channel sits at carrier - beat/2.
            if carrier - bp.beat_hz / 2.0 <= 0.0 {
                return Err(ConfigError::CarrierTooLow { index });
            }
        }

        let summed: f64 = self.envelope.iter().map(|b| b.duration_secs).sum();
        if (summed - self.duration_secs).abs() > DURATION_TOLERANCE_SECS {
            return Err(ConfigError::DurationMismatch {
                declared: self.duration_secs,
                summed,
            });
        }

        self.phases.intro.validate("intro")?;
        self.phases.outro.validate("outro")?;

        Ok(())
    }
}

/// Parse a JSON array of presets, validating each one.
pub fn presets_from_json(json: &str) -> Result<Vec<Preset>, ConfigError> {
    let presets: Vec<Preset> = serde_json::from_str(json)?;
    for preset in &presets {
        preset.validate()?;
    }
    Ok(presets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step() -> Preset {
        Preset::new(
            "test",
            "Test",
            200.0,
            vec![
                EnvelopeBreakpoint::new(10.0, 60.0),
                EnvelopeBreakpoint::new(4.0, 120.0),
            ],
        )
    }

    #[test]
    fn test_duration_derived_from_breakpoints() {
        let preset = two_step();
        assert_eq!(preset.duration_secs, 180.0);
        assert!(preset.validate().is_ok());
    }

    #[test]
    fn test_empty_envelope_rejected() {
        let preset = Preset::new("empty", "Empty", 200.0, vec![]);
        assert_eq!(preset.validate(), Err(ConfigError::EmptyEnvelope));
    }

    #[test]
    fn test_non_positive_duration_rejected() {
        let preset = two_step().with_duration(0.0);
        assert_eq!(preset.validate(), Err(ConfigError::NonPositiveDuration(0.0)));
    }

    #[test]
    fn test_duration_mismatch_rejected() {
        let preset = two_step().with_duration(200.0);
        assert!(matches!(
            preset.validate(),
            Err(ConfigError::DurationMismatch { .. })
        ));
    }

    #[test]
    fn test_carrier_too_low_rejected() {
        let preset = Preset::new("low", "Low", 4.0, vec![EnvelopeBreakpoint::new(10.0, 30.0)]);
        assert_eq!(preset.validate(), Err(ConfigError::CarrierTooLow { index: 0 }));
    }

    #[test]
    fn test_bad_fraction_rejected() {
        let preset = two_step().with_phases(PhaseBoundaries::fractions(1.5, 0.1));
        assert!(matches!(
            preset.validate(),
            Err(ConfigError::InvalidPhaseSpan(_))
        ));
    }

    #[test]
    fn test_phase_boundaries_short_session_clamped() {
        // 30s + 30s requested on a 40s session: outro gets what is left.
        let (intro_end, outro_start) = PhaseBoundaries::seconds(30.0, 30.0).resolve(40.0);
        assert_eq!(intro_end, 30.0);
        assert_eq!(outro_start, 30.0);
    }

    #[test]
    fn test_phase_boundaries_fraction() {
        let (intro_end, outro_start) = PhaseBoundaries::fractions(0.1, 0.2).resolve(600.0);
        assert_eq!(intro_end, 60.0);
        assert_eq!(outro_start, 480.0);
    }

    #[test]
    fn test_from_json_defaults() {
        let json = r#"{
            "id": "calm",
            "name": "Calm",
            "envelope": [
                { "beatHz": 10.0, "durationSecs": 60.0 },
                { "beatHz": 6.0, "durationSecs": 60.0, "carrierHz": 180.0 }
            ],
            "durationSecs": 120.0,
            "carrierHz": 200.0,
            "phases": {
                "intro": { "unit": "seconds", "value": 15.0 },
                "outro": { "unit": "fraction", "value": 0.25 }
            }
        }"#;
        let preset = Preset::from_json(json).unwrap();
        assert_eq!(preset.interpolation, Interpolation::GlideToNext);
        assert_eq!(preset.carrier_at(0), 200.0);
        assert_eq!(preset.carrier_at(1), 180.0);
        assert_eq!(preset.phases.intro, BoundarySpan::Seconds(15.0));
        assert_eq!(preset.phases.outro, BoundarySpan::Fraction(0.25));
    }

    #[test]
    fn test_from_json_invalid_preset() {
        let json = r#"{
            "id": "x", "name": "X", "envelope": [],
            "durationSecs": 10.0, "carrierHz": 200.0
        }"#;
        assert_eq!(Preset::from_json(json), Err(ConfigError::EmptyEnvelope));
        assert!(matches!(Preset::from_json("{"), Err(ConfigError::Parse(_))));
    }
}
