// src/error.rs
//
// Error taxonomy for the engine.
//
// Only two conditions ever reach the caller: a malformed preset and an
// output device that cannot be acquired. Operations that are merely invalid
// for the current state (pause while paused, stop twice) are no-ops.

use thiserror::Error;

/// A preset or configuration that can never be played.
///
/// Always raised before a session starts, never during playback.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("preset envelope has no breakpoints")]
    EmptyEnvelope,

    #[error("preset duration must be positive, got {0}")]
    NonPositiveDuration(f64),

    #[error("breakpoint {index} is invalid: {reason}")]
    InvalidBreakpoint { index: usize, reason: String },

    #[error("breakpoint durations sum to {summed}s but preset declares {declared}s")]
    DurationMismatch { declared: f64, summed: f64 },

    #[error("carrier frequency must be positive and finite, got {0}")]
    InvalidCarrier(f64),

    #[error("carrier at breakpoint {index} is too low for its beat frequency")]
    CarrierTooLow { index: usize },

    #[error("invalid phase span: {0}")]
    InvalidPhaseSpan(String),

    #[error("failed to parse: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Failure reported by an audio output backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("no audio output device available")]
    NoOutputDevice,

    #[error("audio output is suspended until a user gesture")]
    GestureRequired,

    #[error("sample rate must be positive and finite")]
    InvalidSampleRate,

    #[error("audio stream error: {0}")]
    Stream(String),
}

/// Errors surfaced by the control facade.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("audio engine unavailable: {0}")]
    EngineUnavailable(#[from] BackendError),
}

impl EngineError {
    /// Stable numeric code used by the C and wasm bindings.
    pub fn code(&self) -> i32 {
        match self {
            EngineError::Configuration(_) => 1,
            EngineError::EngineUnavailable(_) => 2,
        }
    }
}
