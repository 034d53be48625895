// src/lib.rs
//
// Library entry point for Rust, C/Swift and WebAssembly hosts.

mod analyser;
mod audio_buffer;
mod bridge;
mod context;
mod engine;
mod error;
mod event;
mod graph;
mod node;
mod nodes;
mod parameter;
mod phase;
mod scheduler;
mod state;
mod synth;
mod transport;

pub mod ffi;

#[cfg(feature = "native")]
mod output;

#[cfg(feature = "web")]
mod wasm;


// Re-export key types for Rust consumers
pub use analyser::AnalyserHandle;
pub use bridge::Released;
pub use context::{
    AudioBackend, AudioContext, Availability, ContextState, OfflineBackend, RenderPort,
};
pub use engine::{AudioEngine, SessionObserver};
pub use error::{BackendError, ConfigError, EngineError};
pub use graph::ToneGraph;
pub use nodes::AmbientTrack;
pub use phase::{COMPLETE_LABEL, INTRO_LABEL, OUTRO_LABEL, PhaseMap, PhaseTransition};
pub use scheduler::{EnvelopeScheduler, FrequencyTarget};
pub use state::*;
pub use transport::{SessionClock, Timestamp};

#[cfg(feature = "native")]
pub use output::CpalBackend;
