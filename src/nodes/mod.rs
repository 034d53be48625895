// src/nodes/mod.rs
//
// DSP nodes used by the tone graph.

mod audio_player;
mod envelope;
mod oscillators;
mod utility;

pub use audio_player::*;
pub use envelope::*;
pub use oscillators::*;
pub use utility::*;

// ═══════════════════════════════════════════════════════════════════
// Parameter IDs (per-node-type)
// ═══════════════════════════════════════════════════════════════════

pub mod params {
    // Oscillator params
    pub const FREQ: u32 = 0;
    pub const LEVEL: u32 = 1;

    // Isochronic gate params
    pub const RATE: u32 = 0;
    pub const DUTY: u32 = 1;
    pub const EDGE: u32 = 2;

    // Master gain params
    pub const VOLUME: u32 = 0;
    pub const FADE: u32 = 1;

    // Ambient player params
    pub const GAIN: u32 = 0;
}
