// src/node.rs

use crate::audio_buffer::AudioBuffer;

/// Context passed to nodes during processing.
///
/// Nodes capture the sample rate in `prepare`; a block only needs its length.
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext {
    /// Number of frames to process
    pub frames: usize,
}

impl ProcessContext {
    pub fn new(frames: usize) -> Self {
        Self { frames }
    }
}

/// Core DSP node trait.
///
/// Nodes:
/// - do NOT know about sessions or elapsed time
/// - do NOT allocate
/// - ONLY process audio for the given context
pub trait Node: Send {
    /// Called once before the graph renders its first block.
    fn prepare(&mut self, sample_rate: f64, max_block: usize);

    /// Process audio.
    ///
    /// Arguments:
    /// - `ctx`: Processing context (block length)
    /// - `inputs`: Buffers from upstream nodes (may be empty for sources)
    /// - `output`: Buffer to write output to
    ///
    /// Returns `true` if the output is silent (optimization hint).
    fn process(
        &mut self,
        ctx: &ProcessContext,
        inputs: &[&AudioBuffer],
        output: &mut AudioBuffer,
    ) -> bool;

    /// Set a parameter value immediately.
    fn set_param(&mut self, param_id: u32, value: f32);

    /// Move a parameter to `value` over `frames` samples.
    ///
    /// Nodes without smoothing for `param_id` jump immediately.
    fn ramp_param(&mut self, param_id: u32, value: f32, frames: u32) {
        let _ = frames;
        self.set_param(param_id, value);
    }

    /// Reset node state (phase, envelopes).
    fn reset(&mut self) {}
}
