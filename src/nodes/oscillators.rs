// Carrier oscillators.

use std::f32::consts::TAU;

use crate::audio_buffer::AudioBuffer;
use crate::node::{Node, ProcessContext};
use crate::parameter::SmoothedParam;

use super::params;

/// Starting phase in cycles. Oscillators that must stay phase-coherent
/// (the binaural pair) are reset together to this value.
const PHASE_START: f32 = 0.0;

// ═══════════════════════════════════════════════════════════════════
// Sine Oscillator
// ═══════════════════════════════════════════════════════════════════

/// Mono sine with ramped frequency and level.
///
/// Frequency moves along linear ramps while the phase accumulator runs
/// continuously, so retargeting never produces a discontinuity.
pub struct SineOsc {
    phase: f32,
    freq: SmoothedParam,
    level: SmoothedParam,
    sample_rate: f32,
}

impl SineOsc {
    pub fn new(freq: f32) -> Self {
        Self {
            phase: PHASE_START,
            freq: SmoothedParam::new(freq),
            level: SmoothedParam::new(1.0),
            sample_rate: 48_000.0,
        }
    }

    #[inline]
    pub fn frequency(&self) -> f32 {
        self.freq.value()
    }
}

impl Default for SineOsc {
    fn default() -> Self {
        Self::new(200.0)
    }
}

impl Node for SineOsc {
    fn prepare(&mut self, sample_rate: f64, _max_block: usize) {
        self.sample_rate = sample_rate as f32;
    }

    fn process(
        &mut self,
        ctx: &ProcessContext,
        _inputs: &[&AudioBuffer],
        output: &mut AudioBuffer,
    ) -> bool {
        let inv_rate = 1.0 / self.sample_rate;
        let buf = output.channel_mut(0);

        for sample in buf.iter_mut().take(ctx.frames) {
            *sample = (self.phase * TAU).sin() * self.level.next();
            let inc = self.freq.next() * inv_rate;
            self.phase = (self.phase + inc).fract();
        }

        false
    }

    fn set_param(&mut self, param_id: u32, value: f32) {
        match param_id {
            params::FREQ => self.freq.set(value.max(0.0)),
            params::LEVEL => self.level.set(value.max(0.0)),
            _ => {}
        }
    }

    fn ramp_param(&mut self, param_id: u32, value: f32, frames: u32) {
        match param_id {
            params::FREQ => self.freq.ramp_to(value.max(0.0), frames),
            params::LEVEL => self.level.ramp_to(value.max(0.0), frames),
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.phase = PHASE_START;
    }
}
