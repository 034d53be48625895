// Amplitude gating for isochronic tones.

use crate::audio_buffer::AudioBuffer;
use crate::node::{Node, ProcessContext};
use crate::parameter::SmoothedParam;

use super::params;

// ═══════════════════════════════════════════════════════════════════
// Isochronic Gate
// ═══════════════════════════════════════════════════════════════════

/// Periodic on/off gate applied to its input at the beat rate.
///
/// The raw square gate is passed through a one-pole smoother so each edge
/// takes a few milliseconds instead of switching instantly.
pub struct IsochronicGate {
    rate: SmoothedParam,

    /// Gate phase in cycles [0, 1).
    phase: f32,

    /// Fraction of each cycle the gate is open.
    duty: f32,

    /// Edge time constant in seconds.
    edge: f32,

    smooth_level: f32,
    coeff: f32,
    sample_rate: f32,
}

impl IsochronicGate {
    pub fn new(rate_hz: f32) -> Self {
        let mut gate = Self {
            rate: SmoothedParam::new(rate_hz),
            phase: 0.0,
            duty: 0.5,
            edge: 0.004,
            smooth_level: 0.0,
            coeff: 0.0,
            sample_rate: 48_000.0,
        };
        gate.update_coeff();
        gate
    }

    fn update_coeff(&mut self) {
        let samples = (self.edge * self.sample_rate).max(1.0);
        self.coeff = 1.0 - (-1.0 / samples).exp();
    }

    #[inline]
    pub fn rate(&self) -> f32 {
        self.rate.value()
    }

    #[inline]
    fn next_gain(&mut self, inv_rate: f32) -> f32 {
        let raw = if self.phase < self.duty { 1.0 } else { 0.0 };
        self.smooth_level += (raw - self.smooth_level) * self.coeff;
        self.phase = (self.phase + self.rate.next() * inv_rate).fract();
        self.smooth_level
    }
}

impl Default for IsochronicGate {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl Node for IsochronicGate {
    fn prepare(&mut self, sample_rate: f64, _max_block: usize) {
        self.sample_rate = sample_rate as f32;
        self.update_coeff();
    }

    fn process(
        &mut self,
        ctx: &ProcessContext,
        inputs: &[&AudioBuffer],
        output: &mut AudioBuffer,
    ) -> bool {
        let inv_rate = 1.0 / self.sample_rate;
        let input = inputs.first().map(|i| i.channel(0));
        let buf = output.channel_mut(0);

        let mut produced_sound = false;
        for i in 0..ctx.frames {
            let gain = self.next_gain(inv_rate);
            if gain > 0.0 {
                produced_sound = true;
            }
            // Without input, emit the gate itself
            buf[i] = match input {
                Some(input) => input.get(i).copied().unwrap_or(0.0) * gain,
                None => gain,
            };
        }

        !produced_sound
    }

    fn set_param(&mut self, param_id: u32, value: f32) {
        match param_id {
            params::RATE => self.rate.set(value.max(0.0)),
            params::DUTY => self.duty = value.clamp(0.05, 0.95),
            params::EDGE => {
                self.edge = value.max(0.0001);
                self.update_coeff();
            }
            _ => {}
        }
    }

    fn ramp_param(&mut self, param_id: u32, value: f32, frames: u32) {
        match param_id {
            params::RATE => self.rate.ramp_to(value.max(0.0), frames),
            _ => self.set_param(param_id, value),
        }
    }

    fn reset(&mut self) {
        self.phase = 0.0;
        self.smooth_level = 0.0;
    }
}
