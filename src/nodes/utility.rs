// Master gain stage.

use crate::audio_buffer::AudioBuffer;
use crate::node::{Node, ProcessContext};
use crate::parameter::SmoothedParam;

use super::params;

// ═══════════════════════════════════════════════════════════════════
// Master Gain (final stage before output)
// ═══════════════════════════════════════════════════════════════════

/// Stereo gain stage carrying the user volume and the session fade.
///
/// The two are kept separate so a fade-out during pause does not lose the
/// volume setting, and a volume change mid-fade does not cancel the fade.
/// Effective gain is `volume * fade`, both ramped per sample.
pub struct MasterGain {
    volume: SmoothedParam,
    fade: SmoothedParam,
}

impl MasterGain {
    pub fn new(volume: f32) -> Self {
        Self {
            volume: SmoothedParam::new(volume.clamp(0.0, 1.0)),
            fade: SmoothedParam::new(0.0),
        }
    }

    /// Faded all the way out with nothing pending.
    #[inline]
    pub fn is_silent(&self) -> bool {
        !self.fade.is_ramping() && self.fade.value() <= 0.0
    }
}

impl Default for MasterGain {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Node for MasterGain {
    fn prepare(&mut self, _sample_rate: f64, _max_block: usize) {}

    fn process(
        &mut self,
        ctx: &ProcessContext,
        inputs: &[&AudioBuffer],
        output: &mut AudioBuffer,
    ) -> bool {
        let Some(input) = inputs.first() else {
            output.clear();
            return true;
        };

        let in_left = input.channel(0);
        let in_right = input.channel(input.channels.saturating_sub(1).min(1));
        let (out_left, out_right) = output.stereo_mut();

        for i in 0..ctx.frames {
            let gain = self.volume.next() * self.fade.next();
            out_left[i] = in_left.get(i).copied().unwrap_or(0.0) * gain;
            out_right[i] = in_right.get(i).copied().unwrap_or(0.0) * gain;
        }

        self.is_silent()
    }

    fn set_param(&mut self, param_id: u32, value: f32) {
        match param_id {
            params::VOLUME => self.volume.set(value.clamp(0.0, 1.0)),
            params::FADE => self.fade.set(value.clamp(0.0, 1.0)),
            _ => {}
        }
    }

    fn ramp_param(&mut self, param_id: u32, value: f32, frames: u32) {
        match param_id {
            params::VOLUME => self.volume.ramp_to(value.clamp(0.0, 1.0), frames),
            params::FADE => self.fade.ramp_to(value.clamp(0.0, 1.0), frames),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(gain: &mut MasterGain, frames: usize) -> Vec<f32> {
        let ctx = ProcessContext::new(frames);
        let mut input_data = vec![1.0; frames * 2];
        let input = AudioBuffer::new(&mut input_data, 2);
        let mut data = vec![0.0; frames * 2];
        let mut out = AudioBuffer::new(&mut data, 2);
        gain.process(&ctx, &[&input], &mut out);
        data
    }

    #[test]
    fn test_starts_silent() {
        let mut gain = MasterGain::new(0.8);
        let out = run(&mut gain, 64);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(gain.is_silent());
    }

    #[test]
    fn test_fade_in_reaches_volume() {
        let mut gain = MasterGain::new(0.5);
        gain.ramp_param(params::FADE, 1.0, 100);
        let out = run(&mut gain, 200);
        assert!(out[10] < out[50]);
        assert_eq!(out[150], 0.5);
        assert_eq!(out[200 + 150], 0.5);
    }

    #[test]
    fn test_volume_ramp_keeps_fade() {
        let mut gain = MasterGain::new(1.0);
        gain.set_param(params::FADE, 1.0);
        gain.ramp_param(params::VOLUME, 0.25, 10);
        let out = run(&mut gain, 20);
        assert_eq!(out[19], 0.25);
        assert!(!gain.is_silent());
    }
}
