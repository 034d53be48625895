// src/nodes/audio_player.rs
//
// Ambient Player Node - Loops a pre-rendered background track.
//
// Ambient beds (rain, noise, drones) are rendered offline and handed to the
// engine as raw samples. This node only loops and mixes them; it never
// decodes or synthesizes anything.

use std::sync::Arc;

use crate::audio_buffer::AudioBuffer;
use crate::node::{Node, ProcessContext};
use crate::parameter::SmoothedParam;

use super::params;

/// Ramp applied when a track is swapped in, in seconds.
const SWAP_FADE_SECS: f64 = 0.05;

/// Pre-rendered ambient audio shared between the control and audio threads.
#[derive(Debug, Clone)]
pub struct AmbientTrack {
    /// Display name, for logging.
    pub name: String,
    /// Sample rate the track was rendered at.
    pub sample_rate: f64,
    /// Number of channels (1 = mono, 2 = stereo).
    pub channels: usize,
    /// Total number of frames.
    pub frames: usize,
    /// Interleaved sample data.
    pub samples: Arc<Vec<f32>>,
}

impl AmbientTrack {
    /// Wrap interleaved samples. Channels outside 1..=2 are clamped.
    pub fn new(name: impl Into<String>, sample_rate: f64, channels: usize, samples: Vec<f32>) -> Self {
        let channels = channels.clamp(1, 2);
        Self {
            name: name.into(),
            sample_rate,
            channels,
            frames: samples.len() / channels,
            samples: Arc::new(samples),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Sample for `channel` at fractional frame `pos`, looping.
    #[inline]
    fn sample_at(&self, pos: f64, channel: usize) -> f32 {
        let ch = channel.min(self.channels - 1);
        let i0 = pos.floor() as usize % self.frames;
        let i1 = (i0 + 1) % self.frames;
        let frac = (pos - pos.floor()) as f32;
        let s0 = self.samples[i0 * self.channels + ch];
        let s1 = self.samples[i1 * self.channels + ch];
        s0 + (s1 - s0) * frac
    }
}

/// Loops an [`AmbientTrack`] into a stereo output with its own gain.
pub struct AmbientPlayer {
    track: Option<AmbientTrack>,

    /// Read position in source frames.
    position: f64,

    /// Source frames advanced per output frame.
    step: f64,

    gain: SmoothedParam,
    target_gain: f32,
    sample_rate: f64,
}

impl AmbientPlayer {
    pub fn new() -> Self {
        Self {
            track: None,
            position: 0.0,
            step: 1.0,
            gain: SmoothedParam::new(0.0),
            target_gain: 0.0,
            sample_rate: 48_000.0,
        }
    }

    /// Swap the looping track. The new track fades in from silence.
    ///
    /// Returns the previous track so the caller decides where it is dropped.
    pub fn set_track(&mut self, track: Option<AmbientTrack>) -> Option<AmbientTrack> {
        let track = track.filter(|t| !t.is_empty());
        self.position = 0.0;
        self.step = track
            .as_ref()
            .map(|t| t.sample_rate / self.sample_rate)
            .unwrap_or(1.0);
        self.gain.set(0.0);
        let fade = (SWAP_FADE_SECS * self.sample_rate) as u32;
        self.gain.ramp_to(self.target_gain, fade);
        std::mem::replace(&mut self.track, track)
    }
}

impl Default for AmbientPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for AmbientPlayer {
    fn prepare(&mut self, sample_rate: f64, _max_block: usize) {
        self.sample_rate = sample_rate;
        if let Some(track) = &self.track {
            self.step = track.sample_rate / sample_rate;
        }
    }

    fn process(
        &mut self,
        ctx: &ProcessContext,
        _inputs: &[&AudioBuffer],
        output: &mut AudioBuffer,
    ) -> bool {
        let Some(track) = &self.track else {
            output.clear();
            return true;
        };

        let (left, right) = output.stereo_mut();
        for i in 0..ctx.frames {
            let gain = self.gain.next();
            left[i] = track.sample_at(self.position, 0) * gain;
            right[i] = track.sample_at(self.position, 1) * gain;
            self.position += self.step;
            if self.position >= track.frames as f64 {
                self.position -= track.frames as f64;
            }
        }

        false
    }

    fn set_param(&mut self, param_id: u32, value: f32) {
        if param_id == params::GAIN {
            self.target_gain = value.clamp(0.0, 1.0);
            self.gain.set(self.target_gain);
        }
    }

    fn ramp_param(&mut self, param_id: u32, value: f32, frames: u32) {
        if param_id == params::GAIN {
            self.target_gain = value.clamp(0.0, 1.0);
            self.gain.ramp_to(self.target_gain, frames);
        }
    }

    fn reset(&mut self) {
        self.position = 0.0;
    }
}
