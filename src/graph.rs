//! Tone render graph.
//!
//! Fixed topology, processed in dependency order once per block:
//!
//! ```text
//!  left SineOsc  (carrier - beat/2) ──────────────┐
//!  right SineOsc (carrier + beat/2) ──────────────┤ equal-power
//!  iso SineOsc (carrier) ─> IsochronicGate (beat) ┤ mode crossfade ─> + ambient ─> MasterGain ─> out
//!                                                 │                                    └─> AnalyserTap
//!  AmbientPlayer ─────────────────────────────────┘
//! ```
//!
//! The binaural pair is routed to separate channels and never summed to
//! mono. The graph runs on the render side only and never blocks. Nothing
//! sizable is freed here: replaced ambient tracks and the graph itself are
//! sent back over the release channel.

use std::f32::consts::FRAC_PI_2;
use std::sync::{
    Arc,
    atomic::Ordering,
    mpsc::{Receiver, Sender, TryRecvError},
};

use crate::{
    analyser::AnalyserTap,
    audio_buffer::AudioBuffer,
    bridge::{FrequencySlot, Released, SharedReadback},
    event::ToneCommand,
    node::{Node, ProcessContext},
    nodes::{AmbientPlayer, IsochronicGate, MasterGain, SineOsc, params},
    parameter::SmoothedParam,
    state::{EngineConfig, ms_to_frames},
};

/// Headroom for the tone path so tone + ambient stays below full scale.
const TONE_LEVEL: f32 = 0.5;

const DEFAULT_BEAT_HZ: f32 = 10.0;
const DEFAULT_CARRIER_HZ: f32 = 200.0;

/// Render-side audio graph for one session.
pub struct ToneGraph {
    command_rx: Receiver<ToneCommand>,
    frequency: Arc<FrequencySlot>,
    /// Last frequency-slot sequence applied.
    frequency_seen: u64,
    readback: Arc<SharedReadback>,
    analyser: Arc<AnalyserTap>,
    releases: Sender<Released>,

    // Nodes
    left: SineOsc,
    right: SineOsc,
    iso_carrier: SineOsc,
    gate: IsochronicGate,
    ambient: AmbientPlayer,
    master: MasterGain,

    /// 0 = binaural, 1 = isochronic.
    mode_mix: SmoothedParam,

    // Scratch buffers (planar)
    left_buf: Vec<f32>,
    right_buf: Vec<f32>,
    iso_raw: Vec<f32>,
    iso_buf: Vec<f32>,
    ambient_buf: Vec<f32>,
    mix_buf: Vec<f32>,
    out_buf: Vec<f32>,

    sample_rate: f64,
    max_block: usize,

    /// Fade used if the control side disappears without a shutdown.
    disconnect_fade_frames: u32,

    shutting_down: bool,
    finished: bool,
}

impl ToneGraph {
    pub(crate) fn new(
        sample_rate: f64,
        config: &EngineConfig,
        command_rx: Receiver<ToneCommand>,
        frequency: Arc<FrequencySlot>,
        readback: Arc<SharedReadback>,
        analyser: Arc<AnalyserTap>,
        releases: Sender<Released>,
    ) -> Self {
        let max_block = config.max_block_size.max(1);

        let mut graph = Self {
            command_rx,
            frequency,
            frequency_seen: 0,
            readback,
            analyser,
            releases,
            left: SineOsc::new(DEFAULT_CARRIER_HZ - DEFAULT_BEAT_HZ / 2.0),
            right: SineOsc::new(DEFAULT_CARRIER_HZ + DEFAULT_BEAT_HZ / 2.0),
            iso_carrier: SineOsc::new(DEFAULT_CARRIER_HZ),
            gate: IsochronicGate::new(DEFAULT_BEAT_HZ),
            ambient: AmbientPlayer::new(),
            master: MasterGain::new(config.default_volume),
            mode_mix: SmoothedParam::new(0.0),
            left_buf: vec![0.0; max_block],
            right_buf: vec![0.0; max_block],
            iso_raw: vec![0.0; max_block],
            iso_buf: vec![0.0; max_block],
            ambient_buf: vec![0.0; max_block * 2],
            mix_buf: vec![0.0; max_block * 2],
            out_buf: vec![0.0; max_block * 2],
            sample_rate,
            max_block,
            disconnect_fade_frames: ms_to_frames(config.stop_fade_ms, sample_rate),
            shutting_down: false,
            finished: false,
        };
        graph.prepare();
        graph
    }

    fn prepare(&mut self) {
        let (sr, block) = (self.sample_rate, self.max_block);
        self.left.prepare(sr, block);
        self.right.prepare(sr, block);
        self.iso_carrier.prepare(sr, block);
        self.gate.prepare(sr, block);
        self.ambient.prepare(sr, block);
        self.master.prepare(sr, block);

        // Binaural pair starts phase-aligned.
        self.left.reset();
        self.right.reset();
        self.publish_frequency();
    }

    /// True once a shutdown fade has completed. The backend should release
    /// the graph; further renders produce silence.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Commands queued but not yet applied. Drains them.
    #[cfg(test)]
    pub(crate) fn pending_commands(&self) -> usize {
        self.command_rx.try_iter().count()
    }

    /// Hand the graph back to the control side to be freed there.
    pub fn retire(self) {
        let releases = self.releases.clone();
        // Control side gone: the graph is dropped here instead.
        let _ = releases.send(Released::Graph(self));
    }

    /// Render `left.len()` frames into two channel slices.
    ///
    /// Called from the backend's audio callback. Blocks larger than the
    /// configured maximum are processed in chunks.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let total = left.len().min(right.len());
        let mut offset = 0;

        while offset < total {
            let frames = (total - offset).min(self.max_block);
            self.drain_commands();
            self.take_frequency();

            if self.finished {
                left[offset..total].fill(0.0);
                right[offset..total].fill(0.0);
                break;
            }

            self.process_chunk(frames);
            left[offset..offset + frames].copy_from_slice(&self.out_buf[..frames]);
            right[offset..offset + frames]
                .copy_from_slice(&self.out_buf[frames..frames * 2]);
            self.analyser.write_stereo(
                &self.out_buf[..frames],
                &self.out_buf[frames..frames * 2],
            );

            offset += frames;
        }

        self.readback
            .frames_rendered
            .fetch_add(total as u64, Ordering::AcqRel);
    }

    fn drain_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.apply(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.shutting_down {
                        let fade_frames = self.disconnect_fade_frames;
                        self.apply(ToneCommand::Shutdown { fade_frames });
                    }
                    break;
                }
            }
        }
    }

    /// Ramp to the newest published frequency target, if there is one.
    fn take_frequency(&mut self) {
        if let Some((beat_hz, carrier_hz, ramp_frames)) =
            self.frequency.take_newer(&mut self.frequency_seen)
        {
            let half = beat_hz * 0.5;
            self.left.ramp_param(params::FREQ, carrier_hz - half, ramp_frames);
            self.right.ramp_param(params::FREQ, carrier_hz + half, ramp_frames);
            self.iso_carrier.ramp_param(params::FREQ, carrier_hz, ramp_frames);
            self.gate.ramp_param(params::RATE, beat_hz, ramp_frames);
        }
    }

    fn publish_frequency(&self) {
        self.readback
            .beat_bits
            .store(self.gate.rate().to_bits(), Ordering::Relaxed);
        self.readback
            .carrier_bits
            .store(self.iso_carrier.frequency().to_bits(), Ordering::Relaxed);
    }

    /// Apply a command immediately.
    fn apply(&mut self, cmd: ToneCommand) {
        match cmd {
            ToneCommand::SnapFrequency { beat_hz, carrier_hz } => {
                let half = beat_hz * 0.5;
                self.left.set_param(params::FREQ, carrier_hz - half);
                self.right.set_param(params::FREQ, carrier_hz + half);
                self.iso_carrier.set_param(params::FREQ, carrier_hz);
                self.gate.set_param(params::RATE, beat_hz);
            }

            ToneCommand::SetMode {
                isochronic,
                crossfade_frames,
            } => {
                let target = if isochronic { 1.0 } else { 0.0 };
                self.mode_mix.ramp_to(target, crossfade_frames);
            }

            ToneCommand::SetVolume { volume, ramp_frames } => {
                self.master.ramp_param(params::VOLUME, volume, ramp_frames);
            }

            ToneCommand::Fade { target, ramp_frames } => {
                // A shutdown fade is final.
                if !self.shutting_down {
                    self.master.ramp_param(params::FADE, target, ramp_frames);
                }
            }

            ToneCommand::SetAmbient { track } => {
                if let Some(previous) = self.ambient.set_track(track) {
                    // Control side gone: nothing left to hand it to.
                    let _ = self.releases.send(Released::Track(previous));
                }
            }

            ToneCommand::SetAmbientGain { gain, ramp_frames } => {
                self.ambient.ramp_param(params::GAIN, gain, ramp_frames);
            }

            ToneCommand::Shutdown { fade_frames } => {
                if !self.shutting_down {
                    self.shutting_down = true;
                    self.master.ramp_param(params::FADE, 0.0, fade_frames);
                }
            }
        }
    }

    fn process_chunk(&mut self, frames: usize) {
        let ctx = ProcessContext::new(frames);

        // Sources
        self.left
            .process(&ctx, &[], &mut AudioBuffer::new(&mut self.left_buf[..frames], 1));
        self.right
            .process(&ctx, &[], &mut AudioBuffer::new(&mut self.right_buf[..frames], 1));
        self.iso_carrier
            .process(&ctx, &[], &mut AudioBuffer::new(&mut self.iso_raw[..frames], 1));
        self.ambient.process(
            &ctx,
            &[],
            &mut AudioBuffer::new(&mut self.ambient_buf[..frames * 2], 2),
        );

        // Isochronic gating
        {
            let input = AudioBuffer::new(&mut self.iso_raw[..frames], 1);
            let mut output = AudioBuffer::new(&mut self.iso_buf[..frames], 1);
            self.gate.process(&ctx, &[&input], &mut output);
        }

        // Mode crossfade + ambient bed
        {
            let (amb_left, amb_right) = self.ambient_buf[..frames * 2].split_at(frames);
            let (mix_left, mix_right) = self.mix_buf[..frames * 2].split_at_mut(frames);

            for i in 0..frames {
                let (binaural_gain, iso_gain) = crossfade_gains(self.mode_mix.next());
                let iso = self.iso_buf[i] * iso_gain;

                mix_left[i] = self.left_buf[i] * binaural_gain + iso + amb_left[i];
                mix_right[i] = self.right_buf[i] * binaural_gain + iso + amb_right[i];
            }
        }

        // Master stage
        {
            let input = AudioBuffer::new(&mut self.mix_buf[..frames * 2], 2);
            let mut output = AudioBuffer::new(&mut self.out_buf[..frames * 2], 2);
            self.master.process(&ctx, &[&input], &mut output);
        }

        self.publish_frequency();

        if self.shutting_down && self.master.is_silent() {
            self.finished = true;
            self.readback.finished.store(true, Ordering::Release);
        }
    }
}

impl Drop for ToneGraph {
    fn drop(&mut self) {
        // However the graph goes away, the control side sees it as done.
        self.readback.finished.store(true, Ordering::Release);
    }
}

/// Equal-power crossfade gains `(binaural, isochronic)` scaled by the
/// tone level. The endpoints are exact so a settled mode has no residue
/// of the other path.
#[inline]
fn crossfade_gains(mix: f32) -> (f32, f32) {
    if mix <= 0.0 {
        (TONE_LEVEL, 0.0)
    } else if mix >= 1.0 {
        (0.0, TONE_LEVEL)
    } else {
        let theta = mix * FRAC_PI_2;
        (theta.cos() * TONE_LEVEL, theta.sin() * TONE_LEVEL)
    }
}
