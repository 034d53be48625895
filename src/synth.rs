// src/synth.rs

use log::debug;

use crate::analyser::AnalyserHandle;
use crate::bridge::{GraphHandle, create_bridge};
use crate::context::AudioContext;
use crate::error::EngineError;
use crate::event::ToneCommand;
use crate::nodes::AmbientTrack;
use crate::scheduler::FrequencyTarget;
use crate::state::{EngineConfig, ms_to_frames};

/// Control-side tone synthesizer.
///
/// Owns the session's [`GraphHandle`] and translates engine-level intents
/// (frequencies, volume, mode, fades) into render commands. Settings made
/// while no graph exists are remembered and applied on the next `start`.
pub struct ToneSynthesizer {
    config: EngineConfig,
    handle: Option<GraphHandle>,

    volume: f32,
    isochronic: bool,
    ambient: Option<AmbientTrack>,
    ambient_gain: f32,
}

impl ToneSynthesizer {
    pub fn new(config: EngineConfig) -> Self {
        let volume = config.default_volume.clamp(0.0, 1.0);
        Self {
            config,
            handle: None,
            volume,
            isochronic: false,
            ambient: None,
            ambient_gain: 0.0,
        }
    }

    /// True while a render graph is connected and still playing.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.live().is_some()
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        self.volume
    }

    #[inline]
    pub fn is_isochronic(&self) -> bool {
        self.isochronic
    }

    #[inline]
    pub fn ambient_gain(&self) -> f32 {
        self.ambient_gain
    }

    /// Build a fresh graph and attach it to the context. The graph starts
    /// silent; call [`fade_in`](Self::fade_in) once frequencies are set.
    ///
    /// The context is acquired before anything is torn down, so on
    /// failure the previous graph (if any) keeps playing.
    pub fn start(&mut self, context: &AudioContext) -> Result<(), EngineError> {
        let sample_rate = context.acquire()?;
        self.stop();

        let (handle, graph) = create_bridge(sample_rate, &self.config, context.release_sender());
        handle.send(ToneCommand::SetVolume {
            volume: self.volume,
            ramp_frames: 0,
        });
        handle.send(ToneCommand::SetMode {
            isochronic: self.isochronic,
            crossfade_frames: 0,
        });
        if self.ambient.is_some() {
            handle.send(ToneCommand::SetAmbient {
                track: self.ambient.clone(),
            });
        }
        handle.send(ToneCommand::SetAmbientGain {
            gain: self.ambient_gain,
            ramp_frames: 0,
        });

        context.attach(graph);
        self.handle = Some(handle);
        debug!("Tone graph attached at {sample_rate} Hz");
        Ok(())
    }

    /// Fade out and release the graph. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let fade_frames = ms_to_frames(self.config.stop_fade_ms, handle.sample_rate());
            handle.send(ToneCommand::Shutdown { fade_frames });
            debug!(
                "Tone graph released after {} frames",
                handle.frames_rendered()
            );
        }
    }

    /// Jump to frequencies without a ramp. Only used while silent.
    pub fn snap_frequency(&self, beat_hz: f64, carrier_hz: f64) {
        self.send(ToneCommand::SnapFrequency {
            beat_hz: beat_hz as f32,
            carrier_hz: carrier_hz as f32,
        });
    }

    /// Ramp to new target frequencies over `ramp_secs`.
    ///
    /// Overwrites any target the graph has not rendered yet, so calling
    /// this every tick while output is suspended queues nothing.
    pub fn apply_frequency(&self, beat_hz: f64, carrier_hz: f64, ramp_secs: f64) {
        if let Some(handle) = self.live() {
            let ramp_frames = ms_to_frames(ramp_secs * 1_000.0, handle.sample_rate());
            handle.set_frequency(beat_hz as f32, carrier_hz as f32, ramp_frames);
        }
    }

    /// Frequencies the graph was producing at the end of its last block.
    pub fn output_frequency(&self) -> Option<FrequencyTarget> {
        self.live().map(GraphHandle::output_frequency)
    }

    /// Set the user volume, clamped to [0, 1]. Returns the effective value.
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.volume = clamp_unit(volume);
        self.send_ramped(self.config.volume_ramp_ms, |ramp_frames| {
            ToneCommand::SetVolume {
                volume: self.volume,
                ramp_frames,
            }
        });
        self.volume
    }

    /// Switch between binaural and isochronic paths with a short crossfade.
    pub fn set_isochronic(&mut self, isochronic: bool) {
        self.isochronic = isochronic;
        self.send_ramped(self.config.mode_crossfade_ms, |crossfade_frames| {
            ToneCommand::SetMode {
                isochronic,
                crossfade_frames,
            }
        });
    }

    pub fn fade_in(&self, duration_ms: f64) {
        self.send_ramped(duration_ms, |ramp_frames| ToneCommand::Fade {
            target: 1.0,
            ramp_frames,
        });
    }

    pub fn fade_out(&self, duration_ms: f64) {
        self.send_ramped(duration_ms, |ramp_frames| ToneCommand::Fade {
            target: 0.0,
            ramp_frames,
        });
    }

    /// Replace the ambient bed. Remembered across sessions.
    pub fn set_ambient(&mut self, track: Option<AmbientTrack>) {
        self.ambient = track.clone();
        self.send(ToneCommand::SetAmbient { track });
    }

    /// Set the ambient bed gain, clamped to [0, 1]. Returns the effective value.
    pub fn set_ambient_gain(&mut self, gain: f32) -> f32 {
        self.ambient_gain = clamp_unit(gain);
        self.send_ramped(self.config.volume_ramp_ms, |ramp_frames| {
            ToneCommand::SetAmbientGain {
                gain: self.ambient_gain,
                ramp_frames,
            }
        });
        self.ambient_gain
    }

    /// Live output samples, if a graph is connected.
    pub fn analyser_handle(&self) -> Option<AnalyserHandle> {
        self.handle.as_ref().map(GraphHandle::analyser)
    }

    /// The session graph, unless it has finished or the backend dropped it.
    fn live(&self) -> Option<&GraphHandle> {
        self.handle.as_ref().filter(|handle| !handle.is_finished())
    }

    fn send(&self, cmd: ToneCommand) {
        if let Some(handle) = self.live() {
            handle.send(cmd);
        }
    }

    fn send_ramped(&self, ms: f64, make: impl FnOnce(u32) -> ToneCommand) {
        if let Some(handle) = self.live() {
            handle.send(make(ms_to_frames(ms, handle.sample_rate())));
        }
    }
}

/// Clamp to [0, 1]; NaN maps to 0.
fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Availability, OfflineBackend, RenderPort};
    use crate::error::BackendError;

    fn setup() -> (OfflineBackend, RenderPort, AudioContext, ToneSynthesizer) {
        let (backend, port) = OfflineBackend::new(48_000.0, 512);
        let context = AudioContext::new(backend.clone());
        let synth = ToneSynthesizer::new(EngineConfig::default());
        (backend, port, context, synth)
    }

    #[test]
    fn test_start_fade_in_produces_audio() {
        let (_backend, mut port, context, mut synth) = setup();
        synth.start(&context).unwrap();
        synth.snap_frequency(10.0, 200.0);
        synth.fade_in(10.0);

        port.render(4_800);
        let analyser = synth.analyser_handle().unwrap();
        assert!(analyser.peak() > 0.1);
    }

    #[test]
    fn test_stop_is_idempotent_and_releases_graph() {
        let (_backend, mut port, context, mut synth) = setup();
        synth.start(&context).unwrap();
        synth.fade_in(0.0);
        port.render(512);

        synth.stop();
        synth.stop();
        assert!(!synth.is_active());
        assert!(synth.analyser_handle().is_none());

        port.render(48_000);
        assert_eq!(port.connected_graphs(), 0);
        assert_eq!(context.reclaim(), 1);
    }

    #[test]
    fn test_volume_is_clamped() {
        let (_, _, _, mut synth) = setup();
        assert_eq!(synth.set_volume(1.5), 1.0);
        assert_eq!(synth.set_volume(-0.2), 0.0);
        assert_eq!(synth.set_volume(f32::NAN), 0.0);
    }

    #[test]
    fn test_unavailable_backend_keeps_previous_graph() {
        let (backend, _port, context, mut synth) = setup();
        synth.start(&context).unwrap();
        context.suspend();
        backend.set_availability(Availability::GestureRequired);

        let err = synth.start(&context).unwrap_err();
        assert!(matches!(
            err,
            EngineError::EngineUnavailable(BackendError::GestureRequired)
        ));
        assert!(synth.is_active());
    }

    #[test]
    fn test_settings_before_start_are_applied() {
        let (_backend, mut port, context, mut synth) = setup();
        synth.set_isochronic(true);
        synth.set_volume(0.5);
        synth.start(&context).unwrap();
        synth.snap_frequency(10.0, 200.0);
        synth.fade_in(0.0);

        let (left, right) = port.render(2_048);
        assert_eq!(left, right);
        assert!(left.iter().all(|s| s.abs() <= 0.5 * 0.5 + 1e-6));
    }

    #[test]
    fn test_detached_graph_is_no_longer_active() {
        let (_backend, mut port, context, mut synth) = setup();
        synth.start(&context).unwrap();
        port.render(128);
        assert!(synth.is_active());

        context.detach();
        port.render(128);
        assert!(synth.is_active(), "parked until the control side frees it");
        context.reclaim();
        assert!(!synth.is_active());
        assert!(synth.output_frequency().is_none());
    }

    #[test]
    fn test_frequency_targets_do_not_queue_while_suspended() {
        let (_backend, mut port, context, mut synth) = setup();
        synth.start(&context).unwrap();
        synth.snap_frequency(10.0, 200.0);
        port.render(128);
        context.suspend();

        for i in 0..36_000_u32 {
            synth.apply_frequency(10.0 - f64::from(i) * 1e-4, 200.0, 0.016);
        }
        assert_eq!(port.pending_graph_commands(), 0);

        context.acquire().unwrap();
        port.render(1_024);
        let sounding = synth.output_frequency().unwrap();
        assert!((sounding.beat_hz - 6.4001).abs() < 1e-3);
    }
}
