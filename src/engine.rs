// src/engine.rs
//
// Control facade.
//
// Orchestrates the envelope scheduler, the session clock, the phase
// tracker and the tone synthesizer, and publishes one consistent
// `AudioEngineState` after every operation. Everything here runs on the
// host's tick callback; nothing blocks.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::analyser::AnalyserHandle;
use crate::context::AudioContext;
use crate::error::EngineError;
use crate::nodes::AmbientTrack;
use crate::phase::{PhaseMap, PhaseTracker, PhaseTransition, phase_label};
use crate::scheduler::{EnvelopeScheduler, FrequencyTarget};
use crate::state::{AudioEngineState, BandTable, CompletionEvent, EngineConfig, Preset};
use crate::synth::ToneSynthesizer;
use crate::transport::{SessionClock, Timestamp};

/// Receives session notifications. Both methods default to no-ops.
pub trait SessionObserver {
    fn on_phase_change(&mut self, _transition: PhaseTransition, _label: &str) {}

    /// Called exactly once per session, on natural completion only.
    fn on_complete(&mut self, _event: &CompletionEvent) {}
}

struct CompletionCallback<F>(F);

impl<F: FnMut(&CompletionEvent)> SessionObserver for CompletionCallback<F> {
    fn on_complete(&mut self, event: &CompletionEvent) {
        (self.0)(event)
    }
}

/// Everything that lives for exactly one session.
struct ActiveSession {
    preset: Arc<Preset>,
    scheduler: EnvelopeScheduler,
    clock: SessionClock,
    phases: PhaseTracker,
    /// Clock value at the most recent time-carrying operation.
    elapsed: f64,
}

/// Notifications gathered during an operation, delivered after state is
/// published so observers always see the new snapshot.
#[derive(Default)]
struct Pending {
    transition: Option<(PhaseTransition, String)>,
    completion: Option<CompletionEvent>,
}

/// Public control surface of the engine.
pub struct AudioEngine {
    context: AudioContext,
    config: EngineConfig,
    bands: BandTable,
    synth: ToneSynthesizer,
    session: Option<ActiveSession>,
    breathing_guide: bool,
    observers: Vec<Box<dyn SessionObserver>>,
    state: AudioEngineState,
}

impl AudioEngine {
    pub fn new(context: AudioContext, config: EngineConfig) -> Self {
        let synth = ToneSynthesizer::new(config.clone());
        let state = AudioEngineState::idle(synth.volume(), false, false);
        Self {
            context,
            config,
            bands: BandTable::default(),
            synth,
            session: None,
            breathing_guide: false,
            observers: Vec::new(),
            state,
        }
    }

    /// Replace the band table used for `main` phase labels.
    pub fn with_bands(mut self, bands: BandTable) -> Self {
        self.bands = bands;
        self.publish();
        self
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Last published snapshot.
    #[inline]
    pub fn state(&self) -> &AudioEngineState {
        &self.state
    }

    /// Live output samples; `None` when no session is producing audio.
    pub fn analyser_handle(&self) -> Option<AnalyserHandle> {
        self.synth.analyser_handle()
    }

    /// Beat and carrier actually sounding, as of the last rendered block.
    /// Trails `state()` by at most one tick while a session plays.
    pub fn output_frequency(&self) -> Option<FrequencyTarget> {
        self.synth.output_frequency()
    }

    pub fn subscribe(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    /// Register a completion callback.
    pub fn on_complete(&mut self, callback: impl FnMut(&CompletionEvent) + 'static) {
        self.observers.push(Box::new(CompletionCallback(callback)));
    }

    // ───────────────────────────────────────────────────────────────
    // Lifecycle
    // ───────────────────────────────────────────────────────────────

    /// Start a new session, replacing any current one.
    ///
    /// A malformed preset is rejected before anything changes. If the
    /// audio output cannot be acquired the previous state is kept.
    pub fn start(
        &mut self,
        preset: impl Into<Arc<Preset>>,
        now: Timestamp,
    ) -> Result<&AudioEngineState, EngineError> {
        let preset = preset.into();

        let scheduler = EnvelopeScheduler::new(&preset).inspect_err(|e| {
            warn!("Rejected preset '{}': {e}", preset.id);
        })?;

        self.context.reclaim();
        self.synth.start(&self.context).inspect_err(|e| {
            warn!("Audio output unavailable: {e}");
        })?;

        if let Some(previous) = self.session.take() {
            if !previous.clock.status().is_terminal() {
                info!("Session '{}' replaced by '{}'", previous.preset.id, preset.id);
            }
        }

        let mut clock = SessionClock::new(preset.duration_secs);
        clock.start(now);

        let target = scheduler.target_at(0.0);
        self.synth.snap_frequency(target.beat_hz, target.carrier_hz);
        self.synth.fade_in(self.config.start_fade_ms);

        info!(
            "Session '{}' started ({:.0}s, {} breakpoints)",
            preset.id,
            preset.duration_secs,
            scheduler.len()
        );

        let mut session = ActiveSession {
            phases: PhaseTracker::new(PhaseMap::new(&preset)),
            preset,
            scheduler,
            clock,
            elapsed: 0.0,
        };

        let mut pending = Pending::default();
        self.observe_phase(&mut session, &mut pending, target.beat_hz);
        self.session = Some(session);

        self.publish();
        self.notify(pending);
        Ok(&self.state)
    }

    /// Pause a running session. No-op in any other state.
    pub fn pause(&mut self, now: Timestamp) -> &AudioEngineState {
        let pending = self.advance(now);

        if let Some(session) = self.session.as_mut() {
            if session.clock.pause(now) {
                session.elapsed = session.clock.elapsed(now);
                self.synth.fade_out(self.config.pause_fade_ms);
                debug!("Session paused at {:.2}s", session.elapsed);
            }
        }

        self.publish();
        self.notify(pending);
        &self.state
    }

    /// Resume a paused session. No-op in any other state.
    ///
    /// Fails with `EngineUnavailable` (state unchanged) if the output was
    /// suspended and cannot be resumed without a user gesture.
    pub fn resume(&mut self, now: Timestamp) -> Result<&AudioEngineState, EngineError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(&self.state);
        };
        if !session.clock.is_paused() {
            return Ok(&self.state);
        }

        let target = session.scheduler.target_at(session.elapsed);
        if self.synth.is_active() {
            self.context.acquire().inspect_err(|e| {
                warn!("Cannot resume audio output: {e}");
            })?;
        } else {
            // The backend let go of the graph while paused.
            self.synth.start(&self.context).inspect_err(|e| {
                warn!("Cannot rebuild tone graph: {e}");
            })?;
            self.synth.snap_frequency(target.beat_hz, target.carrier_hz);
            info!("Tone graph rebuilt for '{}'", session.preset.id);
        }

        session.clock.resume(now);
        self.synth.apply_frequency(
            target.beat_hz,
            target.carrier_hz,
            self.config.first_tick_ramp_ms * 0.001,
        );
        self.synth.fade_in(self.config.pause_fade_ms);
        debug!("Session resumed at {:.2}s", session.elapsed);

        self.publish();
        Ok(&self.state)
    }

    /// End the session early. Idempotent; a no-op once complete.
    pub fn stop(&mut self, now: Timestamp) -> &AudioEngineState {
        let pending = self.advance(now);

        if let Some(session) = self.session.as_mut() {
            if session.clock.stop(now) {
                session.elapsed = session.clock.elapsed(now);
                self.synth.stop();
                info!(
                    "Session '{}' stopped at {:.1}s",
                    session.preset.id, session.elapsed
                );
            }
        }

        self.publish();
        self.notify(pending);
        &self.state
    }

    /// Periodic update from the host's render loop.
    ///
    /// Also frees render objects the audio side has handed back.
    pub fn tick(&mut self, now: Timestamp) -> &AudioEngineState {
        self.context.reclaim();
        let pending = self.advance(now);
        self.publish();
        self.notify(pending);
        &self.state
    }

    // ───────────────────────────────────────────────────────────────
    // Settings
    // ───────────────────────────────────────────────────────────────

    /// Set master volume. Out-of-range values are clamped to [0, 1].
    pub fn set_volume(&mut self, volume: f32) -> &AudioEngineState {
        self.synth.set_volume(volume);
        self.publish();
        &self.state
    }

    pub fn toggle_isochronic(&mut self) -> &AudioEngineState {
        let isochronic = !self.synth.is_isochronic();
        self.synth.set_isochronic(isochronic);
        debug!(
            "Tone mode: {}",
            if isochronic { "isochronic" } else { "binaural" }
        );
        self.publish();
        &self.state
    }

    pub fn toggle_breathing_guide(&mut self) -> &AudioEngineState {
        self.breathing_guide = !self.breathing_guide;
        self.publish();
        &self.state
    }

    /// Replace the ambient background bed (`None` removes it).
    pub fn set_ambient(&mut self, track: Option<AmbientTrack>) -> &AudioEngineState {
        if let Some(track) = &track {
            debug!("Ambient bed: {}", track.name);
        }
        self.synth.set_ambient(track);
        self.publish();
        &self.state
    }

    /// Set ambient bed volume, clamped to [0, 1].
    pub fn set_ambient_volume(&mut self, volume: f32) -> &AudioEngineState {
        self.synth.set_ambient_gain(volume);
        self.publish();
        &self.state
    }

    // ───────────────────────────────────────────────────────────────
    // Internals
    // ───────────────────────────────────────────────────────────────

    /// Sample the clock, drive the synthesizer, detect phase changes and
    /// completion. Does nothing unless a session is running.
    fn advance(&mut self, now: Timestamp) -> Pending {
        let mut pending = Pending::default();

        let Some(mut session) = self.session.take() else {
            return pending;
        };
        if !session.clock.is_running() {
            self.session = Some(session);
            return pending;
        }

        let tick = session.clock.tick(now);
        session.elapsed = tick.elapsed;
        let target = session.scheduler.target_at(tick.elapsed);

        if tick.completed {
            self.synth.stop();
            info!(
                "Session '{}' complete ({:.1}s)",
                session.preset.id, tick.elapsed
            );
            pending.completion = Some(CompletionEvent {
                preset_id: session.preset.id.clone(),
                duration_secs: session.preset.duration_secs,
                completed_at_elapsed: tick.elapsed,
            });
        } else {
            let ramp_secs = if tick.interval > 0.0 {
                tick.interval.min(self.config.max_frequency_ramp_ms * 0.001)
            } else {
                self.config.first_tick_ramp_ms * 0.001
            };
            self.synth
                .apply_frequency(target.beat_hz, target.carrier_hz, ramp_secs);
        }

        self.observe_phase(&mut session, &mut pending, target.beat_hz);
        self.session = Some(session);
        pending
    }

    fn observe_phase(&self, session: &mut ActiveSession, pending: &mut Pending, beat_hz: f64) {
        if let Some(transition) = session.phases.observe(session.elapsed) {
            let label = phase_label(transition.to, beat_hz, &self.bands);
            debug!(
                "Phase {} -> {} ({label})",
                transition.from.map_or("none", |p| p.as_str()),
                transition.to.as_str()
            );
            pending.transition = Some((transition, label));
        }
    }

    /// Rebuild the snapshot from current component state.
    fn publish(&mut self) {
        let volume = self.synth.volume();
        let isochronic = self.synth.is_isochronic();

        let mut state = match &self.session {
            None => AudioEngineState::idle(volume, isochronic, self.breathing_guide),
            Some(session) => {
                let status = session.clock.status();
                let duration = session.preset.duration_secs;
                let elapsed = session.elapsed.min(duration);
                let target = session.scheduler.target_at(session.elapsed);
                let phase = session.phases.map().phase_at(session.elapsed);

                AudioEngineState {
                    preset: Some(Arc::clone(&session.preset)),
                    status,
                    phase,
                    phase_label: phase_label(phase, target.beat_hz, &self.bands),
                    elapsed_secs: elapsed,
                    duration_secs: duration,
                    remaining_secs: (duration - elapsed).max(0.0),
                    beat_hz: target.beat_hz,
                    carrier_hz: target.carrier_hz,
                    is_playing: session.clock.is_running(),
                    is_paused: session.clock.is_paused(),
                    volume,
                    ambient_volume: 0.0,
                    isochronic,
                    breathing_guide: self.breathing_guide,
                }
            }
        };
        state.ambient_volume = self.synth.ambient_gain();
        self.state = state;
    }

    fn notify(&mut self, pending: Pending) {
        if let Some((transition, label)) = pending.transition {
            for observer in &mut self.observers {
                observer.on_phase_change(transition, &label);
            }
        }
        if let Some(event) = pending.completion {
            for observer in &mut self.observers {
                observer.on_complete(&event);
            }
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.synth.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::context::{Availability, OfflineBackend, RenderPort};
    use crate::error::{BackendError, ConfigError};
    use crate::state::{
        EnvelopeBreakpoint, Interpolation, Phase, PhaseBoundaries, PlaybackStatus,
    };

    fn at(secs: f64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    fn engine() -> (OfflineBackend, RenderPort, AudioEngine) {
        engine_with(EngineConfig::default())
    }

    fn engine_with(config: EngineConfig) -> (OfflineBackend, RenderPort, AudioEngine) {
        let (backend, port) = OfflineBackend::new(48_000.0, 512);
        let engine = AudioEngine::new(AudioContext::new(backend.clone()), config);
        (backend, port, engine)
    }

    fn assert_sounding(engine: &AudioEngine, expected: FrequencyTarget) {
        let sounding = engine.output_frequency().unwrap();
        assert!(
            (sounding.beat_hz - expected.beat_hz).abs() < 1e-4
                && (sounding.carrier_hz - expected.carrier_hz).abs() < 1e-3,
            "sounding {sounding:?}, expected {expected:?}"
        );
    }

    fn two_step() -> Preset {
        Preset::new(
            "two-step",
            "Two Step",
            200.0,
            vec![
                EnvelopeBreakpoint::new(10.0, 60.0),
                EnvelopeBreakpoint::new(4.0, 120.0),
            ],
        )
    }

    #[test]
    fn test_fresh_engine_is_idle() {
        let (_, _, engine) = engine();
        let state = engine.state();
        assert_eq!(state.status, PlaybackStatus::Idle);
        assert!(state.preset.is_none());
        assert_eq!(state.volume, 0.7);
        assert!(engine.analyser_handle().is_none());
    }

    #[test]
    fn test_pause_resume_does_not_count_the_gap() {
        let (_, _, mut engine) = engine();
        engine.start(two_step(), at(0.0)).unwrap();
        let paused = engine.pause(at(0.0)).elapsed_secs;

        let resumed = engine.resume(at(5.0)).unwrap().elapsed_secs;
        assert_eq!(paused, resumed);
        assert_eq!(engine.tick(at(5.0)).elapsed_secs, 0.0);
        assert_eq!(engine.tick(at(6.0)).elapsed_secs, 1.0);
    }

    #[test]
    fn test_pause_freezes_state() {
        let (_, _, mut engine) = engine();
        engine.start(two_step(), at(0.0)).unwrap();
        engine.tick(at(10.0));
        let state = engine.pause(at(12.0));
        assert!(state.is_paused);
        assert!(!state.is_playing);
        assert_eq!(state.elapsed_secs, 12.0);

        assert_eq!(engine.tick(at(50.0)).elapsed_secs, 12.0);
        assert_eq!(engine.pause(at(60.0)).elapsed_secs, 12.0);
    }

    #[test]
    fn test_volume_clamps() {
        let (_, _, mut engine) = engine();
        assert_eq!(engine.set_volume(1.5).volume, 1.0);
        assert_eq!(engine.set_volume(-0.2).volume, 0.0);
        assert_eq!(engine.set_volume(0.4).volume, 0.4);
    }

    #[test]
    fn test_stop_twice_is_a_noop() {
        let (_, mut port, mut engine) = engine();
        engine.start(two_step(), at(0.0)).unwrap();
        let first = engine.stop(at(30.0)).clone();
        let second = engine.stop(at(40.0)).clone();

        assert_eq!(first.status, PlaybackStatus::Stopped);
        assert_eq!(first, second);
        assert_eq!(second.elapsed_secs, 30.0);
        assert!(engine.analyser_handle().is_none());

        port.render(48_000);
        assert_eq!(port.connected_graphs(), 0);
    }

    #[test]
    fn test_stop_immediately_after_start() {
        let (_, mut port, mut engine) = engine();
        engine.start(two_step(), at(0.0)).unwrap();
        let state = engine.stop(at(0.0));
        assert_eq!(state.status, PlaybackStatus::Stopped);
        port.render(48_000);
        assert_eq!(port.connected_graphs(), 0);
    }

    #[test]
    fn test_controls_on_never_started_engine_are_noops() {
        let (backend, _port, mut engine) = engine();
        assert_eq!(engine.pause(at(1.0)).status, PlaybackStatus::Idle);
        assert_eq!(engine.resume(at(2.0)).unwrap().status, PlaybackStatus::Idle);
        assert_eq!(engine.stop(at(3.0)).status, PlaybackStatus::Idle);
        assert_eq!(engine.tick(at(4.0)).status, PlaybackStatus::Idle);
        assert_eq!(engine.context().open_count(), 0);
        assert!(!backend.is_running());
    }

    #[test]
    fn test_worked_example_glide_to_next() {
        let (_, _, mut engine) = engine();
        engine.start(two_step(), at(0.0)).unwrap();
        assert_eq!(engine.tick(at(30.0)).beat_hz, 7.0);
        assert_eq!(engine.tick(at(90.0)).beat_hz, 4.0);
    }

    #[test]
    fn test_worked_example_glide_from_previous() {
        let (_, _, mut engine) = engine();
        let preset = two_step().with_interpolation(Interpolation::GlideFromPrevious);
        engine.start(preset, at(0.0)).unwrap();
        assert_eq!(engine.tick(at(90.0)).beat_hz, 8.5);
    }

    #[test]
    fn test_past_end_holds_and_completes_once() {
        let (_, _, mut engine) = engine();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        engine.on_complete(move |event| sink.borrow_mut().push(event.clone()));

        engine.start(two_step(), at(0.0)).unwrap();
        engine.tick(at(100.0));
        let state = engine.tick(at(200.0)).clone();
        engine.tick(at(201.0));
        engine.stop(at(202.0));

        assert_eq!(state.beat_hz, 4.0);
        assert_eq!(state.phase, Phase::Complete);
        assert_eq!(state.status, PlaybackStatus::Complete);
        assert_eq!(state.phase_label, "Complete");
        assert_eq!(state.elapsed_secs, 180.0);
        assert_eq!(state.remaining_secs, 0.0);
        assert_eq!(engine.state().status, PlaybackStatus::Complete);

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].preset_id, "two-step");
        assert_eq!(events[0].duration_secs, 180.0);
        assert_eq!(events[0].completed_at_elapsed, 200.0);
    }

    #[test]
    fn test_stop_does_not_fire_completion() {
        let (_, _, mut engine) = engine();
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        engine.on_complete(move |_| *sink.borrow_mut() += 1);

        engine.start(two_step(), at(0.0)).unwrap();
        engine.stop(at(100.0));
        engine.tick(at(300.0));
        assert_eq!(*count.borrow(), 0);
    }

    #[test]
    fn test_pause_past_end_completes_instead() {
        let (_, _, mut engine) = engine();
        engine.start(two_step(), at(0.0)).unwrap();
        let state = engine.pause(at(500.0));
        assert_eq!(state.status, PlaybackStatus::Complete);
        assert!(!state.is_paused);
    }

    #[test]
    fn test_invalid_preset_leaves_engine_idle() {
        let (_, _, mut engine) = engine();
        let empty = Preset::new("empty", "Empty", 200.0, Vec::new());
        let err = engine.start(empty, at(0.0)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Configuration(ConfigError::EmptyEnvelope)
        ));
        assert_eq!(engine.state().status, PlaybackStatus::Idle);
        assert_eq!(engine.context().open_count(), 0);
    }

    #[test]
    fn test_unavailable_backend_leaves_state_unchanged() {
        let (backend, _port, mut engine) = engine();
        backend.set_availability(Availability::NoDevice);
        let err = engine.start(two_step(), at(0.0)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::EngineUnavailable(BackendError::NoOutputDevice)
        ));
        assert_eq!(engine.state().status, PlaybackStatus::Idle);

        backend.set_availability(Availability::Available);
        assert!(engine.start(two_step(), at(1.0)).is_ok());
    }

    #[test]
    fn test_resume_needs_gesture_after_suspend() {
        let (backend, _port, mut engine) = engine();
        engine.start(two_step(), at(0.0)).unwrap();
        engine.pause(at(10.0));
        engine.context().suspend();
        backend.set_availability(Availability::GestureRequired);

        let err = engine.resume(at(20.0)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::EngineUnavailable(BackendError::GestureRequired)
        ));
        assert_eq!(engine.state().status, PlaybackStatus::Paused);

        backend.set_availability(Availability::Available);
        let state = engine.resume(at(30.0)).unwrap();
        assert_eq!(state.status, PlaybackStatus::Running);
        assert_eq!(state.elapsed_secs, 10.0);
    }

    #[test]
    fn test_context_reused_across_sessions() {
        let (_, _, mut engine) = engine();
        engine.start(two_step(), at(0.0)).unwrap();
        engine.stop(at(5.0));
        engine.start(two_step(), at(6.0)).unwrap();
        engine.tick(at(200.0));
        engine.start(two_step(), at(201.0)).unwrap();
        assert_eq!(engine.context().open_count(), 1);
        assert_eq!(engine.state().elapsed_secs, 0.0);
    }

    #[test]
    fn test_toggles_flip() {
        let (_, _, mut engine) = engine();
        assert!(engine.toggle_isochronic().isochronic);
        assert!(!engine.toggle_isochronic().isochronic);
        assert!(engine.toggle_breathing_guide().breathing_guide);
        engine.start(two_step(), at(0.0)).unwrap();
        assert!(engine.state().breathing_guide);
        assert!(!engine.toggle_breathing_guide().breathing_guide);
    }

    #[test]
    fn test_phase_observer_sees_transitions() {
        #[derive(Default)]
        struct Recorder(Rc<RefCell<Vec<(Option<Phase>, Phase, String)>>>);
        impl SessionObserver for Recorder {
            fn on_phase_change(&mut self, t: PhaseTransition, label: &str) {
                self.0.borrow_mut().push((t.from, t.to, label.to_string()));
            }
        }

        let (_, _, mut engine) = engine();
        let log = Rc::new(RefCell::new(Vec::new()));
        engine.subscribe(Box::new(Recorder(Rc::clone(&log))));

        let preset = two_step().with_phases(PhaseBoundaries::seconds(20.0, 20.0));
        engine.start(preset, at(0.0)).unwrap();
        for t in [10.0, 30.0, 50.0, 170.0, 180.0] {
            engine.tick(at(t));
        }

        let log = log.borrow();
        let phases: Vec<_> = log.iter().map(|(from, to, _)| (*from, *to)).collect();
        assert_eq!(
            phases,
            vec![
                (None, Phase::Intro),
                (Some(Phase::Intro), Phase::Main),
                (Some(Phase::Main), Phase::Outro),
                (Some(Phase::Outro), Phase::Complete),
            ]
        );
        assert_eq!(log[0].2, "Settling");
        assert_eq!(log[1].2, "Theta");
    }

    #[test]
    fn test_main_label_follows_band() {
        let (_, _, mut engine) = engine();
        let preset = two_step().with_phases(PhaseBoundaries::seconds(0.0, 0.0));
        engine.start(preset, at(0.0)).unwrap();
        assert_eq!(engine.tick(at(1.0)).phase_label, "Alpha");
        assert_eq!(engine.tick(at(100.0)).phase_label, "Theta");
    }

    #[test]
    fn test_elapsed_monotonic_under_jitter() {
        let (_, _, mut engine) = engine();
        engine.start(two_step(), at(0.0)).unwrap();
        let mut last = 0.0;
        for t in [1.0, 2.0, 1.9, 3.0, 2.5, 4.0] {
            let elapsed = engine.tick(at(t)).elapsed_secs;
            assert!(elapsed >= last);
            last = elapsed;
        }
    }

    #[test]
    fn test_analyser_reflects_output() {
        let (_, mut port, mut engine) = engine();
        engine.start(two_step(), at(0.0)).unwrap();
        port.render(48_000);
        let analyser = engine.analyser_handle().unwrap();
        assert!(analyser.peak() > 0.1);
    }

    #[test]
    fn test_synth_reaches_each_target_within_one_tick() {
        const TICK_FRAMES: usize = 800;
        let (_, mut port, mut engine) = engine();
        engine.start(two_step(), at(0.0)).unwrap();

        // 60 Hz host: every tick retargets, and one tick of audio later the
        // oscillators sit exactly on that target.
        for tick in 1..=180 {
            let state = engine.tick(at(f64::from(tick) / 60.0));
            let expected = FrequencyTarget {
                beat_hz: state.beat_hz,
                carrier_hz: state.carrier_hz,
            };
            port.render(TICK_FRAMES);
            assert_sounding(&engine, expected);
        }
    }

    #[test]
    fn test_long_tick_interval_is_capped_by_max_ramp() {
        let config = EngineConfig {
            max_frequency_ramp_ms: 100.0,
            ..EngineConfig::default()
        };
        let (_, mut port, mut engine) = engine_with(config);
        engine.start(two_step(), at(0.0)).unwrap();
        engine.tick(at(0.0));
        port.render(1_024);

        // A one-second gap ramps over 100 ms, not over the whole second.
        let state = engine.tick(at(1.0));
        let expected = FrequencyTarget {
            beat_hz: state.beat_hz,
            carrier_hz: state.carrier_hz,
        };
        assert!((expected.beat_hz - 9.9).abs() < 1e-9);

        port.render(2_400);
        let halfway = engine.output_frequency().unwrap();
        assert!((halfway.beat_hz - 9.95).abs() < 5e-3, "halfway {halfway:?}");

        port.render(2_400);
        assert_sounding(&engine, expected);
    }

    #[test]
    fn test_suspended_output_does_not_accumulate_commands() {
        let (_, mut port, mut engine) = engine();
        let preset = crate::state::builtin_preset("meditation").unwrap();
        engine.start(preset, at(0.0)).unwrap();
        port.render(512);
        engine.context().suspend();

        // Ten minutes of 60 Hz ticks with nothing rendering.
        for tick in 1..=36_000 {
            engine.tick(at(f64::from(tick) / 60.0));
        }
        assert_eq!(port.pending_graph_commands(), 0);

        engine.pause(at(600.0));
        engine.resume(at(600.0)).unwrap();
        engine.tick(at(600.0 + 1.0 / 60.0));
        port.render(1_024);
        let target = FrequencyTarget {
            beat_hz: engine.state().beat_hz,
            carrier_hz: engine.state().carrier_hz,
        };
        assert_sounding(&engine, target);
    }

    #[test]
    fn test_resume_rebuilds_graph_released_while_paused() {
        let (_, mut port, mut engine) = engine();
        engine.start(two_step(), at(0.0)).unwrap();
        port.render(512);
        engine.pause(at(5.0));

        engine.context().detach();
        port.render(512);
        engine.tick(at(6.0));
        assert_eq!(port.connected_graphs(), 0);

        let state = engine.resume(at(7.0)).unwrap();
        assert_eq!(state.status, PlaybackStatus::Running);
        port.render(24_000);
        assert_eq!(port.connected_graphs(), 1);
        assert!(engine.analyser_handle().unwrap().peak() > 0.1);
        assert_eq!(engine.context().open_count(), 1);
    }
}
