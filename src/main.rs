// src/main.rs
//
// Offline session simulation: runs a built-in preset at 60 ticks per
// second against the pull backend and prints what a UI would see.
//
//     binaura-engine [preset-id] [max-seconds]

use std::cell::RefCell;
use std::rc::Rc;

use binaura::{
    AudioContext, AudioEngine, CompletionEvent, EngineConfig, OfflineBackend, PhaseTransition,
    SessionObserver, Timestamp, builtin_preset, builtin_presets,
};

const SAMPLE_RATE: f64 = 48_000.0;
const TICKS_PER_SEC: usize = 60;

/// ===============================
/// Console observer
/// ===============================

struct ConsoleObserver {
    elapsed: Rc<RefCell<f64>>,
}

impl SessionObserver for ConsoleObserver {
    fn on_phase_change(&mut self, transition: PhaseTransition, label: &str) {
        println!(
            "[{:>7.2}s] phase {} -> {} ({label})",
            *self.elapsed.borrow(),
            transition.from.map_or("none", |p| p.as_str()),
            transition.to.as_str()
        );
    }

    fn on_complete(&mut self, event: &CompletionEvent) {
        println!(
            "[{:>7.2}s] session '{}' complete ({:.0}s nominal)",
            event.completed_at_elapsed, event.preset_id, event.duration_secs
        );
    }
}

fn rms(left: &[f32], right: &[f32]) -> f32 {
    let sum: f32 = left.iter().chain(right).map(|s| s * s).sum();
    (sum / (left.len() + right.len()).max(1) as f32).sqrt()
}

/// ===============================
/// Main
/// ===============================

fn main() {
    let mut args = std::env::args().skip(1);
    let preset_id = args.next().unwrap_or_else(|| "calm-focus".to_string());
    let max_seconds: Option<f64> = args.next().and_then(|s| s.parse().ok());

    let Some(preset) = builtin_preset(&preset_id) else {
        eprintln!("Unknown preset '{preset_id}'. Available:");
        for p in builtin_presets() {
            eprintln!("  {:<12} {} ({:.0}s)", p.id, p.name, p.duration_secs);
        }
        std::process::exit(1);
    };

    // --------------------------------
    // Engine + backend
    // --------------------------------

    let config = EngineConfig::default();
    let (backend, mut port) = OfflineBackend::new(SAMPLE_RATE, config.max_block_size);
    let mut engine = AudioEngine::new(AudioContext::new(backend.clone()), config);

    let clock = Rc::new(RefCell::new(0.0));
    engine.subscribe(Box::new(ConsoleObserver {
        elapsed: Rc::clone(&clock),
    }));

    println!(
        "Simulating '{}' ({:.0}s, carrier {:.0} Hz)",
        preset.name, preset.duration_secs, preset.carrier_hz
    );

    if let Err(e) = engine.start(preset, Timestamp::from_secs(0.0)) {
        eprintln!("Failed to start: {e}");
        std::process::exit(1);
    }

    // --------------------------------
    // Tick loop
    // --------------------------------

    let frames_per_tick = SAMPLE_RATE as usize / TICKS_PER_SEC;
    let mut left = vec![0.0_f32; frames_per_tick];
    let mut right = vec![0.0_f32; frames_per_tick];

    let mut tick = 0_usize;
    loop {
        tick += 1;
        let now = tick as f64 / TICKS_PER_SEC as f64;
        *clock.borrow_mut() = now;

        let state = engine.tick(Timestamp::from_secs(now));
        if state.status.is_terminal() {
            break;
        }
        let report = tick % (TICKS_PER_SEC * 30) == 0;
        let (beat, carrier, label) = (state.beat_hz, state.carrier_hz, state.phase_label.clone());

        port.render_into(&mut left, &mut right);

        if report {
            let sounding = engine.output_frequency().map_or(0.0, |f| f.beat_hz);
            println!(
                "[{now:>7.2}s] beat {beat:>5.2} Hz (sounding {sounding:>5.2})  carrier {carrier:>6.1} Hz  {label:<10} rms {:.3}",
                rms(&left, &right)
            );
        }

        if max_seconds.is_some_and(|max| now >= max) {
            engine.stop(Timestamp::from_secs(now));
            println!("[{now:>7.2}s] stopped early");
            break;
        }
    }

    // Let the final fade play out.
    let tail = (SAMPLE_RATE as usize) * 2;
    let (left, right) = port.render(tail);
    println!(
        "Tail rms {:.4}, {} graph(s) still connected, {} frames rendered",
        rms(&left[tail - 4_800..], &right[tail - 4_800..]),
        port.connected_graphs(),
        backend.frames_rendered()
    );
}
