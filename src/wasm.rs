//! WebAssembly bindings via wasm-bindgen for browser integration.
//!
//! This module is only compiled when the `web` feature is enabled.
//!
//! # Usage
//!
//! Build with wasm-pack:
//! ```bash
//! wasm-pack build --target web --features web
//! ```
//!
//! # JavaScript Example
//!
//! The engine is single-threaded: construct it, tick it, and render it all
//! inside the AudioWorkletProcessor. The page talks to it over the
//! processor's message port.
//!
//! ```javascript
//! // binaura-processor.js (AudioWorkletGlobalScope)
//! import { initSync, binaura_init, BinauraEngine } from './binaura.js';
//!
//! class BinauraProcessor extends AudioWorkletProcessor {
//!   constructor(options) {
//!     super();
//!     initSync(options.processorOptions.module);
//!     binaura_init();
//!     this.engine = new BinauraEngine(sampleRate);
//!     this.port.onmessage = ({ data }) => {
//!       const now = currentTime * 1000;
//!       if (data.type === 'start') this.engine.start(data.preset, now);
//!       if (data.type === 'pause') this.engine.pause(now);
//!       if (data.type === 'stop') this.engine.stop(now);
//!     };
//!   }
//!
//!   process(_inputs, outputs) {
//!     this.engine.tick(currentTime * 1000);
//!     this.engine.render(outputs[0][0], outputs[0][1]);
//!     if (currentFrame % 6000 < 128) this.port.postMessage(this.engine.stateJson());
//!     return true;
//!   }
//! }
//! registerProcessor('binaura', BinauraProcessor);
//!
//! // Page side
//! const node = new AudioWorkletNode(ctx, 'binaura', {
//!   outputChannelCount: [2],
//!   processorOptions: { module: wasmModule },
//! });
//! node.port.onmessage = ({ data }) => render(JSON.parse(data));
//! node.port.postMessage({ type: 'start', preset: JSON.stringify(preset) });
//! ```

use wasm_bindgen::prelude::*;

use crate::context::{AudioContext, OfflineBackend, RenderPort};
use crate::engine::AudioEngine;
use crate::error::EngineError;
use crate::state::{EngineConfig, Preset, builtin_preset};
use crate::transport::Timestamp;

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the wasm module. Call this once before using any other functions.
/// Sets up panic hooks and console logging.
#[wasm_bindgen]
pub fn binaura_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

fn js_error(e: EngineError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════════════════════════════════════

/// Session engine for the browser. Timestamps are milliseconds on one
/// clock (`currentTime * 1000` inside a worklet).
#[wasm_bindgen(js_name = BinauraEngine)]
pub struct WebEngine {
    engine: AudioEngine,
    port: RenderPort,
}

#[wasm_bindgen(js_class = BinauraEngine)]
impl WebEngine {
    /// Create an engine rendering at the AudioContext's sample rate.
    /// Throws if `sample_rate` is not a positive finite number.
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64) -> Result<WebEngine, JsValue> {
        Self::with_config(sample_rate, EngineConfig::default())
    }

    /// Create an engine from a JSON configuration.
    #[wasm_bindgen(js_name = withConfigJson)]
    pub fn with_config_json(sample_rate: f64, config_json: &str) -> Result<WebEngine, JsValue> {
        let config = EngineConfig::from_json(config_json)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        Self::with_config(sample_rate, config)
    }

    fn with_config(sample_rate: f64, config: EngineConfig) -> Result<WebEngine, JsValue> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(JsValue::from_str(&format!("invalid sample rate {sample_rate}")));
        }
        let (backend, port) = OfflineBackend::new(sample_rate, config.max_block_size);
        let engine = AudioEngine::new(AudioContext::new(backend), config);
        Ok(WebEngine { engine, port })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a session from a preset JSON document. Throws on a malformed
    /// preset or when audio output is unavailable.
    pub fn start(&mut self, preset_json: &str, now_ms: f64) -> Result<(), JsValue> {
        let preset = Preset::from_json(preset_json).map_err(|e| js_error(e.into()))?;
        self.engine
            .start(preset, Timestamp::from_millis(now_ms))
            .map(|_| ())
            .map_err(js_error)
    }

    /// Start a built-in preset by id.
    #[wasm_bindgen(js_name = startBuiltin)]
    pub fn start_builtin(&mut self, preset_id: &str, now_ms: f64) -> Result<(), JsValue> {
        let preset = builtin_preset(preset_id)
            .ok_or_else(|| JsValue::from_str(&format!("unknown preset '{preset_id}'")))?;
        self.engine
            .start(preset, Timestamp::from_millis(now_ms))
            .map(|_| ())
            .map_err(js_error)
    }

    pub fn pause(&mut self, now_ms: f64) {
        self.engine.pause(Timestamp::from_millis(now_ms));
    }

    /// Throws if the suspended output needs a user gesture first.
    pub fn resume(&mut self, now_ms: f64) -> Result<(), JsValue> {
        self.engine
            .resume(Timestamp::from_millis(now_ms))
            .map(|_| ())
            .map_err(js_error)
    }

    pub fn stop(&mut self, now_ms: f64) {
        self.engine.stop(Timestamp::from_millis(now_ms));
    }

    /// Advance the session. Call from `requestAnimationFrame`.
    pub fn tick(&mut self, now_ms: f64) {
        self.engine.tick(Timestamp::from_millis(now_ms));
    }

    /// Suspend output when the page is hidden.
    pub fn suspend(&mut self) {
        self.engine.context().suspend();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────────────────

    #[wasm_bindgen(js_name = setVolume)]
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.engine.set_volume(volume).volume
    }

    #[wasm_bindgen(js_name = setAmbientVolume)]
    pub fn set_ambient_volume(&mut self, volume: f32) -> f32 {
        self.engine.set_ambient_volume(volume).ambient_volume
    }

    #[wasm_bindgen(js_name = toggleIsochronic)]
    pub fn toggle_isochronic(&mut self) -> bool {
        self.engine.toggle_isochronic().isochronic
    }

    #[wasm_bindgen(js_name = toggleBreathingGuide)]
    pub fn toggle_breathing_guide(&mut self) -> bool {
        self.engine.toggle_breathing_guide().breathing_guide
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Readback
    // ─────────────────────────────────────────────────────────────────────────

    /// Current state snapshot as JSON.
    #[wasm_bindgen(js_name = stateJson)]
    pub fn state_json(&self) -> String {
        serde_json::to_string(self.engine.state()).unwrap_or_default()
    }

    /// Session progress in [0, 1].
    pub fn progress(&self) -> f64 {
        self.engine.state().progress()
    }

    /// Beat frequency sounding at the end of the last rendered block, or 0.
    #[wasm_bindgen(js_name = outputBeatHz)]
    pub fn output_beat_hz(&self) -> f64 {
        self.engine.output_frequency().map_or(0.0, |f| f.beat_hz)
    }

    /// Render one block of planar stereo into the worklet output channels.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.port.render_into(left, right);
    }

    /// Copy recent time-domain samples into `out`. Returns the number of
    /// live samples; 0 when no session is active.
    #[wasm_bindgen(js_name = analyserData)]
    pub fn analyser_data(&self, out: &mut [f32]) -> u32 {
        match self.engine.analyser_handle() {
            Some(analyser) => analyser.time_domain_data(out) as u32,
            None => {
                out.fill(0.0);
                0
            }
        }
    }
}
