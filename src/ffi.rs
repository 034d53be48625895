// C-compatible FFI bindings for Swift/iOS and other native hosts.
//
// The host owns the audio device. The engine handle stays on the UI thread
// (control calls and ticks); the renderer handle taken from it with
// `binaura_engine_take_renderer` moves to the device callback and is the
// only thing that callback touches.
//
// Safety requirements:
// - All pointers must be non-null unless documented otherwise
// - An engine handle must only be used from one thread at a time
// - All handles must be created by this module and not fabricated
// - String parameters must be valid null-terminated UTF-8
// - Caller must call the corresponding _destroy / _free function

use std::ffi::{CStr, CString, c_char};

use log::{error, warn};

use crate::context::{AudioContext, OfflineBackend, RenderPort};
use crate::engine::AudioEngine;
use crate::error::EngineError;
use crate::state::{AudioEngineState, EngineConfig, Preset, builtin_preset};
use crate::transport::Timestamp;

/// Success.
pub const BINAURA_OK: i32 = 0;
/// Malformed preset or configuration.
pub const BINAURA_CONFIG_ERROR: i32 = 1;
/// Audio output could not be acquired.
pub const BINAURA_UNAVAILABLE: i32 = 2;
/// A required pointer was null.
pub const BINAURA_NULL_POINTER: i32 = -1;

#[cfg(feature = "ios")]
const LOG_SUBSYSTEM: &str = "com.binaura.engine";

// ═══════════════════════════════════════════════════════════════════════════
// Logger Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Route `log` output to the unified logging system (Console.app, Xcode).
///
/// Call once at startup. Without the `ios` feature this does nothing.
#[unsafe(no_mangle)]
pub extern "C" fn binaura_init_logger() {
    #[cfg(feature = "ios")]
    oslog::OsLogger::new(LOG_SUBSYSTEM)
        .level_filter(log::LevelFilter::Debug)
        .init()
        .ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Opaque Handle & Result Types
// ═══════════════════════════════════════════════════════════════════════════

/// Opaque engine handle. Control side; not for the audio thread.
pub struct BinauraEngine {
    engine: AudioEngine,
    backend: OfflineBackend,
    renderer: Option<RenderPort>,
}

/// Opaque render handle. Safe to move to the audio thread.
pub struct BinauraRenderer {
    port: RenderPort,
}

/// Flat snapshot of `AudioEngineState` for C callers.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinauraState {
    /// 0 idle, 1 running, 2 paused, 3 stopped, 4 complete.
    pub status: u32,
    /// 0 intro, 1 main, 2 outro, 3 complete.
    pub phase: u32,
    pub elapsed_secs: f64,
    pub duration_secs: f64,
    pub remaining_secs: f64,
    pub progress: f64,
    pub beat_hz: f64,
    pub carrier_hz: f64,
    pub volume: f32,
    pub ambient_volume: f32,
    pub is_playing: bool,
    pub is_paused: bool,
    pub isochronic: bool,
    pub breathing_guide: bool,
}

impl From<&AudioEngineState> for BinauraState {
    fn from(s: &AudioEngineState) -> Self {
        Self {
            status: s.status as u32,
            phase: s.phase as u32,
            elapsed_secs: s.elapsed_secs,
            duration_secs: s.duration_secs,
            remaining_secs: s.remaining_secs,
            progress: s.progress(),
            beat_hz: s.beat_hz,
            carrier_hz: s.carrier_hz,
            volume: s.volume,
            ambient_volume: s.ambient_volume,
            is_playing: s.is_playing,
            is_paused: s.is_paused,
            isochronic: s.isochronic,
            breathing_guide: s.breathing_guide,
        }
    }
}

fn result_code(result: Result<&AudioEngineState, EngineError>) -> i32 {
    match result {
        Ok(_) => BINAURA_OK,
        Err(e) => e.code(),
    }
}

/// Borrow a C string as UTF-8.
///
/// # Safety
/// `ptr` must be null or a valid null-terminated string.
unsafe fn str_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    match unsafe { CStr::from_ptr(ptr) }.to_str() {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("Invalid UTF-8 argument: {e}");
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Creation / Destruction
// ═══════════════════════════════════════════════════════════════════════════

/// Create an engine rendering at `sample_rate` with default configuration.
///
/// Returns an opaque pointer that must be freed with `binaura_engine_destroy`,
/// or null if `sample_rate` is not a positive finite number.
#[unsafe(no_mangle)]
pub extern "C" fn binaura_engine_create(sample_rate: f64) -> *mut BinauraEngine {
    create(sample_rate, EngineConfig::default())
}

/// Create an engine with a JSON configuration (missing fields use defaults).
///
/// Returns null if the configuration does not parse or `sample_rate` is
/// unusable.
///
/// # Safety
/// `config_json` must be a valid null-terminated UTF-8 string or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_create_with_config(
    sample_rate: f64,
    config_json: *const c_char,
) -> *mut BinauraEngine {
    let config = match unsafe { str_arg(config_json) } {
        None => EngineConfig::default(),
        Some(json) => match EngineConfig::from_json(json) {
            Ok(config) => config,
            Err(e) => {
                error!("Invalid engine configuration: {e}");
                return std::ptr::null_mut();
            }
        },
    };
    create(sample_rate, config)
}

fn create(sample_rate: f64, config: EngineConfig) -> *mut BinauraEngine {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        error!("Rejected sample rate {sample_rate}");
        return std::ptr::null_mut();
    }
    let (backend, port) = OfflineBackend::new(sample_rate, config.max_block_size);
    let engine = AudioEngine::new(AudioContext::new(backend.clone()), config);
    Box::into_raw(Box::new(BinauraEngine {
        engine,
        backend,
        renderer: Some(port),
    }))
}

/// Take the engine's render handle.
///
/// Hand the result to the audio callback and render through
/// `binaura_renderer_render`. Returns null if `engine` is null or the
/// renderer was already taken. Free with `binaura_renderer_destroy`.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_take_renderer(
    engine: *mut BinauraEngine,
) -> *mut BinauraRenderer {
    if engine.is_null() {
        return std::ptr::null_mut();
    }
    match unsafe { (*engine).renderer.take() } {
        Some(port) => Box::into_raw(Box::new(BinauraRenderer { port })),
        None => {
            warn!("Renderer already taken");
            std::ptr::null_mut()
        }
    }
}

/// Destroy a render handle. Stop calling `binaura_renderer_render` first.
///
/// # Safety
/// `renderer` must be null or a pointer returned by
/// `binaura_engine_take_renderer`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_renderer_destroy(renderer: *mut BinauraRenderer) {
    if !renderer.is_null() {
        unsafe { drop(Box::from_raw(renderer)) };
    }
}

/// Destroy an engine.
///
/// # Safety
/// `engine` must be a valid pointer returned by `binaura_engine_create*`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_destroy(engine: *mut BinauraEngine) {
    if !engine.is_null() {
        unsafe { drop(Box::from_raw(engine)) };
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Lifecycle
// ═══════════════════════════════════════════════════════════════════════════

/// Start a session from a preset JSON document.
///
/// Returns 0 on success, 1 for a malformed preset, 2 if audio output is
/// unavailable, -1 for null pointers.
///
/// # Safety
/// `engine` must be valid; `preset_json` must be a null-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_start(
    engine: *mut BinauraEngine,
    preset_json: *const c_char,
    now_secs: f64,
) -> i32 {
    if engine.is_null() || preset_json.is_null() {
        return BINAURA_NULL_POINTER;
    }
    let Some(json) = (unsafe { str_arg(preset_json) }) else {
        return BINAURA_CONFIG_ERROR;
    };
    let preset = match Preset::from_json(json) {
        Ok(preset) => preset,
        Err(e) => {
            warn!("Rejected preset JSON: {e}");
            return BINAURA_CONFIG_ERROR;
        }
    };
    let engine = unsafe { &mut (*engine).engine };
    result_code(engine.start(preset, Timestamp::from_secs(now_secs)))
}

/// Start a session from the built-in catalog by id.
///
/// # Safety
/// `engine` must be valid; `preset_id` must be a null-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_start_builtin(
    engine: *mut BinauraEngine,
    preset_id: *const c_char,
    now_secs: f64,
) -> i32 {
    if engine.is_null() || preset_id.is_null() {
        return BINAURA_NULL_POINTER;
    }
    let Some(preset) = (unsafe { str_arg(preset_id) }).and_then(builtin_preset) else {
        return BINAURA_CONFIG_ERROR;
    };
    let engine = unsafe { &mut (*engine).engine };
    result_code(engine.start(preset, Timestamp::from_secs(now_secs)))
}

/// Pause the session. No-op unless running.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_pause(engine: *mut BinauraEngine, now_secs: f64) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).engine.pause(Timestamp::from_secs(now_secs)) };
}

/// Resume the session. Returns 2 if output needs a user gesture first.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_resume(engine: *mut BinauraEngine, now_secs: f64) -> i32 {
    if engine.is_null() {
        return BINAURA_NULL_POINTER;
    }
    let engine = unsafe { &mut (*engine).engine };
    result_code(engine.resume(Timestamp::from_secs(now_secs)))
}

/// Stop the session. Idempotent.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_stop(engine: *mut BinauraEngine, now_secs: f64) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).engine.stop(Timestamp::from_secs(now_secs)) };
}

/// Advance the session; call once per UI frame.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_tick(engine: *mut BinauraEngine, now_secs: f64) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).engine.tick(Timestamp::from_secs(now_secs)) };
}

/// Suspend output (app backgrounded). The next start/resume reacquires it.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_suspend(engine: *mut BinauraEngine) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).engine.context().suspend() };
}

// ═══════════════════════════════════════════════════════════════════════════
// Settings
// ═══════════════════════════════════════════════════════════════════════════

/// Set master volume (clamped to 0..1).
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_set_volume(engine: *mut BinauraEngine, volume: f32) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).engine.set_volume(volume) };
}

/// Set ambient bed volume (clamped to 0..1).
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_set_ambient_volume(engine: *mut BinauraEngine, volume: f32) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).engine.set_ambient_volume(volume) };
}

/// Flip isochronic mode. Returns the new value.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_toggle_isochronic(engine: *mut BinauraEngine) -> bool {
    if engine.is_null() {
        return false;
    }
    unsafe { (*engine).engine.toggle_isochronic().isochronic }
}

/// Flip the breathing-guide flag. Returns the new value.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_toggle_breathing_guide(engine: *mut BinauraEngine) -> bool {
    if engine.is_null() {
        return false;
    }
    unsafe { (*engine).engine.toggle_breathing_guide().breathing_guide }
}

// ═══════════════════════════════════════════════════════════════════════════
// Audio & Readback
// ═══════════════════════════════════════════════════════════════════════════

/// Render `frames` frames of planar stereo audio.
///
/// Call from the host's audio callback. Writes silence when no session is
/// active, output is suspended, or `renderer` is null.
///
/// # Safety
/// - `renderer` must be null or a valid render handle
/// - `left` and `right` must each point to at least `frames` floats
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_renderer_render(
    renderer: *mut BinauraRenderer,
    left: *mut f32,
    right: *mut f32,
    frames: u32,
) {
    if left.is_null() || right.is_null() {
        return;
    }
    let (left, right) = unsafe {
        (
            std::slice::from_raw_parts_mut(left, frames as usize),
            std::slice::from_raw_parts_mut(right, frames as usize),
        )
    };
    if renderer.is_null() {
        left.fill(0.0);
        right.fill(0.0);
        return;
    }
    unsafe { (*renderer).port.render_into(left, right) };
}

/// Frames the renderer has produced while output was running.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_frames_rendered(engine: *const BinauraEngine) -> u64 {
    if engine.is_null() {
        return 0;
    }
    unsafe { (*engine).backend.frames_rendered() }
}

/// Copy the engine state snapshot.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_state(engine: *const BinauraEngine) -> BinauraState {
    if engine.is_null() {
        let idle = AudioEngineState::idle(0.0, false, false);
        return BinauraState::from(&idle);
    }
    unsafe { BinauraState::from((*engine).engine.state()) }
}

/// Engine state as a JSON string. Free with `binaura_string_free`.
///
/// Returns null if `engine` is null.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_state_json(engine: *const BinauraEngine) -> *mut c_char {
    if engine.is_null() {
        return std::ptr::null_mut();
    }
    let state = unsafe { (*engine).engine.state() };
    match serde_json::to_string(state).map(CString::new) {
        Ok(Ok(json)) => json.into_raw(),
        _ => {
            error!("Failed to serialize engine state");
            std::ptr::null_mut()
        }
    }
}

/// Free a string returned by this module.
///
/// # Safety
/// `s` must be null or a pointer returned by a `binaura_*` function.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_string_free(s: *mut c_char) {
    if !s.is_null() {
        unsafe { drop(CString::from_raw(s)) };
    }
}

/// Copy recent output samples (oldest first) into `out`.
///
/// Returns the number of live samples copied; 0 when no session is active.
///
/// # Safety
/// - `engine` must be a valid pointer
/// - `out` must point to at least `len` floats
#[unsafe(no_mangle)]
pub unsafe extern "C" fn binaura_engine_analyser_data(
    engine: *const BinauraEngine,
    out: *mut f32,
    len: u32,
) -> u32 {
    if engine.is_null() || out.is_null() {
        return 0;
    }
    let out = unsafe { std::slice::from_raw_parts_mut(out, len as usize) };
    match unsafe { (*engine).engine.analyser_handle() } {
        Some(analyser) => analyser.time_domain_data(out) as u32,
        None => {
            out.fill(0.0);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    #[test]
    fn test_null_handles_are_tolerated() {
        unsafe {
            let id = c("meditation");
            assert_eq!(
                binaura_engine_start_builtin(std::ptr::null_mut(), id.as_ptr(), 0.0),
                BINAURA_NULL_POINTER
            );
            assert_eq!(binaura_engine_resume(std::ptr::null_mut(), 0.0), BINAURA_NULL_POINTER);
            binaura_engine_pause(std::ptr::null_mut(), 0.0);
            binaura_engine_stop(std::ptr::null_mut(), 0.0);
            binaura_engine_destroy(std::ptr::null_mut());
            assert!(binaura_engine_state_json(std::ptr::null()).is_null());
            assert_eq!(binaura_engine_state(std::ptr::null()).status, 0);
            assert!(binaura_engine_take_renderer(std::ptr::null_mut()).is_null());
            binaura_renderer_destroy(std::ptr::null_mut());

            let mut left = [1.0_f32; 8];
            let mut right = [1.0_f32; 8];
            binaura_renderer_render(std::ptr::null_mut(), left.as_mut_ptr(), right.as_mut_ptr(), 8);
            assert!(left.iter().chain(&right).all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_unusable_sample_rate_yields_null() {
        for rate in [0.0, -48_000.0, f64::NAN, f64::INFINITY] {
            assert!(binaura_engine_create(rate).is_null(), "rate {rate}");
        }
        let config = c("{}");
        unsafe {
            assert!(binaura_engine_create_with_config(f64::NAN, config.as_ptr()).is_null());
        }
    }

    #[test]
    fn test_renderer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<BinauraRenderer>();
    }

    #[test]
    fn test_renderer_can_only_be_taken_once() {
        unsafe {
            let engine = binaura_engine_create(48_000.0);
            let renderer = binaura_engine_take_renderer(engine);
            assert!(!renderer.is_null());
            assert!(binaura_engine_take_renderer(engine).is_null());
            binaura_renderer_destroy(renderer);
            binaura_engine_destroy(engine);
        }
    }

    #[test]
    fn test_session_through_c_abi() {
        unsafe {
            let engine = binaura_engine_create(48_000.0);
            let renderer = binaura_engine_take_renderer(engine);
            let id = c("meditation");
            assert_eq!(binaura_engine_start_builtin(engine, id.as_ptr(), 0.0), BINAURA_OK);

            let mut left = vec![0.0_f32; 4_800];
            let mut right = vec![0.0_f32; 4_800];
            for i in 1..=30 {
                binaura_engine_tick(engine, i as f64 / 60.0);
                binaura_renderer_render(renderer, left.as_mut_ptr(), right.as_mut_ptr(), 1_600);
            }
            assert_eq!(binaura_engine_frames_rendered(engine), 48_000);

            let state = binaura_engine_state(engine);
            assert_eq!(state.status, 1);
            assert!(state.is_playing);
            assert!((state.elapsed_secs - 0.5).abs() < 1e-9);

            let mut scope = vec![0.0_f32; 256];
            assert_eq!(binaura_engine_analyser_data(engine, scope.as_mut_ptr(), 256), 256);
            assert!(scope.iter().any(|&s| s != 0.0));

            binaura_engine_stop(engine, 1.0);
            assert_eq!(binaura_engine_state(engine).status, 3);
            assert_eq!(binaura_engine_analyser_data(engine, scope.as_mut_ptr(), 256), 0);

            binaura_renderer_destroy(renderer);
            binaura_engine_destroy(engine);
        }
    }

    /// Raw handle moved into the render thread.
    struct RendererPtr(*mut BinauraRenderer);
    unsafe impl Send for RendererPtr {}

    #[test]
    fn test_render_thread_beside_ui_thread() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

        unsafe {
            let engine = binaura_engine_create(48_000.0);
            let renderer = RendererPtr(binaura_engine_take_renderer(engine));
            let done = Arc::new(AtomicBool::new(false));
            let loud = Arc::new(AtomicU64::new(0));

            let audio = {
                let done = Arc::clone(&done);
                let loud = Arc::clone(&loud);
                std::thread::spawn(move || {
                    let renderer = renderer;
                    let mut left = vec![0.0_f32; 256];
                    let mut right = vec![0.0_f32; 256];
                    while !done.load(Ordering::Acquire) {
                        binaura_renderer_render(
                            renderer.0,
                            left.as_mut_ptr(),
                            right.as_mut_ptr(),
                            256,
                        );
                        if left.iter().any(|&s| s != 0.0) {
                            loud.fetch_add(1, Ordering::Relaxed);
                        }
                        std::thread::yield_now();
                    }
                    binaura_renderer_destroy(renderer.0);
                })
            };

            let id = c("calm-focus");
            assert_eq!(binaura_engine_start_builtin(engine, id.as_ptr(), 0.0), BINAURA_OK);
            for i in 1..=600 {
                binaura_engine_tick(engine, i as f64 / 60.0);
                binaura_engine_set_volume(engine, (1 + i % 10) as f32 / 10.0);
                std::thread::yield_now();
            }
            while loud.load(Ordering::Relaxed) == 0 {
                std::thread::yield_now();
            }
            binaura_engine_stop(engine, 10.0);

            done.store(true, Ordering::Release);
            assert!(audio.join().is_ok());
            assert_eq!(binaura_engine_state(engine).status, 3);
            binaura_engine_destroy(engine);
        }
    }

    #[test]
    fn test_start_error_codes() {
        unsafe {
            let engine = binaura_engine_create(48_000.0);

            let bad = c(r#"{"id":"x","name":"X","carrierHz":200,"durationSecs":60,"envelope":[]}"#);
            assert_eq!(binaura_engine_start(engine, bad.as_ptr(), 0.0), BINAURA_CONFIG_ERROR);

            let garbage = c("not json");
            assert_eq!(binaura_engine_start(engine, garbage.as_ptr(), 0.0), BINAURA_CONFIG_ERROR);

            let unknown = c("no-such-preset");
            assert_eq!(
                binaura_engine_start_builtin(engine, unknown.as_ptr(), 0.0),
                BINAURA_CONFIG_ERROR
            );

            (*engine)
                .backend
                .set_availability(crate::context::Availability::NoDevice);
            let id = c("deep-sleep");
            assert_eq!(
                binaura_engine_start_builtin(engine, id.as_ptr(), 0.0),
                BINAURA_UNAVAILABLE
            );
            assert_eq!(binaura_engine_state(engine).status, 0);

            binaura_engine_destroy(engine);
        }
    }

    #[test]
    fn test_state_json_round_trips_through_c_string() {
        unsafe {
            let engine = binaura_engine_create(44_100.0);
            binaura_engine_set_volume(engine, 1.5);
            assert!(binaura_engine_toggle_breathing_guide(engine));

            let json = binaura_engine_state_json(engine);
            let text = CStr::from_ptr(json).to_str().unwrap().to_owned();
            binaura_string_free(json);

            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["volume"], 1.0);
            assert_eq!(value["breathingGuide"], true);
            assert_eq!(value["status"], "idle");

            binaura_engine_destroy(engine);
        }
    }
}
