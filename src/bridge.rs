//! Bridge between the control side and the render graph.
//!
//! The control facade runs on the host's tick callback; the render graph
//! runs wherever the backend pulls audio (a realtime device thread, an
//! AudioWorklet, or a test loop).
//!
//! # Architecture
//!
//! - **Control side** owns [`GraphHandle`] and sends [`ToneCommand`]s
//! - **Render side** owns [`ToneGraph`] and drains commands at block start
//! - Frequency targets go through a single overwritable slot, not the queue
//! - Readback (frames rendered, sounding frequencies, finished) uses atomics
//! - Anything the render side lets go of travels back as [`Released`]
//!
//! # Usage
//!
//! ```ignore
//! let releases = ReleaseQueue::new();
//! let (handle, graph) = create_bridge(48_000.0, &EngineConfig::default(), releases.sender());
//! backend.attach(graph);
//!
//! // Control side: ramp to new targets every tick
//! handle.set_frequency(6.0, 200.0, 800);
//!
//! // Later, on the control thread
//! releases.drain();
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering, fence},
    mpsc::{self, Receiver, Sender},
};

use crate::analyser::{AnalyserHandle, AnalyserTap};
use crate::event::ToneCommand;
use crate::graph::ToneGraph;
use crate::nodes::AmbientTrack;
use crate::scheduler::FrequencyTarget;
use crate::state::EngineConfig;

// ═══════════════════════════════════════════════════════════════════
// Render -> control
// ═══════════════════════════════════════════════════════════════════

/// Lock-free shared state for render -> control readback.
pub(crate) struct SharedReadback {
    pub(crate) frames_rendered: AtomicU64,
    pub(crate) finished: AtomicBool,
    /// Beat and carrier actually sounding at the end of the last block (f32 bits).
    pub(crate) beat_bits: AtomicU32,
    pub(crate) carrier_bits: AtomicU32,
}

impl SharedReadback {
    fn new() -> Self {
        Self {
            frames_rendered: AtomicU64::new(0),
            finished: AtomicBool::new(false),
            beat_bits: AtomicU32::new(0),
            carrier_bits: AtomicU32::new(0),
        }
    }
}

/// Render-side objects handed back so they are freed off the audio thread.
#[allow(clippy::large_enum_variant)]
pub enum Released {
    Graph(ToneGraph),
    Track(AmbientTrack),
}

/// Control-side end of the release path.
///
/// The render side only ever sends; whatever arrives is dropped here when
/// the owner calls [`drain`](Self::drain).
pub struct ReleaseQueue {
    tx: Sender<Released>,
    rx: Receiver<Released>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<Released> {
        self.tx.clone()
    }

    /// Drop everything released so far. Returns how many items were freed.
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }
}

impl Default for ReleaseQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Control -> render: frequency slot
// ═══════════════════════════════════════════════════════════════════

/// Latest frequency target, overwritten in place.
///
/// Single writer (the control side), single reader (the render graph).
/// A sequence counter guards the three fields: odd while a write is in
/// progress, bumped to the next even value when it is complete. The reader
/// skips a torn read and picks the target up on the next block.
pub(crate) struct FrequencySlot {
    sequence: AtomicU64,
    beat_bits: AtomicU32,
    carrier_bits: AtomicU32,
    ramp_frames: AtomicU32,
}

impl FrequencySlot {
    fn new() -> Self {
        Self {
            sequence: AtomicU64::new(0),
            beat_bits: AtomicU32::new(0),
            carrier_bits: AtomicU32::new(0),
            ramp_frames: AtomicU32::new(0),
        }
    }

    fn publish(&self, beat_hz: f32, carrier_hz: f32, ramp_frames: u32) {
        self.sequence.fetch_add(1, Ordering::Relaxed);
        fence(Ordering::Release);
        self.beat_bits.store(beat_hz.to_bits(), Ordering::Relaxed);
        self.carrier_bits.store(carrier_hz.to_bits(), Ordering::Relaxed);
        self.ramp_frames.store(ramp_frames, Ordering::Relaxed);
        self.sequence.fetch_add(1, Ordering::Release);
    }

    /// `(beat, carrier, ramp_frames)` if a target newer than `seen` is
    /// available; updates `seen`.
    pub(crate) fn take_newer(&self, seen: &mut u64) -> Option<(f32, f32, u32)> {
        let before = self.sequence.load(Ordering::Acquire);
        if before == *seen || before % 2 == 1 {
            return None;
        }

        let beat = f32::from_bits(self.beat_bits.load(Ordering::Relaxed));
        let carrier = f32::from_bits(self.carrier_bits.load(Ordering::Relaxed));
        let ramp_frames = self.ramp_frames.load(Ordering::Relaxed);

        fence(Ordering::Acquire);
        if self.sequence.load(Ordering::Relaxed) != before {
            return None;
        }
        *seen = before;
        Some((beat, carrier, ramp_frames))
    }
}

// ═══════════════════════════════════════════════════════════════════
// Handle
// ═══════════════════════════════════════════════════════════════════

/// Control-side handle to one session's render graph.
///
/// Dropping it disconnects the channel; the render graph then fades out
/// and marks itself finished on its own.
pub struct GraphHandle {
    command_tx: Sender<ToneCommand>,
    frequency: Arc<FrequencySlot>,
    readback: Arc<SharedReadback>,
    analyser: Arc<AnalyserTap>,
    sample_rate: f64,
}

impl GraphHandle {
    /// Send a command to the render graph.
    ///
    /// Returns false if the render side is gone (backend dropped the graph).
    pub fn send(&self, cmd: ToneCommand) -> bool {
        self.command_tx.send(cmd).is_ok()
    }

    /// Publish a new frequency target. Replaces any target the graph has
    /// not picked up yet.
    pub fn set_frequency(&self, beat_hz: f32, carrier_hz: f32, ramp_frames: u32) {
        self.frequency.publish(beat_hz, carrier_hz, ramp_frames);
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Frames rendered so far by the graph.
    pub fn frames_rendered(&self) -> u64 {
        self.readback.frames_rendered.load(Ordering::Acquire)
    }

    /// True once the graph has faded out after a shutdown, or the backend
    /// has let go of it.
    pub fn is_finished(&self) -> bool {
        self.readback.finished.load(Ordering::Acquire)
    }

    /// Frequencies sounding at the end of the most recent block.
    pub fn output_frequency(&self) -> FrequencyTarget {
        FrequencyTarget {
            beat_hz: f64::from(f32::from_bits(self.readback.beat_bits.load(Ordering::Relaxed))),
            carrier_hz: f64::from(f32::from_bits(
                self.readback.carrier_bits.load(Ordering::Relaxed),
            )),
        }
    }

    pub fn analyser(&self) -> AnalyserHandle {
        AnalyserHandle::new(Arc::clone(&self.analyser))
    }
}

/// Create a linked control handle and render graph.
///
/// `releases` receives the graph's discarded ambient tracks and, via the
/// backend, the graph itself once it is done.
pub fn create_bridge(
    sample_rate: f64,
    config: &EngineConfig,
    releases: Sender<Released>,
) -> (GraphHandle, ToneGraph) {
    let (command_tx, command_rx) = mpsc::channel();
    let frequency = Arc::new(FrequencySlot::new());
    let readback = Arc::new(SharedReadback::new());
    let analyser = Arc::new(AnalyserTap::new(config.analyser_size));

    let graph = ToneGraph::new(
        sample_rate,
        config,
        command_rx,
        Arc::clone(&frequency),
        Arc::clone(&readback),
        Arc::clone(&analyser),
        releases,
    );

    let handle = GraphHandle {
        command_tx,
        frequency,
        readback,
        analyser,
        sample_rate,
    };

    (handle, graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_slot_keeps_only_latest() {
        let slot = FrequencySlot::new();
        let mut seen = 0;
        assert_eq!(slot.take_newer(&mut seen), None);

        for i in 0..10_000 {
            slot.publish(i as f32, 200.0, 800);
        }
        assert_eq!(slot.take_newer(&mut seen), Some((9_999.0, 200.0, 800)));
        assert_eq!(slot.take_newer(&mut seen), None);

        slot.publish(4.0, 180.0, 0);
        assert_eq!(slot.take_newer(&mut seen), Some((4.0, 180.0, 0)));
    }

    #[test]
    fn test_release_queue_counts_drained_items() {
        let queue = ReleaseQueue::new();
        let sender = queue.sender();
        let track = AmbientTrack::new("bed", 48_000.0, 1, vec![0.1; 64]);
        assert!(sender.send(Released::Track(track)).is_ok());
        assert_eq!(queue.drain(), 1);
        assert_eq!(queue.drain(), 0);
    }
}
