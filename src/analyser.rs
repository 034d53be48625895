// src/analyser.rs
//
// Passive analysis tap.
//
// The render graph copies its final output into a lock-free ring; the
// visualization side reads it whenever it likes. Readers never block the
// audio thread and the tap never alters the signal.

use std::sync::{
    Arc,
    atomic::{AtomicU32, AtomicUsize, Ordering},
};

/// Lock-free ring of recent mono samples.
///
/// Samples are stored as f32 bits in atomics (no AtomicF32 in std).
pub struct AnalyserTap {
    ring: Box<[AtomicU32]>,
    /// Total samples ever written; the ring index is `written % len`.
    written: AtomicUsize,
}

impl AnalyserTap {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            ring: (0..size).map(|_| AtomicU32::new(0.0_f32.to_bits())).collect(),
            written: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Append the mono mix of a stereo block. Audio thread only.
    pub fn write_stereo(&self, left: &[f32], right: &[f32]) {
        let len = self.ring.len();
        let mut pos = self.written.load(Ordering::Relaxed);
        for (l, r) in left.iter().zip(right) {
            let mono = (l + r) * 0.5;
            self.ring[pos % len].store(mono.to_bits(), Ordering::Relaxed);
            pos = pos.wrapping_add(1);
        }
        self.written.store(pos, Ordering::Release);
    }

    /// Copy the most recent samples, oldest first, into `out`.
    ///
    /// If `out` is longer than the ring, the leading part is zero-filled.
    /// Returns the number of samples that came from the ring.
    pub fn read_into(&self, out: &mut [f32]) -> usize {
        let len = self.ring.len();
        let written = self.written.load(Ordering::Acquire);
        let available = written.min(len).min(out.len());
        let lead = out.len() - available;

        out[..lead].fill(0.0);
        let start = written.wrapping_sub(available);
        for (i, slot) in out[lead..].iter_mut().enumerate() {
            let idx = start.wrapping_add(i) % len;
            *slot = f32::from_bits(self.ring[idx].load(Ordering::Relaxed));
        }
        available
    }

    /// Total samples written since creation.
    #[inline]
    pub fn samples_written(&self) -> usize {
        self.written.load(Ordering::Acquire)
    }
}

/// Read-only handle to a session's analyser tap.
#[derive(Clone)]
pub struct AnalyserHandle {
    tap: Arc<AnalyserTap>,
}

impl AnalyserHandle {
    pub(crate) fn new(tap: Arc<AnalyserTap>) -> Self {
        Self { tap }
    }

    /// Number of samples the tap holds.
    #[inline]
    pub fn size(&self) -> usize {
        self.tap.len()
    }

    /// Fill `out` with the most recent time-domain samples (oldest first).
    pub fn time_domain_data(&self, out: &mut [f32]) -> usize {
        self.tap.read_into(out)
    }

    /// Allocate and return a full window of recent samples.
    pub fn snapshot(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.tap.len()];
        self.tap.read_into(&mut out);
        out
    }

    /// Peak absolute level over the current window.
    pub fn peak(&self) -> f32 {
        self.snapshot()
            .iter()
            .fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }

    #[inline]
    pub fn samples_written(&self) -> usize {
        self.tap.samples_written()
    }
}

impl std::fmt::Debug for AnalyserHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyserHandle")
            .field("size", &self.tap.len())
            .field("samples_written", &self.tap.samples_written())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tap_reads_zeros() {
        let tap = AnalyserTap::new(8);
        let mut out = [1.0; 4];
        assert_eq!(tap.read_into(&mut out), 0);
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn test_mono_mix_and_order() {
        let tap = AnalyserTap::new(4);
        tap.write_stereo(&[1.0, 2.0], &[3.0, 4.0]);
        let mut out = [9.0; 4];
        assert_eq!(tap.read_into(&mut out), 2);
        assert_eq!(out, [0.0, 0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_ring_wraps_keeping_latest() {
        let tap = AnalyserTap::new(4);
        let left: Vec<f32> = (0..10).map(|i| i as f32).collect();
        tap.write_stereo(&left, &left);
        let handle = AnalyserHandle::new(Arc::new(tap));
        assert_eq!(handle.snapshot(), vec![6.0, 7.0, 8.0, 9.0]);
        assert_eq!(handle.peak(), 9.0);
        assert_eq!(handle.samples_written(), 10);
    }
}
