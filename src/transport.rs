// src/transport.rs
//
// Session clock.
//
// The clock never reads a time source itself: every transition takes the
// host's monotonic timestamp. That keeps it independent of any particular
// scheduling primitive and lets tests drive it with synthetic time.

use serde::{Deserialize, Serialize};

use crate::state::PlaybackStatus;

//
// ===============================
// MARK: Timestamp
// ===============================
//

/// Monotonic host timestamp, in seconds from an arbitrary origin.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Timestamp(f64);

impl Timestamp {
    #[inline]
    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    /// From a millisecond clock (e.g. `performance.now()`).
    #[inline]
    pub fn from_millis(ms: f64) -> Self {
        Self(ms * 0.001)
    }

    #[inline]
    pub fn as_secs(&self) -> f64 {
        self.0
    }

    /// Seconds from `earlier` to `self`, never negative.
    #[inline]
    pub fn saturating_since(&self, earlier: Timestamp) -> f64 {
        let delta = self.0 - earlier.0;
        if delta.is_finite() { delta.max(0.0) } else { 0.0 }
    }
}

//
// ===============================
// MARK: Session clock
// ===============================
//

/// Result of sampling the clock on a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTick {
    /// Current elapsed session time.
    pub elapsed: f64,

    /// Seconds since the previous tick (0 on the first tick after start/resume).
    pub interval: f64,

    /// True only on the tick that crossed the session duration.
    pub completed: bool,
}

/// Authoritative elapsed-time tracker robust to pause/resume.
///
/// `elapsed = accumulated + (running ? now - start_instant : 0)`
///
/// The value is non-decreasing while running and frozen exactly at the
/// pause instant while paused.
#[derive(Debug, Clone)]
pub struct SessionClock {
    status: PlaybackStatus,

    /// When playback began or last resumed.
    start_instant: Timestamp,

    /// Seconds accumulated before the most recent pause.
    accumulated: f64,

    /// Highest elapsed value handed out; guards against host clock jitter.
    high_water: f64,

    /// Previous tick timestamp in the current running stretch.
    last_tick: Option<Timestamp>,

    duration: f64,
}

impl SessionClock {
    pub fn new(duration: f64) -> Self {
        Self {
            status: PlaybackStatus::Idle,
            start_instant: Timestamp::default(),
            accumulated: 0.0,
            high_water: 0.0,
            last_tick: None,
            duration,
        }
    }

    #[inline]
    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    #[inline]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.status == PlaybackStatus::Running
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.status == PlaybackStatus::Paused
    }

    // -------------------------------
    // MARK: Transitions
    // -------------------------------

    /// idle -> running. Returns false if the clock was already started.
    pub fn start(&mut self, now: Timestamp) -> bool {
        if self.status != PlaybackStatus::Idle {
            return false;
        }
        self.status = PlaybackStatus::Running;
        self.start_instant = now;
        self.accumulated = 0.0;
        self.high_water = 0.0;
        self.last_tick = None;
        true
    }

    /// running -> paused, freezing elapsed at `now`.
    pub fn pause(&mut self, now: Timestamp) -> bool {
        if self.status != PlaybackStatus::Running {
            return false;
        }
        self.accumulated = self.elapsed(now);
        self.high_water = self.accumulated;
        self.status = PlaybackStatus::Paused;
        self.last_tick = None;
        true
    }

    /// paused -> running. Accumulated time carries forward.
    pub fn resume(&mut self, now: Timestamp) -> bool {
        if self.status != PlaybackStatus::Paused {
            return false;
        }
        self.start_instant = now;
        self.status = PlaybackStatus::Running;
        self.last_tick = None;
        true
    }

    /// running/paused -> stopped. Terminal; elapsed is frozen.
    pub fn stop(&mut self, now: Timestamp) -> bool {
        match self.status {
            PlaybackStatus::Running | PlaybackStatus::Paused => {
                self.accumulated = self.elapsed(now);
                self.high_water = self.accumulated;
                self.status = PlaybackStatus::Stopped;
                true
            }
            _ => false,
        }
    }

    // -------------------------------
    // MARK: Sampling
    // -------------------------------

    /// Elapsed session time at `now`.
    pub fn elapsed(&self, now: Timestamp) -> f64 {
        match self.status {
            PlaybackStatus::Running => {
                let live = self.accumulated + now.saturating_since(self.start_instant);
                live.max(self.high_water)
            }
            _ => self.accumulated,
        }
    }

    /// Sample the clock for a tick. Transitions to complete once elapsed
    /// reaches the duration; that tick reports `completed` exactly once.
    pub fn tick(&mut self, now: Timestamp) -> ClockTick {
        if self.status != PlaybackStatus::Running {
            return ClockTick {
                elapsed: self.accumulated,
                interval: 0.0,
                completed: false,
            };
        }

        let elapsed = self.elapsed(now);
        self.high_water = elapsed;

        let interval = self
            .last_tick
            .map(|last| now.saturating_since(last))
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        let completed = elapsed >= self.duration;
        if completed {
            self.accumulated = elapsed;
            self.status = PlaybackStatus::Complete;
        }

        ClockTick {
            elapsed,
            interval,
            completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: f64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn test_elapsed_tracks_wall_clock() {
        let mut clock = SessionClock::new(180.0);
        assert!(clock.start(at(100.0)));
        assert_eq!(clock.elapsed(at(130.0)), 30.0);
    }

    #[test]
    fn test_pause_freezes_time() {
        let mut clock = SessionClock::new(180.0);
        clock.start(at(0.0));
        clock.pause(at(10.0));
        assert_eq!(clock.elapsed(at(10.0)), 10.0);
        assert_eq!(clock.elapsed(at(15.0)), 10.0);

        // Resume after a 5s gap: no time is lost or gained.
        clock.resume(at(15.0));
        assert_eq!(clock.elapsed(at(15.0)), 10.0);
        assert_eq!(clock.elapsed(at(20.0)), 15.0);
    }

    #[test]
    fn test_repeated_pause_resume_cycles() {
        let mut clock = SessionClock::new(1_000.0);
        clock.start(at(0.0));
        let mut now = 0.0;
        let mut expected = 0.0;
        for _ in 0..50 {
            now += 1.5; // running
            expected += 1.5;
            clock.pause(at(now));
            assert!((clock.elapsed(at(now)) - expected).abs() < 1e-9);
            now += 7.0; // paused
            clock.resume(at(now));
            assert!((clock.elapsed(at(now)) - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_invalid_transitions_are_noops() {
        let mut clock = SessionClock::new(60.0);
        assert!(!clock.pause(at(0.0)));
        assert!(!clock.resume(at(0.0)));
        assert!(!clock.stop(at(0.0)));

        clock.start(at(0.0));
        assert!(!clock.start(at(1.0)));
        assert!(!clock.resume(at(1.0)));

        clock.pause(at(2.0));
        assert!(!clock.pause(at(3.0)));
        assert_eq!(clock.elapsed(at(3.0)), 2.0);
    }

    #[test]
    fn test_stop_is_terminal_and_idempotent() {
        let mut clock = SessionClock::new(60.0);
        clock.start(at(0.0));
        assert!(clock.stop(at(12.0)));
        assert!(!clock.stop(at(20.0)));
        assert_eq!(clock.status(), PlaybackStatus::Stopped);
        assert_eq!(clock.elapsed(at(50.0)), 12.0);
        assert!(!clock.tick(at(90.0)).completed);
    }

    #[test]
    fn test_monotonic_under_backwards_timestamps() {
        let mut clock = SessionClock::new(60.0);
        clock.start(at(10.0));
        let a = clock.tick(at(15.0)).elapsed;
        let b = clock.tick(at(14.0)).elapsed;
        let c = clock.tick(at(16.0)).elapsed;
        assert!(b >= a);
        assert!(c >= b);
    }

    #[test]
    fn test_completion_reported_once() {
        let mut clock = SessionClock::new(10.0);
        clock.start(at(0.0));
        assert!(!clock.tick(at(9.9)).completed);
        let tick = clock.tick(at(10.0));
        assert!(tick.completed);
        assert_eq!(clock.status(), PlaybackStatus::Complete);
        assert!(!clock.tick(at(11.0)).completed);
        assert_eq!(clock.elapsed(at(50.0)), 10.0);
    }

    #[test]
    fn test_tick_interval() {
        let mut clock = SessionClock::new(60.0);
        clock.start(at(0.0));
        assert_eq!(clock.tick(at(0.0)).interval, 0.0);
        assert!((clock.tick(at(0.016)).interval - 0.016).abs() < 1e-12);
        clock.pause(at(0.02));
        clock.resume(at(5.0));
        assert_eq!(clock.tick(at(5.01)).interval, 0.0);
    }
}
