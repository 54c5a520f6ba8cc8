//! Monotonic time sources for capture timestamps.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Milliseconds since an arbitrary fixed origin. Never wall-clock.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_ms(&self) -> f64;
}

#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A clock that only moves when told to. Resolution is one microsecond.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ms: f64) -> Self {
        let clock = Self::new();
        clock.set(ms);
        clock
    }

    /// Moves the clock forward. Negative amounts are ignored.
    pub fn advance(&self, ms: f64) {
        if ms > 0.0 && ms.is_finite() {
            self.micros
                .fetch_add((ms * 1000.0).round() as u64, Ordering::SeqCst);
        }
    }

    /// Sets the clock, refusing to move it backwards.
    pub fn set(&self, ms: f64) {
        if ms.is_finite() && ms >= 0.0 {
            self.micros
                .fetch_max((ms * 1000.0).round() as u64, Ordering::SeqCst);
        }
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_monotonic() {
        let clock = ManualClock::starting_at(100.0);
        clock.advance(25.5);
        assert_eq!(clock.now_ms(), 125.5);
        clock.set(50.0);
        assert_eq!(clock.now_ms(), 125.5);
        clock.advance(-10.0);
        assert_eq!(clock.now_ms(), 125.5);
    }

    #[test]
    fn test_monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
