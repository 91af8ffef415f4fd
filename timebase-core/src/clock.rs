//! Injectable monotonic time source.
//!
//! Playback and recording both derive time from a [`Clock`] instead of a
//! global so tests can drive virtual time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic elapsed-time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since this clock's origin. Never decreases.
    fn elapsed(&self) -> Duration;
}

/// Clock shared between a controller or recorder and its owner.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.nanos
            .fetch_add(delta.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Move time forward by `seconds`. Negative or non-finite amounts are
    /// ignored.
    pub fn advance_secs(&self, seconds: f32) {
        if let Ok(delta) = Duration::try_from_secs_f32(seconds) {
            self.advance(delta);
        }
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.elapsed(), Duration::ZERO);

        clock.advance(Duration::from_millis(250));
        clock.advance_secs(0.75);
        assert_eq!(clock.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn test_monotonic_clock_never_decreases() {
        let clock = MonotonicClock::new();
        let a = clock.elapsed();
        let b = clock.elapsed();
        assert!(b >= a);
    }
}
