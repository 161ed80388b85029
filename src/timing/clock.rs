use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Wall-clock source, in seconds since the Unix epoch.
///
/// Queue-start headers are epoch seconds, so the collector works in the
/// same unit rather than with monotonic `Instant`s.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: AtomicU64::new(start.to_bits()),
        }
    }

    pub fn set(&self, now: f64) {
        self.bits.store(now.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: f64) {
        self.set(self.now() + secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_epoch_seconds() {
        // Anything after 2001-09-09 clears the queue-start plausibility floor
        assert!(SystemClock.now() > 1_000_000_000.0);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(100.0);
        clock.advance(2.5);
        assert_eq!(clock.now(), 102.5);
    }
}
