//! Injectable time sources for the admission core.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Result, TurnstileError};

/// A source of wall-clock time, measured in milliseconds since the Unix epoch.
///
/// The admission core never reads the system clock directly; it goes through
/// this trait so tests can drive time deterministically and so a failing time
/// source surfaces as an error the gate can fail open on.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> Result<u64>;
}

/// The production clock, backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Result<u64> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TurnstileError::Clock(e.to_string()))?;
        Ok(since_epoch.as_millis() as u64)
    }
}

/// A manually advanced clock for tests.
///
/// Starts at an arbitrary fixed instant and only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `now_millis`.
    pub fn new(now_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(now_millis),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Jump the clock to an absolute time.
    pub fn set(&self, now_millis: u64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Result<u64> {
        Ok(self.now.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_returns_time() {
        let clock = SystemClock;
        let now = clock.now_millis().unwrap();
        // Sanity: later than 2020-01-01.
        assert!(now > 1_577_836_800_000);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_millis().unwrap(), 1_000);

        clock.advance(Duration::from_secs(61));
        assert_eq!(clock.now_millis().unwrap(), 62_000);

        clock.set(500);
        assert_eq!(clock.now_millis().unwrap(), 500);
    }
}
