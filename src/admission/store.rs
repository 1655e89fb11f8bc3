//! Concurrent subject → counter store with idle eviction.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, trace};

use super::key::SubjectKey;
use super::policy::WindowRule;
use super::window::{Admission, WindowCounter};

/// The shared map of per-subject window counters.
///
/// Entries are created lazily on first access and removed again by
/// [`sweep`](Self::sweep) once idle. Locking is sharded: the map itself
/// (a [`DashMap`]) only guards entry lookup, and each counter carries its
/// own mutex, so decisions for different subjects never serialize against
/// each other.
pub struct RateLimiterStore {
    /// Counters indexed by subject key
    entries: DashMap<SubjectKey, Mutex<WindowCounter>>,
}

impl RateLimiterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Run an atomic admission check for one subject.
    ///
    /// Looks up (or installs, insert-if-absent) the subject's counter, then
    /// performs the check-then-append step under the counter's own lock so
    /// concurrent callers for the same key cannot both take the last slot.
    pub fn decide(&self, key: &SubjectKey, now: u64, windows: &[WindowRule]) -> Admission {
        let entry = match self.entries.get(key) {
            Some(entry) => entry,
            None => self
                .entries
                .entry(key.clone())
                .or_insert_with(|| {
                    trace!(key = %key, "Creating admission counter");
                    Mutex::new(WindowCounter::new(windows))
                })
                .downgrade(),
        };

        let mut counter = entry.lock();
        counter.try_admit(now, windows)
    }

    /// Remove every counter that has been idle for at least `idle_ttl`.
    ///
    /// Runs off the decision path on the sweeper's cadence. `retain` holds
    /// the shard write lock and hands out exclusive access to each entry,
    /// so an in-flight `decide` is never unlinked mid-check; a decision
    /// arriving just after eviction transparently re-creates the entry.
    /// Returns how many counters were evicted.
    pub fn sweep(&self, now: u64, idle_ttl: Duration) -> usize {
        let idle_millis = idle_ttl.as_millis() as u64;
        let mut evicted = 0usize;

        self.entries.retain(|key, counter| {
            let idle = now.saturating_sub(counter.get_mut().last_touched());
            if idle >= idle_millis {
                trace!(key = %key, idle_millis = idle, "Evicting idle admission counter");
                evicted += 1;
                false
            } else {
                true
            }
        });

        if evicted > 0 {
            debug!(
                evicted,
                remaining = self.entries.len(),
                "Swept idle admission counters"
            );
        }
        evicted
    }

    /// Number of subjects currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    /// Drop all counters.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for RateLimiterStore {
    fn default() -> Self {
        Self::new()
    }
}
