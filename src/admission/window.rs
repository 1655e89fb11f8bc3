//! Sliding-window event history for a single subject.

use std::collections::VecDeque;
use std::time::Duration;

use super::policy::WindowRule;

/// Outcome of a single admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The attempt is within every configured window; it has been recorded.
    Allowed,
    /// At least one window is full. Nothing was recorded.
    Denied {
        /// How long until the binding window frees a slot, rounded up to
        /// whole seconds, never less than one second.
        retry_after: Duration,
    },
}

impl Admission {
    /// Whether this attempt was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Tracks one subject's admitted events across every configured window.
///
/// Each window keeps the timestamps (unix milliseconds) of admitted events,
/// oldest first. Timestamps arrive in nondecreasing order, so expiry is a
/// prefix trim from the front of the deque rather than a scan of the whole
/// history. Only admitted events are stored: a denied attempt consumes no
/// capacity, which is what lets the window slide instead of saturating.
#[derive(Debug)]
pub struct WindowCounter {
    /// Admitted-event timestamps per window, aligned with the rule slice
    /// passed to `try_admit`
    events: Vec<VecDeque<u64>>,
    /// When this subject was last seen (any attempt, allowed or denied);
    /// drives idle eviction
    last_touched: u64,
}

impl WindowCounter {
    /// Create an empty counter for the given windows.
    pub fn new(windows: &[WindowRule]) -> Self {
        Self {
            events: windows
                .iter()
                .map(|w| VecDeque::with_capacity(w.max_count))
                .collect(),
            last_touched: 0,
        }
    }

    /// Check every window and record the event if all have capacity.
    ///
    /// Expired timestamps are pruned first. If any window is already at its
    /// limit the attempt is denied and no state changes; `retry_after` is
    /// computed from the binding window (the one with the least remaining
    /// slack, ties broken by the soonest-expiring oldest event). Otherwise
    /// `now` is appended to every window and the attempt is allowed.
    ///
    /// Callers must serialize invocations per subject; the store wraps each
    /// counter in a mutex so check-then-append is atomic.
    pub fn try_admit(&mut self, now: u64, windows: &[WindowRule]) -> Admission {
        debug_assert_eq!(self.events.len(), windows.len());
        self.last_touched = now;

        for (events, rule) in self.events.iter_mut().zip(windows) {
            // An event admitted at t stops counting at t + duration, so the
            // expiry check is inclusive: waiting exactly `retry_after` frees
            // the slot.
            let duration = rule.duration_millis();
            while events.front().is_some_and(|&t| t + duration <= now) {
                events.pop_front();
            }
        }

        // Find the binding window among those that are full: least slack,
        // then soonest expiry.
        let mut binding: Option<(i64, u64)> = None;
        for (events, rule) in self.events.iter().zip(windows) {
            let slack = rule.max_count as i64 - events.len() as i64;
            if slack > 0 {
                continue;
            }
            let oldest = events.front().copied().unwrap_or(now);
            let retry_millis = (oldest + rule.duration_millis()).saturating_sub(now);
            let tighter = match binding {
                Some((best_slack, best_retry)) => {
                    slack < best_slack || (slack == best_slack && retry_millis < best_retry)
                }
                None => true,
            };
            if tighter {
                binding = Some((slack, retry_millis));
            }
        }

        if let Some((_, retry_millis)) = binding {
            let secs = retry_millis.div_ceil(1_000).max(1);
            return Admission::Denied {
                retry_after: Duration::from_secs(secs),
            };
        }

        for events in &mut self.events {
            events.push_back(now);
        }
        Admission::Allowed
    }

    /// When this subject last made an attempt, in unix milliseconds.
    pub fn last_touched(&self) -> u64 {
        self.last_touched
    }

    /// Number of admitted events currently stored for the window at `index`.
    #[cfg(test)]
    pub fn stored(&self, index: usize) -> usize {
        self.events[index].len()
    }
}
