//! The admission gate: request descriptor in, verdict out.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::clock::{Clock, SystemClock};
use super::key::SubjectKey;
use super::policy::AdmissionRules;
use super::store::RateLimiterStore;
use super::window::Admission;

/// Default idle eviction threshold when none is configured.
const DEFAULT_IDLE_EVICTION: Duration = Duration::from_secs(300);

/// What a collaborator wants admitted: who is asking and what for.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdmissionRequest {
    /// Client identity (e.g. source IP or account id)
    pub client: String,
    /// The operation being attempted (e.g. a request path)
    pub operation: String,
}

/// The gate's answer to a collaborator.
///
/// Being over limit is an ordinary value, never an error: the only failure
/// the gate recognizes is an unavailable clock, and that fails open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Proceed with the request.
    Allowed,
    /// Reject the request; the client may retry after this many seconds.
    Denied {
        /// Whole seconds until retrying can succeed, at least 1
        retry_after_secs: u64,
    },
}

impl Verdict {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }
}

/// Translates request descriptors into admission decisions.
///
/// Holds the configured rules, the shared counter store, and the time
/// source. Construct one per process and hand it (via `Arc`) to whichever
/// collaborator fronts the traffic; an isolated instance with a manual
/// clock is equally valid for tests.
pub struct AdmissionGate {
    /// Per-subject counters
    store: RateLimiterStore,
    /// Configured admission rules
    rules: AdmissionRules,
    /// Time source for decisions and eviction
    clock: Arc<dyn Clock>,
    /// How long a subject may stay idle before its counter is evicted
    idle_eviction: Duration,
}

impl AdmissionGate {
    /// Create a gate over the given rules with the system clock.
    pub fn new(rules: AdmissionRules) -> Self {
        Self::with_clock(rules, Arc::new(SystemClock))
    }

    /// Create a gate with an explicit time source.
    pub fn with_clock(rules: AdmissionRules, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: RateLimiterStore::new(),
            rules,
            clock,
            idle_eviction: DEFAULT_IDLE_EVICTION,
        }
    }

    /// Override the idle eviction threshold.
    pub fn with_idle_eviction(mut self, idle_eviction: Duration) -> Self {
        self.idle_eviction = idle_eviction;
        self
    }

    /// Decide whether a request may proceed.
    ///
    /// Requests whose operation matches no configured rule bypass the store
    /// entirely and are always allowed, so unthrottled traffic costs no
    /// memory. A clock failure also allows the request (fail-open): the
    /// limiter must never become the outage itself.
    pub fn decide(&self, request: &AdmissionRequest) -> Verdict {
        let Some((prefix, rule)) = self.rules.find_rule(&request.operation) else {
            trace!(
                client = %request.client,
                operation = %request.operation,
                "No admission rule matches, allowing"
            );
            return Verdict::Allowed;
        };

        let now = match self.clock.now_millis() {
            Ok(now) => now,
            Err(e) => {
                warn!(error = %e, "Clock unavailable, failing open");
                return Verdict::Allowed;
            }
        };

        let key = SubjectKey::new(&request.client, prefix);
        match self.store.decide(&key, now, &rule.windows) {
            Admission::Allowed => Verdict::Allowed,
            Admission::Denied { retry_after } => {
                debug!(
                    key = %key,
                    rule = rule.name.as_deref().unwrap_or(prefix),
                    retry_after_secs = retry_after.as_secs(),
                    "Admission denied"
                );
                Verdict::Denied {
                    retry_after_secs: retry_after.as_secs(),
                }
            }
        }
    }

    /// Evict counters idle past the configured threshold.
    ///
    /// Returns how many were removed. A clock failure skips the cycle; the
    /// next one will catch up.
    pub fn sweep(&self) -> usize {
        match self.clock.now_millis() {
            Ok(now) => self.store.sweep(now, self.idle_eviction),
            Err(e) => {
                warn!(error = %e, "Clock unavailable, skipping eviction sweep");
                0
            }
        }
    }

    /// Run the eviction sweep on a fixed cadence, forever.
    ///
    /// Spawn this onto the runtime next to the server; it never touches the
    /// hot decision path.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.sweep();
        }
    }

    /// Number of subjects currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.store.tracked_keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::clock::ManualClock;
    use crate::error::{Result, TurnstileError};

    /// A clock that always fails, for exercising the fail-open path.
    struct BrokenClock;

    impl Clock for BrokenClock {
        fn now_millis(&self) -> Result<u64> {
            Err(TurnstileError::Clock("no time source".to_string()))
        }
    }

    fn login_rules() -> AdmissionRules {
        AdmissionRules::from_yaml(
            r#"
rules:
  - name: login
    paths: ["/login"]
    windows:
      - { duration_secs: 60, max_count: 60 }
      - { duration_secs: 3600, max_count: 1000 }
"#,
        )
        .unwrap()
    }

    fn request(client: &str, operation: &str) -> AdmissionRequest {
        AdmissionRequest {
            client: client.to_string(),
            operation: operation.to_string(),
        }
    }

    #[test]
    fn test_unmatched_operations_bypass_the_store() {
        let clock = Arc::new(ManualClock::new(0));
        let gate = AdmissionGate::with_clock(login_rules(), clock);

        for _ in 0..10_000 {
            assert!(gate.decide(&request("10.0.0.1", "/profile")).is_allowed());
        }
        // Bypass must not allocate tracking state.
        assert_eq!(gate.tracked_keys(), 0);
    }

    #[test]
    fn test_burst_is_cut_off_at_the_minute_limit() {
        let clock = Arc::new(ManualClock::new(0));
        let gate = AdmissionGate::with_clock(login_rules(), Arc::clone(&clock) as Arc<dyn Clock>);
        let req = request("10.0.0.1", "/login");

        // 61 attempts inside 10 seconds: the first 60 pass.
        for i in 0..60 {
            clock.advance(Duration::from_millis(160));
            assert!(gate.decide(&req).is_allowed(), "attempt {i} should pass");
        }
        let verdict = gate.decide(&req);
        match verdict {
            Verdict::Denied { retry_after_secs } => {
                assert!((1..=60).contains(&retry_after_secs));
            }
            Verdict::Allowed => panic!("attempt 61 should be denied"),
        }

        // A minute later the window has slid past the burst.
        clock.advance(Duration::from_secs(61));
        assert!(gate.decide(&req).is_allowed());
    }

    #[test]
    fn test_retry_after_is_sufficient_and_not_premature() {
        let rules = AdmissionRules::from_yaml(
            r#"
rules:
  - paths: ["/login"]
    windows:
      - { duration_secs: 60, max_count: 1 }
"#,
        )
        .unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let gate = AdmissionGate::with_clock(rules, Arc::clone(&clock) as Arc<dyn Clock>);
        let req = request("10.0.0.1", "/login");

        assert!(gate.decide(&req).is_allowed());
        clock.advance(Duration::from_secs(10));

        let retry_after_secs = match gate.decide(&req) {
            Verdict::Denied { retry_after_secs } => retry_after_secs,
            Verdict::Allowed => panic!("expected denial"),
        };

        // One second early is still denied.
        clock.advance(Duration::from_secs(retry_after_secs - 1));
        assert!(!gate.decide(&req).is_allowed());

        // Exactly at the advertised time the attempt passes.
        clock.advance(Duration::from_secs(1));
        assert!(gate.decide(&req).is_allowed());
    }

    #[test]
    fn test_clients_are_throttled_independently() {
        let clock = Arc::new(ManualClock::new(0));
        let gate = AdmissionGate::with_clock(login_rules(), Arc::clone(&clock) as Arc<dyn Clock>);

        for _ in 0..60 {
            assert!(gate.decide(&request("10.0.0.1", "/login")).is_allowed());
        }
        assert!(!gate.decide(&request("10.0.0.1", "/login")).is_allowed());
        assert!(gate.decide(&request("10.0.0.2", "/login")).is_allowed());
    }

    #[test]
    fn test_broken_clock_fails_open() {
        let gate = AdmissionGate::with_clock(login_rules(), Arc::new(BrokenClock));
        let req = request("10.0.0.1", "/login");

        // Far more than the limit, all admitted: availability beats limiting.
        for _ in 0..100 {
            assert!(gate.decide(&req).is_allowed());
        }
        assert_eq!(gate.sweep(), 0);
    }

    #[test]
    fn test_sweep_reclaims_one_shot_keys() {
        let clock = Arc::new(ManualClock::new(0));
        let gate = AdmissionGate::with_clock(login_rules(), Arc::clone(&clock) as Arc<dyn Clock>)
            .with_idle_eviction(Duration::from_secs(120));

        for i in 0..10_000 {
            gate.decide(&request(&format!("client-{i}"), "/login"));
        }
        assert_eq!(gate.tracked_keys(), 10_000);

        clock.advance(Duration::from_secs(121));
        assert_eq!(gate.sweep(), 10_000);
        assert_eq!(gate.tracked_keys(), 0);

        // Eviction is not terminal: the key comes back on next sight.
        assert!(gate.decide(&request("client-1", "/login")).is_allowed());
        assert_eq!(gate.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_runs_on_its_own_cadence() {
        let clock = Arc::new(ManualClock::new(0));
        let gate = Arc::new(
            AdmissionGate::with_clock(login_rules(), Arc::clone(&clock) as Arc<dyn Clock>)
                .with_idle_eviction(Duration::from_secs(1)),
        );

        gate.decide(&request("10.0.0.1", "/login"));
        assert_eq!(gate.tracked_keys(), 1);

        let sweeper = tokio::spawn(Arc::clone(&gate).run_sweeper(Duration::from_millis(10)));
        clock.advance(Duration::from_secs(2));

        // Give the sweeper a few ticks to notice.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(gate.tracked_keys(), 0);
        sweeper.abort();
    }
}
