//! Per-process circuit breaker
//!
//! Tracks consecutive restart failures per process name and blocks further
//! attempts once a threshold is reached, resuming after a cooldown. The
//! state table lives inside this struct and is owned by the monitor loop's
//! task — never global, never persisted, so failure history resets with
//! the daemon.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Breaker position for one process name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    /// Restarts permitted.
    Closed,
    /// Restarts blocked until the reset window elapses.
    Open,
}

/// Failure accounting for one process name.
#[derive(Debug)]
struct CircuitState {
    status: BreakerStatus,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
}

impl CircuitState {
    fn new() -> Self {
        Self {
            status: BreakerStatus::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
        }
    }
}

/// Per-process-name restart gate.
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_duration: Duration,
    states: HashMap<String, CircuitState>,
}

impl CircuitBreaker {
    /// Create a breaker that opens after `failure_threshold` consecutive
    /// failures and resets `reset_duration` after the last failure.
    pub fn new(failure_threshold: u32, reset_duration: Duration) -> Self {
        Self {
            failure_threshold,
            reset_duration,
            states: HashMap::new(),
        }
    }

    /// Whether a restart attempt for `name` may proceed right now.
    pub fn may_attempt(&mut self, name: &str) -> bool {
        self.may_attempt_at(name, Instant::now())
    }

    /// Time-injecting form of [`may_attempt`](Self::may_attempt).
    ///
    /// While Open and within the reset window this returns false and logs
    /// a warning. At or past the window boundary it performs the
    /// Open→Closed transition (failure count back to zero) and returns
    /// true. The reset is optimistic: it happens here, on the permission
    /// check, before the new attempt's outcome is known — a run of
    /// failures after it must reach the threshold again to re-open.
    pub fn may_attempt_at(&mut self, name: &str, now: Instant) -> bool {
        let state = self
            .states
            .entry(name.to_string())
            .or_insert_with(CircuitState::new);

        match state.status {
            BreakerStatus::Closed => true,
            BreakerStatus::Open => {
                let since_last_failure = state
                    .last_failure_at
                    .map_or(self.reset_duration, |t| now.saturating_duration_since(t));

                if since_last_failure >= self.reset_duration {
                    state.status = BreakerStatus::Closed;
                    state.consecutive_failures = 0;
                    info!(
                        process = name,
                        idle_secs = since_last_failure.as_secs(),
                        "Circuit reset — allowing restart attempts again"
                    );
                    true
                } else {
                    warn!(
                        process = name,
                        remaining_secs =
                            (self.reset_duration - since_last_failure).as_secs(),
                        "Circuit open — skipping restart attempt"
                    );
                    false
                }
            }
        }
    }

    /// Record the outcome of a restart attempt for `name`.
    pub fn record_outcome(&mut self, name: &str, success: bool) {
        self.record_outcome_at(name, success, Instant::now());
    }

    /// Time-injecting form of [`record_outcome`](Self::record_outcome).
    pub fn record_outcome_at(&mut self, name: &str, success: bool, now: Instant) {
        let threshold = self.failure_threshold;
        let state = self
            .states
            .entry(name.to_string())
            .or_insert_with(CircuitState::new);

        if success {
            state.consecutive_failures = 0;
            return;
        }

        state.consecutive_failures += 1;
        state.last_failure_at = Some(now);

        if state.status == BreakerStatus::Closed && state.consecutive_failures >= threshold {
            state.status = BreakerStatus::Open;
            warn!(
                process = name,
                failures = state.consecutive_failures,
                "Circuit opened — suppressing restart attempts"
            );
        }
    }

    /// Current breaker position for `name`, if it has ever been seen.
    pub fn status_of(&self, name: &str) -> Option<BreakerStatus> {
        self.states.get(name).map(|s| s.status)
    }

    /// Consecutive failure count for `name` (zero if never seen).
    pub fn failures_of(&self, name: &str) -> u32 {
        self.states
            .get(name)
            .map_or(0, |s| s.consecutive_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(3, Duration::from_secs(60))
    }

    #[test]
    fn first_attempt_is_allowed() {
        let mut b = breaker();
        assert!(b.may_attempt("svc-x"));
        assert_eq!(b.status_of("svc-x"), Some(BreakerStatus::Closed));
    }

    #[test]
    fn failures_below_threshold_stay_closed() {
        let mut b = breaker();
        let now = Instant::now();
        b.record_outcome_at("svc-x", false, now);
        b.record_outcome_at("svc-x", false, now);
        assert_eq!(b.status_of("svc-x"), Some(BreakerStatus::Closed));
        assert_eq!(b.failures_of("svc-x"), 2);
        assert!(b.may_attempt_at("svc-x", now));
    }

    #[test]
    fn failure_count_is_monotonic_while_failing() {
        let mut b = CircuitBreaker::new(10, Duration::from_secs(60));
        let now = Instant::now();
        for expected in 1..=5 {
            b.record_outcome_at("svc-x", false, now);
            assert_eq!(b.failures_of("svc-x"), expected);
        }
    }

    #[test]
    fn opens_exactly_at_threshold() {
        let mut b = breaker();
        let now = Instant::now();
        b.record_outcome_at("svc-x", false, now);
        b.record_outcome_at("svc-x", false, now);
        assert_eq!(b.status_of("svc-x"), Some(BreakerStatus::Closed));
        b.record_outcome_at("svc-x", false, now);
        assert_eq!(b.status_of("svc-x"), Some(BreakerStatus::Open));
    }

    #[test]
    fn success_resets_failure_count() {
        let mut b = breaker();
        let now = Instant::now();
        b.record_outcome_at("svc-x", false, now);
        b.record_outcome_at("svc-x", false, now);
        b.record_outcome_at("svc-x", true, now);
        assert_eq!(b.failures_of("svc-x"), 0);
        assert_eq!(b.status_of("svc-x"), Some(BreakerStatus::Closed));
    }

    #[test]
    fn intervening_success_prevents_opening() {
        let mut b = breaker();
        let now = Instant::now();
        // Never three failures in a row → never opens.
        for _ in 0..4 {
            b.record_outcome_at("svc-x", false, now);
            b.record_outcome_at("svc-x", false, now);
            b.record_outcome_at("svc-x", true, now);
        }
        assert_eq!(b.status_of("svc-x"), Some(BreakerStatus::Closed));
    }

    #[test]
    fn open_circuit_blocks_within_reset_window() {
        // Three consecutive failures open the circuit; a check 10s later
        // is rejected.
        let mut b = breaker();
        let t0 = Instant::now();
        for _ in 0..3 {
            b.record_outcome_at("svc-x", false, t0);
        }
        assert!(!b.may_attempt_at("svc-x", t0 + Duration::from_secs(10)));
        assert_eq!(b.status_of("svc-x"), Some(BreakerStatus::Open));
    }

    #[test]
    fn open_circuit_resets_at_window_boundary() {
        // Checked again 65s after the last failure: the breaker resets to
        // Closed and the attempt proceeds.
        let mut b = breaker();
        let t0 = Instant::now();
        for _ in 0..3 {
            b.record_outcome_at("svc-x", false, t0);
        }
        assert!(b.may_attempt_at("svc-x", t0 + Duration::from_secs(65)));
        assert_eq!(b.status_of("svc-x"), Some(BreakerStatus::Closed));
        assert_eq!(b.failures_of("svc-x"), 0);
    }

    #[test]
    fn reset_happens_exactly_at_boundary() {
        let mut b = breaker();
        let t0 = Instant::now();
        for _ in 0..3 {
            b.record_outcome_at("svc-x", false, t0);
        }
        assert!(!b.may_attempt_at("svc-x", t0 + Duration::from_secs(59)));
        assert!(b.may_attempt_at("svc-x", t0 + Duration::from_secs(60)));
    }

    #[test]
    fn optimistic_reset_requires_full_run_to_reopen() {
        let mut b = breaker();
        let t0 = Instant::now();
        for _ in 0..3 {
            b.record_outcome_at("svc-x", false, t0);
        }
        let t1 = t0 + Duration::from_secs(120);
        assert!(b.may_attempt_at("svc-x", t1));

        // The reset zeroed the count before the attempt ran, so one more
        // failure leaves the circuit closed.
        b.record_outcome_at("svc-x", false, t1);
        assert_eq!(b.status_of("svc-x"), Some(BreakerStatus::Closed));
        assert_eq!(b.failures_of("svc-x"), 1);

        b.record_outcome_at("svc-x", false, t1);
        b.record_outcome_at("svc-x", false, t1);
        assert_eq!(b.status_of("svc-x"), Some(BreakerStatus::Open));
    }

    #[test]
    fn names_are_tracked_independently() {
        let mut b = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            b.record_outcome_at("svc-x", false, now);
        }
        assert!(!b.may_attempt_at("svc-x", now));
        assert!(b.may_attempt_at("svc-y", now));
    }
}
