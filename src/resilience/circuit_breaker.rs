//! Circuit breaker guarding health probes.
//!
//! # States
//! - Closed: probes run every cycle
//! - Open: service assumed down, probes are skipped until the cooldown ends
//! - Half-Open: trial probes decide whether to close or reopen
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures >= failure_threshold
//! Open → Half-Open: now >= next_attempt_at (checked before a probe)
//! Half-Open → Closed: successes >= recovery_threshold
//! Half-Open → Open: any failure (fresh cooldown)
//! ```
//!
//! # Design Decisions
//! - One breaker per service record, stored inside it
//! - Time is passed in as epoch milliseconds so transitions are deterministic
//! - Counters reset on every state change

use serde::{Deserialize, Serialize};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }
}

/// Thresholds shared by every breaker in a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerPolicy {
    /// Consecutive failures (while closed) that open the circuit.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the circuit.
    pub recovery_threshold: u32,
    /// Cooldown before a half-open trial, in milliseconds.
    pub open_timeout_ms: u64,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_threshold: 2,
            open_timeout_ms: 60_000,
        }
    }
}

/// Decision taken before dispatching a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// Breaker closed, probe as usual.
    Allowed,
    /// Breaker moved to (or already is in) half-open; this probe is a trial.
    Trial,
    /// Breaker open and cooling down.
    Denied { retry_at: u64 },
}

/// State change produced by recording an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Opened { next_attempt_at: u64 },
    Closed,
}

/// Per-service circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    policy: BreakerPolicy,
    state: BreakerState,
    failures: u32,
    successes: u32,
    last_failure: Option<u64>,
    last_success: Option<u64>,
    opened_at: Option<u64>,
    next_attempt_at: Option<u64>,
}

impl CircuitBreaker {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            policy,
            state: BreakerState::Closed,
            failures: 0,
            successes: 0,
            last_failure: None,
            last_success: None,
            opened_at: None,
            next_attempt_at: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn policy(&self) -> &BreakerPolicy {
        &self.policy
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn successes(&self) -> u32 {
        self.successes
    }

    pub fn opened_at(&self) -> Option<u64> {
        self.opened_at
    }

    pub fn next_attempt_at(&self) -> Option<u64> {
        self.next_attempt_at
    }

    /// Ask whether a probe may run at `now`.
    ///
    /// An open breaker whose cooldown has elapsed moves to half-open here,
    /// before the probe is dispatched.
    pub fn try_acquire(&mut self, now: u64) -> Permit {
        match self.state {
            BreakerState::Closed => Permit::Allowed,
            BreakerState::HalfOpen => Permit::Trial,
            BreakerState::Open => {
                let retry_at = self.next_attempt_at.unwrap_or(now);
                if now < retry_at {
                    Permit::Denied { retry_at }
                } else {
                    self.enter_half_open();
                    Permit::Trial
                }
            }
        }
    }

    /// Move an open breaker to half-open without waiting for the cooldown.
    ///
    /// Used by operator-initiated checks.
    pub fn force_trial(&mut self) -> Permit {
        if self.state == BreakerState::Open {
            self.enter_half_open();
        }
        match self.state {
            BreakerState::Closed => Permit::Allowed,
            _ => Permit::Trial,
        }
    }

    /// Record a successful probe.
    pub fn record_success(&mut self, now: u64) -> Option<Transition> {
        self.last_success = Some(now);
        match self.state {
            BreakerState::Closed => {
                self.failures = 0;
                None
            }
            BreakerState::HalfOpen => {
                self.successes += 1;
                if self.successes >= self.policy.recovery_threshold {
                    self.state = BreakerState::Closed;
                    self.failures = 0;
                    self.successes = 0;
                    self.opened_at = None;
                    self.next_attempt_at = None;
                    Some(Transition::Closed)
                } else {
                    None
                }
            }
            BreakerState::Open => None,
        }
    }

    /// Record a failed probe.
    pub fn record_failure(&mut self, now: u64) -> Option<Transition> {
        self.last_failure = Some(now);
        match self.state {
            BreakerState::Closed => {
                self.failures += 1;
                if self.failures >= self.policy.failure_threshold {
                    Some(self.trip(now))
                } else {
                    None
                }
            }
            BreakerState::HalfOpen => Some(self.trip(now)),
            BreakerState::Open => None,
        }
    }

    fn trip(&mut self, now: u64) -> Transition {
        let next_attempt_at = now.saturating_add(self.policy.open_timeout_ms);
        self.state = BreakerState::Open;
        self.failures = 0;
        self.successes = 0;
        self.opened_at = Some(now);
        self.next_attempt_at = Some(next_attempt_at);
        Transition::Opened { next_attempt_at }
    }

    fn enter_half_open(&mut self) {
        self.state = BreakerState::HalfOpen;
        self.failures = 0;
        self.successes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerPolicy {
            failure_threshold: 3,
            recovery_threshold: 2,
            open_timeout_ms: 1_000,
        })
    }

    #[test]
    fn opens_at_failure_threshold() {
        let mut cb = breaker();
        assert_eq!(cb.record_failure(10), None);
        assert_eq!(cb.record_failure(20), None);
        assert_eq!(
            cb.record_failure(30),
            Some(Transition::Opened { next_attempt_at: 1_030 })
        );
        assert_eq!(cb.state(), BreakerState::Open);
        assert_eq!(cb.opened_at(), Some(30));
        assert_eq!(cb.next_attempt_at(), Some(cb.opened_at().unwrap() + 1_000));
    }

    #[test]
    fn success_while_closed_resets_failures() {
        let mut cb = breaker();
        cb.record_failure(1);
        cb.record_failure(2);
        assert_eq!(cb.record_success(3), None);
        assert_eq!(cb.failures(), 0);

        cb.record_failure(4);
        cb.record_failure(5);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn denies_until_cooldown_then_half_opens() {
        let mut cb = breaker();
        for t in 0..3 {
            cb.record_failure(t);
        }
        assert_eq!(cb.try_acquire(500), Permit::Denied { retry_at: 1_002 });
        assert_eq!(cb.state(), BreakerState::Open);

        assert_eq!(cb.try_acquire(1_002), Permit::Trial);
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn closes_after_recovery_threshold() {
        let mut cb = breaker();
        for t in 0..3 {
            cb.record_failure(t);
        }
        cb.try_acquire(2_000);

        assert_eq!(cb.record_success(2_001), None);
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        cb.try_acquire(2_100);
        assert_eq!(cb.record_success(2_101), Some(Transition::Closed));
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.failures(), 0);
        assert_eq!(cb.successes(), 0);
        assert_eq!(cb.next_attempt_at(), None);
    }

    #[test]
    fn half_open_failure_reopens_with_fresh_timer() {
        let mut cb = breaker();
        for t in 0..3 {
            cb.record_failure(t);
        }
        cb.try_acquire(5_000);
        cb.record_success(5_001);

        assert_eq!(
            cb.record_failure(5_500),
            Some(Transition::Opened { next_attempt_at: 6_500 })
        );
        assert_eq!(cb.state(), BreakerState::Open);
        assert_eq!(cb.opened_at(), Some(5_500));
    }

    #[test]
    fn force_trial_skips_cooldown() {
        let mut cb = breaker();
        for t in 0..3 {
            cb.record_failure(t);
        }
        assert_eq!(cb.force_trial(), Permit::Trial);
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        let mut closed = breaker();
        assert_eq!(closed.force_trial(), Permit::Allowed);
    }
}
