//! Consecutive-failure circuit breaker.
//!
//! - **Closed**: calls pass through; consecutive transient failures are counted
//! - **Open**: calls are rejected immediately until the cool-down elapses
//! - **Half-open**: a single trial call is let through; its outcome closes or
//!   re-opens the circuit
//!
//! Admission hands out a [`Permit`]. A trial permit dropped without an
//! outcome (the call was cancelled) frees the trial slot for the next caller.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Circuit breaker shared by every call site of one realm.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Get the current state, moving Open to HalfOpen once the cool-down passed.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Ask permission to issue a call.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => return None,
            CircuitState::HalfOpen if inner.trial_in_flight => return None,
            CircuitState::HalfOpen => {
                inner.trial_in_flight = true;
                true
            }
        };
        Some(Permit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    /// Record a call that reached the database and returned.
    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    /// Record a transient failure. Returns true if this failure opened the circuit.
    fn record_failure(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_in_flight = false;
                true
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
            // A call admitted before the circuit opened failed late
            CircuitState::Open => false,
        }
    }

    fn abandon_trial(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    fn refresh(&self, inner: &mut BreakerState) {
        if inner.state == CircuitState::Open {
            let cooled = inner
                .opened_at
                .map_or(true, |at| at.elapsed() >= self.cooldown);
            if cooled {
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = false;
            }
        }
    }
}

/// Admission to issue one call. Settle it with the call's outcome.
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Permit<'_> {
    /// The call reached the database and returned.
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    /// The call failed transiently. Returns true if this opened the circuit.
    pub fn failure(mut self) -> bool {
        self.settled = true;
        self.breaker.record_failure()
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.abandon_trial();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail(breaker: &CircuitBreaker) -> bool {
        breaker.try_acquire().map_or(false, Permit::failure)
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(3));

        assert!(!fail(&breaker));
        assert!(!fail(&breaker));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(fail(&breaker));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_count() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(3));

        fail(&breaker);
        breaker.try_acquire().unwrap().success();
        assert!(!fail(&breaker));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(3));
        fail(&breaker);
        assert!(breaker.try_acquire().is_none());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let trial = breaker.try_acquire().unwrap();
        assert!(breaker.try_acquire().is_none());

        trial.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(3));
        fail(&breaker);
        tokio::time::advance(Duration::from_secs(4)).await;

        assert!(fail(&breaker));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_frees_the_slot() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(3));
        fail(&breaker);
        tokio::time::advance(Duration::from_secs(4)).await;

        drop(breaker.try_acquire().unwrap());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.try_acquire().unwrap().success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_closed_permit_is_neutral() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(3));
        drop(breaker.try_acquire().unwrap());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_some());
    }
}
