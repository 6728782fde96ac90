//! Retry-with-backoff wrapped around a circuit breaker, one policy per realm.
//!
//! Every database operation runs through [`ResiliencePolicy::execute`]. The
//! retry loop is the outer layer and the breaker the inner one, so a call
//! rejected by an open breaker is itself retried after the next backoff.
//! Source and destination keep separate breaker state.

mod breaker;
mod retry;

pub use breaker::{CircuitBreaker, CircuitState, Permit};
pub use retry::LinearBackoff;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{ResilienceConfig, RetrySettings};
use crate::error::{MigrateError, Result};

/// Named resilience scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Realm {
    Source,
    Destination,
}

impl fmt::Display for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Realm::Source => f.write_str("source"),
            Realm::Destination => f.write_str("destination"),
        }
    }
}

/// Retry + circuit breaker policy for one realm.
#[derive(Debug)]
pub struct ResiliencePolicy {
    realm: Realm,
    backoff: LinearBackoff,
    breaker: CircuitBreaker,
}

impl ResiliencePolicy {
    pub fn new(realm: Realm, backoff: LinearBackoff, breaker: CircuitBreaker) -> Self {
        Self {
            realm,
            backoff,
            breaker,
        }
    }

    pub fn from_settings(realm: Realm, settings: &RetrySettings) -> Self {
        Self::new(
            realm,
            LinearBackoff::new(
                Duration::from_millis(settings.initial_delay_ms),
                settings.retry_attempts,
            ),
            CircuitBreaker::new(
                settings.breaker_failures,
                Duration::from_millis(settings.breaker_cooldown_ms),
            ),
        )
    }

    pub fn realm(&self) -> Realm {
        self.realm
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Run `operation` until it succeeds, fails with a non-transient error,
    /// or the retry budget is spent.
    ///
    /// The closure is invoked once per attempt so that every attempt starts
    /// from a fresh connection. When retries run out the last error coming
    /// from the database is returned, even if later attempts were only
    /// rejected by the breaker.
    pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        let mut last_failure: Option<MigrateError> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }

            let failure = if let Some(permit) = self.breaker.try_acquire() {
                // A cancelled call drops the permit unsettled.
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(MigrateError::Cancelled),
                    outcome = operation() => outcome,
                };

                match outcome {
                    Ok(value) => {
                        permit.success();
                        return Ok(value);
                    }
                    Err(e) if !e.is_transient() => {
                        // The database answered; only the request was bad.
                        permit.success();
                        return Err(e);
                    }
                    Err(e) => {
                        if permit.failure() {
                            warn!(
                                event = "circuit_opened",
                                realm = %self.realm,
                                error = %e,
                                "{} circuit breaker opened",
                                self.realm
                            );
                        }
                        e
                    }
                }
            } else {
                match last_failure.take() {
                    Some(previous) => previous,
                    None => MigrateError::CircuitOpen { realm: self.realm },
                }
            };

            attempt += 1;
            let Some(delay) = self.backoff.delay(attempt) else {
                return Err(failure);
            };

            warn!(
                event = "retry",
                realm = %self.realm,
                delay_ms = delay.as_millis() as u64,
                attempt,
                error = %failure,
                "Retrying {} operation in {:?} (attempt {}/{})",
                self.realm,
                delay,
                attempt,
                self.backoff.max_retries()
            );
            last_failure = Some(failure);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MigrateError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// The pair of policies used by a job.
#[derive(Debug, Clone)]
pub struct Policies {
    pub source: Arc<ResiliencePolicy>,
    pub destination: Arc<ResiliencePolicy>,
}

impl Policies {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            source: Arc::new(ResiliencePolicy::from_settings(
                Realm::Source,
                &config.source,
            )),
            destination: Arc::new(ResiliencePolicy::from_settings(
                Realm::Destination,
                &config.destination,
            )),
        }
    }
}
