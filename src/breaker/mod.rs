// Circuit breaker around the model execution path
// Closed -> Open after `fail_max` consecutive server-side failures;
// Open -> HalfOpen once `reset_timeout` elapses, admitting a single trial call

use crate::error::EngineError;
use crate::models::health::{BreakerState, BreakerStatus};
use crate::models::settings::EngineSettings;
use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::Mutex;
use std::future::Future;
use std::time::{Duration, Instant};

struct BreakerInner {
    state: BreakerState,
    failures: u32,
    last_failure: Option<DateTime<Utc>>,
    opened_at: Option<(Instant, DateTime<Utc>)>,
    trial_in_flight: bool,
}

pub struct CircuitBreaker {
    fail_max: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(fail_max: u32, reset_timeout: Duration) -> Self {
        Self {
            fail_max: fail_max.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: 0,
                last_failure: None,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(settings.fail_max, settings.reset_timeout())
    }

    /// Run `f` under the breaker. Only server-side errors count as failures;
    /// an open breaker rejects without calling `f`.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        self.admit()?;
        let mut trial = TrialGuard {
            breaker: self,
            armed: true,
        };
        let result = f().await;
        trial.armed = false;

        match &result {
            Err(e) if e.is_server_error() => self.record_failure(),
            _ => self.record_success(),
        }
        result
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn status(&self) -> BreakerStatus {
        let inner = self.inner.lock();
        let next_reset = match (inner.state, inner.opened_at) {
            (BreakerState::Open, Some((_, opened_wall))) => {
                Some(unix_seconds(opened_wall) + self.reset_timeout.as_secs_f64())
            }
            _ => None,
        };

        BreakerStatus {
            state: inner.state,
            failures: inner.failures,
            last_failure: inner.last_failure.map(unix_seconds),
            reset_timeout: self.reset_timeout.as_secs(),
            next_reset,
        }
    }

    fn admit(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|(at, _)| at.elapsed())
                    .unwrap_or(self.reset_timeout);
                if elapsed >= self.reset_timeout {
                    info!("Circuit breaker half-open, admitting trial call");
                    inner.state = BreakerState::HalfOpen;
                    inner.trial_in_flight = true;
                    Ok(())
                } else {
                    Err(EngineError::CircuitOpen {
                        retry_after: self.reset_timeout - elapsed,
                    })
                }
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(EngineError::CircuitOpen {
                        retry_after: Duration::ZERO,
                    })
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.failures = 0;
        if inner.state == BreakerState::HalfOpen {
            info!("Circuit breaker closed after successful trial");
            inner.state = BreakerState::Closed;
            inner.opened_at = None;
        }
        inner.trial_in_flight = false;
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        let now = Utc::now();
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure = Some(now);
        inner.trial_in_flight = false;

        let trip = match inner.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => inner.failures >= self.fail_max,
            BreakerState::Open => false,
        };

        if trip {
            warn!(
                "Circuit breaker opened after {} failures; retry in {}s",
                inner.failures,
                self.reset_timeout.as_secs()
            );
            inner.state = BreakerState::Open;
            inner.opened_at = Some((Instant::now(), now));
        }
    }
}

/// Frees the half-open trial slot when a call is dropped before it finishes
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.inner.lock().trial_in_flight = false;
        }
    }
}

fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}
