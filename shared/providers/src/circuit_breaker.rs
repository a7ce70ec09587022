//! Per-provider circuit breaker: CLOSED admits calls,
//! OPEN rejects them until the reset timeout elapses, HALF_OPEN allows a
//! single probe call to decide whether to close again, built against
//! `tokio::sync::Mutex` since every provider call here is async I/O.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 3, reset_timeout: Duration::from_millis(60_000) }
    }
}

struct Inner {
    state: CircuitState,
    opened_at: Option<Instant>,
}

/// A single provider's breaker. `consecutive_failures` is a plain atomic
/// since it only ever needs a relaxed counter; transitions between
/// Closed/Open/HalfOpen take the mutex since they must be observed
/// atomically with the failure count reset.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    consecutive_failures: AtomicU32,
    inner: Mutex<Inner>,
}

#[derive(thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker open")]
    Open,
    #[error(transparent)]
    Inner(#[from] E),
}

impl<E: std::fmt::Debug> std::fmt::Debug for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Inner(e) => write!(f, "Inner({e:?})"),
        }
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            consecutive_failures: AtomicU32::new(0),
            inner: Mutex::new(Inner { state: CircuitState::Closed, opened_at: None }),
        }
    }

    pub async fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().await;
        self.maybe_half_open(&mut inner);
        inner.state
    }

    fn maybe_half_open(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                }
            }
        }
    }

    /// Runs `f` if the circuit admits calls, recording the outcome.
    /// Returns `CircuitBreakerError::Open` without calling `f` at all
    /// when the circuit is open and the reset timeout hasn't elapsed.
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut inner = self.inner.lock().await;
            self.maybe_half_open(&mut inner);
            if inner.state == CircuitState::Open {
                return Err(CircuitBreakerError::Open);
            }
        }

        match f().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(err) => {
                self.record_failure().await;
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    async fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let mut inner = self.inner.lock().await;
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
    }

    async fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let mut inner = self.inner.lock().await;
        if inner.state == CircuitState::HalfOpen || failures >= self.config.failure_threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { failure_threshold: 2, reset_timeout: Duration::from_secs(60) });
        let _ = cb.call(|| async { Err::<(), &'static str>("boom") }).await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        let _ = cb.call(|| async { Err::<(), &'static str>("boom") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        let result = cb.call(|| async { Ok::<_, &'static str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn half_open_probe_closes_circuit_on_success() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { failure_threshold: 1, reset_timeout: Duration::from_millis(10) });
        let _ = cb.call(|| async { Err::<(), &'static str>("boom") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        let result = cb.call(|| async { Ok::<_, &'static str>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_probe_failure_reopens_circuit() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { failure_threshold: 1, reset_timeout: Duration::from_millis(10) });
        let _ = cb.call(|| async { Err::<(), &'static str>("boom") }).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        let _ = cb.call(|| async { Err::<(), &'static str>("boom again") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }
}
