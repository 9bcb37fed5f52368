//! Circuit breaker guarding the external LLM call
//!
//! Three-state machine (Closed, Open, HalfOpen) over a bounded sliding
//! window of recent call outcomes. Every guarded call is wrapped in an
//! explicit timeout; a timeout counts as a failure and is surfaced
//! distinctly so callers can tell `timeout` from `error` from rejection.
//!
//! The breaker is an explicitly constructed, injected service. Multiple
//! independent instances (one per external provider) do not interact.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::BreakerConfig;
use crate::error::{Error, Result};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected immediately
    Open,
    /// A probe call is allowed
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Read-only breaker status for operational visibility
#[derive(Debug, Clone)]
pub struct BreakerStatus {
    pub state: CircuitState,
    /// Windowed failure ratio in [0, 1]
    pub failure_rate: f64,
    /// Outcomes currently in the window
    pub window_calls: usize,
    pub consecutive_successes: u32,
    /// Total calls rejected while open
    pub rejected_calls: u64,
}

/// Mutable state; transitions are the sole mutators and happen under the lock
struct BreakerInner {
    state: CircuitState,
    /// true = success, false = failure; bounded to `window_size`
    window: VecDeque<bool>,
    last_failure: Option<Instant>,
    consecutive_successes: u32,
    rejected_calls: u64,
}

impl BreakerInner {
    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|ok| !**ok).count();
        failures as f64 / self.window.len() as f64
    }
}

/// Circuit breaker with sliding-window failure tracking
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                last_failure: None,
                consecutive_successes: 0,
                rejected_calls: 0,
            }),
        }
    }

    /// Run a guarded call with the configured timeout
    ///
    /// Returns `Error::CircuitOpen` without invoking the future when the
    /// circuit rejects the call, `Error::LlmTimeout` when the deadline
    /// passes (the future is dropped, cancelling the outstanding call),
    /// or the call's own error. Timeouts and errors both count as
    /// failures in the window.
    pub async fn call<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.acquire()?;

        match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record_failure();
                Err(e)
            }
            Err(_) => {
                self.record_failure();
                Err(Error::LlmTimeout(self.config.call_timeout))
            }
        }
    }

    /// Admission check; Open transitions to HalfOpen once the recovery
    /// timeout has elapsed since the last failure
    fn acquire(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let recovered = inner
                    .last_failure
                    .map(|t| t.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);
                if recovered {
                    info!("circuit breaker half-open, allowing probe call");
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    Ok(())
                } else {
                    inner.rejected_calls += 1;
                    Err(Error::CircuitOpen)
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        push_outcome(&mut inner.window, true, self.config.window_size);

        match inner.state {
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.half_open_successes {
                    info!("circuit breaker closed after successful probes");
                    inner.state = CircuitState::Closed;
                    inner.window.clear();
                    inner.consecutive_successes = 0;
                }
            }
            CircuitState::Closed => self.maybe_trip(&mut inner),
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        push_outcome(&mut inner.window, false, self.config.window_size);
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => {
                warn!("probe call failed, circuit breaker re-opened");
                inner.state = CircuitState::Open;
                inner.consecutive_successes = 0;
            }
            CircuitState::Closed => self.maybe_trip(&mut inner),
            CircuitState::Open => {}
        }
    }

    /// Trip once the minimum call count is observed and the windowed
    /// failure ratio reaches the threshold
    fn maybe_trip(&self, inner: &mut BreakerInner) {
        if inner.window.len() >= self.config.min_calls
            && inner.failure_rate() >= self.config.failure_threshold
        {
            warn!(
                failure_rate = inner.failure_rate(),
                "circuit breaker opened"
            );
            inner.state = CircuitState::Open;
            inner.consecutive_successes = 0;
        }
    }

    /// Read-only status snapshot
    pub fn status(&self) -> BreakerStatus {
        let inner = self.inner.lock().expect("breaker lock poisoned");
        BreakerStatus {
            state: inner.state,
            failure_rate: inner.failure_rate(),
            window_calls: inner.window.len(),
            consecutive_successes: inner.consecutive_successes,
            rejected_calls: inner.rejected_calls,
        }
    }

    /// Manual reset to Closed, clearing the window
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.state = CircuitState::Closed;
        inner.window.clear();
        inner.consecutive_successes = 0;
        inner.last_failure = None;
        info!("circuit breaker manually reset");
    }

    /// Manual open, rejecting all calls until reset or recovery
    pub fn force_open(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.state = CircuitState::Open;
        inner.last_failure = Some(Instant::now());
        warn!("circuit breaker manually opened");
    }
}

fn push_outcome(window: &mut VecDeque<bool>, ok: bool, cap: usize) {
    if window.len() == cap {
        window.pop_front();
    }
    window.push_back(ok);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> BreakerConfig {
        BreakerConfig {
            window_size: 10,
            min_calls: 5,
            failure_threshold: 0.5,
            recovery_timeout: Duration::from_millis(50),
            half_open_successes: 3,
            call_timeout: Duration::from_millis(100),
        }
    }

    async fn ok_call(breaker: &CircuitBreaker) -> Result<u32> {
        breaker.call(async { Ok(1u32) }).await
    }

    async fn err_call(breaker: &CircuitBreaker) -> Result<u32> {
        breaker
            .call(async { Err(Error::InvalidData("boom".into())) })
            .await
    }

    #[tokio::test]
    async fn test_opens_after_failure_threshold() {
        let breaker = CircuitBreaker::new(test_config());

        // 3 failures then 2 successes: 5 calls observed, 60% failure rate
        for _ in 0..3 {
            let _ = err_call(&breaker).await;
        }
        assert_eq!(breaker.status().state, CircuitState::Closed);
        let _ = ok_call(&breaker).await;
        assert_eq!(breaker.status().state, CircuitState::Closed);
        let _ = ok_call(&breaker).await;
        assert_eq!(breaker.status().state, CircuitState::Open);

        // Rejected while open
        let result = ok_call(&breaker).await;
        assert!(matches!(result, Err(Error::CircuitOpen)));
        assert_eq!(breaker.status().rejected_calls, 1);
    }

    #[tokio::test]
    async fn test_below_min_calls_never_trips() {
        let breaker = CircuitBreaker::new(test_config());
        for _ in 0..4 {
            let _ = err_call(&breaker).await;
        }
        assert_eq!(breaker.status().state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_after_recovery_then_closes() {
        let breaker = CircuitBreaker::new(test_config());
        for _ in 0..5 {
            let _ = err_call(&breaker).await;
        }
        assert_eq!(breaker.status().state, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;

        // Probe allowed; 3 consecutive successes close the circuit
        assert!(ok_call(&breaker).await.is_ok());
        assert_eq!(breaker.status().state, CircuitState::HalfOpen);
        assert!(ok_call(&breaker).await.is_ok());
        assert!(ok_call(&breaker).await.is_ok());
        assert_eq!(breaker.status().state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(test_config());
        for _ in 0..5 {
            let _ = err_call(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(ok_call(&breaker).await.is_ok());
        assert_eq!(breaker.status().state, CircuitState::HalfOpen);
        let _ = err_call(&breaker).await;
        assert_eq!(breaker.status().state, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let breaker = CircuitBreaker::new(test_config());
        let result: Result<u32> = breaker
            .call(async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(1u32)
            })
            .await;
        assert!(matches!(result, Err(Error::LlmTimeout(_))));
        assert!(breaker.status().failure_rate > 0.0);
    }

    #[tokio::test]
    async fn test_manual_controls() {
        let breaker = CircuitBreaker::new(test_config());
        breaker.force_open();
        assert_eq!(breaker.status().state, CircuitState::Open);
        assert!(matches!(ok_call(&breaker).await, Err(Error::CircuitOpen)));

        breaker.reset();
        assert_eq!(breaker.status().state, CircuitState::Closed);
        assert!(ok_call(&breaker).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_outcomes_do_not_corrupt_window() {
        let breaker = std::sync::Arc::new(CircuitBreaker::new(test_config()));
        let mut handles = Vec::new();
        for i in 0..20 {
            let b = breaker.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    let _ = ok_call(&b).await;
                } else {
                    let _ = err_call(&b).await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let status = breaker.status();
        assert!(status.window_calls <= 10);
    }
}
