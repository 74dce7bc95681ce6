//! Circuit breaker pattern implementation

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests are blocked
    Open,
    /// Circuit is half-open, probing whether the backend recovered
    HalfOpen,
}

impl CircuitState {
    /// Gauge value reported to metrics: 0 closed, 1 open, 2 half-open
    pub fn as_metric(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// How a finished call counts toward the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
    /// Leaves the breaker as it was, e.g. a call cut short by shutdown
    Ignored,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub max_failures: u32,

    /// Consecutive successes in half-open state before closing
    pub success_threshold: u32,

    /// Time to wait before letting a probe call through
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Circuit breaker metrics
#[derive(Debug, Clone, Default)]
pub struct CircuitMetrics {
    /// Total number of executed requests
    pub total_requests: u64,
    /// Number of successful requests
    pub total_successes: u64,
    /// Number of failed requests
    pub total_failures: u64,
    /// Number of requests rejected due to open circuit
    pub total_rejected: u64,
    /// Current consecutive failures
    pub consecutive_failures: u32,
    /// Current consecutive successes (in half-open state)
    pub consecutive_successes: u32,
    /// Last failure time
    pub last_failure_time: Option<Instant>,
    /// Last state change time
    pub last_state_change: Option<Instant>,
}

/// Thread-safe circuit breaker implementation
#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

struct CircuitBreakerState {
    state: CircuitState,
    metrics: CircuitMetrics,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: Arc::from(name.into()),
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CircuitBreakerState {
                state: CircuitState::Closed,
                metrics: CircuitMetrics::default(),
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` if the gate allows it and feed its outcome into the state
    /// machine. An open circuit fails fast without calling `f`.
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with(f, |result| match result {
            Ok(_) => CallOutcome::Success,
            Err(_) => CallOutcome::Failure,
        })
        .await
    }

    /// Like [`execute`](Self::execute), with `judge` deciding how the
    /// result counts
    pub async fn execute_with<F, Fut, T, E, J>(&self, f: F, judge: J) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        J: FnOnce(&Result<T, E>) -> CallOutcome,
    {
        if !self.allow_request() {
            self.record_rejection();
            return Err(CircuitBreakerError::Open {
                name: self.name.to_string(),
            });
        }

        let result = f().await;
        match judge(&result) {
            CallOutcome::Success => self.record_success(),
            CallOutcome::Failure => self.record_failure(),
            CallOutcome::Ignored => {}
        }
        result.map_err(CircuitBreakerError::Inner)
    }

    /// Whether a call may proceed right now
    pub fn allow_request(&self) -> bool {
        let state = self.state.lock();
        match state.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => state
                .metrics
                .last_failure_time
                .map_or(true, |last| last.elapsed() >= self.config.reset_timeout),
        }
    }

    /// Get the current state
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        let mut state = self.state.lock();

        state.metrics.total_requests += 1;
        state.metrics.total_successes += 1;

        match state.state {
            CircuitState::Closed => {
                state.metrics.consecutive_failures = 0;
            }
            CircuitState::Open => {
                // The probe after the reset timeout counts as the first success
                self.transition(&mut state, CircuitState::HalfOpen);
                state.metrics.consecutive_successes = 1;
                if state.metrics.consecutive_successes >= self.config.success_threshold {
                    self.transition(&mut state, CircuitState::Closed);
                }
            }
            CircuitState::HalfOpen => {
                state.metrics.consecutive_successes += 1;
                if state.metrics.consecutive_successes >= self.config.success_threshold {
                    self.transition(&mut state, CircuitState::Closed);
                }
            }
        }
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let mut state = self.state.lock();

        state.metrics.total_requests += 1;
        state.metrics.total_failures += 1;
        state.metrics.last_failure_time = Some(Instant::now());

        match state.state {
            CircuitState::Closed => {
                state.metrics.consecutive_failures += 1;
                if state.metrics.consecutive_failures >= self.config.max_failures {
                    self.transition(&mut state, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.transition(&mut state, CircuitState::Open);
            }
            CircuitState::Open => {
                state.metrics.consecutive_failures += 1;
            }
        }
    }

    /// Record a call rejected by the open circuit
    pub fn record_rejection(&self) {
        self.state.lock().metrics.total_rejected += 1;
    }

    /// Get current metrics
    pub fn metrics(&self) -> CircuitMetrics {
        self.state.lock().metrics.clone()
    }

    fn transition(&self, state: &mut CircuitBreakerState, next: CircuitState) {
        let previous = state.state;
        state.state = next;
        state.metrics.consecutive_failures = 0;
        state.metrics.consecutive_successes = 0;
        state.metrics.last_state_change = Some(Instant::now());

        match next {
            CircuitState::Open => warn!(breaker = %self.name, from = %previous, "Circuit breaker opened"),
            CircuitState::HalfOpen => info!(breaker = %self.name, from = %previous, "Circuit breaker half-open"),
            CircuitState::Closed => info!(breaker = %self.name, from = %previous, "Circuit breaker closed"),
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`]
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker '{name}' is OPEN")]
    Open { name: String },

    #[error("{0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open { .. })
    }
}

/// Builder for circuit breaker configuration
pub struct CircuitBreakerBuilder {
    name: String,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerBuilder {
    /// Create a new builder with default config
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: CircuitBreakerConfig::default(),
        }
    }

    /// Set consecutive failures before opening
    pub fn max_failures(mut self, threshold: u32) -> Self {
        self.config.max_failures = threshold;
        self
    }

    /// Set success threshold for recovery
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// Set timeout before a probe call is allowed
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    /// Build the circuit breaker
    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::new(self.name, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    fn open_breaker(name: &str, reset_timeout: Duration) -> CircuitBreaker {
        let breaker = CircuitBreakerBuilder::new(name)
            .max_failures(1)
            .success_threshold(2)
            .reset_timeout(reset_timeout)
            .build();
        breaker.record_failure();
        breaker
    }

    #[test]
    fn test_opens_after_max_failures() {
        let breaker = CircuitBreakerBuilder::new("nextcloud/nc1")
            .max_failures(3)
            .reset_timeout(Duration::from_secs(60))
            .build();

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[tokio::test]
    async fn test_open_circuit_does_not_call_function() {
        let breaker = open_breaker("dropbox/db1", Duration::from_secs(60));

        let calls = AtomicU32::new(0);
        let result: Result<(), CircuitBreakerError<&str>> = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .await;

        let error = result.unwrap_err();
        assert!(error.is_open());
        assert_eq!(error.to_string(), "circuit breaker 'dropbox/db1' is OPEN");
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert_eq!(breaker.metrics().total_rejected, 1);
        assert_eq!(breaker.metrics().total_requests, 1);
    }

    #[tokio::test]
    async fn test_execute_feeds_outcome_into_state() {
        let breaker = CircuitBreakerBuilder::new("nextcloud/nc3")
            .max_failures(2)
            .reset_timeout(Duration::from_secs(60))
            .build();

        let failed: Result<(), _> = breaker.execute(|| async { Err("boom") }).await;
        assert!(matches!(failed, Err(CircuitBreakerError::Inner("boom"))));
        breaker.execute(|| async { Ok::<_, &str>(()) }).await.unwrap();
        assert_eq!(breaker.metrics().consecutive_failures, 0);

        breaker.execute(|| async { Err::<(), _>("boom") }).await.unwrap_err();
        breaker.execute(|| async { Err::<(), _>("boom") }).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_ignored_outcome_leaves_open_circuit_alone() {
        let breaker = open_breaker("hidrive/hd2", Duration::ZERO);

        let result: Result<(), CircuitBreakerError<&str>> = breaker
            .execute_with(|| async { Err("interrupted") }, |_| CallOutcome::Ignored)
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Inner("interrupted"))));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.metrics().total_requests, 1);
    }

    #[test]
    fn test_probe_success_moves_to_half_open_then_closed() {
        let breaker = CircuitBreakerBuilder::new("hidrive/hd1")
            .max_failures(2)
            .success_threshold(2)
            .reset_timeout(Duration::from_millis(50))
            .build();

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        thread::sleep(Duration::from_millis(80));
        // The state only changes once an outcome is recorded
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.allow_request());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().consecutive_failures, 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreakerBuilder::new("magentacloud/mc1")
            .max_failures(1)
            .success_threshold(3)
            .reset_timeout(Duration::from_millis(30))
            .build();

        breaker.record_failure();
        thread::sleep(Duration::from_millis(50));
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_failed_probe_keeps_circuit_open() {
        let breaker = open_breaker("nextcloud/nc2", Duration::from_millis(30));

        thread::sleep(Duration::from_millis(50));
        assert!(breaker.allow_request());
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_success_in_closed_resets_failure_count() {
        let breaker = CircuitBreakerBuilder::new("nc").max_failures(3).build();
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().total_requests, 5);
    }

    #[test]
    fn test_state_metric_values() {
        assert_eq!(CircuitState::Closed.as_metric(), 0);
        assert_eq!(CircuitState::Open.as_metric(), 1);
        assert_eq!(CircuitState::HalfOpen.as_metric(), 2);
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
    }
}
