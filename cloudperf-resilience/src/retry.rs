//! Retry policy and executor

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Error fragments treated as transient by the default policy
pub const DEFAULT_RETRYABLE_ERRORS: &[&str] = &[
    "connection refused",
    "timeout",
    "temporary failure",
    "network is unreachable",
    "no such host",
];

/// How the wait grows between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `initial_delay * attempt`
    Linear,
    /// `initial_delay * base^(attempt - 1)`
    Exponential { base: f64 },
}

/// Which failures are worth another attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOn {
    /// Every failure is retried
    AnyError,
    /// Only failures whose message contains one of the patterns
    Matching { patterns: Vec<String> },
}

impl Default for RetryOn {
    fn default() -> Self {
        RetryOn::Matching {
            patterns: DEFAULT_RETRYABLE_ERRORS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Upper bound for any single wait
    pub max_delay: Duration,
    pub backoff: Backoff,
    pub retry_on: RetryOn,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff: Backoff::Exponential { base: 2.0 },
            retry_on: RetryOn::default(),
        }
    }
}

impl RetryPolicy {
    /// Policy for OAuth token endpoints: a smaller budget, and gateway
    /// errors count as transient
    pub fn oauth() -> Self {
        let mut patterns: Vec<String> = DEFAULT_RETRYABLE_ERRORS.iter().map(|p| p.to_string()).collect();
        patterns.extend(["502", "503", "504"].iter().map(|p| p.to_string()));

        Self {
            max_retries: 2,
            retry_on: RetryOn::Matching { patterns },
            ..Self::default()
        }
    }

    /// Linear policy retrying every failure, waiting `step * attempt`
    pub fn linear(max_retries: u32, step: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: step,
            max_delay: step.saturating_mul(max_retries.max(1)),
            backoff: Backoff::Linear,
            retry_on: RetryOn::AnyError,
        }
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait after failed attempt `attempt` (1-based), capped at `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let delay = match self.backoff {
            Backoff::Linear => self.initial_delay.saturating_mul(attempt),
            Backoff::Exponential { base } => {
                let factor = base.powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32);
                // float to int casts saturate
                Duration::from_nanos((self.initial_delay.as_nanos() as f64 * factor) as u64)
            }
        };
        delay.min(self.max_delay)
    }

    /// Whether a failure message is worth another attempt
    pub fn is_retryable(&self, message: &str) -> bool {
        match &self.retry_on {
            RetryOn::AnyError => true,
            RetryOn::Matching { patterns } => {
                let message = message.to_lowercase();
                patterns
                    .iter()
                    .any(|pattern| message.contains(&pattern.to_lowercase()))
            }
        }
    }
}

/// Retry executor
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create a new retry executor with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a function with retry logic
    pub async fn execute<F, Fut, T, E>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut f: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_with_context(operation, cancel, |_attempt| f())
            .await
    }

    /// Execute a function with retry logic and the 1-based attempt number
    pub async fn execute_with_context<F, Fut, T, E>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut f: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    operation: operation.to_string(),
                });
            }

            debug!(operation, attempt, max_attempts, "Executing attempt");

            match f(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(operation, attempt, "Operation succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(error) => {
                    let message = error.to_string();

                    if !self.policy.is_retryable(&message) {
                        warn!(operation, attempt, error = %message, "Operation failed with non-retryable error");
                        return Err(RetryError::NonRetryable(error));
                    }

                    if attempt >= max_attempts {
                        warn!(operation, attempts = attempt, error = %message, "Operation failed after all retries");
                        return Err(RetryError::Exhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Attempt failed, retrying"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!(operation, attempt, "Retry cancelled during backoff");
                            return Err(RetryError::Cancelled {
                                operation: operation.to_string(),
                            });
                        }
                        _ = sleep(delay) => {}
                    }

                    attempt += 1;
                }
            }
        }
    }
}

/// Retry error types
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed with a retryable error
    #[error("operation {operation} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last_error: E,
    },

    /// Non-retryable error encountered
    #[error("{0}")]
    NonRetryable(E),

    /// Cancellation observed before an attempt or during backoff
    #[error("operation {operation} cancelled during retry")]
    Cancelled { operation: String },
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }
}
