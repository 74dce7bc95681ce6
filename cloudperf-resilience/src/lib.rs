//! Resilience patterns for cloudperf
//!
//! This crate provides retry policies, per-backend circuit breakers, and
//! graceful shutdown coordination built around a root cancellation token.

pub mod circuit_breaker;
pub mod retry;
pub mod shutdown;

// Re-export commonly used types
pub use circuit_breaker::{
    CallOutcome, CircuitBreaker, CircuitBreakerBuilder, CircuitBreakerConfig, CircuitBreakerError, CircuitMetrics,
    CircuitState,
};
pub use retry::{Backoff, RetryError, RetryExecutor, RetryOn, RetryPolicy, DEFAULT_RETRYABLE_ERRORS};
pub use shutdown::{ShutdownCoordinator, ShutdownError, ShutdownHook, ShutdownSignal, DEFAULT_SHUTDOWN_TIMEOUT};

pub use tokio_util::sync::CancellationToken;
