//! Metrics sink capability
//!
//! The agent never touches a metrics backend directly. Every component gets
//! an `Arc<dyn MetricsSink>` at construction time.

use cloudperf_core::{TestResult, MIB};
use cloudperf_resilience::CircuitState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

/// Receiver of measurements
pub trait MetricsSink: Send + Sync {
    /// Duration, success and throughput of one test step
    fn record_test(&self, result: &TestResult);

    /// Number and size of the chunks of a completed upload
    fn record_chunks(&self, service: &str, instance: &str, chunks: u32, chunk_size: u64);

    fn record_circuit_state(&self, service: &str, instance: &str, state: CircuitState);

    /// Round trip of a TCP connect to the instance host
    fn record_latency(&self, service: &str, instance: &str, latency: Duration);

    fn record_connection_failure(&self, service: &str, instance: &str);
}

/// Sink that emits every measurement as a structured log event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn record_test(&self, result: &TestResult) {
        info!(
            target: "cloudperf::metrics",
            service = %result.service,
            instance = %result.instance,
            operation = %result.operation,
            duration_seconds = result.duration.as_secs_f64(),
            success = result.success as u8,
            error_code = %result.error_code,
            throughput_mb_s = result.throughput_mib_s(),
            "test_duration"
        );
    }

    fn record_chunks(&self, service: &str, instance: &str, chunks: u32, chunk_size: u64) {
        info!(
            target: "cloudperf::metrics",
            service,
            instance,
            chunks,
            chunk_size_mb = chunk_size / MIB,
            "upload_chunks"
        );
    }

    fn record_circuit_state(&self, service: &str, instance: &str, state: CircuitState) {
        info!(
            target: "cloudperf::metrics",
            service,
            instance,
            state = state.as_metric(),
            "circuit_breaker_state"
        );
    }

    fn record_latency(&self, service: &str, instance: &str, latency: Duration) {
        info!(
            target: "cloudperf::metrics",
            service,
            instance,
            latency_ms = latency.as_secs_f64() * 1000.0,
            "network_latency"
        );
    }

    fn record_connection_failure(&self, service: &str, instance: &str) {
        info!(target: "cloudperf::metrics", service, instance, "connection_failure");
    }
}

/// Everything an [`InMemoryMetrics`] has seen
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub tests: Vec<TestResult>,
    /// `(instance, chunks, chunk_size)` per completed upload
    pub chunks: Vec<(String, u32, u64)>,
    /// Last breaker gauge per instance
    pub circuit_states: HashMap<String, CircuitState>,
    /// Last latency per instance
    pub latencies: HashMap<String, Duration>,
    pub connection_failures: HashMap<String, u64>,
}

/// Sink keeping the latest values in memory
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    inner: Mutex<MetricsSnapshot>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().clone()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_test(&self, result: &TestResult) {
        self.inner.lock().tests.push(result.clone());
    }

    fn record_chunks(&self, _service: &str, instance: &str, chunks: u32, chunk_size: u64) {
        self.inner.lock().chunks.push((instance.to_string(), chunks, chunk_size));
    }

    fn record_circuit_state(&self, _service: &str, instance: &str, state: CircuitState) {
        self.inner.lock().circuit_states.insert(instance.to_string(), state);
    }

    fn record_latency(&self, _service: &str, instance: &str, latency: Duration) {
        self.inner.lock().latencies.insert(instance.to_string(), latency);
    }

    fn record_connection_failure(&self, _service: &str, instance: &str) {
        *self
            .inner
            .lock()
            .connection_failures
            .entry(instance.to_string())
            .or_default() += 1;
    }
}
