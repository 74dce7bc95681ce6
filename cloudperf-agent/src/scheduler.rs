//! Sequential test cycles over all configured instances
//!
//! A cycle walks the instances in configuration order, one at a time. Each
//! instance has its own circuit breaker; an open breaker skips the instance
//! until the reset timeout has passed. Clients are built lazily, so an
//! instance whose client cannot be built (for example a failed initial
//! token refresh) is retried on the next cycle.

use crate::breakers::BreakerRegistry;
use crate::health::{HealthRegistry, HealthStatus};
use crate::metrics::MetricsSink;
use crate::runner::{TestRunReport, TestRunner};
use crate::test_manager::TestManager;
use async_trait::async_trait;
use cloudperf_backends::{BackendClient, TransferClient, TransferResult};
use cloudperf_config::{AgentConfig, InstanceConfig};
use cloudperf_core::{ErrorCode, Operation};
use cloudperf_http::HttpManager;
use cloudperf_resilience::{CallOutcome, CircuitBreakerError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Builds the transfer client of one instance
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn build(
        &self,
        instance: &InstanceConfig,
        cancel: CancellationToken,
    ) -> TransferResult<Arc<dyn TransferClient>>;
}

/// Factory producing the real backend clients
pub struct BackendFactory {
    http: HttpManager,
}

impl BackendFactory {
    pub fn new(http: HttpManager) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ClientFactory for BackendFactory {
    async fn build(
        &self,
        instance: &InstanceConfig,
        cancel: CancellationToken,
    ) -> TransferResult<Arc<dyn TransferClient>> {
        let client = BackendClient::build(instance, &self.http, cancel).await?;
        Ok(Arc::new(client))
    }
}

struct InstanceSlot {
    config: InstanceConfig,
    client: Mutex<Option<Arc<dyn TransferClient>>>,
}

/// Drives test cycles until cancelled
pub struct Scheduler {
    slots: Vec<InstanceSlot>,
    factory: Arc<dyn ClientFactory>,
    runner: TestRunner,
    breakers: BreakerRegistry,
    health: Arc<HealthRegistry>,
    metrics: Arc<dyn MetricsSink>,
    tests: TestManager,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        config: &AgentConfig,
        factory: Arc<dyn ClientFactory>,
        metrics: Arc<dyn MetricsSink>,
        health: Arc<HealthRegistry>,
        tests: TestManager,
        cancel: CancellationToken,
    ) -> Self {
        let slots = config
            .instances
            .iter()
            .map(|instance| {
                health.register(&instance.name);
                InstanceSlot {
                    config: instance.clone(),
                    client: Mutex::new(None),
                }
            })
            .collect();

        Self {
            slots,
            factory,
            runner: TestRunner::new(metrics.clone(), config.test_directory.clone()),
            breakers: BreakerRegistry::new(config.resilience.circuit_breaker.clone()),
            health,
            metrics,
            tests,
            cancel,
        }
    }

    /// Period between cycles, taken from the first instance
    pub fn cycle_interval(&self) -> Option<Duration> {
        self.slots.first().map(|slot| slot.config.interval)
    }

    async fn client_for(&self, slot: &InstanceSlot) -> TransferResult<Arc<dyn TransferClient>> {
        if let Some(client) = slot.client.lock().clone() {
            return Ok(client);
        }

        let client = self.factory.build(&slot.config, self.cancel.child_token()).await?;
        debug!(instance = %slot.config.name, kind = %slot.config.kind, "Transfer client ready");
        *slot.client.lock() = Some(client.clone());
        Ok(client)
    }

    /// Call `test_connection` on every instance once and log the outcome.
    /// Returns the number of instances that answered.
    pub async fn test_connections(&self) -> usize {
        let mut reachable = 0;

        for slot in &self.slots {
            if self.cancel.is_cancelled() {
                break;
            }

            let name = &slot.config.name;
            let started = Instant::now();
            let result = match self.client_for(slot).await {
                Ok(client) => client.test_connection().await,
                Err(error) => Err(error),
            };

            match result {
                Ok(()) => {
                    info!(instance = %name, duration_ms = started.elapsed().as_millis() as u64, "Connection test succeeded");
                    reachable += 1;
                }
                Err(error) => {
                    warn!(instance = %name, error = %error, "Connection test failed");
                }
            }
        }

        reachable
    }

    /// Run one test per instance, in order. Stops early on cancellation.
    pub async fn run_cycle(&self, cycle: u64) -> Vec<TestRunReport> {
        self.run_cycle_inner(cycle).instrument(cloudperf_logging::cycle_span(cycle)).await
    }

    async fn run_cycle_inner(&self, cycle: u64) -> Vec<TestRunReport> {
        let started = Instant::now();
        let mut reports = Vec::with_capacity(self.slots.len());
        info!(instances = self.slots.len(), "Starting test cycle");

        for slot in &self.slots {
            if self.cancel.is_cancelled() {
                info!(remaining = self.slots.len() - reports.len(), "Cancellation requested, aborting cycle");
                break;
            }
            let Some(guard) = self.tests.begin(&slot.config.name) else {
                info!("Shutdown in progress, aborting cycle");
                break;
            };

            let report = self.test_instance(slot, guard.token()).await;
            reports.push(report);
        }

        let passed = reports.iter().filter(|report| report.success).count();
        info!(
            cycle,
            passed,
            failed = reports.len() - passed,
            duration_ms = started.elapsed().as_millis() as u64,
            "Test cycle finished"
        );
        reports
    }

    async fn test_instance(&self, slot: &InstanceSlot, cancel: &CancellationToken) -> TestRunReport {
        let instance = &slot.config;
        let service = instance.service();

        let client = match self.client_for(slot).await {
            Ok(client) => client,
            Err(error) => {
                let code = error.error_code(Operation::Directory);
                warn!(instance = %instance.name, error = %error, error_code = %code, "Failed to build transfer client");
                self.health
                    .update(&instance.name, HealthStatus::Unhealthy, Duration::ZERO, Some(error.to_string()));
                return TestRunReport::skipped(instance, code, error.to_string());
            }
        };

        let breaker = self.breakers.get(service, &instance.name);
        let outcome = breaker
            .execute_with(
                || async {
                    let report = self.runner.run(instance, client.as_ref(), cancel).await;
                    if report.success {
                        Ok(report)
                    } else {
                        Err(report)
                    }
                },
                // A cancelled run says nothing about the backend
                |result| match result {
                    Ok(_) => CallOutcome::Success,
                    Err(report) if report.cancelled => CallOutcome::Ignored,
                    Err(_) => CallOutcome::Failure,
                },
            )
            .await;

        let report = match outcome {
            Ok(report) | Err(CircuitBreakerError::Inner(report)) => report,
            Err(CircuitBreakerError::Open { name }) => {
                warn!(
                    instance = %instance.name,
                    breaker = %name,
                    rejected = breaker.metrics().total_rejected,
                    "Circuit breaker open, skipping test"
                );
                TestRunReport::skipped(instance, ErrorCode::CircuitOpen, format!("circuit breaker '{}' is open", name))
            }
        };

        if report.success {
            self.health
                .update(&instance.name, HealthStatus::Healthy, report.duration, None);
        } else if !report.cancelled {
            self.health
                .update(&instance.name, HealthStatus::Unhealthy, report.duration, report.error.clone());
        }
        self.metrics
            .record_circuit_state(service, &instance.name, breaker.state());

        report
    }

    /// Run a cycle now, then one per tick of the first instance's interval.
    /// With `once` only the first cycle runs. Returns the number of cycles.
    pub async fn run(&self, once: bool) -> u64 {
        let mut cycle = 1;
        self.run_cycle(cycle).await;
        if once {
            return cycle;
        }

        let Some(period) = self.cycle_interval() else {
            return cycle;
        };
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(cycles = cycle, "Scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    cycle += 1;
                    self.run_cycle(cycle).await;
                }
            }
        }

        cycle
    }
}
