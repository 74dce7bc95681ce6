//! Agent startup and shutdown logic

use crate::health::HealthRegistry;
use crate::latency::spawn_probes;
use crate::metrics::{MetricsSink, TracingMetrics};
use crate::scheduler::{BackendFactory, ClientFactory, Scheduler};
use crate::server::HealthServer;
use crate::test_manager::TestManager;
use cloudperf_config::{AgentConfig, ConfigError};
use cloudperf_http::{HttpError, HttpManager};
use cloudperf_resilience::{ShutdownCoordinator, ShutdownError};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that stop the agent
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP clients: {0}")]
    Http(#[from] HttpError),

    #[error("failed to start health server on {addr}: {source}")]
    Server {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("shutdown did not complete cleanly: {0}")]
    Shutdown(#[from] ShutdownError),

    #[error("scheduler task failed: {0}")]
    Scheduler(#[from] tokio::task::JoinError),
}

/// The monitoring agent
pub struct Agent {
    config: AgentConfig,
    metrics: Arc<dyn MetricsSink>,
    factory: Option<Arc<dyn ClientFactory>>,
}

impl Agent {
    /// Create an agent that reports measurements as log events
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(TracingMetrics),
            factory: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the backend client factory
    pub fn with_client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Run until a termination signal arrives, or for a single cycle with `once`
    pub async fn start(self, once: bool) -> Result<(), AgentError> {
        self.log_config_summary(once);

        let coordinator = Arc::new(ShutdownCoordinator::with_timeout(
            self.config.resilience.shutdown_timeout,
        ));
        let cancel = coordinator.token();
        let health = Arc::new(HealthRegistry::new());

        // Hooks run newest first: tests stop before the health surface goes away
        if self.config.server.enabled {
            let addr = self.config.server.socket_addr()?;
            let server = HealthServer::start(addr, health.clone())
                .await
                .map_err(|source| AgentError::Server { addr, source })?;
            coordinator.register(Arc::new(server));
        }
        let tests = TestManager::new(cancel.clone());
        coordinator.register(Arc::new(tests.clone()));

        let factory = match self.factory {
            Some(factory) => factory,
            None => Arc::new(BackendFactory::new(HttpManager::new((&self.config.http).into())?)),
        };

        let scheduler = Arc::new(Scheduler::new(
            &self.config,
            factory,
            self.metrics.clone(),
            health,
            tests,
            cancel.clone(),
        ));

        let reachable = scheduler.test_connections().await;
        info!(
            reachable,
            total = self.config.instances.len(),
            "Connection tests finished"
        );

        let probes = if self.config.resilience.latency_probe.enabled && !once {
            spawn_probes(
                &self.config.instances,
                &self.config.resilience.latency_probe,
                self.metrics.clone(),
                &cancel,
            )
        } else {
            Vec::new()
        };

        if once {
            scheduler.run(true).await;
            coordinator.shutdown().await?;
            info!("Single cycle complete");
            return Ok(());
        }

        let scheduler_task = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(false).await })
        };

        let shutdown = coordinator.wait_for_signal().await;
        if let Err(e) = &shutdown {
            warn!(error = %e, "Shutdown finished with errors");
        }

        let cycles = scheduler_task.await?;
        for probe in probes {
            if let Err(e) = probe.await {
                warn!(error = %e, "Latency probe task failed");
            }
        }

        let signal = shutdown?;
        info!(%signal, cycles, "Agent stopped");
        Ok(())
    }

    fn log_config_summary(&self, once: bool) {
        info!("=== cloudperf agent configuration ===");
        for instance in &self.config.instances {
            info!(
                instance = %instance.name,
                service = %instance.service(),
                kind = %instance.kind,
                url = %instance.url,
                file_size_mb = instance.file_size_mb,
                chunk_size_mb = instance.chunk_size_mb,
                interval_secs = instance.interval.as_secs(),
                "Monitored instance"
            );
        }
        info!("Test directory: {}", self.config.test_directory);
        info!(
            "Health server: {}",
            if self.config.server.enabled {
                self.config.server.bind_address.as_str()
            } else {
                "disabled"
            }
        );
        info!(
            "Latency probes: {}",
            if self.config.resilience.latency_probe.enabled && !once {
                "enabled"
            } else {
                "disabled"
            }
        );
        info!("Mode: {}", if once { "single cycle" } else { "continuous" });
        info!("=====================================");
    }
}
