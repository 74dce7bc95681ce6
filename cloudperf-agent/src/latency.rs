//! TCP connect latency probes

use crate::metrics::MetricsSink;
use cloudperf_config::{InstanceConfig, LatencyProbeSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Periodic connect-and-close to one instance host
pub struct LatencyProbe {
    service: String,
    instance: String,
    host: String,
    port: u16,
    interval: Duration,
    timeout: Duration,
    metrics: Arc<dyn MetricsSink>,
}

impl LatencyProbe {
    /// Probe for the host of `instance.url`. Returns `None` when the URL has
    /// no host or no known port.
    pub fn from_instance(
        instance: &InstanceConfig,
        settings: &LatencyProbeSettings,
        metrics: Arc<dyn MetricsSink>,
    ) -> Option<Self> {
        let url = url::Url::parse(&instance.url).ok()?;
        let host = url.host_str()?.to_string();
        let port = url.port_or_known_default()?;

        Some(Self {
            service: instance.service().to_string(),
            instance: instance.name.clone(),
            host,
            port,
            interval: settings.interval,
            timeout: settings.timeout,
            metrics,
        })
    }

    pub fn target(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    /// Connect once and record the outcome
    pub async fn probe_once(&self) -> Option<Duration> {
        let started = Instant::now();
        match timeout(self.timeout, TcpStream::connect((self.host.as_str(), self.port))).await {
            Ok(Ok(stream)) => {
                let latency = started.elapsed();
                drop(stream);
                debug!(
                    instance = %self.instance,
                    latency_ms = latency.as_secs_f64() * 1000.0,
                    "Latency probe succeeded"
                );
                self.metrics.record_latency(&self.service, &self.instance, latency);
                Some(latency)
            }
            Ok(Err(error)) => {
                warn!(instance = %self.instance, host = %self.host, port = self.port, error = %error, "Latency probe failed");
                self.metrics.record_connection_failure(&self.service, &self.instance);
                None
            }
            Err(_) => {
                warn!(
                    instance = %self.instance,
                    host = %self.host,
                    port = self.port,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Latency probe timed out"
                );
                self.metrics.record_connection_failure(&self.service, &self.instance);
                None
            }
        }
    }

    /// Probe every interval until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.probe_once() => {}
                    }
                }
            }
        }
        debug!(instance = %self.instance, "Latency probe stopped");
    }
}

/// Spawn one probe task per instance
pub fn spawn_probes(
    instances: &[InstanceConfig],
    settings: &LatencyProbeSettings,
    metrics: Arc<dyn MetricsSink>,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    instances
        .iter()
        .filter_map(|instance| {
            let probe = LatencyProbe::from_instance(instance, settings, metrics.clone());
            if probe.is_none() {
                warn!(instance = %instance.name, url = %instance.url, "No latency probe target for instance");
            }
            probe
        })
        .map(|probe| tokio::spawn(probe.run(cancel.child_token())))
        .collect()
}
