//! Circuit breaker, shutdown and latency probe settings

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resilience configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    /// Grace period for in-flight work during shutdown
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_shutdown_timeout"
    )]
    pub shutdown_timeout: Duration,

    #[serde(default)]
    pub latency_probe: LatencyProbeSettings,
}

/// Per-instance circuit breaker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit
    pub max_failures: u32,

    /// Consecutive successes in half-open state that close it again
    pub success_threshold: u32,

    /// Time the circuit stays open before a probe call is let through
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub reset_timeout: Duration,
}

/// TCP connect latency probe settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyProbeSettings {
    #[serde(default = "crate::domains::utils::default_true")]
    pub enabled: bool,

    #[serde(with = "crate::domains::utils::serde_duration")]
    pub interval: Duration,

    #[serde(with = "crate::domains::utils::serde_duration")]
    pub timeout: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerSettings::default(),
            shutdown_timeout: default_shutdown_timeout(),
            latency_probe: LatencyProbeSettings::default(),
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            max_failures: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl Default for LatencyProbeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
        }
    }
}

impl Validatable for ResilienceConfig {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();
        validate_positive(self.circuit_breaker.max_failures, "circuit_breaker.max_failures", domain)?;
        validate_positive(
            self.circuit_breaker.success_threshold,
            "circuit_breaker.success_threshold",
            domain,
        )?;
        validate_positive(
            self.circuit_breaker.reset_timeout.as_secs(),
            "circuit_breaker.reset_timeout",
            domain,
        )?;
        validate_positive(self.shutdown_timeout.as_secs(), "shutdown_timeout", domain)?;

        if self.latency_probe.enabled {
            validate_positive(self.latency_probe.interval.as_secs(), "latency_probe.interval", domain)?;
            if self.latency_probe.timeout.is_zero() || self.latency_probe.timeout > self.latency_probe.interval {
                return Err(self.validation_error(
                    "latency_probe.timeout must be positive and not exceed latency_probe.interval",
                ));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "resilience"
    }
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: ResilienceConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.circuit_breaker.max_failures, 5);
        assert_eq!(config.latency_probe.timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_probe_timeout_cannot_exceed_interval() {
        let mut config = ResilienceConfig::default();
        config.latency_probe.timeout = Duration::from_secs(60);
        assert!(config.validate().is_err());

        config.latency_probe.enabled = false;
        assert!(config.validate().is_ok());
    }
}
