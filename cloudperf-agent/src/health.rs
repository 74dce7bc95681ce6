//! Last known status per instance

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Status of one instance or of the whole agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health record of one instance
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Duration of the last test in milliseconds
    pub response_time: u64,
}

impl ServiceHealth {
    fn unknown(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Unknown,
            last_check: Utc::now(),
            last_error: None,
            response_time: 0,
        }
    }
}

/// Body of the `/health` endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    /// Human readable process uptime, e.g. `1h 2m 3s`
    pub uptime: String,
    pub services: Vec<ServiceHealth>,
    pub version: &'static str,
}

/// Registry of instance health, shared by the scheduler and the HTTP surface
pub struct HealthRegistry {
    records: RwLock<HashMap<String, ServiceHealth>>,
    /// Registration order, so snapshots list instances in config order
    order: RwLock<Vec<String>>,
    started: Instant,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            started: Instant::now(),
        }
    }

    /// Seed an `unknown` record; existing records are left alone
    pub fn register(&self, name: &str) {
        let mut records = self.records.write();
        if !records.contains_key(name) {
            records.insert(name.to_string(), ServiceHealth::unknown(name));
            self.order.write().push(name.to_string());
        }
    }

    /// Store the outcome of a check, registering the instance if needed
    pub fn update(&self, name: &str, status: HealthStatus, response_time: Duration, error: Option<String>) {
        self.register(name);
        let mut records = self.records.write();
        if let Some(record) = records.get_mut(name) {
            record.status = status;
            record.last_check = Utc::now();
            record.last_error = error;
            record.response_time = response_time.as_millis() as u64;
        }
    }

    pub fn get(&self, name: &str) -> Option<ServiceHealth> {
        self.records.read().get(name).cloned()
    }

    /// Overall status: unknown when empty, unhealthy when any record is not healthy
    pub fn overall_status(&self) -> HealthStatus {
        let records = self.records.read();
        if records.is_empty() {
            HealthStatus::Unknown
        } else if records.values().all(|record| record.status == HealthStatus::Healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Ready once any instance has passed a test
    pub fn is_ready(&self) -> bool {
        self.records
            .read()
            .values()
            .any(|record| record.status == HealthStatus::Healthy)
    }

    pub fn snapshot(&self) -> HealthReport {
        let services = {
            let records = self.records.read();
            self.order
                .read()
                .iter()
                .filter_map(|name| records.get(name).cloned())
                .collect()
        };
        let uptime = Duration::from_secs(self.started.elapsed().as_secs());

        HealthReport {
            status: self.overall_status(),
            timestamp: Utc::now(),
            uptime: humantime_serde::re::humantime::format_duration(uptime).to_string(),
            services,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}
