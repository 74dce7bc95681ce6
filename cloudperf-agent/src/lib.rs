//! Synthetic cloud storage performance monitoring agent
//!
//! The agent uploads, downloads and deletes a test file on every configured
//! storage instance in sequential cycles. Outcomes are reported through a
//! [`MetricsSink`](metrics::MetricsSink) and summarised by the health
//! endpoints.

pub mod breakers;
pub mod health;
pub mod latency;
pub mod metrics;
pub mod runner;
pub mod scheduler;
pub mod server;
pub mod startup;
pub mod test_manager;

// Re-export main components
pub use health::{HealthRegistry, HealthReport, HealthStatus};
pub use metrics::{InMemoryMetrics, MetricsSink, TracingMetrics};
pub use runner::{TestRunReport, TestRunner};
pub use scheduler::{BackendFactory, ClientFactory, Scheduler};
pub use startup::{Agent, AgentError};
pub use test_manager::{TestGuard, TestManager};
