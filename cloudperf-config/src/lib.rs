//! Configuration management for cloudperf
//!
//! Configuration is split by functional domain, each validated on its own,
//! and can be loaded from a YAML file, from environment variables, or both.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    http::HttpConfig,
    instance::{Credentials, InstanceConfig},
    logging::{LogFormat, LogLevel, LoggingConfig},
    resilience::{CircuitBreakerSettings, LatencyProbeSettings, ResilienceConfig},
    server::ServerConfig,
    AgentConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;
