//! Domain-specific configuration modules

pub mod http;
pub mod instance;
pub mod logging;
pub mod resilience;
pub mod server;
pub mod utils;

use crate::error::{ConfigError, ConfigResult};
use crate::validation::{validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Main agent configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Monitored backends, tested in this order
    #[serde(default)]
    pub instances: Vec<instance::InstanceConfig>,

    /// Remote directory that receives the test files
    #[serde(default = "default_test_directory")]
    pub test_directory: String,

    /// HTTP client configuration
    #[serde(default)]
    pub http: http::HttpConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,

    /// Health endpoint configuration
    #[serde(default)]
    pub server: server::ServerConfig,

    /// Circuit breaker, shutdown and latency probe settings
    #[serde(default)]
    pub resilience: resilience::ResilienceConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            instances: Vec::new(),
            test_directory: default_test_directory(),
            http: http::HttpConfig::default(),
            logging: logging::LoggingConfig::default(),
            server: server::ServerConfig::default(),
            resilience: resilience::ResilienceConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        if self.instances.is_empty() {
            return Err(ConfigError::ValidationError(
                "no instances configured; set NC_INSTANCE_1_URL (or another instance family) or list instances in the config file"
                    .to_string(),
            ));
        }

        let mut names = HashSet::new();
        for instance in &self.instances {
            instance.validate()?;
            if !names.insert(instance.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate instance name '{}'",
                    instance.name
                )));
            }
        }

        validate_required_string(&self.test_directory, "test_directory", "agent")?;
        self.http.validate()?;
        self.logging.validate()?;
        self.server.validate()?;
        self.resilience.validate()?;

        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = AgentConfig {
            instances: vec![instance::InstanceConfig {
                name: "nextcloud-1".to_string(),
                service: "nextcloud".to_string(),
                kind: cloudperf_core::BackendKind::WebdavBasic,
                url: "https://cloud.example.com".to_string(),
                credentials: instance::Credentials::Basic {
                    username: "monitor".to_string(),
                    password: "change-me".to_string(),
                },
                file_size_mb: instance::DEFAULT_FILE_SIZE_MB,
                chunk_size_mb: instance::DEFAULT_CHUNK_SIZE_MB,
                interval: instance::DEFAULT_INTERVAL,
            }],
            ..AgentConfig::default()
        };
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

fn default_test_directory() -> String {
    "/performance_tests".to_string()
}
