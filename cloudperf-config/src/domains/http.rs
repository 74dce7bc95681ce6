//! HTTP client configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP client configuration shared by every transfer client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout for ordinary requests
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_timeout")]
    pub timeout: Duration,

    /// Timeout for server-side chunk assembly (WebDAV MOVE)
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_assembly_timeout"
    )]
    pub assembly_timeout: Duration,

    /// TCP connect timeout
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_connect_timeout"
    )]
    pub connect_timeout: Duration,

    /// User agent string for backends without a specific one
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Whether to verify TLS certificates
    #[serde(default = "crate::domains::utils::default_true")]
    pub verify_ssl: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            assembly_timeout: default_assembly_timeout(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
            verify_ssl: true,
        }
    }
}

impl Validatable for HttpConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.timeout.as_secs(), "timeout", self.domain_name())?;
        validate_positive(self.connect_timeout.as_secs(), "connect_timeout", self.domain_name())?;
        validate_required_string(&self.user_agent, "user_agent", self.domain_name())?;

        if self.assembly_timeout < self.timeout {
            return Err(self.validation_error("assembly_timeout must not be shorter than timeout"));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "http"
    }
}

// Default value functions
fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_assembly_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("cloudperf-agent/", env!("CARGO_PKG_VERSION")).to_string()
}
