//! HTTP configuration

use cloudperf_config::HttpConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// Request timeout
    pub timeout: Duration,

    /// Request timeout for chunk assembly
    pub assembly_timeout: Duration,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Whether to verify SSL certificates
    pub verify_ssl: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        HttpConfig::default().into()
    }
}

impl From<HttpConfig> for HttpClientConfig {
    fn from(config: HttpConfig) -> Self {
        Self {
            timeout: config.timeout,
            assembly_timeout: config.assembly_timeout,
            connect_timeout: config.connect_timeout,
            user_agent: config.user_agent,
            verify_ssl: config.verify_ssl,
        }
    }
}

impl From<&HttpConfig> for HttpClientConfig {
    fn from(config: &HttpConfig) -> Self {
        config.clone().into()
    }
}
