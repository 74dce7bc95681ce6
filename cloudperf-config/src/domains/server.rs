//! Health endpoint server configuration

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Health endpoint server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Whether to serve the health endpoints at all
    #[serde(default = "crate::domains::utils::default_true")]
    pub enabled: bool,

    /// Listen address, e.g. `0.0.0.0:9100`
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_bind_address(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> ConfigResult<SocketAddr> {
        self.bind_address
            .parse()
            .map_err(|e| self.validation_error(format!("invalid bind_address '{}': {}", self.bind_address, e)))
    }
}

impl Validatable for ServerConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.enabled {
            self.socket_addr()?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "server"
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:9100".to_string()
}
