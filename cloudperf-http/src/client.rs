//! Shared reqwest clients

use crate::config::HttpClientConfig;
use crate::errors::HttpError;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Owner of the pooled HTTP clients used by every transfer client
#[derive(Debug, Clone)]
pub struct HttpManager {
    client: Client,
    assembly_client: Client,
    config: HttpClientConfig,
}

impl HttpManager {
    /// Build both clients from configuration
    pub fn new(config: HttpClientConfig) -> Result<Self, HttpError> {
        debug!(
            timeout_secs = config.timeout.as_secs(),
            assembly_timeout_secs = config.assembly_timeout.as_secs(),
            "Creating HTTP clients"
        );

        if !config.verify_ssl {
            warn!("TLS certificate verification is disabled");
        }

        Ok(Self {
            client: build_client(&config, config.timeout)?,
            assembly_client: build_client(&config, config.assembly_timeout)?,
            config,
        })
    }

    /// Client with the ordinary request timeout
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Client with the extended timeout for server-side chunk assembly
    pub fn assembly_client(&self) -> &Client {
        &self.assembly_client
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

/// Build one reqwest client with the given overall request timeout
pub fn build_client(config: &HttpClientConfig, timeout: Duration) -> Result<Client, HttpError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.as_str())
        .danger_accept_invalid_certs(!config.verify_ssl)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(|e| HttpError::ClientBuild(crate::errors::describe(&e)))
}
