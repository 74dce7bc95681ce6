//! Configuration loading and environment variable handling

use crate::domains::instance::{
    Credentials, InstanceConfig, DEFAULT_CHUNK_SIZE_MB, DEFAULT_FILE_SIZE_MB, DEFAULT_INTERVAL,
};
use crate::domains::AgentConfig;
use crate::error::{ConfigError, ConfigResult};
use cloudperf_core::BackendKind;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable family describing numbered instances,
/// e.g. `NC_INSTANCE_1_URL`, `NC_INSTANCE_2_URL`, ...
struct InstanceFamily {
    prefix: &'static str,
    service: &'static str,
    kind: BackendKind,
}

const INSTANCE_FAMILIES: &[InstanceFamily] = &[
    InstanceFamily {
        prefix: "NC",
        service: "nextcloud",
        kind: BackendKind::WebdavBasic,
    },
    InstanceFamily {
        prefix: "HIDRIVE",
        service: "hidrive",
        kind: BackendKind::WebdavBasic,
    },
    InstanceFamily {
        prefix: "MAGENTACLOUD",
        service: "magentacloud",
        kind: BackendKind::WebdavAnid,
    },
    InstanceFamily {
        prefix: "DROPBOX",
        service: "dropbox",
        kind: BackendKind::Oauth2Dropbox,
    },
    InstanceFamily {
        prefix: "HIDRIVE_LEGACY",
        service: "hidrive_legacy",
        kind: BackendKind::Oauth2HidriveLegacy,
    },
];

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Optional environment variable prefix
    prefix: Option<String>,
}

impl ConfigLoader {
    /// Create a new config loader reading unprefixed variables
    pub fn new() -> Self {
        Self { prefix: None }
    }

    /// Create a new config loader with custom prefix (`<PREFIX>_NC_INSTANCE_1_URL`)
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    /// Load configuration from a YAML file, then add environment instances
    /// and apply environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<AgentConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: AgentConfig = serde_yaml::from_str(&content)?;
        debug!(path = %path.display(), instances = config.instances.len(), "Parsed config file");

        self.apply_env(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<AgentConfig> {
        let mut config = AgentConfig::default();
        self.apply_env(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<AgentConfig> {
        let config = match config_path {
            Some(path) => self.from_file(path)?,
            None => self.from_env()?,
        };

        for instance in &config.instances {
            info!(
                instance = %instance.name,
                service = instance.service(),
                kind = %instance.kind,
                url = %instance.url,
                "Loaded instance"
            );
        }

        Ok(config)
    }

    fn apply_env(&self, config: &mut AgentConfig) -> ConfigResult<()> {
        let discovered = self.discover_instances()?;
        config.instances.extend(discovered);

        self.apply_test_overrides(&mut config.instances)?;
        self.apply_http_overrides(&mut config.http)?;
        self.apply_logging_overrides(&mut config.logging)?;
        self.apply_server_overrides(&mut config.server)?;

        if let Some(directory) = self.get_env_var("TEST_DIRECTORY") {
            config.test_directory = directory;
        }

        Ok(())
    }

    /// Discover numbered instances for every family, from 1 until the first gap
    pub fn discover_instances(&self) -> ConfigResult<Vec<InstanceConfig>> {
        let mut instances = Vec::new();

        for family in INSTANCE_FAMILIES {
            let mut n = 1;
            while let Some(instance) = self.read_instance(family, n)? {
                debug!(instance = %instance.name, service = family.service, "Discovered instance from environment");
                instances.push(instance);
                n += 1;
            }
        }

        Ok(instances)
    }

    fn read_instance(&self, family: &InstanceFamily, n: usize) -> ConfigResult<Option<InstanceConfig>> {
        let key = |field: &str| format!("{}_INSTANCE_{}_{}", family.prefix, n, field);

        let (url, credentials) = if family.kind.is_webdav() {
            let Some(url) = self.get_env_var(&key("URL")) else {
                return Ok(None);
            };
            let username = self.require_env_var(&key("USER"))?;
            let password = self.require_env_var(&key("PASS"))?;
            let credentials = match family.kind {
                BackendKind::WebdavAnid => Credentials::Anid {
                    username,
                    password,
                    anid: self.require_env_var(&key("ANID"))?,
                },
                _ => Credentials::Basic { username, password },
            };
            (url, credentials)
        } else {
            let Some(refresh_token) = self.get_env_var(&key("REFRESH_TOKEN")) else {
                return Ok(None);
            };
            let credentials = match family.kind {
                BackendKind::Oauth2Dropbox => Credentials::DropboxOauth {
                    refresh_token,
                    app_key: self.require_env_var(&key("APP_KEY"))?,
                    app_secret: self.require_env_var(&key("APP_SECRET"))?,
                },
                _ => Credentials::HidriveOauth {
                    refresh_token,
                    client_id: self.require_env_var(&key("CLIENT_ID"))?,
                    client_secret: self.require_env_var(&key("CLIENT_SECRET"))?,
                },
            };
            let url = self
                .get_env_var(&key("URL"))
                .or_else(|| family.kind.default_url().map(str::to_string))
                .unwrap_or_default();
            (url, credentials)
        };

        // WebDAV instances are named after their URL unless a name is given
        let name = self.get_env_var(&key("NAME")).unwrap_or_else(|| {
            if family.kind.is_webdav() {
                url.clone()
            } else {
                format!("{}-{}", family.service, n)
            }
        });

        Ok(Some(InstanceConfig {
            name,
            service: family.service.to_string(),
            kind: family.kind,
            url,
            credentials,
            file_size_mb: DEFAULT_FILE_SIZE_MB,
            chunk_size_mb: DEFAULT_CHUNK_SIZE_MB,
            interval: DEFAULT_INTERVAL,
        }))
    }

    /// Shared test parameters override every instance
    fn apply_test_overrides(&self, instances: &mut [InstanceConfig]) -> ConfigResult<()> {
        let file_size: Option<u64> = self.parse_env_var("TEST_FILE_SIZE_MB")?;
        let chunk_size: Option<u64> = self.parse_env_var("TEST_CHUNK_SIZE_MB")?;
        let interval: Option<u64> = self.parse_env_var("TEST_INTERVAL_SECONDS")?;

        for instance in instances.iter_mut() {
            if let Some(mb) = file_size {
                instance.file_size_mb = mb;
            }
            if let Some(mb) = chunk_size {
                instance.chunk_size_mb = mb;
            }
            if let Some(seconds) = interval {
                instance.interval = Duration::from_secs(seconds);
            }
        }

        Ok(())
    }

    /// Apply HTTP config overrides
    fn apply_http_overrides(&self, config: &mut crate::domains::http::HttpConfig) -> ConfigResult<()> {
        if let Some(seconds) = self.parse_env_var::<u64>("HTTP_TIMEOUT")? {
            config.timeout = Duration::from_secs(seconds);
        }

        if let Some(seconds) = self.parse_env_var::<u64>("HTTP_ASSEMBLY_TIMEOUT")? {
            config.assembly_timeout = Duration::from_secs(seconds);
        }

        if let Some(verify_ssl) = self.parse_env_var("HTTP_VERIFY_SSL")? {
            config.verify_ssl = verify_ssl;
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Some(level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", level)))?;
        }

        if let Some(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Apply server config overrides
    fn apply_server_overrides(
        &self,
        config: &mut crate::domains::server::ServerConfig,
    ) -> ConfigResult<()> {
        if let Some(bind) = self.get_env_var("HEALTH_BIND_ADDRESS") {
            config.bind_address = bind;
        }

        if let Some(enabled) = self.parse_env_var("HEALTH_ENABLED")? {
            config.enabled = enabled;
        }

        Ok(())
    }

    /// Get a non-empty environment variable, honouring the prefix
    fn get_env_var(&self, name: &str) -> Option<String> {
        std::env::var(self.env_key(name))
            .ok()
            .filter(|value| !value.trim().is_empty())
    }

    fn require_env_var(&self, name: &str) -> ConfigResult<String> {
        self.get_env_var(name)
            .ok_or_else(|| ConfigError::EnvError(format!("{} must be set", self.env_key(name))))
    }

    fn env_key(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, name),
            None => name.to_string(),
        }
    }

    fn parse_env_var<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get_env_var(name)
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e)))
            })
            .transpose()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
