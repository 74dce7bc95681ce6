//! Per-instance backend configuration

use crate::error::ConfigResult;
use crate::validation::{validate_range, validate_required_string, validate_url, Validatable};
use cloudperf_core::{BackendKind, MIB};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Largest accepted test file
pub const MAX_FILE_SIZE_MB: u64 = 10_240;

/// Shortest accepted test interval
pub const MIN_INTERVAL: Duration = Duration::from_secs(30);

pub const DEFAULT_FILE_SIZE_MB: u64 = 10;
pub const DEFAULT_CHUNK_SIZE_MB: u64 = 5;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// One monitored backend target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Instance name used in logs, metrics and health records
    pub name: String,

    /// Service label (`nextcloud`, `hidrive`, ...); defaults to the backend kind
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,

    /// Backend protocol family
    pub kind: BackendKind,

    /// Base URL of the backend
    pub url: String,

    /// Credentials matching `kind`
    pub credentials: Credentials,

    /// Test file size in MiB
    #[serde(default = "default_file_size_mb")]
    pub file_size_mb: u64,

    /// Upload chunk size in MiB
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,

    /// Pause between test cycles
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_interval")]
    pub interval: Duration,
}

/// Credentials, tagged by `type`
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// WebDAV basic auth
    Basic { username: String, password: String },

    /// WebDAV basic auth with an account number used in paths
    Anid {
        username: String,
        password: String,
        anid: String,
    },

    /// Dropbox refresh token with app key and secret
    DropboxOauth {
        refresh_token: String,
        app_key: String,
        app_secret: String,
    },

    /// HiDrive refresh token with client id and secret
    HidriveOauth {
        refresh_token: String,
        client_id: String,
        client_secret: String,
    },
}

impl Credentials {
    /// The backend kind these credentials belong to
    pub fn kind(&self) -> BackendKind {
        match self {
            Credentials::Basic { .. } => BackendKind::WebdavBasic,
            Credentials::Anid { .. } => BackendKind::WebdavAnid,
            Credentials::DropboxOauth { .. } => BackendKind::Oauth2Dropbox,
            Credentials::HidriveOauth { .. } => BackendKind::Oauth2HidriveLegacy,
        }
    }

    fn fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            Credentials::Basic { username, password } => {
                vec![("username", username), ("password", password)]
            }
            Credentials::Anid {
                username,
                password,
                anid,
            } => vec![("username", username), ("password", password), ("anid", anid)],
            Credentials::DropboxOauth {
                refresh_token,
                app_key,
                app_secret,
            } => vec![
                ("refresh_token", refresh_token),
                ("app_key", app_key),
                ("app_secret", app_secret),
            ],
            Credentials::HidriveOauth {
                refresh_token,
                client_id,
                client_secret,
            } => vec![
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ],
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Anid { username, anid, .. } => f
                .debug_struct("Anid")
                .field("username", username)
                .field("password", &"<redacted>")
                .field("anid", anid)
                .finish(),
            Credentials::DropboxOauth { app_key, .. } => f
                .debug_struct("DropboxOauth")
                .field("refresh_token", &"<redacted>")
                .field("app_key", app_key)
                .field("app_secret", &"<redacted>")
                .finish(),
            Credentials::HidriveOauth { client_id, .. } => f
                .debug_struct("HidriveOauth")
                .field("refresh_token", &"<redacted>")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
        }
    }
}

impl InstanceConfig {
    /// Service label, falling back to the backend kind
    pub fn service(&self) -> &str {
        if self.service.is_empty() {
            self.kind.as_str()
        } else {
            &self.service
        }
    }

    pub fn file_size_bytes(&self) -> u64 {
        self.file_size_mb * MIB
    }

    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_mb * MIB
    }
}

impl Validatable for InstanceConfig {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();
        validate_required_string(&self.name, "name", domain)?;
        validate_url(&self.url, &format!("instance '{}' url", self.name), domain)?;

        validate_range(self.file_size_mb, 1, MAX_FILE_SIZE_MB, "file_size_mb", domain)?;
        if self.chunk_size_mb == 0 || self.chunk_size_mb > self.file_size_mb {
            return Err(self.validation_error(format!(
                "instance '{}': chunk_size_mb must be between 1 and file_size_mb ({}), got {}",
                self.name, self.file_size_mb, self.chunk_size_mb
            )));
        }

        if self.interval < MIN_INTERVAL {
            return Err(self.validation_error(format!(
                "instance '{}': interval must be at least {}s, got {}s",
                self.name,
                MIN_INTERVAL.as_secs(),
                self.interval.as_secs()
            )));
        }

        if self.credentials.kind() != self.kind {
            return Err(self.validation_error(format!(
                "instance '{}': credentials do not match backend kind {}",
                self.name, self.kind
            )));
        }

        for (field, value) in self.credentials.fields() {
            validate_required_string(value, &format!("instance '{}' {}", self.name, field), domain)?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "instance"
    }
}

fn default_file_size_mb() -> u64 {
    DEFAULT_FILE_SIZE_MB
}

fn default_chunk_size_mb() -> u64 {
    DEFAULT_CHUNK_SIZE_MB
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}
