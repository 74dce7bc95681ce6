//! Core type definitions for cloudperf

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::error_code::ErrorCode;

/// Bytes per mebibyte, used for sizes and throughput
pub const MIB: u64 = 1024 * 1024;

/// Backend protocol family of a configured instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Chunked WebDAV with a username path segment
    WebdavBasic,
    /// Chunked WebDAV with an account number (ANID) path segment
    WebdavAnid,
    /// Session-cursor REST uploads behind OAuth2
    Oauth2Dropbox,
    /// Offset-PATCH REST uploads behind OAuth2
    Oauth2HidriveLegacy,
}

impl BackendKind {
    /// Get the string representation of the backend kind
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::WebdavBasic => "webdav-basic",
            BackendKind::WebdavAnid => "webdav-anid",
            BackendKind::Oauth2Dropbox => "oauth2-dropbox",
            BackendKind::Oauth2HidriveLegacy => "oauth2-hidrive-legacy",
        }
    }

    /// Get all supported backend kinds
    pub fn all() -> &'static [BackendKind] {
        &[
            BackendKind::WebdavBasic,
            BackendKind::WebdavAnid,
            BackendKind::Oauth2Dropbox,
            BackendKind::Oauth2HidriveLegacy,
        ]
    }

    /// Whether the backend speaks the chunked WebDAV protocol
    pub fn is_webdav(&self) -> bool {
        matches!(self, BackendKind::WebdavBasic | BackendKind::WebdavAnid)
    }

    /// Production base URL for hosted REST backends
    pub fn default_url(&self) -> Option<&'static str> {
        match self {
            BackendKind::Oauth2Dropbox => Some("https://api.dropboxapi.com"),
            BackendKind::Oauth2HidriveLegacy => Some("https://api.hidrive.strato.com"),
            BackendKind::WebdavBasic | BackendKind::WebdavAnid => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "webdav-basic" => Ok(BackendKind::WebdavBasic),
            "webdav-anid" => Ok(BackendKind::WebdavAnid),
            "oauth2-dropbox" => Ok(BackendKind::Oauth2Dropbox),
            "oauth2-hidrive-legacy" => Ok(BackendKind::Oauth2HidriveLegacy),
            _ => Err(ParseError::InvalidBackendKind(s.to_string())),
        }
    }
}

/// Step of a transfer test, also used as the classifier's fallback key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Directory,
    Upload,
    Download,
    Cleanup,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Directory => "directory",
            Operation::Upload => "upload",
            Operation::Download => "download",
            Operation::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one timed transfer step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub instance: String,
    pub service: String,
    pub operation: Operation,
    pub duration: Duration,
    pub bytes: u64,
    pub success: bool,
    pub error_code: ErrorCode,
}

impl TestResult {
    /// Build a successful result
    pub fn success(
        instance: impl Into<String>,
        service: impl Into<String>,
        operation: Operation,
        duration: Duration,
        bytes: u64,
    ) -> Self {
        Self {
            instance: instance.into(),
            service: service.into(),
            operation,
            duration,
            bytes,
            success: true,
            error_code: ErrorCode::None,
        }
    }

    /// Build a failed result carrying its classified error code
    pub fn failure(
        instance: impl Into<String>,
        service: impl Into<String>,
        operation: Operation,
        duration: Duration,
        error_code: ErrorCode,
    ) -> Self {
        Self {
            instance: instance.into(),
            service: service.into(),
            operation,
            duration,
            bytes: 0,
            success: false,
            error_code,
        }
    }

    /// Throughput in MiB/s, only defined for successful steps with a
    /// measurable duration
    pub fn throughput_mib_s(&self) -> Option<f64> {
        let secs = self.duration.as_secs_f64();
        if !self.success || secs <= 0.0 {
            return None;
        }
        Some(self.bytes as f64 / MIB as f64 / secs)
    }
}

/// Errors that can occur when parsing core types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid backend kind: '{0}'. Supported kinds are: webdav-basic, webdav-anid, oauth2-dropbox, oauth2-hidrive-legacy")]
    InvalidBackendKind(String),
}
