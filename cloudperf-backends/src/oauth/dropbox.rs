//! Dropbox API v2 client
//!
//! Small files go up in one `files/upload` call. Larger files use an upload
//! session: `start` returns a session id, every chunk but the last is sent
//! with `append_v2` and a byte-offset cursor, and `finish` carries the last
//! chunk together with the commit. Directories are created implicitly.

use super::token::{ClientAuthStyle, OAuthSession, TokenEndpoint};
use crate::client::{read_chunk, Download, TransferClient, UploadReport};
use crate::error::{TransferError, TransferResult};
use async_trait::async_trait;
use bytes::Bytes;
use cloudperf_core::{BackendKind, MIB};
use cloudperf_http::HttpManager;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::io::Read;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Files up to this size use a single upload call
pub const SIMPLE_UPLOAD_LIMIT: u64 = 8 * MIB;

const PRODUCTION_API: &str = "https://api.dropboxapi.com";
const PRODUCTION_CONTENT: &str = "https://content.dropboxapi.com";

/// Base URLs of the API, content and token endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropboxEndpoints {
    pub api: String,
    pub content: String,
    pub token: String,
}

impl DropboxEndpoints {
    pub fn production() -> Self {
        Self {
            api: format!("{}/2", PRODUCTION_API),
            content: format!("{}/2", PRODUCTION_CONTENT),
            token: format!("{}/oauth2/token", PRODUCTION_API),
        }
    }

    /// Endpoints for a configured base URL. The production API host maps to
    /// the real split hosts; any other base serves everything itself.
    pub fn from_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        if base.is_empty() || base == PRODUCTION_API {
            return Self::production();
        }
        Self {
            api: format!("{}/2", base),
            content: format!("{}/2", base),
            token: format!("{}/oauth2/token", base),
        }
    }
}

#[derive(Serialize)]
struct PathArg<'a> {
    path: &'a str,
}

#[derive(Serialize)]
struct CommitInfo<'a> {
    path: &'a str,
    mode: &'static str,
    autorename: bool,
}

impl<'a> CommitInfo<'a> {
    fn overwrite(path: &'a str) -> Self {
        Self {
            path,
            mode: "overwrite",
            autorename: false,
        }
    }
}

#[derive(Serialize)]
struct Cursor<'a> {
    session_id: &'a str,
    offset: u64,
}

#[derive(Serialize)]
struct AppendArg<'a> {
    cursor: Cursor<'a>,
    close: bool,
}

#[derive(Serialize)]
struct FinishArg<'a> {
    cursor: Cursor<'a>,
    commit: CommitInfo<'a>,
}

#[derive(Deserialize)]
struct SessionStart {
    session_id: String,
}

/// Serialize a `Dropbox-API-Arg` header value. Header values must be ASCII,
/// so everything else is escaped as `\uXXXX`.
fn api_arg<T: Serialize>(value: &T) -> TransferResult<String> {
    let json = serde_json::to_string(value).map_err(|e| TransferError::InvalidResponse {
        operation: "encode api argument".to_string(),
        message: e.to_string(),
    })?;

    let mut escaped = String::with_capacity(json.len());
    for ch in json.chars() {
        if ch.is_ascii() {
            escaped.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    Ok(escaped)
}

/// Dropbox client for one instance
pub struct DropboxClient {
    http: HttpManager,
    endpoints: DropboxEndpoints,
    session: OAuthSession,
}

impl DropboxClient {
    pub fn new(
        http: HttpManager,
        endpoints: DropboxEndpoints,
        refresh_token: impl Into<String>,
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        let token_endpoint = TokenEndpoint {
            url: endpoints.token.clone(),
            client_id: app_key.into(),
            client_secret: app_secret.into(),
            auth_style: ClientAuthStyle::BasicAuth,
        };
        let session = OAuthSession::new(http.client().clone(), token_endpoint, refresh_token, cancel);

        Self {
            http,
            endpoints,
            session,
        }
    }

    pub fn session(&self) -> &OAuthSession {
        &self.session
    }

    pub fn endpoints(&self) -> &DropboxEndpoints {
        &self.endpoints
    }

    /// POST binary data to a content endpoint with a `Dropbox-API-Arg` header
    async fn content_call(&self, operation: &str, endpoint: &str, arg: Option<String>, body: Bytes) -> TransferResult<Response> {
        let url = format!("{}{}", self.endpoints.content, endpoint);
        let response = self
            .session
            .send(operation, || {
                let mut request = self
                    .http
                    .client()
                    .post(&url)
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(body.clone());
                if let Some(arg) = &arg {
                    request = request.header("Dropbox-API-Arg", arg.as_str());
                }
                request
            })
            .await?;

        expect_ok(operation, response).await
    }

    async fn upload_simple(&self, path: &str, reader: &mut (dyn Read + Send), size: u64) -> TransferResult<UploadReport> {
        let data = read_chunk(reader, size)?;
        let arg = api_arg(&CommitInfo::overwrite(path))?;
        self.content_call("upload", "/files/upload", Some(arg), data).await?;

        debug!(path, size, "Simple upload completed");
        Ok(UploadReport { bytes: size, chunks: 1 })
    }

    async fn upload_session(
        &self,
        path: &str,
        reader: &mut (dyn Read + Send),
        size: u64,
        chunk_size: u64,
    ) -> TransferResult<UploadReport> {
        let response = self
            .content_call("start upload session", "/files/upload_session/start", None, Bytes::new())
            .await?;
        let SessionStart { session_id } = response
            .json()
            .await
            .map_err(|e| TransferError::InvalidResponse {
                operation: "start upload session".to_string(),
                message: e.to_string(),
            })?;

        info!(path, size, chunk_size, session_id = %session_id, "Started upload session");

        let mut offset = 0u64;
        let mut chunks = 0u32;
        loop {
            let len = (size - offset).min(chunk_size);
            let data = read_chunk(reader, len)?;
            let cursor = Cursor {
                session_id: &session_id,
                offset,
            };
            chunks += 1;

            if offset + len >= size {
                let arg = api_arg(&FinishArg {
                    cursor,
                    commit: CommitInfo::overwrite(path),
                })?;
                self.content_call("finish upload session", "/files/upload_session/finish", Some(arg), data)
                    .await?;
                offset += len;
                break;
            }

            let arg = api_arg(&AppendArg { cursor, close: false })?;
            self.content_call("append upload session", "/files/upload_session/append_v2", Some(arg), data)
                .await?;
            offset += len;
            debug!(chunk = chunks, offset, "Appended chunk");
        }

        Ok(UploadReport { bytes: offset, chunks })
    }
}

async fn expect_ok(operation: &str, response: Response) -> TransferResult<Response> {
    if response.status() != StatusCode::OK {
        return Err(TransferError::from_response(operation, response).await);
    }
    Ok(response)
}

#[async_trait]
impl TransferClient for DropboxClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Oauth2Dropbox
    }

    async fn ensure_directory(&self, path: &str) -> TransferResult<()> {
        if !path.starts_with('/') {
            return Err(TransferError::InvalidPath(path.to_string()));
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        path: &str,
        reader: &mut (dyn Read + Send),
        size: u64,
        chunk_size: u64,
    ) -> TransferResult<UploadReport> {
        if size <= SIMPLE_UPLOAD_LIMIT {
            self.upload_simple(path, reader, size).await
        } else {
            self.upload_session(path, reader, size, chunk_size.max(1)).await
        }
    }

    async fn download_file(&self, path: &str) -> TransferResult<Download> {
        let arg = api_arg(&PathArg { path })?;
        let url = format!("{}/files/download", self.endpoints.content);
        let response = self
            .session
            .send("download", || {
                self.http.client().post(&url).header("Dropbox-API-Arg", arg.as_str())
            })
            .await?;

        Ok(Download::new(expect_ok("download", response).await?))
    }

    async fn delete_file(&self, path: &str) -> TransferResult<()> {
        let url = format!("{}/files/delete_v2", self.endpoints.api);
        let response = self
            .session
            .send("delete", || self.http.client().post(&url).json(&PathArg { path }))
            .await?;

        expect_ok("delete", response).await?;
        Ok(())
    }

    async fn test_connection(&self) -> TransferResult<()> {
        let url = format!("{}/users/get_current_account", self.endpoints.api);
        let response = self
            .session
            .send("connection test", || self.http.client().post(&url))
            .await?;

        expect_ok("connection test", response).await?;
        Ok(())
    }
}
