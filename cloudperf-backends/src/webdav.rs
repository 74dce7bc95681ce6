//! Chunked WebDAV transfer client
//!
//! Uploads follow the chunking protocol of Nextcloud-style servers:
//!
//! 1. `MKCOL /remote.php/dav/uploads/<principal>/<transfer-id>` with a
//!    `Destination` header naming the final file
//! 2. `PUT <session>/00001`, `PUT <session>/00002`, ... one per chunk, in order
//! 3. `MOVE <session>/.file` onto the destination with `OC-Total-Length`
//!
//! The server numbers chunks from 1; a chunk named `00000` is rejected.

use crate::client::{read_chunk, Download, TransferClient, UploadReport};
use crate::error::{TransferError, TransferResult};
use async_trait::async_trait;
use bytes::Bytes;
use cloudperf_core::BackendKind;
use cloudperf_http::{HttpManager, HttpMethod};
use cloudperf_resilience::{RetryExecutor, RetryPolicy};
use reqwest::{RequestBuilder, StatusCode};
use std::io::Read;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// User agent of the official desktop sync client
pub const DESKTOP_CLIENT_USER_AGENT: &str = "Mozilla/5.0 (Windows) mirall/3.15.3 (build 20250107) (Nextcloud, windows-10.0.20348 ClientArchitecture: x86_64 OsArchitecture: x86_64)";

/// Per-chunk attempts, waiting `attempt` seconds between them
const CHUNK_ATTEMPTS: u32 = 3;

/// How requests present themselves to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebDavFlavor {
    /// Default client headers
    Plain,
    /// Headers of the desktop sync client, which some providers throttle less
    DesktopClient,
}

/// State of one chunked upload
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub transfer_id: String,
    /// URL of the temporary chunk directory
    pub session_url: String,
    /// URL of the final file
    pub destination: String,
    pub total_size: u64,
    pub chunk_size: u64,
    /// Bytes uploaded so far
    pub offset: u64,
    /// Number of the next chunk, starting at 1
    pub sequence: u32,
}

impl TransferSession {
    pub fn new(uploads_root: &str, destination: String, total_size: u64, chunk_size: u64) -> Self {
        let transfer_id = Uuid::new_v4().to_string();
        Self {
            session_url: format!("{}/{}", uploads_root.trim_end_matches('/'), transfer_id),
            transfer_id,
            destination,
            total_size,
            chunk_size,
            offset: 0,
            sequence: 1,
        }
    }

    /// Length of the next chunk, `None` once everything is uploaded
    pub fn next_chunk_len(&self) -> Option<u64> {
        let remaining = self.total_size.saturating_sub(self.offset);
        (remaining > 0 && self.chunk_size > 0).then(|| remaining.min(self.chunk_size))
    }

    /// Zero-padded name of the next chunk
    pub fn chunk_name(&self) -> String {
        format!("{:05}", self.sequence)
    }

    pub fn chunk_url(&self) -> String {
        format!("{}/{}", self.session_url, self.chunk_name())
    }

    pub fn advance(&mut self, len: u64) {
        self.offset += len;
        self.sequence += 1;
    }

    /// Chunks uploaded so far
    pub fn chunks_sent(&self) -> u32 {
        self.sequence - 1
    }

    /// Source of the assembling MOVE
    pub fn assembly_source(&self) -> String {
        format!("{}/.file", self.session_url)
    }
}

/// WebDAV client for one instance
pub struct WebDavClient {
    http: HttpManager,
    kind: BackendKind,
    flavor: WebDavFlavor,
    base_url: String,
    username: String,
    password: String,
    /// Path segment naming the account: the username, or the ANID
    principal: String,
    chunk_retry: RetryExecutor,
    cancel: CancellationToken,
}

impl WebDavClient {
    pub fn new(
        http: HttpManager,
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        let username = username.into();
        Self {
            http,
            kind: BackendKind::WebdavBasic,
            flavor: WebDavFlavor::Plain,
            base_url: base_url.trim_end_matches('/').to_string(),
            principal: username.clone(),
            username,
            password: password.into(),
            chunk_retry: RetryExecutor::new(RetryPolicy::linear(CHUNK_ATTEMPTS - 1, Duration::from_secs(1))),
            cancel,
        }
    }

    /// Use an account number instead of the username in every path
    pub fn with_anid(mut self, anid: impl Into<String>) -> Self {
        self.principal = anid.into();
        self.kind = BackendKind::WebdavAnid;
        self
    }

    pub fn with_flavor(mut self, flavor: WebDavFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Override the per-chunk retry policy
    pub fn with_chunk_retry(mut self, policy: RetryPolicy) -> Self {
        self.chunk_retry = RetryExecutor::new(policy);
        self
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// URL of a path in the user's file tree
    pub fn files_url(&self, path: &str) -> String {
        format!(
            "{}/remote.php/dav/files/{}/{}",
            self.base_url,
            self.principal,
            path.trim_start_matches('/')
        )
    }

    /// URL of the user's chunk upload area
    pub fn uploads_url(&self) -> String {
        format!("{}/remote.php/dav/uploads/{}", self.base_url, self.principal)
    }

    fn request(&self, method: HttpMethod, url: &str) -> TransferResult<RequestBuilder> {
        self.request_on(self.http.client(), method, url)
    }

    fn request_on(&self, client: &reqwest::Client, method: HttpMethod, url: &str) -> TransferResult<RequestBuilder> {
        let method = reqwest::Method::try_from(method).map_err(cloudperf_http::HttpError::from)?;
        let builder = client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password));

        Ok(match self.flavor {
            WebDavFlavor::Plain => builder,
            WebDavFlavor::DesktopClient => builder
                .header(reqwest::header::USER_AGENT, DESKTOP_CLIENT_USER_AGENT)
                .header(reqwest::header::ACCEPT, "*/*")
                .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9"),
        })
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> TransferResult<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| TransferError::transport(operation, &e))
    }

    async fn create_session(&self, session: &TransferSession) -> TransferResult<()> {
        let request = self
            .request(HttpMethod::Mkcol, &session.session_url)?
            .header("Destination", &session.destination);
        let response = self.send("create upload session", request).await?;

        if response.status() != StatusCode::CREATED {
            return Err(TransferError::from_response("create upload session", response).await);
        }
        Ok(())
    }

    async fn put_chunk(&self, session: &TransferSession, chunk: Bytes) -> TransferResult<()> {
        let url = session.chunk_url();
        let operation = format!("upload chunk {}", session.chunk_name());
        let length = chunk.len();

        self.chunk_retry
            .execute_with_context(&operation, &self.cancel, |attempt| {
                let body = chunk.clone();
                let url = url.clone();
                let operation = operation.clone();
                async move {
                    let started = Instant::now();
                    let request = self
                        .request(HttpMethod::Put, &url)?
                        .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                        .header("Destination", &session.destination)
                        .body(body);
                    let response = self.send(&operation, request).await?;

                    match response.status() {
                        StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => {
                            debug!(
                                chunk = session.sequence,
                                bytes = length,
                                attempt,
                                duration_ms = started.elapsed().as_millis() as u64,
                                "Chunk uploaded"
                            );
                            Ok(())
                        }
                        _ => Err(TransferError::from_response(operation, response).await),
                    }
                }
            })
            .await
            .map_err(TransferError::from_retry)
    }

    async fn assemble(&self, session: &TransferSession) -> TransferResult<()> {
        let request = self
            .request_on(self.http.assembly_client(), HttpMethod::Move, &session.assembly_source())?
            .header("Destination", &session.destination)
            .header("OC-Total-Length", session.total_size.to_string());

        let started = Instant::now();
        let response = self.send("MOVE assembly", request).await?;
        let status = response.status();

        info!(
            transfer_id = %session.transfer_id,
            status = status.as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Chunk assembly finished"
        );

        match status {
            StatusCode::CREATED | StatusCode::NO_CONTENT => Ok(()),
            _ => Err(TransferError::Assembly {
                status: status.as_u16(),
                body: cloudperf_http::body_snippet(response).await,
            }),
        }
    }
}

#[async_trait]
impl TransferClient for WebDavClient {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn ensure_directory(&self, path: &str) -> TransferResult<()> {
        let request = self.request(HttpMethod::Mkcol, &self.files_url(path))?;
        let response = self.send("create directory", request).await?;

        match response.status() {
            StatusCode::CREATED => {
                debug!(path, "Created directory");
                Ok(())
            }
            // Already exists
            StatusCode::METHOD_NOT_ALLOWED => Ok(()),
            _ => Err(TransferError::from_response("create directory", response).await),
        }
    }

    async fn upload_file(
        &self,
        path: &str,
        reader: &mut (dyn Read + Send),
        size: u64,
        chunk_size: u64,
    ) -> TransferResult<UploadReport> {
        let mut session = TransferSession::new(&self.uploads_url(), self.files_url(path), size, chunk_size);
        info!(
            transfer_id = %session.transfer_id,
            path,
            size,
            chunk_size,
            "Starting chunked upload"
        );

        self.create_session(&session).await?;

        while let Some(len) = session.next_chunk_len() {
            let chunk = read_chunk(reader, len)?;
            self.put_chunk(&session, chunk).await?;
            session.advance(len);
        }

        self.assemble(&session).await?;

        Ok(UploadReport {
            bytes: session.offset,
            chunks: session.chunks_sent(),
        })
    }

    async fn download_file(&self, path: &str) -> TransferResult<Download> {
        let request = self.request(HttpMethod::Get, &self.files_url(path))?;
        let response = self.send("download", request).await?;

        if response.status() != StatusCode::OK {
            return Err(TransferError::from_response("download", response).await);
        }
        Ok(Download::new(response))
    }

    async fn delete_file(&self, path: &str) -> TransferResult<()> {
        let request = self.request(HttpMethod::Delete, &self.files_url(path))?;
        let response = self.send("delete", request).await?;

        if response.status() != StatusCode::NO_CONTENT {
            let error = TransferError::from_response("delete", response).await;
            warn!(path, error = %error, "Delete rejected");
            return Err(error);
        }
        Ok(())
    }

    async fn test_connection(&self) -> TransferResult<()> {
        let request = self
            .request(HttpMethod::Propfind, &self.files_url(""))?
            .header("Depth", "0");
        let response = self.send("connection test", request).await?;

        match response.status() {
            StatusCode::OK | StatusCode::MULTI_STATUS => Ok(()),
            _ => Err(TransferError::from_response("connection test", response).await),
        }
    }
}
