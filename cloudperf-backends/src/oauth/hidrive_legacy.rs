//! HiDrive REST API 2.1 client
//!
//! Paths are relative to the account's home directory, which the API reports
//! as `root/users/<name>`. Small files are sent as one multipart upload;
//! larger files are created empty and filled with offset-addressed `PATCH`
//! requests.

use super::token::{ClientAuthStyle, OAuthSession, TokenEndpoint};
use crate::client::{read_chunk, split_path, Download, TransferClient, UploadReport};
use crate::error::{TransferError, TransferResult};
use async_trait::async_trait;
use bytes::Bytes;
use cloudperf_core::BackendKind;
use cloudperf_http::HttpManager;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::io::Read;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const PRODUCTION_API: &str = "https://api.hidrive.strato.com";
const PRODUCTION_TOKEN: &str = "https://my.hidrive.com/oauth2/token";

/// API and token endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidriveEndpoints {
    pub api: String,
    pub token: String,
}

impl HidriveEndpoints {
    pub fn production() -> Self {
        Self {
            api: format!("{}/2.1", PRODUCTION_API),
            token: PRODUCTION_TOKEN.to_string(),
        }
    }

    /// Endpoints for a configured base URL; the production API host keeps the
    /// separate token host
    pub fn from_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        if base.is_empty() || base == PRODUCTION_API {
            return Self::production();
        }
        Self {
            api: format!("{}/2.1", base),
            token: format!("{}/oauth2/token", base),
        }
    }
}

#[derive(Deserialize)]
struct UserHome {
    home: String,
}

/// Turn the reported `root/users/<name>` into `/users/<name>`
pub fn normalize_home(raw: &str) -> String {
    let stripped = raw.strip_prefix("root").unwrap_or(raw);
    let trimmed = stripped.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Join a logical path onto the home directory
pub fn join_home(home: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    format!("{}/{}", home.trim_end_matches('/'), path)
}

/// HiDrive legacy client for one instance
pub struct HidriveLegacyClient {
    http: HttpManager,
    endpoints: HidriveEndpoints,
    session: OAuthSession,
    home: OnceCell<String>,
}

impl HidriveLegacyClient {
    /// Build the client and fetch the first access token
    pub async fn connect(
        http: HttpManager,
        endpoints: HidriveEndpoints,
        refresh_token: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        cancel: CancellationToken,
    ) -> TransferResult<Self> {
        let token_endpoint = TokenEndpoint {
            url: endpoints.token.clone(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_style: ClientAuthStyle::RequestBody,
        };
        let session = OAuthSession::new(http.client().clone(), token_endpoint, refresh_token, cancel);
        session.refresh_access_token().await?;

        Ok(Self {
            http,
            endpoints,
            session,
            home: OnceCell::new(),
        })
    }

    pub fn session(&self) -> &OAuthSession {
        &self.session
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.endpoints.api, endpoint)
    }

    /// Home directory, fetched once per client
    pub async fn home(&self) -> TransferResult<&str> {
        let home = self
            .home
            .get_or_try_init(|| async {
                let url = self.url("/user/me");
                let response = self
                    .session
                    .send("home lookup", || self.http.client().get(&url).query(&[("fields", "home")]))
                    .await?;
                let response = expect(&[StatusCode::OK], "home lookup", response).await?;
                let user: UserHome = response.json().await.map_err(|e| TransferError::InvalidResponse {
                    operation: "home lookup".to_string(),
                    message: e.to_string(),
                })?;

                let home = normalize_home(&user.home);
                debug!(reported = %user.home, home = %home, "Resolved home directory");
                Ok::<_, TransferError>(home)
            })
            .await?;
        Ok(home.as_str())
    }

    async fn full_path(&self, path: &str) -> TransferResult<String> {
        Ok(join_home(self.home().await?, path))
    }

    /// Multipart `POST /file` into `dir`
    async fn post_file(&self, operation: &str, dir: &str, name: &str, data: Bytes) -> TransferResult<()> {
        let url = self.url("/file");
        let response = self
            .session
            .send(operation, || {
                let part = Part::stream_with_length(data.clone(), data.len() as u64).file_name(name.to_string());
                self.http
                    .client()
                    .post(&url)
                    .query(&[("dir", dir)])
                    .multipart(Form::new().part("file", part))
            })
            .await?;

        expect(&[StatusCode::OK, StatusCode::CREATED], operation, response).await?;
        Ok(())
    }

    async fn patch_chunk(&self, path: &str, offset: u64, data: Bytes) -> TransferResult<()> {
        let url = self.url("/file");
        let offset_param = offset.to_string();
        let response = self
            .session
            .send("upload chunk", || {
                self.http
                    .client()
                    .patch(&url)
                    .query(&[("path", path), ("offset", offset_param.as_str())])
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(data.clone())
            })
            .await?;

        expect(&[StatusCode::OK, StatusCode::NO_CONTENT], "upload chunk", response).await?;
        Ok(())
    }
}

async fn expect(accepted: &[StatusCode], operation: &str, response: Response) -> TransferResult<Response> {
    if !accepted.contains(&response.status()) {
        return Err(TransferError::from_response(operation, response).await);
    }
    Ok(response)
}

#[async_trait]
impl TransferClient for HidriveLegacyClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Oauth2HidriveLegacy
    }

    async fn ensure_directory(&self, path: &str) -> TransferResult<()> {
        let full = self.full_path(path).await?;
        let url = self.url("/dir");

        let response = self
            .session
            .send("directory lookup", || self.http.client().get(&url).query(&[("path", full.as_str())]))
            .await?;
        if response.status() == StatusCode::OK {
            return Ok(());
        }
        drop(response);

        let response = self
            .session
            .send("create directory", || self.http.client().post(&url).form(&[("path", full.as_str())]))
            .await?;
        expect(&[StatusCode::OK, StatusCode::CREATED], "create directory", response).await?;

        debug!(path = %full, "Created directory");
        Ok(())
    }

    async fn upload_file(
        &self,
        path: &str,
        reader: &mut (dyn Read + Send),
        size: u64,
        chunk_size: u64,
    ) -> TransferResult<UploadReport> {
        let full = self.full_path(path).await?;
        let (dir, name) = split_path(&full)?;

        if size <= chunk_size {
            let data = read_chunk(reader, size)?;
            self.post_file("upload", dir, name, data).await?;
            debug!(path = %full, size, "Simple upload completed");
            return Ok(UploadReport { bytes: size, chunks: 1 });
        }

        self.post_file("create file", dir, name, Bytes::new()).await?;
        info!(path = %full, size, chunk_size, "Created empty file for chunked upload");

        let mut offset = 0u64;
        let mut chunks = 0u32;
        while offset < size {
            let len = (size - offset).min(chunk_size);
            let data = read_chunk(reader, len)?;
            self.patch_chunk(&full, offset, data).await?;
            offset += len;
            chunks += 1;
            debug!(chunk = chunks, offset, "Patched chunk");
        }

        Ok(UploadReport { bytes: offset, chunks })
    }

    async fn download_file(&self, path: &str) -> TransferResult<Download> {
        let full = self.full_path(path).await?;
        let url = self.url("/file");
        let response = self
            .session
            .send("download", || self.http.client().get(&url).query(&[("path", full.as_str())]))
            .await?;

        Ok(Download::new(expect(&[StatusCode::OK], "download", response).await?))
    }

    async fn delete_file(&self, path: &str) -> TransferResult<()> {
        let full = self.full_path(path).await?;
        let url = self.url("/file");
        let response = self
            .session
            .send("delete", || self.http.client().delete(&url).query(&[("path", full.as_str())]))
            .await?;

        expect(&[StatusCode::OK, StatusCode::NO_CONTENT], "delete", response).await?;
        Ok(())
    }

    async fn test_connection(&self) -> TransferResult<()> {
        let url = self.url("/app/me");
        let response = self
            .session
            .send("connection test", || self.http.client().get(&url).query(&[("fields", "id,name")]))
            .await?;

        expect(&[StatusCode::OK], "connection test", response).await?;
        Ok(())
    }
}
