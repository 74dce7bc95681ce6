#![allow(dead_code)]

use async_trait::async_trait;
use cloudperf_backends::{chunk_count, Download, TransferClient, TransferError, TransferResult, UploadReport};
use cloudperf_config::{Credentials, InstanceConfig};
use cloudperf_core::{BackendKind, MIB};
use parking_lot::Mutex;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn instance(name: &str) -> InstanceConfig {
    InstanceConfig {
        name: name.to_string(),
        service: "nextcloud".to_string(),
        kind: BackendKind::WebdavBasic,
        url: "https://cloud.example.com".to_string(),
        credentials: Credentials::Basic {
            username: "monitor".to_string(),
            password: "secret".to_string(),
        },
        file_size_mb: 1,
        chunk_size_mb: 1,
        interval: Duration::from_secs(60),
    }
}

/// Serves bodies of the full test size, one byte short and ten bytes long
pub async fn download_server() -> MockServer {
    let server = MockServer::start().await;
    let size = MIB as usize;
    for (route, len) in [("/full", size), ("/short", size - 1), ("/long", size + 10)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; len]))
            .mount(&server)
            .await;
    }
    server
}

fn status(operation: &str, status: u16) -> TransferError {
    TransferError::Status {
        operation: operation.to_string(),
        status,
        body: String::new(),
    }
}

/// Scripted transfer client recording every call as `<name>:<step>`
pub struct FakeClient {
    pub name: String,
    pub events: EventLog,
    pub download_url: String,
    pub directory_status: Option<u16>,
    /// Calls answered with `directory_status` before it clears; `None` keeps failing
    pub directory_failures: Option<u32>,
    pub upload_status: Option<u16>,
    pub delete_status: Option<u16>,
    /// Cancelled from inside a successful `ensure_directory`
    pub cancel_on_directory: Option<CancellationToken>,
}

impl FakeClient {
    pub fn new(name: &str, events: &EventLog, server: &MockServer) -> Self {
        Self {
            name: name.to_string(),
            events: events.clone(),
            download_url: format!("{}/full", server.uri()),
            directory_status: None,
            directory_failures: None,
            upload_status: None,
            delete_status: None,
            cancel_on_directory: None,
        }
    }

    fn log(&self, step: &str) {
        self.events.lock().push(format!("{}:{}", self.name, step));
    }

    fn count(&self, step: &str) -> usize {
        let event = format!("{}:{}", self.name, step);
        self.events.lock().iter().filter(|e| **e == event).count()
    }
}

#[async_trait]
impl TransferClient for FakeClient {
    fn kind(&self) -> BackendKind {
        BackendKind::WebdavBasic
    }

    async fn ensure_directory(&self, _path: &str) -> TransferResult<()> {
        self.log("directory");
        if let Some(code) = self.directory_status {
            let failing = self
                .directory_failures
                .map_or(true, |times| self.count("directory") <= times as usize);
            if failing {
                return Err(status("create directory", code));
            }
        }
        if let Some(token) = &self.cancel_on_directory {
            token.cancel();
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        _path: &str,
        reader: &mut (dyn Read + Send),
        size: u64,
        chunk_size: u64,
    ) -> TransferResult<UploadReport> {
        self.log("upload");
        if let Some(code) = self.upload_status {
            return Err(status("upload", code));
        }
        let bytes = std::io::copy(reader, &mut std::io::sink())?;
        assert_eq!(bytes, size);
        Ok(UploadReport {
            bytes,
            chunks: chunk_count(size, chunk_size) as u32,
        })
    }

    async fn download_file(&self, _path: &str) -> TransferResult<Download> {
        self.log("download");
        let response = reqwest::get(&self.download_url)
            .await
            .map_err(|e| TransferError::transport("download", &e))?;
        Ok(Download::new(response))
    }

    async fn delete_file(&self, _path: &str) -> TransferResult<()> {
        self.log("delete");
        match self.delete_status {
            Some(code) => Err(status("delete", code)),
            None => Ok(()),
        }
    }

    async fn test_connection(&self) -> TransferResult<()> {
        self.log("connection");
        Ok(())
    }
}
