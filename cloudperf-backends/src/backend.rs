//! Construction of transfer clients from instance configuration

use crate::client::{Download, TransferClient, UploadReport};
use crate::error::{TransferError, TransferResult};
use crate::oauth::{DropboxClient, DropboxEndpoints, HidriveEndpoints, HidriveLegacyClient};
use crate::webdav::{WebDavClient, WebDavFlavor};
use async_trait::async_trait;
use cloudperf_config::{Credentials, InstanceConfig};
use cloudperf_core::BackendKind;
use cloudperf_http::HttpManager;
use std::io::Read;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Service whose WebDAV endpoint is used with plain client headers
const PLAIN_WEBDAV_SERVICE: &str = "hidrive";

/// The closed set of supported backends
pub enum BackendClient {
    WebDav(WebDavClient),
    Dropbox(DropboxClient),
    HidriveLegacy(HidriveLegacyClient),
}

impl BackendClient {
    /// Build the client for one instance. HiDrive legacy fetches its first
    /// access token here, so this can fail on network or credential errors.
    pub async fn build(
        instance: &InstanceConfig,
        http: &HttpManager,
        cancel: CancellationToken,
    ) -> TransferResult<Self> {
        let misconfigured = || TransferError::Misconfigured {
            instance: instance.name.clone(),
            message: format!(
                "{} credentials cannot be used with {}",
                instance.credentials.kind(),
                instance.kind
            ),
        };

        let client = match (instance.kind, &instance.credentials) {
            (BackendKind::WebdavBasic, Credentials::Basic { username, password }) => BackendClient::WebDav(
                WebDavClient::new(http.clone(), &instance.url, username, password, cancel)
                    .with_flavor(webdav_flavor(instance.service())),
            ),
            (
                BackendKind::WebdavAnid,
                Credentials::Anid {
                    username,
                    password,
                    anid,
                },
            ) => BackendClient::WebDav(
                WebDavClient::new(http.clone(), &instance.url, username, password, cancel)
                    .with_anid(anid)
                    .with_flavor(webdav_flavor(instance.service())),
            ),
            (
                BackendKind::Oauth2Dropbox,
                Credentials::DropboxOauth {
                    refresh_token,
                    app_key,
                    app_secret,
                },
            ) => BackendClient::Dropbox(DropboxClient::new(
                http.clone(),
                DropboxEndpoints::from_base(&instance.url),
                refresh_token,
                app_key,
                app_secret,
                cancel,
            )),
            (
                BackendKind::Oauth2HidriveLegacy,
                Credentials::HidriveOauth {
                    refresh_token,
                    client_id,
                    client_secret,
                },
            ) => BackendClient::HidriveLegacy(
                HidriveLegacyClient::connect(
                    http.clone(),
                    HidriveEndpoints::from_base(&instance.url),
                    refresh_token,
                    client_id,
                    client_secret,
                    cancel,
                )
                .await?,
            ),
            _ => return Err(misconfigured()),
        };

        debug!(instance = %instance.name, kind = %instance.kind, "Built transfer client");
        Ok(client)
    }

    pub fn as_transfer(&self) -> &dyn TransferClient {
        match self {
            BackendClient::WebDav(client) => client,
            BackendClient::Dropbox(client) => client,
            BackendClient::HidriveLegacy(client) => client,
        }
    }
}

#[async_trait]
impl TransferClient for BackendClient {
    fn kind(&self) -> BackendKind {
        self.as_transfer().kind()
    }

    async fn ensure_directory(&self, path: &str) -> TransferResult<()> {
        self.as_transfer().ensure_directory(path).await
    }

    async fn upload_file(
        &self,
        path: &str,
        reader: &mut (dyn Read + Send),
        size: u64,
        chunk_size: u64,
    ) -> TransferResult<UploadReport> {
        self.as_transfer().upload_file(path, reader, size, chunk_size).await
    }

    async fn download_file(&self, path: &str) -> TransferResult<Download> {
        self.as_transfer().download_file(path).await
    }

    async fn delete_file(&self, path: &str) -> TransferResult<()> {
        self.as_transfer().delete_file(path).await
    }

    async fn test_connection(&self) -> TransferResult<()> {
        self.as_transfer().test_connection().await
    }
}

fn webdav_flavor(service: &str) -> WebDavFlavor {
    if service.eq_ignore_ascii_case(PLAIN_WEBDAV_SERVICE) {
        WebDavFlavor::Plain
    } else {
        WebDavFlavor::DesktopClient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn instance(kind: BackendKind, credentials: Credentials) -> InstanceConfig {
        InstanceConfig {
            name: "nc-1".to_string(),
            service: "nextcloud".to_string(),
            kind,
            url: "https://cloud.example.com".to_string(),
            credentials,
            file_size_mb: 10,
            chunk_size_mb: 5,
            interval: Duration::from_secs(300),
        }
    }

    #[tokio::test]
    async fn test_build_matches_credentials_to_kind() {
        let http = HttpManager::new(Default::default()).unwrap();
        let basic = Credentials::Basic {
            username: "monitor".to_string(),
            password: "secret".to_string(),
        };

        let client = BackendClient::build(&instance(BackendKind::WebdavBasic, basic.clone()), &http, CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(client, BackendClient::WebDav(_)));
        assert_eq!(client.kind(), BackendKind::WebdavBasic);

        let error = BackendClient::build(&instance(BackendKind::Oauth2Dropbox, basic), &http, CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(error, TransferError::Misconfigured { .. }));
    }

    #[tokio::test]
    async fn test_dropbox_builds_without_network() {
        let http = HttpManager::new(Default::default()).unwrap();
        let credentials = Credentials::DropboxOauth {
            refresh_token: "r".to_string(),
            app_key: "k".to_string(),
            app_secret: "s".to_string(),
        };
        let mut config = instance(BackendKind::Oauth2Dropbox, credentials);
        config.url = "https://api.dropboxapi.com".to_string();

        let client = BackendClient::build(&config, &http, CancellationToken::new()).await.unwrap();
        match client {
            BackendClient::Dropbox(dropbox) => {
                assert_eq!(dropbox.endpoints(), &DropboxEndpoints::production());
                assert_eq!(dropbox.session().refresh_count(), 0);
            }
            _ => panic!("expected a Dropbox client"),
        }
    }

    #[test]
    fn test_webdav_flavor_by_service() {
        assert_eq!(webdav_flavor("nextcloud"), WebDavFlavor::DesktopClient);
        assert_eq!(webdav_flavor("magentacloud"), WebDavFlavor::DesktopClient);
        assert_eq!(webdav_flavor("hidrive"), WebDavFlavor::Plain);
    }
}
