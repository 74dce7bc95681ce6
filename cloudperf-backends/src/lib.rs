//! Transfer clients for the monitored storage backends
//!
//! Every backend implements [`TransferClient`]: create the test directory,
//! upload a file in sequential chunks, download it again and delete it.
//! [`BackendClient`] is the closed set of supported backends, built from an
//! [`InstanceConfig`](cloudperf_config::InstanceConfig).
//!
//! - [`webdav`]: chunked WebDAV uploads (MKCOL session, PUT chunks, MOVE)
//! - [`oauth::dropbox`]: session-cursor uploads behind OAuth2
//! - [`oauth::hidrive_legacy`]: create-then-PATCH uploads behind OAuth2

pub mod backend;
pub mod client;
pub mod error;
pub mod oauth;
pub mod random;
pub mod webdav;

pub use backend::BackendClient;
pub use client::{chunk_count, Download, TransferClient, UploadReport};
pub use error::{TransferError, TransferResult};
pub use oauth::{DropboxClient, DropboxEndpoints, HidriveEndpoints, HidriveLegacyClient, OAuthSession, TokenEndpoint};
pub use random::RandomStream;
pub use webdav::{TransferSession, WebDavClient, WebDavFlavor};
