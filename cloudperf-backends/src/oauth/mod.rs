//! OAuth2 REST backends
//!
//! Both REST backends share [`OAuthSession`], which owns the token state and
//! replays a request once when the provider rejects the access token.

pub mod dropbox;
pub mod hidrive_legacy;
pub mod token;

pub use dropbox::{DropboxClient, DropboxEndpoints, SIMPLE_UPLOAD_LIMIT};
pub use hidrive_legacy::{HidriveEndpoints, HidriveLegacyClient};
pub use token::{ClientAuthStyle, OAuthSession, TokenEndpoint, TokenResponse, TokenState};
