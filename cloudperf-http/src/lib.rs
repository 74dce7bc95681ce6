//! HTTP client functionality for cloudperf
//!
//! Every transfer client shares one [`HttpManager`], which owns two pooled
//! `reqwest` clients: one with the ordinary request timeout and one with the
//! extended timeout used while a server assembles uploaded chunks.

pub mod client;
pub mod config;
pub mod errors;
pub mod response;
pub mod types;

// Re-export main types for convenience
pub use client::{build_client, HttpManager};
pub use config::HttpClientConfig;
pub use errors::{describe, HttpError};
pub use response::{body_snippet, drain_body};
pub use types::{HttpMethod, HttpMethodError};
