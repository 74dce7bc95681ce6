//! HTTP error types

use crate::types::HttpMethodError;
use std::error::Error as _;

/// Error type for HTTP operations
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Network error: {}", describe(.0))]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(#[from] HttpMethodError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Render a reqwest error with its whole source chain.
///
/// reqwest's own `Display` hides the cause ("error sending request"), while
/// the classifier needs words like "connection refused", "dns error" or
/// "certificate" that only appear further down the chain. The request URL is
/// left out since paths such as `/oauth2/token` would read as auth failures.
pub fn describe(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    if let Some(url) = error.url() {
        message = message
            .replace(&format!(" for url ({})", url), "")
            .replace(url.as_str(), "<url>");
    }

    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }

    if error.is_timeout() && !message.to_lowercase().contains("timeout") {
        message.push_str(" (timeout)");
    }

    message
}
