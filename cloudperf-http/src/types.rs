//! HTTP methods spoken by the transfer clients

use thiserror::Error;

/// Standard methods plus the WebDAV extensions used for chunked uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Put,
    Delete,
    Mkcol,
    Move,
    Propfind,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Mkcol => "MKCOL",
            HttpMethod::Move => "MOVE",
            HttpMethod::Propfind => "PROPFIND",
        }
    }
}

impl TryFrom<HttpMethod> for reqwest::Method {
    type Error = HttpMethodError;

    fn try_from(method: HttpMethod) -> Result<Self, Self::Error> {
        match method {
            HttpMethod::Get => Ok(reqwest::Method::GET),
            HttpMethod::Put => Ok(reqwest::Method::PUT),
            HttpMethod::Delete => Ok(reqwest::Method::DELETE),
            extension => reqwest::Method::from_bytes(extension.as_str().as_bytes())
                .map_err(|_| HttpMethodError::InvalidMethod(extension.as_str().to_string())),
        }
    }
}

/// A method reqwest refuses to build
#[derive(Error, Debug, Clone)]
pub enum HttpMethodError {
    #[error("Invalid HTTP method: '{0}'")]
    InvalidMethod(String),
}
