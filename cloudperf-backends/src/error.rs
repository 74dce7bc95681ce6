//! Transfer error types

use cloudperf_core::{classify, classify_response, ErrorCode, Operation};
use cloudperf_http::{body_snippet, describe, HttpError};
use cloudperf_resilience::RetryError;
use thiserror::Error;

pub type TransferResult<T> = Result<T, TransferError>;

/// Failure of one backend operation
#[derive(Debug, Error)]
pub enum TransferError {
    /// The server answered with an unexpected status
    #[error("{operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    /// The server rejected chunk assembly
    #[error("chunk assembly failed with status {status}: {body}")]
    Assembly { status: u16, body: String },

    /// The request never produced a response
    #[error("{operation} request failed: {message}")]
    Transport { operation: String, message: String },

    /// A chunked operation kept failing
    #[error("{operation} failed after {attempts} attempts: {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<TransferError>,
    },

    /// The token endpoint returned something unusable
    #[error("token refresh failed: {0}")]
    Token(String),

    /// A response body did not have the expected shape
    #[error("invalid {operation} response: {message}")]
    InvalidResponse { operation: String, message: String },

    /// Credentials do not fit the backend kind
    #[error("instance '{instance}' is misconfigured: {message}")]
    Misconfigured { instance: String, message: String },

    #[error("invalid remote path '{0}'")]
    InvalidPath(String),

    /// Reading the local test data failed
    #[error("failed to read test data: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    #[error(transparent)]
    Http(#[from] HttpError),
}

impl TransferError {
    /// Transport failure with the full reqwest cause chain
    pub fn transport(operation: impl Into<String>, error: &reqwest::Error) -> Self {
        TransferError::Transport {
            operation: operation.into(),
            message: describe(error),
        }
    }

    /// Status failure carrying an excerpt of the response body
    pub async fn from_response(operation: impl Into<String>, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        TransferError::Status {
            operation: operation.into(),
            status,
            body: body_snippet(response).await,
        }
    }

    /// HTTP status behind this failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            TransferError::Status { status, .. } | TransferError::Assembly { status, .. } => Some(*status),
            TransferError::Exhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            TransferError::Cancelled { .. } => true,
            TransferError::Exhausted { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Classified error code for reporting
    pub fn error_code(&self, operation: Operation) -> ErrorCode {
        match self {
            TransferError::Assembly { .. } => ErrorCode::ChunkAssemblyFailed,
            TransferError::Cancelled { .. } => ErrorCode::Cancelled,
            TransferError::Exhausted { source, .. } => source.error_code(operation),
            TransferError::Status { status, .. } => {
                classify_response(Some(*status), Some(self), operation.as_str())
            }
            other => classify(Some(other), operation.as_str()),
        }
    }

    /// Unwrap a retry outcome into a transfer error
    pub fn from_retry(error: RetryError<TransferError>) -> Self {
        match error {
            RetryError::Exhausted {
                operation,
                attempts,
                last_error,
            } => TransferError::Exhausted {
                operation,
                attempts,
                source: Box::new(last_error),
            },
            RetryError::NonRetryable(error) => error,
            RetryError::Cancelled { operation } => TransferError::Cancelled { operation },
        }
    }
}
