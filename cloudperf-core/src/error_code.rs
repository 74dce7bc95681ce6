//! Error classification
//!
//! Maps raw failures to a closed set of stable error codes. Classification is
//! a pure function of the error text and the operation name: the same inputs
//! always produce the same code, and every input produces some code.

use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;

/// Stable error code reported with every failed test step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    None,
    Http400BadRequest,
    Http401Unauthorized,
    Http403Forbidden,
    Http404NotFound,
    Http409Conflict,
    Http412PreconditionFailed,
    Http413PayloadTooLarge,
    Http429RateLimited,
    Http500ServerError,
    Http501NotImplemented,
    Http502BadGateway,
    Http503Unavailable,
    Http504Timeout,
    Http507InsufficientStorage,
    /// Any other 4xx status
    HttpClientError(u16),
    /// Any other 5xx status
    HttpServerError(u16),
    AuthFailed,
    TokenError,
    NetworkTimeout,
    NetworkConnectionError,
    NetworkDnsError,
    NetworkTlsError,
    PermissionDenied,
    QuotaExceeded,
    FileTooLarge,
    WebdavError,
    ChunkAssemblyFailed,
    IncompleteDownload,
    SizeMismatch,
    CircuitOpen,
    Cancelled,
    UploadFailed,
    DownloadFailed,
    DirectoryError,
    CleanupFailed,
    UnknownError,
}

impl ErrorCode {
    /// The wire representation of the code
    pub fn as_str(&self) -> Cow<'static, str> {
        let code = match self {
            ErrorCode::None => "none",
            ErrorCode::Http400BadRequest => "http_400_bad_request",
            ErrorCode::Http401Unauthorized => "http_401_unauthorized",
            ErrorCode::Http403Forbidden => "http_403_forbidden",
            ErrorCode::Http404NotFound => "http_404_not_found",
            ErrorCode::Http409Conflict => "http_409_conflict",
            ErrorCode::Http412PreconditionFailed => "http_412_precondition_failed",
            ErrorCode::Http413PayloadTooLarge => "http_413_payload_too_large",
            ErrorCode::Http429RateLimited => "http_429_rate_limited",
            ErrorCode::Http500ServerError => "http_500_server_error",
            ErrorCode::Http501NotImplemented => "http_501_not_implemented",
            ErrorCode::Http502BadGateway => "http_502_bad_gateway",
            ErrorCode::Http503Unavailable => "http_503_unavailable",
            ErrorCode::Http504Timeout => "http_504_timeout",
            ErrorCode::Http507InsufficientStorage => "http_507_insufficient_storage",
            ErrorCode::HttpClientError(status) => {
                return Cow::Owned(format!("http_{}_client_error", status))
            }
            ErrorCode::HttpServerError(status) => {
                return Cow::Owned(format!("http_{}_server_error", status))
            }
            ErrorCode::AuthFailed => "auth_failed",
            ErrorCode::TokenError => "token_error",
            ErrorCode::NetworkTimeout => "network_timeout",
            ErrorCode::NetworkConnectionError => "network_connection_error",
            ErrorCode::NetworkDnsError => "network_dns_error",
            ErrorCode::NetworkTlsError => "network_tls_error",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::QuotaExceeded => "quota_exceeded",
            ErrorCode::FileTooLarge => "file_too_large",
            ErrorCode::WebdavError => "webdav_error",
            ErrorCode::ChunkAssemblyFailed => "chunk_assembly_failed",
            ErrorCode::IncompleteDownload => "incomplete_download",
            ErrorCode::SizeMismatch => "size_mismatch",
            ErrorCode::CircuitOpen => "circuit_open",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::UploadFailed => "upload_failed",
            ErrorCode::DownloadFailed => "download_failed",
            ErrorCode::DirectoryError => "directory_error",
            ErrorCode::CleanupFailed => "cleanup_failed",
            ErrorCode::UnknownError => "unknown_error",
        };
        Cow::Borrowed(code)
    }

    /// Code for an HTTP status, `None` below 400
    pub fn from_status(status: u16) -> Option<Self> {
        let code = match status {
            400 => ErrorCode::Http400BadRequest,
            401 => ErrorCode::Http401Unauthorized,
            403 => ErrorCode::Http403Forbidden,
            404 => ErrorCode::Http404NotFound,
            409 => ErrorCode::Http409Conflict,
            412 => ErrorCode::Http412PreconditionFailed,
            413 => ErrorCode::Http413PayloadTooLarge,
            429 => ErrorCode::Http429RateLimited,
            500 => ErrorCode::Http500ServerError,
            501 => ErrorCode::Http501NotImplemented,
            502 => ErrorCode::Http502BadGateway,
            503 => ErrorCode::Http503Unavailable,
            504 => ErrorCode::Http504Timeout,
            507 => ErrorCode::Http507InsufficientStorage,
            400..=499 => ErrorCode::HttpClientError(status),
            500..=599 => ErrorCode::HttpServerError(status),
            _ => return None,
        };
        Some(code)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ErrorCode::None)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_str())
    }
}

/// Status numbers and phrases checked first, in order
const STATUS_PATTERNS: &[(&str, &[&str], ErrorCode)] = &[
    ("401", &["unauthorized"], ErrorCode::Http401Unauthorized),
    ("403", &["forbidden"], ErrorCode::Http403Forbidden),
    ("404", &["not found"], ErrorCode::Http404NotFound),
    ("409", &[], ErrorCode::Http409Conflict),
    ("412", &["precondition failed"], ErrorCode::Http412PreconditionFailed),
    ("413", &["payload too large"], ErrorCode::Http413PayloadTooLarge),
    ("429", &["too many requests"], ErrorCode::Http429RateLimited),
    ("500", &["internal server error"], ErrorCode::Http500ServerError),
    ("502", &["bad gateway"], ErrorCode::Http502BadGateway),
    ("503", &["service unavailable"], ErrorCode::Http503Unavailable),
    ("504", &["gateway timeout"], ErrorCode::Http504Timeout),
    ("507", &["insufficient storage"], ErrorCode::Http507InsufficientStorage),
];

/// Phrase groups checked after status patterns, in order
const PHRASE_PATTERNS: &[(&[&str], ErrorCode)] = &[
    (&["authentication", "auth"], ErrorCode::AuthFailed),
    (&["token", "oauth"], ErrorCode::TokenError),
    (&["timeout", "timed out", "deadline exceeded"], ErrorCode::NetworkTimeout),
    (&["connection refused", "connection reset"], ErrorCode::NetworkConnectionError),
    (&["no such host", "dns"], ErrorCode::NetworkDnsError),
    (&["tls", "ssl", "certificate"], ErrorCode::NetworkTlsError),
    (&["permission denied"], ErrorCode::PermissionDenied),
    (&["quota", "storage"], ErrorCode::QuotaExceeded),
    (&["file too large", "size limit"], ErrorCode::FileTooLarge),
    (&["webdav", "propfind"], ErrorCode::WebdavError),
    (&["move", "assembly"], ErrorCode::ChunkAssemblyFailed),
];

/// Classify an optional error; `ErrorCode::None` when there is no error
pub fn classify<E>(error: Option<&E>, operation: &str) -> ErrorCode
where
    E: fmt::Display + ?Sized,
{
    match error {
        Some(error) => classify_message(&error.to_string(), operation),
        None => ErrorCode::None,
    }
}

/// Classify with an optional HTTP status taking precedence when it is an
/// error status
pub fn classify_response<E>(status: Option<u16>, error: Option<&E>, operation: &str) -> ErrorCode
where
    E: fmt::Display + ?Sized,
{
    if let Some(code) = status.and_then(ErrorCode::from_status) {
        return code;
    }
    classify(error, operation)
}

/// Classify an error message for the given operation
pub fn classify_message(message: &str, operation: &str) -> ErrorCode {
    let message = message.to_lowercase();
    let tokens: Vec<&str> = message
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect();

    for (status, phrases, code) in STATUS_PATTERNS {
        if tokens.contains(status) || phrases.iter().any(|phrase| message.contains(phrase)) {
            return *code;
        }
    }

    if let Some(code) = status_after_keyword(&tokens) {
        return code;
    }

    for (phrases, code) in PHRASE_PATTERNS {
        if phrases.iter().any(|phrase| message.contains(phrase)) {
            return *code;
        }
    }

    fallback_for_operation(operation)
}

/// Finds `status <code>` style mentions of statuses outside the explicit table
fn status_after_keyword(tokens: &[&str]) -> Option<ErrorCode> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| **token == "status")
        .flat_map(|(index, _)| tokens.iter().skip(index + 1).take(3))
        .filter(|token| token.len() == 3)
        .filter_map(|token| token.parse::<u16>().ok())
        .find_map(ErrorCode::from_status)
}

fn fallback_for_operation(operation: &str) -> ErrorCode {
    let operation = operation.to_lowercase();
    if operation.contains("upload") {
        ErrorCode::UploadFailed
    } else if operation.contains("download") {
        ErrorCode::DownloadFailed
    } else if operation.contains("directory") || operation.contains("mkdir") {
        ErrorCode::DirectoryError
    } else if operation.contains("delete") || operation.contains("cleanup") {
        ErrorCode::CleanupFailed
    } else if operation.contains("auth") || operation.contains("token") {
        ErrorCode::AuthFailed
    } else {
        ErrorCode::UnknownError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_error_is_none() {
        assert_eq!(classify::<str>(None, "upload"), ErrorCode::None);
        assert_eq!(ErrorCode::None.as_str(), "none");
    }

    #[test]
    fn test_status_patterns_win_over_phrases() {
        let cases = [
            ("upload failed with status 401: token expired", ErrorCode::Http401Unauthorized),
            ("request forbidden by policy", ErrorCode::Http403Forbidden),
            ("GET returned 404", ErrorCode::Http404NotFound),
            ("PUT chunk failed with status 409", ErrorCode::Http409Conflict),
            ("status 412 precondition", ErrorCode::Http412PreconditionFailed),
            ("status 413", ErrorCode::Http413PayloadTooLarge),
            ("rate limit hit (429)", ErrorCode::Http429RateLimited),
            ("status 500 while moving", ErrorCode::Http500ServerError),
            ("502 bad gateway", ErrorCode::Http502BadGateway),
            ("oauth endpoint returned 503", ErrorCode::Http503Unavailable),
            ("504 gateway timeout", ErrorCode::Http504Timeout),
            ("507 insufficient storage", ErrorCode::Http507InsufficientStorage),
        ];
        for (message, expected) in cases {
            assert_eq!(classify_message(message, "upload"), expected, "{}", message);
        }
    }

    #[test]
    fn test_generic_statuses_after_keyword() {
        assert_eq!(
            classify_message("download failed with status 418: teapot", "download").as_str(),
            "http_418_client_error"
        );
        assert_eq!(
            classify_message("upload failed with status: 599", "upload").as_str(),
            "http_599_server_error"
        );
    }

    #[test]
    fn test_numbers_must_be_standalone_tokens() {
        // 1048576401 contains "401" but is not a status
        assert_eq!(
            classify_message("wrote 1048576401 bytes before failing", "upload"),
            ErrorCode::UploadFailed
        );
    }

    #[test]
    fn test_phrase_groups() {
        let cases = [
            ("authentication rejected", ErrorCode::AuthFailed),
            ("invalid token response", ErrorCode::TokenError),
            ("operation timed out", ErrorCode::NetworkTimeout),
            ("context deadline exceeded", ErrorCode::NetworkTimeout),
            ("tcp connect error: Connection refused (os error 111)", ErrorCode::NetworkConnectionError),
            ("connection reset by peer", ErrorCode::NetworkConnectionError),
            ("dial tcp: lookup example.invalid: no such host", ErrorCode::NetworkDnsError),
            ("invalid peer certificate: UnknownIssuer", ErrorCode::NetworkTlsError),
            ("permission denied", ErrorCode::PermissionDenied),
            ("quota reached", ErrorCode::QuotaExceeded),
            ("file too large for share", ErrorCode::FileTooLarge),
            ("propfind rejected", ErrorCode::WebdavError),
            ("chunk assembly rejected", ErrorCode::ChunkAssemblyFailed),
        ];
        for (message, expected) in cases {
            assert_eq!(classify_message(message, "upload"), expected, "{}", message);
        }
    }

    #[test]
    fn test_operation_fallbacks() {
        let cases = [
            ("upload", ErrorCode::UploadFailed),
            ("download", ErrorCode::DownloadFailed),
            ("directory", ErrorCode::DirectoryError),
            ("mkdir", ErrorCode::DirectoryError),
            ("delete", ErrorCode::CleanupFailed),
            ("cleanup", ErrorCode::CleanupFailed),
            ("token", ErrorCode::AuthFailed),
            ("probe", ErrorCode::UnknownError),
        ];
        for (operation, expected) in cases {
            assert_eq!(classify_message("something odd", operation), expected);
        }
    }

    #[test]
    fn test_classification_is_deterministic() {
        let message = "PUT chunk 00002 failed: error sending request";
        let first = classify_message(message, "upload");
        for _ in 0..10 {
            assert_eq!(classify_message(message, "upload"), first);
        }
    }

    #[test]
    fn test_response_status_takes_precedence() {
        let error = "connection refused";
        assert_eq!(
            classify_response(Some(400), Some(error), "upload"),
            ErrorCode::Http400BadRequest
        );
        assert_eq!(
            classify_response(Some(501), Some(error), "upload"),
            ErrorCode::Http501NotImplemented
        );
        assert_eq!(
            classify_response(Some(200), Some(error), "upload"),
            ErrorCode::NetworkConnectionError
        );
        assert_eq!(classify_response::<str>(Some(204), None, "upload"), ErrorCode::None);
    }

    #[test]
    fn test_serializes_as_wire_string() {
        let json = serde_json::to_string(&ErrorCode::HttpServerError(599)).unwrap();
        assert_eq!(json, "\"http_599_server_error\"");
        assert_eq!(ErrorCode::ChunkAssemblyFailed.to_string(), "chunk_assembly_failed");
    }
}
