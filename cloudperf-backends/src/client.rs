//! The transfer client capability shared by every backend

use crate::error::{TransferError, TransferResult};
use async_trait::async_trait;
use bytes::Bytes;
use cloudperf_core::BackendKind;
use cloudperf_http::drain_body;
use std::io::Read;

/// Outcome of a completed upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    /// Bytes sent to the backend
    pub bytes: u64,
    /// Requests that carried file data
    pub chunks: u32,
}

/// An open download whose body has not been read yet
#[derive(Debug)]
pub struct Download {
    response: reqwest::Response,
}

impl Download {
    pub fn new(response: reqwest::Response) -> Self {
        Self { response }
    }

    /// Length announced by the server, if any
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// Read the whole body, returning the number of bytes received
    pub async fn drain(self) -> TransferResult<u64> {
        drain_body(self.response)
            .await
            .map_err(|e| TransferError::transport("download body", &e))
    }
}

/// One backend's implementation of the test sequence
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Backend protocol family
    fn kind(&self) -> BackendKind;

    /// Make sure `path` exists as a directory
    async fn ensure_directory(&self, path: &str) -> TransferResult<()>;

    /// Upload `size` bytes read from `reader` to `path`, `chunk_size` bytes at a time
    async fn upload_file(
        &self,
        path: &str,
        reader: &mut (dyn Read + Send),
        size: u64,
        chunk_size: u64,
    ) -> TransferResult<UploadReport>;

    /// Start downloading `path`; the caller drains and verifies the body
    async fn download_file(&self, path: &str) -> TransferResult<Download>;

    /// Delete `path`
    async fn delete_file(&self, path: &str) -> TransferResult<()>;

    /// Cheap authenticated request proving credentials and reachability
    async fn test_connection(&self) -> TransferResult<()>;
}

/// Number of chunks needed for `size` bytes
pub fn chunk_count(size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size)
}

/// Read exactly `len` bytes of test data
pub(crate) fn read_chunk(reader: &mut (dyn Read + Send), len: u64) -> TransferResult<Bytes> {
    let len = usize::try_from(len)
        .map_err(|_| TransferError::Io(std::io::Error::other("chunk does not fit in memory")))?;
    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer)?;
    Ok(Bytes::from(buffer))
}

/// Split a remote file path into its parent directory and file name
pub(crate) fn split_path(path: &str) -> TransferResult<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, name)) if name.is_empty() => Err(TransferError::InvalidPath(path.to_string())),
        Some(("", name)) => Ok(("/", name)),
        Some((dir, name)) => Ok((dir, name)),
        None if !trimmed.is_empty() => Ok(("/", trimmed)),
        None => Err(TransferError::InvalidPath(path.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_chunk_count_rounds_up() {
        let mib = 1024 * 1024;
        assert_eq!(chunk_count(10 * mib, 5 * mib), 2);
        assert_eq!(chunk_count(10 * mib, 3 * mib), 4);
        assert_eq!(chunk_count(10 * mib, 10 * mib), 1);
        assert_eq!(chunk_count(1, 5 * mib), 1);
        assert_eq!(chunk_count(10, 0), 0);
    }

    #[test]
    fn test_read_chunk_reports_short_input() {
        let mut reader = Cursor::new(vec![1u8; 10]);
        assert_eq!(read_chunk(&mut reader, 6).unwrap().len(), 6);
        assert!(matches!(read_chunk(&mut reader, 6), Err(TransferError::Io(_))));
    }

    #[test]
    fn test_split_path() {
        assert_eq!(
            split_path("/performance_tests/testfile_1.tmp").unwrap(),
            ("/performance_tests", "testfile_1.tmp")
        );
        assert_eq!(split_path("/top.tmp").unwrap(), ("/", "top.tmp"));
        assert_eq!(split_path("plain.tmp").unwrap(), ("/", "plain.tmp"));
        assert!(split_path("").is_err());
    }
}
