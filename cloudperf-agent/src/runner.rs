//! One transfer test against one instance
//!
//! `ensure_directory → upload → download → verify size → cleanup`. A failed
//! directory or upload step ends the run; a failed download still cleans up.
//! Cleanup failures are logged and never change the outcome.

use crate::metrics::MetricsSink;
use cloudperf_backends::{RandomStream, TransferClient, TransferError, TransferResult};
use cloudperf_config::InstanceConfig;
use cloudperf_core::{ErrorCode, Operation, TestResult};
use std::future::Future;
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Outcome of a full run
#[derive(Debug, Clone)]
pub struct TestRunReport {
    pub instance: String,
    pub service: String,
    pub success: bool,
    pub cancelled: bool,
    /// Code of the step that decided the outcome, `none` on success
    pub error_code: ErrorCode,
    pub error: Option<String>,
    /// Timed steps in execution order
    pub steps: Vec<TestResult>,
    pub duration: Duration,
}

impl TestRunReport {
    fn new(instance: &InstanceConfig) -> Self {
        Self {
            instance: instance.name.clone(),
            service: instance.service().to_string(),
            success: false,
            cancelled: false,
            error_code: ErrorCode::None,
            error: None,
            steps: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Report for a run that was never started
    pub fn skipped(instance: &InstanceConfig, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code: code,
            error: Some(message.into()),
            cancelled: code == ErrorCode::Cancelled,
            ..Self::new(instance)
        }
    }

    pub fn step(&self, operation: Operation) -> Option<&TestResult> {
        self.steps.iter().find(|step| step.operation == operation)
    }

    fn passed(&self, operation: Operation, duration: Duration, bytes: u64) -> TestResult {
        TestResult::success(&self.instance, &self.service, operation, duration, bytes)
    }

    fn failed(&self, operation: Operation, duration: Duration, code: ErrorCode) -> TestResult {
        TestResult::failure(&self.instance, &self.service, operation, duration, code)
    }

    fn fail(&mut self, code: ErrorCode, message: String) {
        if self.error.is_none() {
            self.error_code = code;
            self.error = Some(message);
        }
        self.success = false;
    }
}

/// Runs transfer tests and reports their steps
pub struct TestRunner {
    metrics: Arc<dyn MetricsSink>,
    test_directory: String,
}

impl TestRunner {
    pub fn new(metrics: Arc<dyn MetricsSink>, test_directory: impl Into<String>) -> Self {
        Self {
            metrics,
            test_directory: test_directory.into(),
        }
    }

    /// Unique remote path of a new test file
    pub fn test_file_path(&self) -> String {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        format!("{}/testfile_{}.tmp", self.test_directory.trim_end_matches('/'), nanos)
    }

    pub async fn run(
        &self,
        instance: &InstanceConfig,
        client: &dyn TransferClient,
        cancel: &CancellationToken,
    ) -> TestRunReport {
        let span = cloudperf_logging::instance_span(instance.service(), &instance.name);
        self.run_inner(instance, client, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        instance: &InstanceConfig,
        client: &dyn TransferClient,
        cancel: &CancellationToken,
    ) -> TestRunReport {
        let started = Instant::now();
        let mut report = TestRunReport::new(instance);
        let size = instance.file_size_bytes();
        let chunk_size = instance.chunk_size_bytes();

        info!(file_size = size, chunk_size, "Starting transfer test");

        if cancel.is_cancelled() {
            report.cancelled = true;
            report.fail(ErrorCode::Cancelled, "cancelled before start".to_string());
            return self.finish(report, started);
        }

        // Directory
        let step = Instant::now();
        if let Err(error) = cancellable(cancel, "create directory", client.ensure_directory(&self.test_directory)).await {
            self.record_failure(&mut report, Operation::Directory, step.elapsed(), &error);
            return self.finish(report, started);
        }
        let result = report.passed(Operation::Directory, step.elapsed(), 0);
        debug!(duration_ms = result.duration.as_millis() as u64, "Test directory ready");
        self.record(&mut report, result);

        // Upload
        let path = self.test_file_path();
        let step = Instant::now();
        let mut data = RandomStream::new().take(size);
        let uploaded = cancellable(cancel, "upload", client.upload_file(&path, &mut data, size, chunk_size)).await;
        match uploaded {
            Ok(upload) => {
                let result = report.passed(Operation::Upload, step.elapsed(), upload.bytes);
                info!(
                    path = %path,
                    bytes = upload.bytes,
                    chunks = upload.chunks,
                    duration_ms = result.duration.as_millis() as u64,
                    throughput_mib_s = result.throughput_mib_s().unwrap_or_default(),
                    "Upload completed"
                );
                self.metrics
                    .record_chunks(&report.service, &report.instance, upload.chunks, chunk_size);
                self.record(&mut report, result);
            }
            Err(error) => {
                self.record_failure(&mut report, Operation::Upload, step.elapsed(), &error);
                return self.finish(report, started);
            }
        }

        // Download and verify
        let step = Instant::now();
        let downloaded = cancellable(cancel, "download", async {
            let download = client.download_file(&path).await?;
            download.drain().await
        })
        .await;

        let mut download_ok = false;
        match downloaded {
            Ok(bytes) if bytes == size => {
                let result = report.passed(Operation::Download, step.elapsed(), bytes);
                info!(
                    bytes,
                    duration_ms = result.duration.as_millis() as u64,
                    throughput_mib_s = result.throughput_mib_s().unwrap_or_default(),
                    "Download completed"
                );
                self.record(&mut report, result);
                download_ok = true;
            }
            Ok(bytes) => {
                let code = if bytes < size {
                    ErrorCode::IncompleteDownload
                } else {
                    ErrorCode::SizeMismatch
                };
                let message = format!("downloaded {} bytes, expected {}", bytes, size);
                warn!(bytes, expected = size, error_code = %code, "Download size check failed");
                let result = report.failed(Operation::Download, step.elapsed(), code);
                self.record(&mut report, result);
                report.fail(code, message);
            }
            Err(error) => {
                self.record_failure(&mut report, Operation::Download, step.elapsed(), &error);
            }
        }

        // Cleanup runs even after a failed or cancelled download
        let step = Instant::now();
        match client.delete_file(&path).await {
            Ok(()) => {
                debug!(path = %path, "Test file deleted");
                let result = report.passed(Operation::Cleanup, step.elapsed(), 0);
                self.record(&mut report, result);
            }
            Err(error) => {
                let code = error.error_code(Operation::Cleanup);
                warn!(path = %path, error = %error, error_code = %code, "Failed to delete test file");
                let result = report.failed(Operation::Cleanup, step.elapsed(), code);
                self.record(&mut report, result);
            }
        }

        report.success = download_ok && !report.cancelled;
        self.finish(report, started)
    }

    fn record(&self, report: &mut TestRunReport, result: TestResult) {
        self.metrics.record_test(&result);
        report.steps.push(result);
    }

    fn record_failure(&self, report: &mut TestRunReport, operation: Operation, duration: Duration, error: &TransferError) {
        let code = error.error_code(operation);
        if error.is_cancelled() {
            report.cancelled = true;
        }
        warn!(operation = %operation, error = %error, error_code = %code, "Transfer step failed");
        let result = report.failed(operation, duration, code);
        self.record(report, result);
        report.fail(code, error.to_string());
    }

    fn finish(&self, mut report: TestRunReport, started: Instant) -> TestRunReport {
        report.duration = started.elapsed();
        info!(
            success = report.success,
            cancelled = report.cancelled,
            error_code = %report.error_code,
            duration_ms = report.duration.as_millis() as u64,
            "Transfer test finished"
        );
        report
    }
}

/// Race a step against cancellation
async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: &str,
    step: impl Future<Output = TransferResult<T>>,
) -> TransferResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled {
            operation: operation.to_string(),
        }),
        result = step => result,
    }
}
