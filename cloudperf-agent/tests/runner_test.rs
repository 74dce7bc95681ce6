mod common;

use cloudperf_agent::{InMemoryMetrics, TestRunner};
use cloudperf_core::{ErrorCode, Operation, MIB};
use common::{download_server, instance, EventLog, FakeClient};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn runner(metrics: &Arc<InMemoryMetrics>) -> TestRunner {
    TestRunner::new(metrics.clone(), "/performance_tests")
}

#[tokio::test]
async fn test_successful_run_records_every_step() {
    let server = download_server().await;
    let events = EventLog::default();
    let metrics = Arc::new(InMemoryMetrics::new());
    let client = FakeClient::new("nc-1", &events, &server);

    let report = runner(&metrics)
        .run(&instance("nc-1"), &client, &CancellationToken::new())
        .await;

    assert!(report.success);
    assert!(!report.cancelled);
    assert_eq!(report.error_code, ErrorCode::None);
    assert_eq!(
        *events.lock(),
        vec!["nc-1:directory", "nc-1:upload", "nc-1:download", "nc-1:delete"]
    );

    let upload = report.step(Operation::Upload).unwrap();
    assert!(upload.success);
    assert_eq!(upload.bytes, MIB);
    assert!(upload.throughput_mib_s().is_some());
    assert!(report.step(Operation::Download).unwrap().success);
    assert!(report.step(Operation::Cleanup).unwrap().success);
    assert!(report.step(Operation::Directory).unwrap().success);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.tests.len(), 4);
    assert_eq!(snapshot.chunks, vec![("nc-1".to_string(), 1, MIB)]);
}

#[tokio::test]
async fn test_upload_failure_skips_download_and_cleanup() {
    let server = download_server().await;
    let events = EventLog::default();
    let metrics = Arc::new(InMemoryMetrics::new());
    let client = FakeClient {
        upload_status: Some(507),
        ..FakeClient::new("nc-1", &events, &server)
    };

    let report = runner(&metrics)
        .run(&instance("nc-1"), &client, &CancellationToken::new())
        .await;

    assert!(!report.success);
    assert_eq!(report.error_code, ErrorCode::Http507InsufficientStorage);
    assert_eq!(*events.lock(), vec!["nc-1:directory", "nc-1:upload"]);

    let upload = report.step(Operation::Upload).unwrap();
    assert!(!upload.success);
    assert!(upload.throughput_mib_s().is_none());
    assert!(metrics.snapshot().chunks.is_empty());
}

#[tokio::test]
async fn test_directory_failure_ends_run() {
    let server = download_server().await;
    let events = EventLog::default();
    let metrics = Arc::new(InMemoryMetrics::new());
    let client = FakeClient {
        directory_status: Some(403),
        ..FakeClient::new("nc-1", &events, &server)
    };

    let report = runner(&metrics)
        .run(&instance("nc-1"), &client, &CancellationToken::new())
        .await;

    assert!(!report.success);
    assert_eq!(report.error_code, ErrorCode::Http403Forbidden);
    assert_eq!(*events.lock(), vec!["nc-1:directory"]);
    assert_eq!(report.steps.len(), 1);
}

#[tokio::test]
async fn test_short_download_is_incomplete_and_still_cleaned_up() {
    let server = download_server().await;
    let events = EventLog::default();
    let metrics = Arc::new(InMemoryMetrics::new());
    let client = FakeClient {
        download_url: format!("{}/short", server.uri()),
        ..FakeClient::new("nc-1", &events, &server)
    };

    let report = runner(&metrics)
        .run(&instance("nc-1"), &client, &CancellationToken::new())
        .await;

    assert!(!report.success);
    assert_eq!(report.error_code, ErrorCode::IncompleteDownload);
    assert_eq!(
        report.step(Operation::Download).unwrap().error_code,
        ErrorCode::IncompleteDownload
    );
    assert!(events.lock().contains(&"nc-1:delete".to_string()));
    assert!(report.step(Operation::Cleanup).unwrap().success);
}

#[tokio::test]
async fn test_long_download_is_size_mismatch() {
    let server = download_server().await;
    let events = EventLog::default();
    let metrics = Arc::new(InMemoryMetrics::new());
    let client = FakeClient {
        download_url: format!("{}/long", server.uri()),
        ..FakeClient::new("nc-1", &events, &server)
    };

    let report = runner(&metrics)
        .run(&instance("nc-1"), &client, &CancellationToken::new())
        .await;

    assert!(!report.success);
    assert_eq!(report.error_code, ErrorCode::SizeMismatch);
}

#[tokio::test]
async fn test_cleanup_failure_keeps_success() {
    let server = download_server().await;
    let events = EventLog::default();
    let metrics = Arc::new(InMemoryMetrics::new());
    let client = FakeClient {
        delete_status: Some(500),
        ..FakeClient::new("nc-1", &events, &server)
    };

    let report = runner(&metrics)
        .run(&instance("nc-1"), &client, &CancellationToken::new())
        .await;

    assert!(report.success);
    assert_eq!(report.error_code, ErrorCode::None);
    let cleanup = report.step(Operation::Cleanup).unwrap();
    assert!(!cleanup.success);
    assert_eq!(cleanup.error_code, ErrorCode::Http500ServerError);
}

#[tokio::test]
async fn test_cancellation_stops_run() {
    let server = download_server().await;
    let events = EventLog::default();
    let metrics = Arc::new(InMemoryMetrics::new());
    let cancel = CancellationToken::new();
    let client = FakeClient {
        cancel_on_directory: Some(cancel.clone()),
        ..FakeClient::new("nc-1", &events, &server)
    };

    let report = runner(&metrics).run(&instance("nc-1"), &client, &cancel).await;

    assert!(!report.success);
    assert!(report.cancelled);
    assert_eq!(report.error_code, ErrorCode::Cancelled);
    assert_eq!(*events.lock(), vec!["nc-1:directory"]);

    let report = runner(&metrics).run(&instance("nc-1"), &client, &cancel).await;
    assert!(report.cancelled);
    assert!(report.steps.is_empty());
}

#[test]
fn test_file_paths_are_unique_and_inside_test_directory() {
    let runner = TestRunner::new(Arc::new(InMemoryMetrics::new()), "/performance_tests/");
    let first = runner.test_file_path();
    std::thread::sleep(std::time::Duration::from_millis(1));
    let second = runner.test_file_path();

    assert!(first.starts_with("/performance_tests/testfile_"));
    assert!(first.ends_with(".tmp"));
    assert_ne!(first, second);
}
