use cloudperf_backends::webdav::DESKTOP_CLIENT_USER_AGENT;
use cloudperf_backends::{RandomStream, TransferClient, TransferError, WebDavClient, WebDavFlavor};
use cloudperf_core::{ErrorCode, Operation, MIB};
use cloudperf_http::{HttpClientConfig, HttpManager};
use cloudperf_resilience::{CancellationToken, RetryPolicy};
use std::io::Read;
use std::time::Duration;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FILES: &str = "/remote.php/dav/files/monitor";
const UPLOADS: &str = "/remote.php/dav/uploads/monitor";

fn client(server: &MockServer) -> WebDavClient {
    let http = HttpManager::new(HttpClientConfig::default()).unwrap();
    WebDavClient::new(http, &server.uri(), "monitor", "secret", CancellationToken::new())
        .with_chunk_retry(RetryPolicy::linear(2, Duration::from_millis(10)))
}

async fn mount_session(server: &MockServer) {
    Mock::given(method("MKCOL"))
        .and(path_regex(format!("^{}/[0-9a-f-]{{36}}$", UPLOADS)))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_chunked_upload_download_and_delete() {
    let server = MockServer::start().await;
    let size = 10 * MIB;
    let file = format!("{}/performance_tests/testfile_1.tmp", FILES);

    mount_session(&server).await;
    Mock::given(method("PUT"))
        .and(path_regex(format!("^{}/[0-9a-f-]{{36}}/0000[12]$", UPLOADS)))
        .and(header("content-type", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("MOVE"))
        .and(path_regex(format!("^{}/[0-9a-f-]{{36}}/\\.file$", UPLOADS)))
        .and(header("OC-Total-Length", "10485760"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(file.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; size as usize]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(file.as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let remote = "/performance_tests/testfile_1.tmp";
    let mut data = RandomStream::seeded(1).take(size);

    let report = client.upload_file(remote, &mut data, size, 5 * MIB).await.unwrap();
    assert_eq!(report.bytes, size);
    assert_eq!(report.chunks, 2);

    let received = client.download_file(remote).await.unwrap().drain().await.unwrap();
    assert_eq!(received, size);

    client.delete_file(remote).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let puts: Vec<_> = requests.iter().filter(|r| r.method.as_str() == "PUT").collect();
    assert!(puts[0].url.path().ends_with("/00001"));
    assert!(puts[1].url.path().ends_with("/00002"));
    assert!(puts.iter().all(|r| r.body.len() == 5 * MIB as usize));
    assert!(puts.iter().all(|r| r
        .headers
        .get("destination")
        .is_some_and(|value| value.to_str().unwrap().ends_with(&file))));

    let moved = requests.iter().find(|r| r.method.as_str() == "MOVE").unwrap();
    assert!(moved.headers.get("destination").unwrap().to_str().unwrap().ends_with(&file));
}

#[tokio::test]
async fn test_last_chunk_is_shorter() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(204))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("MOVE"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let mut data = RandomStream::seeded(2).take(12);
    let report = client(&server).upload_file("/t/a.tmp", &mut data, 12, 5).await.unwrap();
    assert_eq!(report.chunks, 3);

    let requests = server.received_requests().await.unwrap();
    let sizes: Vec<usize> = requests
        .iter()
        .filter(|r| r.method.as_str() == "PUT")
        .map(|r| r.body.len())
        .collect();
    assert_eq!(sizes, vec![5, 5, 2]);
}

#[tokio::test]
async fn test_existing_directory_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("MKCOL"))
        .and(path(format!("{}/performance_tests", FILES)))
        .respond_with(ResponseTemplate::new(405))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).ensure_directory("/performance_tests").await.unwrap();
}

#[tokio::test]
async fn test_directory_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("MKCOL"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let error = client(&server).ensure_directory("/performance_tests").await.unwrap_err();
    assert_eq!(error.status(), Some(403));
    assert_eq!(error.error_code(Operation::Directory), ErrorCode::Http403Forbidden);
}

#[tokio::test]
async fn test_failed_chunk_is_retried() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("MOVE"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let mut data = RandomStream::seeded(3).take(8);
    let report = client(&server).upload_file("/t/a.tmp", &mut data, 8, 8).await.unwrap();
    assert_eq!(report.chunks, 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.iter().filter(|r| r.method.as_str() == "PUT").count(), 3);
}

#[tokio::test]
async fn test_chunk_retries_are_bounded() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("MOVE"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let mut data = RandomStream::seeded(4).take(8);
    let error = client(&server).upload_file("/t/a.tmp", &mut data, 8, 4).await.unwrap_err();

    assert!(matches!(error, TransferError::Exhausted { attempts: 3, .. }));
    assert_eq!(error.error_code(Operation::Upload), ErrorCode::Http503Unavailable);
}

#[tokio::test]
async fn test_assembly_rejection_is_classified() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("MOVE"))
        .respond_with(ResponseTemplate::new(500).set_body_string("could not assemble"))
        .mount(&server)
        .await;

    let mut data = RandomStream::seeded(5).take(8);
    let error = client(&server).upload_file("/t/a.tmp", &mut data, 8, 4).await.unwrap_err();

    assert!(matches!(error, TransferError::Assembly { status: 500, .. }));
    assert_eq!(error.error_code(Operation::Upload), ErrorCode::ChunkAssemblyFailed);
}

#[tokio::test]
async fn test_session_rejection_stops_upload() {
    let server = MockServer::start().await;
    Mock::given(method("MKCOL"))
        .respond_with(ResponseTemplate::new(507))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let mut data = RandomStream::seeded(6).take(8);
    let error = client(&server).upload_file("/t/a.tmp", &mut data, 8, 4).await.unwrap_err();
    assert_eq!(error.error_code(Operation::Upload), ErrorCode::Http507InsufficientStorage);
}

#[tokio::test]
async fn test_desktop_flavor_headers_and_connection_test() {
    let server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .and(path(format!("{}/", FILES)))
        .and(header("depth", "0"))
        .respond_with(ResponseTemplate::new(207))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).with_flavor(WebDavFlavor::DesktopClient);
    client.test_connection().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let user_agent = requests[0].headers.get("user-agent").unwrap().to_str().unwrap();
    assert_eq!(user_agent, DESKTOP_CLIENT_USER_AGENT);
    assert!(requests[0].headers.get("authorization").is_some());
}

#[tokio::test]
async fn test_delete_expects_no_content() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let error = client(&server).delete_file("/t/a.tmp").await.unwrap_err();
    assert_eq!(error.error_code(Operation::Cleanup), ErrorCode::Http404NotFound);
}
