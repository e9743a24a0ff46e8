//! Resource store tests: the resumable download protocol end to end
//! against a mock HTTP server.

use std::path::PathBuf;

use goodata_server::catalog::Resource;
use goodata_server::store::{FsResourceStore, ResourceStore, StoreError};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PACKAGE_ID: &str = "5f8bbd59-2201-4dc9-b31b-616b94b7e44d";
const RESOURCE_ID: &str = "91f0f564-8b3c-40a6-9a14-38b56e266c15";

fn resource(server_url: &str) -> Resource {
    serde_json::from_value(serde_json::json!({
        "id": RESOURCE_ID,
        "package_id": PACKAGE_ID,
        "name": "OD_FIRME.CSV",
        "url": format!("{}/od_firme.csv", server_url)
    }))
    .unwrap()
}

fn final_path(dir: &TempDir) -> PathBuf {
    dir.path().join(PACKAGE_ID).join("OD_FIRME.CSV")
}

fn temp_path(dir: &TempDir) -> PathBuf {
    dir.path().join(PACKAGE_ID).join("OD_FIRME.CSV.tmp")
}

#[tokio::test]
async fn test_fresh_download() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/od_firme.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("header^row\n1^ACME\n"))
        .expect(1)
        .mount(&server)
        .await;

    let store = FsResourceStore::new(dir.path()).unwrap();
    store
        .save(&resource(&server.uri()), &CancellationToken::new())
        .await
        .unwrap();

    let contents = std::fs::read_to_string(final_path(&dir)).unwrap();
    assert_eq!(contents, "header^row\n1^ACME\n");
    assert!(!temp_path(&dir).exists());
}

#[tokio::test]
async fn test_save_is_idempotent_without_network_io() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let final_file = final_path(&dir);
    std::fs::create_dir_all(final_file.parent().unwrap()).unwrap();
    std::fs::write(&final_file, "already here").unwrap();

    let store = FsResourceStore::new(dir.path()).unwrap();
    store
        .save(&resource(&server.uri()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&final_file).unwrap(), "already here");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resume_appends_after_partial_download() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let temp_file = temp_path(&dir);
    std::fs::create_dir_all(temp_file.parent().unwrap()).unwrap();
    std::fs::write(&temp_file, "AAAAA").unwrap();

    Mock::given(method("GET"))
        .and(path("/od_firme.csv"))
        .and(header("Range", "bytes=5-"))
        .respond_with(ResponseTemplate::new(206).set_body_string("BBBBB"))
        .expect(1)
        .mount(&server)
        .await;

    let store = FsResourceStore::new(dir.path()).unwrap();
    store
        .save(&resource(&server.uri()), &CancellationToken::new())
        .await
        .unwrap();

    // No gap bytes: prefix from the first attempt, suffix from the resume.
    assert_eq!(
        std::fs::read_to_string(final_path(&dir)).unwrap(),
        "AAAAABBBBB"
    );
    assert!(!temp_file.exists());
}

#[tokio::test]
async fn test_server_ignoring_range_restarts_from_scratch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let temp_file = temp_path(&dir);
    std::fs::create_dir_all(temp_file.parent().unwrap()).unwrap();
    std::fs::write(&temp_file, "AAAAA").unwrap();

    Mock::given(method("GET"))
        .and(path("/od_firme.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("CCCCCCCCCC"))
        .mount(&server)
        .await;

    let store = FsResourceStore::new(dir.path()).unwrap();
    store
        .save(&resource(&server.uri()), &CancellationToken::new())
        .await
        .unwrap();

    // The stale 5-byte prefix is discarded, not prepended.
    assert_eq!(
        std::fs::read_to_string(final_path(&dir)).unwrap(),
        "CCCCCCCCCC"
    );
}

#[tokio::test]
async fn test_range_not_satisfiable_means_complete() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let temp_file = temp_path(&dir);
    std::fs::create_dir_all(temp_file.parent().unwrap()).unwrap();
    std::fs::write(&temp_file, "COMPLETE").unwrap();

    Mock::given(method("GET"))
        .and(path("/od_firme.csv"))
        .respond_with(ResponseTemplate::new(416))
        .mount(&server)
        .await;

    let store = FsResourceStore::new(dir.path()).unwrap();
    store
        .save(&resource(&server.uri()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(final_path(&dir)).unwrap(),
        "COMPLETE"
    );
    assert!(!temp_file.exists());
}

#[tokio::test]
async fn test_unexpected_status_is_an_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/od_firme.csv"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = FsResourceStore::new(dir.path()).unwrap();
    let error = store
        .save(&resource(&server.uri()), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, StoreError::UnexpectedStatus(status) if status.as_u16() == 503));
    assert!(!final_path(&dir).exists());
}

#[tokio::test]
async fn test_missing_package_id_is_rejected_before_any_request() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let mut resource = resource(&server.uri());
    resource.package_id = None;

    let store = FsResourceStore::new(dir.path()).unwrap();
    let error = store
        .save(&resource, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, StoreError::InvalidResource(id) if id == Uuid::parse_str(RESOURCE_ID).unwrap()));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancellation_preserves_temp_file_and_resume_completes() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/od_firme.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("FULL CONTENT"))
        .mount(&server)
        .await;

    let store = FsResourceStore::new(dir.path()).unwrap();

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let error = store
        .save(&resource(&server.uri()), &cancelled)
        .await
        .unwrap_err();
    assert!(matches!(error, StoreError::Cancelled));

    // The partial file survives the cancellation...
    assert!(temp_path(&dir).exists());
    assert!(!final_path(&dir).exists());

    // ...and the next attempt finishes the download.
    store
        .save(&resource(&server.uri()), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(final_path(&dir)).unwrap(),
        "FULL CONTENT"
    );
}

#[tokio::test]
async fn test_open_streams_the_final_file() {
    use tokio::io::AsyncReadExt;

    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let final_file = final_path(&dir);
    std::fs::create_dir_all(final_file.parent().unwrap()).unwrap();
    std::fs::write(&final_file, "cod^denumire\n").unwrap();

    let store = FsResourceStore::new(dir.path()).unwrap();
    let mut reader = store.open(&resource(&server.uri())).await.unwrap();

    let mut contents = String::new();
    reader.read_to_string(&mut contents).await.unwrap();
    assert_eq!(contents, "cod^denumire\n");
}
