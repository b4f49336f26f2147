//! `POST /`: download, validate, scan and store an origin resource.

mod helpers;

use helpers::{
    closed_port, dir_entries, png_bytes, setup_test_app, setup_test_app_with, spawn_fake_clamd,
    FILES_BASE_URL,
};
use serde_json::json;

async fn origin_serving(body: Vec<u8>, status: usize) -> (mockito::ServerGuard, mockito::Mock) {
    let mut origin = mockito::Server::new_async().await;
    let mock = origin
        .mock("GET", "/media/cat.png")
        .with_status(status)
        .with_header("content-type", "application/octet-stream")
        .with_body(body)
        .create_async()
        .await;
    (origin, mock)
}

fn upload_body(media_type: &str, origin_url: &str) -> serde_json::Value {
    json!({ "mediaType": media_type, "originUrl": origin_url })
}

#[tokio::test]
async fn stores_valid_media_and_serves_it_back() {
    let app = setup_test_app().await;
    let data = png_bytes(4096);
    let (origin, mock) = origin_serving(data.clone(), 200).await;

    let response = app
        .client()
        .post("/")
        .json(&upload_body("IMAGE", &format!("{}/media/cat.png", origin.url())))
        .await;

    assert_eq!(response.status_code(), 201);
    mock.assert_async().await;

    let body: serde_json::Value = response.json();
    let name = body["storedFilename"].as_str().unwrap().to_string();
    assert!(name.ends_with(".png"));
    assert_eq!(body["storedUrl"], format!("{}/{}", FILES_BASE_URL, name));
    assert_eq!(response.header("location"), body["storedUrl"].as_str().unwrap());

    let served = app.client().get(&format!("/{}", name)).await;
    assert_eq!(served.status_code(), 200);
    assert_eq!(served.as_bytes().as_ref(), data.as_slice());

    assert_eq!(dir_entries(&app.staging_dir()).await, 0);
}

#[tokio::test]
async fn rejects_content_that_does_not_match_declared_type() {
    let app = setup_test_app().await;
    let (origin, _mock) = origin_serving(png_bytes(512), 200).await;

    let response = app
        .client()
        .post("/")
        .json(&upload_body("VIDEO", &format!("{}/media/cat.png", origin.url())))
        .await;

    assert_eq!(response.status_code(), 415);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_MIME_TYPE");
    assert_eq!(body["recoverable"], false);
    assert_eq!(dir_entries(&app.media_dir()).await, 0);
}

#[tokio::test]
async fn rejects_empty_origin_body() {
    let app = setup_test_app().await;
    let (origin, _mock) = origin_serving(Vec::new(), 200).await;

    let response = app
        .client()
        .post("/")
        .json(&upload_body("IMAGE", &format!("{}/media/cat.png", origin.url())))
        .await;

    assert_eq!(response.status_code(), 422);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_SIZE");
}

#[tokio::test]
async fn rejects_file_of_exactly_max_size() {
    let app = setup_test_app_with(&[("MAX_FILE_SIZE_MB", "1")]).await;
    let (origin, _mock) = origin_serving(png_bytes(1024 * 1024), 200).await;

    let response = app
        .client()
        .post("/")
        .json(&upload_body("IMAGE", &format!("{}/media/cat.png", origin.url())))
        .await;

    assert_eq!(response.status_code(), 422);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_SIZE");
    assert_eq!(dir_entries(&app.media_dir()).await, 0);
    assert_eq!(dir_entries(&app.staging_dir()).await, 0);
}

#[tokio::test]
async fn origin_errors_are_retryable_download_failures() {
    let app = setup_test_app().await;
    let (origin, _mock) = origin_serving(Vec::new(), 404).await;

    let response = app
        .client()
        .post("/")
        .json(&upload_body("IMAGE", &format!("{}/media/cat.png", origin.url())))
        .await;

    assert_eq!(response.status_code(), 502);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "DOWNLOAD_FAILED");
    assert_eq!(body["recoverable"], true);
}

#[tokio::test]
async fn rejects_unsupported_url_schemes() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .post("/")
        .json(&upload_body("IMAGE", "ftp://cdn.example.com/cat.png"))
        .await;

    assert_eq!(response.status_code(), 400);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_URL");
}

#[tokio::test]
async fn private_origins_are_refused_unless_allowed() {
    let app = setup_test_app_with(&[("ALLOW_PRIVATE_ORIGINS", "false")]).await;
    let (origin, mock) = origin_serving(png_bytes(128), 200).await;

    let response = app
        .client()
        .post("/")
        .json(&upload_body("IMAGE", &format!("{}/media/cat.png", origin.url())))
        .await;

    assert_eq!(response.status_code(), 400);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_URL");
    assert!(!mock.matched_async().await);
}

#[tokio::test]
async fn malformed_request_body_is_invalid_input() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .post("/")
        .json(&json!({ "mediaType": "DOCUMENT", "originUrl": "https://cdn.example.com/a" }))
        .await;

    assert_eq!(response.status_code(), 400);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn error_diagnostics_follow_configured_environment() {
    let bad_body = json!({ "mediaType": "DOCUMENT", "originUrl": "https://cdn.example.com/a" });

    let app = setup_test_app_with(&[("ENVIRONMENT", "development")]).await;
    let response = app.client().post("/").json(&bad_body).await;
    assert_eq!(response.status_code(), 400);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error_type"], "InvalidInput");
    assert!(body["details"].is_string());

    let app = setup_test_app_with(&[("ENVIRONMENT", "production")]).await;
    let response = app.client().post("/").json(&bad_body).await;
    assert_eq!(response.status_code(), 400);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_INPUT");
    assert!(body.get("details").is_none());
    assert!(body.get("error_type").is_none());
}

#[tokio::test]
async fn infected_upload_is_rejected_and_not_stored() {
    let clamd_port = spawn_fake_clamd("stream: Eicar-Test-Signature FOUND\0").await;
    let port = clamd_port.to_string();
    let app = setup_test_app_with(&[
        ("CLAMAV_ENABLED", "true"),
        ("CLAMAV_HOST", "127.0.0.1"),
        ("CLAMAV_PORT", port.as_str()),
    ])
    .await;
    let (origin, _mock) = origin_serving(png_bytes(3000), 200).await;

    let response = app
        .client()
        .post("/")
        .json(&upload_body("IMAGE", &format!("{}/media/cat.png", origin.url())))
        .await;

    assert_eq!(response.status_code(), 422);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "MALICIOUS_CONTENT");
    assert_eq!(dir_entries(&app.media_dir()).await, 0);
    assert_eq!(dir_entries(&app.staging_dir()).await, 0);
}

#[tokio::test]
async fn clean_scan_lets_upload_through() {
    let clamd_port = spawn_fake_clamd("stream: OK\0").await;
    let port = clamd_port.to_string();
    let app = setup_test_app_with(&[
        ("CLAMAV_ENABLED", "true"),
        ("CLAMAV_HOST", "127.0.0.1"),
        ("CLAMAV_PORT", port.as_str()),
    ])
    .await;
    let (origin, _mock) = origin_serving(png_bytes(3000), 200).await;

    let response = app
        .client()
        .post("/")
        .json(&upload_body("IMAGE", &format!("{}/media/cat.png", origin.url())))
        .await;

    assert_eq!(response.status_code(), 201);
    assert_eq!(dir_entries(&app.media_dir()).await, 1);
}

#[tokio::test]
async fn unreachable_scanner_is_not_a_verdict() {
    let port = closed_port().await.to_string();
    let app = setup_test_app_with(&[
        ("CLAMAV_ENABLED", "true"),
        ("CLAMAV_HOST", "127.0.0.1"),
        ("CLAMAV_PORT", port.as_str()),
        ("CLAMAV_CONNECT_TIMEOUT_SECS", "1"),
    ])
    .await;
    let (origin, _mock) = origin_serving(png_bytes(3000), 200).await;

    let response = app
        .client()
        .post("/")
        .json(&upload_body("IMAGE", &format!("{}/media/cat.png", origin.url())))
        .await;

    assert_eq!(response.status_code(), 503);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "SCANNER_UNAVAILABLE");
    assert_eq!(body["recoverable"], true);
    assert_eq!(dir_entries(&app.media_dir()).await, 0);
}
