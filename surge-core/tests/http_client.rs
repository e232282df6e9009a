use std::time::Duration;

use bytes::Bytes;
use surge_core::{HttpClient, HttpError, HttpRequest};
use surge_testserver::TestServer;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_returns_status_body_and_timings() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    let client = HttpClient::default();

    let res = client
        .get(&format!("{}/", server.base_url()))
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(res.status, 200);
    assert_eq!(res.body_utf8(), Some("Hello, World!"));
    assert!(res.elapsed > Duration::ZERO);
    assert!(res.bytes_received > res.body.len() as u64);
    assert!(res.bytes_sent > 0);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn post_echoes_json_payloads() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    let client = HttpClient::default();

    let payload = r#"{"id":1,"name":"Test User"}"#;
    let req = HttpRequest::post(
        format!("{}/json", server.base_url()),
        Bytes::from_static(payload.as_bytes()),
    )
    .with_header("Content-Type", "application/json");

    let res = client.request(req).await.unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(res.status, 200);
    let body = res.body_utf8().unwrap_or_default();
    assert!(body.contains("Test User"));
    assert_eq!(server.stats().json_posts_total(), 1);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn post_without_json_content_type_is_rejected_by_the_target() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    let client = HttpClient::default();

    let res = client
        .post(
            &format!("{}/json", server.base_url()),
            Bytes::from_static(b"{}"),
        )
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(res.status, 415);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_timeout_surfaces_as_an_error() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    let client = HttpClient::default();

    let req = HttpRequest::get(format!("{}/slow?ms=500", server.base_url()))
        .with_timeout(Duration::from_millis(50));
    let res = client.request(req).await;
    assert!(matches!(res, Err(HttpError::Timeout(_))));

    server.shutdown().await;
}
