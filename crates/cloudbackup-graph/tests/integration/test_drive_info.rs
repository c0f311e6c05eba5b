//! Integration tests for the drive info endpoint and 429 handling

use cloudbackup_graph::GraphError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_get_drive_info_returns_owner_and_quota() {
    let (_server, client) = common::setup_graph_mock().await;

    let info = client.get_drive_info().await.expect("get_drive_info failed");

    assert_eq!(info.owner, "Test User");
    assert_eq!(info.total, 5_368_709_120);
    assert_eq!(info.used, 1_073_741_824);
    assert_eq!(info.remaining, 4_294_967_296);
}

#[tokio::test]
async fn test_get_drive_info_derives_remaining() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me/drive"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "quota": { "total": 100, "used": 40 }
        })))
        .mount(&server)
        .await;
    let client = cloudbackup_graph::client::GraphClient::with_base_url("t", server.uri());

    let info = client.get_drive_info().await.unwrap();
    assert_eq!(info.owner, "Unknown User");
    assert_eq!(info.remaining, 60);
}

#[tokio::test]
async fn test_throttled_request_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me/drive"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me/drive"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "owner": { "user": { "displayName": "Patient User" } },
            "quota": { "total": 1, "used": 0, "remaining": 1 }
        })))
        .mount(&server)
        .await;
    let client = cloudbackup_graph::client::GraphClient::with_base_url("t", server.uri());

    let info = client.get_drive_info().await.unwrap();
    assert_eq!(info.owner, "Patient User");
}

#[tokio::test]
async fn test_throttling_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me/drive"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(3)
        .mount(&server)
        .await;
    let client =
        cloudbackup_graph::client::GraphClient::with_base_url("t", server.uri()).with_max_retries(2);

    let err = client.get_drive_info().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GraphError>(),
        Some(GraphError::TooManyRequests { .. })
    ));
}

#[tokio::test]
async fn test_unauthorized_maps_to_graph_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me/drive"))
        .respond_with(ResponseTemplate::new(401).set_body_string("InvalidAuthenticationToken"))
        .mount(&server)
        .await;
    let client = cloudbackup_graph::client::GraphClient::with_base_url("t", server.uri());

    let err = client.get_drive_info().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GraphError>(),
        Some(GraphError::Unauthorized(_))
    ));
}
