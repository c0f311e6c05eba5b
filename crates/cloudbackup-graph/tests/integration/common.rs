//! Shared test helpers for Graph API integration tests
//!
//! Provides wiremock-based mock server setup for Microsoft Graph API endpoints.
//! Each helper mounts the necessary mock endpoints and returns a configured
//! GraphClient pointing at the mock server.

use std::sync::Arc;

use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cloudbackup_graph::client::GraphClient;

/// Sets up a mock server with the drive endpoint and returns
/// a (MockServer, GraphClient) tuple.
///
/// Pre-configured endpoints:
/// - GET /me/drive → owner and quota
pub async fn setup_graph_mock() -> (MockServer, Arc<GraphClient>) {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me/drive"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "drive-test-001",
            "owner": { "user": { "displayName": "Test User", "id": "user-test-001" } },
            "quota": {
                "total": 5368709120_u64,
                "used": 1073741824_u64,
                "remaining": 4294967296_u64
            }
        })))
        .mount(&server)
        .await;

    let client = GraphClient::with_base_url("test-access-token", server.uri()).with_max_retries(2);

    (server, Arc::new(client))
}

/// JSON for a file item with an (uppercase) SHA-1
pub fn file_item(name: &str, sha1: &str) -> Value {
    serde_json::json!({
        "id": format!("id-{name}"),
        "name": name,
        "size": 3,
        "file": { "hashes": { "sha1Hash": sha1 } }
    })
}

/// JSON for a folder item
pub fn folder_item(name: &str) -> Value {
    serde_json::json!({
        "id": format!("id-{name}"),
        "name": name,
        "folder": { "childCount": 0 }
    })
}

/// Mounts a metadata lookup for `remote_path` returning `item`.
pub async fn mount_metadata(server: &MockServer, remote_path: &str, item: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/me/drive/root:{remote_path}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(item))
        .mount(server)
        .await;
}

/// Mounts a metadata lookup for `remote_path` answering 404.
pub async fn mount_metadata_missing(server: &MockServer, remote_path: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/me/drive/root:{remote_path}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": { "code": "itemNotFound", "message": "Item does not exist" }
        })))
        .mount(server)
        .await;
}

/// Mounts a single-page children listing for `remote_path`.
pub async fn mount_children(server: &MockServer, remote_path: &str, items: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/me/drive/root:{remote_path}:/children")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": items
        })))
        .mount(server)
        .await;
}
