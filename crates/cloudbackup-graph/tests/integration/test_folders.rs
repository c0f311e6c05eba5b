//! Integration tests for GraphListingProvider::ensure_folder()

use cloudbackup_core::ports::IRemoteListingProvider;
use cloudbackup_graph::provider::GraphListingProvider;
use cloudbackup_graph::GraphError;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, file_item, folder_item};

#[tokio::test]
async fn test_existing_folder_is_left_alone() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_metadata(&server, "/Backups", folder_item("Backups")).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    GraphListingProvider::new(client)
        .ensure_folder("/Backups")
        .await
        .expect("ensure_folder failed");
}

#[tokio::test]
async fn test_missing_folders_are_created_top_down() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_metadata_missing(&server, "/Backups/pics").await;
    common::mount_metadata_missing(&server, "/Backups").await;

    Mock::given(method("POST"))
        .and(path("/me/drive/root/children"))
        .and(body_partial_json(serde_json::json!({
            "name": "Backups",
            "folder": {},
            "@microsoft.graph.conflictBehavior": "fail"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(folder_item("Backups")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/me/drive/root:/Backups:/children"))
        .and(body_partial_json(serde_json::json!({ "name": "pics" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(folder_item("pics")))
        .expect(1)
        .mount(&server)
        .await;

    GraphListingProvider::new(client)
        .ensure_folder("/Backups/pics")
        .await
        .expect("ensure_folder failed");
}

#[tokio::test]
async fn test_concurrent_creation_is_tolerated() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_metadata_missing(&server, "/Backups").await;
    Mock::given(method("POST"))
        .and(path("/me/drive/root/children"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "error": { "code": "nameAlreadyExists" }
        })))
        .mount(&server)
        .await;

    GraphListingProvider::new(client)
        .ensure_folder("/Backups")
        .await
        .expect("409 should count as success");
}

#[tokio::test]
async fn test_file_in_the_way_is_an_error() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_metadata(&server, "/Backups", file_item("Backups", "00")).await;

    let err = GraphListingProvider::new(client)
        .ensure_folder("/Backups")
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<GraphError>(),
        Some(GraphError::NotAFolder(p)) if p == "/Backups"
    ));
    assert!(err.to_string().contains("Remote path is not a folder"));
}

#[tokio::test]
async fn test_creation_failure_propagates() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_metadata_missing(&server, "/Backups").await;
    Mock::given(method("POST"))
        .and(path("/me/drive/root/children"))
        .respond_with(ResponseTemplate::new(403).set_body_string("accessDenied"))
        .mount(&server)
        .await;

    let err = GraphListingProvider::new(client)
        .ensure_folder("/Backups")
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("Failed to create remote folder /Backups"));
}
