//! Integration tests for remote listings
//!
//! Verifies paging, filtering of folders and hidden names, and hash
//! normalization in GraphListingProvider::list().

use cloudbackup_core::domain::RemotePath;
use cloudbackup_core::ports::IListingProvider;
use cloudbackup_graph::provider::GraphListingProvider;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, file_item, folder_item};

#[tokio::test]
async fn test_list_filters_and_normalizes() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_children(
        &server,
        "/Backups/pics",
        serde_json::json!([
            file_item("a.jpg", "A9993E364706816ABA3E25717850C26C9CD0D89D"),
            folder_item("nested"),
            file_item(".hidden", "FFFF"),
            { "id": "id-nohash", "name": "nohash.jpg", "file": {} }
        ]),
    )
    .await;

    let provider = GraphListingProvider::new(client);
    let entries = provider.list("/Backups/pics").await.expect("list failed");

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].filename, "a.jpg");
    assert_eq!(entries[0].hash, "a9993e364706816aba3e25717850c26c9cd0d89d");
    assert_eq!(entries[0].folder, "/Backups/pics");
    assert_eq!(entries[1].filename, "nohash.jpg");
    assert_eq!(entries[1].hash, "");
}

#[tokio::test]
async fn test_list_requests_selected_fields() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path("/me/drive/root:/Docs:/children"))
        .and(query_param("$select", "id,name,size,folder,file"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let entries = GraphListingProvider::new(client).list("Docs").await.unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_list_follows_next_link() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path("/me/drive/root:/Backups:/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [file_item("a", "AA"), file_item("b", "BB")],
            "@odata.nextLink": format!("{}/page2", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [file_item("c", "CC")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let children = client
        .list_children(&RemotePath::parse("/Backups").unwrap())
        .await
        .unwrap();
    let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_list_root_uses_children_endpoint() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path("/me/drive/root/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [file_item("top.txt", "01")]
        })))
        .mount(&server)
        .await;

    let entries = GraphListingProvider::new(client).list("/").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].folder, "/");
}

#[tokio::test]
async fn test_list_missing_folder_is_an_error() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path("/me/drive/root:/Nope:/children"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(GraphListingProvider::new(client).list("/Nope").await.is_err());
}
