//! Integration tests for simple and resumable uploads

use std::io::Write;

use cloudbackup_core::domain::RemotePath;
use cloudbackup_core::ports::IUploader;
use cloudbackup_graph::upload::{upload_large, GraphUploader};
use wiremock::matchers::{body_bytes, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, file_item};

fn local_file(contents: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

async fn mount_session(server: &MockServer, remote_path: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/me/drive/root:{remote_path}:/createUploadSession")))
        .and(body_partial_json(serde_json::json!({
            "item": { "@microsoft.graph.conflictBehavior": "replace" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "uploadUrl": format!("{}/upload/session", server.uri()),
            "expirationDateTime": "2030-01-01T00:00:00Z"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_small_file_uses_single_put() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("PUT"))
        .and(path("/me/drive/root:/Backups/a.txt:/content"))
        .and(header("Authorization", "Bearer test-access-token"))
        .and(body_bytes(b"abc".to_vec()))
        .respond_with(ResponseTemplate::new(201).set_body_json(file_item(
            "a.txt",
            "A9993E364706816ABA3E25717850C26C9CD0D89D",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let file = local_file(b"abc");
    let uploaded = GraphUploader::new(client)
        .upload(file.path(), "/Backups", "a.txt")
        .await
        .expect("upload failed");

    assert_eq!(uploaded.id, "id-a.txt");
    assert_eq!(uploaded.name, "a.txt");
    assert_eq!(uploaded.size, Some(3));
    assert_eq!(
        uploaded.hash.as_deref(),
        Some("a9993e364706816aba3e25717850c26c9cd0d89d")
    );
}

#[tokio::test]
async fn test_upload_into_root_folder() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("PUT"))
        .and(path("/me/drive/root:/top.txt:/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_item("top.txt", "01")))
        .expect(1)
        .mount(&server)
        .await;

    let file = local_file(b"x");
    let uploaded = GraphUploader::new(client)
        .upload(file.path(), "/", "top.txt")
        .await
        .unwrap();
    assert_eq!(uploaded.name, "top.txt");
}

#[tokio::test]
async fn test_large_file_goes_through_session() {
    let (server, client) = common::setup_graph_mock().await;
    mount_session(&server, "/Backups/big.bin").await;
    Mock::given(method("PUT"))
        .and(path("/upload/session"))
        .and(header("Content-Range", "bytes 0-9/10"))
        .respond_with(ResponseTemplate::new(201).set_body_json(file_item("big.bin", "BEEF")))
        .expect(1)
        .mount(&server)
        .await;

    let file = local_file(b"0123456789");
    let uploaded = GraphUploader::new(client)
        .with_simple_upload_limit(0)
        .upload(file.path(), "/Backups", "big.bin")
        .await
        .expect("upload failed");

    assert_eq!(uploaded.name, "big.bin");
    assert_eq!(uploaded.hash.as_deref(), Some("beef"));
}

#[tokio::test]
async fn test_session_is_fed_in_chunks() {
    let (server, client) = common::setup_graph_mock().await;
    mount_session(&server, "/Backups/big.bin").await;
    for (range, body) in [("bytes 0-3/10", "0123"), ("bytes 4-7/10", "4567")] {
        Mock::given(method("PUT"))
            .and(path("/upload/session"))
            .and(header("Content-Range", range))
            .and(body_bytes(body.as_bytes().to_vec()))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "nextExpectedRanges": ["0-"]
            })))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("PUT"))
        .and(path("/upload/session"))
        .and(header("Content-Range", "bytes 8-9/10"))
        .and(body_bytes(b"89".to_vec()))
        .respond_with(ResponseTemplate::new(201).set_body_json(file_item("big.bin", "AB")))
        .expect(1)
        .mount(&server)
        .await;

    let file = local_file(b"0123456789");
    let target = RemotePath::parse("/Backups/big.bin").unwrap();
    let item = upload_large(&client, &target, file.path(), 4)
        .await
        .expect("chunked upload failed");

    assert_eq!(item.name, "big.bin");
}

#[tokio::test]
async fn test_rejected_chunk_fails_upload() {
    let (server, client) = common::setup_graph_mock().await;
    mount_session(&server, "/Backups/big.bin").await;
    Mock::given(method("PUT"))
        .and(path("/upload/session"))
        .respond_with(ResponseTemplate::new(416).set_body_string("range not satisfiable"))
        .mount(&server)
        .await;

    let file = local_file(b"0123456789");
    let err = GraphUploader::new(client)
        .with_simple_upload_limit(0)
        .upload(file.path(), "/Backups", "big.bin")
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("offset 0/10"));
}

#[tokio::test]
async fn test_missing_local_file_is_an_error() {
    let (_server, client) = common::setup_graph_mock().await;
    let dir = tempfile::tempdir().unwrap();

    let err = GraphUploader::new(client)
        .upload(&dir.path().join("gone.txt"), "/Backups", "gone.txt")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Failed to stat"));
}
