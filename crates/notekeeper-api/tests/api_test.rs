//! Router tests for the attachment and attachment-zip endpoints.
//!
//! Requests go through the full middleware stack via `tower::ServiceExt`,
//! backed by the in-memory blob store, note lookup, and queue.

use std::io::{Cursor, Read};
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use uuid::Uuid;
use zip::ZipArchive;

use notekeeper_api::{router, ApiConfig, AppState};
use notekeeper_core::{BlobMetadata, BlobStore, MessageQueue};
use notekeeper_jobs::{WorkerBuilder, ZipRequestMessage, ZipRequestProducer};
use notekeeper_storage::{InMemoryBlobStore, InMemoryNotes, InMemoryQueue};

struct TestApp {
    router: Router,
    blobs: Arc<InMemoryBlobStore>,
    queue: Arc<InMemoryQueue>,
    note_id: Uuid,
}

fn app_with_config(config: ApiConfig) -> TestApp {
    let note_id = Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap();
    let blobs = Arc::new(InMemoryBlobStore::new());
    let queue = Arc::new(InMemoryQueue::new("attachment-zip-requests"));
    let state = AppState {
        blobs: blobs.clone(),
        notes: Arc::new(InMemoryNotes::with_notes([note_id])),
        zip_producer: ZipRequestProducer::new(queue.clone()),
        config,
    };
    TestApp {
        router: router(state),
        blobs,
        queue,
        note_id,
    }
}

fn app() -> TestApp {
    app_with_config(ApiConfig::default())
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl TestResponse {
    fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> TestResponse {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

async fn get(app: &TestApp, uri: &str) -> TestResponse {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn delete(app: &TestApp, uri: &str) -> TestResponse {
    send(
        app,
        Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

async fn post(app: &TestApp, uri: &str) -> TestResponse {
    send(
        app,
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

async fn upload(app: &TestApp, note_id: Uuid, name: &str, data: &[u8]) -> TestResponse {
    send(
        app,
        Request::builder()
            .method(Method::PUT)
            .uri(format!("/notes/{note_id}/attachments/{name}"))
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(data.to_vec()))
            .unwrap(),
    )
    .await
}

async fn stored_metadata(app: &TestApp, name: &str) -> BlobMetadata {
    app.blobs
        .properties(&app.note_id.to_string(), name)
        .await
        .unwrap()
        .expect("attachment exists")
        .metadata
}

fn zip_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            (file.name().to_string(), data)
        })
        .collect()
}

// ============================================================================
// HEALTH
// ============================================================================

#[tokio::test]
async fn test_health() {
    let app = app();
    let response = get(&app, "/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["status"], "ok");
}

// ============================================================================
// ATTACHMENTS
// ============================================================================

#[tokio::test]
async fn test_upload_creates_then_replaces() {
    let app = app();
    let note_id = app.note_id;

    let created = upload(&app, note_id, "note.txt", b"hello").await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(
        created.headers[header::LOCATION],
        format!("/notes/{note_id}/attachments/note.txt").as_str()
    );

    let replaced = upload(&app, note_id, "note.txt", b"helloworld").await;
    assert_eq!(replaced.status, StatusCode::NO_CONTENT);

    let stored = app
        .blobs
        .get(&note_id.to_string(), "note.txt")
        .await
        .unwrap();
    assert_eq!(stored, b"helloworld");
}

#[tokio::test]
async fn test_upload_metadata_keeps_created_and_sets_modified() {
    let app = app();
    let note_id = app.note_id;

    upload(&app, note_id, "a.txt", b"one").await;
    let first = stored_metadata(&app, "a.txt").await;
    assert_eq!(first["NoteId"], note_id.to_string());
    assert_eq!(first["AttachmentId"], "a.txt");
    assert!(!first.contains_key("Modified"));

    upload(&app, note_id, "a.txt", b"two").await;
    let second = stored_metadata(&app, "a.txt").await;
    assert_eq!(second["Created"], first["Created"]);
    assert!(second.contains_key("Modified"));
}

#[tokio::test]
async fn test_upload_default_content_type() {
    let app = app();
    let note_id = app.note_id;

    let response = send(
        &app,
        Request::builder()
            .method(Method::PUT)
            .uri(format!("/notes/{note_id}/attachments/blob.bin"))
            .body(Body::from(vec![1u8, 2, 3]))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let listed = get(&app, &format!("/notes/{note_id}/attachments")).await;
    assert_eq!(listed.json()[0]["contentType"], "application/octet-stream");
}

#[tokio::test]
async fn test_upload_unknown_note_is_404() {
    let app = app();
    let response = upload(&app, Uuid::new_v4(), "a.txt", b"x").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.json()["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_upload_illegal_name_is_400() {
    let app = app();
    let response = upload(&app, app.note_id, "report.", b"x").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.json()["error"]
        .as_str()
        .unwrap()
        .contains("dot"));
}

#[tokio::test]
async fn test_upload_limit_is_403_for_new_ids_only() {
    let app = app_with_config(ApiConfig::default().with_max_attachments(2));
    let note_id = app.note_id;

    assert_eq!(upload(&app, note_id, "a.txt", b"a").await.status, StatusCode::CREATED);
    assert_eq!(upload(&app, note_id, "b.txt", b"b").await.status, StatusCode::CREATED);

    let third = upload(&app, note_id, "c.txt", b"c").await;
    assert_eq!(third.status, StatusCode::FORBIDDEN);

    let replace = upload(&app, note_id, "b.txt", b"bb").await;
    assert_eq!(replace.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_upload_over_body_limit_is_rejected() {
    let mut config = ApiConfig::default();
    config.max_upload_bytes = 8;
    let app = app_with_config(config);

    let response = send(
        &app,
        Request::builder()
            .method(Method::PUT)
            .uri(format!("/notes/{}/attachments/big.bin", app.note_id))
            .header(header::CONTENT_LENGTH, "16")
            .body(Body::from(vec![0u8; 16]))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_list_attachments() {
    let app = app();
    let note_id = app.note_id;

    let empty = get(&app, &format!("/notes/{note_id}/attachments")).await;
    assert_eq!(empty.status, StatusCode::OK);
    assert_eq!(empty.json(), serde_json::json!([]));

    upload(&app, note_id, "b.txt", b"bb").await;
    upload(&app, note_id, "docs/a.txt", b"a").await;

    let listed = get(&app, &format!("/notes/{note_id}/attachments")).await;
    let items = listed.json();
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["attachmentId"], "b.txt");
    assert_eq!(items[0]["contentType"], "text/plain");
    assert_eq!(items[0]["length"], 2);
    assert_eq!(items[1]["attachmentId"], "docs/a.txt");
    assert!(items[1].get("createdDate").is_some());
    assert!(items[1].get("lastModifiedDate").is_some());
}

#[tokio::test]
async fn test_list_attachments_unknown_note_is_404() {
    let app = app();
    let response = get(&app, &format!("/notes/{}/attachments", Uuid::new_v4())).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_note_id_is_400() {
    let app = app();
    let response = get(&app, "/notes/not-a-uuid/attachments").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_attachment() {
    let app = app();
    let note_id = app.note_id;
    upload(&app, note_id, "docs/note.txt", b"helloworld").await;

    let response = get(&app, &format!("/notes/{note_id}/attachments/docs/note.txt")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"helloworld");
    assert_eq!(response.headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(
        response.headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"note.txt\""
    );

    let missing = get(&app, &format!("/notes/{note_id}/attachments/nope.txt")).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_attachment_is_idempotent() {
    let app = app();
    let note_id = app.note_id;
    upload(&app, note_id, "a.txt", b"a").await;

    let uri = format!("/notes/{note_id}/attachments/a.txt");
    assert_eq!(delete(&app, &uri).await.status, StatusCode::NO_CONTENT);
    assert_eq!(delete(&app, &uri).await.status, StatusCode::NO_CONTENT);
    assert_eq!(get(&app, &uri).await.status, StatusCode::NOT_FOUND);

    let unknown = delete(&app, &format!("/notes/{}/attachments/a.txt", Uuid::new_v4())).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

// ============================================================================
// ZIP FILES
// ============================================================================

#[tokio::test]
async fn test_create_zip_without_attachments_is_204() {
    let app = app();
    let response = post(&app, &format!("/notes/{}/attachmentzipfiles", app.note_id)).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert_eq!(app.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_create_zip_unknown_note_is_404() {
    let app = app();
    let response = post(&app, &format!("/notes/{}/attachmentzipfiles", Uuid::new_v4())).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(app.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_create_zip_enqueues_request() {
    let app = app();
    let note_id = app.note_id;
    upload(&app, note_id, "note.txt", b"helloworld").await;

    let response = post(&app, &format!("/notes/{note_id}/attachmentzipfiles")).await;
    assert_eq!(response.status, StatusCode::ACCEPTED);

    let zip_file_id = response.json()["zipFileId"].as_str().unwrap().to_string();
    assert!(zip_file_id.ends_with(".zip"));
    assert_eq!(
        response.headers[header::LOCATION],
        format!("/notes/{note_id}/attachmentzipfiles/{zip_file_id}").as_str()
    );

    let bodies = app.queue.bodies().await;
    assert_eq!(bodies.len(), 1);
    let message = ZipRequestMessage::decode(&bodies[0]).unwrap();
    assert_eq!(message.note_id, note_id);
    assert_eq!(message.zip_file_id, zip_file_id);
}

#[tokio::test]
async fn test_create_zip_absolute_location() {
    let app =
        app_with_config(ApiConfig::default().with_public_base_url("https://notes.example.com"));
    let note_id = app.note_id;
    upload(&app, note_id, "note.txt", b"x").await;

    let response = post(&app, &format!("/notes/{note_id}/attachmentzipfiles")).await;
    let location = response.headers[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with(&format!(
        "https://notes.example.com/notes/{note_id}/attachmentzipfiles/"
    )));
}

#[tokio::test]
async fn test_create_zip_queue_outage_is_500() {
    let app = app();
    let note_id = app.note_id;
    upload(&app, note_id, "note.txt", b"x").await;
    app.queue.set_unavailable(true);

    let response = post(&app, &format!("/notes/{note_id}/attachmentzipfiles")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.json()["error"]
        .as_str()
        .unwrap()
        .contains("Transport unavailable"));
}

#[tokio::test]
async fn test_zip_lifecycle_through_worker() {
    let app = app();
    let note_id = app.note_id;
    upload(&app, note_id, "note.txt", b"helloworld").await;
    upload(&app, note_id, "docs/a.txt", b"aaa").await;

    let accepted = post(&app, &format!("/notes/{note_id}/attachmentzipfiles")).await;
    let zip_file_id = accepted.json()["zipFileId"].as_str().unwrap().to_string();
    let zip_uri = format!("/notes/{note_id}/attachmentzipfiles/{zip_file_id}");

    // Not materialised until the worker runs.
    assert_eq!(get(&app, &zip_uri).await.status, StatusCode::NOT_FOUND);

    let worker = WorkerBuilder::new(app.queue.clone(), app.blobs.clone())
        .build()
        .unwrap();
    assert!(worker.poll_once().await.unwrap());
    assert_eq!(app.queue.len().await.unwrap(), 0);

    let download = get(&app, &zip_uri).await;
    assert_eq!(download.status, StatusCode::OK);
    assert_eq!(download.headers[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        download.headers[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{zip_file_id}\"").as_str()
    );
    assert_eq!(
        zip_entries(&download.body),
        vec![
            ("docs/a.txt".to_string(), b"aaa".to_vec()),
            ("note.txt".to_string(), b"helloworld".to_vec()),
        ]
    );

    let listed = get(&app, &format!("/notes/{note_id}/attachmentzipfiles")).await;
    let items = listed.json();
    assert_eq!(items.as_array().unwrap().len(), 1);
    assert_eq!(items[0]["zipFileId"], zip_file_id.as_str());
    assert_eq!(items[0]["contentType"], "application/zip");
    assert_eq!(items[0]["length"], download.body.len() as u64);

    assert_eq!(delete(&app, &zip_uri).await.status, StatusCode::NO_CONTENT);
    assert_eq!(delete(&app, &zip_uri).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_zip_files_empty() {
    let app = app();
    let response = get(&app, &format!("/notes/{}/attachmentzipfiles", app.note_id)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), serde_json::json!([]));
}

#[tokio::test]
async fn test_illegal_names_on_read_and_delete_paths() {
    let app = app();
    let note_id = app.note_id;

    let attachment = format!("/notes/{note_id}/attachments/report.");
    assert_eq!(get(&app, &attachment).await.status, StatusCode::NOT_FOUND);
    assert_eq!(delete(&app, &attachment).await.status, StatusCode::NO_CONTENT);

    let zip = format!("/notes/{note_id}/attachmentzipfiles/archive.");
    assert_eq!(get(&app, &zip).await.status, StatusCode::NOT_FOUND);
    assert_eq!(delete(&app, &zip).await.status, StatusCode::NOT_FOUND);
}
