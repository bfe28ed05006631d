//! HTTP handlers.

pub mod attachments;
pub mod zip_files;

use axum::{
    http::{header, HeaderMap, HeaderValue},
    Json,
};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use crate::{ApiError, AppState};

/// Liveness check.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// 404 unless the note exists.
pub(crate) async fn require_note(state: &AppState, note_id: Uuid) -> Result<(), ApiError> {
    if state.notes.exists(note_id).await? {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!("Note {note_id} not found")))
    }
}

/// Read a whole blob into memory for a download response.
pub(crate) async fn read_blob(
    state: &AppState,
    container: &str,
    name: &str,
) -> Result<Vec<u8>, ApiError> {
    let mut reader = state.blobs.open_read(container, name).await?;
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .await
        .map_err(|e| ApiError::Internal(notekeeper_core::Error::BlobRead {
            container: container.to_string(),
            name: name.to_string(),
            reason: e.to_string(),
        }))?;
    Ok(data)
}

/// Download headers for a blob served as a file attachment.
pub(crate) fn download_headers(content_type: &str, name: &str) -> HeaderMap {
    let filename = name.rsplit('/').next().unwrap_or(name);
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers
}
