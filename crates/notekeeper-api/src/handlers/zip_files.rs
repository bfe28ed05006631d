//! Attachment zip HTTP handlers.
//!
//! Creating a zip only enqueues a request. The archive shows up in the
//! note's `-zip` container after the worker has processed it, so a freshly
//! returned `Location` may 404 for a while.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use notekeeper_core::{
    defaults, generate_zip_file_id, source_container_name, validate_blob_name, zip_container_name,
    ZipFileDetails,
};

use super::{download_headers, read_blob, require_note};
use crate::{ApiError, AppState};

/// Body of a 202 response to a zip request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipRequestAccepted {
    pub zip_file_id: String,
    pub message_id: Uuid,
}

// =============================================================================
// CREATE
// =============================================================================

/// Request an archive of every attachment on the note.
///
/// # Returns
/// - 202 Accepted with `Location` of the future archive
/// - 204 No Content if the note has no attachments
/// - 404 Not Found if the note does not exist
/// - 500 Internal Server Error if the request could not be queued
pub async fn create_zip_file(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_note(&state, note_id).await?;

    let attachment_count = state
        .blobs
        .list(&source_container_name(note_id))
        .await?
        .map(|items| items.len())
        .unwrap_or(0);
    if attachment_count == 0 {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let zip_file_id = generate_zip_file_id();
    let message_id = state
        .zip_producer
        .enqueue(note_id, &zip_file_id)
        .await
        .map_err(ApiError::Internal)?;

    info!(
        note_id = %note_id,
        zip_file_id = %zip_file_id,
        message_id = %message_id,
        attachment_count,
        "Zip file requested"
    );

    let location = state
        .config
        .location(&format!("/notes/{note_id}/attachmentzipfiles/{zip_file_id}"));
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&location) {
        headers.insert(header::LOCATION, value);
    }

    Ok((
        StatusCode::ACCEPTED,
        headers,
        Json(ZipRequestAccepted {
            zip_file_id,
            message_id,
        }),
    )
        .into_response())
}

// =============================================================================
// LIST / DOWNLOAD / DELETE
// =============================================================================

/// List the archives produced for a note.
///
/// # Returns
/// - 200 OK with `ZipFileDetails` array
/// - 404 Not Found if the note does not exist
pub async fn list_zip_files(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
) -> Result<Json<Vec<ZipFileDetails>>, ApiError> {
    require_note(&state, note_id).await?;

    let items = state
        .blobs
        .list(&zip_container_name(note_id))
        .await?
        .unwrap_or_default();

    Ok(Json(items.iter().map(ZipFileDetails::from).collect()))
}

/// Download an archive.
///
/// # Returns
/// - 200 OK with `application/zip` bytes
/// - 404 Not Found if the note does not exist or the archive is not ready
pub async fn download_zip_file(
    State(state): State<AppState>,
    Path((note_id, zip_file_id)): Path<(Uuid, String)>,
) -> Result<Response, ApiError> {
    require_note(&state, note_id).await?;
    if validate_blob_name(&zip_file_id).is_err() {
        return Err(ApiError::NotFound(format!("Zip file {zip_file_id} not found")));
    }

    let container = zip_container_name(note_id);
    let data = read_blob(&state, &container, &zip_file_id).await?;

    Ok((
        StatusCode::OK,
        download_headers(defaults::ZIP_CONTENT_TYPE, &zip_file_id),
        data,
    )
        .into_response())
}

/// Delete an archive.
///
/// # Returns
/// - 204 No Content when the archive was removed
/// - 404 Not Found if the note or the archive does not exist
pub async fn delete_zip_file(
    State(state): State<AppState>,
    Path((note_id, zip_file_id)): Path<(Uuid, String)>,
) -> Result<StatusCode, ApiError> {
    require_note(&state, note_id).await?;
    if validate_blob_name(&zip_file_id).is_err() {
        return Err(ApiError::NotFound(format!("Zip file {zip_file_id} not found")));
    }

    let deleted = state
        .blobs
        .delete(&zip_container_name(note_id), &zip_file_id)
        .await?;
    if !deleted {
        return Err(ApiError::NotFound(format!(
            "Zip file {zip_file_id} not found"
        )));
    }

    info!(note_id = %note_id, zip_file_id = %zip_file_id, "Zip file deleted");
    Ok(StatusCode::NO_CONTENT)
}
