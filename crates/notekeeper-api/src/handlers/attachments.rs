//! Attachment HTTP handlers.
//!
//! Attachments are stored as blobs in the note's source container, named by
//! their attachment id. Ids may contain `/` and follow the blob naming rules.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use notekeeper_core::naming::blob_name_violations;
use notekeeper_core::{
    defaults, format_timestamp, source_container_name, validate_blob_name, AttachmentDetails,
    BlobMetadata, PutOutcome, META_ATTACHMENT_ID, META_CREATED, META_MODIFIED, META_NOTE_ID,
};

use super::{download_headers, read_blob, require_note};
use crate::{ApiError, AppState};

// =============================================================================
// LIST
// =============================================================================

/// List a note's attachments.
///
/// # Returns
/// - 200 OK with `AttachmentDetails` array
/// - 404 Not Found if the note does not exist
pub async fn list_attachments(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
) -> Result<Json<Vec<AttachmentDetails>>, ApiError> {
    require_note(&state, note_id).await?;

    let items = state
        .blobs
        .list(&source_container_name(note_id))
        .await?
        .unwrap_or_default();

    Ok(Json(items.iter().map(AttachmentDetails::from).collect()))
}

// =============================================================================
// UPLOAD
// =============================================================================

/// Create or replace an attachment from the raw request body.
///
/// # Returns
/// - 201 Created with `Location` when the attachment is new
/// - 204 No Content when an existing attachment was replaced
/// - 400 Bad Request if the attachment id is not a legal blob name
/// - 403 Forbidden if the note is at its attachment limit
/// - 404 Not Found if the note does not exist
pub async fn put_attachment(
    State(state): State<AppState>,
    Path((note_id, attachment_id)): Path<(Uuid, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let violations = blob_name_violations(&attachment_id);
    if !violations.is_empty() {
        return Err(ApiError::BadRequest(violations.join(" ")));
    }

    require_note(&state, note_id).await?;

    let container = source_container_name(note_id);
    let existing = state.blobs.properties(&container, &attachment_id).await?;

    if existing.is_none() {
        let count = state
            .blobs
            .list(&container)
            .await?
            .map(|items| items.len())
            .unwrap_or(0);
        if count >= state.config.max_attachments {
            return Err(ApiError::Forbidden(format!(
                "Note {note_id} already has the maximum of {} attachments",
                state.config.max_attachments
            )));
        }
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(defaults::DEFAULT_CONTENT_TYPE)
        .to_string();

    let now = format_timestamp(Utc::now());
    let mut metadata = BlobMetadata::new();
    metadata.insert(META_NOTE_ID.to_string(), note_id.to_string());
    metadata.insert(META_ATTACHMENT_ID.to_string(), attachment_id.clone());
    match &existing {
        Some(props) => {
            let created = props
                .metadata
                .get(META_CREATED)
                .cloned()
                .unwrap_or_else(|| format_timestamp(props.created_on));
            metadata.insert(META_CREATED.to_string(), created);
            metadata.insert(META_MODIFIED.to_string(), now);
        }
        None => {
            metadata.insert(META_CREATED.to_string(), now);
        }
    }

    let length = body.len();
    let outcome = state
        .blobs
        .put(&container, &attachment_id, body.to_vec(), &content_type, metadata)
        .await?;

    info!(
        note_id = %note_id,
        attachment_id = %attachment_id,
        length,
        outcome = ?outcome,
        "Attachment stored"
    );

    match outcome {
        PutOutcome::Created => {
            let location = state
                .config
                .location(&format!("/notes/{note_id}/attachments/{attachment_id}"));
            let mut response_headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(&location) {
                response_headers.insert(header::LOCATION, value);
            }
            Ok((StatusCode::CREATED, response_headers).into_response())
        }
        PutOutcome::Replaced => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

// =============================================================================
// DOWNLOAD / DELETE
// =============================================================================

/// Download an attachment with its stored content type.
///
/// # Returns
/// - 200 OK with the attachment bytes
/// - 404 Not Found if the note or the attachment does not exist
pub async fn download_attachment(
    State(state): State<AppState>,
    Path((note_id, attachment_id)): Path<(Uuid, String)>,
) -> Result<Response, ApiError> {
    require_note(&state, note_id).await?;
    if validate_blob_name(&attachment_id).is_err() {
        return Err(ApiError::NotFound(format!("Attachment {attachment_id} not found")));
    }

    let container = source_container_name(note_id);
    let props = state
        .blobs
        .properties(&container, &attachment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Attachment {attachment_id} not found")))?;
    let data = read_blob(&state, &container, &attachment_id).await?;

    Ok((
        StatusCode::OK,
        download_headers(&props.content_type, &attachment_id),
        data,
    )
        .into_response())
}

/// Delete an attachment.
///
/// # Returns
/// - 204 No Content, whether or not the attachment existed
/// - 404 Not Found if the note does not exist
pub async fn delete_attachment(
    State(state): State<AppState>,
    Path((note_id, attachment_id)): Path<(Uuid, String)>,
) -> Result<StatusCode, ApiError> {
    require_note(&state, note_id).await?;
    // Illegal names are never stored.
    if validate_blob_name(&attachment_id).is_err() {
        return Ok(StatusCode::NO_CONTENT);
    }

    let deleted = state
        .blobs
        .delete(&source_container_name(note_id), &attachment_id)
        .await?;
    debug!(note_id = %note_id, attachment_id = %attachment_id, deleted, "Attachment delete");

    Ok(StatusCode::NO_CONTENT)
}
