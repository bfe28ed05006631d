//! # notekeeper-api
//!
//! HTTP surface for note attachments and attachment zip archives.
//!
//! Attachments live in the note's source container; `POST
//! /notes/:note_id/attachmentzipfiles` only enqueues a zip request and the
//! archive appears in `<noteId>-zip` once the worker has processed it.

pub mod handlers;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::error;

use notekeeper_core::{defaults, BlobStore, NoteLookup};
use notekeeper_jobs::ZipRequestProducer;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Request-handling limits and URL settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Attachments a single note may hold.
    pub max_attachments: usize,
    /// Largest accepted upload body in bytes.
    pub max_upload_bytes: usize,
    /// Absolute prefix for `Location` headers; relative paths when unset.
    pub public_base_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_attachments: defaults::MAX_ATTACHMENTS,
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
            public_base_url: None,
        }
    }
}

impl ApiConfig {
    /// Load from `MAX_ATTACHMENTS`, `MAX_UPLOAD_BYTES` and `PUBLIC_BASE_URL`.
    pub fn from_env() -> Self {
        let max_attachments = std::env::var("MAX_ATTACHMENTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults::MAX_ATTACHMENTS);
        let max_upload_bytes = std::env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults::MAX_UPLOAD_BYTES);
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty());

        Self {
            max_attachments,
            max_upload_bytes,
            public_base_url,
        }
    }

    pub fn with_max_attachments(mut self, max: usize) -> Self {
        self.max_attachments = max;
        self
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    /// Prefix `path` with the public base URL when one is configured.
    pub fn location(&self, path: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}{path}"),
            None => path.to_string(),
        }
    }
}

// =============================================================================
// STATE
// =============================================================================

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub blobs: Arc<dyn BlobStore>,
    pub notes: Arc<dyn NoteLookup>,
    pub zip_producer: ZipRequestProducer,
    pub config: ApiConfig,
}

/// Build the application router with its middleware stack.
pub fn router(state: AppState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/notes/:note_id/attachments",
            get(handlers::attachments::list_attachments),
        )
        .route(
            "/notes/:note_id/attachments/*attachment_id",
            put(handlers::attachments::put_attachment)
                .get(handlers::attachments::download_attachment)
                .delete(handlers::attachments::delete_attachment),
        )
        .route(
            "/notes/:note_id/attachmentzipfiles",
            post(handlers::zip_files::create_zip_file).get(handlers::zip_files::list_zip_files),
        )
        .route(
            "/notes/:note_id/attachmentzipfiles/:zip_file_id",
            get(handlers::zip_files::download_zip_file)
                .delete(handlers::zip_files::delete_zip_file),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state)
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    Internal(notekeeper_core::Error),
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
}

impl From<notekeeper_core::Error> for ApiError {
    fn from(err: notekeeper_core::Error) -> Self {
        match &err {
            notekeeper_core::Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            notekeeper_core::Error::NoteNotFound(id) => {
                ApiError::NotFound(format!("Note {id} not found"))
            }
            notekeeper_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            _ => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => {
                error!(error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
