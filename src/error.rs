//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with an appropriate status code.
//!
//! **Security note:** backend errors (storage, database, bundle parsing)
//! are logged with full detail but only a generic message is returned to
//! the caller so that bucket names, SQL, or other implementation details
//! never leak to clients.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::db::DatabaseError;
use crate::storage::StorageError;
use crate::updates::bundle::{BundleError, BundleStorageError};
use crate::updates::manifest::ManifestError;

/// All errors that can occur in the airlift-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The caller failed the upload-secret check.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Propagated from the artifact store.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Propagated from the metadata store.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// A stored bundle could not be read or parsed.
    #[error("bundle error: {0}")]
    Bundle(#[from] BundleError),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            // Client-facing errors: expose the message directly.
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),

            // A missing object is a 404, not a backend failure.
            ServerError::Storage(StorageError::NotFound(key)) => {
                (StatusCode::NOT_FOUND, format!("not found: {key}"))
            }

            // Internal errors: log the full detail, return a generic
            // message.
            ServerError::Storage(e) => {
                error!(error = %e, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
            ServerError::Bundle(e) => {
                error!(error = %e, "bundle error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<BundleStorageError> for ServerError {
    fn from(e: BundleStorageError) -> Self {
        match e {
            BundleStorageError::Storage(e) => ServerError::Storage(e),
            BundleStorageError::Bundle(e) => ServerError::Bundle(e),
        }
    }
}

impl From<ManifestError> for ServerError {
    fn from(e: ManifestError) -> Self {
        match e {
            ManifestError::Bundle(e) => ServerError::Bundle(e),
            ManifestError::PlatformMissing(_) => ServerError::Internal(e.to_string()),
        }
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}
