//! Bundle upload ingestion.
//!
//! Accepts a multipart form carrying the zipped bundle plus its release
//! metadata, derives the content-addressed update id from the archive's
//! `metadata.json`, writes the artifact at its timestamp key and records
//! the release row, in that order, and only when every earlier step
//! succeeded.  There is no compensation once the storage write has begun:
//! a database failure after it leaves the object behind (documented gap).

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use tracing::{debug, info};
use utoipa::OpenApi;

use crate::db::NewRelease;
use crate::error::ServerError;
use crate::schemas::upload::UploadResponse;
use crate::state::AppState;
use crate::updates::bundle::{Bundle, METADATA_ENTRY};
use crate::updates::{fingerprint, update_key};

const DEFAULT_COMMIT_MESSAGE: &str = "No message provided";

#[derive(OpenApi)]
#[openapi(paths(upload))]
pub struct UploadApi;

/// Register the upload route, with the body limit sized for bundles.
pub fn router(state: &AppState) -> Router<Arc<AppState>> {
    Router::new()
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(
            state.config.max_upload_size_mb * 1024 * 1024,
        ))
}

/// Publish a bundle (`POST /api/upload`).
///
/// Multipart fields: `file` (zip archive), `runtimeVersion`, `commitHash`,
/// optional `commitMessage`, optional `uploadKey`.  The upload secret is
/// taken from the `Authorization: Bearer` header when present (it must
/// match in that case even if the form field is also correct), otherwise
/// from the `uploadKey` field.
#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "updates",
    responses(
        (status = 200, description = "Bundle stored and release recorded", body = UploadResponse),
        (status = 400, description = "Missing file, runtime version, or commit hash"),
        (status = 401, description = "Wrong upload key"),
        (status = 500, description = "Storage or database failure"),
    )
)]
pub async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    debug!("received bundle upload request");

    // An Authorization header, when present, decides on its own: it must
    // be exactly `Bearer <secret>`.
    let authorization = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    if let Some(header) = &authorization {
        if header.strip_prefix("Bearer ") != Some(state.config.upload_key.as_str()) {
            return Err(ServerError::Unauthorized("wrong upload key".to_owned()));
        }
    }

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut runtime_version: Option<String> = None;
    let mut commit_hash: Option<String> = None;
    let mut commit_message: Option<String> = None;
    let mut upload_key_field: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("failed to read multipart field: {e}")))?
    {
        let name = field.name().unwrap_or("").to_owned();
        match name.as_str() {
            "file" => {
                let bytes: bytes::Bytes = field.bytes().await.map_err(|e| {
                    ServerError::BadRequest(format!("failed to read uploaded file: {e}"))
                })?;
                file_bytes = Some(bytes.to_vec());
            }
            "runtimeVersion" => runtime_version = read_text(field).await?,
            "commitHash" => commit_hash = read_text(field).await?,
            "commitMessage" => commit_message = read_text(field).await?,
            "uploadKey" => upload_key_field = read_text(field).await?,
            _ => {
                // Drain unknown fields so the stream keeps advancing.
                let _ = field.bytes().await;
            }
        }
    }

    // Without a bearer header the form field carries the secret.
    if authorization.is_none()
        && upload_key_field.as_deref() != Some(state.config.upload_key.as_str())
    {
        return Err(ServerError::Unauthorized("wrong upload key".to_owned()));
    }

    let (Some(file), Some(runtime_version), Some(commit_hash)) =
        (file_bytes, runtime_version, commit_hash)
    else {
        return Err(ServerError::BadRequest(
            "Missing file, runtime version, or commit hash".to_owned(),
        ));
    };
    let commit_message = commit_message.unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_owned());

    // Content identity comes from metadata.json alone: byte-identical
    // metadata always maps to the same update id.
    let mut bundle = Bundle::from_bytes(file)?;
    let metadata_bytes = bundle.require_entry(METADATA_ENTRY)?;
    let update_id = fingerprint::update_id_for_metadata(&metadata_bytes);

    let now = Utc::now();
    let path = update_key(&runtime_version, now);
    let stored_path = state.storage.upload_file(&path, bundle.into_bytes()).await?;

    let release = state
        .db
        .create_release(NewRelease {
            runtime_version: runtime_version.clone(),
            path: stored_path.clone(),
            timestamp: now,
            commit_hash,
            commit_message,
            update_id: Some(update_id),
        })
        .await?;

    info!(
        path = %stored_path,
        runtime_version = %runtime_version,
        release_id = %release.id,
        "bundle published"
    );
    Ok(Json(UploadResponse {
        success: true,
        path: stored_path,
    }))
}

/// Text of a form field, with the empty string treated as absent.
async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<Option<String>, ServerError> {
    let text = field
        .text()
        .await
        .map_err(|e| ServerError::BadRequest(format!("failed to read multipart field: {e}")))?;
    Ok(Some(text).filter(|t| !t.is_empty()))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
