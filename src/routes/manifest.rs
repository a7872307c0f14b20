//! Manifest poll endpoint.
//!
//! Every resolved outcome (update, no-update, rollback) is a 200 whose
//! body is a one-part `multipart/form-data` envelope; the part name tells
//! the client whether it holds a `manifest` or a `directive`.  Resolution
//! starts from storage (the newest timestamp-named bundle), and the update
//! id is recomputed from that bundle's `metadata.json` rather than read
//! from the release row, so the comparison stays honest even when storage
//! has been mutated behind the database's back.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};
use utoipa::OpenApi;

use crate::db::NewTracking;
use crate::error::ServerError;
use crate::state::AppState;
use crate::updates::bundle::{
    Bundle, METADATA_ENTRY, ROLLBACK_ENTRY, latest_bundle_path_for_runtime,
};
use crate::updates::manifest::{
    assemble_manifest, envelope, no_update_directive, rollback_directive,
};
use crate::updates::{Platform, fingerprint};

#[derive(OpenApi)]
#[openapi(paths(manifest))]
pub struct ManifestApi;

/// Register the manifest poll route.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/manifest", get(manifest))
}

/// Resolve a client poll (`GET /api/manifest`).
///
/// Request headers: `expo-platform` (`ios`|`android`),
/// `expo-runtime-version`, `expo-protocol-version`,
/// `expo-current-update-id`, optional `expo-embedded-update-id`.
#[utoipa::path(
    get,
    path = "/api/manifest",
    tag = "updates",
    responses(
        (status = 200, description = "Manifest or directive, as one multipart part"),
        (status = 400, description = "Unsupported platform or missing runtime version"),
        (status = 500, description = "Storage or database failure"),
    )
)]
pub async fn manifest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ServerError> {
    let platform = header_value(&headers, "expo-platform")
        .and_then(|v| v.parse::<Platform>().ok())
        .ok_or_else(|| ServerError::BadRequest("Unsupported platform".to_owned()))?;
    let runtime_version = header_value(&headers, "expo-runtime-version")
        .ok_or_else(|| ServerError::BadRequest("No runtimeVersion provided".to_owned()))?;
    let protocol_version = header_value(&headers, "expo-protocol-version")
        .and_then(|v| v.parse::<u8>().ok())
        .unwrap_or(0);
    let current_update_id = header_value(&headers, "expo-current-update-id");
    let embedded_update_id = header_value(&headers, "expo-embedded-update-id");

    debug!(
        platform = %platform,
        runtime_version = %runtime_version,
        protocol_version,
        current_update_id = current_update_id.as_deref().unwrap_or(""),
        embedded_update_id = embedded_update_id.as_deref().unwrap_or(""),
        "manifest poll"
    );

    // Newest stored bundle decides; nothing published means nothing to
    // compare against.
    let Some(bundle_path) =
        latest_bundle_path_for_runtime(&state.storage, &runtime_version).await?
    else {
        return Ok(part_response(protocol_version, "directive", &no_update_directive()));
    };
    let mut bundle = Bundle::from_storage(&state.storage, &bundle_path).await?;

    if bundle.has_entry(ROLLBACK_ENTRY) {
        let commit_time = bundle.entry_modified(ROLLBACK_ENTRY).unwrap_or_else(Utc::now);
        return Ok(part_response(
            protocol_version,
            "directive",
            &rollback_directive(commit_time),
        ));
    }

    let metadata_bytes = bundle.require_entry(METADATA_ENTRY)?;
    let update_id = fingerprint::update_id_for_metadata(&metadata_bytes);
    if current_update_id.as_deref() == Some(update_id.as_str()) {
        return Ok(part_response(protocol_version, "directive", &no_update_directive()));
    }

    let serving_release = state
        .db
        .latest_release_for_runtime_version(&runtime_version)
        .await?;
    let created_at = serving_release
        .as_ref()
        .map(|r| r.timestamp)
        .or_else(|| bundle.entry_modified(METADATA_ENTRY))
        .unwrap_or_else(Utc::now);

    let manifest = assemble_manifest(
        &mut bundle,
        platform,
        &runtime_version,
        &update_id,
        created_at,
        &state.config.public_url,
    )?;
    let payload =
        serde_json::to_value(&manifest).map_err(|e| ServerError::Internal(e.to_string()))?;

    // Telemetry rides behind the response: once the manifest exists, a
    // tracking failure must not turn it into an error.
    match serving_release {
        Some(release) => {
            let insert = state
                .db
                .create_tracking(NewTracking {
                    release_id: release.id,
                    platform,
                    download_timestamp: Some(Utc::now()),
                })
                .await;
            if let Err(e) = insert {
                warn!(error = %e, "failed to record tracking for served manifest");
            }
        }
        None => warn!(
            runtime_version = %runtime_version,
            "serving a bundle with no release row; download not tracked"
        ),
    }

    Ok(part_response(protocol_version, "manifest", &payload))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .filter(|v| !v.is_empty())
}

/// 200 response carrying one named multipart part.
fn part_response(protocol_version: u8, part_name: &str, payload: &Value) -> Response {
    let wrapped = envelope(part_name, payload);

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&wrapped.content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&protocol_version.to_string()) {
        headers.insert("expo-protocol-version", value);
    }
    headers.insert("expo-sfv-version", HeaderValue::from_static("0"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, max-age=0"),
    );

    (StatusCode::OK, headers, wrapped.body).into_response()
}

// ── Tests ──────────────────────────────────────────────────────────────────────
