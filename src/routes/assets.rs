//! Asset serving for manifest fetch URLs.
//!
//! Manifests point every asset and launch bundle at this route; it reads
//! the named entry straight out of the newest bundle for the runtime
//! version and streams the bytes back with an extension-derived content
//! type.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::assets::AssetQuery;
use crate::state::AppState;
use crate::storage::mime_for_path;
use crate::updates::Platform;
use crate::updates::bundle::{Bundle, latest_bundle_path_for_runtime};

#[derive(OpenApi)]
#[openapi(paths(get_asset))]
pub struct AssetsApi;

/// Register the asset route.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/assets", get(get_asset))
}

/// Serve one bundle entry (`GET /api/assets`).
#[utoipa::path(
    get,
    path = "/api/assets",
    tag = "updates",
    params(AssetQuery),
    responses(
        (status = 200, description = "Asset bytes"),
        (status = 400, description = "Missing asset path, runtime version, or unsupported platform"),
        (status = 404, description = "No bundle or no such entry"),
    )
)]
pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AssetQuery>,
) -> Result<Response, ServerError> {
    let asset = query
        .asset
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ServerError::BadRequest("No asset path provided".to_owned()))?;
    query
        .platform
        .as_deref()
        .and_then(|p| p.parse::<Platform>().ok())
        .ok_or_else(|| ServerError::BadRequest("Unsupported platform".to_owned()))?;
    let runtime_version = query
        .runtime_version
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::BadRequest("No runtimeVersion provided".to_owned()))?;

    let bundle_path = latest_bundle_path_for_runtime(&state.storage, &runtime_version)
        .await?
        .ok_or_else(|| {
            ServerError::NotFound(format!("no bundle published for runtime {runtime_version}"))
        })?;

    let mut bundle = Bundle::from_storage(&state.storage, &bundle_path).await?;
    let bytes = bundle
        .read_entry(&asset)?
        .ok_or_else(|| ServerError::NotFound(format!("asset {asset} not found in bundle")))?;

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(mime_for_path(&asset)) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    Ok((StatusCode::OK, headers, bytes).into_response())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
