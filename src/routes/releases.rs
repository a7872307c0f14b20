//! Release catalog listings.
//!
//! Listings join the storage tree with the release rows: storage
//! enumerates what actually exists (and contributes the object size),
//! while the database contributes the commit metadata; objects without a
//! matching row are skipped.  The global listing walks every runtime
//! directory per request; fine at the catalog sizes this serves, and only
//! the runtime catalog is paginated.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::db::Release;
use crate::error::ServerError;
use crate::schemas::releases::{ReleaseResponse, ReleasesResponse};
use crate::state::AppState;
use crate::updates::runtime_directory;

#[derive(OpenApi)]
#[openapi(paths(list_releases, list_releases_for_runtime))]
pub struct ReleasesApi;

/// Register release listing routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/releases", get(list_releases))
        .route("/releases/{runtime_version}", get(list_releases_for_runtime))
}

/// All releases across every runtime version (`GET /api/releases`).
#[utoipa::path(
    get,
    path = "/api/releases",
    tag = "releases",
    responses(
        (status = 200, description = "Releases with artifact sizes", body = ReleasesResponse),
        (status = 500, description = "Storage or database failure"),
    )
)]
pub async fn list_releases(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReleasesResponse>, ServerError> {
    let directories = state.storage.list_directories("updates/").await?;
    let rows = state.db.list_releases().await?;

    let mut releases = Vec::new();
    for directory in directories {
        releases.extend(join_directory(&state, &directory, &rows).await?);
    }
    Ok(Json(ReleasesResponse { releases }))
}

/// Releases of one runtime version (`GET /api/releases/{runtime_version}`).
#[utoipa::path(
    get,
    path = "/api/releases/{runtime_version}",
    tag = "releases",
    params(("runtime_version" = String, Path, description = "Runtime version to list")),
    responses(
        (status = 200, description = "Releases with artifact sizes", body = ReleasesResponse),
        (status = 500, description = "Storage or database failure"),
    )
)]
pub async fn list_releases_for_runtime(
    State(state): State<Arc<AppState>>,
    Path(runtime_version): Path<String>,
) -> Result<Json<ReleasesResponse>, ServerError> {
    let rows = state
        .db
        .list_releases_by_runtime_version(&runtime_version)
        .await?;
    let releases = join_directory(&state, &runtime_version, &rows).await?;
    Ok(Json(ReleasesResponse { releases }))
}

/// Join one runtime directory's objects with their release rows, keyed by
/// storage path.
async fn join_directory(
    state: &AppState,
    runtime_version: &str,
    rows: &[Release],
) -> Result<Vec<ReleaseResponse>, ServerError> {
    let directory = runtime_directory(runtime_version);
    let files = state.storage.list_files(&directory).await?;

    let mut releases = Vec::new();
    for file in files {
        let path = format!("{directory}/{}", file.name);
        let Some(release) = rows.iter().find(|r| r.path == path) else {
            continue;
        };
        releases.push(ReleaseResponse::from_release(release.clone(), file.size));
    }
    Ok(releases)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
