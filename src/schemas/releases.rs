use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::Release;

/// One catalog row: the stored release metadata joined with the object's
/// size from storage.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseResponse {
    pub id: String,
    pub runtime_version: String,
    pub path: String,
    pub timestamp: DateTime<Utc>,
    pub commit_hash: String,
    pub commit_message: String,
    pub update_id: Option<String>,
    /// Artifact size in bytes.
    pub size: u64,
}

impl ReleaseResponse {
    pub fn from_release(release: Release, size: u64) -> Self {
        Self {
            id: release.id,
            runtime_version: release.runtime_version,
            path: release.path,
            timestamp: release.timestamp,
            commit_hash: release.commit_hash,
            commit_message: release.commit_message,
            update_id: release.update_id,
            size,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReleasesResponse {
    pub releases: Vec<ReleaseResponse>,
}
