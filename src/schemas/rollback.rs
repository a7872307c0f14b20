use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Republish request identifying a previously stored release by its
/// storage path.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRequest {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub runtime_version: Option<String>,
    #[serde(default)]
    pub commit_hash: Option<String>,
    #[serde(default)]
    pub commit_message: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RollbackResponse {
    pub success: bool,
    /// Storage key of the republished bundle.
    pub new_path: String,
}
