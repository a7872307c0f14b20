use serde::Serialize;
use utoipa::ToSchema;

/// Response for a successfully ingested bundle.
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    /// Storage key the bundle was written to.
    pub path: String,
}
