use serde::Deserialize;
use utoipa::IntoParams;

/// Query parameters of the asset fetch URLs embedded in manifests.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct AssetQuery {
    /// Entry path of the asset inside the bundle archive.
    pub asset: Option<String>,
    pub runtime_version: Option<String>,
    pub platform: Option<String>,
}
