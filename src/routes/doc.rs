use utoipa::OpenApi;

use crate::routes::{assets, health, manifest, releases, rollback, runtimes, tracking, upload};

#[derive(OpenApi)]
#[openapi(info(
    title = "airlift-server",
    description = "Over-the-air bundle update server API",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(upload::UploadApi::openapi());
    root.merge(manifest::ManifestApi::openapi());
    root.merge(assets::AssetsApi::openapi());
    root.merge(rollback::RollbackApi::openapi());
    root.merge(releases::ReleasesApi::openapi());
    root.merge(runtimes::RuntimesApi::openapi());
    root.merge(tracking::TrackingApi::openapi());
    root
}
