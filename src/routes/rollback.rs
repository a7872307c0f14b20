//! Rollback as republish.
//!
//! There is no backward timestamp manipulation anywhere in the system: the
//! newest release row always wins.  Rolling back therefore means copying a
//! previously stored artifact to a fresh timestamp key and inserting a new
//! release row that keeps the source's `update_id`, so clients already on
//! that content are still recognised as up to date by the identity
//! comparison.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use tracing::info;
use utoipa::OpenApi;

use crate::db::NewRelease;
use crate::error::ServerError;
use crate::schemas::rollback::{RollbackRequest, RollbackResponse};
use crate::state::AppState;
use crate::updates::update_key;

const DEFAULT_COMMIT_MESSAGE: &str = "No message provided";

#[derive(OpenApi)]
#[openapi(paths(rollback))]
pub struct RollbackApi;

/// Register the rollback route.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/rollback", post(rollback))
}

/// Republish a stored release (`POST /api/rollback`).
///
/// Failure after the copy begins leaves the copy behind; there is no
/// automatic undo (documented gap).
#[utoipa::path(
    post,
    path = "/api/rollback",
    tag = "updates",
    request_body = RollbackRequest,
    responses(
        (status = 200, description = "Artifact republished as the newest release", body = RollbackResponse),
        (status = 400, description = "Missing path, runtimeVersion, or commitHash"),
        (status = 404, description = "Source artifact does not exist"),
        (status = 500, description = "Storage or database failure"),
    )
)]
pub async fn rollback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RollbackRequest>,
) -> Result<Json<RollbackResponse>, ServerError> {
    let Some(path) = request.path.filter(|p| !p.is_empty()) else {
        return Err(ServerError::BadRequest("Missing path".to_owned()));
    };
    let Some(runtime_version) = request.runtime_version.filter(|v| !v.is_empty()) else {
        return Err(ServerError::BadRequest("Missing runtimeVersion".to_owned()));
    };
    let Some(commit_hash) = request.commit_hash.filter(|h| !h.is_empty()) else {
        return Err(ServerError::BadRequest("Missing commitHash".to_owned()));
    };
    let commit_message = request
        .commit_message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_owned());

    let now = Utc::now();
    let new_path = update_key(&runtime_version, now);

    state.storage.copy_file(&path, &new_path).await?;

    // The republished row keeps the source's content identity.
    let source = state.db.get_release_by_path(&path).await?;
    let update_id = source.and_then(|release| release.update_id);

    state
        .db
        .create_release(NewRelease {
            runtime_version: runtime_version.clone(),
            path: new_path.clone(),
            timestamp: now,
            commit_hash,
            commit_message,
            update_id,
        })
        .await?;

    info!(
        source = %path,
        new_path = %new_path,
        runtime_version = %runtime_version,
        "release rolled back"
    );
    Ok(Json(RollbackResponse {
        success: true,
        new_path,
    }))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use crate::db::NewRelease;
    use crate::test_util;
    use chrono::{Duration, Utc};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn rollback_request(body: serde_json::Value) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri("/api/rollback")
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn republishes_with_preserved_update_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_util::state(dir.path()).await;

        // The historical release being rolled back to, plus a newer one.
        let old_path = "updates/1.0.0/20240101000000.zip";
        state
            .storage
            .upload_file(old_path, b"old-bundle".to_vec())
            .await
            .expect("upload");
        let old = state
            .db
            .create_release(NewRelease {
                runtime_version: "1.0.0".to_owned(),
                path: old_path.to_owned(),
                timestamp: Utc::now() - Duration::days(30),
                commit_hash: "old-hash".to_owned(),
                commit_message: "Old release".to_owned(),
                update_id: Some("aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee".to_owned()),
            })
            .await
            .expect("old release");
        state
            .db
            .create_release(NewRelease {
                runtime_version: "1.0.0".to_owned(),
                path: "updates/1.0.0/20240201000000.zip".to_owned(),
                timestamp: Utc::now() - Duration::days(1),
                commit_hash: "new-hash".to_owned(),
                commit_message: "Broken release".to_owned(),
                update_id: Some("ffffffff-0000-1111-2222-333333333333".to_owned()),
            })
            .await
            .expect("newer release");

        let app = crate::routes::build(state.clone());
        let response = app
            .oneshot(rollback_request(serde_json::json!({
                "path": old_path,
                "runtimeVersion": "1.0.0",
                "commitHash": "rollback-hash",
                "commitMessage": "Roll back to known-good",
            })))
            .await
            .expect("response");

        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = response.into_body().collect().await.expect("body").to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["success"], true);
        let new_path = json["newPath"].as_str().expect("newPath");
        assert!(new_path.starts_with("updates/1.0.0/"));
        assert_ne!(new_path, old_path);

        // The copy holds the same bytes.
        assert_eq!(
            state.storage.download_file(new_path).await.expect("copy"),
            b"old-bundle"
        );

        // The republished row preserves identity, moves time forward, and
        // is now the active release.
        let republished = state
            .db
            .get_release_by_path(new_path)
            .await
            .expect("lookup")
            .expect("republished row");
        assert_eq!(republished.update_id, old.update_id);
        assert!(republished.timestamp > old.timestamp);
        assert_eq!(republished.commit_hash, "rollback-hash");

        let active = state
            .db
            .latest_release_for_runtime_version("1.0.0")
            .await
            .expect("latest")
            .expect("some");
        assert_eq!(active.id, republished.id);
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_without_mutation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_util::state(dir.path()).await;

        for body in [
            serde_json::json!({"runtimeVersion": "1.0.0", "commitHash": "h"}),
            serde_json::json!({"path": "updates/1.0.0/a.zip", "commitHash": "h"}),
            serde_json::json!({"path": "updates/1.0.0/a.zip", "runtimeVersion": "1.0.0"}),
        ] {
            let app = crate::routes::build(state.clone());
            let response = app.oneshot(rollback_request(body)).await.expect("response");
            assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
        }
        assert_eq!(state.db.total_releases_count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn unknown_source_path_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_util::state(dir.path()).await;

        let app = crate::routes::build(state.clone());
        let response = app
            .oneshot(rollback_request(serde_json::json!({
                "path": "updates/1.0.0/missing.zip",
                "runtimeVersion": "1.0.0",
                "commitHash": "h",
            })))
            .await
            .expect("response");
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
        assert_eq!(state.db.total_releases_count().await.expect("count"), 0);
    }
}
