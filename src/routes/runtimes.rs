//! Cursor-paginated runtime catalog.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::runtimes::{CursorQuery, RuntimesPageResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(list_runtimes))]
pub struct RuntimesApi;

/// Register the runtime catalog route.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/runtimes", get(list_runtimes))
}

/// One catalog page (`GET /api/runtimes?cursor=`).
///
/// Entries order by descending numeric-segment version comparison; the
/// cursor is the runtime version the page walk continues at.
#[utoipa::path(
    get,
    path = "/api/runtimes",
    tag = "runtimes",
    params(CursorQuery),
    responses(
        (status = 200, description = "One catalog page", body = RuntimesPageResponse),
        (status = 500, description = "Database failure"),
    )
)]
pub async fn list_runtimes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CursorQuery>,
) -> Result<Json<RuntimesPageResponse>, ServerError> {
    let cursor = query.cursor.unwrap_or_default();
    let page = state.db.list_runtimes(&cursor).await?;
    Ok(Json(page.into()))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use crate::db::NewRelease;
    use crate::test_util;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn get_page(
        state: std::sync::Arc<crate::state::AppState>,
        uri: &str,
    ) -> serde_json::Value {
        let app = crate::routes::build(state);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(axum::body::Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn catalog_orders_numerically_and_aggregates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_util::state(dir.path()).await;

        for (runtime, path) in [
            ("2.0.0", "updates/2.0.0/a.zip"),
            ("10.0.0", "updates/10.0.0/b.zip"),
            ("9.5.1", "updates/9.5.1/c.zip"),
            ("9.5.1", "updates/9.5.1/d.zip"),
        ] {
            state
                .db
                .create_release(NewRelease {
                    runtime_version: runtime.to_owned(),
                    path: path.to_owned(),
                    timestamp: Utc::now(),
                    commit_hash: "h".to_owned(),
                    commit_message: "m".to_owned(),
                    update_id: None,
                })
                .await
                .expect("release");
        }

        let json = get_page(state, "/api/runtimes").await;
        let data = json["data"].as_array().expect("data");
        let versions: Vec<&str> = data
            .iter()
            .map(|e| e["runtimeVersion"].as_str().expect("version"))
            .collect();
        assert_eq!(versions, vec!["10.0.0", "9.5.1", "2.0.0"]);
        assert_eq!(data[1]["totalReleases"], 2);
        assert_eq!(json["hasNextCursor"], false);
        assert_eq!(json["nextCursor"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn cursor_walk_pages_without_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_util::state(dir.path()).await;

        for n in 1..=30 {
            state
                .db
                .create_release(NewRelease {
                    runtime_version: format!("{n}.0.0"),
                    path: format!("updates/{n}.0.0/a.zip"),
                    timestamp: Utc::now(),
                    commit_hash: "h".to_owned(),
                    commit_message: "m".to_owned(),
                    update_id: None,
                })
                .await
                .expect("release");
        }

        // First page is padded to 23 rows; the probe row becomes the
        // cursor and opens the second page.
        let first = get_page(state.clone(), "/api/runtimes").await;
        assert_eq!(first["data"].as_array().expect("data").len(), 23);
        assert_eq!(first["hasNextCursor"], true);
        let cursor = first["nextCursor"].as_str().expect("cursor").to_owned();
        assert_eq!(cursor, "7.0.0");

        let second = get_page(state, &format!("/api/runtimes?cursor={cursor}")).await;
        let data = second["data"].as_array().expect("data");
        assert_eq!(data.len(), 7);
        assert_eq!(data[0]["runtimeVersion"], "7.0.0");
        assert_eq!(second["hasNextCursor"], false);
    }
}
