//! Install telemetry reads.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::tracking::{AllTrackingResponse, TrackingMetricResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(all_tracking, monthly_tracking, release_tracking))]
pub struct TrackingApi;

/// Register tracking metric routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tracking/all", get(all_tracking))
        .route("/tracking/monthly", get(monthly_tracking))
        .route("/tracking/{id}", get(release_tracking))
}

/// Global install counts (`GET /api/tracking/all`).
#[utoipa::path(
    get,
    path = "/api/tracking/all",
    tag = "tracking",
    responses(
        (status = 200, description = "Per-platform counts plus release total", body = AllTrackingResponse),
        (status = 500, description = "Database failure"),
    )
)]
pub async fn all_tracking(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AllTrackingResponse>, ServerError> {
    let trackings = state.db.tracking_metrics_for_all_releases().await?;
    let total_releases = state.db.total_releases_count().await?;
    Ok(Json(AllTrackingResponse {
        trackings: trackings.into_iter().map(Into::into).collect(),
        total_releases,
    }))
}

/// Per-day install counts for the trailing month
/// (`GET /api/tracking/monthly`), keyed by `YYYY-MM-DD`.
#[utoipa::path(
    get,
    path = "/api/tracking/monthly",
    tag = "tracking",
    responses(
        (status = 200, description = "Per-day, per-platform counts"),
        (status = 500, description = "Database failure"),
    )
)]
pub async fn monthly_tracking(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<String, Vec<TrackingMetricResponse>>>, ServerError> {
    let metrics = state.db.tracking_metrics_last_month().await?;
    Ok(Json(
        metrics
            .into_iter()
            .map(|(day, day_metrics)| (day, day_metrics.into_iter().map(Into::into).collect()))
            .collect(),
    ))
}

/// Install counts for one release (`GET /api/tracking/{id}`).
#[utoipa::path(
    get,
    path = "/api/tracking/{id}",
    tag = "tracking",
    params(("id" = String, Path, description = "Release ID")),
    responses(
        (status = 200, description = "Per-platform counts", body = [TrackingMetricResponse]),
        (status = 500, description = "Database failure"),
    )
)]
pub async fn release_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TrackingMetricResponse>>, ServerError> {
    if id.trim().is_empty() {
        return Err(ServerError::BadRequest("Release ID is required".to_owned()));
    }
    let metrics = state.db.release_tracking_metrics(&id).await?;
    Ok(Json(metrics.into_iter().map(Into::into).collect()))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use crate::db::{NewRelease, NewTracking};
    use crate::test_util;
    use crate::updates::Platform;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn global_and_per_release_counts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_util::state(dir.path()).await;

        let release = state
            .db
            .create_release(NewRelease {
                runtime_version: "1.0.0".to_owned(),
                path: "updates/1.0.0/a.zip".to_owned(),
                timestamp: Utc::now(),
                commit_hash: "h".to_owned(),
                commit_message: "m".to_owned(),
                update_id: None,
            })
            .await
            .expect("release");
        for platform in [Platform::Ios, Platform::Ios, Platform::Android] {
            state
                .db
                .create_tracking(NewTracking {
                    release_id: release.id.clone(),
                    platform,
                    download_timestamp: None,
                })
                .await
                .expect("tracking");
        }

        let app = crate::routes::build(state.clone());
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/tracking/all")
                    .body(axum::body::Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(json["totalReleases"], 1);
        let trackings = json["trackings"].as_array().expect("trackings");
        assert_eq!(trackings.len(), 2);

        let app = crate::routes::build(state);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri(format!("/api/tracking/{}", release.id))
                    .body(axum::body::Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        let ios = json
            .as_array()
            .expect("metrics")
            .iter()
            .find(|m| m["platform"] == "ios")
            .expect("ios metric");
        assert_eq!(ios["count"], 2);
    }

    #[tokio::test]
    async fn monthly_counts_bucket_by_day() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_util::state(dir.path()).await;

        let release = state
            .db
            .create_release(NewRelease {
                runtime_version: "1.0.0".to_owned(),
                path: "updates/1.0.0/a.zip".to_owned(),
                timestamp: Utc::now(),
                commit_hash: "h".to_owned(),
                commit_message: "m".to_owned(),
                update_id: None,
            })
            .await
            .expect("release");
        state
            .db
            .create_tracking(NewTracking {
                release_id: release.id,
                platform: Platform::Android,
                download_timestamp: None,
            })
            .await
            .expect("tracking");

        let app = crate::routes::build(state);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/tracking/monthly")
                    .body(axum::body::Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).expect("json");

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let day = json.get(&today).expect("today bucket");
        assert_eq!(day[0]["platform"], "android");
        assert_eq!(day[0]["count"], 1);
    }
}
