use serde::Serialize;
use utoipa::ToSchema;

use crate::db::TrackingMetric;

/// Install count for one platform.
#[derive(Debug, Serialize, ToSchema)]
pub struct TrackingMetricResponse {
    pub platform: String,
    pub count: i64,
}

impl From<TrackingMetric> for TrackingMetricResponse {
    fn from(metric: TrackingMetric) -> Self {
        Self {
            platform: metric.platform,
            count: metric.count,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllTrackingResponse {
    pub trackings: Vec<TrackingMetricResponse>,
    pub total_releases: i64,
}
