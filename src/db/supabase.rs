//! Supabase (PostgREST) implementation of the persistence capability set.
//!
//! Filters and ordering ride on PostgREST query parameters; inserts ask for
//! `return=representation` so the created row comes back in one round trip;
//! counts use HEAD requests with `Prefer: count=exact` and read the total
//! off the `Content-Range` header.  Aggregations the REST surface cannot
//! express (distinct runtime versions, catalog grouping) run in-process on
//! the fetched rows, and the catalog page goes through the shared policy in
//! [`catalog`] so this provider pages exactly like the SQL one.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Deserialize;

use super::{
    DatabaseError, NewRelease, NewTracking, Release, RuntimePage, Tracking, TrackingMetric,
    catalog, one_month_ago, parse_timestamp,
};
use crate::config::Config;
use crate::updates::Platform;

const RELEASES: &str = "releases";
const RELEASES_TRACKING: &str = "releases_tracking";

#[derive(Debug)]
pub struct SupabaseDatabase {
    client: reqwest::Client,
    base: String,
    api_key: String,
}

/// `releases` row as PostgREST serialises it.
#[derive(Debug, Deserialize)]
struct ReleaseRow {
    #[serde(default)]
    id: String,
    runtime_version: String,
    path: String,
    timestamp: String,
    commit_hash: String,
    commit_message: String,
    #[serde(default)]
    update_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackingRow {
    id: String,
    release_id: String,
    download_timestamp: String,
    platform: String,
}

#[derive(Debug, Deserialize)]
struct RuntimeRow {
    runtime_version: String,
    timestamp: String,
}

impl SupabaseDatabase {
    pub fn new(cfg: &Config) -> Result<Self, DatabaseError> {
        let (url, api_key) = match (&cfg.supabase_url, &cfg.supabase_api_key) {
            (Some(url), Some(key)) => (url.clone(), key.clone()),
            _ => {
                return Err(DatabaseError::Config(
                    "Supabase credentials not configured".to_owned(),
                ));
            }
        };
        Ok(Self {
            client: reqwest::Client::new(),
            base: format!("{}/rest/v1", url.trim_end_matches('/')),
            api_key,
        })
    }

    pub async fn create_release(&self, release: NewRelease) -> Result<Release, DatabaseError> {
        let body = serde_json::json!({
            "runtime_version": release.runtime_version,
            "path": release.path,
            "timestamp": release.timestamp.to_rfc3339(),
            "commit_hash": release.commit_hash,
            "commit_message": release.commit_message,
            "update_id": release.update_id,
        });
        let created: Vec<ReleaseRow> = self.insert(RELEASES, &body).await?;
        created
            .into_iter()
            .next()
            .map(release_from_row)
            .ok_or_else(|| DatabaseError::Rest("insert returned no row".to_owned()))
    }

    pub async fn get_release(&self, id: &str) -> Result<Option<Release>, DatabaseError> {
        let rows: Vec<ReleaseRow> = self
            .select(RELEASES, &[("select", "*".to_owned()), ("id", format!("eq.{id}")), ("limit", "1".to_owned())])
            .await?;
        Ok(rows.into_iter().next().map(release_from_row))
    }

    pub async fn get_release_by_path(&self, path: &str) -> Result<Option<Release>, DatabaseError> {
        let rows: Vec<ReleaseRow> = self
            .select(RELEASES, &[("select", "*".to_owned()), ("path", format!("eq.{path}")), ("limit", "1".to_owned())])
            .await?;
        Ok(rows.into_iter().next().map(release_from_row))
    }

    pub async fn list_releases(&self) -> Result<Vec<Release>, DatabaseError> {
        let rows: Vec<ReleaseRow> = self
            .select(RELEASES, &[("select", "*".to_owned()), ("order", "timestamp.desc".to_owned())])
            .await?;
        Ok(rows.into_iter().map(release_from_row).collect())
    }

    pub async fn list_releases_by_runtime_version(
        &self,
        runtime_version: &str,
    ) -> Result<Vec<Release>, DatabaseError> {
        let rows: Vec<ReleaseRow> = self
            .select(
                RELEASES,
                &[
                    ("select", "*".to_owned()),
                    ("runtime_version", format!("eq.{runtime_version}")),
                    ("order", "timestamp.desc".to_owned()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(release_from_row).collect())
    }

    pub async fn latest_release_for_runtime_version(
        &self,
        runtime_version: &str,
    ) -> Result<Option<Release>, DatabaseError> {
        let rows: Vec<ReleaseRow> = self
            .select(
                RELEASES,
                &[
                    ("select", "*".to_owned()),
                    ("runtime_version", format!("eq.{runtime_version}")),
                    ("order", "timestamp.desc".to_owned()),
                    ("limit", "1".to_owned()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next().map(release_from_row))
    }

    pub async fn create_tracking(&self, tracking: NewTracking) -> Result<Tracking, DatabaseError> {
        let download_timestamp = tracking.download_timestamp.unwrap_or_else(Utc::now);
        let body = serde_json::json!({
            "release_id": tracking.release_id,
            "platform": tracking.platform.as_str(),
            "download_timestamp": download_timestamp.to_rfc3339(),
        });
        let created: Vec<TrackingRow> = self.insert(RELEASES_TRACKING, &body).await?;
        created
            .into_iter()
            .next()
            .map(tracking_from_row)
            .ok_or_else(|| DatabaseError::Rest("insert returned no row".to_owned()))
    }

    pub async fn release_tracking_metrics(
        &self,
        release_id: &str,
    ) -> Result<Vec<TrackingMetric>, DatabaseError> {
        self.platform_counts(Some(release_id)).await
    }

    pub async fn tracking_metrics_for_all_releases(
        &self,
    ) -> Result<Vec<TrackingMetric>, DatabaseError> {
        self.platform_counts(None).await
    }

    pub async fn trackings_last_month(&self) -> Result<Vec<Tracking>, DatabaseError> {
        let cutoff = one_month_ago().to_rfc3339();
        let rows: Vec<TrackingRow> = self
            .select(
                RELEASES_TRACKING,
                &[
                    ("select", "*".to_owned()),
                    ("download_timestamp", format!("gte.{cutoff}")),
                    ("order", "download_timestamp.desc".to_owned()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(tracking_from_row).collect())
    }

    pub async fn tracking_metrics_last_month(
        &self,
    ) -> Result<BTreeMap<String, Vec<TrackingMetric>>, DatabaseError> {
        let cutoff = one_month_ago().to_rfc3339();

        #[derive(Debug, Deserialize)]
        struct Row {
            platform: String,
            download_timestamp: String,
        }

        let rows: Vec<Row> = self
            .select(
                RELEASES_TRACKING,
                &[
                    ("select", "platform,download_timestamp".to_owned()),
                    ("download_timestamp", format!("gte.{cutoff}")),
                ],
            )
            .await?;

        let mut metrics: BTreeMap<String, Vec<TrackingMetric>> = BTreeMap::new();
        for row in rows {
            let day = row
                .download_timestamp
                .split('T')
                .next()
                .unwrap_or(&row.download_timestamp)
                .to_owned();
            let bucket = metrics.entry(day).or_default();
            match bucket.iter_mut().find(|m| m.platform == row.platform) {
                Some(metric) => metric.count += 1,
                None => bucket.push(TrackingMetric { platform: row.platform, count: 1 }),
            }
        }
        Ok(metrics)
    }

    pub async fn total_releases_count(&self) -> Result<i64, DatabaseError> {
        self.count(RELEASES, &[]).await
    }

    pub async fn total_runtimes_count(&self) -> Result<i64, DatabaseError> {
        // PostgREST has no COUNT(DISTINCT …); fetch the version column and
        // dedup in-process so the result matches the SQL provider.
        #[derive(Debug, Deserialize)]
        struct Row {
            runtime_version: String,
        }
        let rows: Vec<Row> = self
            .select(RELEASES, &[("select", "runtime_version".to_owned())])
            .await?;
        let distinct: std::collections::BTreeSet<String> =
            rows.into_iter().map(|r| r.runtime_version).collect();
        Ok(distinct.len() as i64)
    }

    pub async fn list_runtimes(&self, cursor: &str) -> Result<RuntimePage, DatabaseError> {
        let rows: Vec<RuntimeRow> = self
            .select(RELEASES, &[("select", "runtime_version,timestamp".to_owned())])
            .await?;

        let mut grouped: BTreeMap<String, catalog::RuntimeEntry> = BTreeMap::new();
        for row in rows {
            let released_at = parse_timestamp(&row.timestamp);
            let entry = grouped
                .entry(row.runtime_version.clone())
                .or_insert_with(|| catalog::RuntimeEntry {
                    runtime_version: row.runtime_version,
                    last_released_at: released_at,
                    total_releases: 0,
                });
            entry.total_releases += 1;
            if released_at > entry.last_released_at {
                entry.last_released_at = released_at;
            }
        }

        Ok(catalog::paginate(grouped.into_values().collect(), cursor))
    }

    // ── PostgREST plumbing ───────────────────────────────────────────────────

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.api_key).header("apikey", &self.api_key)
    }

    async fn select<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, DatabaseError> {
        let response = self
            .authed(self.client.get(format!("{}/{table}", self.base)))
            .query(query)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DatabaseError::Rest(format!("{table} select: status {status}")));
        }
        Ok(response.json().await?)
    }

    async fn insert<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        body: &serde_json::Value,
    ) -> Result<Vec<T>, DatabaseError> {
        let response = self
            .authed(self.client.post(format!("{}/{table}", self.base)))
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DatabaseError::Rest(format!("{table} insert: status {status}")));
        }
        Ok(response.json().await?)
    }

    async fn count(&self, table: &str, filters: &[(&str, String)]) -> Result<i64, DatabaseError> {
        let response = self
            .authed(self.client.head(format!("{}/{table}", self.base)))
            .header("Prefer", "count=exact")
            .query(&[("select", "*")])
            .query(filters)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DatabaseError::Rest(format!("{table} count: status {status}")));
        }
        let content_range = response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| DatabaseError::Rest(format!("{table} count: missing Content-Range")))?;
        parse_content_range_total(content_range)
            .ok_or_else(|| DatabaseError::Rest(format!("{table} count: bad Content-Range '{content_range}'")))
    }

    async fn platform_counts(
        &self,
        release_id: Option<&str>,
    ) -> Result<Vec<TrackingMetric>, DatabaseError> {
        let mut metrics = Vec::new();
        for platform in [Platform::Android, Platform::Ios] {
            let mut filters = vec![("platform", format!("eq.{}", platform.as_str()))];
            if let Some(id) = release_id {
                filters.push(("release_id", format!("eq.{id}")));
            }
            let count = self.count(RELEASES_TRACKING, &filters).await?;
            if count > 0 {
                metrics.push(TrackingMetric {
                    platform: platform.as_str().to_owned(),
                    count,
                });
            }
        }
        Ok(metrics)
    }
}

/// Total from a PostgREST `Content-Range` header, e.g. `0-24/3573` or `*/0`.
fn parse_content_range_total(value: &str) -> Option<i64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

fn release_from_row(row: ReleaseRow) -> Release {
    Release {
        id: row.id,
        runtime_version: row.runtime_version,
        path: row.path,
        timestamp: parse_timestamp(&row.timestamp),
        commit_hash: row.commit_hash,
        commit_message: row.commit_message,
        update_id: row.update_id,
    }
}

fn tracking_from_row(row: TrackingRow) -> Tracking {
    Tracking {
        id: row.id,
        release_id: row.release_id,
        download_timestamp: parse_timestamp(&row.download_timestamp),
        platform: row.platform,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
