//! sqlx implementation of the persistence capability set.
//!
//! Runs on the `Any` driver so one implementation serves SQLite and
//! Postgres; the scheme of the connection URL picks the driver at runtime.
//! The Any driver has no migration runner, so the schema (embedded from
//! `migrations/` at compile time, `IF NOT EXISTS` throughout) is applied
//! statement by statement on every connect.
//!
//! The runtime-verified `sqlx::query` form is used deliberately so that no
//! `DATABASE_URL` environment variable is needed at compile time.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::Utc;
use sqlx::AnyPool;
use sqlx::any::AnyConnectOptions;
use uuid::Uuid;

use super::{
    DatabaseError, NewRelease, NewTracking, Release, RuntimePage, Tracking, TrackingMetric,
    catalog, one_month_ago, parse_timestamp,
};

/// Row tuple shared by every `releases` SELECT.
type ReleaseRow = (String, String, String, String, String, String, Option<String>);

const RELEASE_COLUMNS: &str =
    "id, runtime_version, path, timestamp, commit_hash, commit_message, update_id";

const SCHEMA: &str = include_str!("../../migrations/20250301000000_create_releases.sql");

#[derive(Clone, Debug)]
pub struct SqlDatabase {
    pool: AnyPool,
}

impl SqlDatabase {
    /// Open (or create) the database at `url` and apply the schema.
    ///
    /// `url` should be a sqlx-compatible connection string, e.g.
    /// `"sqlite://airlift.db?mode=rwc"` or `"postgres://…"`.
    pub async fn connect(url: &str) -> Result<Self, DatabaseError> {
        sqlx::any::install_default_drivers();
        let options = AnyConnectOptions::from_str(url)?;
        let pool = AnyPool::connect_with(options).await?;

        for statement in SCHEMA.split(';') {
            let sql: String = statement
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");
            if sql.trim().is_empty() {
                continue;
            }
            sqlx::query(&sql).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub async fn create_release(&self, release: NewRelease) -> Result<Release, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let timestamp = release.timestamp.to_rfc3339();
        sqlx::query(
            "INSERT INTO releases (id, runtime_version, path, timestamp, commit_hash, commit_message, update_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&id)
        .bind(&release.runtime_version)
        .bind(&release.path)
        .bind(&timestamp)
        .bind(&release.commit_hash)
        .bind(&release.commit_message)
        .bind(&release.update_id)
        .execute(&self.pool)
        .await?;

        Ok(Release {
            id,
            runtime_version: release.runtime_version,
            path: release.path,
            timestamp: release.timestamp,
            commit_hash: release.commit_hash,
            commit_message: release.commit_message,
            update_id: release.update_id,
        })
    }

    pub async fn get_release(&self, id: &str) -> Result<Option<Release>, DatabaseError> {
        let row: Option<ReleaseRow> = sqlx::query_as(&format!(
            "SELECT {RELEASE_COLUMNS} FROM releases WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(release_from_row))
    }

    pub async fn get_release_by_path(&self, path: &str) -> Result<Option<Release>, DatabaseError> {
        let row: Option<ReleaseRow> = sqlx::query_as(&format!(
            "SELECT {RELEASE_COLUMNS} FROM releases WHERE path = ?1 LIMIT 1"
        ))
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(release_from_row))
    }

    pub async fn list_releases(&self) -> Result<Vec<Release>, DatabaseError> {
        let rows: Vec<ReleaseRow> = sqlx::query_as(&format!(
            "SELECT {RELEASE_COLUMNS} FROM releases ORDER BY timestamp DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(release_from_row).collect())
    }

    pub async fn list_releases_by_runtime_version(
        &self,
        runtime_version: &str,
    ) -> Result<Vec<Release>, DatabaseError> {
        let rows: Vec<ReleaseRow> = sqlx::query_as(&format!(
            "SELECT {RELEASE_COLUMNS} FROM releases WHERE runtime_version = ?1 \
             ORDER BY timestamp DESC"
        ))
        .bind(runtime_version)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(release_from_row).collect())
    }

    pub async fn latest_release_for_runtime_version(
        &self,
        runtime_version: &str,
    ) -> Result<Option<Release>, DatabaseError> {
        let row: Option<ReleaseRow> = sqlx::query_as(&format!(
            "SELECT {RELEASE_COLUMNS} FROM releases WHERE runtime_version = ?1 \
             ORDER BY timestamp DESC LIMIT 1"
        ))
        .bind(runtime_version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(release_from_row))
    }

    pub async fn create_tracking(&self, tracking: NewTracking) -> Result<Tracking, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let download_timestamp = tracking.download_timestamp.unwrap_or_else(Utc::now);
        sqlx::query(
            "INSERT INTO releases_tracking (id, release_id, download_timestamp, platform) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&id)
        .bind(&tracking.release_id)
        .bind(download_timestamp.to_rfc3339())
        .bind(tracking.platform.as_str())
        .execute(&self.pool)
        .await?;

        Ok(Tracking {
            id,
            release_id: tracking.release_id,
            download_timestamp,
            platform: tracking.platform.as_str().to_owned(),
        })
    }

    pub async fn release_tracking_metrics(
        &self,
        release_id: &str,
    ) -> Result<Vec<TrackingMetric>, DatabaseError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT platform, COUNT(*) FROM releases_tracking \
             WHERE release_id = ?1 GROUP BY platform ORDER BY platform",
        )
        .bind(release_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(platform, count)| TrackingMetric { platform, count })
            .collect())
    }

    pub async fn tracking_metrics_for_all_releases(
        &self,
    ) -> Result<Vec<TrackingMetric>, DatabaseError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT platform, COUNT(*) FROM releases_tracking GROUP BY platform ORDER BY platform",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(platform, count)| TrackingMetric { platform, count })
            .collect())
    }

    pub async fn trackings_last_month(&self) -> Result<Vec<Tracking>, DatabaseError> {
        let cutoff = one_month_ago().to_rfc3339();
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT id, release_id, download_timestamp, platform FROM releases_tracking \
             WHERE download_timestamp >= ?1 ORDER BY download_timestamp DESC",
        )
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, release_id, download_timestamp, platform)| Tracking {
                id,
                release_id,
                download_timestamp: parse_timestamp(&download_timestamp),
                platform,
            })
            .collect())
    }

    pub async fn tracking_metrics_last_month(
        &self,
    ) -> Result<BTreeMap<String, Vec<TrackingMetric>>, DatabaseError> {
        let cutoff = one_month_ago().to_rfc3339();
        // RFC 3339 text makes the day a fixed-width prefix.
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT substr(download_timestamp, 1, 10) AS day, platform, COUNT(*) \
             FROM releases_tracking WHERE download_timestamp >= ?1 \
             GROUP BY day, platform ORDER BY day, platform",
        )
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut metrics: BTreeMap<String, Vec<TrackingMetric>> = BTreeMap::new();
        for (day, platform, count) in rows {
            metrics
                .entry(day)
                .or_default()
                .push(TrackingMetric { platform, count });
        }
        Ok(metrics)
    }

    pub async fn total_releases_count(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM releases")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn total_runtimes_count(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(DISTINCT runtime_version) FROM releases")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn list_runtimes(&self, cursor: &str) -> Result<RuntimePage, DatabaseError> {
        // Group in SQL, order and page in the shared policy: SQLite has no
        // array comparison to express the numeric-segment ordering.
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT runtime_version, MAX(timestamp), COUNT(*) FROM releases \
             GROUP BY runtime_version",
        )
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .into_iter()
            .map(|(runtime_version, last_released_at, total_releases)| catalog::RuntimeEntry {
                runtime_version,
                last_released_at: parse_timestamp(&last_released_at),
                total_releases,
            })
            .collect();
        Ok(catalog::paginate(entries, cursor))
    }
}

fn release_from_row(row: ReleaseRow) -> Release {
    let (id, runtime_version, path, timestamp, commit_hash, commit_message, update_id) = row;
    Release {
        id,
        runtime_version,
        path,
        timestamp: parse_timestamp(&timestamp),
        commit_hash,
        commit_message,
        update_id,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util;
    use crate::updates::Platform;
    use chrono::Duration;

    fn release(runtime_version: &str, path: &str, at: chrono::DateTime<Utc>) -> NewRelease {
        NewRelease {
            runtime_version: runtime_version.to_owned(),
            path: path.to_owned(),
            timestamp: at,
            commit_hash: "abc123".to_owned(),
            commit_message: "Test commit".to_owned(),
            update_id: Some("aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee".to_owned()),
        }
    }

    #[tokio::test]
    async fn create_then_fetch_by_id_and_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = test_util::sql_database(dir.path()).await;

        let created = db
            .create_release(release("1.0.0", "updates/1.0.0/a.zip", Utc::now()))
            .await
            .expect("create");

        let by_id = db.get_release(&created.id).await.expect("get").expect("some");
        assert_eq!(by_id.path, "updates/1.0.0/a.zip");
        assert_eq!(by_id.update_id, created.update_id);

        let by_path = db
            .get_release_by_path("updates/1.0.0/a.zip")
            .await
            .expect("get by path")
            .expect("some");
        assert_eq!(by_path.id, created.id);

        assert!(db.get_release("missing").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn listings_are_newest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = test_util::sql_database(dir.path()).await;
        let base = Utc::now();

        db.create_release(release("1.0.0", "updates/1.0.0/old.zip", base - Duration::hours(2)))
            .await
            .expect("old");
        db.create_release(release("1.0.0", "updates/1.0.0/new.zip", base))
            .await
            .expect("new");
        db.create_release(release("2.0.0", "updates/2.0.0/mid.zip", base - Duration::hours(1)))
            .await
            .expect("mid");

        let all = db.list_releases().await.expect("list");
        assert_eq!(
            all.iter().map(|r| r.path.as_str()).collect::<Vec<_>>(),
            vec!["updates/1.0.0/new.zip", "updates/2.0.0/mid.zip", "updates/1.0.0/old.zip"]
        );

        let one_runtime = db
            .list_releases_by_runtime_version("1.0.0")
            .await
            .expect("list by runtime");
        assert_eq!(
            one_runtime.iter().map(|r| r.path.as_str()).collect::<Vec<_>>(),
            vec!["updates/1.0.0/new.zip", "updates/1.0.0/old.zip"]
        );

        let latest = db
            .latest_release_for_runtime_version("1.0.0")
            .await
            .expect("latest")
            .expect("some");
        assert_eq!(latest.path, "updates/1.0.0/new.zip");
    }

    #[tokio::test]
    async fn tracking_metrics_group_by_platform() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = test_util::sql_database(dir.path()).await;

        let served = db
            .create_release(release("1.0.0", "updates/1.0.0/a.zip", Utc::now()))
            .await
            .expect("release");
        let other = db
            .create_release(release("2.0.0", "updates/2.0.0/b.zip", Utc::now()))
            .await
            .expect("release");

        for platform in [Platform::Ios, Platform::Ios, Platform::Android] {
            db.create_tracking(NewTracking {
                release_id: served.id.clone(),
                platform,
                download_timestamp: None,
            })
            .await
            .expect("tracking");
        }
        db.create_tracking(NewTracking {
            release_id: other.id.clone(),
            platform: Platform::Ios,
            download_timestamp: None,
        })
        .await
        .expect("tracking");

        let per_release = db.release_tracking_metrics(&served.id).await.expect("metrics");
        assert_eq!(
            per_release,
            vec![
                TrackingMetric { platform: "android".to_owned(), count: 1 },
                TrackingMetric { platform: "ios".to_owned(), count: 2 },
            ]
        );

        let all = db.tracking_metrics_for_all_releases().await.expect("all metrics");
        assert_eq!(
            all,
            vec![
                TrackingMetric { platform: "android".to_owned(), count: 1 },
                TrackingMetric { platform: "ios".to_owned(), count: 3 },
            ]
        );
    }

    #[tokio::test]
    async fn month_window_excludes_old_trackings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = test_util::sql_database(dir.path()).await;

        let served = db
            .create_release(release("1.0.0", "updates/1.0.0/a.zip", Utc::now()))
            .await
            .expect("release");

        db.create_tracking(NewTracking {
            release_id: served.id.clone(),
            platform: Platform::Ios,
            download_timestamp: Some(Utc::now()),
        })
        .await
        .expect("recent");
        db.create_tracking(NewTracking {
            release_id: served.id.clone(),
            platform: Platform::Android,
            download_timestamp: Some(Utc::now() - Duration::days(45)),
        })
        .await
        .expect("stale");

        let recent = db.trackings_last_month().await.expect("window");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].platform, "ios");

        let by_day = db.tracking_metrics_last_month().await.expect("metrics");
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let day_metrics = by_day.get(&today).expect("today bucket");
        assert_eq!(day_metrics, &vec![TrackingMetric { platform: "ios".to_owned(), count: 1 }]);
    }

    #[tokio::test]
    async fn counts_and_runtime_catalog() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = test_util::sql_database(dir.path()).await;
        let base = Utc::now();

        for (version, path, at) in [
            ("2.0.0", "updates/2.0.0/a.zip", base - Duration::hours(3)),
            ("10.0.0", "updates/10.0.0/b.zip", base - Duration::hours(2)),
            ("9.5.1", "updates/9.5.1/c.zip", base - Duration::hours(1)),
            ("9.5.1", "updates/9.5.1/d.zip", base),
        ] {
            db.create_release(release(version, path, at)).await.expect("release");
        }

        assert_eq!(db.total_releases_count().await.expect("releases"), 4);
        assert_eq!(db.total_runtimes_count().await.expect("runtimes"), 3);

        let page = db.list_runtimes("").await.expect("page");
        assert_eq!(
            page.data.iter().map(|e| e.runtime_version.as_str()).collect::<Vec<_>>(),
            vec!["10.0.0", "9.5.1", "2.0.0"]
        );
        let grouped = page
            .data
            .iter()
            .find(|e| e.runtime_version == "9.5.1")
            .expect("9.5.1 entry");
        assert_eq!(grouped.total_releases, 2);
        assert!(!page.has_next_cursor);
    }
}
