//! Metadata persistence layer.
//!
//! [`Database`] is a closed enum over the supported providers, chosen once
//! at startup: [`sql::SqlDatabase`] (SQLite or Postgres behind one sqlx
//! `Any` pool, schema applied on connect) and [`supabase::SupabaseDatabase`]
//! (PostgREST).  Both expose the same capability set and share the catalog
//! pagination policy in [`catalog`] so they behave identically.
//!
//! Rows store IDs as TEXT UUIDs and timestamps as RFC 3339 TEXT in UTC;
//! records parse them back into `DateTime<Utc>`, logging and substituting
//! the current time when a stored value is unreadable.

pub mod catalog;
pub mod sql;
pub mod supabase;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use catalog::{RuntimeEntry, RuntimePage};

use crate::config::{Config, DatabaseKind};
use crate::updates::Platform;

/// One published artifact for one runtime version.  Rows are only ever
/// inserted; the newest `timestamp` for a runtime version is the active
/// release.
#[derive(Debug, Clone)]
pub struct Release {
    pub id: String,
    pub runtime_version: String,
    pub path: String,
    pub timestamp: DateTime<Utc>,
    pub commit_hash: String,
    pub commit_message: String,
    pub update_id: Option<String>,
}

/// Fields for inserting a [`Release`]; the row ID is server-generated.
#[derive(Debug, Clone)]
pub struct NewRelease {
    pub runtime_version: String,
    pub path: String,
    pub timestamp: DateTime<Utc>,
    pub commit_hash: String,
    pub commit_message: String,
    pub update_id: Option<String>,
}

/// One recorded download/install event.
#[derive(Debug, Clone)]
pub struct Tracking {
    pub id: String,
    pub release_id: String,
    pub download_timestamp: DateTime<Utc>,
    pub platform: String,
}

/// Fields for inserting a [`Tracking`] row.  `download_timestamp` defaults
/// to the insertion time when absent.
#[derive(Debug, Clone)]
pub struct NewTracking {
    pub release_id: String,
    pub platform: Platform,
    pub download_timestamp: Option<DateTime<Utc>>,
}

/// Install count for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingMetric {
    pub platform: String,
    pub count: i64,
}

/// Errors surfaced by any persistence provider.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("rest database request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rest database error: {0}")]
    Rest(String),

    #[error("invalid database configuration: {0}")]
    Config(String),
}

/// The configured metadata store.
#[derive(Debug)]
pub enum Database {
    Sql(sql::SqlDatabase),
    Supabase(supabase::SupabaseDatabase),
}

impl Database {
    /// Construct the provider selected by `cfg.database_kind`.
    pub async fn connect(cfg: &Config) -> Result<Self, DatabaseError> {
        match cfg.database_kind {
            DatabaseKind::Sql => Ok(Database::Sql(sql::SqlDatabase::connect(&cfg.database_url).await?)),
            DatabaseKind::Supabase => Ok(Database::Supabase(supabase::SupabaseDatabase::new(cfg)?)),
        }
    }

    pub async fn create_release(&self, release: NewRelease) -> Result<Release, DatabaseError> {
        match self {
            Database::Sql(db) => db.create_release(release).await,
            Database::Supabase(db) => db.create_release(release).await,
        }
    }

    pub async fn get_release(&self, id: &str) -> Result<Option<Release>, DatabaseError> {
        match self {
            Database::Sql(db) => db.get_release(id).await,
            Database::Supabase(db) => db.get_release(id).await,
        }
    }

    pub async fn get_release_by_path(&self, path: &str) -> Result<Option<Release>, DatabaseError> {
        match self {
            Database::Sql(db) => db.get_release_by_path(path).await,
            Database::Supabase(db) => db.get_release_by_path(path).await,
        }
    }

    /// All releases, newest first.
    pub async fn list_releases(&self) -> Result<Vec<Release>, DatabaseError> {
        match self {
            Database::Sql(db) => db.list_releases().await,
            Database::Supabase(db) => db.list_releases().await,
        }
    }

    /// Releases for one runtime version, newest first.
    pub async fn list_releases_by_runtime_version(
        &self,
        runtime_version: &str,
    ) -> Result<Vec<Release>, DatabaseError> {
        match self {
            Database::Sql(db) => db.list_releases_by_runtime_version(runtime_version).await,
            Database::Supabase(db) => db.list_releases_by_runtime_version(runtime_version).await,
        }
    }

    /// The active release for a runtime version: maximum timestamp wins.
    pub async fn latest_release_for_runtime_version(
        &self,
        runtime_version: &str,
    ) -> Result<Option<Release>, DatabaseError> {
        match self {
            Database::Sql(db) => db.latest_release_for_runtime_version(runtime_version).await,
            Database::Supabase(db) => db.latest_release_for_runtime_version(runtime_version).await,
        }
    }

    pub async fn create_tracking(&self, tracking: NewTracking) -> Result<Tracking, DatabaseError> {
        match self {
            Database::Sql(db) => db.create_tracking(tracking).await,
            Database::Supabase(db) => db.create_tracking(tracking).await,
        }
    }

    pub async fn release_tracking_metrics(
        &self,
        release_id: &str,
    ) -> Result<Vec<TrackingMetric>, DatabaseError> {
        match self {
            Database::Sql(db) => db.release_tracking_metrics(release_id).await,
            Database::Supabase(db) => db.release_tracking_metrics(release_id).await,
        }
    }

    pub async fn tracking_metrics_for_all_releases(
        &self,
    ) -> Result<Vec<TrackingMetric>, DatabaseError> {
        match self {
            Database::Sql(db) => db.tracking_metrics_for_all_releases().await,
            Database::Supabase(db) => db.tracking_metrics_for_all_releases().await,
        }
    }

    pub async fn trackings_last_month(&self) -> Result<Vec<Tracking>, DatabaseError> {
        match self {
            Database::Sql(db) => db.trackings_last_month().await,
            Database::Supabase(db) => db.trackings_last_month().await,
        }
    }

    /// Per-day, per-platform install counts for the trailing month, keyed
    /// by `YYYY-MM-DD`.
    pub async fn tracking_metrics_last_month(
        &self,
    ) -> Result<BTreeMap<String, Vec<TrackingMetric>>, DatabaseError> {
        match self {
            Database::Sql(db) => db.tracking_metrics_last_month().await,
            Database::Supabase(db) => db.tracking_metrics_last_month().await,
        }
    }

    pub async fn total_releases_count(&self) -> Result<i64, DatabaseError> {
        match self {
            Database::Sql(db) => db.total_releases_count().await,
            Database::Supabase(db) => db.total_releases_count().await,
        }
    }

    /// Count of distinct runtime versions.
    pub async fn total_runtimes_count(&self) -> Result<i64, DatabaseError> {
        match self {
            Database::Sql(db) => db.total_runtimes_count().await,
            Database::Supabase(db) => db.total_runtimes_count().await,
        }
    }

    /// One page of the runtime catalog; see [`catalog::paginate`].
    pub async fn list_runtimes(&self, cursor: &str) -> Result<RuntimePage, DatabaseError> {
        match self {
            Database::Sql(db) => db.list_runtimes(cursor).await,
            Database::Supabase(db) => db.list_runtimes(cursor).await,
        }
    }

    /// Provider name, for logs.
    pub fn provider(&self) -> &'static str {
        match self {
            Database::Sql(_) => "sql",
            Database::Supabase(_) => "supabase",
        }
    }
}

/// Timestamp cutoff for the trailing-month queries.
pub(crate) fn one_month_ago() -> DateTime<Utc> {
    Utc::now()
        .checked_sub_months(chrono::Months::new(1))
        .unwrap_or_else(Utc::now)
}

/// Parse a stored RFC 3339 timestamp, logging and substituting the current
/// time when the value is unreadable.
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        tracing::warn!(raw = %raw, error = %e, "failed to parse stored timestamp; using now");
        Utc::now()
    })
}
