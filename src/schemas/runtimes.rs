use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::db::{RuntimeEntry, RuntimePage};

#[derive(Debug, Deserialize, IntoParams)]
pub struct CursorQuery {
    /// Runtime version the previous page ended at; empty for the first
    /// page.
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeResponse {
    pub runtime_version: String,
    pub last_released_at: DateTime<Utc>,
    pub total_releases: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuntimesPageResponse {
    pub data: Vec<RuntimeResponse>,
    pub next_cursor: Option<String>,
    pub has_next_cursor: bool,
}

impl From<RuntimePage> for RuntimesPageResponse {
    fn from(page: RuntimePage) -> Self {
        Self {
            data: page.data.into_iter().map(RuntimeResponse::from).collect(),
            next_cursor: page.next_cursor,
            has_next_cursor: page.has_next_cursor,
        }
    }
}

impl From<RuntimeEntry> for RuntimeResponse {
    fn from(entry: RuntimeEntry) -> Self {
        Self {
            runtime_version: entry.runtime_version,
            last_released_at: entry.last_released_at,
            total_releases: entry.total_releases,
        }
    }
}
