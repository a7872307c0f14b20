//! Runtime catalog ordering and cursor pagination.
//!
//! Both persistence providers feed their grouped release rows through this
//! module so the catalog pages identically no matter which backend is
//! wired in.  Versions order by per-segment numeric comparison, descending
//! (`"10.0.0"` above `"9.5.1"`), never lexicographically.

use chrono::{DateTime, Utc};

/// Catalog page size.
pub const RUNTIME_PAGE_LIMIT: usize = 20;

/// Extra rows fetched on the first page to smooth the initial UI fold.
pub const FIRST_PAGE_PADDING: usize = 3;

/// One aggregated catalog row, derived from grouping releases by version.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeEntry {
    pub runtime_version: String,
    pub last_released_at: DateTime<Utc>,
    pub total_releases: i64,
}

/// One page of the runtime catalog.
#[derive(Debug, Clone)]
pub struct RuntimePage {
    pub data: Vec<RuntimeEntry>,
    pub next_cursor: Option<String>,
    pub has_next_cursor: bool,
}

/// Numeric sort key for a dot-separated version string.  Segments that do
/// not parse order as 0 rather than dropping the row from the catalog.
pub fn version_key(version: &str) -> Vec<i64> {
    version
        .split('.')
        .map(|segment| segment.trim().parse::<i64>().unwrap_or(0))
        .collect()
}

/// Apply the catalog pagination policy to aggregated rows.
///
/// A non-empty `cursor` keeps rows ordered `<=` the cursor version
/// (inclusive).  Each page requests one probe row beyond its limit; when
/// the probe comes back it is dropped from the page and its version becomes
/// `next_cursor`.  Because the probe row was never returned, the inclusive
/// comparison on the next call starts the next page exactly there: no
/// duplicate and no gap at the boundary.
pub fn paginate(mut entries: Vec<RuntimeEntry>, cursor: &str) -> RuntimePage {
    entries.sort_by_cached_key(|e| std::cmp::Reverse(version_key(&e.runtime_version)));

    if !cursor.is_empty() {
        let cursor_key = version_key(cursor);
        entries.retain(|e| version_key(&e.runtime_version) <= cursor_key);
    }

    let limit = if cursor.is_empty() {
        RUNTIME_PAGE_LIMIT + FIRST_PAGE_PADDING
    } else {
        RUNTIME_PAGE_LIMIT
    };

    entries.truncate(limit + 1);
    let has_next_cursor = entries.len() > limit;
    let next_cursor = if has_next_cursor {
        entries.pop().map(|probe| probe.runtime_version)
    } else {
        None
    };

    RuntimePage {
        data: entries,
        next_cursor,
        has_next_cursor,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
