//! Shared application state injected into every Axum handler.
//!
//! Both backends are constructed once at startup from configuration and
//! passed through here explicitly; there is no global provider singleton.

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::storage::Storage;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Artifact store for bundle zips.
    pub storage: Arc<Storage>,
    /// Release / tracking metadata store.
    pub db: Arc<Database>,
}
