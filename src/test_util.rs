//! Shared fixtures for the in-file test modules: a fully-populated test
//! [`Config`] over a scratch directory, real local-storage and SQLite
//! backends built from it, and an in-memory zip builder for fake bundles.

use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, DatabaseKind, StorageKind};
use crate::db::Database;
use crate::db::sql::SqlDatabase;
use crate::state::AppState;
use crate::storage::Storage;
use crate::storage::local::LocalStorage;

/// Config pointing storage and database into `scratch_dir`.
pub fn config(scratch_dir: &Path) -> Config {
    Config {
        bind_address: "127.0.0.1:0".to_owned(),
        public_url: "http://localhost:3000".to_owned(),
        log_level: "info".to_owned(),
        log_json: false,
        enable_swagger: false,
        cors_allowed_origins: None,
        upload_key: "test-upload-key".to_owned(),
        max_upload_size_mb: 32,
        database_kind: DatabaseKind::Sql,
        database_url: format!(
            "sqlite://{}/airlift-test.db?mode=rwc",
            scratch_dir.display()
        ),
        storage_kind: StorageKind::Local,
        storage_root: String::new(),
        local_storage_dir: scratch_dir.join("blobs").display().to_string(),
        s3_bucket: None,
        s3_region: "auto".to_owned(),
        s3_endpoint: None,
        s3_access_key_id: None,
        s3_secret_access_key: None,
        s3_force_path_style: false,
        gcs_bucket: None,
        gcs_bearer_token: None,
        gcs_endpoint: "https://storage.googleapis.com".to_owned(),
        supabase_url: None,
        supabase_api_key: None,
        supabase_bucket: "updates".to_owned(),
    }
}

/// A migrated SQLite store in `scratch_dir`.
pub async fn sql_database(scratch_dir: &Path) -> SqlDatabase {
    SqlDatabase::connect(&config(scratch_dir).database_url)
        .await
        .expect("connect test database")
}

/// A local-filesystem [`Storage`] rooted in `scratch_dir`.
pub fn local_storage(scratch_dir: &Path) -> Storage {
    Storage::Local(LocalStorage::new(&config(scratch_dir)).expect("local storage"))
}

/// Full application state over local storage + SQLite in `scratch_dir`.
pub async fn state(scratch_dir: &Path) -> Arc<AppState> {
    let cfg = config(scratch_dir);
    let storage = Storage::connect(&cfg).await.expect("connect storage");
    let db = Database::connect(&cfg).await.expect("connect database");
    Arc::new(AppState {
        config: Arc::new(cfg),
        storage: Arc::new(storage),
        db: Arc::new(db),
    })
}

/// Build an in-memory zip archive from `(entry name, bytes)` pairs.
pub fn zip_bundle(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, bytes) in entries {
        writer.start_file(*name, options).expect("start zip entry");
        writer.write_all(bytes).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}
