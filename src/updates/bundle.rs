//! Bundle archive helpers.
//!
//! A published update is a zip archive carrying `metadata.json` (the
//! per-platform file listing the content identity is derived from), the
//! launch bundles and assets it names, optionally `expoConfig.json` (client
//! configuration embedded verbatim into manifests), and, for bundles
//! published by the client tooling to request a rollback, a `rollback`
//! marker entry.

use std::io::{Cursor, Read};

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;
use zip::ZipArchive;
use zip::result::ZipError;

use super::runtime_directory;
use crate::storage::{Storage, StorageError};

/// Entry the content identity is derived from.
pub const METADATA_ENTRY: &str = "metadata.json";

/// Marker entry signalling an embedded-rollback bundle.
pub const ROLLBACK_ENTRY: &str = "rollback";

/// Optional client configuration embedded into manifests.
pub const CLIENT_CONFIG_ENTRY: &str = "expoConfig.json";

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("invalid bundle archive: {0}")]
    Zip(#[from] ZipError),

    #[error("io error reading bundle: {0}")]
    Io(#[from] std::io::Error),

    #[error("bundle entry missing: {0}")]
    MissingEntry(String),

    #[error("invalid bundle metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Parsed `metadata.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    #[serde(default)]
    pub file_metadata: std::collections::HashMap<String, PlatformFiles>,
}

/// Per-platform subtree of `metadata.json`.
#[derive(Debug, Deserialize)]
pub struct PlatformFiles {
    pub bundle: String,
    #[serde(default)]
    pub assets: Vec<AssetRef>,
}

#[derive(Debug, Deserialize)]
pub struct AssetRef {
    pub path: String,
    pub ext: String,
}

/// An update bundle opened from its raw archive bytes.
pub struct Bundle {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl Bundle {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, BundleError> {
        Ok(Self {
            archive: ZipArchive::new(Cursor::new(bytes))?,
        })
    }

    /// Download and open the bundle stored at `path`.
    pub async fn from_storage(storage: &Storage, path: &str) -> Result<Self, BundleStorageError> {
        let bytes = storage.download_file(path).await?;
        Ok(Self::from_bytes(bytes)?)
    }

    /// Give back the raw archive bytes, e.g. to store them after the
    /// entries have been inspected.
    pub fn into_bytes(self) -> Vec<u8> {
        self.archive.into_inner().into_inner()
    }

    pub fn has_entry(&self, name: &str) -> bool {
        self.archive.file_names().any(|entry| entry == name)
    }

    /// Bytes of the named entry, `None` when absent.
    pub fn read_entry(&mut self, name: &str) -> Result<Option<Vec<u8>>, BundleError> {
        match self.archive.by_name(name) {
            Ok(mut file) => {
                let mut bytes = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(BundleError::Zip(e)),
        }
    }

    /// Bytes of the named entry, failing when absent.
    pub fn require_entry(&mut self, name: &str) -> Result<Vec<u8>, BundleError> {
        self.read_entry(name)?
            .ok_or_else(|| BundleError::MissingEntry(name.to_owned()))
    }

    /// Parsed `metadata.json`.
    pub fn metadata(&mut self) -> Result<BundleMetadata, BundleError> {
        let bytes = self.require_entry(METADATA_ENTRY)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Modification time the archive records for an entry, when it records
    /// a representable one.
    pub fn entry_modified(&mut self, name: &str) -> Option<DateTime<Utc>> {
        let file = self.archive.by_name(name).ok()?;
        let modified = file.last_modified()?;
        Utc.with_ymd_and_hms(
            i32::from(modified.year()),
            u32::from(modified.month()),
            u32::from(modified.day()),
            u32::from(modified.hour()),
            u32::from(modified.minute()),
            u32::from(modified.second()),
        )
        .single()
    }
}

/// Errors from [`Bundle::from_storage`]: storage lookup plus archive parse.
#[derive(Debug, Error)]
pub enum BundleStorageError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
}

/// Storage key of the newest bundle for a runtime version, `None` when no
/// bundle has ever been published for it.
///
/// Keys are timestamp-named (see [`super::update_key`]), so the newest
/// bundle is the lexicographically greatest `.zip` name in the runtime's
/// directory. The database is deliberately not consulted here, which keeps
/// polling working even when rows and objects have drifted apart.
pub async fn latest_bundle_path_for_runtime(
    storage: &Storage,
    runtime_version: &str,
) -> Result<Option<String>, StorageError> {
    let directory = runtime_directory(runtime_version);
    let mut files = storage.list_files(&directory).await?;
    files.retain(|f| f.name.ends_with(".zip"));
    files.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(files.first().map(|f| format!("{directory}/{}", f.name)))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util;

    #[test]
    fn reads_entries_and_reports_missing_ones() {
        let bytes = test_util::zip_bundle(&[
            (METADATA_ENTRY, br#"{"fileMetadata":{}}"#.as_slice()),
            ("bundles/ios.js", b"console.log('hi')"),
        ]);
        let mut bundle = Bundle::from_bytes(bytes).expect("open");

        assert!(bundle.has_entry(METADATA_ENTRY));
        assert!(!bundle.has_entry(ROLLBACK_ENTRY));
        assert_eq!(
            bundle.read_entry("bundles/ios.js").expect("read"),
            Some(b"console.log('hi')".to_vec())
        );
        assert_eq!(bundle.read_entry("nope").expect("read"), None);
        assert!(matches!(
            bundle.require_entry("nope"),
            Err(BundleError::MissingEntry(_))
        ));
    }

    #[test]
    fn parses_platform_metadata() {
        let metadata = br#"{
            "version": 0,
            "bundler": "metro",
            "fileMetadata": {
                "ios": {"bundle": "bundles/ios.js", "assets": [{"path": "assets/icon", "ext": "png"}]},
                "android": {"bundle": "bundles/android.js", "assets": []}
            }
        }"#;
        let bytes = test_util::zip_bundle(&[(METADATA_ENTRY, metadata.as_slice())]);
        let mut bundle = Bundle::from_bytes(bytes).expect("open");

        let parsed = bundle.metadata().expect("metadata");
        let ios = parsed.file_metadata.get("ios").expect("ios subtree");
        assert_eq!(ios.bundle, "bundles/ios.js");
        assert_eq!(ios.assets[0].path, "assets/icon");
        assert_eq!(ios.assets[0].ext, "png");
    }

    #[tokio::test]
    async fn latest_bundle_is_the_greatest_timestamp_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = test_util::local_storage(dir.path());

        for name in ["20240101000000.zip", "20240301000000.zip", "20240201000000.zip"] {
            storage
                .upload_file(&format!("updates/1.0.0/{name}"), b"zip".to_vec())
                .await
                .expect("upload");
        }
        // A stray non-zip object never wins.
        storage
            .upload_file("updates/1.0.0/notes.txt", b"x".to_vec())
            .await
            .expect("upload");

        let latest = latest_bundle_path_for_runtime(&storage, "1.0.0")
            .await
            .expect("lookup");
        assert_eq!(latest.as_deref(), Some("updates/1.0.0/20240301000000.zip"));

        let none = latest_bundle_path_for_runtime(&storage, "9.9.9")
            .await
            .expect("lookup");
        assert_eq!(none, None);
    }
}
