//! Local filesystem storage provider.
//!
//! Keys live under a configured base directory; the logical `/`-separated
//! key maps onto native path components.  Useful for development and for
//! single-node deployments where the bundle volume is mounted locally.

use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::{FileInfo, StorageError, mime_for_path, normalize_root, with_root};
use crate::config::Config;

#[derive(Debug)]
pub struct LocalStorage {
    base_dir: PathBuf,
    root: String,
}

impl LocalStorage {
    pub fn new(cfg: &Config) -> Result<Self, StorageError> {
        if cfg.local_storage_dir.trim().is_empty() {
            return Err(StorageError::Config(
                "local storage directory not configured".to_owned(),
            ));
        }
        Ok(Self {
            base_dir: PathBuf::from(&cfg.local_storage_dir),
            root: normalize_root(&cfg.storage_root),
        })
    }

    /// Absolute filesystem path for a logical key.
    fn absolute(&self, path: &str) -> PathBuf {
        let key = with_root(&self.root, path);
        let mut abs = self.base_dir.clone();
        abs.extend(key.split('/').filter(|segment| !segment.is_empty()));
        abs
    }

    pub async fn upload_file(&self, path: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let abs = self.absolute(path);
        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&abs, bytes).await?;
        Ok(path.to_owned())
    }

    pub async fn download_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let abs = self.absolute(path);
        tokio::fs::read(&abs).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::NotFound(path.to_owned())
            } else {
                StorageError::Io(e)
            }
        })
    }

    pub async fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
        let abs = self.absolute(path);
        match tokio::fs::metadata(&abs).await {
            Ok(meta) if meta.is_file() => Ok(true),
            Ok(meta) if meta.is_dir() => {
                // Directory-like keys count only when at least one child
                // exists, matching the prefix check on object stores.
                let mut entries = tokio::fs::read_dir(&abs).await?;
                Ok(entries.next_entry().await?.is_some())
            }
            Ok(_) => Ok(false),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    pub async fn list_files(&self, directory: &str) -> Result<Vec<FileInfo>, StorageError> {
        let abs = self.absolute(directory);
        let mut entries = match tokio::fs::read_dir(&abs).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let updated_at = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            let created_at = meta.created().map(DateTime::<Utc>::from).unwrap_or(updated_at);
            files.push(FileInfo {
                mimetype: mime_for_path(&name).to_owned(),
                size: meta.len(),
                name,
                created_at,
                updated_at,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    pub async fn list_directories(&self, directory: &str) -> Result<Vec<String>, StorageError> {
        let abs = self.absolute(directory);
        let mut entries = match tokio::fs::read_dir(&abs).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut dirs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.metadata().await?.is_dir() {
                dirs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    pub async fn copy_file(&self, source: &str, destination: &str) -> Result<(), StorageError> {
        let src = self.absolute(source);
        let dst = self.absolute(destination);
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, &dst).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::NotFound(source.to_owned())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util;

    fn storage(dir: &std::path::Path) -> LocalStorage {
        LocalStorage::new(&test_util::config(dir)).expect("local storage")
    }

    #[tokio::test]
    async fn upload_then_download_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = storage(dir.path());

        let returned = storage
            .upload_file("updates/1.0.0/a.zip", b"bundle-bytes".to_vec())
            .await
            .expect("upload");
        assert_eq!(returned, "updates/1.0.0/a.zip");

        let bytes = storage.download_file("updates/1.0.0/a.zip").await.expect("download");
        assert_eq!(bytes, b"bundle-bytes");
    }

    #[tokio::test]
    async fn upload_overwrites_existing_object() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = storage(dir.path());

        storage.upload_file("k.zip", b"one".to_vec()).await.expect("first");
        storage.upload_file("k.zip", b"two".to_vec()).await.expect("second");
        assert_eq!(storage.download_file("k.zip").await.expect("download"), b"two");
    }

    #[tokio::test]
    async fn download_missing_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = storage(dir.path());

        let err = storage.download_file("absent.zip").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn exists_covers_files_and_populated_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = storage(dir.path());

        storage
            .upload_file("updates/2.0.0/b.zip", b"x".to_vec())
            .await
            .expect("upload");

        assert!(storage.file_exists("updates/2.0.0/b.zip").await.expect("file"));
        assert!(storage.file_exists("updates/2.0.0").await.expect("dir with child"));
        assert!(storage.file_exists("updates").await.expect("ancestor"));
        assert!(!storage.file_exists("updates/3.0.0").await.expect("missing"));
    }

    #[tokio::test]
    async fn listing_reports_files_and_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = storage(dir.path());

        storage.upload_file("updates/1.0.0/a.zip", b"aaaa".to_vec()).await.expect("a");
        storage.upload_file("updates/1.0.0/b.zip", b"bb".to_vec()).await.expect("b");
        storage.upload_file("updates/2.0.0/c.zip", b"c".to_vec()).await.expect("c");

        let files = storage.list_files("updates/1.0.0").await.expect("files");
        assert_eq!(
            files.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            vec!["a.zip", "b.zip"]
        );
        assert_eq!(files[0].size, 4);
        assert_eq!(files[0].mimetype, "application/zip");

        let dirs = storage.list_directories("updates").await.expect("dirs");
        assert_eq!(dirs, vec!["1.0.0", "2.0.0"]);

        assert!(storage.list_files("updates/9.9.9").await.expect("missing").is_empty());
    }

    #[tokio::test]
    async fn copy_duplicates_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = storage(dir.path());

        storage.upload_file("updates/1.0.0/a.zip", b"payload".to_vec()).await.expect("upload");
        storage
            .copy_file("updates/1.0.0/a.zip", "updates/1.0.0/copy.zip")
            .await
            .expect("copy");

        assert_eq!(
            storage.download_file("updates/1.0.0/copy.zip").await.expect("download"),
            b"payload"
        );
    }

    #[tokio::test]
    async fn root_directory_scopes_all_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = test_util::config(dir.path());
        cfg.storage_root = "tenant-a/".to_owned();
        let storage = LocalStorage::new(&cfg).expect("local storage");

        storage.upload_file("k.zip", b"x".to_vec()).await.expect("upload");
        assert!(dir.path().join("blobs").join("tenant-a").join("k.zip").is_file());
    }
}
