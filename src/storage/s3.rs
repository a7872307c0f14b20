//! S3-compatible storage provider.
//!
//! Works against AWS S3 or any S3-compatible endpoint (MinIO, R2, …) via a
//! custom `S3_ENDPOINT`.  Credentials come from the `S3_*` environment
//! variables rather than the ambient AWS credential chain so the provider
//! is configured the same way as every other one.

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};

use super::{FileInfo, StorageError, mime_for_path, normalize_root, with_root};
use crate::config::Config;

#[derive(Debug)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    root: String,
}

impl S3Storage {
    pub async fn connect(cfg: &Config) -> Result<Self, StorageError> {
        let bucket = cfg
            .s3_bucket
            .clone()
            .ok_or_else(|| StorageError::Config("S3 bucket name not configured".to_owned()))?;
        let (access_key, secret_key) = match (&cfg.s3_access_key_id, &cfg.s3_secret_access_key) {
            (Some(access), Some(secret)) => (access.clone(), secret.clone()),
            _ => return Err(StorageError::Config("S3 credentials not configured".to_owned())),
        };

        let credentials = Credentials::new(access_key, secret_key, None, None, "airlift-env");
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.s3_region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &cfg.s3_endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if cfg.s3_force_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket,
            root: normalize_root(&cfg.storage_root),
        })
    }

    fn key(&self, path: &str) -> String {
        with_root(&self.root, path)
    }

    /// Listing prefix for a directory-like key, always `/`-terminated when
    /// non-empty so grouping happens relative to the directory itself.
    fn dir_prefix(&self, directory: &str) -> String {
        let scoped = self.key(directory);
        if scoped.is_empty() { scoped } else { format!("{scoped}/") }
    }

    pub async fn upload_file(&self, path: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let key = self.key(path);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(mime_for_path(&key))
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::backend("s3", e))?;
        Ok(path.to_owned())
    }

    pub async fn download_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let key = self.key(path);
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StorageError::backend("s3", e))?;
                Ok(data.into_bytes().to_vec())
            }
            Err(err) => {
                let service = err.into_service_error();
                if service.is_no_such_key() {
                    Err(StorageError::NotFound(path.to_owned()))
                } else {
                    Err(StorageError::backend("s3", service))
                }
            }
        }
    }

    pub async fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
        let key = self.key(path);
        if key.is_empty() {
            return Ok(false);
        }

        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => return Ok(true),
            Err(err) => {
                let service = err.into_service_error();
                if !service.is_not_found() {
                    return Err(StorageError::backend("s3", service));
                }
            }
        }

        // No exact object; treat the key as a prefix and probe for children.
        let prefix = if key.ends_with('/') { key } else { format!("{key}/") };
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| StorageError::backend("s3", e))?;
        Ok(response.key_count().unwrap_or(0) > 0)
    }

    pub async fn list_files(&self, directory: &str) -> Result<Vec<FileInfo>, StorageError> {
        let prefix = self.dir_prefix(directory);
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .delimiter("/")
            .send()
            .await
            .map_err(|e| StorageError::backend("s3", e))?;

        let mut files = Vec::new();
        for object in response.contents() {
            let Some(key) = object.key() else { continue };
            let name = key.strip_prefix(&prefix).unwrap_or(key);
            if name.is_empty() {
                continue;
            }
            let modified = object
                .last_modified()
                .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
                .unwrap_or_else(Utc::now);
            files.push(FileInfo {
                name: name.to_owned(),
                size: u64::try_from(object.size().unwrap_or(0)).unwrap_or(0),
                mimetype: mime_for_path(key).to_owned(),
                created_at: modified,
                updated_at: modified,
            });
        }
        Ok(files)
    }

    pub async fn list_directories(&self, directory: &str) -> Result<Vec<String>, StorageError> {
        let prefix = self.dir_prefix(directory);
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .delimiter("/")
            .send()
            .await
            .map_err(|e| StorageError::backend("s3", e))?;

        Ok(response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix())
            .map(|p| p.strip_prefix(&prefix).unwrap_or(p).trim_end_matches('/').to_owned())
            .filter(|name| !name.is_empty())
            .collect())
    }

    pub async fn copy_file(&self, source: &str, destination: &str) -> Result<(), StorageError> {
        let source_key = self.key(source);
        let dest_key = self.key(destination);
        let copy_source = format!("{}/{}", self.bucket, encode_copy_source_key(&source_key));
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source)
            .key(dest_key)
            .send()
            .await
            .map_err(|e| StorageError::backend("s3", e))?;
        Ok(())
    }
}

/// Percent-encode an object key for the `x-amz-copy-source` header, leaving
/// `/` separators intact.
fn encode_copy_source_key(key: &str) -> String {
    use std::fmt::Write;

    key.split('/')
        .map(|segment| {
            let mut out = String::with_capacity(segment.len());
            for byte in segment.bytes() {
                match byte {
                    b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                        out.push(byte as char);
                    }
                    _ => {
                        let _ = write!(out, "%{byte:02X}");
                    }
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join("/")
}

// ── Tests ──────────────────────────────────────────────────────────────────────
