//! Supabase Storage provider, via its REST object API.
//!
//! Uploads with `x-upsert` so re-publishing a key overwrites it, lists via
//! `object/list` (whose entry shape of `name`, `created_at`, `updated_at`
//! and `metadata.{size,mimetype}` is where [`FileInfo`] comes from; folder
//! rows arrive with `metadata: null`), and copies server-side via
//! `object/copy`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{FileInfo, StorageError, mime_for_path, normalize_root, with_root};
use crate::config::Config;

#[derive(Debug)]
pub struct SupabaseStorage {
    client: reqwest::Client,
    base: String,
    bucket: String,
    api_key: String,
    root: String,
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    name: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    /// `None` for folder rows in a listing.
    #[serde(default)]
    metadata: Option<ObjectMetadata>,
}

#[derive(Debug, Deserialize)]
struct ObjectMetadata {
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    mimetype: Option<String>,
}

impl SupabaseStorage {
    pub fn new(cfg: &Config) -> Result<Self, StorageError> {
        let (url, api_key) = match (&cfg.supabase_url, &cfg.supabase_api_key) {
            (Some(url), Some(key)) => (url.clone(), key.clone()),
            _ => {
                return Err(StorageError::Config(
                    "Supabase credentials not configured".to_owned(),
                ));
            }
        };
        Ok(Self {
            client: reqwest::Client::new(),
            base: format!("{}/storage/v1", url.trim_end_matches('/')),
            bucket: cfg.supabase_bucket.clone(),
            api_key,
            root: normalize_root(&cfg.storage_root),
        })
    }

    fn key(&self, path: &str) -> String {
        with_root(&self.root, path)
    }

    /// `{base}/{head...}/{bucket}/{key segments…}` with each key segment
    /// percent-encoded individually so `/` separators survive.
    fn object_url(&self, head: &[&str], key: &str) -> Result<reqwest::Url, StorageError> {
        let mut url = reqwest::Url::parse(&self.base)
            .map_err(|e| StorageError::Config(format!("invalid Supabase URL: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| StorageError::Config("Supabase URL cannot be a base".to_owned()))?;
            segments.pop_if_empty();
            segments.extend(head);
            segments.push(&self.bucket);
            segments.extend(key.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.api_key).header("apikey", &self.api_key)
    }

    pub async fn upload_file(&self, path: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let key = self.key(path);
        let url = self.object_url(&["object"], &key)?;
        let response = self
            .authed(self.client.post(url))
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, mime_for_path(&key))
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::backend("supabase", e))?;
        if !response.status().is_success() {
            return Err(StorageError::backend(
                "supabase",
                format!("status {}", response.status()),
            ));
        }
        Ok(path.to_owned())
    }

    pub async fn download_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let key = self.key(path);
        let url = self.object_url(&["object"], &key)?;
        let response = self
            .authed(self.client.get(url))
            .send()
            .await
            .map_err(|e| StorageError::backend("supabase", e))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::BAD_REQUEST {
            return Err(StorageError::NotFound(path.to_owned()));
        }
        if !status.is_success() {
            return Err(StorageError::backend("supabase", format!("status {status}")));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::backend("supabase", e))?;
        Ok(bytes.to_vec())
    }

    pub async fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
        let key = self.key(path);
        if key.is_empty() {
            return Ok(false);
        }

        let url = self.object_url(&["object", "info"], &key)?;
        let response = self
            .authed(self.client.get(url))
            .send()
            .await
            .map_err(|e| StorageError::backend("supabase", e))?;
        if response.status().is_success() {
            return Ok(true);
        }

        // No exact object; probe the key as a folder prefix.
        let entries = self.list_raw(&format!("{key}/"), Some(1)).await?;
        Ok(!entries.is_empty())
    }

    pub async fn list_files(&self, directory: &str) -> Result<Vec<FileInfo>, StorageError> {
        let entries = self.list_raw(&self.key(directory), None).await?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                let metadata = entry.metadata?;
                let updated_at = parse_timestamp(entry.updated_at.as_deref());
                Some(FileInfo {
                    size: metadata.size.unwrap_or(0),
                    mimetype: metadata
                        .mimetype
                        .unwrap_or_else(|| mime_for_path(&entry.name).to_owned()),
                    created_at: entry
                        .created_at
                        .as_deref()
                        .map(|t| parse_timestamp(Some(t)))
                        .unwrap_or(updated_at),
                    updated_at,
                    name: entry.name,
                })
            })
            .collect())
    }

    pub async fn list_directories(&self, directory: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.list_raw(&self.key(directory), None).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.metadata.is_none())
            .map(|entry| entry.name.trim_end_matches('/').to_owned())
            .filter(|name| !name.is_empty())
            .collect())
    }

    pub async fn copy_file(&self, source: &str, destination: &str) -> Result<(), StorageError> {
        let response = self
            .authed(self.client.post(format!("{}/object/copy", self.base)))
            .json(&json!({
                "bucketId": self.bucket,
                "sourceKey": self.key(source),
                "destinationKey": self.key(destination),
            }))
            .send()
            .await
            .map_err(|e| StorageError::backend("supabase", e))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(source.to_owned()));
        }
        if !status.is_success() {
            return Err(StorageError::backend("supabase", format!("status {status}")));
        }
        Ok(())
    }

    async fn list_raw(
        &self,
        prefix: &str,
        limit: Option<u32>,
    ) -> Result<Vec<ObjectEntry>, StorageError> {
        let response = self
            .authed(
                self.client
                    .post(format!("{}/object/list/{}", self.base, self.bucket)),
            )
            .json(&json!({
                "prefix": prefix,
                "limit": limit.unwrap_or(10_000),
                "offset": 0,
                "sortBy": { "column": "name", "order": "asc" },
            }))
            .send()
            .await
            .map_err(|e| StorageError::backend("supabase", e))?;
        if !response.status().is_success() {
            return Err(StorageError::backend(
                "supabase",
                format!("status {}", response.status()),
            ));
        }
        response
            .json::<Vec<ObjectEntry>>()
            .await
            .map_err(|e| StorageError::backend("supabase", e))
    }
}

fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn listing_separates_files_from_folder_rows() {
        let raw = r#"[
            {"name": "1.0.0", "id": null, "metadata": null},
            {"name": "20240101000000.zip", "id": "abc",
             "created_at": "2024-03-20T00:00:00Z",
             "updated_at": "2024-03-21T00:00:00Z",
             "metadata": {"size": 7, "mimetype": "application/zip"}}
        ]"#;
        let entries: Vec<ObjectEntry> = serde_json::from_str(raw).expect("entries");
        assert!(entries[0].metadata.is_none());
        let meta = entries[1].metadata.as_ref().expect("file metadata");
        assert_eq!(meta.size, Some(7));
        assert_eq!(meta.mimetype.as_deref(), Some("application/zip"));
    }
}
