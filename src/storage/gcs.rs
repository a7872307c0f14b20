//! Google Cloud Storage provider, via the JSON API.
//!
//! Speaks the REST surface directly with `reqwest`: media upload,
//! `alt=media` download, `prefix`/`delimiter` listing and server-side
//! `copyTo`.  Authentication is a bearer token from `GCS_BEARER_TOKEN`;
//! minting that token from a service account is an external concern.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{FileInfo, StorageError, mime_for_path, normalize_root, with_root};
use crate::config::Config;

#[derive(Debug)]
pub struct GcsStorage {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: String,
    root: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ObjectResource>,
    #[serde(default)]
    prefixes: Vec<String>,
}

/// The subset of the GCS object resource this provider reads.  `size` is a
/// decimal string in the JSON API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    time_created: Option<String>,
    #[serde(default)]
    updated: Option<String>,
}

impl GcsStorage {
    pub fn new(cfg: &Config) -> Result<Self, StorageError> {
        let bucket = cfg
            .gcs_bucket
            .clone()
            .ok_or_else(|| StorageError::Config("GCS bucket name not configured".to_owned()))?;
        let token = cfg
            .gcs_bearer_token
            .clone()
            .ok_or_else(|| StorageError::Config("GCS bearer token not configured".to_owned()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: cfg.gcs_endpoint.trim_end_matches('/').to_owned(),
            bucket,
            token,
            root: normalize_root(&cfg.storage_root),
        })
    }

    fn key(&self, path: &str) -> String {
        with_root(&self.root, path)
    }

    /// `…/storage/v1/b/{bucket}/o/{key}` with the key percent-encoded as a
    /// single path segment (`/` becomes `%2F`), as the JSON API requires.
    fn object_url(&self, key: &str, trailing: &[&str]) -> Result<reqwest::Url, StorageError> {
        let mut url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| StorageError::Config(format!("invalid GCS endpoint: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| StorageError::Config("GCS endpoint cannot be a base".to_owned()))?;
            segments.pop_if_empty();
            segments.extend(["storage", "v1", "b", self.bucket.as_str(), "o", key]);
            segments.extend(trailing);
        }
        Ok(url)
    }

    fn bucket_url(&self, path: &str) -> Result<reqwest::Url, StorageError> {
        reqwest::Url::parse(&format!("{}/{}/b/{}/o", self.endpoint, path, self.bucket))
            .map_err(|e| StorageError::Config(format!("invalid GCS endpoint: {e}")))
    }

    fn check(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(StorageError::backend("gcs", format!("status {status}")))
        }
    }

    pub async fn upload_file(&self, path: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let key = self.key(path);
        let url = self.bucket_url("upload/storage/v1")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .query(&[("uploadType", "media"), ("name", key.as_str())])
            .header(reqwest::header::CONTENT_TYPE, mime_for_path(&key))
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::backend("gcs", e))?;
        Self::check(response)?;
        Ok(path.to_owned())
    }

    pub async fn download_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let key = self.key(path);
        let url = self.object_url(&key, &[])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| StorageError::backend("gcs", e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(path.to_owned()));
        }
        let response = Self::check(response)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::backend("gcs", e))?;
        Ok(bytes.to_vec())
    }

    pub async fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
        let key = self.key(path);
        if key.is_empty() {
            return Ok(false);
        }

        let url = self.object_url(&key, &[])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| StorageError::backend("gcs", e))?;
        if response.status().is_success() {
            return Ok(true);
        }
        if response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::backend(
                "gcs",
                format!("status {}", response.status()),
            ));
        }

        // No exact object; probe the key as a prefix for a single child.
        let prefix = if key.ends_with('/') { key } else { format!("{key}/") };
        let listing = self.list_raw(&prefix, None, Some(1)).await?;
        Ok(!listing.items.is_empty())
    }

    pub async fn list_files(&self, directory: &str) -> Result<Vec<FileInfo>, StorageError> {
        let prefix = self.dir_prefix(directory);
        let listing = self.list_raw(&prefix, Some("/"), None).await?;

        Ok(listing
            .items
            .into_iter()
            .filter_map(|item| {
                let name = item.name.strip_prefix(&prefix).unwrap_or(&item.name).to_owned();
                if name.is_empty() {
                    return None;
                }
                let updated_at = parse_rfc3339(item.updated.as_deref());
                Some(FileInfo {
                    size: item.size.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0),
                    mimetype: item
                        .content_type
                        .unwrap_or_else(|| mime_for_path(&name).to_owned()),
                    created_at: item
                        .time_created
                        .as_deref()
                        .map(|t| parse_rfc3339(Some(t)))
                        .unwrap_or(updated_at),
                    updated_at,
                    name,
                })
            })
            .collect())
    }

    pub async fn list_directories(&self, directory: &str) -> Result<Vec<String>, StorageError> {
        let prefix = self.dir_prefix(directory);
        let listing = self.list_raw(&prefix, Some("/"), None).await?;
        Ok(listing
            .prefixes
            .iter()
            .map(|p| p.strip_prefix(&prefix).unwrap_or(p).trim_end_matches('/').to_owned())
            .filter(|name| !name.is_empty())
            .collect())
    }

    pub async fn copy_file(&self, source: &str, destination: &str) -> Result<(), StorageError> {
        let source_key = self.key(source);
        let dest_key = self.key(destination);
        let url = self.object_url(
            &source_key,
            &["copyTo", "b", self.bucket.as_str(), "o", dest_key.as_str()],
        )?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await
            .map_err(|e| StorageError::backend("gcs", e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(source.to_owned()));
        }
        Self::check(response)?;
        Ok(())
    }

    fn dir_prefix(&self, directory: &str) -> String {
        let scoped = self.key(directory);
        if scoped.is_empty() { scoped } else { format!("{scoped}/") }
    }

    async fn list_raw(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        max_results: Option<u32>,
    ) -> Result<ListResponse, StorageError> {
        let url = self.bucket_url("storage/v1")?;
        let mut request = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("prefix", prefix)]);
        if let Some(delimiter) = delimiter {
            request = request.query(&[("delimiter", delimiter)]);
        }
        if let Some(max) = max_results {
            request = request.query(&[("maxResults", max.to_string())]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| StorageError::backend("gcs", e))?;
        let response = Self::check(response)?;
        response
            .json::<ListResponse>()
            .await
            .map_err(|e| StorageError::backend("gcs", e))
    }
}

fn parse_rfc3339(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    fn storage() -> GcsStorage {
        let dir = std::path::Path::new("unused");
        let mut cfg = crate::test_util::config(dir);
        cfg.gcs_bucket = Some("bundles".to_owned());
        cfg.gcs_bearer_token = Some("token".to_owned());
        GcsStorage::new(&cfg).expect("gcs storage")
    }

    #[test]
    fn object_urls_encode_keys_as_single_segments() {
        let storage = storage();
        let url = storage.object_url("root/updates/1.0.0/a.zip", &[]).expect("url");
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/bundles/o/root%2Fupdates%2F1.0.0%2Fa.zip"
        );
    }

    #[test]
    fn listing_deserializes_string_sizes_and_prefixes() {
        let raw = r#"{
            "items": [{"name": "updates/1.0.0/a.zip", "size": "42",
                       "contentType": "application/zip",
                       "timeCreated": "2024-03-20T00:00:00Z",
                       "updated": "2024-03-21T00:00:00Z"}],
            "prefixes": ["updates/1.0.0/"]
        }"#;
        let listing: ListResponse = serde_json::from_str(raw).expect("listing");
        assert_eq!(listing.items[0].size.as_deref(), Some("42"));
        assert_eq!(listing.prefixes, vec!["updates/1.0.0/"]);
    }
}
