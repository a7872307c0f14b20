//! Artifact storage abstraction.
//!
//! [`Storage`] is a closed enum over the supported blob providers.  The
//! concrete provider is chosen once at startup from configuration; an
//! unknown provider name fails there, never at request time.  Every
//! provider exposes the same normalized, root-scoped capability set so the
//! rest of the server never cares which backend is wired in.

pub mod gcs;
pub mod local;
pub mod s3;
pub mod supabase;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::{Config, StorageKind};

/// One entry of a [`Storage::list_files`] listing, name relative to the
/// listed prefix.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mimetype: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Errors surfaced by any storage provider.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested key does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Local filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A remote provider rejected or failed the request.
    #[error("{provider} request failed: {message}")]
    Backend {
        provider: &'static str,
        message: String,
    },

    /// Required provider settings are missing or malformed.
    #[error("invalid storage configuration: {0}")]
    Config(String),
}

impl StorageError {
    pub(crate) fn backend(provider: &'static str, err: impl std::fmt::Display) -> Self {
        StorageError::Backend {
            provider,
            message: err.to_string(),
        }
    }
}

/// The configured artifact store.
///
/// All methods take logical paths; providers normalize them and scope them
/// under the configured root directory before touching the backend.
#[derive(Debug)]
pub enum Storage {
    Local(local::LocalStorage),
    S3(s3::S3Storage),
    Gcs(gcs::GcsStorage),
    Supabase(supabase::SupabaseStorage),
}

impl Storage {
    /// Construct the provider selected by `cfg.storage_kind`.
    pub async fn connect(cfg: &Config) -> Result<Self, StorageError> {
        match cfg.storage_kind {
            StorageKind::Local => Ok(Storage::Local(local::LocalStorage::new(cfg)?)),
            StorageKind::S3 => Ok(Storage::S3(s3::S3Storage::connect(cfg).await?)),
            StorageKind::Gcs => Ok(Storage::Gcs(gcs::GcsStorage::new(cfg)?)),
            StorageKind::Supabase => Ok(Storage::Supabase(supabase::SupabaseStorage::new(cfg)?)),
        }
    }

    /// Write `bytes` at `path`, overwriting any existing object.  Returns
    /// the caller-given logical path unchanged.
    pub async fn upload_file(&self, path: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        match self {
            Storage::Local(s) => s.upload_file(path, bytes).await,
            Storage::S3(s) => s.upload_file(path, bytes).await,
            Storage::Gcs(s) => s.upload_file(path, bytes).await,
            Storage::Supabase(s) => s.upload_file(path, bytes).await,
        }
    }

    /// Read the object at `path`, failing with [`StorageError::NotFound`]
    /// when the key is absent.
    pub async fn download_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        match self {
            Storage::Local(s) => s.download_file(path).await,
            Storage::S3(s) => s.download_file(path).await,
            Storage::Gcs(s) => s.download_file(path).await,
            Storage::Supabase(s) => s.download_file(path).await,
        }
    }

    /// True when `path` exists as an object, or when `path/` has at least
    /// one child object.  The dual check makes directory-like existence
    /// work uniformly on providers without a real directory concept.
    pub async fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
        match self {
            Storage::Local(s) => s.file_exists(path).await,
            Storage::S3(s) => s.file_exists(path).await,
            Storage::Gcs(s) => s.file_exists(path).await,
            Storage::Supabase(s) => s.file_exists(path).await,
        }
    }

    /// Immediate objects under `directory`, names relative to it.  A
    /// missing or empty prefix yields an empty listing on every provider.
    pub async fn list_files(&self, directory: &str) -> Result<Vec<FileInfo>, StorageError> {
        match self {
            Storage::Local(s) => s.list_files(directory).await,
            Storage::S3(s) => s.list_files(directory).await,
            Storage::Gcs(s) => s.list_files(directory).await,
            Storage::Supabase(s) => s.list_files(directory).await,
        }
    }

    /// Immediate child "folders" under `directory` via delimiter grouping,
    /// trailing separator stripped.
    pub async fn list_directories(&self, directory: &str) -> Result<Vec<String>, StorageError> {
        match self {
            Storage::Local(s) => s.list_directories(directory).await,
            Storage::S3(s) => s.list_directories(directory).await,
            Storage::Gcs(s) => s.list_directories(directory).await,
            Storage::Supabase(s) => s.list_directories(directory).await,
        }
    }

    /// Copy `source` to `destination`, server-side where the provider
    /// supports it.
    pub async fn copy_file(&self, source: &str, destination: &str) -> Result<(), StorageError> {
        match self {
            Storage::Local(s) => s.copy_file(source, destination).await,
            Storage::S3(s) => s.copy_file(source, destination).await,
            Storage::Gcs(s) => s.copy_file(source, destination).await,
            Storage::Supabase(s) => s.copy_file(source, destination).await,
        }
    }

    /// Provider name, for logs.
    pub fn provider(&self) -> &'static str {
        match self {
            Storage::Local(_) => "local",
            Storage::S3(_) => "s3",
            Storage::Gcs(_) => "gcs",
            Storage::Supabase(_) => "supabase",
        }
    }
}

// ── Path handling shared by every provider ────────────────────────────────────

/// Normalize a logical path: backslashes become `/`, surrounding whitespace
/// is trimmed, leading slashes are stripped, runs of slashes collapse to
/// one.  Idempotent.
pub fn normalize_key(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    let replaced = input.replace('\\', "/");
    let trimmed = replaced.trim().trim_start_matches('/');

    let mut out = String::with_capacity(trimmed.len());
    let mut prev_was_slash = false;
    for c in trimmed.chars() {
        if c == '/' {
            if !prev_was_slash {
                out.push('/');
            }
            prev_was_slash = true;
        } else {
            out.push(c);
            prev_was_slash = false;
        }
    }
    out
}

/// Normalize the configured root directory.  Applies [`normalize_key`] and
/// additionally strips trailing slashes and ALL internal whitespace, a
/// stricter rule than ordinary path normalization, applied once at
/// construction.
pub fn normalize_root(root: &str) -> String {
    let normalized = normalize_key(root);
    normalized
        .trim_end_matches('/')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Scope a normalized logical path under the (already normalized) root.
pub fn with_root(root: &str, path: &str) -> String {
    let normalized = normalize_key(path);
    if root.is_empty() {
        return normalized;
    }
    if normalized.is_empty() {
        return root.to_owned();
    }
    format!("{root}/{normalized}")
}

// ── MIME inference ────────────────────────────────────────────────────────────

/// Content type for a file extension (without the leading dot).
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "js" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Content type inferred from the extension of `path`.
pub fn mime_for_path(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    mime_for_extension(ext)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
