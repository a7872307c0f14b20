//! Server configuration, loaded from environment variables at startup.

use anyhow::bail;

/// Supported artifact-storage providers.
///
/// Selection happens once in [`Config::from_env`]; an unrecognised value
/// aborts startup instead of surfacing per-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Local,
    S3,
    Gcs,
    Supabase,
}

impl std::str::FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StorageKind::Local),
            "s3" => Ok(StorageKind::S3),
            "gcs" => Ok(StorageKind::Gcs),
            "supabase" => Ok(StorageKind::Supabase),
            other => Err(format!("unsupported storage type '{other}'")),
        }
    }
}

/// Supported metadata-persistence providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    /// SQLite or Postgres behind one sqlx `Any` pool, chosen by URL scheme.
    Sql,
    /// Supabase REST (PostgREST) backend.
    Supabase,
}

impl std::str::FromStr for DatabaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sql" | "sqlite" | "postgres" | "pg" => Ok(DatabaseKind::Sql),
            "supabase" => Ok(DatabaseKind::Supabase),
            other => Err(format!("unsupported database type '{other}'")),
        }
    }
}

/// Runtime configuration for airlift-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// with local storage and a SQLite database; provider credentials only
/// matter for the provider actually selected.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// Externally reachable base URL, used to build asset fetch URLs in
    /// manifests (default: `"http://localhost:3000"`).
    pub public_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Serve Swagger UI at `/swagger-ui` (disable in production).
    pub enable_swagger: bool,

    /// Comma-separated CORS origin allow-list; `None` means wildcard.
    pub cors_allowed_origins: Option<String>,

    /// Shared secret authorizing bundle uploads.  Set this in production.
    pub upload_key: String,

    /// Maximum accepted upload body size in megabytes.
    pub max_upload_size_mb: usize,

    /// Which persistence provider to construct.
    pub database_kind: DatabaseKind,

    /// sqlx-compatible URL for [`DatabaseKind::Sql`]; swap the scheme to
    /// move between `sqlite://…` and `postgres://…`.
    pub database_url: String,

    /// Which storage provider to construct.
    pub storage_kind: StorageKind,

    /// Root directory prefixed to every storage key (may be empty).
    pub storage_root: String,

    /// Base directory of the local filesystem provider.
    pub local_storage_dir: String,

    // ── S3-compatible provider ────────────────────────────────────────────
    pub s3_bucket: Option<String>,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    pub s3_force_path_style: bool,

    // ── GCS provider ──────────────────────────────────────────────────────
    pub gcs_bucket: Option<String>,
    pub gcs_bearer_token: Option<String>,
    pub gcs_endpoint: String,

    // ── Supabase (REST storage and/or database) ───────────────────────────
    pub supabase_url: Option<String>,
    pub supabase_api_key: Option<String>,
    pub supabase_bucket: String,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to
    /// defaults.  Fails when a provider selection is unrecognised.
    pub fn from_env() -> anyhow::Result<Self> {
        let storage_kind = match env_or("AIRLIFT_STORAGE", "local").parse::<StorageKind>() {
            Ok(kind) => kind,
            Err(e) => bail!("AIRLIFT_STORAGE: {e}"),
        };
        let database_kind = match env_or("AIRLIFT_DATABASE", "sql").parse::<DatabaseKind>() {
            Ok(kind) => kind,
            Err(e) => bail!("AIRLIFT_DATABASE: {e}"),
        };

        Ok(Self {
            bind_address: env_or("AIRLIFT_BIND", "0.0.0.0:3000"),
            public_url: env_or("AIRLIFT_PUBLIC_URL", "http://localhost:3000"),
            log_level: env_or("AIRLIFT_LOG", "info"),
            log_json: env_flag("AIRLIFT_LOG_JSON", false),
            enable_swagger: env_flag("AIRLIFT_ENABLE_SWAGGER", true),
            cors_allowed_origins: env_opt("AIRLIFT_CORS_ORIGINS"),
            upload_key: env_or("AIRLIFT_UPLOAD_KEY", "development-upload-key"),
            max_upload_size_mb: parse_env("AIRLIFT_MAX_UPLOAD_SIZE_MB", 200),
            database_kind,
            database_url: env_or("AIRLIFT_DATABASE_URL", "sqlite://airlift.db"),
            storage_kind,
            storage_root: env_or("AIRLIFT_STORAGE_ROOT", ""),
            local_storage_dir: env_or("AIRLIFT_LOCAL_STORAGE_DIR", "./data/storage"),
            s3_bucket: env_opt("S3_BUCKET_NAME"),
            s3_region: env_or("S3_REGION", "auto"),
            s3_endpoint: env_opt("S3_ENDPOINT"),
            s3_access_key_id: env_opt("S3_ACCESS_KEY_ID"),
            s3_secret_access_key: env_opt("S3_SECRET_ACCESS_KEY"),
            s3_force_path_style: env_flag("S3_FORCE_PATH_STYLE", false),
            gcs_bucket: env_opt("GCS_BUCKET_NAME"),
            gcs_bearer_token: env_opt("GCS_BEARER_TOKEN"),
            gcs_endpoint: env_or("GCS_ENDPOINT", "https://storage.googleapis.com"),
            supabase_url: env_opt("SUPABASE_URL"),
            supabase_api_key: env_opt("SUPABASE_API_KEY"),
            supabase_bucket: env_or("SUPABASE_BUCKET_NAME", "updates"),
        })
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn storage_kinds_parse() {
        assert_eq!("local".parse::<StorageKind>(), Ok(StorageKind::Local));
        assert_eq!(" S3 ".parse::<StorageKind>(), Ok(StorageKind::S3));
        assert_eq!("gcs".parse::<StorageKind>(), Ok(StorageKind::Gcs));
        assert_eq!("supabase".parse::<StorageKind>(), Ok(StorageKind::Supabase));
        assert!("azure".parse::<StorageKind>().is_err());
    }

    #[test]
    fn database_kinds_parse() {
        assert_eq!("sqlite".parse::<DatabaseKind>(), Ok(DatabaseKind::Sql));
        assert_eq!("postgres".parse::<DatabaseKind>(), Ok(DatabaseKind::Sql));
        assert_eq!("supabase".parse::<DatabaseKind>(), Ok(DatabaseKind::Supabase));
        assert!("mongo".parse::<DatabaseKind>().is_err());
    }
}
