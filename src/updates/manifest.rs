//! Manifest and directive assembly.
//!
//! A poll is answered with one of three bodies: a full manifest (the
//! signed description of the launch bundle and assets a client must fetch),
//! a `noUpdateAvailable` directive, or a `rollBackToEmbedded` directive.
//! Whatever the outcome, the JSON is wrapped in a one-part
//! `multipart/form-data` envelope (part `manifest` for updates, part
//! `directive` otherwise) and handed to the signing collaborator as-is.

use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use super::Platform;
use super::bundle::{Bundle, BundleError, CLIENT_CONFIG_ENTRY};
use super::fingerprint;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error("bundle has no files for platform {0}")]
    PlatformMissing(Platform),
}

/// One fetchable asset in a manifest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetadata {
    pub hash: String,
    pub key: String,
    pub file_extension: String,
    pub content_type: String,
    pub url: String,
}

/// The update manifest served to polling clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: String,
    pub created_at: String,
    pub runtime_version: String,
    pub assets: Vec<AssetMetadata>,
    pub launch_asset: AssetMetadata,
    pub metadata: Value,
    pub extra: Value,
}

/// Assemble the full manifest for `platform` from an opened bundle.
pub fn assemble_manifest(
    bundle: &mut Bundle,
    platform: Platform,
    runtime_version: &str,
    update_id: &str,
    created_at: DateTime<Utc>,
    public_url: &str,
) -> Result<Manifest, ManifestError> {
    let metadata = bundle.metadata()?;
    let files = metadata
        .file_metadata
        .get(platform.as_str())
        .ok_or(ManifestError::PlatformMissing(platform))?;

    let launch_asset = asset_metadata(
        bundle,
        &files.bundle,
        None,
        platform,
        runtime_version,
        public_url,
    )?;
    let mut assets = Vec::with_capacity(files.assets.len());
    for asset in &files.assets {
        assets.push(asset_metadata(
            bundle,
            &asset.path,
            Some(&asset.ext),
            platform,
            runtime_version,
            public_url,
        )?);
    }

    // Client configuration travels inside the bundle; absent is fine.
    let client_config = bundle
        .read_entry(CLIENT_CONFIG_ENTRY)?
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
        .unwrap_or_else(|| json!({}));

    Ok(Manifest {
        id: update_id.to_owned(),
        created_at: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        runtime_version: runtime_version.to_owned(),
        assets,
        launch_asset,
        metadata: json!({}),
        extra: json!({ "expoClient": client_config }),
    })
}

/// Hash, type and fetch URL for one bundle entry.  `ext` is `None` for the
/// launch asset, which is always served as JavaScript.
fn asset_metadata(
    bundle: &mut Bundle,
    entry_path: &str,
    ext: Option<&str>,
    platform: Platform,
    runtime_version: &str,
    public_url: &str,
) -> Result<AssetMetadata, ManifestError> {
    let bytes = bundle.require_entry(entry_path)?;
    let digest = Sha256::digest(&bytes);
    let hash = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest);
    let key = fingerprint::sha256_hex(&bytes)[..32].to_owned();

    let (file_extension, content_type) = match ext {
        Some(ext) => (
            format!(".{ext}"),
            crate::storage::mime_for_extension(ext).to_owned(),
        ),
        None => (".bundle".to_owned(), "application/javascript".to_owned()),
    };

    Ok(AssetMetadata {
        hash,
        key,
        file_extension,
        content_type,
        url: format!(
            "{public_url}/api/assets?asset={entry_path}&runtimeVersion={runtime_version}&platform={platform}"
        ),
    })
}

// ── Directives ────────────────────────────────────────────────────────────────

/// Directive telling the client it already runs the newest update.
pub fn no_update_directive() -> Value {
    json!({ "type": "noUpdateAvailable" })
}

/// Directive telling the client to roll back to its embedded update.
pub fn rollback_directive(commit_time: DateTime<Utc>) -> Value {
    json!({
        "type": "rollBackToEmbedded",
        "parameters": {
            "commitTime": commit_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        },
    })
}

// ── Response envelope ─────────────────────────────────────────────────────────

/// A one-part `multipart/form-data` response body.
#[derive(Debug)]
pub struct Envelope {
    /// Value for the `content-type` response header.
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Wrap a JSON payload as the single `manifest` or `directive` part.
pub fn envelope(part_name: &str, payload: &Value) -> Envelope {
    let boundary = format!("----airlift-{}", Uuid::new_v4().simple());
    let json = payload.to_string();

    let mut body = Vec::with_capacity(json.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("content-disposition: form-data; name=\"{part_name}\"\r\n").as_bytes(),
    );
    body.extend_from_slice(b"content-type: application/json\r\n\r\n");
    body.extend_from_slice(json.as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Envelope {
        content_type: format!("multipart/form-data; boundary={boundary}"),
        body,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util;
    use crate::updates::bundle::METADATA_ENTRY;
    use chrono::TimeZone;

    const METADATA: &[u8] = br#"{
        "version": 0,
        "bundler": "metro",
        "fileMetadata": {
            "ios": {
                "bundle": "bundles/ios.js",
                "assets": [{"path": "assets/icon", "ext": "png"}]
            }
        }
    }"#;

    fn test_bundle() -> Bundle {
        let bytes = test_util::zip_bundle(&[
            (METADATA_ENTRY, METADATA),
            ("bundles/ios.js", b"console.log('launch')"),
            ("assets/icon", b"png-bytes"),
        ]);
        Bundle::from_bytes(bytes).expect("open bundle")
    }

    #[test]
    fn manifest_carries_identity_assets_and_urls() {
        let mut bundle = test_bundle();
        let created_at = Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap();

        let manifest = assemble_manifest(
            &mut bundle,
            Platform::Ios,
            "1.0.0",
            "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee",
            created_at,
            "http://updates.example",
        )
        .expect("manifest");

        assert_eq!(manifest.id, "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee");
        assert_eq!(manifest.created_at, "2024-03-20T00:00:00.000Z");
        assert_eq!(manifest.runtime_version, "1.0.0");

        assert_eq!(manifest.launch_asset.content_type, "application/javascript");
        assert_eq!(manifest.launch_asset.file_extension, ".bundle");
        assert_eq!(
            manifest.launch_asset.url,
            "http://updates.example/api/assets?asset=bundles/ios.js&runtimeVersion=1.0.0&platform=ios"
        );

        assert_eq!(manifest.assets.len(), 1);
        let icon = &manifest.assets[0];
        assert_eq!(icon.content_type, "image/png");
        assert_eq!(icon.file_extension, ".png");
        assert_eq!(icon.key.len(), 32);

        let expected_hash = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(Sha256::digest(b"png-bytes"));
        assert_eq!(icon.hash, expected_hash);
    }

    #[test]
    fn manifest_serialises_camel_case() {
        let mut bundle = test_bundle();
        let manifest = assemble_manifest(
            &mut bundle,
            Platform::Ios,
            "1.0.0",
            "id",
            Utc::now(),
            "http://localhost:3000",
        )
        .expect("manifest");

        let value = serde_json::to_value(&manifest).expect("serialise");
        assert!(value.get("launchAsset").is_some());
        assert!(value.get("createdAt").is_some());
        assert!(value.get("runtimeVersion").is_some());
        assert_eq!(value["extra"]["expoClient"], json!({}));
    }

    #[test]
    fn unsupported_platform_is_rejected() {
        let mut bundle = test_bundle();
        let result = assemble_manifest(
            &mut bundle,
            Platform::Android,
            "1.0.0",
            "id",
            Utc::now(),
            "http://localhost:3000",
        );
        assert!(matches!(result, Err(ManifestError::PlatformMissing(Platform::Android))));
    }

    #[test]
    fn directive_bodies_match_the_protocol() {
        assert_eq!(no_update_directive(), json!({"type": "noUpdateAvailable"}));

        let commit_time = Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap();
        assert_eq!(
            rollback_directive(commit_time),
            json!({
                "type": "rollBackToEmbedded",
                "parameters": {"commitTime": "2024-03-20T00:00:00.000Z"},
            })
        );
    }

    #[test]
    fn envelope_frames_a_single_named_part() {
        let wrapped = envelope("directive", &no_update_directive());
        let body = String::from_utf8(wrapped.body).expect("utf8 body");

        let boundary = wrapped
            .content_type
            .strip_prefix("multipart/form-data; boundary=")
            .expect("boundary parameter");
        assert!(body.starts_with(&format!("--{boundary}\r\n")));
        assert!(body.contains("content-disposition: form-data; name=\"directive\""));
        assert!(body.contains(r#"{"type":"noUpdateAvailable"}"#));
        assert!(body.ends_with(&format!("\r\n--{boundary}--\r\n")));
    }
}
