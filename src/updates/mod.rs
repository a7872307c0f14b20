//! Bundle update pipeline: content fingerprinting, archive helpers and
//! manifest/directive assembly.

pub mod bundle;
pub mod fingerprint;
pub mod manifest;

use chrono::{DateTime, Utc};

/// Client platform an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            other => Err(format!("unsupported platform '{other}'")),
        }
    }
}

/// Storage directory holding the bundles of one runtime version.
pub fn runtime_directory(runtime_version: &str) -> String {
    format!("updates/{runtime_version}")
}

/// Storage key for a bundle published at `at`: second-resolution UTC
/// timestamps name the zip, so key order is publication order.  Two writers
/// inside the same second produce the same key and the last one wins.
pub fn update_key(runtime_version: &str, at: DateTime<Utc>) -> String {
    format!(
        "updates/{runtime_version}/{}.zip",
        at.format("%Y%m%d%H%M%S")
    )
}

// ── Tests ──────────────────────────────────────────────────────────────────────
