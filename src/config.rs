//! Configuration types for modpack-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a [`SyncEngine`](crate::sync::SyncEngine) run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory artifacts are downloaded into (default: "./mods")
    #[serde(default = "default_mod_dir")]
    pub mod_dir: PathBuf,

    /// Path of the persisted manifest document (default: "./mods/manifest.json")
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// Target game version releases are resolved for (e.g. "1.12.2").
    ///
    /// There is no sensible default; the engine rejects an empty value.
    #[serde(default)]
    pub game_version: String,

    /// Maximum concurrent artifact downloads (default: 5)
    ///
    /// Artifact transfers are large; this cap is deliberately lower than
    /// [`resolve_concurrency`](Self::resolve_concurrency).
    #[serde(default = "default_download_concurrency")]
    pub download_concurrency: usize,

    /// Maximum concurrent metadata/dependency lookups (default: 10)
    #[serde(default = "default_resolve_concurrency")]
    pub resolve_concurrency: usize,

    /// Retry behavior for transient network failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Convenience constructor for the common case: defaults everywhere,
    /// explicit game version.
    pub fn for_version(game_version: impl Into<String>) -> Self {
        Self {
            game_version: game_version.into(),
            ..Self::default()
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mod_dir: default_mod_dir(),
            manifest_path: default_manifest_path(),
            game_version: String::new(),
            download_concurrency: default_download_concurrency(),
            resolve_concurrency: default_resolve_concurrency(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

fn default_mod_dir() -> PathBuf {
    PathBuf::from("./mods")
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("./mods/manifest.json")
}

fn default_download_concurrency() -> usize {
    5
}

fn default_resolve_concurrency() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
