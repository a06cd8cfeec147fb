//! Durable record of installed artifacts
//!
//! The manifest maps each installed mod to the file, source URL, release
//! token and content hash it was installed from. It is rewritten in full
//! after every mutating step of a run — never batched at the end — so a
//! crash mid-run leaves exactly the entries matching files actually on disk.

use crate::error::{Error, ManifestError, Result};
use crate::types::ModId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One installed artifact's provenance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Current on-disk file name, sanitized of path-hostile characters
    pub file_name: String,
    /// URL the artifact was obtained from
    pub url: String,
    /// Opaque repository-specific release token; comparable only within one
    /// repository
    pub version: String,
    /// SHA-256 of the file's bytes at write time, lowercase hex
    pub sha256: String,
}

/// Mapping from mod id to [`ManifestEntry`], persisted as a JSON object
/// keyed by `"namespace:id"`.
///
/// If an entry exists, the referenced file should exist on disk; when it
/// does not, the entry is stale and the mod is silently re-downloaded.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    mods: HashMap<ModId, ManifestEntry>,
}

impl Manifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the entry for a mod
    pub fn get(&self, mod_id: &ModId) -> Option<&ManifestEntry> {
        self.mods.get(mod_id)
    }

    /// True if the mod has an entry
    pub fn contains(&self, mod_id: &ModId) -> bool {
        self.mods.contains_key(mod_id)
    }

    /// Insert or overwrite the entry for a mod
    pub fn insert(&mut self, mod_id: ModId, entry: ManifestEntry) {
        self.mods.insert(mod_id, entry);
    }

    /// Remove a mod's entry, returning it if present
    pub fn remove(&mut self, mod_id: &ModId) -> Option<ManifestEntry> {
        self.mods.remove(mod_id)
    }

    /// All recorded mod ids
    pub fn ids(&self) -> Vec<ModId> {
        self.mods.keys().cloned().collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.mods.len()
    }

    /// True if there are no entries
    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    /// Iterate over entries
    pub fn iter(&self) -> impl Iterator<Item = (&ModId, &ManifestEntry)> {
        self.mods.iter()
    }

    /// Load a manifest from disk.
    ///
    /// A missing file is the normal first-run condition and yields
    /// `Ok(None)`. A file that exists but cannot be parsed is fatal
    /// ([`ManifestError::Corrupt`]): reconciling against an untrustworthy
    /// baseline could delete files it should not touch.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&json).map(Some).map_err(|e| {
            Error::Manifest(ManifestError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        })
    }

    /// Rewrite the whole manifest document (last-writer-wins).
    ///
    /// The document is written to a sibling temp file and renamed over the
    /// target, so a crash mid-save leaves the previous document intact.
    /// Pretty-printed for human diffability.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp);

        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
