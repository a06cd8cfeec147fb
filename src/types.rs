//! Core types for modpack-dl

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Composite identifier for a mod: the repository namespace plus the
/// repository-specific id (slug or URL).
///
/// The persisted manifest and log output render a `ModId` as
/// `namespace:id`; in memory it is a structural key so that ids containing
/// the separator character never need escaping.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModId {
    /// Repository namespace (e.g. "curseforge", "url")
    pub namespace: String,
    /// Repository-specific mod id (slug for aggregators, the URL itself for
    /// raw-URL mods)
    pub id: String,
}

impl ModId {
    /// Create a new ModId
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ModId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

/// Error returned when parsing a `ModId` from a packed string
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid mod id {0:?}: expected \"namespace:id\"")]
pub struct ParseModIdError(pub String);

impl FromStr for ModId {
    type Err = ParseModIdError;

    /// Parse `namespace:id`. The first `:` separates the namespace, so ids
    /// that themselves contain `:` (raw URLs) round-trip correctly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((namespace, id)) if !namespace.is_empty() && !id.is_empty() => {
                Ok(Self::new(namespace, id))
            }
            _ => Err(ParseModIdError(s.to_string())),
        }
    }
}

// Serialized as the packed "namespace:id" string so a HashMap<ModId, _>
// persists in the manifest document format.
impl Serialize for ModId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let packed = String::deserialize(deserializer)?;
        packed.parse().map_err(de::Error::custom)
    }
}

/// Event emitted by the sync engine as it processes mods.
///
/// Consumers subscribe via [`SyncEngine::subscribe`](crate::sync::SyncEngine::subscribe).
/// Each event renders as a one-line human-readable progress message whose
/// leading indicator symbol classifies the outcome: `+` added, `-` removed,
/// ` ` unchanged, `!` problem.
#[derive(Clone, Debug)]
pub enum SyncEvent {
    /// A new or updated artifact was downloaded and recorded
    Added {
        /// The mod that was downloaded
        mod_id: ModId,
        /// File name the artifact was saved under
        file_name: String,
    },
    /// A mod's file and manifest entry were removed (disabled or pruned)
    Removed {
        /// The mod that was removed
        mod_id: ModId,
        /// File name that was deleted
        file_name: String,
    },
    /// The installed artifact is already current
    Unchanged {
        /// The mod that was skipped
        mod_id: ModId,
        /// File name currently installed
        file_name: String,
    },
    /// No release exists for the target game version
    NoRelease {
        /// The mod that could not be resolved
        mod_id: ModId,
        /// The game version that was requested
        game_version: String,
    },
    /// The resolver offered a numerically older release than the one
    /// recorded; the update was refused
    DowngradeRejected {
        /// The mod whose update was refused
        mod_id: ModId,
        /// Release token currently recorded in the manifest
        installed: String,
        /// Older release token the resolver offered
        offered: String,
    },
    /// The on-disk file no longer matches the recorded content hash; a
    /// re-download follows
    HashMismatch {
        /// The mod whose file drifted
        mod_id: ModId,
        /// File name that failed verification
        file_name: String,
    },
    /// Processing this mod failed; siblings are unaffected
    Failed {
        /// The mod that failed
        mod_id: ModId,
        /// Human-readable failure description
        reason: String,
    },
}

impl SyncEvent {
    /// The single-character indicator used in progress lines
    pub fn indicator(&self) -> char {
        match self {
            SyncEvent::Added { .. } => '+',
            SyncEvent::Removed { .. } => '-',
            SyncEvent::Unchanged { .. } => ' ',
            SyncEvent::NoRelease { .. }
            | SyncEvent::DowngradeRejected { .. }
            | SyncEvent::HashMismatch { .. }
            | SyncEvent::Failed { .. } => '!',
        }
    }

    /// The mod this event concerns
    pub fn mod_id(&self) -> &ModId {
        match self {
            SyncEvent::Added { mod_id, .. }
            | SyncEvent::Removed { mod_id, .. }
            | SyncEvent::Unchanged { mod_id, .. }
            | SyncEvent::NoRelease { mod_id, .. }
            | SyncEvent::DowngradeRejected { mod_id, .. }
            | SyncEvent::HashMismatch { mod_id, .. }
            | SyncEvent::Failed { mod_id, .. } => mod_id,
        }
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::Added { mod_id, file_name } => {
                write!(f, "+ {mod_id} {file_name}")
            }
            SyncEvent::Removed { mod_id, file_name } => {
                write!(f, "- {mod_id} {file_name}")
            }
            SyncEvent::Unchanged { mod_id, file_name } => {
                write!(f, "  {mod_id} {file_name}")
            }
            SyncEvent::NoRelease {
                mod_id,
                game_version,
            } => {
                write!(f, "! {mod_id}: no release for game version {game_version}")
            }
            SyncEvent::DowngradeRejected {
                mod_id,
                installed,
                offered,
            } => {
                write!(
                    f,
                    "! {mod_id}: rejected downgrade from {installed} to {offered}"
                )
            }
            SyncEvent::HashMismatch { mod_id, file_name } => {
                write!(f, "! {mod_id}: hash mismatch in {file_name}")
            }
            SyncEvent::Failed { mod_id, reason } => {
                write!(f, "! {mod_id}: {reason}")
            }
        }
    }
}

/// Counters summarizing one reconciliation run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Artifacts downloaded (new or updated)
    pub downloaded: usize,
    /// Files and manifest entries removed (disabled or pruned)
    pub removed: usize,
    /// Mods already current
    pub unchanged: usize,
    /// Mods with no release for the target game version
    pub no_release: usize,
    /// Updates refused because the offered release was older
    pub rejected_downgrades: usize,
    /// Mods whose processing failed
    pub failed: usize,
}

impl SyncSummary {
    /// Record one event in the counters.
    ///
    /// `HashMismatch` is informational (the re-download that follows is
    /// counted on its own) and does not change any counter.
    pub fn record(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::Added { .. } => self.downloaded += 1,
            SyncEvent::Removed { .. } => self.removed += 1,
            SyncEvent::Unchanged { .. } => self.unchanged += 1,
            SyncEvent::NoRelease { .. } => self.no_release += 1,
            SyncEvent::DowngradeRejected { .. } => self.rejected_downgrades += 1,
            SyncEvent::Failed { .. } => self.failed += 1,
            SyncEvent::HashMismatch { .. } => {}
        }
    }
}
