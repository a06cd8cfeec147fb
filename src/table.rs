//! Mod-table collaborator interface
//!
//! The desired mod set comes from a structured mod-list document maintained
//! outside this crate (a markdown table in the original toolset). The engine
//! consumes it through the [`ModTable`] trait: an ordered list of mods, each
//! with a namespace-qualified id, an enabled flag, and — for mods whose
//! releases are pinned in the document itself — a per-game-version release
//! URL. [`StaticModTable`] is the in-memory implementation used by tests and
//! embedding consumers that build the list programmatically.

use crate::types::ModId;
use std::collections::HashMap;

/// Ordered, indexable view of the desired mod set
pub trait ModTable: Send + Sync {
    /// Number of rows in the table
    fn mod_count(&self) -> usize;

    /// The namespace-qualified id of row `index`, if the row exists
    fn mod_id(&self, index: usize) -> Option<ModId>;

    /// Whether row `index` is enabled; disabled rows are treated as not
    /// desired and their installed artifacts are removed
    fn is_enabled(&self, index: usize) -> bool;

    /// The document-pinned release URL of row `index` for `game_version`.
    ///
    /// `url`-namespace mods carry their download URL directly in the
    /// per-version cell; repository-resolved mods return `None` here and the
    /// engine asks the repository instead.
    fn release_override(&self, index: usize, game_version: &str) -> Option<String>;

    /// Update the pinned release URL of row `index` for `game_version`
    /// (`None` clears the cell). Used by the table-update workflow, which
    /// shares this abstraction; returns false if the row does not exist.
    fn set_release_url(&mut self, index: usize, game_version: &str, url: Option<String>) -> bool;
}

/// One row of a [`StaticModTable`]
#[derive(Clone, Debug)]
pub struct DesiredMod {
    /// Namespace-qualified mod id
    pub mod_id: ModId,
    /// Whether the mod is currently wanted
    pub enabled: bool,
    /// Pinned release URLs keyed by game version
    pub release_urls: HashMap<String, String>,
}

impl DesiredMod {
    /// An enabled repository-resolved mod with no pinned releases
    pub fn enabled(mod_id: ModId) -> Self {
        Self {
            mod_id,
            enabled: true,
            release_urls: HashMap::new(),
        }
    }

    /// A disabled mod
    pub fn disabled(mod_id: ModId) -> Self {
        Self {
            mod_id,
            enabled: false,
            release_urls: HashMap::new(),
        }
    }

    /// Pin a release URL for one game version
    #[must_use]
    pub fn with_release_url(
        mut self,
        game_version: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        self.release_urls.insert(game_version.into(), url.into());
        self
    }
}

/// In-memory [`ModTable`] built from a list of [`DesiredMod`] rows
#[derive(Clone, Debug, Default)]
pub struct StaticModTable {
    mods: Vec<DesiredMod>,
}

impl StaticModTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row
    pub fn push(&mut self, desired: DesiredMod) {
        self.mods.push(desired);
    }
}

impl FromIterator<DesiredMod> for StaticModTable {
    fn from_iter<I: IntoIterator<Item = DesiredMod>>(iter: I) -> Self {
        Self {
            mods: iter.into_iter().collect(),
        }
    }
}

impl ModTable for StaticModTable {
    fn mod_count(&self) -> usize {
        self.mods.len()
    }

    fn mod_id(&self, index: usize) -> Option<ModId> {
        self.mods.get(index).map(|m| m.mod_id.clone())
    }

    fn is_enabled(&self, index: usize) -> bool {
        self.mods.get(index).is_some_and(|m| m.enabled)
    }

    fn release_override(&self, index: usize, game_version: &str) -> Option<String> {
        self.mods
            .get(index)
            .and_then(|m| m.release_urls.get(game_version).cloned())
    }

    fn set_release_url(&mut self, index: usize, game_version: &str, url: Option<String>) -> bool {
        match self.mods.get_mut(index) {
            Some(desired) => {
                match url {
                    Some(url) => {
                        desired.release_urls.insert(game_version.to_string(), url);
                    }
                    None => {
                        desired.release_urls.remove(game_version);
                    }
                }
                true
            }
            None => false,
        }
    }
}
