//! Pluggable mod-repository abstraction
//!
//! A repository resolves human-facing mod identifiers to releases and
//! download URLs for a given game version. Two backends ship with the crate:
//! - [`CurseforgeRepository`] — the aggregator backend (namespace
//!   `curseforge`), resolving slugs through the addon API
//! - [`DirectUrlRepository`] — the raw-URL fallback (namespace `url`), where
//!   the id already is the download URL
//!
//! Implementations cache aggressively for the lifetime of a run: resolving
//! the same id twice (top-level entry and dependency of another mod) must
//! not repeat network calls.

mod curseforge;
mod direct;

pub use curseforge::CurseforgeRepository;
pub use direct::DirectUrlRepository;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Capability contract of one named mod repository
#[async_trait]
pub trait ModRepository: Send + Sync {
    /// The namespace this repository owns (e.g. "curseforge")
    fn name(&self) -> &str;

    /// Canonical human-navigable page for a mod
    fn mod_url(&self, id: &str) -> String;

    /// Recognize and normalize a repository-specific mod URL into an id
    fn parse_mod_url(&self, url: &str) -> Option<String>;

    /// The newest release of `id` for `game_version`, if any.
    ///
    /// Idempotent and cached per id for the lifetime of the instance.
    async fn latest_release(&self, id: &str, game_version: &str) -> Result<Option<String>>;

    /// Canonical human-navigable page for one release (manifest provenance
    /// and logging)
    fn release_url(&self, id: &str, release_id: &str) -> String;

    /// The direct download URL for one release, if the repository still
    /// serves it
    async fn release_download_url(&self, id: &str, release_id: &str) -> Result<Option<String>>;

    /// Recognize a repository-specific release URL into `(id, release_id)`
    fn parse_release_url(&self, url: &str) -> Option<(String, String)>;

    /// Required dependencies of `id` for `game_version`, as ids in this
    /// repository's namespace. Only some repositories expose dependency
    /// graphs; the default is none.
    async fn dependencies(&self, _id: &str, _game_version: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Registry of repositories, looked up by namespace or by URL recognition
#[derive(Clone, Default)]
pub struct ModRepositories {
    repositories: Vec<Arc<dyn ModRepository>>,
    by_name: HashMap<String, Arc<dyn ModRepository>>,
}

impl ModRepositories {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard registry: curseforge aggregator plus raw-URL fallback,
    /// sharing one HTTP client
    pub fn with_defaults(client: reqwest::Client) -> Self {
        let mut repositories = Self::new();
        repositories.add(Arc::new(CurseforgeRepository::new(client)));
        repositories.add(Arc::new(DirectUrlRepository::new()));
        repositories
    }

    /// Register a repository under its namespace
    pub fn add(&mut self, repository: Arc<dyn ModRepository>) {
        self.by_name
            .insert(repository.name().to_string(), Arc::clone(&repository));
        self.repositories.push(repository);
    }

    /// Look up a repository by namespace
    pub fn get(&self, name: &str) -> Option<Arc<dyn ModRepository>> {
        self.by_name.get(name).cloned()
    }

    /// Recognize a mod URL against every registered repository, in
    /// registration order
    pub fn parse_mod_url(&self, url: &str) -> Option<(Arc<dyn ModRepository>, String)> {
        self.repositories
            .iter()
            .find_map(|repo| repo.parse_mod_url(url).map(|id| (Arc::clone(repo), id)))
    }

    /// Recognize a release URL against every registered repository, in
    /// registration order
    pub fn parse_release_url(&self, url: &str) -> Option<(Arc<dyn ModRepository>, String, String)> {
        self.repositories.iter().find_map(|repo| {
            repo.parse_release_url(url)
                .map(|(id, release_id)| (Arc::clone(repo), id, release_id))
        })
    }
}

/// State of one key in a [`ResolutionCache`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheSlot<V> {
    /// A resolution finished earlier this run
    Resolved(V),
    /// A resolution for this key is in flight — or this lookup re-entered
    /// itself through a dependency cycle. Callers treat this as "not yet
    /// known" and move on instead of resolving again.
    Pending,
    /// First claim: the caller now owns resolving this key and the slot has
    /// been marked pending on its behalf
    Vacant,
}

/// Per-run memoization for repository lookups.
///
/// Owned by the repository instance it serves (injected, never
/// process-global), so cache lifetime equals instance lifetime and tests
/// stay isolated. The claim-then-fill protocol marks a key pending *before*
/// any network or recursive work, which is what makes dependency cycles
/// terminate: the cycle-closing lookup sees [`CacheSlot::Pending`] and
/// short-circuits.
pub struct ResolutionCache<V> {
    entries: Mutex<HashMap<String, Option<V>>>,
}

impl<V: Clone> ResolutionCache<V> {
    /// An empty cache
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Claim a key: returns what is known about it, marking it pending if
    /// this is the first claim.
    pub fn claim(&self, key: &str) -> CacheSlot<V> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(Some(value)) => CacheSlot::Resolved(value.clone()),
            Some(None) => CacheSlot::Pending,
            None => {
                entries.insert(key.to_string(), None);
                CacheSlot::Vacant
            }
        }
    }

    /// Record the resolved value for a claimed key
    pub fn fill(&self, key: &str, value: V) {
        self.lock().insert(key.to_string(), Some(value));
    }

    /// The resolved value for a key, if resolution completed
    pub fn get(&self, key: &str) -> Option<V> {
        self.lock().get(key).and_then(Clone::clone)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Option<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone> Default for ResolutionCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
