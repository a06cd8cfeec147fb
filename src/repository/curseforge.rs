//! Curseforge aggregator backend
//!
//! Resolution happens in two hops: the widget API turns a human slug into a
//! numeric project id, then the addon API lists the project's files. Both
//! hops are cached per run — a mod pulled in as a top-level entry *and* as
//! another mod's dependency resolves exactly once.

use super::{CacheSlot, ModRepository, ResolutionCache};
use crate::error::{Error, ResolveError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};

const DEFAULT_API_BASE: &str = "https://addons-ecs.forgesvc.net/api/v2";
const DEFAULT_WIDGET_BASE: &str = "https://api.cfwidget.com/minecraft/mc-mods";

/// Dependency kind tag for required dependencies in addon file metadata
const REQUIRED_DEPENDENCY: u32 = 3;

#[allow(clippy::expect_used)]
static PROJECT_URL_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"^https?://minecraft\.curseforge\.com/projects/([^/?#]+)")
            .expect("static pattern"),
        Regex::new(r"^https?://(?:www\.)?curseforge\.com/minecraft/mc-mods/([^/?#]+)")
            .expect("static pattern"),
    ]
});

#[allow(clippy::expect_used)]
static RELEASE_URL_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"^https?://minecraft\.curseforge\.com/projects/([^/?#]+)/files/(\d+)")
            .expect("static pattern"),
        Regex::new(r"^https?://(?:www\.)?curseforge\.com/minecraft/mc-mods/([^/?#]+)/files/(\d+)")
            .expect("static pattern"),
    ]
});

#[derive(Debug, Deserialize)]
struct AddonInfo {
    id: u64,
    slug: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddonFile {
    id: u64,
    file_date: DateTime<Utc>,
    #[serde(default)]
    game_version: Vec<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    dependencies: Vec<AddonDependency>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddonDependency {
    addon_id: u64,
    #[serde(rename = "type")]
    kind: u32,
}

#[derive(Debug, Deserialize)]
struct WidgetProject {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct GameInfo {
    id: u64,
    slug: String,
}

/// The aggregator repository (namespace `curseforge`)
pub struct CurseforgeRepository {
    client: reqwest::Client,
    api_base: String,
    widget_base: String,
    /// Slugs the widget API resolves with stale data; lookups translate
    /// through this table first. Rename detection appends to it at runtime.
    slug_replacements: Mutex<HashMap<String, String>>,
    /// slug → project id; `None` means the slug could not be resolved
    project_ids: ResolutionCache<Option<String>>,
    /// project id → (game version → newest release id)
    releases: ResolutionCache<HashMap<String, String>>,
    /// "project id@game version" → dependency slugs
    dependency_slugs: ResolutionCache<Vec<String>>,
    /// Memoized Minecraft game id for the addon search fallback
    game_id: ResolutionCache<String>,
}

impl CurseforgeRepository {
    /// Create a repository talking to the production endpoints
    pub fn new(client: reqwest::Client) -> Self {
        let mut slug_replacements = HashMap::new();
        for (from, to) in [
            ("cofhcore", "cofh-core"),
            ("eleccore-rendering-library", "eleccore"),
            ("just-enough-items-jei", "jei"),
            ("orbis-api", "orbis-lib"),
            ("thermalexpansion", "thermal-expansion"),
        ] {
            slug_replacements.insert(from.to_string(), to.to_string());
        }

        let project_ids = ResolutionCache::new();
        // The widget API resolves these slugs with outdated data; seed the
        // correct project ids. Renames of these mods will not be picked up.
        for (slug, id) in [
            ("terraforged", "363820"),
            ("light-overlay", "325492"),
            ("mystical-adaptations", "325892"),
            ("vanilla-tools", "308705"),
        ] {
            project_ids.fill(slug, Some(id.to_string()));
        }

        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            widget_base: DEFAULT_WIDGET_BASE.to_string(),
            slug_replacements: Mutex::new(slug_replacements),
            project_ids,
            releases: ResolutionCache::new(),
            dependency_slugs: ResolutionCache::new(),
            game_id: ResolutionCache::new(),
        }
    }

    /// Point both endpoints somewhere else (tests, mirrors)
    #[must_use]
    pub fn with_base_urls(
        mut self,
        api_base: impl Into<String>,
        widget_base: impl Into<String>,
    ) -> Self {
        self.api_base = api_base.into();
        self.widget_base = widget_base.into();
        self
    }

    fn translate_slug(&self, slug: &str) -> String {
        let replacements = self
            .slug_replacements
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        replacements.get(slug).cloned().unwrap_or_else(|| slug.to_string())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        tracing::debug!(url, "GET");
        let value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(value)
    }

    /// The aggregator's internal game id for Minecraft, used by the addon
    /// search fallback
    async fn minecraft_game_id(&self) -> Result<String> {
        if let Some(id) = self.game_id.get("minecraft") {
            return Ok(id);
        }
        let games: Vec<GameInfo> = self.get_json(&format!("{}/game", self.api_base)).await?;
        let id = games
            .into_iter()
            .find(|game| game.slug == "minecraft")
            .map(|game| game.id.to_string())
            .ok_or_else(|| {
                Error::Resolve(ResolveError::InvalidResponse {
                    url: format!("{}/game", self.api_base),
                    reason: "no game with slug \"minecraft\"".to_string(),
                })
            })?;
        self.game_id.fill("minecraft", id.clone());
        Ok(id)
    }

    /// Resolve a slug (or pass through a numeric id) to the project id.
    ///
    /// `Ok(None)` means the slug is unknown — or that a resolution for it is
    /// already in flight, which a re-entrant caller treats the same way.
    async fn project_id(&self, slug: &str) -> Result<Option<String>> {
        // Dependency metadata refers to projects by numeric id directly
        if !slug.is_empty() && slug.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Some(slug.to_string()));
        }

        let slug = self.translate_slug(slug);
        match self.project_ids.claim(&slug) {
            CacheSlot::Resolved(id) => return Ok(id),
            CacheSlot::Pending => return Ok(None),
            CacheSlot::Vacant => {}
        }

        // Primary: the widget API maps slugs to project ids
        let widget_url = format!("{}/{}", self.widget_base, slug);
        match self.get_json::<WidgetProject>(&widget_url).await {
            Ok(project) => {
                let id = project.id.to_string();

                // The project's canonical slug may have moved on
                let info: AddonInfo = self
                    .get_json(&format!("{}/addon/{}", self.api_base, id))
                    .await?;
                if info.slug != slug {
                    tracing::warn!(old = %slug, new = %info.slug, "slug has been renamed");
                    self.slug_replacements
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(slug.clone(), info.slug.clone());
                    self.project_ids.fill(&info.slug, Some(id.clone()));
                }

                self.project_ids.fill(&slug, Some(id.clone()));
                Ok(Some(id))
            }
            Err(widget_err) => {
                // Fallback: addon search, less reliable but fills the cache
                // for every slug it returns
                tracing::debug!(slug = %slug, error = %widget_err, "widget lookup failed, trying addon search");
                let game_id = self.minecraft_game_id().await?;
                let search_url = format!(
                    "{}/addon/search?gameId={}&searchFilter={}",
                    self.api_base,
                    game_id,
                    urlencoding::encode(&slug)
                );
                let results: Vec<AddonInfo> = self.get_json(&search_url).await?;
                for result in &results {
                    self.project_ids.fill(&result.slug, Some(result.id.to_string()));
                }

                match self.project_ids.get(&slug).flatten() {
                    Some(id) => Ok(Some(id)),
                    None => {
                        tracing::warn!(slug = %slug, "could not find a project id");
                        self.project_ids.fill(&slug, None);
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Newest release id per game version for one project, computed once
    /// per run from the project's file list
    async fn release_index(&self, project_id: &str) -> Result<Option<HashMap<String, String>>> {
        match self.releases.claim(project_id) {
            CacheSlot::Resolved(index) => return Ok(Some(index)),
            CacheSlot::Pending => return Ok(None),
            CacheSlot::Vacant => {}
        }

        let files: Vec<AddonFile> = self
            .get_json(&format!("{}/addon/{}/files", self.api_base, project_id))
            .await?;

        let mut newest_dates: HashMap<String, DateTime<Utc>> = HashMap::new();
        let mut newest_ids: HashMap<String, String> = HashMap::new();
        for file in files {
            let mut is_fabric = false;
            let mut is_forge = false;
            for tag in &file.game_version {
                is_fabric = is_fabric || tag.eq_ignore_ascii_case("fabric");
                is_forge = is_forge || tag.eq_ignore_ascii_case("forge");
            }
            // Untagged files predate loader tags and are Forge files
            if !is_forge && !is_fabric {
                is_forge = true;
            }
            if !is_forge {
                continue;
            }

            for version in &file.game_version {
                if version.eq_ignore_ascii_case("fabric") || version.eq_ignore_ascii_case("forge") {
                    continue;
                }
                let newer = newest_dates
                    .get(version)
                    .is_none_or(|recorded| file.file_date > *recorded);
                if newer {
                    newest_dates.insert(version.clone(), file.file_date);
                    newest_ids.insert(version.clone(), file.id.to_string());
                }
            }
        }

        self.releases.fill(project_id, newest_ids.clone());
        Ok(Some(newest_ids))
    }
}

#[async_trait]
impl ModRepository for CurseforgeRepository {
    fn name(&self) -> &str {
        "curseforge"
    }

    fn mod_url(&self, id: &str) -> String {
        format!(
            "https://www.curseforge.com/minecraft/mc-mods/{}",
            self.translate_slug(id)
        )
    }

    fn parse_mod_url(&self, url: &str) -> Option<String> {
        PROJECT_URL_RE
            .iter()
            .find_map(|re| re.captures(url))
            .map(|captures| captures[1].to_string())
    }

    async fn latest_release(&self, id: &str, game_version: &str) -> Result<Option<String>> {
        let Some(project_id) = self.project_id(id).await? else {
            return Ok(None);
        };
        let Some(index) = self.release_index(&project_id).await? else {
            return Ok(None);
        };
        Ok(index.get(game_version).cloned())
    }

    fn release_url(&self, id: &str, release_id: &str) -> String {
        format!(
            "https://www.curseforge.com/minecraft/mc-mods/{}/files/{}",
            self.translate_slug(id),
            release_id
        )
    }

    async fn release_download_url(&self, id: &str, release_id: &str) -> Result<Option<String>> {
        let Some(project_id) = self.project_id(id).await? else {
            return Ok(None);
        };
        let file: AddonFile = self
            .get_json(&format!(
                "{}/addon/{}/file/{}",
                self.api_base, project_id, release_id
            ))
            .await?;
        Ok(file.download_url)
    }

    fn parse_release_url(&self, url: &str) -> Option<(String, String)> {
        RELEASE_URL_RE
            .iter()
            .find_map(|re| re.captures(url))
            .map(|captures| (captures[1].to_string(), captures[2].to_string()))
    }

    /// Required dependencies of the release that `latest_release` would pick
    /// for this game version, as slugs.
    ///
    /// A dependency cycle re-enters this method for an id whose slot is
    /// already pending and gets an empty list back — the cycle-closing edge
    /// resolves to nothing instead of recursing forever.
    async fn dependencies(&self, id: &str, game_version: &str) -> Result<Vec<String>> {
        let Some(project_id) = self.project_id(id).await? else {
            return Ok(Vec::new());
        };

        let key = format!("{project_id}@{game_version}");
        match self.dependency_slugs.claim(&key) {
            CacheSlot::Resolved(slugs) => return Ok(slugs),
            CacheSlot::Pending => return Ok(Vec::new()),
            CacheSlot::Vacant => {}
        }

        let Some(index) = self.release_index(&project_id).await? else {
            self.dependency_slugs.fill(&key, Vec::new());
            return Ok(Vec::new());
        };
        let Some(release_id) = index.get(game_version) else {
            self.dependency_slugs.fill(&key, Vec::new());
            return Ok(Vec::new());
        };

        let file: AddonFile = self
            .get_json(&format!(
                "{}/addon/{}/file/{}",
                self.api_base, project_id, release_id
            ))
            .await?;

        let mut slugs = Vec::new();
        for dependency in file
            .dependencies
            .iter()
            .filter(|d| d.kind == REQUIRED_DEPENDENCY)
        {
            // Resolve the addon id to its slug so the engine reports the
            // dependency under a human-readable id; this also pre-fills the
            // project-id cache for the engine's own lookup of the dependency
            let info: AddonInfo = self
                .get_json(&format!("{}/addon/{}", self.api_base, dependency.addon_id))
                .await?;
            self.project_ids
                .fill(&info.slug, Some(info.id.to_string()));
            slugs.push(info.slug);
        }

        self.dependency_slugs.fill(&key, slugs.clone());
        Ok(slugs)
    }
}
