//! Raw-URL fallback backend
//!
//! For mods hosted outside any aggregator, the mod id is the download URL
//! itself and doubles as the release token: a changed URL is a changed
//! version. Everything resolves locally; no network calls.
//!
//! Table-managed `url` mods often carry a plain display name as their id,
//! with the actual URL pinned in the table's per-version cell. Resolution
//! therefore only succeeds when the id really is an `http(s)` URL; a name
//! id without a table cell resolves to no release.

use super::ModRepository;
use crate::error::Result;
use async_trait::async_trait;

fn as_http_url(id: &str) -> Option<String> {
    let parsed = url::Url::parse(id).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| id.to_string())
}

/// The raw-URL repository (namespace `url`)
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectUrlRepository;

impl DirectUrlRepository {
    /// Create the repository
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModRepository for DirectUrlRepository {
    fn name(&self) -> &str {
        "url"
    }

    fn mod_url(&self, id: &str) -> String {
        id.to_string()
    }

    fn parse_mod_url(&self, url: &str) -> Option<String> {
        Some(url.to_string())
    }

    async fn latest_release(&self, id: &str, _game_version: &str) -> Result<Option<String>> {
        Ok(as_http_url(id))
    }

    fn release_url(&self, _id: &str, release_id: &str) -> String {
        release_id.to_string()
    }

    async fn release_download_url(&self, _id: &str, release_id: &str) -> Result<Option<String>> {
        Ok(as_http_url(release_id))
    }

    fn parse_release_url(&self, url: &str) -> Option<(String, String)> {
        Some((url.to_string(), url.to_string()))
    }
}
