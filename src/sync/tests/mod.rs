//! Engine tests: the per-mod state machine, dependency fan-out, pruning
//! and failure isolation, against an in-memory repository and a wiremock
//! artifact server.

use crate::config::{RetryConfig, SyncConfig};
use crate::digest::sha256_hex;
use crate::error::{Error, ManifestError, Result};
use crate::manifest::{Manifest, ManifestEntry};
use crate::repository::{DirectUrlRepository, ModRepositories, ModRepository};
use crate::sync::SyncEngine;
use crate::table::{DesiredMod, StaticModTable};
use crate::types::{ModId, SyncEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Deterministic in-memory repository under the "curseforge" namespace
#[derive(Default)]
struct MockRepository {
    /// id → release token for the test's game version
    releases: HashMap<String, String>,
    /// id → artifact download URL
    download_urls: HashMap<String, String>,
    /// id → required dependency ids
    dependencies: HashMap<String, Vec<String>>,
}

impl MockRepository {
    fn new() -> Self {
        Self::default()
    }

    fn with_release(mut self, id: &str, token: &str, download_url: &str) -> Self {
        self.releases.insert(id.to_string(), token.to_string());
        self.download_urls
            .insert(id.to_string(), download_url.to_string());
        self
    }

    fn with_dependency(mut self, id: &str, dependency: &str) -> Self {
        self.dependencies
            .entry(id.to_string())
            .or_default()
            .push(dependency.to_string());
        self
    }
}

#[async_trait]
impl ModRepository for MockRepository {
    fn name(&self) -> &str {
        "curseforge"
    }

    fn mod_url(&self, id: &str) -> String {
        format!("https://mock.example.com/mods/{id}")
    }

    fn parse_mod_url(&self, _url: &str) -> Option<String> {
        None
    }

    async fn latest_release(&self, id: &str, _game_version: &str) -> Result<Option<String>> {
        Ok(self.releases.get(id).cloned())
    }

    fn release_url(&self, id: &str, release_id: &str) -> String {
        format!("https://mock.example.com/mods/{id}/files/{release_id}")
    }

    async fn release_download_url(&self, id: &str, _release_id: &str) -> Result<Option<String>> {
        Ok(self.download_urls.get(id).cloned())
    }

    fn parse_release_url(&self, _url: &str) -> Option<(String, String)> {
        None
    }

    async fn dependencies(&self, id: &str, _game_version: &str) -> Result<Vec<String>> {
        Ok(self.dependencies.get(id).cloned().unwrap_or_default())
    }
}

fn test_config(dir: &TempDir) -> SyncConfig {
    SyncConfig {
        mod_dir: dir.path().join("mods"),
        manifest_path: dir.path().join("mods/manifest.json"),
        game_version: "1.12.2".to_string(),
        download_concurrency: 3,
        resolve_concurrency: 5,
        // No retries: failure tests should fail fast
        retry: RetryConfig {
            max_attempts: 0,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter: false,
        },
    }
}

fn engine_with(dir: &TempDir, repository: MockRepository) -> SyncEngine {
    let mut repositories = ModRepositories::new();
    repositories.add(Arc::new(repository));
    repositories.add(Arc::new(DirectUrlRepository::new()));
    SyncEngine::new(test_config(dir), repositories)
}

/// Mount an artifact at `/files/{file_name}` and return its URL
async fn serve_artifact(server: &MockServer, file_name: &str, data: &[u8]) -> String {
    Mock::given(method("GET"))
        .and(path(format!("/files/{file_name}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(data.to_vec()))
        .mount(server)
        .await;
    format!("{}/files/{file_name}", server.uri())
}

/// Write an installed artifact and its manifest entry, as a previous run
/// would have left them
async fn seed_installed(
    config: &SyncConfig,
    manifest: &mut Manifest,
    mod_id: &ModId,
    file_name: &str,
    version: &str,
    data: &[u8],
) {
    tokio::fs::create_dir_all(&config.mod_dir).await.unwrap();
    tokio::fs::write(config.mod_dir.join(file_name), data)
        .await
        .unwrap();
    manifest.insert(
        mod_id.clone(),
        ManifestEntry {
            file_name: file_name.to_string(),
            url: format!("https://mock.example.com/files/{file_name}"),
            version: version.to_string(),
            sha256: sha256_hex(data),
        },
    );
    manifest.save(&config.manifest_path).await.unwrap();
}

fn enabled_table(mod_ids: &[ModId]) -> StaticModTable {
    mod_ids
        .iter()
        .map(|id| DesiredMod::enabled(id.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// New installs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn downloads_new_mod_and_records_manifest() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let url = serve_artifact(&server, "foo.jar", b"JARDATA").await;

    let foo = ModId::new("curseforge", "foo");
    let engine = engine_with(&dir, MockRepository::new().with_release("foo", "42", &url));

    let summary = engine.run(&enabled_table(&[foo.clone()])).await.unwrap();

    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.failed, 0);

    let config = test_config(&dir);
    let written = tokio::fs::read(config.mod_dir.join("foo.jar")).await.unwrap();
    assert_eq!(written, b"JARDATA");

    let manifest = Manifest::load(&config.manifest_path).await.unwrap().unwrap();
    let entry = manifest.get(&foo).unwrap();
    assert_eq!(entry.file_name, "foo.jar");
    assert_eq!(entry.url, url);
    assert_eq!(entry.version, "42");
    assert_eq!(entry.sha256, sha256_hex(b"JARDATA"));
}

#[tokio::test]
async fn second_run_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    // The artifact may be fetched exactly once across both runs
    Mock::given(method("GET"))
        .and(path("/files/foo.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"JARDATA".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    let url = format!("{}/files/foo.jar", server.uri());

    let foo = ModId::new("curseforge", "foo");
    let table = enabled_table(&[foo.clone()]);

    let first = engine_with(&dir, MockRepository::new().with_release("foo", "42", &url));
    let summary = first.run(&table).await.unwrap();
    assert_eq!(summary.downloaded, 1);

    let second = engine_with(&dir, MockRepository::new().with_release("foo", "42", &url));
    let summary = second.run(&table).await.unwrap();
    assert_eq!(summary.downloaded, 0, "nothing changed, nothing to download");
    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.removed, 0);
}

// ---------------------------------------------------------------------------
// Removal: disabled mods and pruning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disabled_mod_is_removed_with_its_file() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let old = ModId::new("curseforge", "old-mod");

    let mut manifest = Manifest::new();
    seed_installed(&config, &mut manifest, &old, "old.jar", "7", b"OLDDATA").await;

    let engine = engine_with(&dir, MockRepository::new());
    let table: StaticModTable = [DesiredMod::disabled(old.clone())].into_iter().collect();
    let summary = engine.run(&table).await.unwrap();

    assert_eq!(summary.removed, 1);
    assert!(!config.mod_dir.join("old.jar").exists());
    let manifest = Manifest::load(&config.manifest_path).await.unwrap().unwrap();
    assert!(!manifest.contains(&old));
}

#[tokio::test]
async fn undesired_manifest_entries_are_pruned_after_the_run() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let server = MockServer::start().await;

    let a = ModId::new("curseforge", "a");
    let b = ModId::new("curseforge", "b");

    let mut manifest = Manifest::new();
    seed_installed(&config, &mut manifest, &a, "a.jar", "10", b"AAA").await;
    seed_installed(&config, &mut manifest, &b, "b.jar", "20", b"BBB").await;

    // Only A is still in the table, and it is already current
    let url = serve_artifact(&server, "a.jar", b"AAA").await;
    let engine = engine_with(&dir, MockRepository::new().with_release("a", "10", &url));
    let summary = engine.run(&enabled_table(&[a.clone()])).await.unwrap();

    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.downloaded, 0);

    let manifest = Manifest::load(&config.manifest_path).await.unwrap().unwrap();
    assert!(manifest.contains(&a), "A stays untouched");
    assert!(!manifest.contains(&b), "B's entry is pruned");
    assert!(config.mod_dir.join("a.jar").exists());
    assert!(!config.mod_dir.join("b.jar").exists(), "B's file is deleted");
}

#[tokio::test]
async fn pruning_tolerates_an_already_missing_file() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let ghost = ModId::new("curseforge", "ghost");
    let mut manifest = Manifest::new();
    seed_installed(&config, &mut manifest, &ghost, "ghost.jar", "1", b"GONE").await;
    tokio::fs::remove_file(config.mod_dir.join("ghost.jar"))
        .await
        .unwrap();

    let engine = engine_with(&dir, MockRepository::new());
    let summary = engine.run(&StaticModTable::new()).await.unwrap();

    assert_eq!(summary.removed, 1, "stale entry is still pruned");
    assert_eq!(summary.failed, 0);
    let manifest = Manifest::load(&config.manifest_path).await.unwrap().unwrap();
    assert!(manifest.is_empty());
}

// ---------------------------------------------------------------------------
// Update decisions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn numeric_downgrade_is_rejected_and_install_left_alone() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let a = ModId::new("curseforge", "a");
    let mut manifest = Manifest::new();
    seed_installed(&config, &mut manifest, &a, "a.jar", "100", b"CURRENT").await;

    // A flaky "latest" lookup answers with an older numeric release
    let engine = engine_with(
        &dir,
        MockRepository::new().with_release("a", "50", "https://unused.example.com/a.jar"),
    );
    let summary = engine.run(&enabled_table(&[a.clone()])).await.unwrap();

    assert_eq!(summary.rejected_downgrades, 1);
    assert_eq!(summary.downloaded, 0);

    let manifest = Manifest::load(&config.manifest_path).await.unwrap().unwrap();
    assert_eq!(manifest.get(&a).unwrap().version, "100", "entry is not overwritten");
    let data = tokio::fs::read(config.mod_dir.join("a.jar")).await.unwrap();
    assert_eq!(data, b"CURRENT", "the installed file is not deleted");
}

#[tokio::test]
async fn version_change_replaces_the_stale_file() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let server = MockServer::start().await;

    let a = ModId::new("curseforge", "a");
    let mut manifest = Manifest::new();
    seed_installed(&config, &mut manifest, &a, "a-1.0.jar", "100", b"OLD").await;

    let url = serve_artifact(&server, "a-2.0.jar", b"NEW").await;
    let engine = engine_with(&dir, MockRepository::new().with_release("a", "200", &url));
    let summary = engine.run(&enabled_table(&[a.clone()])).await.unwrap();

    assert_eq!(summary.downloaded, 1);
    assert!(
        !config.mod_dir.join("a-1.0.jar").exists(),
        "the stale artifact is removed before the new one lands"
    );
    let manifest = Manifest::load(&config.manifest_path).await.unwrap().unwrap();
    let entry = manifest.get(&a).unwrap();
    assert_eq!(entry.version, "200");
    assert_eq!(entry.file_name, "a-2.0.jar");
}

#[tokio::test]
async fn hash_drift_triggers_redownload_with_distinct_event() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let server = MockServer::start().await;

    let a = ModId::new("curseforge", "a");
    let mut manifest = Manifest::new();
    seed_installed(&config, &mut manifest, &a, "a.jar", "42", b"JARDATA").await;
    // Someone edited the file behind the manifest's back
    tokio::fs::write(config.mod_dir.join("a.jar"), b"TAMPERED")
        .await
        .unwrap();

    let url = serve_artifact(&server, "a.jar", b"JARDATA").await;
    let engine = engine_with(&dir, MockRepository::new().with_release("a", "42", &url));
    let mut events = engine.subscribe();
    let summary = engine.run(&enabled_table(&[a.clone()])).await.unwrap();

    assert_eq!(summary.downloaded, 1);
    let restored = tokio::fs::read(config.mod_dir.join("a.jar")).await.unwrap();
    assert_eq!(restored, b"JARDATA");

    let mut saw_mismatch = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SyncEvent::HashMismatch { .. }) {
            saw_mismatch = true;
        }
    }
    assert!(saw_mismatch, "drift must be reported distinctly from a version update");
}

#[tokio::test]
async fn missing_file_is_silently_redownloaded() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let server = MockServer::start().await;

    let a = ModId::new("curseforge", "a");
    let mut manifest = Manifest::new();
    seed_installed(&config, &mut manifest, &a, "a.jar", "42", b"JARDATA").await;
    tokio::fs::remove_file(config.mod_dir.join("a.jar"))
        .await
        .unwrap();

    let url = serve_artifact(&server, "a.jar", b"JARDATA").await;
    let engine = engine_with(&dir, MockRepository::new().with_release("a", "42", &url));
    let mut events = engine.subscribe();
    let summary = engine.run(&enabled_table(&[a.clone()])).await.unwrap();

    assert_eq!(summary.downloaded, 1);
    assert!(config.mod_dir.join("a.jar").exists());

    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, SyncEvent::HashMismatch { .. }),
            "a vanished file is a stale entry, not drift"
        );
    }
}

// ---------------------------------------------------------------------------
// Resolution outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn no_release_for_version_skips_without_touching_manifest() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let a = ModId::new("curseforge", "a");
    let mut manifest = Manifest::new();
    seed_installed(&config, &mut manifest, &a, "a.jar", "100", b"KEEP").await;

    // The repository knows nothing about "a" for this game version
    let engine = engine_with(&dir, MockRepository::new());
    let summary = engine.run(&enabled_table(&[a.clone()])).await.unwrap();

    assert_eq!(summary.no_release, 1);
    assert_eq!(summary.downloaded, 0);
    assert_eq!(summary.removed, 0, "the desired mod is not pruned either");

    let manifest = Manifest::load(&config.manifest_path).await.unwrap().unwrap();
    assert_eq!(manifest.get(&a).unwrap().version, "100");
}

#[tokio::test]
async fn unknown_namespace_is_a_per_mod_failure() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(&dir, MockRepository::new());

    let table = enabled_table(&[ModId::new("ftb", "some-pack")]);
    let summary = engine.run(&table).await.unwrap();

    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn table_pinned_url_mod_downloads_from_its_cell() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let server = MockServer::start().await;
    let url = serve_artifact(&server, "custom.jar", b"CUSTOM").await;

    let mod_id = ModId::new("url", &url);
    let table: StaticModTable =
        [DesiredMod::enabled(mod_id.clone()).with_release_url("1.12.2", &url)]
            .into_iter()
            .collect();

    let engine = engine_with(&dir, MockRepository::new());
    let summary = engine.run(&table).await.unwrap();

    assert_eq!(summary.downloaded, 1);
    let manifest = Manifest::load(&config.manifest_path).await.unwrap().unwrap();
    let entry = manifest.get(&mod_id).unwrap();
    assert_eq!(entry.version, url, "the URL is the release token");
    assert_eq!(entry.file_name, "custom.jar");
}

#[tokio::test]
async fn url_mod_without_a_cell_for_the_version_reports_no_release() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let server = MockServer::start().await;
    let url = serve_artifact(&server, "custom.jar", b"CUSTOM").await;

    // The row pins a URL for 1.7.10 only; the run targets 1.12.2. The id
    // is a display name, so the raw-URL repository cannot resolve it either.
    let mod_id = ModId::new("url", "Some Custom Mod");
    let table: StaticModTable =
        [DesiredMod::enabled(mod_id.clone()).with_release_url("1.7.10", &url)]
            .into_iter()
            .collect();

    let engine = engine_with(&dir, MockRepository::new());
    let summary = engine.run(&table).await.unwrap();

    assert_eq!(summary.no_release, 1);
    assert_eq!(summary.downloaded, 0);
    let manifest = Manifest::load(&config.manifest_path)
        .await
        .unwrap()
        .unwrap_or_default();
    assert!(manifest.is_empty());
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dependencies_are_resolved_downloaded_and_protected_from_pruning() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let server = MockServer::start().await;

    let url_a = serve_artifact(&server, "a.jar", b"AAA").await;
    let url_lib = serve_artifact(&server, "lib.jar", b"LIB").await;

    let a = ModId::new("curseforge", "a");
    let lib = ModId::new("curseforge", "corelib");

    let engine = engine_with(
        &dir,
        MockRepository::new()
            .with_release("a", "10", &url_a)
            .with_release("corelib", "5", &url_lib)
            .with_dependency("a", "corelib"),
    );
    // Only A is in the table; corelib arrives through the dependency walk
    let summary = engine.run(&enabled_table(&[a.clone()])).await.unwrap();

    assert_eq!(summary.downloaded, 2);
    assert_eq!(summary.removed, 0, "the dependency counts as desired");

    let manifest = Manifest::load(&config.manifest_path).await.unwrap().unwrap();
    assert!(manifest.contains(&a));
    assert!(manifest.contains(&lib));
}

#[tokio::test]
async fn circular_dependencies_terminate_with_each_mod_once() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let server = MockServer::start().await;

    // Each artifact may be fetched exactly once despite the cycle
    Mock::given(method("GET"))
        .and(path("/files/a.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"AAA".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/b.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"BBB".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let a = ModId::new("curseforge", "a");
    let b = ModId::new("curseforge", "b");
    let engine = engine_with(
        &dir,
        MockRepository::new()
            .with_release("a", "1", &format!("{}/files/a.jar", server.uri()))
            .with_release("b", "2", &format!("{}/files/b.jar", server.uri()))
            .with_dependency("a", "b")
            .with_dependency("b", "a"),
    );

    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        engine.run(&enabled_table(&[a.clone()])),
    )
    .await
    .expect("a dependency cycle must not hang the run")
    .unwrap();

    assert_eq!(summary.downloaded, 2);
    let manifest = Manifest::load(&config.manifest_path).await.unwrap().unwrap();
    assert!(manifest.contains(&a));
    assert!(manifest.contains(&b));
}

// ---------------------------------------------------------------------------
// Failure isolation and fatal conditions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_failing_download_does_not_stop_siblings() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/files/broken.jar"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let url_ok = serve_artifact(&server, "fine.jar", b"FINE").await;

    let broken = ModId::new("curseforge", "broken");
    let fine = ModId::new("curseforge", "fine");
    let engine = engine_with(
        &dir,
        MockRepository::new()
            .with_release("broken", "1", &format!("{}/files/broken.jar", server.uri()))
            .with_release("fine", "2", &url_ok),
    );

    let summary = engine
        .run(&enabled_table(&[broken.clone(), fine.clone()]))
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.downloaded, 1);

    let manifest = Manifest::load(&config.manifest_path).await.unwrap().unwrap();
    assert!(manifest.contains(&fine));
    assert!(
        !manifest.contains(&broken),
        "a failed download records nothing"
    );
}

#[tokio::test]
async fn gone_artifact_reports_the_distinct_message() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/vanished.jar"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let gone = ModId::new("curseforge", "vanished");
    let engine = engine_with(
        &dir,
        MockRepository::new().with_release(
            "vanished",
            "1",
            &format!("{}/files/vanished.jar", server.uri()),
        ),
    );
    let mut events = engine.subscribe();
    let summary = engine.run(&enabled_table(&[gone])).await.unwrap();

    assert_eq!(summary.failed, 1);
    let mut saw_gone_message = false;
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::Failed { reason, .. } = &event
            && reason.contains("no longer exists")
        {
            saw_gone_message = true;
        }
    }
    assert!(saw_gone_message, "404 must be reported as gone-at-source");
}

#[tokio::test]
async fn empty_game_version_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.game_version.clear();

    let mut repositories = ModRepositories::new();
    repositories.add(Arc::new(MockRepository::new()));
    let engine = SyncEngine::new(config, repositories);

    let result = engine.run(&StaticModTable::new()).await;
    assert!(matches!(result, Err(Error::Config { .. })));
}

#[tokio::test]
async fn corrupt_manifest_aborts_the_run() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    tokio::fs::create_dir_all(&config.mod_dir).await.unwrap();
    tokio::fs::write(&config.manifest_path, "{ definitely not json")
        .await
        .unwrap();

    let engine = engine_with(&dir, MockRepository::new());
    let result = engine.run(&StaticModTable::new()).await;

    assert!(matches!(
        result,
        Err(Error::Manifest(ManifestError::Corrupt { .. }))
    ));
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn progress_events_carry_indicator_symbols() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let url = serve_artifact(&server, "foo.jar", b"JARDATA").await;

    let foo = ModId::new("curseforge", "foo");
    let engine = engine_with(&dir, MockRepository::new().with_release("foo", "42", &url));
    let mut events = engine.subscribe();
    engine.run(&enabled_table(&[foo.clone()])).await.unwrap();

    let mut added_line = None;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SyncEvent::Added { .. }) {
            assert_eq!(event.indicator(), '+');
            added_line = Some(event.to_string());
        }
    }
    let line = added_line.expect("an Added event must be broadcast");
    assert!(line.starts_with("+ curseforge:foo"), "line was {line:?}");
}
