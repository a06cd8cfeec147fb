//! Manifest-driven reconciliation and download engine
//!
//! [`SyncEngine::run`] converges the local mod directory onto the desired
//! set described by a [`ModTable`]: it loads the manifest, resolves each
//! enabled mod's current release for the target game version, decides
//! add/update/skip/remove per mod, drives bounded-concurrency downloads
//! through two [`TaskScheduler`]s (a wide one for metadata, a narrow one for
//! artifact transfers), fans out into declared dependencies, and finally
//! prunes everything no longer desired.
//!
//! The manifest is persisted after every mutation, so a crash mid-run
//! leaves on-disk state the next run can trust. One mod's failure never
//! stops its siblings; the run aborts only on a corrupt manifest or invalid
//! configuration.

mod download;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::SyncConfig;
use crate::error::{Error, ResolveError, Result};
use crate::manifest::Manifest;
use crate::repository::{ModRepositories, ModRepository};
use crate::retry::fetch_with_retry;
use crate::scheduler::TaskScheduler;
use crate::table::ModTable;
use crate::types::{ModId, SyncEvent, SyncSummary};
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, broadcast};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The reconciliation engine (cloneable; all state is per-run)
#[derive(Clone)]
pub struct SyncEngine {
    config: Arc<SyncConfig>,
    repositories: Arc<ModRepositories>,
    client: reqwest::Client,
    event_tx: broadcast::Sender<SyncEvent>,
}

/// A mod's resolved target release for this run
struct ResolvedRelease {
    /// Opaque release token (numeric file id for aggregators, the URL for
    /// raw-URL mods)
    token: String,
    /// Download URL, when already known (table-pinned mods); otherwise
    /// looked up from the repository only once a download is decided
    download_url: Option<String>,
    /// The resolving repository; `None` for table-pinned releases
    repository: Option<Arc<dyn ModRepository>>,
}

/// Shared state of one `run` invocation
struct RunContext {
    config: Arc<SyncConfig>,
    repositories: Arc<ModRepositories>,
    client: reqwest::Client,
    event_tx: broadcast::Sender<SyncEvent>,
    /// In-memory source of truth during the run; every mutation is followed
    /// by a whole-document save while the lock is still held
    manifest: Mutex<Manifest>,
    /// Mods wanted this run (top-level enabled entries plus discovered
    /// dependencies); doubles as the dedup set for task submission
    desired: StdMutex<HashSet<ModId>>,
    summary: StdMutex<SyncSummary>,
    /// Wide scheduler for small metadata requests
    resolve_tasks: TaskScheduler,
    /// Narrow scheduler for large artifact transfers
    download_tasks: TaskScheduler,
}

impl RunContext {
    /// Mark a mod as desired; returns true the first time, so each mod is
    /// processed at most once per run (this is what terminates dependency
    /// cycles at the engine level)
    fn mark_desired(&self, mod_id: ModId) -> bool {
        self.desired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(mod_id)
    }

    fn is_desired(&self, mod_id: &ModId) -> bool {
        self.desired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(mod_id)
    }

    /// Log, count and broadcast one progress event
    fn emit(&self, event: SyncEvent) {
        match &event {
            SyncEvent::Added { .. } | SyncEvent::Removed { .. } | SyncEvent::Unchanged { .. } => {
                tracing::info!(mod_id = %event.mod_id(), "{event}");
            }
            _ => {
                tracing::warn!(mod_id = %event.mod_id(), "{event}");
            }
        }
        self.summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&event);
        // No subscribers is fine; events are best-effort
        let _ = self.event_tx.send(event);
    }
}

impl SyncEngine {
    /// Create an engine with its own HTTP client
    pub fn new(config: SyncConfig, repositories: ModRepositories) -> Self {
        Self::with_client(config, repositories, reqwest::Client::new())
    }

    /// Create an engine sharing an existing HTTP client
    pub fn with_client(
        config: SyncConfig,
        repositories: ModRepositories,
        client: reqwest::Client,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config: Arc::new(config),
            repositories: Arc::new(repositories),
            client,
            event_tx,
        }
    }

    /// Subscribe to per-mod progress events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Reconcile the mod directory against the desired set.
    ///
    /// # Errors
    ///
    /// Fails fast on an empty `game_version`, an unreadable mod directory,
    /// or a corrupt manifest. Per-mod failures are reported as
    /// [`SyncEvent::Failed`] and counted in the returned summary instead.
    pub async fn run(&self, table: &dyn ModTable) -> Result<SyncSummary> {
        if self.config.game_version.is_empty() {
            return Err(Error::Config {
                message: "game_version must not be empty".to_string(),
                key: Some("game_version".to_string()),
            });
        }

        tokio::fs::create_dir_all(&self.config.mod_dir).await?;

        // A corrupt manifest aborts here: reconciling against a baseline we
        // cannot trust could delete files it should not touch
        let manifest = Manifest::load(&self.config.manifest_path)
            .await?
            .unwrap_or_default();

        let ctx = Arc::new(RunContext {
            config: Arc::clone(&self.config),
            repositories: Arc::clone(&self.repositories),
            client: self.client.clone(),
            event_tx: self.event_tx.clone(),
            manifest: Mutex::new(manifest),
            desired: StdMutex::new(HashSet::new()),
            summary: StdMutex::new(SyncSummary::default()),
            resolve_tasks: TaskScheduler::new(self.config.resolve_concurrency),
            download_tasks: TaskScheduler::new(self.config.download_concurrency),
        });

        // Walk the table: disabled mods are removed on the spot, enabled
        // ones become resolution tasks
        for index in 0..table.mod_count() {
            let Some(mod_id) = table.mod_id(index) else {
                continue;
            };

            if !table.is_enabled(index) {
                tracing::debug!(mod_id = %mod_id, "disabled, removing if installed");
                remove_installed(&ctx, &mod_id).await;
                continue;
            }

            let override_url = table.release_override(index, &self.config.game_version);
            if ctx.mark_desired(mod_id.clone()) {
                ctx.resolve_tasks
                    .submit(process_mod(Arc::clone(&ctx), mod_id, override_url));
            }
        }

        // Resolution tasks submit download tasks and further resolution
        // tasks (dependencies); both barriers cover late submissions
        ctx.resolve_tasks.join().await;
        ctx.download_tasks.join().await;

        // End-of-run pruning: everything recorded but not desired goes away
        let recorded = ctx.manifest.lock().await.ids();
        for mod_id in recorded {
            if !ctx.is_desired(&mod_id) {
                remove_installed(&ctx, &mod_id).await;
            }
        }

        let summary = *ctx.summary.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(
            downloaded = summary.downloaded,
            removed = summary.removed,
            unchanged = summary.unchanged,
            failed = summary.failed,
            "sync complete"
        );
        Ok(summary)
    }
}

/// Delete a mod's file and manifest entry, persisting the manifest.
///
/// A file already absent is tolerated (the entry was stale); any other
/// deletion error leaves the entry in place and reports a per-mod failure.
async fn remove_installed(ctx: &RunContext, mod_id: &ModId) {
    let entry = {
        let manifest = ctx.manifest.lock().await;
        match manifest.get(mod_id) {
            Some(entry) => entry.clone(),
            None => return,
        }
    };

    let path = ctx.config.mod_dir.join(&entry.file_name);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            ctx.emit(SyncEvent::Failed {
                mod_id: mod_id.clone(),
                reason: format!("could not delete {}: {e}", entry.file_name),
            });
            return;
        }
    }

    {
        let mut manifest = ctx.manifest.lock().await;
        manifest.remove(mod_id);
        if let Err(e) = manifest.save(&ctx.config.manifest_path).await {
            ctx.emit(SyncEvent::Failed {
                mod_id: mod_id.clone(),
                reason: format!("could not persist manifest: {e}"),
            });
            return;
        }
    }

    ctx.emit(SyncEvent::Removed {
        mod_id: mod_id.clone(),
        file_name: entry.file_name,
    });
}

/// One resolution task: the per-mod state machine.
///
/// Returns a boxed future because dependency fan-out submits this same
/// function for each discovered dependency.
fn process_mod(
    ctx: Arc<RunContext>,
    mod_id: ModId,
    override_url: Option<String>,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(e) = process_mod_inner(&ctx, &mod_id, override_url).await {
            ctx.emit(SyncEvent::Failed {
                mod_id: mod_id.clone(),
                reason: e.to_string(),
            });
        }
    })
}

async fn process_mod_inner(
    ctx: &Arc<RunContext>,
    mod_id: &ModId,
    override_url: Option<String>,
) -> Result<()> {
    let game_version = &ctx.config.game_version;

    // Step 1: resolve the target release
    let release = match override_url {
        // The table pins this mod's release; the URL is token, source and
        // download location at once
        Some(url) => Some(ResolvedRelease {
            token: url.clone(),
            download_url: Some(url),
            repository: None,
        }),
        None => {
            let repository = ctx.repositories.get(&mod_id.namespace).ok_or_else(|| {
                Error::Resolve(ResolveError::UnknownNamespace {
                    namespace: mod_id.namespace.clone(),
                })
            })?;
            let token = fetch_with_retry(&ctx.config.retry, || {
                let repository = Arc::clone(&repository);
                let id = mod_id.id.clone();
                let game_version = game_version.clone();
                async move { repository.latest_release(&id, &game_version).await }
            })
            .await?;
            token.map(|token| ResolvedRelease {
                token,
                download_url: None,
                repository: Some(repository),
            })
        }
    };

    let Some(release) = release else {
        ctx.emit(SyncEvent::NoRelease {
            mod_id: mod_id.clone(),
            game_version: game_version.clone(),
        });
        return Ok(());
    };

    // Step 2: compare against the manifest and the file system
    let entry = ctx.manifest.lock().await.get(mod_id).cloned();

    // A "latest" lookup answering with a numerically older release than the
    // one recorded is stale data, not a real downgrade; refuse it rather
    // than deleting a good install
    if let Some(entry) = &entry
        && let (Ok(installed), Ok(offered)) =
            (entry.version.parse::<u64>(), release.token.parse::<u64>())
        && offered < installed
    {
        ctx.emit(SyncEvent::DowngradeRejected {
            mod_id: mod_id.clone(),
            installed: entry.version.clone(),
            offered: release.token,
        });
        return Ok(());
    }

    let needs_download = match &entry {
        None => true,
        Some(entry) if entry.version != release.token => true,
        Some(entry) => {
            let path = ctx.config.mod_dir.join(&entry.file_name);
            match crate::digest::sha256_file(&path).await {
                Ok(hash) if hash == entry.sha256 => false,
                Ok(_) => {
                    // Local drift, distinct from a version-driven update
                    ctx.emit(SyncEvent::HashMismatch {
                        mod_id: mod_id.clone(),
                        file_name: entry.file_name.clone(),
                    });
                    true
                }
                // Recorded file vanished: stale entry, silent re-download
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
                Err(e) => return Err(e.into()),
            }
        }
    };

    if needs_download {
        let download_url = match (&release.download_url, &release.repository) {
            (Some(url), _) => url.clone(),
            (None, Some(repository)) => {
                let url = fetch_with_retry(&ctx.config.retry, || {
                    let repository = Arc::clone(repository);
                    let id = mod_id.id.clone();
                    let token = release.token.clone();
                    async move { repository.release_download_url(&id, &token).await }
                })
                .await?;
                url.ok_or_else(|| {
                    Error::Other(format!("no download URL for release {}", release.token))
                })?
            }
            (None, None) => {
                return Err(Error::Other("release resolved without a source".to_string()));
            }
        };

        // Step 4: remove the stale file before fetching its replacement.
        // Already-absent is fine; anything else is fatal to this mod only.
        if let Some(entry) = &entry {
            let path = ctx.config.mod_dir.join(&entry.file_name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!(mod_id = %mod_id, file = %entry.file_name, "removed stale file");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let task_ctx = Arc::clone(ctx);
        let task_mod_id = mod_id.clone();
        let token = release.token.clone();
        ctx.download_tasks.submit(async move {
            if let Err(e) =
                download::download_and_record(&task_ctx, &task_mod_id, &token, &download_url).await
            {
                task_ctx.emit(SyncEvent::Failed {
                    mod_id: task_mod_id.clone(),
                    reason: e.to_string(),
                });
            }
        });
    } else if let Some(entry) = entry {
        ctx.emit(SyncEvent::Unchanged {
            mod_id: mod_id.clone(),
            file_name: entry.file_name,
        });
    }

    // Step 5: dependency fan-out. Each dependency becomes its own desired
    // mod; the desired-set insert dedups shared and cyclic dependencies.
    if let Some(repository) = &release.repository {
        let dependencies = fetch_with_retry(&ctx.config.retry, || {
            let repository = Arc::clone(repository);
            let id = mod_id.id.clone();
            let game_version = game_version.clone();
            async move { repository.dependencies(&id, &game_version).await }
        })
        .await?;

        for dependency in dependencies {
            let dep_id = ModId::new(mod_id.namespace.clone(), dependency);
            if ctx.mark_desired(dep_id.clone()) {
                tracing::debug!(mod_id = %mod_id, dependency = %dep_id, "discovered dependency");
                ctx.resolve_tasks
                    .submit(process_mod(Arc::clone(ctx), dep_id, None));
            }
        }
    }

    Ok(())
}
