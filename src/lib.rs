//! # modpack-dl
//!
//! Manifest-driven concurrent download/synchronization engine for modpack
//! management.
//!
//! Given a declarative list of mod identifiers — each tagged with a
//! repository namespace — the engine fetches current release metadata for a
//! target game version, reconciles it against a persisted manifest of
//! previously-downloaded artifacts, and drives bounded-concurrency
//! downloads. The manifest is rewritten after every mutation, so a crash
//! mid-run never leaves it referencing files that are not on disk.
//!
//! ## Design Philosophy
//!
//! - **Idempotent** - A run that finds nothing changed downloads nothing
//! - **Crash-consistent** - Local state is persisted per mutation, not per run
//! - **Failure-isolated** - One mod's failure never stops its siblings
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//!
//! ## Quick Start
//!
//! ```no_run
//! use modpack_dl::{DesiredMod, ModId, ModRepositories, StaticModTable, SyncConfig, SyncEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig {
//!         mod_dir: "./mods".into(),
//!         manifest_path: "./mods/manifest.json".into(),
//!         game_version: "1.12.2".to_string(),
//!         ..Default::default()
//!     };
//!
//!     let repositories = ModRepositories::with_defaults(reqwest::Client::new());
//!     let engine = SyncEngine::new(config, repositories);
//!
//!     // Subscribe to progress events
//!     let mut events = engine.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             eprintln!("{event}");
//!         }
//!     });
//!
//!     let table: StaticModTable = [
//!         DesiredMod::enabled(ModId::new("curseforge", "jei")),
//!         DesiredMod::enabled(ModId::new("curseforge", "thermal-expansion")),
//!     ]
//!     .into_iter()
//!     .collect();
//!
//!     let summary = engine.run(&table).await?;
//!     eprintln!("downloaded {}, removed {}", summary.downloaded, summary.removed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Content hashing for drift detection
pub mod digest;
/// Error types
pub mod error;
/// Manifest persistence
pub mod manifest;
/// Pluggable mod-repository backends
pub mod repository;
/// Retry logic with exponential backoff
pub mod retry;
/// Bounded-concurrency task scheduler
pub mod scheduler;
/// Reconciliation and download engine
pub mod sync;
/// Mod-table collaborator interface
pub mod table;
/// Core types and events
pub mod types;
/// File naming and document fetching helpers
pub mod utils;

// Re-export commonly used types
pub use config::{RetryConfig, SyncConfig};
pub use error::{DownloadError, Error, ManifestError, ResolveError, Result};
pub use manifest::{Manifest, ManifestEntry};
pub use repository::{
    CurseforgeRepository, DirectUrlRepository, ModRepositories, ModRepository,
};
pub use scheduler::{TaskHandle, TaskScheduler};
pub use sync::SyncEngine;
pub use table::{DesiredMod, ModTable, StaticModTable};
pub use types::{ModId, SyncEvent, SyncSummary};
