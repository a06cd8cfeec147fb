//! Basic sync example
//!
//! This example demonstrates the core functionality of modpack-dl:
//! - Building a desired mod set
//! - Creating a sync engine with the default repositories
//! - Subscribing to progress events
//! - Running reconciliation and reading the summary

use modpack_dl::{DesiredMod, ModId, ModRepositories, StaticModTable, SyncConfig, SyncEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    // Build configuration
    let config = SyncConfig {
        mod_dir: "mods".into(),
        manifest_path: "mods/manifest.json".into(),
        game_version: "1.12.2".to_string(),
        download_concurrency: 5,
        ..Default::default()
    };

    // The standard repositories: the curseforge aggregator plus the
    // raw-URL fallback
    let repositories = ModRepositories::with_defaults(reqwest::Client::new());
    let engine = SyncEngine::new(config, repositories);

    // Subscribe to progress events
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            // Each event renders as "+ curseforge:jei jei.jar" style lines
            eprintln!("{event}");
        }
    });

    // The desired mod set normally comes from a mod-list document; built
    // inline here. Disabled rows have their installed files removed.
    let table: StaticModTable = [
        DesiredMod::enabled(ModId::new("curseforge", "jei")),
        DesiredMod::enabled(ModId::new("curseforge", "thermal-expansion")),
        DesiredMod::disabled(ModId::new("curseforge", "some-old-mod")),
        DesiredMod::enabled(ModId::new("url", "https://example.com/files/custom-mod.jar"))
            .with_release_url("1.12.2", "https://example.com/files/custom-mod.jar"),
    ]
    .into_iter()
    .collect();

    let summary = engine.run(&table).await?;
    eprintln!(
        "done: {} downloaded, {} removed, {} unchanged, {} failed",
        summary.downloaded, summary.removed, summary.unchanged, summary.failed
    );

    Ok(())
}
