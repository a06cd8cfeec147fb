//! Artifact fetching and recording

use super::RunContext;
use crate::error::{DownloadError, Error, Result};
use crate::manifest::ManifestEntry;
use crate::retry::fetch_with_retry;
use crate::types::{ModId, SyncEvent};
use crate::utils::{file_name_from_response, file_name_from_url, sanitize_file_name};

/// Fetch an artifact's bytes and its reported file name.
///
/// Transient transport failures are retried per the run's retry config; a
/// retried transfer restarts from the first byte. HTTP 404/410 surface as
/// the distinct "gone at source" error.
async fn fetch_artifact(ctx: &RunContext, url: &str) -> Result<(Vec<u8>, String)> {
    fetch_with_retry(&ctx.config.retry, || {
        let client = ctx.client.clone();
        let url = url.to_string();
        async move {
            let response = client.get(&url).send().await.map_err(Error::from)?;
            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
                return Err(Error::Download(DownloadError::Gone { url }));
            }
            if !status.is_success() {
                return Err(Error::Download(DownloadError::HttpStatus {
                    url,
                    status: status.as_u16(),
                }));
            }

            let file_name = file_name_from_response(&response)
                .or_else(|| file_name_from_url(&url))
                .unwrap_or_else(|| "download".to_string());

            let data = response.bytes().await.map_err(Error::from)?.to_vec();
            Ok((data, sanitize_file_name(&file_name)))
        }
    })
    .await
}

/// One download task: fetch the artifact, write it into the mod directory,
/// record its hash in the manifest and persist the manifest — all before
/// the task completes, so a crash after this point loses nothing.
pub(super) async fn download_and_record(
    ctx: &RunContext,
    mod_id: &ModId,
    version: &str,
    url: &str,
) -> Result<()> {
    let (data, file_name) = fetch_artifact(ctx, url).await?;

    let path = ctx.config.mod_dir.join(&file_name);
    tokio::fs::write(&path, &data).await?;

    let sha256 = crate::digest::sha256_hex(&data);
    {
        let mut manifest = ctx.manifest.lock().await;
        manifest.insert(
            mod_id.clone(),
            ManifestEntry {
                file_name: file_name.clone(),
                url: url.to_string(),
                version: version.to_string(),
                sha256,
            },
        );
        manifest.save(&ctx.config.manifest_path).await?;
    }

    ctx.emit(SyncEvent::Added {
        mod_id: mod_id.clone(),
        file_name,
    });
    Ok(())
}
