//! Retention sweeper for abandoned uploads.
//!
//! Uploads that never complete leave a chunk directory behind, and a failed
//! extraction leaves the merged archive. Both are kept so the client can
//! retry; once they have been idle for `stale_after` the sweeper removes them.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::coordinator::UploadCoordinator;
use crate::config::RetentionConfig;
use crate::error::{Result, StorageError};
use crate::types::{CHUNK_DIR_SUFFIX, Event, UploadKey};

/// Removes stale intermediate upload state
#[derive(Clone)]
pub struct RetentionSweeper {
    coordinator: UploadCoordinator,
    stale_after: Duration,
}

impl RetentionSweeper {
    /// Create a sweeper removing state idle for at least `stale_after`
    pub fn new(coordinator: UploadCoordinator, stale_after: Duration) -> Self {
        Self {
            coordinator,
            stale_after,
        }
    }

    /// Run one pass over the upload root.
    ///
    /// Chunk directories and orphaned archives whose modification time is at
    /// least `stale_after` old are removed, except for uploads currently being
    /// merged. Extraction output and unrelated files are never touched.
    ///
    /// Returns the number of removed entries.
    pub async fn sweep_once(&self) -> Result<usize> {
        let root = self.coordinator.store().root().to_path_buf();
        let scan_error = |e: std::io::Error| StorageError::ScanFailed {
            path: root.clone(),
            reason: e.to_string(),
        };

        let mut entries = match tokio::fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(scan_error(e).into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(scan_error)? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };

            let idle = metadata
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .unwrap_or_default();
            if idle < self.stale_after {
                continue;
            }

            let path = entry.path();
            if metadata.is_dir() {
                let Some(key) = name
                    .strip_suffix(CHUNK_DIR_SUFFIX)
                    .and_then(|raw| UploadKey::parse(raw).ok())
                else {
                    continue;
                };

                match self.coordinator.expire_session(&key).await {
                    Ok(true) => {
                        info!(?path, idle_secs = idle.as_secs(), "removed stale chunk directory");
                        self.coordinator.emit_event(Event::SessionExpired { path });
                        removed += 1;
                    }
                    Ok(false) => debug!(
                        upload_key = %key,
                        "skipping stale chunk directory, merge in progress"
                    ),
                    Err(e) => warn!(?path, error = %e, "failed to remove stale chunk directory"),
                }
            } else if metadata.is_file() {
                // Merged archive left behind by a failed extraction
                let Ok(key) = UploadKey::parse(name) else {
                    continue;
                };
                if self.coordinator.is_merging(&key).await {
                    continue;
                }

                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        info!(?path, idle_secs = idle.as_secs(), "removed orphaned archive");
                        self.coordinator.emit_event(Event::SessionExpired { path });
                        removed += 1;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!(?path, error = %e, "failed to remove orphaned archive"),
                }
            }
        }

        let pruned = self.coordinator.prune_completed().await;
        if pruned > 0 {
            debug!(pruned, "forgot completed upload sessions");
        }

        Ok(removed)
    }
}

/// Spawn the periodic sweeper. Returns `None` when retention is disabled.
///
/// The first pass runs immediately, so leftovers from a previous process are
/// handled at startup.
pub fn spawn_retention_sweeper(
    coordinator: UploadCoordinator,
    config: &RetentionConfig,
    cancel_token: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    if !config.enabled {
        info!("upload retention sweeper disabled");
        return None;
    }

    let sweeper = RetentionSweeper::new(coordinator, config.stale_after);
    let sweep_interval = config.sweep_interval;

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match sweeper.sweep_once().await {
                        Ok(0) => {}
                        Ok(removed) => info!(removed, "retention sweep finished"),
                        Err(e) => warn!(error = %e, "retention sweep failed"),
                    }
                }
                _ = cancel_token.cancelled() => {
                    debug!("retention sweeper shutting down");
                    break;
                }
            }
        }
    }))
}
