//! # hls-drop
//!
//! Chunked archive upload server for HLS packages.
//!
//! Browsers split a `.zip` archive holding an HLS playlist and its encryption
//! key into fixed-size chunks and post them one by one. Chunks may arrive out
//! of order and concurrently; once every chunk of an upload is on disk the
//! server merges them in index order, extracts the archive next to the upload
//! root and removes the intermediate state. Extracted playlists are then
//! discoverable as absolute links and served with HLS-friendly content types.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hls_drop::{Config, UploadCoordinator};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::from_env()?);
//!     let coordinator = UploadCoordinator::new(config.clone());
//!
//!     // Subscribe to upload lifecycle events
//!     let mut events = coordinator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     hls_drop::api::start_api_server(coordinator, config, CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Playlist discovery and artifact kinds
pub mod artifacts;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Archive extraction
pub mod extraction;
/// Core types and events
pub mod types;
/// Chunk storage, reassembly and upload coordination
pub mod upload;

// Re-export commonly used types
pub use artifacts::{ArtifactKind, PlaylistLocator};
pub use config::Config;
pub use error::{ApiError, Error, ErrorDetail, Result, StorageError, ToHttpStatus};
pub use types::{ArchiveType, ChunkAcceptResult, ChunkUpload, Event, Stage, UploadKey};
pub use upload::{ChunkStore, Reassembler, RetentionSweeper, UploadCoordinator};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run the server until a termination signal arrives.
///
/// Creates the upload root, starts the retention sweeper and serves the API.
/// On SIGTERM/SIGINT (Ctrl+C elsewhere) the listener stops accepting
/// connections, in-flight uploads finish and the sweeper exits.
///
/// # Example
///
/// ```no_run
/// use hls_drop::{Config, run_until_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     run_until_signal(Config::from_env()?).await?;
///     Ok(())
/// }
/// ```
pub async fn run_until_signal(config: Config) -> Result<()> {
    config.validate()?;
    tokio::fs::create_dir_all(config.upload_dir())
        .await
        .map_err(|e| Error::Config {
            message: format!("cannot create upload directory {:?}: {e}", config.upload_dir()),
            key: Some("upload_dir".into()),
        })?;

    let config = Arc::new(config);
    let coordinator = UploadCoordinator::new(config.clone());
    let shutdown = CancellationToken::new();

    let sweeper =
        upload::spawn_retention_sweeper(coordinator.clone(), &config.retention, shutdown.clone());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutting down");
        signal_token.cancel();
    });

    let served = api::start_api_server(coordinator, config, shutdown.clone()).await;

    // A bind failure returns before any signal; stop the sweeper either way
    shutdown.cancel();
    if let Some(handle) = sweeper
        && let Err(e) = handle.await
    {
        tracing::warn!(error = %e, "retention sweeper task panicked");
    }

    served
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
