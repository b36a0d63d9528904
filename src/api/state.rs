//! Application state for the API server

use crate::artifacts::PlaylistLocator;
use crate::{Config, UploadCoordinator};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clone) and provides
/// access to the upload coordinator, the playlist locator and configuration.
#[derive(Clone)]
pub struct AppState {
    /// Chunk intake and merge pipeline
    pub coordinator: UploadCoordinator,

    /// Configuration (read-only)
    pub config: Arc<Config>,

    /// Playlist discovery over the upload root
    pub locator: Arc<PlaylistLocator>,

    /// Cancelled when the server shuts down; ends long-lived streams
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create a new AppState
    pub fn new(
        coordinator: UploadCoordinator,
        config: Arc<Config>,
        locator: PlaylistLocator,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            coordinator,
            config,
            locator: Arc::new(locator),
            shutdown,
        }
    }
}
