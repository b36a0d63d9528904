//! Test configuration helpers for building coordinators over temporary upload roots

use hls_drop::{Config, UploadCoordinator};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Shared secret used by every test configuration
pub const TEST_PASSWORD: &str = "integration-secret";

/// Configuration rooted at `root` with a password set and the periodic sweeper disabled
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.storage.upload_dir = root.to_path_buf();
    config.server.api.upload_password = Some(TEST_PASSWORD.to_string());
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap_or(config.server.api.bind_address);
    config.retention.enabled = false;
    config
}

/// Configuration whose sweeper runs every `interval` and treats everything as stale
pub fn aggressive_retention_config(root: &Path, interval: Duration) -> Config {
    let mut config = test_config(root);
    config.retention.enabled = true;
    config.retention.stale_after = Duration::ZERO;
    config.retention.sweep_interval = interval;
    config
}

/// Create a coordinator over a fresh temporary upload root
///
/// The `TempDir` must be kept alive for the duration of the test.
pub fn create_test_coordinator() -> (UploadCoordinator, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap_or_else(|e| panic!("Failed to create temp dir: {e}"));
    let coordinator = UploadCoordinator::new(Arc::new(test_config(temp_dir.path())));
    (coordinator, temp_dir)
}
