//! Custom test assertions for upload integration tests

use hls_drop::{Event, Stage, UploadCoordinator};
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast;

use super::fixtures::{TEST_KEY, TEST_PLAYLIST};

/// Result of waiting for an upload to finish
#[derive(Debug)]
pub enum WaitResult {
    /// Upload extracted and cleaned up
    Completed {
        /// Number of extracted files
        files: usize,
    },
    /// Pipeline failed at the given stage
    Failed(Stage, String),
    /// Timeout waiting for a terminal event
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for an upload to reach a terminal event (Completed or Failed)
///
/// Subscribe before the final chunk is sent, otherwise the terminal event
/// may already be gone.
pub async fn wait_for_completion(
    events: &mut broadcast::Receiver<Event>,
    key: &str,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Completed {
                    key: event_key,
                    files,
                    ..
                }) if event_key == key => return WaitResult::Completed { files },
                Ok(Event::Failed {
                    key: event_key,
                    stage,
                    error,
                }) if event_key == key => return WaitResult::Failed(stage, error),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Drain every event currently buffered for a receiver
pub fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

/// Count events of one upload matching a predicate
pub fn count_events(events: &[Event], predicate: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|event| predicate(event)).count()
}

/// Assert that `output_dir` holds the files of a generated HLS archive
pub fn assert_hls_output(output_dir: &Path) {
    let playlist = std::fs::read_to_string(output_dir.join("output.m3u8"))
        .unwrap_or_else(|e| panic!("playlist missing in {}: {e}", output_dir.display()));
    assert_eq!(playlist, TEST_PLAYLIST);

    let key = std::fs::read(output_dir.join("encryption.key"))
        .unwrap_or_else(|e| panic!("key missing in {}: {e}", output_dir.display()));
    assert_eq!(key, TEST_KEY);

    assert!(
        output_dir.join("segment_000.ts").is_file(),
        "segment missing in {}",
        output_dir.display()
    );
}

/// Assert that no intermediate state remains for an upload
pub fn assert_cleaned_up(root: &Path, file_name: &str) {
    let chunk_dir = root.join(format!("{file_name}_chunks"));
    assert!(!chunk_dir.exists(), "{} still exists", chunk_dir.display());
    let archive = root.join(file_name);
    assert!(!archive.exists(), "{} still exists", archive.display());
}

/// Wait until `path` no longer exists, polling every 20ms
pub async fn wait_until_removed(path: &Path, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    !path.exists()
}

/// Number of upload sessions the coordinator is still tracking
pub async fn tracked_sessions(coordinator: &UploadCoordinator) -> usize {
    coordinator.active_sessions().await
}
