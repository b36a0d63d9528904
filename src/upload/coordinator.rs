//! Upload coordination
//!
//! Turns a stream of independently arriving chunks into exactly one
//! merge-extract-cleanup run per completed upload.
//!
//! Completion is decided by scanning the chunk directory after every write,
//! never by counting requests in memory. In-memory state only tracks which
//! phase each upload is in, so that two requests racing on the last chunks
//! cannot both start a merge. The map of sessions is locked only long enough
//! to look up a slot; each upload then has its own lock. No lock is held
//! across chunk writes or the merge. Removing a chunk directory outside the
//! pipeline (a late duplicate's leftovers, or a failed upload starting over)
//! happens under the upload's lock so it cannot race other chunks of it.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use super::chunk_store::ChunkStore;
use super::reassembler::Reassembler;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extraction::extract_archive;
use crate::types::{ChunkAcceptResult, ChunkUpload, Event, Stage, UploadKey};

/// Buffer size of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Chunks are still arriving
    Receiving,
    /// One request owns the merge; everyone else must not touch the archive
    Merging,
    /// Merge or extraction failed; chunks are kept and the next complete
    /// chunk set retries
    Failed,
    /// Pipeline finished; late duplicates are acknowledged without writing
    Completed { at: Instant },
}

#[derive(Debug)]
struct SessionState {
    total_chunks: u32,
    phase: Phase,
}

impl SessionState {
    fn receiving(total_chunks: u32) -> Self {
        Self {
            total_chunks,
            phase: Phase::Receiving,
        }
    }
}

type SessionSlot = Arc<Mutex<SessionState>>;

/// Accepts chunks and drives completed uploads through merge and extraction
/// (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct UploadCoordinator {
    store: ChunkStore,
    config: Arc<Config>,
    sessions: Arc<Mutex<HashMap<UploadKey, SessionSlot>>>,
    event_tx: broadcast::Sender<Event>,
}

impl UploadCoordinator {
    /// Create a coordinator for the configured upload directory
    pub fn new(config: Arc<Config>) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store: ChunkStore::new(config.upload_dir().clone()),
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
        }
    }

    /// Chunk storage backing this coordinator
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Subscribe to upload lifecycle events
    ///
    /// Every subscriber receives every event emitted after it subscribed.
    /// Slow subscribers lag and lose the oldest events rather than blocking
    /// uploads.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // No receivers is fine, the event is dropped
        self.event_tx.send(event).ok();
    }

    /// Accept one chunk.
    ///
    /// Stores the chunk, then checks whether every index is now on disk. The
    /// request that observes completion first claims the merge and waits for
    /// the whole pipeline. The pipeline itself runs as a separate task, so it
    /// finishes even if the client disconnects mid-request.
    ///
    /// # Returns
    /// * [`ChunkAcceptResult::Accepted`] - stored, upload still incomplete
    /// * [`ChunkAcceptResult::AcceptedAndMerging`] - another request is merging this upload
    /// * [`ChunkAcceptResult::AcceptedAndComplete`] - the upload is merged and extracted
    ///
    /// # Errors
    /// Invalid index or chunk count, a chunk count that disagrees with the
    /// first chunk of the upload, or any storage failure. After a merge or
    /// extraction failure the chunks stay on disk and resending the final
    /// chunk retries the pipeline. A chunk with a different `totalChunks`
    /// discards the failed chunks and starts the upload over.
    pub async fn accept_chunk(&self, upload: ChunkUpload) -> Result<ChunkAcceptResult> {
        let ChunkUpload {
            key,
            index,
            total_chunks,
            data,
        } = upload;

        self.validate_counts(index, total_chunks)?;

        let slot = self.session_slot(&key, total_chunks).await;
        if let Some(result) = self.check_session(&key, &slot, total_chunks).await? {
            return Ok(result);
        }

        if let Err(e) = self.store.put_chunk(&key, index, total_chunks, &data).await {
            // The pipeline may have removed the directory under a late duplicate
            if let Some(result) = self.late_chunk_outcome(&key, &slot).await {
                debug!(
                    upload_key = %key,
                    chunk_index = index,
                    ?result,
                    "late duplicate chunk, write dropped"
                );
                return Ok(result);
            }
            self.forget_unused_slot(&key, slot).await;
            return Err(e);
        }
        self.emit_event(Event::ChunkReceived {
            key: key.to_string(),
            index,
            total_chunks,
        });

        if !self.store.is_complete(&key, total_chunks).await? {
            // A duplicate that raced a finishing pipeline may have recreated the directory
            if let Some(result) = self.late_chunk_outcome(&key, &slot).await {
                return Ok(result);
            }
            return Ok(ChunkAcceptResult::Accepted);
        }

        if let Some(result) = self.claim_merge(&key, &slot).await {
            debug!(upload_key = %key, ?result, "upload already claimed by another request");
            return Ok(result);
        }

        let coordinator = self.clone();
        let pipeline_key = key.clone();
        let pipeline_slot = Arc::clone(&slot);
        let handle = tokio::spawn(async move {
            coordinator
                .run_pipeline(&pipeline_key, total_chunks, &pipeline_slot)
                .await
        });

        match handle.await {
            Ok(result) => result.map(|()| ChunkAcceptResult::AcceptedAndComplete),
            Err(e) => {
                slot.lock().await.phase = Phase::Failed;
                Err(Error::Other(format!("upload pipeline for {key} aborted: {e}")))
            }
        }
    }

    fn validate_counts(&self, index: u32, total_chunks: u32) -> Result<()> {
        if total_chunks == 0 {
            return Err(Error::Validation("totalChunks must be at least 1".into()));
        }
        if total_chunks > self.config.upload.max_total_chunks {
            return Err(Error::Validation(format!(
                "totalChunks {total_chunks} exceeds the limit of {}",
                self.config.upload.max_total_chunks
            )));
        }
        if index >= total_chunks {
            return Err(Error::ChunkIndexOutOfRange {
                index,
                total: total_chunks,
            });
        }
        Ok(())
    }

    async fn session_slot(&self, key: &UploadKey, total_chunks: u32) -> SessionSlot {
        let mut sessions = self.sessions.lock().await;
        let pruned = prune_expired(&mut sessions, self.config.upload.completed_window);
        if pruned > 0 {
            debug!(pruned, "forgot completed upload sessions");
        }
        Arc::clone(
            sessions
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(SessionState::receiving(total_chunks)))),
        )
    }

    /// Decide whether this chunk needs to be written at all
    async fn check_session(
        &self,
        key: &UploadKey,
        slot: &SessionSlot,
        total_chunks: u32,
    ) -> Result<Option<ChunkAcceptResult>> {
        let mut state = slot.lock().await;

        if let Phase::Completed { at } = state.phase {
            if at.elapsed() < self.config.upload.completed_window
                && state.total_chunks == total_chunks
            {
                debug!(upload_key = %key, "chunk for an upload that just completed, ignoring");
                return Ok(Some(ChunkAcceptResult::AcceptedAndComplete));
            }
            // Same file name, new upload
            *state = SessionState::receiving(total_chunks);
            return Ok(None);
        }

        if state.phase == Phase::Failed && state.total_chunks != total_chunks {
            // A corrected archive with a different chunk count replaces the failed one
            info!(
                upload_key = %key,
                old_total = state.total_chunks,
                new_total = total_chunks,
                "restarting failed upload"
            );
            self.store.remove_session(key).await?;
            *state = SessionState::receiving(total_chunks);
            return Ok(None);
        }

        if state.total_chunks != total_chunks {
            return Err(Error::TotalChunksMismatch {
                key: key.to_string(),
                expected: state.total_chunks,
                actual: total_chunks,
            });
        }

        if state.phase == Phase::Merging {
            return Ok(Some(ChunkAcceptResult::AcceptedAndMerging));
        }

        Ok(None)
    }

    /// Move the session to `Merging`. `None` means this caller owns the merge.
    async fn claim_merge(&self, key: &UploadKey, slot: &SessionSlot) -> Option<ChunkAcceptResult> {
        let mut state = slot.lock().await;
        match state.phase {
            Phase::Receiving | Phase::Failed => {
                state.phase = Phase::Merging;
                None
            }
            Phase::Merging => Some(ChunkAcceptResult::AcceptedAndMerging),
            Phase::Completed { .. } => {
                // A single-chunk duplicate recreated a complete directory
                self.discard_late_chunks(key).await;
                Some(ChunkAcceptResult::AcceptedAndComplete)
            }
        }
    }

    /// Outcome for a chunk whose upload moved on while it was being written.
    ///
    /// `None` while the upload still expects chunks. Once it has completed,
    /// whatever the late write left behind is removed again. A write that
    /// lands while the merge is still running is removed by the pipeline
    /// when it marks the upload complete.
    async fn late_chunk_outcome(
        &self,
        key: &UploadKey,
        slot: &SessionSlot,
    ) -> Option<ChunkAcceptResult> {
        let state = slot.lock().await;
        match state.phase {
            Phase::Receiving | Phase::Failed => None,
            Phase::Merging => Some(ChunkAcceptResult::AcceptedAndMerging),
            Phase::Completed { .. } => {
                self.discard_late_chunks(key).await;
                Some(ChunkAcceptResult::AcceptedAndComplete)
            }
        }
    }

    /// Remove a chunk directory recreated after its upload completed.
    /// Must be called with the upload's lock held.
    async fn discard_late_chunks(&self, key: &UploadKey) {
        if let Err(e) = self.store.remove_session(key).await {
            // The retention sweeper picks up whatever is left
            warn!(upload_key = %key, error = %e, "failed to remove late chunk directory");
        }
    }

    /// Drop a slot whose first write failed, so it does not outlive the request
    async fn forget_unused_slot(&self, key: &UploadKey, slot: SessionSlot) {
        if let Ok(true) = tokio::fs::try_exists(self.store.session_dir(key)).await {
            return;
        }

        let mut sessions = self.sessions.lock().await;
        // Only the map and this request may hold it
        let unused = sessions
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, &slot))
            && Arc::strong_count(&slot) == 2
            && slot
                .try_lock()
                .is_ok_and(|state| state.phase == Phase::Receiving);
        if unused {
            sessions.remove(key);
        }
    }

    async fn run_pipeline(
        &self,
        key: &UploadKey,
        total_chunks: u32,
        slot: &SessionSlot,
    ) -> Result<()> {
        let result = self.merge_and_extract(key, total_chunks).await;

        let mut state = slot.lock().await;
        match result {
            Ok(()) => {
                state.phase = Phase::Completed { at: Instant::now() };
                // Duplicates written after the cleanup but before this point
                self.discard_late_chunks(key).await;
            }
            Err(_) => state.phase = Phase::Failed,
        }

        result
    }

    async fn merge_and_extract(&self, key: &UploadKey, total_chunks: u32) -> Result<()> {
        let root = self.store.root();
        let chunk_dir = self.store.session_dir(key);
        let archive = key.archive_file(root);
        let output_dir = key.output_dir(root);

        info!(upload_key = %key, total_chunks, "all chunks received, merging");
        self.emit_event(Event::Merging {
            key: key.to_string(),
        });

        let archive_bytes = Reassembler::merge_async(&chunk_dir, total_chunks, &archive)
            .await
            .inspect_err(|e| self.report_failure(key, Stage::Merge, e))?;

        self.emit_event(Event::Extracting {
            key: key.to_string(),
            archive_bytes,
        });

        let files = extract_archive(&archive, &output_dir)
            .await
            .inspect_err(|e| self.report_failure(key, Stage::Extract, e))?;

        if let Err(e) = self.store.remove_session(key).await {
            // Output is already in place; the retention sweeper retries the removal
            warn!(upload_key = %key, error = %e, "failed to remove chunk directory");
            self.emit_event(Event::Failed {
                key: key.to_string(),
                stage: Stage::Cleanup,
                error: e.to_string(),
            });
        }

        info!(
            upload_key = %key,
            ?output_dir,
            files = files.len(),
            archive_bytes,
            "upload complete"
        );
        self.emit_event(Event::Completed {
            key: key.to_string(),
            output_dir,
            files: files.len(),
            completed_at: Utc::now(),
        });

        Ok(())
    }

    fn report_failure(&self, key: &UploadKey, stage: Stage, error: &Error) {
        warn!(
            upload_key = %key,
            ?stage,
            error = %error,
            "upload pipeline failed, chunks kept for retry"
        );
        self.emit_event(Event::Failed {
            key: key.to_string(),
            stage,
            error: error.to_string(),
        });
    }

    /// True while a merge for `key` is in flight
    pub(crate) async fn is_merging(&self, key: &UploadKey) -> bool {
        let slot = self.sessions.lock().await.get(key).cloned();
        match slot {
            Some(slot) => slot.lock().await.phase == Phase::Merging,
            None => false,
        }
    }

    /// Drop the in-memory session for `key` and delete its chunk directory.
    ///
    /// Returns `false` without touching anything while a merge is in flight.
    pub(crate) async fn expire_session(&self, key: &UploadKey) -> Result<bool> {
        let mut sessions = self.sessions.lock().await;
        if let Some(slot) = sessions.get(key)
            && slot.lock().await.phase == Phase::Merging
        {
            return Ok(false);
        }
        sessions.remove(key);
        drop(sessions);

        self.store.remove_session(key).await?;
        Ok(true)
    }

    /// Forget sessions whose duplicate window has passed
    pub(crate) async fn prune_completed(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        prune_expired(&mut sessions, self.config.upload.completed_window)
    }

    /// Number of uploads tracked in memory
    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// Drop `Completed` slots older than `window`.
///
/// Slots that are locked or still referenced by a request are left for a
/// later pass.
fn prune_expired(sessions: &mut HashMap<UploadKey, SessionSlot>, window: Duration) -> usize {
    let before = sessions.len();
    sessions.retain(|_, slot| {
        if Arc::strong_count(slot) > 1 {
            return true;
        }
        match slot.try_lock() {
            Ok(state) => {
                !matches!(state.phase, Phase::Completed { at } if at.elapsed() >= window)
            }
            Err(_) => true,
        }
    });
    before - sessions.len()
}
