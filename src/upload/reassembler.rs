//! Reassembler
//!
//! Concatenates the chunks of a completed upload, strictly in index order,
//! into the destination archive.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{debug, info};

use super::chunk_store::chunk_file_name;
use crate::error::{Result, StorageError};

/// Merges chunk slots into one file
pub struct Reassembler;

impl Reassembler {
    /// Merge `chunk_dir/chunk_0 .. chunk_{total_chunks-1}` into `dest_path`.
    ///
    /// Every slot is checked before the destination is touched. The
    /// destination is truncated, never appended to, so a retry after a failed
    /// attempt starts from scratch. A partially written destination is left in
    /// place on error.
    ///
    /// Returns the number of bytes written.
    pub fn merge(chunk_dir: &Path, total_chunks: u32, dest_path: &Path) -> Result<u64> {
        let slots: Vec<PathBuf> = (0..total_chunks)
            .map(|i| chunk_dir.join(chunk_file_name(i)))
            .collect();

        if let Some(index) = slots.iter().position(|slot| !slot.is_file()) {
            return Err(StorageError::MissingChunk {
                dir: chunk_dir.to_path_buf(),
                index: index as u32,
            }
            .into());
        }

        let merge_error = |reason: String| StorageError::MergeFailed {
            archive: dest_path.to_path_buf(),
            reason,
        };

        let dest = File::create(dest_path)
            .map_err(|e| merge_error(format!("failed to create archive: {e}")))?;
        let mut writer = BufWriter::new(dest);
        let mut written: u64 = 0;

        for (index, slot) in slots.iter().enumerate() {
            let mut chunk = match File::open(slot) {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StorageError::MissingChunk {
                        dir: chunk_dir.to_path_buf(),
                        index: index as u32,
                    }
                    .into());
                }
                Err(e) => {
                    return Err(merge_error(format!("failed to open chunk {index}: {e}")).into());
                }
            };

            let copied = std::io::copy(&mut chunk, &mut writer)
                .map_err(|e| merge_error(format!("failed to append chunk {index}: {e}")))?;
            debug!(chunk_index = index, bytes = copied, "appended chunk");
            written += copied;
        }

        writer
            .flush()
            .map_err(|e| merge_error(format!("failed to flush archive: {e}")))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| merge_error(format!("failed to sync archive: {e}")))?;

        info!(?dest_path, total_chunks, bytes = written, "merged chunks");
        Ok(written)
    }

    /// [`merge`](Self::merge) on the blocking pool
    pub async fn merge_async(chunk_dir: &Path, total_chunks: u32, dest_path: &Path) -> Result<u64> {
        let chunk_dir_owned = chunk_dir.to_path_buf();
        let dest_owned = dest_path.to_path_buf();

        spawn_blocking(move || Self::merge(&chunk_dir_owned, total_chunks, &dest_owned))
            .await
            .map_err(|e| StorageError::MergeFailed {
                archive: dest_path.to_path_buf(),
                reason: format!("merge task panicked: {e}"),
            })?
    }
}
