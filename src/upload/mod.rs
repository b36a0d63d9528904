//! Chunked upload pipeline
//!
//! Chunks of one upload land in `<root>/<fileName>_chunks/chunk_<index>`.
//! When the last missing index arrives, the chunks are merged into
//! `<root>/<fileName>`, extracted into `<root>/<stem>/`, and the intermediate
//! state is removed.

mod chunk_store;
mod coordinator;
mod reassembler;
mod retention;


pub use chunk_store::ChunkStore;
pub use coordinator::UploadCoordinator;
pub use reassembler::Reassembler;
pub use retention::{RetentionSweeper, spawn_retention_sweeper};
