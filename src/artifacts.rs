//! Artifact discovery and classification
//!
//! Finds the playlists produced by extraction and builds links clients can
//! fetch them from, and maps artifact file names to the content type they are
//! served with.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use url::Url;
use utoipa::ToSchema;
use walkdir::WalkDir;

use crate::error::{Error, Result, StorageError};

/// Extension of HLS playlist files
pub const PLAYLIST_EXTENSION: &str = "m3u8";

/// Route prefix extracted artifacts are served under
pub const ARTIFACT_ROUTE_PREFIX: &str = "uploads";

/// Kind of an extracted artifact, by extension
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// HLS playlist (`.m3u8`)
    Playlist,
    /// Segment encryption key (`.key`)
    Key,
    /// MPEG transport stream segment (`.ts`)
    Segment,
    /// Anything else
    Other,
}

impl ArtifactKind {
    /// Classify a file name by its extension (case-insensitive)
    pub fn from_file_name(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match ext.as_deref() {
            Some(PLAYLIST_EXTENSION) => ArtifactKind::Playlist,
            Some("key") => ArtifactKind::Key,
            Some("ts") => ArtifactKind::Segment,
            _ => ArtifactKind::Other,
        }
    }

    /// `Content-Type` header value the artifact is served with
    pub fn content_type(self) -> &'static str {
        match self {
            ArtifactKind::Playlist => "application/vnd.apple.mpegurl",
            ArtifactKind::Key => "application/octet-stream",
            ArtifactKind::Segment => "video/mp2t",
            ArtifactKind::Other => "application/octet-stream",
        }
    }
}

/// Finds playlist files under the upload root and links them under `base_url`
#[derive(Clone, Debug)]
pub struct PlaylistLocator {
    root: PathBuf,
    base_url: Url,
}

impl PlaylistLocator {
    /// Create a locator for `root`, linking through `base_url`
    ///
    /// # Errors
    /// `base_url` is not an absolute URL that can carry a path.
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL {base_url:?}: {e}"),
            key: Some("public_base_url".into()),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config {
                message: format!("base URL {base_url} cannot carry a path"),
                key: Some("public_base_url".into()),
            });
        }

        Ok(Self {
            root: root.into(),
            base_url,
        })
    }

    /// Root directory being searched
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a walk over the root.
    ///
    /// The returned iterator is lazy: the tree is read as it is consumed.
    /// Calling this again starts a fresh walk. Entries that vanish or cannot
    /// be read mid-walk are skipped.
    ///
    /// # Errors
    /// The root itself is missing or not a directory.
    pub fn playlists(&self) -> Result<PlaylistLinks<'_>> {
        match std::fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(StorageError::ScanFailed {
                    path: self.root.clone(),
                    reason: "not a directory".into(),
                }
                .into());
            }
            Err(e) => {
                return Err(StorageError::ScanFailed {
                    path: self.root.clone(),
                    reason: e.to_string(),
                }
                .into());
            }
        }

        Ok(PlaylistLinks {
            locator: self,
            walker: WalkDir::new(&self.root).min_depth(1).into_iter(),
        })
    }

    /// Public link for a file at `relative` under the root
    pub fn link_for(&self, relative: &Path) -> Option<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().ok()?;
            segments.pop_if_empty().push(ARTIFACT_ROUTE_PREFIX);
            for component in relative.components() {
                match component {
                    Component::Normal(part) => {
                        segments.push(&part.to_string_lossy());
                    }
                    Component::CurDir => {}
                    _ => return None,
                }
            }
        }
        Some(url)
    }
}

/// Lazy sequence of playlist links produced by [`PlaylistLocator::playlists`]
pub struct PlaylistLinks<'a> {
    locator: &'a PlaylistLocator,
    walker: walkdir::IntoIter,
}

impl Iterator for PlaylistLinks<'_> {
    type Item = Url;

    fn next(&mut self) -> Option<Url> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry during playlist scan");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let is_playlist = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(PLAYLIST_EXTENSION));
            if !is_playlist {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&self.locator.root) else {
                continue;
            };
            if let Some(url) = self.locator.link_for(relative) {
                return Some(url);
            }
        }
    }
}
