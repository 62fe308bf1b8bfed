//! Registration of produced files with the platform media index.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// What kind of file is being registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// A still image.
    Picture,
    /// A recording.
    Video {
        /// Recorded length.
        duration: Duration,
    },
}

/// One row for the media index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEntry {
    /// Title, the file name.
    pub title: String,
    /// Display name, the file name.
    pub display_name: String,
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Guessed from the extension.
    pub mime_type: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub date_taken_ms: i64,
    /// Picture or video.
    pub kind: MediaKind,
}

impl MediaEntry {
    /// Describe a file that was just written.
    pub fn for_file(path: &Path, kind: MediaKind) -> io::Result<Self> {
        let size = std::fs::metadata(path)?.len();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            title: name.clone(),
            display_name: name,
            path: path.to_path_buf(),
            size,
            mime_type: mime_guess::from_path(path).first_raw().map(str::to_owned),
            date_taken_ms: chrono::Utc::now().timestamp_millis(),
            kind,
        })
    }
}

/// Media index errors.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The file could not be inspected.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The platform service produced files are registered with.
pub trait MediaIndex: Send + Sync {
    /// Add one entry.
    fn insert(&self, entry: &MediaEntry) -> Result<(), MediaError>;
}

/// A media index that only logs. Used where the platform has none.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unindexed;

impl MediaIndex for Unindexed {
    fn insert(&self, entry: &MediaEntry) -> Result<(), MediaError> {
        debug!(path = %entry.path.display(), mime = ?entry.mime_type, "no media index, skipping");
        Ok(())
    }
}
