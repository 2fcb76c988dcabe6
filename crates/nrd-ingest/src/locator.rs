//! Freshest-file lookup for the download directory
//!
//! The browser writes into the download directory on its own schedule, so the
//! pipeline never knows the name of the file it asked for. It takes whatever
//! entry was modified last.
//!
//! Ties on modification time keep the entry encountered first, which is
//! whatever order the platform's `read_dir` yields. That order is not stable
//! across filesystems.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// A directory entry as seen at inspection time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArtifact {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub len: u64,
}

impl DownloadedArtifact {
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }

    pub fn has_suffix(&self, suffix: &str) -> bool {
        self.file_name().is_some_and(|name| name.ends_with(suffix))
    }

    /// Whether `self` is a different observation than `baseline`: another
    /// path, or the same path rewritten since.
    pub fn is_newer_than(&self, baseline: Option<&DownloadedArtifact>) -> bool {
        match baseline {
            None => true,
            Some(base) => self.path != base.path || self.modified > base.modified,
        }
    }
}

/// Path of the most recently modified entry in `dir`, or `None` when empty.
pub async fn latest(dir: &Path) -> io::Result<Option<PathBuf>> {
    Ok(latest_artifact(dir).await?.map(|artifact| artifact.path))
}

/// Like [`latest`], keeping the modification time and size.
///
/// Entries that vanish between listing and stat are skipped.
pub async fn latest_artifact(dir: &Path) -> io::Result<Option<DownloadedArtifact>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut freshest: Option<DownloadedArtifact> = None;

    while let Some(entry) = entries.next_entry().await? {
        let Some(artifact) = observe(entry.path()).await? else {
            continue;
        };

        let is_fresher = freshest
            .as_ref()
            .map_or(true, |current| artifact.modified > current.modified);

        if is_fresher {
            freshest = Some(artifact);
        }
    }

    Ok(freshest)
}

/// Stat a listed entry without following links. `None` when it is gone.
async fn observe(path: PathBuf) -> io::Result<Option<DownloadedArtifact>> {
    let metadata = match tokio::fs::symlink_metadata(&path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Entry disappeared before stat, skipping");
            return Ok(None);
        },
        Err(e) => return Err(e),
    };

    Ok(Some(DownloadedArtifact {
        modified: metadata.modified()?,
        len: metadata.len(),
        path,
    }))
}
