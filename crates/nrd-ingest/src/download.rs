//! Waiting for a browser download to land
//!
//! Downloads complete outside our control. Instead of sleeping a fixed
//! interval, the directory is polled until the freshest entry is new relative
//! to a pre-trigger baseline, is not an in-progress partial, and has kept the
//! same size for a number of consecutive polls.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::locator::{latest_artifact, DownloadedArtifact};

/// Suffixes browsers use while a download is still being written
pub const PARTIAL_SUFFIXES: &[&str] = &[".part", ".crdownload", ".download"];

/// Polling parameters for [`wait_for_download`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadWaitConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Consecutive polls with an unchanged size before a file counts as done
    pub stable_polls: u32,
}

impl Default for DownloadWaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(120),
            stable_polls: 2,
        }
    }
}

impl DownloadWaitConfig {
    /// Upper bound on directory inspections for one wait
    pub fn max_polls(&self) -> u64 {
        let interval = self.poll_interval.as_millis().max(1);
        (self.timeout.as_millis() / interval) as u64 + 1
    }
}

/// How a wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadWait {
    /// A new file appeared and stopped growing
    Landed(PathBuf),
    /// Nothing new appeared before the deadline
    NothingLanded,
    /// Something new appeared but never settled before the deadline
    Unsettled(PathBuf),
}

pub fn is_partial(artifact: &DownloadedArtifact) -> bool {
    PARTIAL_SUFFIXES
        .iter()
        .any(|suffix| artifact.has_suffix(suffix))
}

/// Poll `dir` until a download newer than `baseline` lands or time runs out.
pub async fn wait_for_download(
    dir: &Path,
    baseline: Option<&DownloadedArtifact>,
    config: &DownloadWaitConfig,
) -> io::Result<DownloadWait> {
    let deadline = Instant::now() + config.timeout;
    let mut candidate: Option<DownloadedArtifact> = None;
    let mut unchanged_polls = 0u32;

    for poll in 1..=config.max_polls() {
        let current = latest_artifact(dir)
            .await?
            .filter(|artifact| artifact.is_newer_than(baseline));

        match current {
            Some(artifact) if is_partial(&artifact) => {
                debug!(poll, path = %artifact.path.display(), bytes = artifact.len, "Download in progress");
                candidate = Some(artifact);
                unchanged_polls = 0;
            },
            Some(artifact) => {
                let same_as_before = candidate
                    .as_ref()
                    .is_some_and(|prev| prev.path == artifact.path && prev.len == artifact.len);
                unchanged_polls = if same_as_before { unchanged_polls + 1 } else { 0 };

                if unchanged_polls >= config.stable_polls.max(1) {
                    info!(path = %artifact.path.display(), bytes = artifact.len, "Download landed");
                    return Ok(DownloadWait::Landed(artifact.path));
                }
                candidate = Some(artifact);
            },
            None => {},
        }

        if Instant::now() >= deadline {
            break;
        }
        sleep(config.poll_interval).await;
    }

    Ok(match candidate {
        Some(artifact) => DownloadWait::Unsettled(artifact.path),
        None => DownloadWait::NothingLanded,
    })
}
