//! Run-aborting errors
//!
//! Only failures that stop a run before it can reach an outcome live here.
//! Expected endings (no row for today, no download, bad archive, rejected
//! write) are [`RunOutcome`](crate::pipeline::RunOutcome) variants instead.

use std::path::PathBuf;

pub use crate::archive::ArchiveError;
pub use crate::browser::BrowserError;
pub use crate::sink::SinkError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Sink setup failed: {0}")]
    Setup(#[source] SinkError),

    #[error("Browser failed to start: {0}")]
    Launch(#[source] BrowserError),

    #[error("Navigation failed: {0}")]
    Navigation(#[source] BrowserError),

    #[error("Download directory {} unusable: {source}", path.display())]
    DownloadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;
