//! Acquisition pipeline
//!
//! One run: provision the sink, open a browser session, find today's row,
//! trigger its download, wait for the file, unpack it, and hand the payload
//! to the sink. The browser session is closed on every path once launched.

use chrono::NaiveDate;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use nrd_common::{format_iso, today_utc};

use crate::archive::ArchiveUnpacker;
use crate::browser::{find_row_for_date, BrowserEngine, BrowserError, BrowserSession};
use crate::config::IngestConfig;
use crate::download::{wait_for_download, DownloadWait, DownloadWaitConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::locator::latest_artifact;
use crate::sink::{IngestSink, SinkWriter};

/// Settings a run needs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_url: String,
    pub download_dir: PathBuf,
    pub archive_suffix: String,
    pub navigation_timeout: Duration,
    pub download_wait: DownloadWaitConfig,
}

impl From<&IngestConfig> for PipelineConfig {
    fn from(config: &IngestConfig) -> Self {
        Self {
            source_url: config.source_url.clone(),
            download_dir: config.download_dir.clone(),
            archive_suffix: config.archive_suffix.clone(),
            navigation_timeout: config.navigation_timeout(),
            download_wait: config.download_wait(),
        }
    }
}

/// Identity and date of one run, fixed when the run starts
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    today: NaiveDate,
    today_label: String,
}

impl RunContext {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            today,
            today_label: format_iso(today),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// `today` as it appears in the listing table
    pub fn today_label(&self) -> &str {
        &self.today_label
    }
}

/// How a run that got past setup ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Rows stored by the sink
    Persisted(u64),
    NoLinkForToday,
    NoFileDownloaded,
    /// A download started but was still changing at the deadline
    DownloadTimedOut(PathBuf),
    ExtractionFailed(String),
    SinkError(String),
}

impl RunOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, RunOutcome::Persisted(_))
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Persisted(count) => write!(f, "persisted {} record(s)", count),
            RunOutcome::NoLinkForToday => write!(f, "no download link for today"),
            RunOutcome::NoFileDownloaded => write!(f, "no file downloaded"),
            RunOutcome::DownloadTimedOut(path) => {
                write!(f, "download did not settle: {}", path.display())
            },
            RunOutcome::ExtractionFailed(reason) => write!(f, "extraction failed: {}", reason),
            RunOutcome::SinkError(reason) => write!(f, "sink error: {}", reason),
        }
    }
}

/// Drives one acquisition run end to end
pub struct AcquisitionPipeline {
    config: PipelineConfig,
    browser: Arc<dyn BrowserEngine>,
    sink: Arc<dyn IngestSink>,
    unpacker: ArchiveUnpacker,
}

impl AcquisitionPipeline {
    pub fn new(
        config: PipelineConfig,
        browser: Arc<dyn BrowserEngine>,
        sink: Arc<dyn IngestSink>,
    ) -> Self {
        Self {
            config,
            browser,
            sink,
            unpacker: ArchiveUnpacker::new(),
        }
    }

    pub fn with_unpacker(mut self, unpacker: ArchiveUnpacker) -> Self {
        self.unpacker = unpacker;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run for the current UTC date.
    pub async fn run(&self) -> PipelineResult<RunOutcome> {
        self.execute(None).await
    }

    /// Run as if `date` were today.
    pub async fn run_for(&self, date: NaiveDate) -> PipelineResult<RunOutcome> {
        self.execute(Some(date)).await
    }

    async fn execute(&self, date: Option<NaiveDate>) -> PipelineResult<RunOutcome> {
        let writer = self
            .sink
            .ensure_schema()
            .await
            .map_err(PipelineError::Setup)?;

        let ctx = RunContext::new(date.unwrap_or_else(today_utc));
        let span = info_span!(
            "run",
            run_id = %ctx.run_id(),
            date = %ctx.today_label(),
            sink = %self.sink.kind()
        );

        self.run_in_context(&ctx, writer.as_ref())
            .instrument(span)
            .await
    }

    async fn run_in_context(
        &self,
        ctx: &RunContext,
        writer: &dyn SinkWriter,
    ) -> PipelineResult<RunOutcome> {
        let dir = &self.config.download_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| PipelineError::DownloadDir {
                path: dir.clone(),
                source,
            })?;

        let mut session = self
            .browser
            .launch(dir)
            .await
            .map_err(PipelineError::Launch)?;

        let result = self.drive(session.as_mut(), ctx, writer).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close browser session");
        }

        match &result {
            Ok(outcome) => info!(outcome = %outcome, "Run finished"),
            Err(e) => error!(error = %e, "Run aborted"),
        }
        result
    }

    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        ctx: &RunContext,
        writer: &dyn SinkWriter,
    ) -> PipelineResult<RunOutcome> {
        let dir = self.config.download_dir.as_path();
        let timeout = self.config.navigation_timeout;

        match tokio::time::timeout(timeout, session.navigate(&self.config.source_url)).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => return Err(PipelineError::Navigation(e)),
            Err(_) => return Err(PipelineError::Navigation(BrowserError::Timeout(timeout))),
        }

        let rows = session
            .listing_rows()
            .await
            .map_err(PipelineError::Navigation)?;

        let Some((row, control)) = find_row_for_date(&rows, ctx.today_label()) else {
            info!(rows = rows.len(), "No download link found for today");
            return Ok(RunOutcome::NoLinkForToday);
        };

        let baseline = latest_artifact(dir).await.map_err(|e| dir_error(dir, e))?;

        let target = session
            .activate(control)
            .await
            .map_err(PipelineError::Navigation)?;
        info!(row = row.index, target = %target, "Download triggered for today's row");

        let archive = match wait_for_download(dir, baseline.as_ref(), &self.config.download_wait)
            .await
            .map_err(|e| dir_error(dir, e))?
        {
            DownloadWait::Landed(path) => path,
            DownloadWait::NothingLanded => {
                warn!("No file appeared in the download directory");
                return Ok(RunOutcome::NoFileDownloaded);
            },
            DownloadWait::Unsettled(path) => {
                warn!(path = %path.display(), "Download did not settle before the deadline");
                return Ok(RunOutcome::DownloadTimedOut(path));
            },
        };

        if !has_suffix(&archive, &self.config.archive_suffix) {
            warn!(
                path = %archive.display(),
                expected = %self.config.archive_suffix,
                "Downloaded file is not an archive"
            );
            return Ok(RunOutcome::NoFileDownloaded);
        }

        let unpacker = self.unpacker.clone();
        let shape = self.sink.payload_shape();
        let archive_path = archive.clone();
        let payload =
            match tokio::task::spawn_blocking(move || unpacker.unpack(&archive_path, shape)).await {
                Ok(Ok(payload)) => payload,
                Ok(Err(e)) => {
                    error!(path = %archive.display(), error = %e, "Failed to extract archive");
                    return Ok(RunOutcome::ExtractionFailed(e.to_string()));
                },
                Err(e) => {
                    error!(path = %archive.display(), error = %e, "Extraction task failed");
                    return Ok(RunOutcome::ExtractionFailed(e.to_string()));
                },
            };
        info!(records = payload.record_count(), "Archive extracted");

        match writer.write(&payload, ctx.today()).await {
            Ok(count) => Ok(RunOutcome::Persisted(count)),
            Err(e) => {
                error!(error = %e, "Sink rejected the write");
                Ok(RunOutcome::SinkError(e.to_string()))
            },
        }
    }
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(suffix))
}

fn dir_error(dir: &Path, source: std::io::Error) -> PipelineError {
    PipelineError::DownloadDir {
        path: dir.to_path_buf(),
        source,
    }
}
