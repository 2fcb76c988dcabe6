//! Shared fixtures for nrd-ingest integration tests
//!
//! - `zip_bytes` builds an in-memory archive
//! - `FakeBrowser` serves canned rows and drops a file into the download
//!   directory when a control is activated
//! - `RecordingSink` counts provisioning calls and keeps every write

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use nrd_ingest::archive::{ExtractedPayload, PayloadShape};
use nrd_ingest::browser::{
    BrowserEngine, BrowserError, BrowserSession, DownloadControl, SourceListingRow,
};
use nrd_ingest::download::DownloadWaitConfig;
use nrd_ingest::pipeline::PipelineConfig;
use nrd_ingest::sink::{IngestSink, SinkError, SinkKind, SinkResult, SinkWriter};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zip::write::SimpleFileOptions;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn zip_bytes(members: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in members {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn listing_row(index: usize, date: &str, href: Option<&str>) -> SourceListingRow {
    SourceListingRow {
        index,
        date_text: Some(date.to_string()),
        control: href.map(|h| DownloadControl {
            href: Some(h.to_string()),
            label: "Download".to_string(),
        }),
    }
}

/// Pipeline settings with short waits, downloading into `dir`
pub fn quick_config(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        source_url: "https://nrd.test/listing".to_string(),
        download_dir: dir.to_path_buf(),
        archive_suffix: ".zip".to_string(),
        navigation_timeout: Duration::from_secs(5),
        download_wait: DownloadWaitConfig {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(300),
            stable_polls: 2,
        },
    }
}

#[derive(Debug, Default)]
pub struct BrowserCounters {
    pub launches: AtomicUsize,
    pub activations: AtomicUsize,
    pub closes: AtomicUsize,
}

impl BrowserCounters {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Scripted browser
#[derive(Clone, Default)]
pub struct FakeBrowser {
    pub rows: Vec<SourceListingRow>,
    /// File written into the download directory on activation
    pub download: Option<(String, Vec<u8>)>,
    pub fail_navigation: bool,
    pub navigation_delay: Option<Duration>,
    pub counters: Arc<BrowserCounters>,
}

impl FakeBrowser {
    pub fn with_rows(rows: Vec<SourceListingRow>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn downloading(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.download = Some((name.to_string(), bytes));
        self
    }
}

#[async_trait]
impl BrowserEngine for FakeBrowser {
    async fn launch(&self, download_dir: &Path) -> Result<Box<dyn BrowserSession>, BrowserError> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            browser: self.clone(),
            dir: download_dir.to_path_buf(),
        }))
    }
}

struct FakeSession {
    browser: FakeBrowser,
    dir: PathBuf,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        if let Some(delay) = self.browser.navigation_delay {
            tokio::time::sleep(delay).await;
        }
        if self.browser.fail_navigation {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn listing_rows(&mut self) -> Result<Vec<SourceListingRow>, BrowserError> {
        Ok(self.browser.rows.clone())
    }

    async fn activate(&mut self, control: &DownloadControl) -> Result<String, BrowserError> {
        self.browser.counters.activations.fetch_add(1, Ordering::SeqCst);
        if let Some((name, bytes)) = &self.browser.download {
            tokio::fs::write(self.dir.join(name), bytes).await?;
        }
        Ok(control.href.clone().unwrap_or_default())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.browser.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sink that keeps what it is given
#[derive(Clone)]
pub struct RecordingSink {
    pub shape: PayloadShape,
    pub fail_setup: bool,
    pub fail_write: bool,
    pub ensure_calls: Arc<AtomicUsize>,
    pub writes: Arc<Mutex<Vec<(ExtractedPayload, NaiveDate)>>>,
}

impl RecordingSink {
    pub fn new(shape: PayloadShape) -> Self {
        Self {
            shape,
            fail_setup: false,
            fail_write: false,
            ensure_calls: Arc::new(AtomicUsize::new(0)),
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn lines() -> Self {
        Self::new(PayloadShape::Lines)
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<(ExtractedPayload, NaiveDate)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl IngestSink for RecordingSink {
    fn kind(&self) -> SinkKind {
        match self.shape {
            PayloadShape::Lines => SinkKind::ClickHouse,
            PayloadShape::Text => SinkKind::MySql,
        }
    }

    fn payload_shape(&self) -> PayloadShape {
        self.shape
    }

    async fn ensure_schema(&self) -> SinkResult<Box<dyn SinkWriter>> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_setup {
            return Err(SinkError::Config("database unreachable".to_string()));
        }
        Ok(Box::new(RecordingWriter {
            fail: self.fail_write,
            writes: Arc::clone(&self.writes),
        }))
    }
}

struct RecordingWriter {
    fail: bool,
    writes: Arc<Mutex<Vec<(ExtractedPayload, NaiveDate)>>>,
}

#[async_trait]
impl SinkWriter for RecordingWriter {
    async fn write(&self, payload: &ExtractedPayload, date: NaiveDate) -> SinkResult<u64> {
        if self.fail {
            return Err(SinkError::Rejected {
                status: 500,
                body: "table is read-only".to_string(),
            });
        }
        self.writes.lock().unwrap().push((payload.clone(), date));
        Ok(payload.record_count() as u64)
    }
}
