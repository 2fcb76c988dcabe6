//! Browser capability
//!
//! The pipeline only needs a browser that can load the listing page, expose
//! the rows of its results table, and start a download into a directory it
//! was launched with. [`BrowserEngine`] and [`BrowserSession`] describe that;
//! [`HttpBrowser`] implements it for pages whose table is present in the
//! served HTML.
//!
//! Row selection is a fixed policy: the first row whose date cell, trimmed,
//! is string-equal to the run date rendered as `YYYY-MM-DD`. A page that
//! renders dates any other way never matches.

pub mod http;

pub use http::{HttpBrowser, HttpSession};

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Index of the `td` holding the listing date
pub const DATE_CELL_INDEX: usize = 2;

/// Rows of the results table
pub const ROW_SELECTOR: &str = "table tbody tr";

/// The success-styled download button inside a row
pub const CONTROL_SELECTOR: &str = "a.btn-success";

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Failed to start browser session: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timed out after {0:?} waiting for the page")]
    Timeout(Duration),

    #[error("No results table on {url}")]
    TableMissing { url: String },

    #[error("No page loaded in this session")]
    NoPage,

    #[error("Download control has no target")]
    MissingTarget,

    #[error("Invalid download target '{href}': {reason}")]
    InvalidTarget { href: String, reason: String },

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A download button found in a listing row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadControl {
    pub href: Option<String>,
    pub label: String,
}

/// One row of the source table, valid only while the page is loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceListingRow {
    /// Position in the table, top to bottom
    pub index: usize,
    /// Trimmed text of the date cell, `None` when the row is too short
    pub date_text: Option<String>,
    pub control: Option<DownloadControl>,
}

/// How a row's date cell is compared with the run date
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowMatchPolicy {
    /// Trimmed cell text equals the `YYYY-MM-DD` label
    #[default]
    ExactDate,
}

impl RowMatchPolicy {
    pub fn matches(self, row: &SourceListingRow, today_label: &str) -> bool {
        match self {
            RowMatchPolicy::ExactDate => row.date_text.as_deref() == Some(today_label),
        }
    }
}

impl DownloadControl {
    /// A control only counts when it points somewhere.
    pub fn has_target(&self) -> bool {
        self.href.as_deref().is_some_and(|href| !href.trim().is_empty())
    }
}

/// First row dated `today_label` whose download control has a target.
pub fn find_row_for_date<'a>(
    rows: &'a [SourceListingRow],
    today_label: &str,
) -> Option<(&'a SourceListingRow, &'a DownloadControl)> {
    let policy = RowMatchPolicy::default();
    rows.iter()
        .filter(|row| policy.matches(row, today_label))
        .find_map(|row| {
            row.control
                .as_ref()
                .filter(|control| control.has_target())
                .map(|control| (row, control))
        })
}

/// Starts browser sessions
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Open a fresh session whose downloads land in `download_dir`.
    async fn launch(&self, download_dir: &Path) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// A single browser session, owned by one run
#[async_trait]
pub trait BrowserSession: Send {
    /// Load `url` and return once the results table is present.
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Rows of the results table on the current page, top to bottom.
    async fn listing_rows(&mut self) -> Result<Vec<SourceListingRow>, BrowserError>;

    /// Activate a download control. Returns the resolved target for logging;
    /// the file itself arrives in the download directory asynchronously.
    async fn activate(&mut self, control: &DownloadControl) -> Result<String, BrowserError>;

    /// Release the session. Downloads still in flight are abandoned.
    async fn close(&mut self) -> Result<(), BrowserError>;
}
