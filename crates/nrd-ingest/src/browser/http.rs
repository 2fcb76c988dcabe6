//! Static-HTML browser driver
//!
//! Loads pages with `reqwest`, reads the results table with `scraper`, and
//! performs downloads the way a browser does: stream into `<name>.part`, then
//! rename to the final name once the body is complete.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{Client, Url};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{
    BrowserEngine, BrowserError, BrowserSession, DownloadControl, SourceListingRow,
    CONTROL_SELECTOR, DATE_CELL_INDEX, ROW_SELECTOR,
};

/// Name used when neither the response nor the URL suggests one
const FALLBACK_FILE_NAME: &str = "download.bin";

/// Suffix of a download still being written
const PARTIAL_SUFFIX: &str = ".part";

/// Browser engine backed by a shared HTTP client
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    client: Client,
    page_timeout: Duration,
    download_timeout: Duration,
}

impl HttpBrowser {
    pub fn new(
        user_agent: &str,
        page_timeout: Duration,
        download_timeout: Duration,
    ) -> Result<Self, BrowserError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(page_timeout)
            .build()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        Ok(Self {
            client,
            page_timeout,
            download_timeout,
        })
    }
}

#[async_trait]
impl BrowserEngine for HttpBrowser {
    async fn launch(&self, download_dir: &Path) -> Result<Box<dyn BrowserSession>, BrowserError> {
        debug!(download_dir = %download_dir.display(), "Opening HTTP browser session");
        Ok(Box::new(HttpSession {
            browser: self.clone(),
            download_dir: download_dir.to_path_buf(),
            page: None,
            downloads: JoinSet::new(),
            partials: PartialFiles::default(),
        }))
    }
}

struct LoadedPage {
    url: Url,
    html: String,
}

/// One session: the current page plus downloads it started
pub struct HttpSession {
    browser: HttpBrowser,
    download_dir: PathBuf,
    page: Option<LoadedPage>,
    downloads: JoinSet<()>,
    partials: PartialFiles,
}

/// `.part` files of downloads that have not finished
#[derive(Debug, Clone, Default)]
struct PartialFiles(Arc<Mutex<HashSet<PathBuf>>>);

impl PartialFiles {
    async fn track(&self, path: &Path) {
        self.0.lock().await.insert(path.to_path_buf());
    }

    async fn release(&self, path: &Path) {
        self.0.lock().await.remove(path);
    }

    /// Delete every file still tracked. Returns how many were removed.
    async fn discard_all(&self) -> usize {
        let pending: Vec<PathBuf> = self.0.lock().await.drain().collect();
        let mut removed = 0;
        for path in pending {
            if remove_partial(&path).await {
                removed += 1;
            }
        }
        removed
    }
}

async fn remove_partial(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove partial download");
            false
        },
    }
}

#[async_trait]
impl BrowserSession for HttpSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        let navigation_error = |reason: String| BrowserError::Navigation {
            url: url.to_string(),
            reason,
        };

        let response = self
            .browser
            .client
            .get(url)
            .timeout(self.browser.page_timeout)
            .send()
            .await
            .map_err(|e| navigation_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(navigation_error(format!("HTTP {}", status)));
        }

        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| navigation_error(e.to_string()))?;

        if !has_results_table(&html)? {
            return Err(BrowserError::TableMissing {
                url: final_url.to_string(),
            });
        }

        info!(url = %final_url, bytes = html.len(), "Source page loaded");
        self.page = Some(LoadedPage {
            url: final_url,
            html,
        });
        Ok(())
    }

    async fn listing_rows(&mut self) -> Result<Vec<SourceListingRow>, BrowserError> {
        let page = self.page.as_ref().ok_or(BrowserError::NoPage)?;
        parse_listing_rows(&page.html)
    }

    async fn activate(&mut self, control: &DownloadControl) -> Result<String, BrowserError> {
        let page = self.page.as_ref().ok_or(BrowserError::NoPage)?;
        let href = control.href.as_deref().ok_or(BrowserError::MissingTarget)?;
        let target = page.url.join(href).map_err(|e| BrowserError::InvalidTarget {
            href: href.to_string(),
            reason: e.to_string(),
        })?;

        let client = self.browser.client.clone();
        let timeout = self.browser.download_timeout;
        let dir = self.download_dir.clone();
        let partials = self.partials.clone();
        let url = target.clone();

        self.downloads.spawn(async move {
            match fetch_into(&client, url.clone(), timeout, &dir, &partials).await {
                Ok(path) => debug!(url = %url, path = %path.display(), "Download finished"),
                Err(e) => warn!(url = %url, error = %e, "Download failed"),
            }
        });

        Ok(target.to_string())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if !self.downloads.is_empty() {
            debug!(pending = self.downloads.len(), "Abandoning unfinished downloads");
        }
        self.downloads.shutdown().await;
        let removed = self.partials.discard_all().await;
        if removed > 0 {
            debug!(removed, "Removed partial downloads");
        }
        self.page = None;
        Ok(())
    }
}

fn selector(css: &str) -> Result<Selector, BrowserError> {
    Selector::parse(css).map_err(|e| BrowserError::Selector(format!("{}: {:?}", css, e)))
}

fn has_results_table(html: &str) -> Result<bool, BrowserError> {
    let table = selector("table")?;
    Ok(Html::parse_document(html).select(&table).next().is_some())
}

/// Read the results table out of a page.
pub fn parse_listing_rows(html: &str) -> Result<Vec<SourceListingRow>, BrowserError> {
    let document = Html::parse_document(html);
    let rows = selector(ROW_SELECTOR)?;
    let cells = selector("td")?;
    let controls = selector(CONTROL_SELECTOR)?;

    Ok(document
        .select(&rows)
        .enumerate()
        .map(|(index, row)| {
            let date_text = row
                .select(&cells)
                .nth(DATE_CELL_INDEX)
                .map(|cell| cell.text().collect::<String>().trim().to_string());

            let control = row.select(&controls).next().map(|anchor| DownloadControl {
                href: anchor.value().attr("href").map(str::to_string),
                label: anchor.text().collect::<String>().trim().to_string(),
            });

            SourceListingRow {
                index,
                date_text,
                control,
            }
        })
        .collect())
}

async fn fetch_into(
    client: &Client,
    url: Url,
    timeout: Duration,
    dir: &Path,
    partials: &PartialFiles,
) -> Result<PathBuf, BrowserError> {
    let response = client
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?;

    let name = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(attachment_file_name)
        .or_else(|| url_file_name(&url))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());

    let final_path = dir.join(&name);
    let partial_path = dir.join(format!("{}{}", name, PARTIAL_SUFFIX));

    partials.track(&partial_path).await;
    let written = stream_to_file(response, &partial_path).await;
    let result = match written {
        Ok(()) => tokio::fs::rename(&partial_path, &final_path)
            .await
            .map(|()| final_path)
            .map_err(BrowserError::from),
        Err(e) => Err(e),
    };

    if result.is_err() {
        remove_partial(&partial_path).await;
    }
    partials.release(&partial_path).await;
    result
}

async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<(), BrowserError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

/// `filename` parameter of a `Content-Disposition` header.
pub fn attachment_file_name(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("filename="))
        .map(|value| value.trim().trim_matches('"'))
        .and_then(safe_file_name)
}

fn url_file_name(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(safe_file_name)
}

/// Last path component, refusing names that would escape the directory.
fn safe_file_name(candidate: &str) -> Option<String> {
    let name = Path::new(candidate).file_name()?.to_str()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}
