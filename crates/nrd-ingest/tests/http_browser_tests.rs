//! HttpBrowser against a mock source site

mod common;

use common::{date, quick_config, zip_bytes, RecordingSink};
use nrd_ingest::archive::ExtractedPayload;
use nrd_ingest::browser::{find_row_for_date, BrowserEngine, BrowserError, BrowserSession, HttpBrowser};
use nrd_ingest::download::{wait_for_download, DownloadWait};
use nrd_ingest::pipeline::{AcquisitionPipeline, RunOutcome};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn listing_page(today: &str) -> String {
    format!(
        r#"<!doctype html>
<html><body>
<table class="table table-striped">
  <thead><tr><th>#</th><th>File</th><th>Date</th><th>Action</th></tr></thead>
  <tbody>
    <tr><td>1</td><td>nrd-{today}</td><td>{today}</td>
        <td><a class="btn btn-success" href="files/{today}.zip">Download</a></td></tr>
    <tr><td>2</td><td>nrd-2025-06-01</td><td>2025-06-01</td>
        <td><a class="btn btn-success" href="files/2025-06-01.zip">Download</a></td></tr>
  </tbody>
</table>
</body></html>"#
    )
}

fn browser() -> HttpBrowser {
    HttpBrowser::new("nrd-ingest-test", Duration::from_secs(5), Duration::from_secs(5)).unwrap()
}

async fn mount_site(server: &MockServer, archive: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path("/nrd/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(listing_page("2025-06-02")),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/nrd/files/2025-06-02.zip"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/zip")
                .insert_header(
                    "content-disposition",
                    r#"attachment; filename="nrd-2025-06-02.zip""#,
                )
                .set_body_bytes(archive),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_navigate_read_rows_and_download() {
    let server = MockServer::start().await;
    let archive = zip_bytes(&[("domains.txt", "alpha.com\nbeta.net\n")]);
    mount_site(&server, archive.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let mut session = browser().launch(dir.path()).await.unwrap();
    session.navigate(&format!("{}/nrd/", server.uri())).await.unwrap();

    let rows = session.listing_rows().await.unwrap();
    assert_eq!(rows.len(), 2);

    let (row, control) = find_row_for_date(&rows, "2025-06-02").unwrap();
    assert_eq!(row.index, 0);

    let target = session.activate(control).await.unwrap();
    assert_eq!(target, format!("{}/nrd/files/2025-06-02.zip", server.uri()));

    let mut wait_config = quick_config(dir.path()).download_wait;
    wait_config.timeout = Duration::from_secs(5);
    let wait = wait_for_download(dir.path(), None, &wait_config).await.unwrap();
    let expected = dir.path().join("nrd-2025-06-02.zip");
    assert_eq!(wait, DownloadWait::Landed(expected.clone()));
    assert_eq!(std::fs::read(expected).unwrap(), archive);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_page_without_table_is_a_navigation_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nrd/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>Down for maintenance</body></html>"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut session = browser().launch(dir.path()).await.unwrap();
    let err = session
        .navigate(&format!("{}/nrd/", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, BrowserError::TableMissing { .. }));
}

#[tokio::test]
async fn test_error_status_is_a_navigation_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut session = browser().launch(dir.path()).await.unwrap();
    let err = session
        .navigate(&format!("{}/nrd/", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, BrowserError::Navigation { .. }));
}

#[tokio::test]
async fn test_rows_before_navigation_fail() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = browser().launch(dir.path()).await.unwrap();

    assert!(matches!(session.listing_rows().await, Err(BrowserError::NoPage)));
}

#[tokio::test]
async fn test_pipeline_over_http_browser() {
    let server = MockServer::start().await;
    mount_site(&server, zip_bytes(&[("domains.txt", "alpha.com\nbeta.net\n")])).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = quick_config(dir.path());
    config.source_url = format!("{}/nrd/", server.uri());
    config.download_wait.timeout = Duration::from_secs(5);

    let sink = RecordingSink::lines();
    let pipeline = AcquisitionPipeline::new(config, Arc::new(browser()), Arc::new(sink.clone()));

    let outcome = pipeline.run_for(date(2025, 6, 2)).await.unwrap();

    assert_eq!(outcome, RunOutcome::Persisted(2));
    assert_eq!(
        sink.writes()[0].0,
        ExtractedPayload::Lines(vec!["alpha.com".to_string(), "beta.net".to_string()])
    );
}

#[tokio::test]
async fn test_todays_button_without_href_ends_cleanly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nrd/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<table><tbody>
<tr><td>1</td><td>nrd-2025-06-02</td><td>2025-06-02</td>
    <td><a class="btn btn-success">Download</a></td></tr>
</tbody></table>"#,
        ))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = quick_config(dir.path());
    config.source_url = format!("{}/nrd/", server.uri());

    let sink = RecordingSink::lines();
    let pipeline = AcquisitionPipeline::new(config, Arc::new(browser()), Arc::new(sink.clone()));

    let outcome = pipeline.run_for(date(2025, 6, 2)).await.unwrap();

    assert_eq!(outcome, RunOutcome::NoLinkForToday);
    assert!(sink.writes().is_empty());
}
