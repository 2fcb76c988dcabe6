//! Columnar sink over the ClickHouse HTTP interface
//!
//! Statements go in the request body; the insert goes in the `query`
//! parameter with the rows as `JSONEachRow` in the body, so a whole run is a
//! single batch.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Serialize;
use std::borrow::Cow;
use std::time::Duration;
use tracing::{debug, info};

use nrd_common::format_iso;

use super::{require_identifier, IngestSink, SinkError, SinkKind, SinkResult, SinkWriter, TABLE_NAME};
use crate::archive::{split_lines, ExtractedPayload, PayloadShape};
use crate::config::ClickHouseConfig;

/// Database used for `CREATE DATABASE`, which must run outside the target
const BOOTSTRAP_DATABASE: &str = "default";

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS downloads (
    extracted_date Date,
    file_data String
) ENGINE = MergeTree()
ORDER BY extracted_date";

const INSERT_QUERY: &str = "INSERT INTO downloads (extracted_date, file_data) FORMAT JSONEachRow";

#[derive(Debug, Serialize)]
struct DownloadRow<'a> {
    extracted_date: &'a str,
    file_data: &'a str,
}

/// Thin client for the ClickHouse HTTP endpoint
#[derive(Debug, Clone)]
struct ClickHouseHttp {
    client: Client,
    url: String,
    user: String,
    password: String,
}

impl ClickHouseHttp {
    async fn post(&self, database: &str, query: Option<&str>, body: String) -> SinkResult<()> {
        let mut request = self.client.post(&self.url).query(&[("database", database)]);
        if let Some(query) = query {
            request = request.query(&[("query", query)]);
        }

        let response = request
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Unprovisioned ClickHouse sink
pub struct ClickHouseSink {
    http: ClickHouseHttp,
    database: String,
}

impl ClickHouseSink {
    pub fn new(config: ClickHouseConfig) -> SinkResult<Self> {
        require_identifier(&config.database)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http: ClickHouseHttp {
                client,
                url: config.url,
                user: config.user,
                password: config.password,
            },
            database: config.database,
        })
    }
}

#[async_trait]
impl IngestSink for ClickHouseSink {
    fn kind(&self) -> SinkKind {
        SinkKind::ClickHouse
    }

    fn payload_shape(&self) -> PayloadShape {
        PayloadShape::Lines
    }

    async fn ensure_schema(&self) -> SinkResult<Box<dyn SinkWriter>> {
        let database = require_identifier(&self.database)?;

        self.http
            .post(
                BOOTSTRAP_DATABASE,
                None,
                format!("CREATE DATABASE IF NOT EXISTS {}", database),
            )
            .await?;
        self.http
            .post(database, None, CREATE_TABLE_SQL.to_string())
            .await?;

        info!(database = %database, table = TABLE_NAME, "ClickHouse database and table are ready");
        Ok(Box::new(ClickHouseWriter {
            http: self.http.clone(),
            database: database.to_string(),
        }))
    }
}

/// ClickHouse sink with its table confirmed
pub struct ClickHouseWriter {
    http: ClickHouseHttp,
    database: String,
}

#[async_trait]
impl SinkWriter for ClickHouseWriter {
    async fn write(&self, payload: &ExtractedPayload, date: NaiveDate) -> SinkResult<u64> {
        let lines: Cow<'_, [String]> = match payload {
            ExtractedPayload::Lines(lines) => Cow::Borrowed(lines.as_slice()),
            ExtractedPayload::Text(text) => Cow::Owned(split_lines(text)),
        };

        if lines.is_empty() {
            info!("No lines to insert into ClickHouse");
            return Ok(0);
        }

        let body = json_each_row(&lines, date)?;
        debug!(rows = lines.len(), bytes = body.len(), "Sending ClickHouse insert batch");
        self.http
            .post(&self.database, Some(INSERT_QUERY), body)
            .await?;

        info!(rows = lines.len(), date = %date, "Saved rows to ClickHouse");
        Ok(lines.len() as u64)
    }
}

/// One JSON object per line, each tagged with `date`.
fn json_each_row(lines: &[String], date: NaiveDate) -> SinkResult<String> {
    let date = format_iso(date);
    let mut body = String::new();
    for line in lines {
        let row = DownloadRow {
            extracted_date: &date,
            file_data: line,
        };
        body.push_str(&serde_json::to_string(&row)?);
        body.push('\n');
    }
    Ok(body)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_json_each_row_tags_every_line() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let lines = vec!["alpha.com".to_string(), "quote\"d.net".to_string()];

        let body = json_each_row(&lines, date).unwrap();
        let rows: Vec<serde_json::Value> = body
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["extracted_date"], "2025-06-02");
        assert_eq!(rows[0]["file_data"], "alpha.com");
        assert_eq!(rows[1]["file_data"], "quote\"d.net");
    }

    #[test]
    fn test_new_rejects_unsafe_database_name() {
        let config = ClickHouseConfig {
            database: "prod; DROP".to_string(),
            ..ClickHouseConfig::default()
        };
        assert!(matches!(ClickHouseSink::new(config), Err(SinkError::Config(_))));
    }
}
