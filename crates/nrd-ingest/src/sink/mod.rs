//! Storage sinks
//!
//! A sink is provisioned before it can be written to. [`IngestSink`] is the
//! unprovisioned side: it knows which payload shape it wants and how to create
//! its database and table. [`IngestSink::ensure_schema`] hands back a
//! [`SinkWriter`], so a write can only happen against a confirmed schema.
//!
//! Provisioning is idempotent; every run calls it again.

pub mod clickhouse;
pub mod mysql;

pub use clickhouse::ClickHouseSink;
pub use mysql::MySqlSink;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::archive::{ExtractedPayload, PayloadShape};
use crate::config::SinkConfig;

/// Table both sinks write to
pub const TABLE_NAME: &str = "downloads";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ClickHouse rejected the statement (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid sink configuration: {0}")]
    Config(String),
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Which storage backend records go to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// One row per extracted line
    ClickHouse,
    /// One row holding the whole extracted text
    MySql,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::ClickHouse => "clickhouse",
            SinkKind::MySql => "mysql",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SinkKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clickhouse" => Ok(SinkKind::ClickHouse),
            "mysql" => Ok(SinkKind::MySql),
            _ => Err(anyhow::anyhow!(
                "Invalid sink: {}. Valid options: clickhouse, mysql",
                s
            )),
        }
    }
}

/// A sink before its schema is confirmed
#[async_trait]
pub trait IngestSink: Send + Sync {
    fn kind(&self) -> SinkKind;

    /// The payload shape [`SinkWriter::write`] stores without conversion.
    fn payload_shape(&self) -> PayloadShape;

    /// Create the database and table if absent and return a writer bound to them.
    async fn ensure_schema(&self) -> SinkResult<Box<dyn SinkWriter>>;
}

/// A sink whose schema exists
#[async_trait]
pub trait SinkWriter: Send + Sync {
    /// Persist `payload` tagged with `date`. Returns the number of rows stored.
    async fn write(&self, payload: &ExtractedPayload, date: NaiveDate) -> SinkResult<u64>;
}

/// Build the sink selected by `config.kind`.
pub fn build_sink(config: &SinkConfig) -> SinkResult<Arc<dyn IngestSink>> {
    Ok(match config.kind {
        SinkKind::ClickHouse => Arc::new(ClickHouseSink::new(config.clickhouse.clone())?),
        SinkKind::MySql => Arc::new(MySqlSink::new(config.mysql.clone())),
    })
}

/// Plain SQL identifier check for names interpolated into DDL
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn require_identifier(name: &str) -> SinkResult<&str> {
    if is_identifier(name) {
        Ok(name)
    } else {
        Err(SinkError::Config(format!(
            "database name '{}' must match [A-Za-z0-9_]+",
            name
        )))
    }
}
