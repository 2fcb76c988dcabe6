//! Relational sink on MySQL
//!
//! The database is created over a server-level connection, then a pool is
//! opened against it. Each run stores the whole extracted text as one row.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::{ConnectOptions, Connection};
use std::borrow::Cow;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::{require_identifier, IngestSink, SinkKind, SinkResult, SinkWriter, TABLE_NAME};
use crate::archive::{ExtractedPayload, PayloadShape};
use crate::config::MySqlConfig;

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS downloads (
    id INT AUTO_INCREMENT PRIMARY KEY,
    download_date DATE NOT NULL,
    file_data LONGTEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

const INSERT_SQL: &str = "INSERT INTO downloads (download_date, file_data) VALUES (?, ?)";

/// Unprovisioned MySQL sink
pub struct MySqlSink {
    config: MySqlConfig,
}

impl MySqlSink {
    pub fn new(config: MySqlConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl IngestSink for MySqlSink {
    fn kind(&self) -> SinkKind {
        SinkKind::MySql
    }

    fn payload_shape(&self) -> PayloadShape {
        PayloadShape::Text
    }

    async fn ensure_schema(&self) -> SinkResult<Box<dyn SinkWriter>> {
        let database = require_identifier(&self.config.database)?;
        let server = MySqlConnectOptions::from_str(&self.config.url)?;

        let mut conn = server.connect().await?;
        let create_database = format!("CREATE DATABASE IF NOT EXISTS `{}`", database);
        sqlx::query(&create_database).execute(&mut conn).await?;
        conn.close().await?;

        let pool = MySqlPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .connect_with(server.database(database))
            .await?;

        sqlx::query(CREATE_TABLE_SQL).execute(&pool).await?;

        info!(database = %database, table = TABLE_NAME, "MySQL database and table are ready");
        Ok(Box::new(MySqlWriter { pool }))
    }
}

/// MySQL sink with its table confirmed
pub struct MySqlWriter {
    pool: MySqlPool,
}

#[async_trait]
impl SinkWriter for MySqlWriter {
    async fn write(&self, payload: &ExtractedPayload, date: NaiveDate) -> SinkResult<u64> {
        let text: Cow<'_, str> = match payload {
            ExtractedPayload::Text(text) => Cow::Borrowed(text.as_str()),
            ExtractedPayload::Lines(lines) => Cow::Owned(lines.join("\n")),
        };

        let result = sqlx::query(INSERT_SQL)
            .bind(date)
            .bind(text.as_ref())
            .execute(&self.pool)
            .await?;

        info!(
            rows = result.rows_affected(),
            bytes = text.len(),
            date = %date,
            "Saved file content to MySQL"
        );
        Ok(result.rows_affected())
    }
}
