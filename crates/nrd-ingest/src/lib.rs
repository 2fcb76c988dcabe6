//! NRD Ingest Library
//!
//! Daily acquisition of newly-registered-domain drops: load the listing page,
//! download the archive published for today, extract its text member and
//! store it in ClickHouse (one row per line) or MySQL (one row per drop).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use nrd_ingest::{build_sink, AcquisitionPipeline, HttpBrowser, IngestConfig, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let browser = HttpBrowser::new(
//!         &config.user_agent,
//!         config.navigation_timeout(),
//!         config.download_timeout(),
//!     )?;
//!     let sink = build_sink(&config.sink)?;
//!
//!     let pipeline = AcquisitionPipeline::new(PipelineConfig::from(&config), Arc::new(browser), sink);
//!     let outcome = pipeline.run().await?;
//!     println!("{outcome}");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod archive;
pub mod browser;
pub mod config;
pub mod download;
pub mod error;
pub mod locator;
pub mod pipeline;
pub mod scheduler;
pub mod sink;

pub use archive::{ArchiveUnpacker, ExtractedPayload, PayloadShape};
pub use browser::{BrowserEngine, BrowserSession, HttpBrowser};
pub use config::IngestConfig;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{AcquisitionPipeline, PipelineConfig, RunContext, RunOutcome};
pub use scheduler::{ScheduledRunner, Scheduler, TriggerResult};
pub use sink::{build_sink, IngestSink, SinkKind, SinkWriter};
