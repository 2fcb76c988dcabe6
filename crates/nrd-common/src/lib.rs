//! NRD Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the NRD workspace members.
//!
//! - **Logging**: subscriber setup driven by `LOG_*` environment variables
//! - **Dates**: the calendar-date format used for page matching and storage
//!
//! # Example
//!
//! ```no_run
//! use nrd_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::builder().log_file_prefix("nrd-ingest").build().merge_env()?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!(today = %nrd_common::dates::today_utc(), "Started");
//!     Ok(())
//! }
//! ```

pub mod dates;
pub mod logging;

pub use dates::{format_iso, parse_iso, today_utc, ISO_DATE_FORMAT};
