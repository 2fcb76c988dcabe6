//! Calendar-date helpers
//!
//! Every date the pipeline compares or stores goes through [`ISO_DATE_FORMAT`].
//! Matching against the source page is plain string equality on this
//! rendering, so the format is fixed.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};

/// `YYYY-MM-DD`
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Current calendar date in UTC.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Render a date as `YYYY-MM-DD`.
pub fn format_iso(date: NaiveDate) -> String {
    date.format(ISO_DATE_FORMAT).to_string()
}

/// Parse a strict `YYYY-MM-DD` string.
///
/// Unlike chrono's parser this rejects unpadded fields (`2024-1-5`), so a
/// value accepted here always renders back to the same text.
pub fn parse_iso(input: &str) -> Result<NaiveDate> {
    let trimmed = input.trim();
    let date = NaiveDate::parse_from_str(trimmed, ISO_DATE_FORMAT)
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", trimmed))?;

    if format_iso(date) != trimmed {
        bail!("Invalid date '{}', expected zero-padded YYYY-MM-DD", trimmed);
    }

    Ok(date)
}
