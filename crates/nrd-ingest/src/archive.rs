//! Archive unpacking
//!
//! Reads the first `.txt` member of a zip archive. Later `.txt` members are
//! ignored: a drop is expected to carry a single listing file, and multi-file
//! archives are out of scope.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tracing::{debug, warn};
use zip::ZipArchive;

/// Suffix a member name must end with to be considered text
pub const TEXT_MEMBER_SUFFIX: &str = ".txt";

/// Upper bound on the decompressed size of the text member
pub const MAX_TEXT_MEMBER_BYTES: u64 = 512 * 1024 * 1024;

/// How a sink wants the extracted text handed over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Trimmed, non-empty lines in file order
    Lines,
    /// The whole member as one string
    Text,
}

/// Decoded content of the text member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedPayload {
    Lines(Vec<String>),
    Text(String),
}

impl ExtractedPayload {
    /// Rows this payload becomes in its matching sink
    pub fn record_count(&self) -> usize {
        match self {
            ExtractedPayload::Lines(lines) => lines.len(),
            ExtractedPayload::Text(_) => 1,
        }
    }

    pub fn shape(&self) -> PayloadShape {
        match self {
            ExtractedPayload::Lines(_) => PayloadShape::Lines,
            ExtractedPayload::Text(_) => PayloadShape::Text,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error reading archive: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unreadable archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("No member ending in '{suffix}' found in archive")]
    NoTextMemberFound { suffix: String },

    #[error("Member '{member}' exceeds {limit} bytes once decompressed")]
    MemberTooLarge { member: String, limit: u64 },
}

/// Extracts the first text-bearing member of a zip archive
#[derive(Debug, Clone)]
pub struct ArchiveUnpacker {
    text_suffix: String,
    max_member_bytes: u64,
}

impl Default for ArchiveUnpacker {
    fn default() -> Self {
        Self {
            text_suffix: TEXT_MEMBER_SUFFIX.to_string(),
            max_member_bytes: MAX_TEXT_MEMBER_BYTES,
        }
    }
}

impl ArchiveUnpacker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_member_bytes(mut self, limit: u64) -> Self {
        self.max_member_bytes = limit;
        self
    }

    /// Unpack `path` into the requested payload shape.
    ///
    /// Blocking; call through `spawn_blocking` from async code.
    pub fn unpack(&self, path: &Path, shape: PayloadShape) -> Result<ExtractedPayload, ArchiveError> {
        let text = self.unpack_text(path)?;
        Ok(match shape {
            PayloadShape::Lines => ExtractedPayload::Lines(split_lines(&text)),
            PayloadShape::Text => ExtractedPayload::Text(text),
        })
    }

    /// Decoded content of the first text member.
    pub fn unpack_text(&self, path: &Path) -> Result<String, ArchiveError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;
        let (member, bytes) = self.read_first_text_member(&mut archive)?;

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!(member = %member, "Text member is not valid UTF-8, replacing invalid sequences");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            },
        };

        debug!(member = %member, chars = text.len(), "Extracted text member");
        Ok(match text.strip_prefix('\u{feff}') {
            Some(stripped) => stripped.to_string(),
            None => text,
        })
    }

    /// Trimmed, non-empty lines of the first text member.
    pub fn unpack_lines(&self, path: &Path) -> Result<Vec<String>, ArchiveError> {
        Ok(split_lines(&self.unpack_text(path)?))
    }

    fn read_first_text_member<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
    ) -> Result<(String, Vec<u8>), ArchiveError> {
        for index in 0..archive.len() {
            let mut member = archive.by_index(index)?;
            if member.is_dir() || !member.name().ends_with(&self.text_suffix) {
                continue;
            }

            let name = member.name().to_string();
            let mut bytes = Vec::new();
            member
                .by_ref()
                .take(self.max_member_bytes + 1)
                .read_to_end(&mut bytes)?;

            if bytes.len() as u64 > self.max_member_bytes {
                return Err(ArchiveError::MemberTooLarge {
                    member: name,
                    limit: self.max_member_bytes,
                });
            }

            return Ok((name, bytes));
        }

        Err(ArchiveError::NoTextMemberFound {
            suffix: self.text_suffix.clone(),
        })
    }
}

/// Split on every CR or LF, trim, and drop blank lines.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split(|c| c == '\r' || c == '\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
