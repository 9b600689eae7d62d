//! Record types shared between the drive, sync, and store layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A CSV file as reported by the remote drive listing.
///
/// Ephemeral: fetched fresh from the listing on every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFile {
    /// File name as the drive reports it.
    pub name: String,

    /// Size in bytes.
    pub size: u64,

    /// Last modification time from the listing.
    pub last_modified: DateTime<Utc>,

    /// Pre-authenticated download URL.
    pub download_url: String,
}

impl RemoteFile {
    /// Change-detection fingerprint: size plus modification time.
    ///
    /// Not a content hash - a same-size same-timestamp edit is invisible.
    pub fn fingerprint(&self) -> String {
        format!("{}:{}", self.size, self.last_modified.to_rfc3339())
    }

    /// Identity key used in the file index.
    pub fn key(&self) -> String {
        file_key(&self.name)
    }

    /// Trimmed original-case name, used for the `source_file` tag.
    pub fn display_name(&self) -> &str {
        self.name.trim()
    }
}

/// Normalize a file name into its identity key.
///
/// Drive listings are case-insensitive and occasionally pad names with
/// whitespace, so identity is the trimmed, case-folded name.
pub fn file_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Parsed rows from one accepted file, tagged with their origin.
#[derive(Debug, Clone)]
pub struct FileBatch {
    /// Trimmed file name every row is tagged with.
    pub source_file: String,

    /// Column names in file order.
    pub headers: Vec<String>,

    /// Raw cell values, one Vec per row, aligned to `headers`.
    pub rows: Vec<Vec<String>>,
}

/// A file excluded from this run, with the reason it was skipped.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

/// Summary of one sync run.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Source files successfully fetched and ingested.
    pub fetched: Vec<String>,

    /// Files skipped with their reasons (fetch or parse failures).
    pub skipped: Vec<SkippedFile>,

    /// Files left alone: fingerprint unchanged and not forced.
    pub unchanged: usize,

    /// Rows added by this run's merge.
    pub rows_ingested: usize,

    /// Rows in the snapshot after the run.
    pub total_rows: i64,

    /// The listing call failed; cached data was served unchanged.
    pub listing_failed: bool,
}
