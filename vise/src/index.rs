//! Persisted per-file fingerprint index.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::store::atomic;
use crate::{Error, Result};

/// Mapping from normalized file name to change fingerprint.
///
/// Read at the start of every run and rewritten wholesale after a run that
/// ingested data, so it always reflects the latest listing snapshot. Files
/// skipped during a run carry no entry and re-qualify as changed next time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIndex {
    #[serde(flatten)]
    entries: BTreeMap<String, String>,
}

impl FileIndex {
    /// Load the index from disk. A missing file is an empty index.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::Storage(format!("Failed to parse file index: {}", e)))
    }

    /// Save the index to disk atomically, replacing any prior contents.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string(self)
            .map_err(|e| Error::Storage(format!("Failed to serialize file index: {}", e)))?;
        atomic::write_file(path, contents.as_bytes())?;
        Ok(())
    }

    /// Stored fingerprint for a file key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, fingerprint: impl Into<String>) {
        self.entries.insert(key.into(), fingerprint.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
