//! First-run initialization of a VISE root.

use std::fs;

use crate::config::Config;
use crate::{Error, Result};

/// Create the root layout and write the default config.
///
/// The cache directory starts empty; the snapshot and index appear after
/// the first sync that ingests data.
pub fn initialize(config: &Config) -> Result<()> {
    if config.config_path().exists() {
        return Err(Error::AlreadyInitialized(config.vise_root.clone()));
    }
    fs::create_dir_all(config.cache_dir())?;
    config.save()?;
    Ok(())
}
