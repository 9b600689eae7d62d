//! Error types for VISE operations.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Drive error: {0}")]
    Drive(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("VISE not initialized at {0}")]
    NotInitialized(PathBuf),

    #[error("VISE already initialized at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
