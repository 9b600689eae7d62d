//! VISE: Versioned Ingest and Snapshot Engine
//!
//! Storage and sync layer for press cycle CSV history using DuckDB and Parquet.

pub mod config;
pub mod decode;
pub mod drive;
pub mod error;
pub mod filename;
pub mod index;
pub mod init;
pub mod schema;
pub mod store;
pub mod sync;

pub use config::{ColumnConfig, Config, DriveConfig, MachineSpec};
pub use drive::{GraphClient, RemoteDrive};
pub use error::{Error, Result};
pub use filename::{parse_file_name, ParsedFileName};
pub use index::FileIndex;
pub use schema::{file_key, FileBatch, RemoteFile, SkippedFile, SyncOutcome};
pub use store::{MergeStats, QueryResult, ReportGroup, Store};
pub use sync::{plan_sync, SyncEngine, SyncPlan};
