//! Remote drive access.
//!
//! The trait seam keeps the sync engine testable against an in-memory
//! fake; the real implementation talks to Microsoft Graph.

mod graph;

pub use graph::GraphClient;

use crate::schema::RemoteFile;
use crate::Result;

/// A remote folder of CSV files.
pub trait RemoteDrive {
    /// Full listing of CSV files in the configured folder, following
    /// pagination until exhausted.
    fn list_folder(&mut self) -> Result<Vec<RemoteFile>>;

    /// Raw bytes of one file.
    fn download(&mut self, file: &RemoteFile) -> Result<Vec<u8>>;
}
