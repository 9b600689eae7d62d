//! Atomic file writes via temp file and rename.
//!
//! Both the Parquet snapshot and the JSON index are rewritten wholesale,
//! so a crash mid-write must never leave a truncated file behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Temp path next to the final path: `{dir}/.tmp.{random}.{filename}`.
pub fn temp_path(final_path: &Path) -> PathBuf {
    let filename = final_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let random: u64 = rand::random();
    final_path.with_file_name(format!(".tmp.{:016x}.{}", random, filename))
}

/// Rename a temp file over the final path.
pub fn rename_into_place(temp_path: &Path, final_path: &Path) -> io::Result<()> {
    fs::rename(temp_path, final_path).inspect_err(|_| {
        let _ = fs::remove_file(temp_path);
    })
}

/// Write content to a file atomically.
pub fn write_file(final_path: &Path, content: &[u8]) -> io::Result<()> {
    let temp = temp_path(final_path);
    fs::write(&temp, content)?;
    rename_into_place(&temp, final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn temp_path_stays_in_directory() {
        let final_path = Path::new("/tmp/test/cycles.parquet");
        let temp = temp_path(final_path);

        assert_eq!(temp.parent(), final_path.parent());
        let filename = temp.file_name().unwrap().to_str().unwrap();
        assert!(filename.starts_with(".tmp."));
        assert!(filename.ends_with(".cycles.parquet"));
    }

    #[test]
    fn write_file_leaves_no_temp() {
        let tmp = TempDir::new().unwrap();
        let final_path = tmp.path().join("index.json");

        write_file(&final_path, b"{}").unwrap();
        assert_eq!(fs::read(&final_path).unwrap(), b"{}");

        let temps: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_str().unwrap_or("").starts_with(".tmp."))
            .collect();
        assert!(temps.is_empty());
    }

    #[test]
    fn write_file_replaces_existing() {
        let tmp = TempDir::new().unwrap();
        let final_path = tmp.path().join("index.json");

        fs::write(&final_path, b"old").unwrap();
        write_file(&final_path, b"new").unwrap();
        assert_eq!(fs::read(&final_path).unwrap(), b"new");
    }
}
