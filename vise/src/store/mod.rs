//! Store - the cached dataset snapshot and queries over it.
//!
//! The snapshot is a single Parquet file rewritten atomically on merge.
//! DuckDB runs in-memory with views over the snapshot: `cycles` exposes the
//! raw ingested rows, `cycles_enriched` adds the derived columns.

pub(crate) mod atomic;
mod merge;
mod report;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use duckdb::{
    types::{TimeUnit, ValueRef},
    Connection,
};

use crate::config::Config;
use crate::{Error, Result};

pub use merge::MergeStats;
pub use report::ReportGroup;

/// A VISE store over the cached snapshot.
pub struct Store {
    config: Config,
}

impl Store {
    /// Open an existing VISE store.
    pub fn open(config: Config) -> Result<Self> {
        if !config.cache_dir().exists() {
            return Err(Error::NotInitialized(config.vise_root.clone()));
        }
        Ok(Self { config })
    }

    /// Get config reference.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether a snapshot has been written yet.
    pub fn has_snapshot(&self) -> bool {
        self.config.snapshot_path().exists()
    }

    /// In-memory DuckDB connection with the `cycles` and `cycles_enriched`
    /// views bound to the snapshot.
    pub fn connection(&self) -> Result<Connection> {
        if !self.has_snapshot() {
            return Err(Error::NotFound(
                "no cached dataset - run a sync first".to_string(),
            ));
        }
        let conn = Connection::open_in_memory()?;
        conn.execute("LOAD parquet", [])?;
        conn.execute(
            &format!(
                "CREATE OR REPLACE VIEW cycles AS SELECT * FROM read_parquet('{}', union_by_name = true)",
                sql_escape(&self.config.snapshot_path().display().to_string())
            ),
            [],
        )?;
        report::create_enriched_view(&conn, &self.config)?;
        Ok(conn)
    }

    /// Total rows in the snapshot (0 when none exists).
    pub fn row_count(&self) -> Result<i64> {
        if !self.has_snapshot() {
            return Ok(0);
        }
        let conn = self.connection()?;
        let count = conn.query_row("SELECT COUNT(*) FROM cycles", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Distinct source files in the snapshot, sorted.
    pub fn source_files(&self) -> Result<Vec<String>> {
        if !self.has_snapshot() {
            return Ok(Vec::new());
        }
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT source_file FROM cycles ORDER BY source_file")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Query the store using SQL.
    ///
    /// Returns results as rows of display strings.
    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;

        let mut rows_iter = stmt.query([])?;
        let column_count = rows_iter.as_ref().map(|r| r.column_count()).unwrap_or(0);
        let columns: Vec<String> = match rows_iter.as_ref() {
            Some(row_ref) => (0..column_count)
                .map(|i| {
                    row_ref
                        .column_name(i)
                        .map(|s| s.to_string())
                        .unwrap_or_else(|_| format!("col{}", i))
                })
                .collect(),
            None => Vec::new(),
        };

        let mut rows = Vec::new();
        while let Some(row) = rows_iter.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(display_value(row.get_ref(i)?));
            }
            rows.push(values);
        }

        Ok(QueryResult { columns, rows })
    }
}

/// Result of a SQL query.
#[derive(Debug)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Render one DuckDB value for display.
fn display_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Boolean(b) => b.to_string(),
        ValueRef::TinyInt(n) => n.to_string(),
        ValueRef::SmallInt(n) => n.to_string(),
        ValueRef::Int(n) => n.to_string(),
        ValueRef::BigInt(n) => n.to_string(),
        ValueRef::UTinyInt(n) => n.to_string(),
        ValueRef::USmallInt(n) => n.to_string(),
        ValueRef::UInt(n) => n.to_string(),
        ValueRef::UBigInt(n) => n.to_string(),
        ValueRef::Float(f) => f.to_string(),
        ValueRef::Double(f) => f.to_string(),
        ValueRef::Timestamp(unit, val) => {
            let micros = match unit {
                TimeUnit::Second => val * 1_000_000,
                TimeUnit::Millisecond => val * 1_000,
                TimeUnit::Microsecond => val,
                TimeUnit::Nanosecond => val / 1_000,
            };
            DateTime::<Utc>::from_timestamp_micros(micros)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| format!("<invalid timestamp {}>", val))
        }
        ValueRef::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(TimeDelta::days(days as i64)))
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| format!("<invalid date {}>", days)),
        ValueRef::Text(s) => String::from_utf8_lossy(s).to_string(),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
        _ => "<complex>".to_string(),
    }
}

/// Escape a string for a single-quoted SQL literal.
pub(crate) fn sql_escape(s: &str) -> String {
    s.replace('\'', "''")
}

/// Quote a column name as a SQL identifier.
pub(crate) fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::initialize;
    use crate::schema::FileBatch;
    use tempfile::TempDir;

    pub(super) fn setup_store() -> (TempDir, Store) {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_root(tmp.path());
        initialize(&config).unwrap();
        let store = Store::open(config).unwrap();
        (tmp, store)
    }

    pub(super) fn batch(source: &str, headers: &[&str], rows: &[&[&str]]) -> FileBatch {
        FileBatch {
            source_file: source.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|v| v.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_store_open_uninitialized_fails() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_root(tmp.path().join("missing"));

        let result = Store::open(config);
        assert!(matches!(result, Err(Error::NotInitialized(_))));
    }

    #[test]
    fn test_counts_without_snapshot() {
        let (_tmp, store) = setup_store();
        assert!(!store.has_snapshot());
        assert_eq!(store.row_count().unwrap(), 0);
        assert!(store.source_files().unwrap().is_empty());
    }

    #[test]
    fn test_query_without_snapshot_fails() {
        let (_tmp, store) = setup_store();
        let result = store.query("SELECT 1");
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_query_stringifies_values() {
        let (_tmp, store) = setup_store();
        let b = batch(
            "Presse1_2024-01-05.csv",
            &["Date", "Time", "Cycle Time"],
            &[&["2024-01-05", "06:30:00", "90"]],
        );
        store.merge(&[b], &["Presse1_2024-01-05.csv".to_string()]).unwrap();

        let result = store
            .query("SELECT source_file, COUNT(*) AS n FROM cycles GROUP BY source_file")
            .unwrap();
        assert_eq!(result.columns, vec!["source_file", "n"]);
        assert_eq!(result.rows, vec![vec![
            "Presse1_2024-01-05.csv".to_string(),
            "1".to_string(),
        ]]);
    }

    #[test]
    fn test_sql_helpers() {
        assert_eq!(sql_escape("it's"), "it''s");
        assert_eq!(quote_ident("Cycle Time"), "\"Cycle Time\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
