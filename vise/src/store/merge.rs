//! Snapshot merge: replace re-ingested sources, append new batches.

use duckdb::{params_from_iter, Connection};
use log::debug;

use super::{atomic, quote_ident, sql_escape, Store};
use crate::schema::FileBatch;
use crate::Result;

/// Counters from one merge.
#[derive(Debug, Clone, Copy)]
pub struct MergeStats {
    /// Rows appended from the new batches.
    pub rows_ingested: usize,

    /// Rows in the snapshot after the merge.
    pub rows_total: i64,
}

impl Store {
    /// Merge fetched batches into the snapshot.
    ///
    /// Rows whose `source_file` is in `replace_sources` are dropped from the
    /// prior snapshot before the batches are appended, so each source keeps
    /// exactly one ingested version. Columns are matched by name; columns
    /// new to this run appear with NULLs in the older rows.
    pub fn merge(&self, batches: &[FileBatch], replace_sources: &[String]) -> Result<MergeStats> {
        if batches.is_empty() {
            return Ok(MergeStats {
                rows_ingested: 0,
                rows_total: self.row_count()?,
            });
        }

        let conn = Connection::open_in_memory()?;
        conn.execute("LOAD parquet", [])?;

        // Union of batch columns in first-seen order, tag column last.
        let mut columns: Vec<String> = Vec::new();
        for batch in batches {
            for header in &batch.headers {
                if header != "source_file" && !columns.contains(header) {
                    columns.push(header.clone());
                }
            }
        }
        columns.push("source_file".to_string());

        // Cells stay VARCHAR; typing happens in the derived view so the
        // snapshot schema can grow without rewriting history.
        let col_defs = columns
            .iter()
            .map(|c| format!("{} VARCHAR", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute(&format!("CREATE TEMP TABLE new_batch ({})", col_defs), [])?;

        let placeholders = vec!["?"; columns.len()].join(", ");
        let mut rows_ingested = 0usize;
        {
            let mut stmt =
                conn.prepare(&format!("INSERT INTO new_batch VALUES ({})", placeholders))?;
            let data_columns = &columns[..columns.len() - 1];
            for batch in batches {
                let positions: Vec<Option<usize>> = data_columns
                    .iter()
                    .map(|c| batch.headers.iter().position(|h| h == c))
                    .collect();
                for row in &batch.rows {
                    let mut values: Vec<Option<&str>> = positions
                        .iter()
                        .map(|pos| pos.and_then(|p| row.get(p)).map(String::as_str))
                        .collect();
                    values.push(Some(batch.source_file.as_str()));
                    stmt.execute(params_from_iter(values))?;
                    rows_ingested += 1;
                }
            }
        }

        let snapshot = self.config().snapshot_path();
        let merged_sql = if snapshot.exists() && !replace_sources.is_empty() {
            let replaced = replace_sources
                .iter()
                .map(|s| format!("'{}'", sql_escape(s)))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "CREATE TEMP TABLE merged AS \
                 SELECT * FROM read_parquet('{}', union_by_name = true) \
                 WHERE source_file NOT IN ({}) \
                 UNION ALL BY NAME \
                 SELECT * FROM new_batch",
                sql_escape(&snapshot.display().to_string()),
                replaced
            )
        } else if snapshot.exists() {
            format!(
                "CREATE TEMP TABLE merged AS \
                 SELECT * FROM read_parquet('{}', union_by_name = true) \
                 UNION ALL BY NAME \
                 SELECT * FROM new_batch",
                sql_escape(&snapshot.display().to_string())
            )
        } else {
            "CREATE TEMP TABLE merged AS SELECT * FROM new_batch".to_string()
        };
        conn.execute(&merged_sql, [])?;

        let rows_total: i64 =
            conn.query_row("SELECT COUNT(*) FROM merged", [], |row| row.get(0))?;

        // COPY to a temp file, then rename over the snapshot.
        std::fs::create_dir_all(self.config().cache_dir())?;
        let temp_path = atomic::temp_path(&snapshot);
        conn.execute(
            &format!(
                "COPY merged TO '{}' (FORMAT PARQUET, COMPRESSION ZSTD)",
                sql_escape(&temp_path.display().to_string())
            ),
            [],
        )?;
        atomic::rename_into_place(&temp_path, &snapshot)?;

        debug!("merged {} rows, snapshot now {} rows", rows_ingested, rows_total);
        Ok(MergeStats {
            rows_ingested,
            rows_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{batch, setup_store};

    #[test]
    fn first_merge_creates_snapshot() {
        let (_tmp, store) = setup_store();

        let b = batch(
            "Presse1_2024-01-05.csv",
            &["Date", "Time", "Cycle Time"],
            &[
                &["2024-01-05", "06:30:00", "90"],
                &["2024-01-05", "06:32:00", "85"],
            ],
        );
        let stats = store.merge(&[b], &["Presse1_2024-01-05.csv".to_string()]).unwrap();

        assert!(store.has_snapshot());
        assert_eq!(stats.rows_ingested, 2);
        assert_eq!(stats.rows_total, 2);
        assert_eq!(store.row_count().unwrap(), 2);
    }

    #[test]
    fn reingested_source_is_replaced_not_duplicated() {
        let (_tmp, store) = setup_store();
        let source = "Presse1_2024-01-05.csv";

        let first = batch(
            source,
            &["Date", "Time"],
            &[&["2024-01-05", "06:30:00"], &["2024-01-05", "06:32:00"]],
        );
        store.merge(&[first], &[source.to_string()]).unwrap();

        // The file grew by one row since the last pull.
        let second = batch(
            source,
            &["Date", "Time"],
            &[
                &["2024-01-05", "06:30:00"],
                &["2024-01-05", "06:32:00"],
                &["2024-01-05", "06:34:00"],
            ],
        );
        let stats = store.merge(&[second], &[source.to_string()]).unwrap();

        assert_eq!(stats.rows_total, 3);
        assert_eq!(store.source_files().unwrap(), vec![source.to_string()]);
    }

    #[test]
    fn untouched_sources_survive_merge() {
        let (_tmp, store) = setup_store();

        let one = batch("Presse1_2024-01-04.csv", &["Date", "Time"], &[&["2024-01-04", "06:00:00"]]);
        let two = batch("Presse2_2024-01-04.csv", &["Date", "Time"], &[&["2024-01-04", "07:00:00"]]);
        store.merge(
            &[one, two],
            &[
                "Presse1_2024-01-04.csv".to_string(),
                "Presse2_2024-01-04.csv".to_string(),
            ],
        )
        .unwrap();

        let update = batch("Presse1_2024-01-04.csv", &["Date", "Time"], &[&["2024-01-04", "06:00:00"]]);
        let stats = store
            .merge(&[update], &["Presse1_2024-01-04.csv".to_string()])
            .unwrap();

        assert_eq!(stats.rows_total, 2);
        assert_eq!(store.source_files().unwrap().len(), 2);
    }

    #[test]
    fn schema_can_grow_across_merges() {
        let (_tmp, store) = setup_store();

        let old = batch("Presse1_2024-01-04.csv", &["Date", "Time"], &[&["2024-01-04", "06:00:00"]]);
        store.merge(&[old], &["Presse1_2024-01-04.csv".to_string()]).unwrap();

        // Newer exports carry an extra column.
        let new = batch(
            "Presse1_2024-01-05.csv",
            &["Date", "Time", "Cycle Time"],
            &[&["2024-01-05", "06:30:00", "90"]],
        );
        store.merge(&[new], &["Presse1_2024-01-05.csv".to_string()]).unwrap();

        let result = store
            .query("SELECT \"Cycle Time\" FROM cycles ORDER BY source_file")
            .unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0][0], "NULL");
        assert_eq!(result.rows[1][0], "90");
    }

    #[test]
    fn empty_batches_are_a_noop() {
        let (_tmp, store) = setup_store();
        let stats = store.merge(&[], &[]).unwrap();
        assert_eq!(stats.rows_ingested, 0);
        assert_eq!(stats.rows_total, 0);
        assert!(!store.has_snapshot());
    }

    #[test]
    fn rows_shorter_than_headers_pad_with_null() {
        let (_tmp, store) = setup_store();

        // Two files with disjoint extra columns; matching is by name.
        let a = batch("a_2024-01-01.csv", &["Date", "Time", "Oil Temp"], &[&["2024-01-01", "01:00:00", "44"]]);
        let b = batch("b_2024-01-01.csv", &["Date", "Time", "Operator"], &[&["2024-01-01", "02:00:00", "JD"]]);
        store
            .merge(&[a, b], &["a_2024-01-01.csv".to_string(), "b_2024-01-01.csv".to_string()])
            .unwrap();

        let result = store
            .query("SELECT \"Oil Temp\", \"Operator\" FROM cycles ORDER BY source_file")
            .unwrap();
        assert_eq!(result.rows[0], vec!["44".to_string(), "NULL".to_string()]);
        assert_eq!(result.rows[1], vec!["NULL".to_string(), "JD".to_string()]);
    }
}
