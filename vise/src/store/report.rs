//! Derived columns and report aggregates.
//!
//! Everything here is recomputed from the raw snapshot each time a
//! connection is opened; no derived value is persisted.

use duckdb::Connection;
use log::warn;

use super::{quote_ident, sql_escape, QueryResult, Store};
use crate::config::{Config, MachineSpec};
use crate::Result;

/// Grouping for the report command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportGroup {
    Day,
    Machine,
    Hour,
}

/// Create the `cycles_enriched` view over `cycles`.
///
/// Derives the combined timestamp, calendar fields, machine display code,
/// AM/PM shift, and per-minute duration columns, and drops the excluded
/// bad-data months.
pub(super) fn create_enriched_view(conn: &Connection, config: &Config) -> Result<()> {
    let existing = view_columns(conn)?;
    let has = |name: &str| existing.iter().any(|c| c == name);
    let c = &config.columns;

    let ts_expr = if has(&c.date) && has(&c.time) {
        format!(
            "try_strptime(trim({}) || ' ' || trim({}), '{}')",
            quote_ident(&c.date),
            quote_ident(&c.time),
            sql_escape(&format!("{} {}", c.date_format, c.time_format))
        )
    } else {
        // snapshot predates the configured columns; derive nothing
        "CAST(NULL AS TIMESTAMP)".to_string()
    };

    let mut selects = vec![
        "cycles.*".to_string(),
        format!("{} AS cycle_ts", ts_expr),
        "CAST(cycle_ts AS DATE) AS cycle_date".to_string(),
        "hour(cycle_ts) AS cycle_hour".to_string(),
        "dayname(cycle_ts) AS weekday".to_string(),
        format!("{} AS machine", machine_case_expr(&config.machines)),
        // the shop treats 13:00 as the AM/PM changeover
        "CASE WHEN cycle_ts IS NULL THEN NULL \
              WHEN hour(cycle_ts) < 13 THEN 'AM' ELSE 'PM' END AS shift"
            .to_string(),
    ];
    for col in &c.durations {
        if has(col) {
            selects.push(format!(
                "TRY_CAST({} AS DOUBLE) / 60.0 AS {}",
                quote_ident(col),
                quote_ident(&format!("{} (min)", col))
            ));
        }
    }

    let mut sql = format!(
        "CREATE OR REPLACE VIEW cycles_enriched AS SELECT {} FROM cycles",
        selects.join(", ")
    );
    let exclusions = month_filters(&config.exclude_months);
    if !exclusions.is_empty() {
        let clauses = exclusions
            .iter()
            .map(|(y, m)| format!("NOT (year(cycle_ts) = {} AND month(cycle_ts) = {})", y, m))
            .collect::<Vec<_>>()
            .join(" AND ");
        // unparseable timestamps stay in the view
        sql.push_str(&format!(" WHERE cycle_ts IS NULL OR ({})", clauses));
    }
    conn.execute(&sql, [])?;
    Ok(())
}

/// CASE expression mapping `source_file` to a machine display code.
fn machine_case_expr(machines: &[MachineSpec]) -> String {
    if machines.is_empty() {
        return "CAST(NULL AS VARCHAR)".to_string();
    }
    let mut expr = String::from("CASE");
    for m in machines {
        expr.push_str(&format!(
            " WHEN contains(lower(source_file), '{}') THEN '{}'",
            sql_escape(&m.token.to_lowercase()),
            sql_escape(&m.code)
        ));
    }
    expr.push_str(" ELSE NULL END");
    expr
}

/// Parse configured "YYYY-MM" exclusions, dropping malformed entries.
fn month_filters(exclude_months: &[String]) -> Vec<(i32, u32)> {
    exclude_months
        .iter()
        .filter_map(|s| match parse_month(s) {
            Some(pair) => Some(pair),
            None => {
                warn!("ignoring malformed exclude_months entry '{}'", s);
                None
            }
        })
        .collect()
}

fn parse_month(s: &str) -> Option<(i32, u32)> {
    let (y, m) = s.split_once('-')?;
    let year: i32 = y.parse().ok()?;
    let month: u32 = m.parse().ok()?;
    (1..=12).contains(&month).then_some((year, month))
}

impl Store {
    /// Aggregate cycle counts over the derived view.
    pub fn report(&self, group: ReportGroup) -> Result<QueryResult> {
        let sql = match group {
            ReportGroup::Day => {
                "SELECT cycle_date, machine, COUNT(*) AS cycles \
                 FROM cycles_enriched WHERE cycle_ts IS NOT NULL \
                 GROUP BY cycle_date, machine ORDER BY cycle_date, machine"
            }
            ReportGroup::Machine => {
                "SELECT machine, COUNT(*) AS cycles, \
                        MIN(cycle_date) AS first_day, MAX(cycle_date) AS last_day \
                 FROM cycles_enriched WHERE cycle_ts IS NOT NULL \
                 GROUP BY machine ORDER BY machine"
            }
            ReportGroup::Hour => {
                "SELECT cycle_hour, COUNT(*) AS cycles \
                 FROM cycles_enriched WHERE cycle_ts IS NOT NULL \
                 GROUP BY cycle_hour ORDER BY cycle_hour"
            }
        };
        self.query(sql)
    }
}

/// Column names of the `cycles` view.
fn view_columns(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('cycles')")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{batch, setup_store};
    use super::*;

    fn seed(store: &Store) {
        let p1 = batch(
            "Presse1_2024-01-05.csv",
            &["Date", "Time", "Cycle Time"],
            &[
                &["2024-01-05", "06:30:00", "90"],
                &["2024-01-05", "12:59:00", "120"],
                &["2024-01-05", "13:00:00", "60"],
                // known bad-data window
                &["2019-11-12", "08:00:00", "90"],
                // unparseable timestamp
                &["bogus", "08:00:00", "30"],
            ],
        );
        let p2 = batch(
            "Presse2_2024-01-05.csv",
            &["Date", "Time", "Cycle Time"],
            &[&["2024-01-05", "18:15:00", "75"]],
        );
        store
            .merge(
                &[p1, p2],
                &[
                    "Presse1_2024-01-05.csv".to_string(),
                    "Presse2_2024-01-05.csv".to_string(),
                ],
            )
            .unwrap();
    }

    #[test]
    fn derives_calendar_and_machine_columns() {
        let (_tmp, store) = setup_store();
        seed(&store);

        let result = store
            .query(
                "SELECT machine, cycle_hour, weekday, shift FROM cycles_enriched \
                 WHERE \"Time\" = '06:30:00' AND cycle_ts IS NOT NULL",
            )
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0][0], "P1");
        assert_eq!(result.rows[0][1], "6");
        assert_eq!(result.rows[0][2], "Friday");
        assert_eq!(result.rows[0][3], "AM");
    }

    #[test]
    fn shift_changes_over_at_thirteen() {
        let (_tmp, store) = setup_store();
        seed(&store);

        let result = store
            .query(
                "SELECT \"Time\", shift FROM cycles_enriched \
                 WHERE \"Time\" IN ('12:59:00', '13:00:00') ORDER BY \"Time\"",
            )
            .unwrap();
        assert_eq!(result.rows[0], vec!["12:59:00".to_string(), "AM".to_string()]);
        assert_eq!(result.rows[1], vec!["13:00:00".to_string(), "PM".to_string()]);
    }

    #[test]
    fn durations_convert_to_minutes() {
        let (_tmp, store) = setup_store();
        seed(&store);

        let result = store
            .query(
                "SELECT \"Cycle Time (min)\" FROM cycles_enriched WHERE \"Time\" = '12:59:00'",
            )
            .unwrap();
        assert_eq!(result.rows[0][0], "2");
    }

    #[test]
    fn bad_data_month_is_excluded() {
        let (_tmp, store) = setup_store();
        seed(&store);

        let result = store
            .query("SELECT COUNT(*) FROM cycles_enriched WHERE \"Date\" = '2019-11-12'")
            .unwrap();
        assert_eq!(result.rows[0][0], "0");
        // but the raw snapshot still holds the row
        let raw = store
            .query("SELECT COUNT(*) FROM cycles WHERE \"Date\" = '2019-11-12'")
            .unwrap();
        assert_eq!(raw.rows[0][0], "1");
    }

    #[test]
    fn unparseable_timestamps_stay_in_view() {
        let (_tmp, store) = setup_store();
        seed(&store);

        let result = store
            .query("SELECT shift FROM cycles_enriched WHERE \"Date\" = 'bogus'")
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0][0], "NULL");
    }

    #[test]
    fn report_by_machine_counts_cycles() {
        let (_tmp, store) = setup_store();
        seed(&store);

        let result = store.report(ReportGroup::Machine).unwrap();
        assert_eq!(result.columns[0], "machine");
        // P1: three 2024 rows (bad month and bogus excluded), P2: one
        let p1 = result.rows.iter().find(|r| r[0] == "P1").unwrap();
        let p2 = result.rows.iter().find(|r| r[0] == "P2").unwrap();
        assert_eq!(p1[1], "3");
        assert_eq!(p2[1], "1");
    }

    #[test]
    fn month_filter_parsing() {
        assert_eq!(parse_month("2019-11"), Some((2019, 11)));
        assert_eq!(parse_month("2019-13"), None);
        assert_eq!(parse_month("november"), None);
        assert_eq!(month_filters(&["2019-11".to_string(), "junk".to_string()]), vec![(2019, 11)]);
    }
}
