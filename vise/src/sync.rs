//! Incremental sync: change detection, forced refresh, fetch, merge.
//!
//! A run lists the remote folder, diffs it against the persisted
//! fingerprint index, re-fetches what changed plus the newest file per
//! machine, and merges the result into the snapshot. Failures at file
//! granularity are skipped and retried naturally on the next run;
//! nothing is retried within a run.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use log::{info, warn};

use crate::config::ColumnConfig;
use crate::decode::decode_csv_bytes;
use crate::drive::RemoteDrive;
use crate::filename::parse_file_name;
use crate::index::FileIndex;
use crate::schema::{FileBatch, RemoteFile, SkippedFile, SyncOutcome};
use crate::store::Store;
use crate::{Error, Result};

/// What a run intends to do with the current listing.
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// New or fingerprint-changed files, excluding forced ones.
    pub changed: Vec<RemoteFile>,

    /// Latest file per machine, re-fetched every run. The newest export
    /// may be appended to mid-run without its listed metadata moving, so
    /// change detection alone cannot be trusted for it.
    pub forced: Vec<RemoteFile>,

    /// Files skipped as unchanged.
    pub unchanged: usize,

    /// Fingerprints for every listed file: the next index snapshot.
    pub next_index: FileIndex,
}

/// Build the fetch plan from a listing and the prior index.
///
/// Fetch policy: a file is fetched iff its fingerprint is new/different OR
/// it is the latest-dated file for a machine. Everything else is skipped
/// entirely - not downloaded, not re-parsed.
pub fn plan_sync(listing: &[RemoteFile], prior: &FileIndex, machine_tokens: &[String]) -> SyncPlan {
    // Latest file per machine, by embedded date then name.
    let mut latest: BTreeMap<String, (NaiveDate, &RemoteFile)> = BTreeMap::new();
    for file in listing {
        if let Some(parsed) = parse_file_name(&file.name, machine_tokens) {
            let newer = match latest.get(&parsed.machine) {
                Some((date, current)) => {
                    (parsed.date, file.display_name()) > (*date, current.display_name())
                }
                None => true,
            };
            if newer {
                latest.insert(parsed.machine, (parsed.date, file));
            }
        }
    }
    let forced_keys: HashSet<String> = latest.values().map(|(_, f)| f.key()).collect();

    let mut plan = SyncPlan::default();
    for file in listing {
        let key = file.key();
        let fingerprint = file.fingerprint();
        plan.next_index.insert(key.clone(), fingerprint.clone());

        if forced_keys.contains(&key) {
            plan.forced.push(file.clone());
        } else if prior.get(&key) != Some(fingerprint.as_str()) {
            plan.changed.push(file.clone());
        } else {
            plan.unchanged += 1;
        }
    }
    plan
}

/// Parse decoded CSV bytes into a batch tagged with its source file.
///
/// A file missing the mandatory date or time column is rejected with a
/// reason instead of failing the run.
pub fn normalize(
    source_file: &str,
    bytes: &[u8],
    columns: &ColumnConfig,
) -> std::result::Result<FileBatch, String> {
    let text = decode_csv_bytes(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| format!("csv parse failed: {}", e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    for required in [&columns.date, &columns.time] {
        if !headers.iter().any(|h| h.eq_ignore_ascii_case(required)) {
            return Err(format!("missing mandatory column '{}'", required));
        }
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| format!("csv parse failed: {}", e))?;
        let mut row: Vec<String> = record.iter().map(|v| v.to_string()).collect();
        // flexible mode: short rows pad out, long rows drop the excess
        row.resize(headers.len(), String::new());
        rows.push(row);
    }

    Ok(FileBatch {
        source_file: source_file.to_string(),
        headers,
        rows,
    })
}

/// Drives one sync run end to end.
///
/// Holds the drive and store explicitly; there is no hidden memoization,
/// and a run happens only when the caller asks for one.
pub struct SyncEngine<'a, D: RemoteDrive> {
    drive: &'a mut D,
    store: &'a Store,
}

impl<'a, D: RemoteDrive> SyncEngine<'a, D> {
    pub fn new(drive: &'a mut D, store: &'a Store) -> Self {
        Self { drive, store }
    }

    /// Run one sync: list, diff, fetch changed and forced files, merge.
    ///
    /// Auth failure is fatal - nothing can proceed without a token. Any
    /// other listing failure is served from cache: the run logs a warning,
    /// fetches nothing, and leaves the snapshot and index untouched.
    pub fn run(&mut self) -> Result<SyncOutcome> {
        let config = self.store.config();

        let mut listing_failed = false;
        let listing = match self.drive.list_folder() {
            Ok(files) => files,
            Err(e @ Error::Auth(_)) => return Err(e),
            Err(e) => {
                warn!("listing failed, serving cached data: {}", e);
                listing_failed = true;
                Vec::new()
            }
        };

        let prior = FileIndex::load(&config.index_path())?;
        let mut plan = plan_sync(&listing, &prior, &config.machine_tokens());
        info!(
            "plan: {} changed, {} forced, {} unchanged",
            plan.changed.len(),
            plan.forced.len(),
            plan.unchanged
        );

        let mut batches: Vec<FileBatch> = Vec::new();
        let mut skipped: Vec<SkippedFile> = Vec::new();

        let to_fetch: Vec<RemoteFile> = plan
            .changed
            .iter()
            .chain(plan.forced.iter())
            .cloned()
            .collect();
        for file in &to_fetch {
            match self.fetch_one(file, &config.columns) {
                Ok(batch) => batches.push(batch),
                Err(reason) => {
                    warn!("skipping {}: {}", file.display_name(), reason);
                    // no entry means the file counts as changed next run
                    plan.next_index.remove(&file.key());
                    skipped.push(SkippedFile {
                        name: file.display_name().to_string(),
                        reason,
                    });
                }
            }
        }

        if batches.is_empty() {
            return Ok(SyncOutcome {
                fetched: Vec::new(),
                skipped,
                unchanged: plan.unchanged,
                rows_ingested: 0,
                total_rows: self.store.row_count()?,
                listing_failed,
            });
        }

        // Every re-ingested source replaces its prior rows wholesale.
        let fetched: Vec<String> = batches.iter().map(|b| b.source_file.clone()).collect();
        let stats = self.store.merge(&batches, &fetched)?;
        plan.next_index.save(&config.index_path())?;
        info!(
            "ingested {} rows from {} files, snapshot now {} rows",
            stats.rows_ingested,
            fetched.len(),
            stats.rows_total
        );

        Ok(SyncOutcome {
            fetched,
            skipped,
            unchanged: plan.unchanged,
            rows_ingested: stats.rows_ingested,
            total_rows: stats.rows_total,
            listing_failed,
        })
    }

    fn fetch_one(
        &mut self,
        file: &RemoteFile,
        columns: &ColumnConfig,
    ) -> std::result::Result<FileBatch, String> {
        let bytes = self
            .drive
            .download(file)
            .map_err(|e| format!("download failed: {}", e))?;
        normalize(file.display_name(), &bytes, columns)
    }
}
