//! CLI command implementations.

use vise::{
    init, plan_sync, Config, Error, FileIndex, GraphClient, QueryResult, RemoteDrive, ReportGroup,
    Store, SyncEngine,
};

fn open_store() -> vise::Result<Store> {
    let config = Config::load()?;
    Store::open(config)
}

pub fn init() -> vise::Result<()> {
    let config = Config::load()?;
    init::initialize(&config)?;
    println!("Initialized VISE root at {}", config.vise_root.display());
    println!(
        "Edit {} to set the drive credentials before the first sync.",
        config.config_path().display()
    );
    Ok(())
}

pub fn sync(dry_run: bool) -> vise::Result<()> {
    let store = open_store()?;
    let mut drive = GraphClient::new(store.config().drive.clone());

    if dry_run {
        return print_plan(&store, &mut drive);
    }

    let outcome = SyncEngine::new(&mut drive, &store).run()?;

    if outcome.listing_failed {
        println!(
            "Listing failed; serving cached data ({} rows).",
            outcome.total_rows
        );
        return Ok(());
    }
    for skip in &outcome.skipped {
        println!("Skipped {}: {}", skip.name, skip.reason);
    }
    if outcome.fetched.is_empty() {
        println!("Nothing to fetch ({} files unchanged).", outcome.unchanged);
    } else {
        println!(
            "Fetched {} files ({} rows ingested, {} unchanged).",
            outcome.fetched.len(),
            outcome.rows_ingested,
            outcome.unchanged
        );
    }
    if outcome.total_rows == 0 {
        println!("No data.");
    } else {
        println!("Snapshot holds {} rows.", outcome.total_rows);
    }
    Ok(())
}

fn print_plan(store: &Store, drive: &mut GraphClient) -> vise::Result<()> {
    let listing = match drive.list_folder() {
        Ok(files) => files,
        Err(e) => {
            println!("Listing failed: {}", e);
            return Ok(());
        }
    };
    let config = store.config();
    let prior = FileIndex::load(&config.index_path())?;
    let plan = plan_sync(&listing, &prior, &config.machine_tokens());

    println!(
        "Would fetch {} changed and {} forced files ({} unchanged):",
        plan.changed.len(),
        plan.forced.len(),
        plan.unchanged
    );
    for file in &plan.changed {
        println!("  changed  {}", file.display_name());
    }
    for file in &plan.forced {
        println!("  forced   {}", file.display_name());
    }
    Ok(())
}

pub fn status() -> vise::Result<()> {
    let store = open_store()?;
    let config = store.config();

    if !store.has_snapshot() {
        println!("No data. Run 'psq sync' to fetch the CSV folder.");
        return Ok(());
    }

    let rows = store.row_count()?;
    let sources = store.source_files()?;
    let index = FileIndex::load(&config.index_path())?;
    println!("Snapshot: {}", config.snapshot_path().display());
    println!("  {} rows from {} source files", rows, sources.len());
    println!("  {} files tracked in the index", index.len());
    Ok(())
}

pub fn report(by: &str) -> vise::Result<()> {
    let group = match by {
        "day" => ReportGroup::Day,
        "machine" => ReportGroup::Machine,
        "hour" => ReportGroup::Hour,
        other => {
            return Err(Error::Config(format!(
                "unknown report grouping '{}' (expected day, machine, or hour)",
                other
            )))
        }
    };

    let store = open_store()?;
    if !store.has_snapshot() || store.row_count()? == 0 {
        println!("No data.");
        return Ok(());
    }
    let result = store.report(group)?;
    if result.rows.is_empty() {
        println!("No data.");
    } else {
        print_table(&result);
    }
    Ok(())
}

pub fn sql(query: &str) -> vise::Result<()> {
    let store = open_store()?;
    let result = store.query(query)?;
    print_table(&result);
    Ok(())
}

/// Print a query result as an aligned table.
fn print_table(result: &QueryResult) {
    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.len()).collect();
    for row in &result.rows {
        for (i, value) in row.iter().enumerate() {
            if i < widths.len() && value.len() > widths[i] {
                widths[i] = value.len();
            }
        }
    }

    let header: Vec<String> = result
        .columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:<width$}", c, width = w))
        .collect();
    println!("{}", header.join("  "));
    println!(
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  ")
    );
    for row in &result.rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = w))
            .collect();
        println!("{}", line.join("  "));
    }
}
