//! psq: Press Sync and Query - CLI for syncing and querying press cycle history.

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "psq")]
#[command(about = "Press Sync and Query - sync and query press cycle history")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the VISE root and default config
    Init,

    /// Sync remote CSV files into the cached snapshot
    #[command(visible_alias = "s")]
    Sync {
        /// Print the fetch plan without downloading anything
        #[arg(short = 'n', long = "dry-run")]
        dry_run: bool,
    },

    /// Show cache status
    Status,

    /// Aggregate cycle counts from the derived view
    #[command(visible_alias = "r")]
    Report {
        /// Grouping: day, machine, hour
        #[arg(short = 'b', long = "by", default_value = "day")]
        by: String,
    },

    /// Execute SQL against the cycles / cycles_enriched views
    #[command(visible_alias = "q")]
    Sql {
        /// SQL query to execute
        query: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init(),
        Commands::Sync { dry_run } => commands::sync(dry_run),
        Commands::Status => commands::status(),
        Commands::Report { by } => commands::report(&by),
        Commands::Sql { query } => commands::sql(&query),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
