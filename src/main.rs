mod backfill;
mod clean;
mod error;
mod extract;
mod fetch;
mod html;
mod ledger;
mod pipeline;
mod settings;
mod store;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::warn;

use crate::extract::ExtractContext;
use crate::fetch::Fetcher;
use crate::settings::Settings;
use crate::store::{Dataset, FsObjectStore, PartitionStore};

#[derive(Parser)]
#[command(name = "box_office_etl", about = "Box office scraper and raw partition loader")]
struct Cli {
    /// Config file (default: ./box_office.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run extracts (default: daily kinds plus today's weekly kind)
    Extract {
        /// Extract name, or "all". Repeatable.
        #[arg(short = 'e', long = "extract")]
        extracts: Vec<String>,
        /// Year to process (default: this year and last). Repeatable.
        #[arg(short = 'y', long = "year")]
        years: Vec<i32>,
    },
    /// Backfill one missing year, or the given one
    Backfill {
        #[arg(long)]
        year: Option<i32>,
    },
    /// List years missing from the independent datasets
    Missing,
    /// Show the latest partition for a dataset key
    Latest {
        /// Dataset name, e.g. release_id_lookup
        dataset: String,
        /// Partition key value, e.g. 2024 or rl2432467457
        key: String,
        /// Read every partition of the key, not just the latest
        #[arg(long)]
        all: bool,
    },
    /// Recent extract runs
    History {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

fn open_store(settings: &Settings) -> PartitionStore {
    PartitionStore::new(Box::new(FsObjectStore::new(&settings.storage_root)))
}

fn open_ledger(settings: &Settings) -> anyhow::Result<Connection> {
    let conn = ledger::connect(&settings.ledger_path)?;
    ledger::init_schema(&conn)?;
    Ok(conn)
}

/// Runs go unrecorded rather than failing when the ledger can't be opened.
fn try_open_ledger(settings: &Settings) -> Option<Connection> {
    match open_ledger(settings) {
        Ok(conn) => Some(conn),
        Err(e) => {
            warn!("Run ledger unavailable, runs will not be recorded: {:#}", e);
            None
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Extract { extracts, years } => {
            let fetcher = Fetcher::from_settings(&settings)?;
            let store = open_store(&settings);
            let ledger = try_open_ledger(&settings);
            let ctx = ExtractContext {
                fetcher: &fetcher,
                store: &store,
                settings: &settings,
                ledger: ledger.as_ref(),
                today: today(),
            };
            let years = (!years.is_empty()).then_some(years.as_slice());
            let failures = pipeline::run_extracts(&ctx, &extracts, years)?;
            if failures.is_empty() {
                println!("All extracts succeeded.");
                Ok(())
            } else {
                println!("{} extract(s) failed:", failures.len());
                for (kind, err) in &failures {
                    println!("  {}: {}", kind.name(), err);
                }
                let names: Vec<&str> = failures.iter().map(|(k, _)| k.name()).collect();
                bail!("Extract failures: {}", names.join(", "))
            }
        }
        Commands::Backfill { year } => {
            let fetcher = Fetcher::from_settings(&settings)?;
            let store = open_store(&settings);
            let ledger = try_open_ledger(&settings);
            let ctx = ExtractContext {
                fetcher: &fetcher,
                store: &store,
                settings: &settings,
                ledger: ledger.as_ref(),
                today: today(),
            };
            match backfill::run_backfill(&ctx, year)? {
                backfill::BackfillOutcome::Complete => println!("No missing years."),
                backfill::BackfillOutcome::Backfilled(y) => println!("Backfilled {}.", y),
            }
            Ok(())
        }
        Commands::Missing => {
            let store = open_store(&settings);
            let missing =
                backfill::find_missing_years(&store, settings.earliest_year, today().year())?;
            if missing.is_empty() {
                println!("No missing years.");
            } else {
                let years: Vec<String> = missing.iter().map(|y| y.to_string()).collect();
                println!("{} missing years: {}", missing.len(), years.join(", "));
            }
            Ok(())
        }
        Commands::Latest { dataset, key, all } => {
            let Some(ds) = Dataset::by_name(&dataset) else {
                let names: Vec<&str> = store::dataset::ALL.iter().map(|d| d.name).collect();
                bail!("Unknown dataset {:?}. Available: {}", dataset, names.join(", "));
            };
            let store = open_store(&settings);
            if all {
                let paths = store.partitions_for_key(ds, &key)?;
                for p in &paths {
                    println!("{}", p);
                }
                let frame = store.read_partitions(&paths)?;
                println!(
                    "{} partitions, {} rows, columns: {}",
                    paths.len(),
                    frame.len(),
                    frame.columns().join(", ")
                );
                return Ok(());
            }
            match store.find_latest_partition(ds, &key)? {
                Some(path) => {
                    let frame = store
                        .read_partition(&path)
                        .with_context(|| format!("Failed to read {}", path))?;
                    println!("{}", path);
                    println!("{} rows, columns: {}", frame.len(), frame.columns().join(", "));
                }
                None => println!("No partitions for {}={}", ds.key_name, key),
            }
            Ok(())
        }
        Commands::History { limit } => {
            let conn = open_ledger(&settings)?;
            let runs = ledger::fetch_recent_runs(&conn, limit)?;
            if runs.is_empty() {
                println!("No runs recorded.");
                return Ok(());
            }

            println!(
                "{:<24} | {:<26} | {:<10} | {:>6} | {:>6} | {:>7}",
                "Run", "Extract", "Years", "Rows", "Failed", "Secs"
            );
            println!("{}", "-".repeat(94));
            for r in &runs {
                let secs = (r.finished_at - r.started_at).num_milliseconds() as f64 / 1000.0;
                println!(
                    "{:<24} | {:<26} | {:<10} | {:>6} | {:>6} | {:>7.1}",
                    truncate(&r.run_id, 24),
                    r.extract,
                    truncate(&r.years, 10),
                    r.rows_loaded,
                    r.failed_count,
                    secs
                );
                if let Some(err) = &r.error {
                    println!("    {}", truncate(err, 120));
                }
            }
            println!("\n{} runs", runs.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Clip a table cell to `max` characters, marking the cut with "...".
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let total = d.as_secs();
    let (hours, mins, secs) = (total / 3600, total / 60 % 60, total % 60);
    match (hours, mins) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, m) => format!("{}m {:02}s", m, secs),
        (h, m) => format!("{}h {:02}m {:02}s", h, m, secs),
    }
}
