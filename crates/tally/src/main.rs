//! # tally
//!
//! Maintenance binary for a tally database: schema patching, bulk
//! migration between databases, inspection and one-off retention cleanup.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tally_core::TracingReporter;
use tally_settings::{DatabaseSettings, TallySettings};
use tally_store::sqlite::verify_pragmas;
use tally_store::{BatchMigrator, ConnectionConfig, Database, DbSource, queries, transactions};
use tally_tasks::{Priority, TaskProcessor};

/// tally storage maintenance.
#[derive(Parser, Debug)]
#[command(name = "tally", about = "tally storage maintenance")]
struct Cli {
    /// Settings file (defaults to `~/.tally/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Create missing tables and apply pending schema patches.
    Patch {
        /// Database file (defaults to the configured path).
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Copy every table from one database into another, replacing its contents.
    Migrate {
        /// Source database file.
        #[arg(long)]
        from: PathBuf,
        /// Destination database file.
        #[arg(long)]
        to: PathBuf,
        /// Rows per destination transaction.
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Print applied patches and table row counts.
    Info {
        /// Database file (defaults to the configured path).
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Remove players inactive longer than the retention window.
    Cleanup {
        /// Database file (defaults to the configured path).
        #[arg(long)]
        db: Option<PathBuf>,
        /// Retention window in days (defaults to the configured value).
        #[arg(long)]
        keep_days: Option<u64>,
    },
}

fn load_settings(path: Option<&Path>) -> Result<TallySettings> {
    let path = path.map_or_else(tally_settings::settings_path, Path::to_path_buf);
    tally_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn open(settings: &DatabaseSettings, path: Option<&Path>) -> Result<Database> {
    let source = match path {
        Some(path) => DbSource::File(path.to_path_buf()),
        None => DbSource::from_settings(settings),
    };
    let label = source.to_string();
    Database::open(source, ConnectionConfig::from(settings), Arc::new(TracingReporter))
        .with_context(|| format!("Failed to open database {label}"))
}

fn patch(settings: &TallySettings, db: Option<&Path>) -> Result<()> {
    let db = open(&settings.database, db)?;
    let summary = db.patch_summary();
    println!(
        "{}: {} applied, {} already present",
        db.source(),
        summary.applied.len(),
        summary.skipped.len()
    );
    for name in &summary.applied {
        println!("  applied {name}");
    }
    db.close();
    Ok(())
}

fn migrate(settings: &TallySettings, from: &Path, to: &Path, batch_size: Option<usize>) -> Result<()> {
    if from == to {
        bail!("source and destination are the same file: {}", from.display());
    }
    let source = open(&settings.database, Some(from))?;
    let destination = open(&settings.database, Some(to))?;
    let batch_size = batch_size.unwrap_or(settings.data.migration_batch_size);

    let summary = BatchMigrator::new(&source, &destination)
        .with_batch_size(batch_size)
        .run()
        .context("Migration failed")?;
    for table in &summary.tables {
        println!("{:<22} {:>8} rows in {} batches", table.table, table.rows, table.batches);
    }
    println!("{} rows copied", summary.total_rows());
    source.close();
    destination.close();
    Ok(())
}

fn info(settings: &TallySettings, db: Option<&Path>) -> Result<()> {
    let db = open(&settings.database, db)?;
    let applied = db
        .with_connection(tally_store::patches::applied_patches)
        .context("Failed to read applied patches")?;
    println!("database: {}", db.source());
    println!("{}", pragma_line(&db)?);
    println!("patches:");
    for name in applied {
        println!("  {name}");
    }
    println!("rows:");
    for (table, rows) in db.query(&queries::row_counts()).context("Failed to count rows")? {
        println!("  {table:<22} {rows:>8}");
    }
    db.close();
    Ok(())
}

fn pragma_line(db: &Database) -> Result<String> {
    let pragmas = db
        .with_connection(verify_pragmas)
        .context("Failed to read connection pragmas")?;
    Ok(format!(
        "journal_mode: {} foreign_keys: {}",
        pragmas.journal_mode,
        if pragmas.foreign_keys_enabled { "on" } else { "off" }
    ))
}

fn cleanup(settings: &TallySettings, db: Option<&Path>, keep_days: Option<u64>) -> Result<()> {
    let db = open(&settings.database, db)?;
    let mut data = settings.data.clone();
    if let Some(days) = keep_days {
        data.keep_inactive_players_days = days;
    }
    let before = db.query(&queries::user_count())?;

    let tasks =
        TaskProcessor::from_settings(&settings.tasks).context("Failed to start task processor")?;
    let now = chrono::Utc::now().timestamp_millis();
    let handle = tasks.submit_transaction(
        Priority::Critical,
        &db,
        transactions::remove_old_players(now, data.keep_inactive()),
    );
    let outcome = handle.wait();
    let _ = tasks.shutdown();
    let _ = outcome.context("Cleanup failed")?;

    let after = db.query(&queries::user_count())?;
    println!("removed {} inactive players, {after} remain", before - after);
    db.close();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_deref())?;
    tally_core::logging::init_subscriber(&settings.logging.level);
    tracing::debug!(command = ?cli.command, "starting");

    match &cli.command {
        Command::Patch { db } => patch(&settings, db.as_deref()),
        Command::Migrate { from, to, batch_size } => migrate(&settings, from, to, *batch_size),
        Command::Info { db } => info(&settings, db.as_deref()),
        Command::Cleanup { db, keep_days } => cleanup(&settings, db.as_deref(), *keep_days),
    }
}
