//! `permits`: reconcile permit tables against the address-point and parcel
//! layers.
//!
//! Reads `permits.toml` (or the path given with `--config`), opens the SQLite
//! store and reconciles each configured table in turn, printing a summary per
//! table.
//!
//! ```text
//! permits --config permits.toml --table permits_2016 --report-dir reports/
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use permit_cli::{RunConfig, reconcile_tables};
use permit_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Permit address reconciliation")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "permits.toml")]
  config: PathBuf,

  /// Table to reconcile; repeatable. Replaces `tables` from the config.
  #[arg(short, long = "table")]
  tables: Vec<String>,

  /// Directory for `<table>_reconciliation.csv` reports.
  #[arg(long)]
  report_dir: Option<PathBuf>,

  /// Print each report as JSON instead of text.
  #[arg(long)]
  json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let mut run = RunConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;
  if !cli.tables.is_empty() {
    run.tables = cli.tables;
  }
  if cli.report_dir.is_some() {
    run.report_dir = cli.report_dir;
  }

  let store_path = expand_tilde(&run.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let report_dir = run.report_dir.as_deref().map(expand_tilde);
  if let Some(dir) = &report_dir {
    std::fs::create_dir_all(dir)
      .with_context(|| format!("failed to create report directory {dir:?}"))?;
  }

  let outcomes = reconcile_tables(&store, &run.tables, &run.reconcile, report_dir.as_deref())
    .await
    .context("reconciliation failed")?;

  for outcome in &outcomes {
    if cli.json {
      println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    } else {
      print!("{}", outcome.report);
      if !outcome.converged {
        println!("  pass ceiling reached after {} passes", outcome.passes);
      }
    }
  }

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
