//! Batch runner for permit reconciliation.
//!
//! The binary (`src/main.rs`) parses arguments, loads [`RunConfig`] and opens
//! the SQLite store; [`reconcile_tables`] does the rest and works against any
//! backend.

pub mod error;

use std::{
  fs::File,
  path::{Path, PathBuf},
};

use permit_core::store::{PermitTable, ReferenceIndex};
use permit_recon::{PipelineOutcome, ReconcileConfig, RepairPipeline};
use serde::Deserialize;
use tracing::info;

pub use error::{Error, Result};

/// Prefix of environment variables overriding the configuration file, e.g.
/// `PERMITS__RECONCILE__MAX_PASSES=12`.
pub const ENV_PREFIX: &str = "PERMITS";

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
  /// SQLite database holding the reference layers and permit tables.
  pub store_path: PathBuf,
  /// Permit tables to reconcile, in order.
  #[serde(default)]
  pub tables:     Vec<String>,
  /// Where `<table>_reconciliation.csv` files are written, if anywhere.
  #[serde(default)]
  pub report_dir: Option<PathBuf>,
  #[serde(default)]
  pub reconcile:  ReconcileConfig,
}

impl RunConfig {
  /// Layer `PERMITS__*` environment variables over the optional TOML file at
  /// `path`.
  pub fn load(path: &Path) -> Result<Self> { Self::load_with(path, environment()) }

  fn load_with(path: &Path, env: config::Environment) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(env)
      .build()?;
    Ok(settings.try_deserialize()?)
  }
}

/// `PERMITS__*` variables; list-valued settings take comma-separated values.
fn environment() -> config::Environment {
  config::Environment::with_prefix(ENV_PREFIX)
    .separator("__")
    .list_separator(",")
    .with_list_parse_key("tables")
    .with_list_parse_key("reconcile.street_suffixes")
    .with_list_parse_key("reconcile.condo.prefixes")
    .try_parsing(true)
}

// ─── Running ─────────────────────────────────────────────────────────────────

/// Path of the CSV report for `table` inside `dir`.
pub fn report_path(dir: &Path, table: &str) -> PathBuf {
  dir.join(format!("{table}_reconciliation.csv"))
}

/// Reconcile `tables` one after another. Each table is fully converged and
/// persisted before the next starts; the first fatal error stops the batch.
pub async fn reconcile_tables<S>(
  store: &S,
  tables: &[String],
  config: &ReconcileConfig,
  report_dir: Option<&Path>,
) -> Result<Vec<PipelineOutcome>>
where
  S: ReferenceIndex + PermitTable,
{
  if tables.is_empty() {
    return Err(Error::NoTables);
  }
  let pipeline = RepairPipeline::new(store, store, config)?;

  let mut outcomes = Vec::with_capacity(tables.len());
  for table in tables {
    let outcome = pipeline.run(table).await?;
    if let Some(dir) = report_dir {
      let path = report_path(dir, table);
      let file = File::create(&path).map_err(|source| Error::Report { path: path.clone(), source })?;
      outcome.report.write_csv(file)?;
      info!(table, path = %path.display(), "wrote reconciliation report");
    }
    outcomes.push(outcome);
  }
  Ok(outcomes)
}
