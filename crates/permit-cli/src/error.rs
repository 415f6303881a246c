//! Error type for the `permits` runner.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  #[error(transparent)]
  Reconcile(#[from] permit_recon::Error),

  #[error("failed to write report {path:?}: {source}")]
  Report {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("no permit tables to reconcile; set `tables` or pass --table")]
  NoTables,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
