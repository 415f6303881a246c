//! Error type for `permit-recon`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A `PermitTable` or `ReferenceIndex` backend failed.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("core error: {0}")]
  Core(#[from] permit_core::Error),

  #[error("address normalizer error: {0}")]
  Address(#[from] permit_address::Error),

  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),
}

impl Error {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
