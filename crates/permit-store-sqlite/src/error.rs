//! Error type for `permit-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] permit_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// A geometry column held text that is not a WKT point or polygon.
  #[error("malformed WKT: {0:?}")]
  Wkt(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
