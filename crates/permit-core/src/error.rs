//! Error types for `permit-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown permit table: {0}")]
  UnknownTable(String),

  #[error("invalid permit table name: {0:?}")]
  InvalidTableName(String),

  #[error("permit table {table:?} is missing required column {column:?}")]
  MissingColumn { table: String, column: String },

  #[error("unknown repair state: {0:?}")]
  UnknownState(String),

  #[error("unknown match strategy: {0:?}")]
  UnknownStrategy(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
