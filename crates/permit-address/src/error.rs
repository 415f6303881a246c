//! Error types for the address normalizer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("no street suffix in address {0:?}")]
  MissingSuffix(String),

  #[error("no house number in address {0:?}")]
  MissingHouseNumber(String),

  #[error("no street name in address {0:?}")]
  MissingStreetName(String),

  #[error("street suffix table is empty")]
  EmptySuffixTable,

  #[error("invalid street suffix {0:?}")]
  InvalidSuffix(String),

  #[error("suffix pattern error: {0}")]
  Pattern(#[from] regex::Error),
}

impl Error {
  /// Whether the error describes the input address rather than the
  /// normalizer's configuration.
  pub fn is_unparsable(&self) -> bool {
    matches!(
      self,
      Self::MissingSuffix(_) | Self::MissingHouseNumber(_) | Self::MissingStreetName(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
