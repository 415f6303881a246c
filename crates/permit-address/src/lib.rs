//! Street-address normalizer for permit exports.
//!
//! Reduces a free-text address such as `"1611-1613 Raymond Ave N"` to the
//! `(house number, street name, suffix)` triple used for fuzzy matching
//! against authoritative address points. Pure and synchronous.
//!
//! # Quick start
//!
//! ```
//! use permit_address::AddressNormalizer;
//!
//! let normalizer = AddressNormalizer::new(permit_address::DEFAULT_SUFFIXES)?;
//! let parsed = normalizer.parse("1611-1613 Raymond Ave")?;
//! assert_eq!(parsed.like_pattern(), "1611 %RAYMOND%");
//! # Ok::<(), permit_address::Error>(())
//! ```

pub mod error;
mod parse;

use std::fmt;

pub use error::{Error, Result};
use regex::Regex;

/// Street suffixes recognised when no explicit table is configured.
pub const DEFAULT_SUFFIXES: &[&str] =
  &["AVE", "ST", "RD", "WAY", "DR", "LN", "CT", "PL", "BLVD", "LP", "RISE"];

// ─── Public types ────────────────────────────────────────────────────────────

/// The normalized components of a street address. All fields are upper-case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
  /// ASCII digits only.
  pub house_number:  String,
  /// Leading zeros stripped (`03RD` becomes `3RD`).
  pub street_name:   String,
  /// One of the normalizer's configured suffixes.
  pub street_suffix: String,
}

impl ParsedAddress {
  /// A `LIKE` pattern matching any full address with this house number
  /// followed later by the street name.
  pub fn like_pattern(&self) -> String {
    format!("{} %{}%", self.house_number, self.street_name)
  }
}

impl fmt::Display for ParsedAddress {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {} {}", self.house_number, self.street_name, self.street_suffix)
  }
}

// ─── Normalizer ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AddressNormalizer {
  suffix: Regex,
}

impl AddressNormalizer {
  /// Build a normalizer recognising `suffixes` (matched case-insensitively,
  /// as whole tokens).
  pub fn new<S: AsRef<str>>(suffixes: &[S]) -> Result<Self> {
    if suffixes.is_empty() {
      return Err(Error::EmptySuffixTable);
    }

    let mut alternatives = Vec::with_capacity(suffixes.len());
    for s in suffixes {
      let s = s.as_ref().trim();
      if s.is_empty() || !s.chars().all(|c| c.is_alphanumeric()) {
        return Err(Error::InvalidSuffix(s.to_owned()));
      }
      alternatives.push(regex::escape(&s.to_uppercase()));
    }

    let suffix = Regex::new(&format!("^(?:{})$", alternatives.join("|")))?;
    Ok(Self { suffix })
  }

  /// Parse `raw` into its components.
  ///
  /// Fails with an error for which [`Error::is_unparsable`] holds when no
  /// suffix, house number or street name can be found.
  pub fn parse(&self, raw: &str) -> Result<ParsedAddress> {
    parse::parse_address(raw, self)
  }

  pub(crate) fn is_suffix(&self, token: &str) -> bool { self.suffix.is_match(token) }
}
