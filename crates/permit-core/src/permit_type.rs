//! Permit-type code dictionary.
//!
//! Permitting systems export terse codes (`BNSFR`, `BNMRB`, ...). The catalog
//! maps them to human-readable labels for reporting. It is plain
//! configuration: the default covers the residential, commercial and public
//! building codes, and deployments can replace or extend it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label used for records whose type code is blank.
pub const UNSPECIFIED_LABEL: &str = "None specified";

const DEFAULT_CODES: &[(&str, &str)] = &[
  // residential
  ("BNMRA", "New Multifamily 3-4 Units"),
  ("BNMRB", "New Multifamily 5+ Units"),
  ("BNCON", "New Other"),
  ("BNRDX", "New Duplex"),
  ("BNSFR", "New Single Family Residence"),
  ("BNSFT", "New Single Family Townhouse"),
  ("BNROS", "New Shelter/Dorm/Etc"),
  // commercial
  ("BNCOP", "New Office/Bank/Professional Building"),
  ("BNCSC", "New Store/Customer Service"),
  ("BNCSS", "New Service Station/Repair Garage"),
  ("BNCID", "New Industrial"),
  ("BNRHM", "New Hotel/Motel/Cabin"),
  ("BO/S/C", "Other Commercial"),
  // public
  ("BNCCR", "New Church/Religious Building"),
  ("BNCHI", "New Hospital/Institution"),
  ("BNCPG", "New Parking Garage"),
  ("BNCPW", "New Public Works Facility"),
  ("BNCSE", "New Education"),
  ("BNCSR", "New Recreation"),
];

/// Codes are case-insensitive: they are stored and looked up upper-cased, so
/// a configuration layer that folds map keys to lower case loses nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct PermitTypeCatalog {
  labels: BTreeMap<String, String>,
}

impl PermitTypeCatalog {
  pub fn new(labels: BTreeMap<String, String>) -> Self {
    let labels = labels
      .into_iter()
      .map(|(code, label)| (code.trim().to_ascii_uppercase(), label))
      .collect();
    Self { labels }
  }

  /// Human-readable label for `code`. Blank codes (and the literal `None`
  /// some exports write) map to [`UNSPECIFIED_LABEL`]; unknown codes are
  /// returned as-is.
  pub fn label<'a>(&'a self, code: &'a str) -> &'a str {
    let code = code.trim();
    if code.is_empty() || code == "None" {
      return UNSPECIFIED_LABEL;
    }
    self.labels.get(&code.to_ascii_uppercase()).map(String::as_str).unwrap_or(code)
  }

  pub fn len(&self) -> usize { self.labels.len() }

  pub fn is_empty(&self) -> bool { self.labels.is_empty() }
}

impl From<BTreeMap<String, String>> for PermitTypeCatalog {
  fn from(labels: BTreeMap<String, String>) -> Self { Self::new(labels) }
}

impl From<PermitTypeCatalog> for BTreeMap<String, String> {
  fn from(catalog: PermitTypeCatalog) -> Self { catalog.labels }
}

impl Default for PermitTypeCatalog {
  fn default() -> Self {
    Self::new(
      DEFAULT_CODES
        .iter()
        .map(|(code, label)| ((*code).to_owned(), (*label).to_owned()))
        .collect(),
    )
  }
}
