//! Reconciliation settings.
//!
//! Every knob the pipeline consults lives here and is passed in explicitly;
//! nothing is read from global state.

use permit_address::DEFAULT_SUFFIXES;
use permit_core::permit_type::PermitTypeCatalog;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── ReconcileConfig ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
  /// Whole-token street suffixes the address normalizer recognises.
  pub street_suffixes: Vec<String>,
  pub condo:           CondoRule,
  /// Ceiling on repair passes per table.
  pub max_passes:      usize,
  /// Permit-type code to label map used by the report.
  pub permit_types:    PermitTypeCatalog,
}

impl Default for ReconcileConfig {
  fn default() -> Self {
    Self {
      street_suffixes: DEFAULT_SUFFIXES.iter().map(|s| (*s).to_owned()).collect(),
      condo:           CondoRule::default(),
      max_passes:      8,
      permit_types:    PermitTypeCatalog::default(),
    }
  }
}

impl ReconcileConfig {
  /// Reject settings that would make a run meaningless.
  pub fn validate(&self) -> Result<()> {
    if self.max_passes == 0 {
      return Err(Error::Config("max_passes must be at least 1".into()));
    }
    if self.street_suffixes.is_empty() {
      return Err(Error::Config("street_suffixes must not be empty".into()));
    }
    self.condo.validate()
  }
}

// ─── Condo rule ──────────────────────────────────────────────────────────────

/// Condominium units carry their own geocode while the reference layer only
/// holds the parent parcel, whose code ends in zeros. Canonicalization
/// replaces a unit code's trailing digits with zeros.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CondoRule {
  /// How many trailing digits identify the unit.
  pub zeroed_digits: usize,
  /// When non-empty, only geocodes starting with one of these prefixes are
  /// canonicalized.
  pub prefixes:      Vec<String>,
}

impl Default for CondoRule {
  fn default() -> Self { Self { zeroed_digits: 3, prefixes: Vec::new() } }
}

impl CondoRule {
  fn validate(&self) -> Result<()> {
    if self.zeroed_digits == 0 {
      return Err(Error::Config("condo.zeroed_digits must be at least 1".into()));
    }
    Ok(())
  }

  /// The parent-parcel code for `geocode`, or `None` when the rule does not
  /// apply (too short, non-numeric tail, already canonical, or outside the
  /// configured prefixes).
  pub fn canonicalize(&self, geocode: &str) -> Option<String> {
    let geocode = geocode.trim();
    if self.zeroed_digits == 0 || geocode.len() <= self.zeroed_digits {
      return None;
    }
    if !self.prefixes.is_empty() && !self.prefixes.iter().any(|p| geocode.starts_with(p.as_str())) {
      return None;
    }

    let split = geocode.len() - self.zeroed_digits;
    let (head, tail) = (geocode.get(..split)?, geocode.get(split..)?);
    if !tail.bytes().all(|b| b.is_ascii_digit()) || tail.bytes().all(|b| b == b'0') {
      return None;
    }
    Some(format!("{head}{}", "0".repeat(self.zeroed_digits)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn condo_codes_zero_their_tail() {
    let rule = CondoRule::default();
    assert_eq!(
      rule.canonicalize("042200142100123").as_deref(),
      Some("042200142100000")
    );
    assert_eq!(rule.canonicalize("042200142100000"), None);
    assert_eq!(rule.canonicalize("0422001421001AB"), None);
    assert_eq!(rule.canonicalize("123"), None);
    assert_eq!(rule.canonicalize(""), None);
  }

  #[test]
  fn condo_prefixes_limit_scope() {
    let rule = CondoRule { zeroed_digits: 3, prefixes: vec!["0422".into()] };
    assert!(rule.canonicalize("042200142100123").is_some());
    assert!(rule.canonicalize("990000000000123").is_none());
  }

  #[test]
  fn validation() {
    assert!(ReconcileConfig::default().validate().is_ok());

    let cfg = ReconcileConfig { max_passes: 0, ..Default::default() };
    assert!(matches!(cfg.validate(), Err(Error::Config(_))));

    let cfg = ReconcileConfig { street_suffixes: vec![], ..Default::default() };
    assert!(matches!(cfg.validate(), Err(Error::Config(_))));

    let cfg = ReconcileConfig {
      condo: CondoRule { zeroed_digits: 0, prefixes: vec![] },
      ..Default::default()
    };
    assert!(matches!(cfg.validate(), Err(Error::Config(_))));
  }

  #[test]
  fn partial_settings_keep_defaults() {
    let cfg: ReconcileConfig =
      serde_json::from_str(r#"{ "max_passes": 3, "condo": { "prefixes": ["04"] } }"#).unwrap();
    assert_eq!(cfg.max_passes, 3);
    assert_eq!(cfg.condo.zeroed_digits, 3);
    assert_eq!(cfg.condo.prefixes, ["04"]);
    assert_eq!(cfg.street_suffixes.len(), DEFAULT_SUFFIXES.len());
    assert_eq!(cfg.permit_types.label("BNSFR"), "New Single Family Residence");
  }

  #[test]
  fn permit_type_codes_survive_key_folding() {
    let cfg: ReconcileConfig =
      serde_json::from_str(r#"{ "permit_types": { "bnsfr": "Single family" } }"#).unwrap();
    assert_eq!(cfg.permit_types.label("BNSFR"), "Single family");
  }
}
