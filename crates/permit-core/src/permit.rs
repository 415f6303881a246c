//! Permit records and their repair lifecycle.
//!
//! A permit row starts out `Unjoined` and is advanced one state per pass by
//! the repair pipeline until it is either `Resolved` (a geocode whose parcel
//! holds the record's point) or explicitly `Unresolved`.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::geometry::Point;

/// Columns every permit table must carry before it can be reconciled.
pub const REQUIRED_COLUMNS: [&str; 6] =
  ["permit_number", "address", "geocode", "dwellings", "permit_type", "notes"];

// ─── Repair state ────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RepairState {
  #[default]
  Unjoined,
  AddressRepaired,
  GeocodeRepaired,
  SpatiallyRepaired,
  Resolved,
  Unresolved,
}

impl RepairState {
  /// `Resolved` and `Unresolved` end a run; every other state is advanced by
  /// the next pass.
  pub fn is_terminal(self) -> bool { matches!(self, Self::Resolved | Self::Unresolved) }
}

// ─── Match strategy ──────────────────────────────────────────────────────────

/// The waterfall step that produced a record's final join.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchStrategy {
  ExactAddress,
  FuzzyAddress,
  ExactGeocode,
  /// The geocode was rewritten to its condominium parent parcel.
  CondoGeocode,
  SpatialFallback,
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// One row of a permit table.
///
/// Only `address`, `geocode`, `geometry`, `note`, `state` and `resolved_by`
/// are ever rewritten; the other fields are source data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermitRecord {
  /// Unique within its table.
  pub permit_number: String,
  /// Free text as exported by the permitting system; may be empty.
  pub address:       String,
  /// Parcel identifier; may be empty.
  pub geocode:       String,
  pub dwellings:     u32,
  pub permit_type:   String,
  pub geometry:      Option<Point>,
  pub note:          Option<String>,
  #[serde(default)]
  pub state:         RepairState,
  pub resolved_by:   Option<MatchStrategy>,
}

impl PermitRecord {
  pub fn new(
    permit_number: impl Into<String>,
    address: impl Into<String>,
    geocode: impl Into<String>,
  ) -> Self {
    Self {
      permit_number: permit_number.into(),
      address:       address.into(),
      geocode:       geocode.into(),
      dwellings:     0,
      permit_type:   String::new(),
      geometry:      None,
      note:          None,
      state:         RepairState::Unjoined,
      resolved_by:   None,
    }
  }

  pub fn with_dwellings(mut self, dwellings: u32) -> Self {
    self.dwellings = dwellings;
    self
  }

  pub fn with_permit_type(mut self, code: impl Into<String>) -> Self {
    self.permit_type = code.into();
    self
  }

  pub fn with_geometry(mut self, point: Point) -> Self {
    self.geometry = Some(point);
    self
  }

  /// Append `entry` to the resolution note, separated by `"; "`.
  ///
  /// An entry already present is not repeated, so replaying a correction
  /// leaves the note unchanged.
  pub fn push_note(&mut self, entry: &str) {
    if let Some(note) = self.note.as_mut().filter(|n| !n.is_empty()) {
      if !note.split("; ").any(|e| e == entry) {
        note.push_str("; ");
        note.push_str(entry);
      }
    } else {
      self.note = Some(entry.to_owned());
    }
  }

  /// Individual entries of the resolution note.
  pub fn note_entries(&self) -> impl Iterator<Item = &str> {
    self.note.as_deref().into_iter().flat_map(|n| n.split("; "))
  }
}

/// A hand-maintained correction for a permit the automatic passes cannot
/// fix. Absent fields leave the record's value untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualOverride {
  pub permit_number: String,
  pub address:       Option<String>,
  pub geocode:       Option<String>,
}
