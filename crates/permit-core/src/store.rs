//! The `ReferenceIndex` and `PermitTable` traits.
//!
//! Backends (e.g. `permit-store-sqlite`, or [`crate::memory::MemoryStore`]
//! in tests) implement these. The reconciliation engine depends only on the
//! traits, never on SQL.

use std::future::Future;

use crate::{
  geometry::Geometry,
  permit::{ManualOverride, PermitRecord},
  reference::{AddressPoint, Parcel},
};

// ─── Reference data ──────────────────────────────────────────────────────────

/// Read-only lookups over the authoritative address points and parcels.
///
/// "No match" is an empty result, never an error. Errors are reserved for
/// backend faults.
pub trait ReferenceIndex: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Verbatim lookup of a full address. When several points share the
  /// address, the one with the lowest parcel id is returned.
  fn find_by_exact_address<'a>(
    &'a self,
    address: &'a str,
  ) -> impl Future<Output = Result<Option<AddressPoint>, Self::Error>> + Send + 'a;

  /// Address points whose full address matches a `LIKE` pattern
  /// (case-insensitive), ordered by address length in characters then
  /// address.
  fn find_by_fuzzy_pattern<'a>(
    &'a self,
    pattern: &'a str,
  ) -> impl Future<Output = Result<Vec<AddressPoint>, Self::Error>> + Send + 'a;

  fn find_by_parcel_id<'a>(
    &'a self,
    parcel_id: &'a str,
  ) -> impl Future<Output = Result<Option<Parcel>, Self::Error>> + Send + 'a;

  /// Parcels whose polygon shares at least one point with `geometry`,
  /// ordered by parcel id. Parcels without a polygon never match.
  fn parcels_intersecting<'a>(
    &'a self,
    geometry: &'a Geometry,
  ) -> impl Future<Output = Result<Vec<Parcel>, Self::Error>> + Send + 'a;
}

// ─── Permit tables ───────────────────────────────────────────────────────────

/// Access to the permit tables being reconciled.
pub trait PermitTable: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Check that `table` exists and carries every column in
  /// [`REQUIRED_COLUMNS`](crate::permit::REQUIRED_COLUMNS), adding the
  /// reconciliation columns if they are missing. Must be idempotent.
  fn prepare_table<'a>(
    &'a self,
    table: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// All records of `table`, ordered by permit number.
  fn load_permits<'a>(
    &'a self,
    table: &'a str,
  ) -> impl Future<Output = Result<Vec<PermitRecord>, Self::Error>> + Send + 'a;

  /// Write back the mutable fields of `records`, matched by permit number,
  /// in one transaction. Returns the number of rows updated.
  fn save_permits<'a>(
    &'a self,
    table: &'a str,
    records: &'a [PermitRecord],
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Manual overrides registered for `table`, ordered by permit number.
  fn overrides<'a>(
    &'a self,
    table: &'a str,
  ) -> impl Future<Output = Result<Vec<ManualOverride>, Self::Error>> + Send + 'a;
}

/// Whether `name` is usable as a permit table identifier: an ASCII letter or
/// underscore followed by letters, digits or underscores.
pub fn is_valid_table_name(name: &str) -> bool {
  let mut chars = name.chars();
  matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
  use super::is_valid_table_name;

  #[test]
  fn table_names() {
    assert!(is_valid_table_name("permits_2024"));
    assert!(is_valid_table_name("_staging"));
    assert!(!is_valid_table_name(""));
    assert!(!is_valid_table_name("2024_permits"));
    assert!(!is_valid_table_name("permits; DROP TABLE parcels"));
  }
}
