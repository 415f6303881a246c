//! [`MemoryStore`], an in-process backend for both store traits.
//!
//! Used by engine tests and by callers that assemble reference data
//! themselves. Lookups are linear scans; it is not meant for production-sized
//! reference layers.

use std::{
  collections::BTreeMap,
  sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
  Error, Result,
  geometry::Geometry,
  permit::{ManualOverride, PermitRecord},
  reference::{AddressPoint, Parcel, like_matches},
  store::{PermitTable, ReferenceIndex, is_valid_table_name},
};

#[derive(Debug, Default)]
struct Tables {
  permits:   BTreeMap<String, BTreeMap<String, PermitRecord>>,
  overrides: BTreeMap<String, BTreeMap<String, ManualOverride>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
  address_points: RwLock<Vec<AddressPoint>>,
  parcels:        RwLock<BTreeMap<String, Parcel>>,
  tables:         RwLock<Tables>,
}

// A panic while holding a lock cannot leave these collections half-written,
// so poisoning is ignored.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
  lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
  lock.write().unwrap_or_else(|e| e.into_inner())
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  pub fn add_address_point(&self, point: AddressPoint) {
    write(&self.address_points).push(point);
  }

  /// Insert or replace a parcel.
  pub fn add_parcel(&self, parcel: Parcel) {
    write(&self.parcels).insert(parcel.parcel_id.clone(), parcel);
  }

  /// Create `table` if needed and insert (or replace) `records` by permit
  /// number.
  pub fn insert_permits(
    &self,
    table: &str,
    records: impl IntoIterator<Item = PermitRecord>,
  ) {
    let mut tables = write(&self.tables);
    let rows = tables.permits.entry(table.to_owned()).or_default();
    for record in records {
      rows.insert(record.permit_number.clone(), record);
    }
  }

  pub fn add_override(&self, table: &str, ov: ManualOverride) {
    write(&self.tables)
      .overrides
      .entry(table.to_owned())
      .or_default()
      .insert(ov.permit_number.clone(), ov);
  }

  /// Snapshot of `table`, ordered by permit number. Empty if unknown.
  pub fn permits(&self, table: &str) -> Vec<PermitRecord> {
    read(&self.tables)
      .permits
      .get(table)
      .map(|rows| rows.values().cloned().collect())
      .unwrap_or_default()
  }

  fn check_table(&self, table: &str) -> Result<()> {
    if !is_valid_table_name(table) {
      return Err(Error::InvalidTableName(table.to_owned()));
    }
    if !read(&self.tables).permits.contains_key(table) {
      return Err(Error::UnknownTable(table.to_owned()));
    }
    Ok(())
  }

  fn exact_address(&self, address: &str) -> Option<AddressPoint> {
    read(&self.address_points)
      .iter()
      .filter(|p| p.full_address == address)
      .min_by(|a, b| a.parcel_id.cmp(&b.parcel_id))
      .cloned()
  }

  fn fuzzy(&self, pattern: &str) -> Vec<AddressPoint> {
    let mut hits: Vec<AddressPoint> = read(&self.address_points)
      .iter()
      .filter(|p| like_matches(pattern, &p.full_address))
      .cloned()
      .collect();
    hits.sort_by(|a, b| {
      a.full_address
        .chars()
        .count()
        .cmp(&b.full_address.chars().count())
        .then_with(|| a.full_address.cmp(&b.full_address))
        .then_with(|| a.parcel_id.cmp(&b.parcel_id))
    });
    hits
  }

  fn intersecting(&self, geometry: &Geometry) -> Vec<Parcel> {
    read(&self.parcels)
      .values()
      .filter(|parcel| {
        parcel
          .geometry
          .as_ref()
          .is_some_and(|poly| geometry.intersects_polygon(poly))
      })
      .cloned()
      .collect()
  }

  fn save(&self, table: &str, records: &[PermitRecord]) -> Result<usize> {
    self.check_table(table)?;
    let mut tables = write(&self.tables);
    let Some(rows) = tables.permits.get_mut(table) else {
      return Err(Error::UnknownTable(table.to_owned()));
    };

    let mut updated = 0;
    for record in records {
      if let Some(row) = rows.get_mut(&record.permit_number) {
        row.address = record.address.clone();
        row.geocode = record.geocode.clone();
        row.geometry = record.geometry;
        row.note = record.note.clone();
        row.state = record.state;
        row.resolved_by = record.resolved_by;
        updated += 1;
      }
    }
    Ok(updated)
  }
}

impl ReferenceIndex for MemoryStore {
  type Error = Error;

  async fn find_by_exact_address(&self, address: &str) -> Result<Option<AddressPoint>> {
    Ok(self.exact_address(address))
  }

  async fn find_by_fuzzy_pattern(&self, pattern: &str) -> Result<Vec<AddressPoint>> {
    Ok(self.fuzzy(pattern))
  }

  async fn find_by_parcel_id(&self, parcel_id: &str) -> Result<Option<Parcel>> {
    Ok(read(&self.parcels).get(parcel_id).cloned())
  }

  async fn parcels_intersecting(&self, geometry: &Geometry) -> Result<Vec<Parcel>> {
    Ok(self.intersecting(geometry))
  }
}

impl PermitTable for MemoryStore {
  type Error = Error;

  async fn prepare_table(&self, table: &str) -> Result<()> { self.check_table(table) }

  async fn load_permits(&self, table: &str) -> Result<Vec<PermitRecord>> {
    self.check_table(table)?;
    Ok(self.permits(table))
  }

  async fn save_permits(&self, table: &str, records: &[PermitRecord]) -> Result<usize> {
    self.save(table, records)
  }

  async fn overrides(&self, table: &str) -> Result<Vec<ManualOverride>> {
    self.check_table(table)?;
    Ok(
      read(&self.tables)
        .overrides
        .get(table)
        .map(|ovs| ovs.values().cloned().collect())
        .unwrap_or_default(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::{Point, Polygon};

  fn store() -> MemoryStore {
    let store = MemoryStore::new();
    for (addr, parcel, x) in [
      ("1611 RAYMOND AVE", "P1", 1.0),
      ("1611 N RAYMOND AVE", "P2", 2.0),
      ("1611 RAYMOND AVE", "P0", 3.0),
    ] {
      store.add_address_point(AddressPoint {
        full_address: addr.into(),
        parcel_id:    parcel.into(),
        geometry:     Point::new(x, 0.5),
      });
    }
    store.add_parcel(Parcel {
      parcel_id: "B".into(),
      geometry:  Some(Polygon::from_exterior(vec![
        Point::new(0.0, 0.0),
        Point::new(2.0, 0.0),
        Point::new(2.0, 2.0),
        Point::new(0.0, 2.0),
      ])),
    });
    store.add_parcel(Parcel {
      parcel_id: "A".into(),
      geometry:  Some(Polygon::from_exterior(vec![
        Point::new(1.0, 0.0),
        Point::new(3.0, 0.0),
        Point::new(3.0, 2.0),
        Point::new(1.0, 2.0),
      ])),
    });
    store.add_parcel(Parcel { parcel_id: "C".into(), geometry: None });
    store
  }

  #[tokio::test]
  async fn exact_lookup_prefers_lowest_parcel_id() {
    let s = store();
    let hit = s.find_by_exact_address("1611 RAYMOND AVE").await.unwrap().unwrap();
    assert_eq!(hit.parcel_id, "P0");
    assert!(s.find_by_exact_address("1611 raymond ave").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn fuzzy_lookup_orders_by_length_then_text() {
    let s = store();
    let hits = s.find_by_fuzzy_pattern("1611 %raymond%").await.unwrap();
    let addrs: Vec<_> = hits.iter().map(|h| h.full_address.as_str()).collect();
    assert_eq!(addrs, ["1611 RAYMOND AVE", "1611 RAYMOND AVE", "1611 N RAYMOND AVE"]);
  }

  #[tokio::test]
  async fn fuzzy_lookup_measures_length_in_characters() {
    let s = MemoryStore::new();
    for addr in ["9 ELMS ST", "9 ÉLM ST"] {
      s.add_address_point(AddressPoint {
        full_address: addr.into(),
        parcel_id:    addr.into(),
        geometry:     Point::new(0.0, 0.0),
      });
    }
    let hits = s.find_by_fuzzy_pattern("9 %LM%").await.unwrap();
    let addrs: Vec<_> = hits.iter().map(|h| h.full_address.as_str()).collect();
    assert_eq!(addrs, ["9 ÉLM ST", "9 ELMS ST"]);
  }

  #[tokio::test]
  async fn intersecting_parcels_sorted_by_id() {
    let s = store();
    let hits = s
      .parcels_intersecting(&Geometry::Point(Point::new(1.5, 1.0)))
      .await
      .unwrap();
    let ids: Vec<_> = hits.iter().map(|p| p.parcel_id.as_str()).collect();
    assert_eq!(ids, ["A", "B"]);
  }

  #[tokio::test]
  async fn unknown_and_invalid_tables_are_rejected() {
    let s = store();
    assert!(matches!(
      s.prepare_table("permits").await,
      Err(Error::UnknownTable(_))
    ));
    assert!(matches!(
      s.prepare_table("bad name").await,
      Err(Error::InvalidTableName(_))
    ));
  }

  #[tokio::test]
  async fn save_touches_only_mutable_fields_of_known_rows() {
    let s = store();
    s.insert_permits("permits", [PermitRecord::new("1", "A ST", "").with_dwellings(4)]);

    let mut changed = PermitRecord::new("1", "B ST", "G1");
    changed.dwellings = 99;
    let ghost = PermitRecord::new("2", "C ST", "");

    let n = s.save_permits("permits", &[changed, ghost]).await.unwrap();
    assert_eq!(n, 1);

    let rows = s.load_permits("permits").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].address, "B ST");
    assert_eq!(rows[0].geocode, "G1");
    assert_eq!(rows[0].dwellings, 4);
  }
}
