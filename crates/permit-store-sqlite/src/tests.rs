//! Integration tests for `SqliteStore` against in-memory and file-backed
//! databases.

use permit_core::{
  geometry::{Geometry, Point, Polygon},
  permit::{ManualOverride, MatchStrategy, PermitRecord, RepairState},
  reference::{AddressPoint, Parcel},
  store::{PermitTable, ReferenceIndex},
};
use permit_recon::{ReconcileConfig, RepairPipeline};

use crate::{Error, SqliteStore};

const TABLE: &str = "permits_2016";

fn square(parcel_id: &str, x0: f64, y0: f64) -> Parcel {
  Parcel {
    parcel_id: parcel_id.into(),
    geometry:  Some(Polygon::from_exterior(vec![
      Point::new(x0, y0),
      Point::new(x0 + 10.0, y0),
      Point::new(x0 + 10.0, y0 + 10.0),
      Point::new(x0, y0 + 10.0),
      Point::new(x0, y0),
    ])),
  }
}

fn address_point(full_address: &str, parcel_id: &str, x: f64, y: f64) -> AddressPoint {
  AddressPoint {
    full_address: full_address.into(),
    parcel_id:    parcel_id.into(),
    geometry:     Point::new(x, y),
  }
}

async fn store() -> SqliteStore {
  let s = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store");
  s.insert_parcels(&[
    square("P123", 0.0, 0.0),
    square("P555", 20.0, 0.0),
    square("P556", 30.0, 0.0),
    Parcel { parcel_id: "PNULL".into(), geometry: None },
  ])
  .await
  .unwrap();
  s.insert_address_points(&[
    address_point("250 RAYMOND AVE", "P123", 5.0, 5.0),
    address_point("10 ELM ST", "P999", 25.0, 5.0),
    address_point("10 ELM ST", "P555", 25.0, 5.0),
    address_point("10 ELMWOOD ST", "P556", 35.0, 5.0),
  ])
  .await
  .unwrap();
  s.create_permit_table(TABLE).await.unwrap();
  s
}

// ─── Reference lookups ───────────────────────────────────────────────────────

#[tokio::test]
async fn exact_address_prefers_lowest_parcel_id() {
  let s = store().await;
  let hit = s.find_by_exact_address("10 ELM ST").await.unwrap().unwrap();
  assert_eq!(hit.parcel_id, "P555");
  assert!(s.find_by_exact_address("10 elm st").await.unwrap().is_none());
}

#[tokio::test]
async fn fuzzy_pattern_is_case_insensitive_and_shortest_first() {
  let s = store().await;
  let hits = s.find_by_fuzzy_pattern("10 %elm%").await.unwrap();
  let found: Vec<_> = hits.iter().map(|p| (p.full_address.as_str(), p.parcel_id.as_str())).collect();
  assert_eq!(found, [("10 ELM ST", "P555"), ("10 ELM ST", "P999"), ("10 ELMWOOD ST", "P556")]);
  assert!(s.find_by_fuzzy_pattern("99 %ELM%").await.unwrap().is_empty());
}

#[tokio::test]
async fn fuzzy_pattern_measures_length_in_characters() {
  let s = store().await;
  s.insert_address_points(&[
    address_point("9 ELMS ST", "P555", 25.0, 5.0),
    address_point("9 ÉLM ST", "P123", 5.0, 5.0),
  ])
  .await
  .unwrap();
  let hits = s.find_by_fuzzy_pattern("9 %LM%").await.unwrap();
  let found: Vec<_> = hits.iter().map(|p| p.full_address.as_str()).collect();
  assert_eq!(found, ["9 ÉLM ST", "9 ELMS ST"]);
}

#[tokio::test]
async fn parcel_round_trips_through_wkt() {
  let s = store().await;
  let parcel = s.find_by_parcel_id("P555").await.unwrap().unwrap();
  assert_eq!(parcel, square("P555", 20.0, 0.0));

  let null = s.find_by_parcel_id("PNULL").await.unwrap().unwrap();
  assert_eq!(null.geometry, None);
  assert!(s.find_by_parcel_id("P999").await.unwrap().is_none());
}

#[tokio::test]
async fn unreadable_parcel_wkt_reads_as_missing_polygon() {
  let s = store().await;
  s.conn
    .call(|conn| {
      conn.execute(
        "INSERT INTO parcels (parcel_id, geometry, min_x, min_y, max_x, max_y)
         VALUES ('PBAD', 'POLYGON ((oops))', 0, 0, 100, 100)",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap();
  let parcel = s.find_by_parcel_id("PBAD").await.unwrap().unwrap();
  assert_eq!(parcel.geometry, None);
  let hits = s.parcels_intersecting(&Geometry::Point(Point::new(5.0, 5.0))).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].parcel_id, "P123");
}

#[tokio::test]
async fn spatial_lookup_filters_bbox_candidates_exactly() {
  let s = store().await;
  let triangle = Parcel {
    parcel_id: "TRI".into(),
    geometry:  Some(Polygon::from_exterior(vec![
      Point::new(100.0, 100.0),
      Point::new(110.0, 100.0),
      Point::new(100.0, 110.0),
    ])),
  };
  s.insert_parcels(&[triangle]).await.unwrap();

  // Inside the triangle's box but beyond its hypotenuse.
  let outside = Geometry::Point(Point::new(109.0, 109.0));
  assert!(s.parcels_intersecting(&outside).await.unwrap().is_empty());

  let inside = Geometry::Point(Point::new(101.0, 101.0));
  assert_eq!(s.parcels_intersecting(&inside).await.unwrap()[0].parcel_id, "TRI");

  let edge = Geometry::Point(Point::new(30.0, 5.0));
  let ids: Vec<_> =
    s.parcels_intersecting(&edge).await.unwrap().into_iter().map(|p| p.parcel_id).collect();
  assert_eq!(ids, ["P555", "P556"]);

  let nan = Geometry::Point(Point::new(f64::NAN, 5.0));
  assert!(s.parcels_intersecting(&nan).await.unwrap().is_empty());
}

// ─── Permit tables ───────────────────────────────────────────────────────────

#[tokio::test]
async fn prepare_adds_reconciliation_columns_once() {
  let s = store().await;
  s.prepare_table(TABLE).await.unwrap();
  s.prepare_table(TABLE).await.unwrap();
  let columns = s.columns(TABLE).await.unwrap();
  for name in ["geometry", "repair_state", "resolved_by"] {
    assert_eq!(columns.iter().filter(|c| *c == name).count(), 1, "{name}");
  }
}

#[tokio::test]
async fn prepare_rejects_structural_problems() {
  let s = store().await;
  assert!(matches!(
    s.prepare_table("nope").await,
    Err(Error::Core(permit_core::Error::UnknownTable(_)))
  ));
  assert!(matches!(
    s.prepare_table("x; DROP TABLE parcels").await,
    Err(Error::Core(permit_core::Error::InvalidTableName(_)))
  ));

  s.conn
    .call(|conn| {
      conn.execute_batch("CREATE TABLE thin (permit_number TEXT, address TEXT)")?;
      Ok(())
    })
    .await
    .unwrap();
  assert!(matches!(
    s.prepare_table("thin").await,
    Err(Error::Core(permit_core::Error::MissingColumn { column, .. })) if column == "geocode"
  ));
}

#[tokio::test]
async fn rows_loaded_by_the_etl_start_unjoined() {
  let s = store().await;
  s.conn
    .call(|conn| {
      conn.execute(
        "INSERT INTO permits_2016 (permit_number, address, geocode, dwellings, permit_type, notes)
         VALUES ('B2', NULL, 'P123', 3, 'BNMRA', NULL),
                ('B1', '250 RAYMOND AVE', NULL, NULL, NULL, NULL)",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap();
  s.prepare_table(TABLE).await.unwrap();

  let records = s.load_permits(TABLE).await.unwrap();
  assert_eq!(records.len(), 2);
  assert_eq!(records[0].permit_number, "B1");
  assert_eq!(records[0].geocode, "");
  assert_eq!(records[0].state, RepairState::Unjoined);
  assert_eq!(records[1].address, "");
  assert_eq!(records[1].dwellings, 3);
}

#[tokio::test]
async fn save_updates_only_reconciled_fields() {
  let s = store().await;
  let original = PermitRecord::new("A1", "250 RAYMOND AVE APT 3B", "")
    .with_permit_type("BNSFR")
    .with_dwellings(1);
  s.insert_permits(TABLE, &[original.clone()]).await.unwrap();

  let mut changed = original.clone();
  changed.address = "250 RAYMOND AVE".into();
  changed.geocode = "P123".into();
  changed.geometry = Some(Point::new(5.0, 5.0));
  changed.push_note("CHANGED: 250 RAYMOND AVE APT 3B");
  changed.state = RepairState::Resolved;
  changed.resolved_by = Some(MatchStrategy::FuzzyAddress);
  changed.dwellings = 99;

  let ghost = PermitRecord::new("ZZ", "", "");
  assert_eq!(s.save_permits(TABLE, &[changed.clone(), ghost]).await.unwrap(), 1);

  let loaded = s.load_permits(TABLE).await.unwrap();
  assert_eq!(loaded.len(), 1);
  assert_eq!(loaded[0], PermitRecord { dwellings: 1, ..changed });
}

#[tokio::test]
async fn overrides_are_scoped_by_table() {
  let s = store().await;
  let ov = ManualOverride {
    permit_number: "B1".into(),
    address:       Some("10 ELM ST".into()),
    geocode:       None,
  };
  s.add_override(TABLE, &ov).await.unwrap();
  s.add_override("permits_2017", &ManualOverride { permit_number: "C1".into(), ..ov.clone() })
    .await
    .unwrap();

  assert_eq!(s.overrides(TABLE).await.unwrap(), [ov]);
  assert!(s.overrides("permits_2015").await.unwrap().is_empty());
  assert!(s.overrides("bad name").await.is_err());
}

// ─── Reconciliation against SQLite ───────────────────────────────────────────

#[tokio::test]
async fn pipeline_reconciles_a_file_backed_table() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("permits.db3");
  let config = ReconcileConfig::default();

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.insert_parcels(&[square("P123", 0.0, 0.0), square("P555", 20.0, 0.0)]).await.unwrap();
    s.insert_address_points(&[
      address_point("250 RAYMOND AVE", "P123", 5.0, 5.0),
      address_point("10 ELM ST", "P999", 25.0, 5.0),
    ])
    .await
    .unwrap();
    s.create_permit_table(TABLE).await.unwrap();
    s.insert_permits(TABLE, &[
      PermitRecord::new("A1", "250 RAYMOND AVE APT 3B", ""),
      PermitRecord::new("E1", "", "NOPE"),
      PermitRecord::new("S1", "10 ELM ST", "P999"),
    ])
    .await
    .unwrap();

    let outcome = RepairPipeline::new(&s, &s, &config).unwrap().run(TABLE).await.unwrap();
    assert!(outcome.converged);
    assert_eq!(outcome.report.resolved, 2);
    assert_eq!(outcome.report.unresolved, ["E1"]);
  }

  let s = SqliteStore::open(&path).await.unwrap();
  let records = s.load_permits(TABLE).await.unwrap();
  assert_eq!(records[0].geocode, "P123");
  assert_eq!(records[0].note.as_deref(), Some("CHANGED: 250 RAYMOND AVE APT 3B"));
  assert_eq!(records[2].geocode, "P555");
  assert_eq!(records[2].resolved_by, Some(MatchStrategy::SpatialFallback));

  let again = RepairPipeline::new(&s, &s, &config).unwrap().run(TABLE).await.unwrap();
  assert_eq!(again.mutations, 0);
}
