//! [`SqliteStore`]: the SQLite implementation of [`ReferenceIndex`] and
//! [`PermitTable`].

use std::path::Path;

use permit_core::{
  geometry::Geometry,
  permit::{ManualOverride, PermitRecord, REQUIRED_COLUMNS},
  reference::{AddressPoint, Parcel},
  store::{PermitTable, ReferenceIndex, is_valid_table_name},
};
use rusqlite::OptionalExtension as _;
use tracing::{debug, info};

use crate::{
  Error, Result,
  encode::{
    RawAddressPoint, RawParcel, RawPermit, encode_point, encode_polygon, encode_state,
    encode_strategy,
  },
  schema::{RECONCILIATION_COLUMNS, SCHEMA, permit_table_ddl},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Reference layers and permit tables in a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

/// A permit table name, checked and ready to be spliced into SQL.
fn quoted(table: &str) -> Result<String> {
  if !is_valid_table_name(table) {
    return Err(permit_core::Error::InvalidTableName(table.to_owned()).into());
  }
  Ok(format!("\"{table}\""))
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Reference loading ─────────────────────────────────────────────────────

  pub async fn insert_address_points(&self, points: &[AddressPoint]) -> Result<usize> {
    let points = points.to_vec();
    let n = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO address_points (full_address, parcel_id, x, y) VALUES (?1, ?2, ?3, ?4)",
          )?;
          for p in &points {
            stmt.execute(rusqlite::params![p.full_address, p.parcel_id, p.geometry.x, p.geometry.y])?;
          }
        }
        tx.commit()?;
        Ok(points.len())
      })
      .await?;
    info!(count = n, "loaded address points");
    Ok(n)
  }

  /// Insert or replace parcels, computing each one's bounding box.
  pub async fn insert_parcels(&self, parcels: &[Parcel]) -> Result<usize> {
    let rows: Vec<_> = parcels
      .iter()
      .map(|parcel| {
        let wkt = parcel.geometry.as_ref().map(encode_polygon);
        let bbox = parcel.geometry.as_ref().and_then(|g| g.bounding_rect());
        (parcel.parcel_id.clone(), wkt, bbox)
      })
      .collect();

    let n = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO parcels (parcel_id, geometry, min_x, min_y, max_x, max_y)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          )?;
          for (parcel_id, wkt, bbox) in &rows {
            stmt.execute(rusqlite::params![
              parcel_id,
              wkt,
              bbox.map(|r| r.min.x),
              bbox.map(|r| r.min.y),
              bbox.map(|r| r.max.x),
              bbox.map(|r| r.max.y),
            ])?;
          }
        }
        tx.commit()?;
        Ok(rows.len())
      })
      .await?;
    info!(count = n, "loaded parcels");
    Ok(n)
  }

  // ── Permit tables and overrides ───────────────────────────────────────────

  /// Create a permit table with the loader's columns if it does not exist.
  pub async fn create_permit_table(&self, table: &str) -> Result<()> {
    quoted(table)?;
    let ddl = permit_table_ddl(table);
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert or replace whole permit records, reconciliation columns
  /// included.
  pub async fn insert_permits(&self, table: &str, records: &[PermitRecord]) -> Result<usize> {
    self.prepare_table(table).await?;
    let sql = format!(
      "INSERT OR REPLACE INTO {} (
         permit_number, address, geocode, dwellings, permit_type, notes,
         geometry, repair_state, resolved_by
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
      quoted(table)?
    );
    let records = records.to_vec();

    let n = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(&sql)?;
          for r in &records {
            stmt.execute(rusqlite::params![
              r.permit_number,
              r.address,
              r.geocode,
              r.dwellings,
              r.permit_type,
              r.note,
              r.geometry.as_ref().map(encode_point),
              encode_state(r.state),
              r.resolved_by.map(encode_strategy),
            ])?;
          }
        }
        tx.commit()?;
        Ok(records.len())
      })
      .await?;
    Ok(n)
  }

  /// Register (or replace) a manual override for a permit of `table`.
  pub async fn add_override(&self, table: &str, ov: &ManualOverride) -> Result<()> {
    quoted(table)?;
    let table = table.to_owned();
    let ov = ov.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO overrides (table_name, permit_number, address, geocode)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![table, ov.permit_number, ov.address, ov.geocode],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Column names of `table`; empty when the table does not exist.
  pub(crate) async fn columns(&self, table: &str) -> Result<Vec<String>> {
    let sql = format!("PRAGMA table_info({})", quoted(table)?);
    let columns = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let names = stmt
          .query_map([], |row| row.get::<_, String>(1))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
      })
      .await?;
    Ok(columns)
  }
}

// ─── ReferenceIndex impl ─────────────────────────────────────────────────────

fn address_point_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAddressPoint> {
  Ok(RawAddressPoint {
    full_address: row.get(0)?,
    parcel_id:    row.get(1)?,
    x:            row.get(2)?,
    y:            row.get(3)?,
  })
}

fn parcel_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawParcel> {
  Ok(RawParcel { parcel_id: row.get(0)?, geometry: row.get(1)? })
}

impl ReferenceIndex for SqliteStore {
  type Error = Error;

  async fn find_by_exact_address(&self, address: &str) -> Result<Option<AddressPoint>> {
    let address = address.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT full_address, parcel_id, x, y FROM address_points
               WHERE full_address = ?1 ORDER BY parcel_id LIMIT 1",
              rusqlite::params![address],
              address_point_row,
            )
            .optional()?,
        )
      })
      .await?;
    Ok(raw.map(RawAddressPoint::into_address_point))
  }

  async fn find_by_fuzzy_pattern(&self, pattern: &str) -> Result<Vec<AddressPoint>> {
    let pattern = pattern.to_owned();
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT full_address, parcel_id, x, y FROM address_points
           WHERE full_address LIKE ?1
           ORDER BY length(full_address), full_address, parcel_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![pattern], address_point_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(raws.into_iter().map(RawAddressPoint::into_address_point).collect())
  }

  async fn find_by_parcel_id(&self, parcel_id: &str) -> Result<Option<Parcel>> {
    let parcel_id = parcel_id.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT parcel_id, geometry FROM parcels WHERE parcel_id = ?1",
              rusqlite::params![parcel_id],
              parcel_row,
            )
            .optional()?,
        )
      })
      .await?;
    Ok(raw.map(RawParcel::into_parcel))
  }

  /// Bounding boxes narrow the candidates in SQL; the exact test runs on the
  /// decoded polygons.
  async fn parcels_intersecting(&self, geometry: &Geometry) -> Result<Vec<Parcel>> {
    let Some(bbox) = geometry.bounding_rect() else {
      return Ok(Vec::new());
    };
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT parcel_id, geometry FROM parcels
           WHERE geometry IS NOT NULL
             AND min_x <= ?3 AND max_x >= ?1
             AND min_y <= ?4 AND max_y >= ?2
           ORDER BY parcel_id",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![bbox.min.x, bbox.min.y, bbox.max.x, bbox.max.y],
            parcel_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let candidates = raws.len();
    let hits: Vec<Parcel> = raws
      .into_iter()
      .map(RawParcel::into_parcel)
      .filter(|parcel| {
        parcel.geometry.as_ref().is_some_and(|poly| geometry.intersects_polygon(poly))
      })
      .collect();
    debug!(candidates, hits = hits.len(), "spatial lookup");
    Ok(hits)
  }
}

// ─── PermitTable impl ────────────────────────────────────────────────────────

impl PermitTable for SqliteStore {
  type Error = Error;

  async fn prepare_table(&self, table: &str) -> Result<()> {
    let columns = self.columns(table).await?;
    if columns.is_empty() {
      return Err(permit_core::Error::UnknownTable(table.to_owned()).into());
    }
    if let Some(missing) = REQUIRED_COLUMNS.iter().find(|c| !columns.iter().any(|have| have == *c)) {
      return Err(
        permit_core::Error::MissingColumn {
          table:  table.to_owned(),
          column: (*missing).to_owned(),
        }
        .into(),
      );
    }

    let quoted = quoted(table)?;
    let alters: Vec<String> = RECONCILIATION_COLUMNS
      .iter()
      .filter(|(name, _)| !columns.iter().any(|have| have == name))
      .map(|(name, ddl)| format!("ALTER TABLE {quoted} ADD COLUMN {name} {ddl};"))
      .collect();
    if alters.is_empty() {
      return Ok(());
    }

    info!(table, added = alters.len(), "adding reconciliation columns");
    let batch = alters.concat();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&batch)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn load_permits(&self, table: &str) -> Result<Vec<PermitRecord>> {
    let sql = format!(
      "SELECT permit_number, address, geocode, dwellings, permit_type, notes,
              geometry, repair_state, resolved_by
       FROM {} ORDER BY permit_number",
      quoted(table)?
    );
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawPermit {
              permit_number: row.get(0)?,
              address:       row.get(1)?,
              geocode:       row.get(2)?,
              dwellings:     row.get(3)?,
              permit_type:   row.get(4)?,
              notes:         row.get(5)?,
              geometry:      row.get(6)?,
              repair_state:  row.get(7)?,
              resolved_by:   row.get(8)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPermit::into_record).collect()
  }

  async fn save_permits(&self, table: &str, records: &[PermitRecord]) -> Result<usize> {
    let sql = format!(
      "UPDATE {} SET address = ?1, geocode = ?2, notes = ?3, geometry = ?4,
                     repair_state = ?5, resolved_by = ?6
       WHERE permit_number = ?7",
      quoted(table)?
    );
    let rows: Vec<_> = records
      .iter()
      .map(|r| {
        (
          r.address.clone(),
          r.geocode.clone(),
          r.note.clone(),
          r.geometry.as_ref().map(encode_point),
          encode_state(r.state),
          r.resolved_by.map(encode_strategy),
          r.permit_number.clone(),
        )
      })
      .collect();

    let updated = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut updated = 0;
        {
          let mut stmt = tx.prepare(&sql)?;
          for (address, geocode, notes, geometry, state, resolved_by, permit_number) in &rows {
            updated += stmt.execute(rusqlite::params![
              address,
              geocode,
              notes,
              geometry,
              state,
              resolved_by,
              permit_number,
            ])?;
          }
        }
        tx.commit()?;
        Ok(updated)
      })
      .await?;
    debug!(table, updated, "saved permits");
    Ok(updated)
  }

  async fn overrides(&self, table: &str) -> Result<Vec<ManualOverride>> {
    quoted(table)?;
    let table = table.to_owned();
    let overrides = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT permit_number, address, geocode FROM overrides
           WHERE table_name = ?1 ORDER BY permit_number",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![table], |row| {
            Ok(ManualOverride {
              permit_number: row.get(0)?,
              address:       row.get(1)?,
              geocode:       row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(overrides)
  }
}
