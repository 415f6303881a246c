//! SQL schema for the reference layers and override registry.
//!
//! Permit tables are not created here: they are produced by the permit loader
//! and only extended with reconciliation columns by
//! [`prepare_table`](permit_core::store::PermitTable::prepare_table).

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS address_points (
    full_address TEXT NOT NULL,
    parcel_id    TEXT NOT NULL,
    x            REAL NOT NULL,
    y            REAL NOT NULL
);

-- geometry is a WKT POLYGON, or NULL where the parcel layer has no shape.
-- The bounding box is NULL exactly when geometry is.
CREATE TABLE IF NOT EXISTS parcels (
    parcel_id TEXT PRIMARY KEY,
    geometry  TEXT,
    min_x     REAL,
    min_y     REAL,
    max_x     REAL,
    max_y     REAL
);

CREATE TABLE IF NOT EXISTS overrides (
    table_name    TEXT NOT NULL,
    permit_number TEXT NOT NULL,
    address       TEXT,
    geocode       TEXT,
    PRIMARY KEY (table_name, permit_number)
);

CREATE INDEX IF NOT EXISTS address_points_address_idx ON address_points(full_address);
CREATE INDEX IF NOT EXISTS parcels_bbox_idx           ON parcels(min_x, max_x);

PRAGMA user_version = 1;
";

/// Columns added to a permit table the first time it is reconciled, with
/// their DDL.
pub const RECONCILIATION_COLUMNS: [(&str, &str); 3] = [
  ("geometry", "TEXT"),
  ("repair_state", "TEXT NOT NULL DEFAULT 'unjoined'"),
  ("resolved_by", "TEXT"),
];

/// DDL for a permit table carrying only the loader's columns.
pub fn permit_table_ddl(table: &str) -> String {
  format!(
    "CREATE TABLE IF NOT EXISTS \"{table}\" (
       permit_number TEXT PRIMARY KEY,
       address       TEXT,
       geocode       TEXT,
       dwellings     INTEGER,
       permit_type   TEXT,
       notes         TEXT
     )"
  )
}
