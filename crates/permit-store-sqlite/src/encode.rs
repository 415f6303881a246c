//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Geometry is stored as WKT (`POINT (x y)`, `POLYGON ((x y, ...), ...)`).
//! Repair states and strategies are stored as their snake_case names.

use permit_core::{
  geometry::{Point, Polygon},
  permit::{MatchStrategy, PermitRecord, RepairState},
  reference::{AddressPoint, Parcel},
};
use tracing::warn;

use crate::{Error, Result};

// ─── WKT ─────────────────────────────────────────────────────────────────────

fn wkt_error(wkt: &str) -> Error { Error::Wkt(wkt.to_owned()) }

fn coords(p: &Point) -> String { format!("{} {}", p.x, p.y) }

pub fn encode_point(p: &Point) -> String { format!("POINT ({})", coords(p)) }

pub fn encode_polygon(polygon: &Polygon) -> String {
  let rings: Vec<String> = std::iter::once(&polygon.exterior)
    .chain(&polygon.interiors)
    .map(|ring| {
      let points: Vec<String> = ring.iter().map(coords).collect();
      format!("({})", points.join(", "))
    })
    .collect();
  format!("POLYGON ({})", rings.join(", "))
}

/// The parenthesised body following `tag`, without its outer parentheses.
fn tagged_body<'a>(wkt: &'a str, tag: &str) -> Result<&'a str> {
  let trimmed = wkt.trim();
  let rest = trimmed
    .get(..tag.len())
    .filter(|head| head.eq_ignore_ascii_case(tag))
    .and_then(|_| trimmed.get(tag.len()..))
    .ok_or_else(|| wkt_error(wkt))?;
  rest
    .trim()
    .strip_prefix('(')
    .and_then(|b| b.strip_suffix(')'))
    .ok_or_else(|| wkt_error(wkt))
}

fn decode_coords(pair: &str, wkt: &str) -> Result<Point> {
  let mut parts = pair.split_whitespace();
  let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
    return Err(wkt_error(wkt));
  };
  let x = x.parse().map_err(|_| wkt_error(wkt))?;
  let y = y.parse().map_err(|_| wkt_error(wkt))?;
  Ok(Point::new(x, y))
}

pub fn decode_point(wkt: &str) -> Result<Point> {
  decode_coords(tagged_body(wkt, "POINT")?, wkt)
}

pub fn decode_polygon(wkt: &str) -> Result<Polygon> {
  let body = tagged_body(wkt, "POLYGON")?;
  let mut rings = Vec::new();
  for ring in body.split("),") {
    let ring = ring.trim().trim_start_matches('(').trim_end_matches(')');
    let points = ring
      .split(',')
      .map(|pair| decode_coords(pair, wkt))
      .collect::<Result<Vec<_>>>()?;
    rings.push(points);
  }
  let mut rings = rings.into_iter();
  let exterior = rings.next().ok_or_else(|| wkt_error(wkt))?;
  Ok(Polygon::new(exterior, rings.collect()))
}

// ─── Enumerations ────────────────────────────────────────────────────────────

pub fn decode_state(s: &str) -> Result<RepairState> {
  Ok(s.parse().map_err(|_| permit_core::Error::UnknownState(s.to_owned()))?)
}

pub fn decode_strategy(s: &str) -> Result<MatchStrategy> {
  Ok(s.parse().map_err(|_| permit_core::Error::UnknownStrategy(s.to_owned()))?)
}

pub fn encode_state(state: RepairState) -> String {
  let s: &str = state.as_ref();
  s.to_owned()
}

pub fn encode_strategy(strategy: MatchStrategy) -> String {
  let s: &str = strategy.as_ref();
  s.to_owned()
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

/// Raw values read directly from an `address_points` row.
pub struct RawAddressPoint {
  pub full_address: String,
  pub parcel_id:    String,
  pub x:            f64,
  pub y:            f64,
}

impl RawAddressPoint {
  pub fn into_address_point(self) -> AddressPoint {
    AddressPoint {
      full_address: self.full_address,
      parcel_id:    self.parcel_id,
      geometry:     Point::new(self.x, self.y),
    }
  }
}

/// Raw values read directly from a `parcels` row.
pub struct RawParcel {
  pub parcel_id: String,
  pub geometry:  Option<String>,
}

impl RawParcel {
  /// Unreadable WKT is treated as a missing polygon.
  pub fn into_parcel(self) -> Parcel {
    let geometry = self.geometry.as_deref().and_then(|wkt| match decode_polygon(wkt) {
      Ok(polygon) => Some(polygon),
      Err(e) => {
        warn!(parcel_id = %self.parcel_id, error = %e, "unreadable parcel geometry");
        None
      }
    });
    Parcel { parcel_id: self.parcel_id, geometry }
  }
}

/// Raw values read directly from a permit table row. Loader columns may be
/// NULL.
pub struct RawPermit {
  pub permit_number: String,
  pub address:       Option<String>,
  pub geocode:       Option<String>,
  pub dwellings:     Option<i64>,
  pub permit_type:   Option<String>,
  pub notes:         Option<String>,
  pub geometry:      Option<String>,
  pub repair_state:  String,
  pub resolved_by:   Option<String>,
}

impl RawPermit {
  pub fn into_record(self) -> Result<PermitRecord> {
    let geometry = self.geometry.as_deref().and_then(|wkt| match decode_point(wkt) {
      Ok(point) => Some(point),
      Err(e) => {
        warn!(permit = %self.permit_number, error = %e, "unreadable permit geometry");
        None
      }
    });

    Ok(PermitRecord {
      permit_number: self.permit_number,
      address:       self.address.unwrap_or_default(),
      geocode:       self.geocode.unwrap_or_default(),
      dwellings:     self.dwellings.and_then(|d| u32::try_from(d).ok()).unwrap_or(0),
      permit_type:   self.permit_type.unwrap_or_default(),
      geometry,
      note:          self.notes,
      state:         decode_state(&self.repair_state)?,
      resolved_by:   self.resolved_by.as_deref().map(decode_strategy).transpose()?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn point_wkt() {
    assert_eq!(encode_point(&Point::new(1.5, -2.0)), "POINT (1.5 -2)");
    assert_eq!(decode_point("point(1.5   -2)").unwrap(), Point::new(1.5, -2.0));
    assert!(decode_point("POINT (NaN 1)").unwrap().x.is_nan());
    assert!(decode_point("POINT (1)").is_err());
    assert!(decode_point("POLYGON ((0 0))").is_err());
    assert!(decode_point("").is_err());
  }

  #[test]
  fn polygon_wkt_with_hole() {
    let wkt = "POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0), (2 2, 4 2, 4 4, 2 2))";
    let polygon = decode_polygon(wkt).unwrap();
    assert_eq!(polygon.exterior.len(), 5);
    assert_eq!(polygon.interiors.len(), 1);
    assert_eq!(polygon.interiors[0][1], Point::new(4.0, 2.0));
    assert_eq!(encode_polygon(&polygon), wkt);
  }

  #[test]
  fn malformed_polygons_are_errors() {
    assert!(decode_polygon("POLYGON EMPTY").is_err());
    assert!(decode_polygon("POLYGON ((0 0, 1))").is_err());
    assert!(decode_polygon("MULTIPOLYGON (((0 0, 1 0, 1 1)))").is_err());
  }

  #[test]
  fn raw_permit_defaults_null_loader_columns() {
    let raw = RawPermit {
      permit_number: "B1".into(),
      address:       None,
      geocode:       None,
      dwellings:     Some(-3),
      permit_type:   None,
      notes:         None,
      geometry:      Some("garbage".into()),
      repair_state:  "address_repaired".into(),
      resolved_by:   Some("fuzzy_address".into()),
    };
    let record = raw.into_record().unwrap();
    assert_eq!(record.address, "");
    assert_eq!(record.dwellings, 0);
    assert_eq!(record.geometry, None);
    assert_eq!(record.state, RepairState::AddressRepaired);
    assert_eq!(record.resolved_by, Some(MatchStrategy::FuzzyAddress));
  }

  #[test]
  fn unknown_state_is_a_decode_error() {
    let raw = RawPermit {
      permit_number: "B1".into(),
      address:       None,
      geocode:       None,
      dwellings:     None,
      permit_type:   None,
      notes:         None,
      geometry:      None,
      repair_state:  "limbo".into(),
      resolved_by:   None,
    };
    assert!(matches!(
      raw.into_record(),
      Err(Error::Core(permit_core::Error::UnknownState(s))) if s == "limbo"
    ));
    assert!(decode_strategy("guesswork").is_err());
  }
}
