//! The matching waterfall.
//!
//! [`MatchEngine::resolve`] decides how a single permit joins the reference
//! data without touching the permit. Applying the decision is the pipeline's
//! job.

use permit_address::AddressNormalizer;
use permit_core::{
  geometry::{Geometry, Point},
  permit::{MatchStrategy, PermitRecord},
  reference::{AddressPoint, Parcel},
  store::ReferenceIndex,
};
use serde::Serialize;
use tracing::{debug, warn};

// ─── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
  ExactAddress {
    parcel_id: String,
    geometry:  Point,
  },
  FuzzyAddress {
    parcel_id:        String,
    geometry:         Point,
    original_address: String,
    matched_address:  String,
    /// Every distinct candidate sharing the winner's length, the winner
    /// included. Empty when the match was unambiguous.
    tied:             Vec<String>,
  },
  ExactGeocode {
    parcel_id: String,
    /// The parcel's interior point.
    geometry:  Point,
  },
  SpatialFallback {
    parcel_id: String,
    /// The permit's own point, which the parcel intersects.
    geometry:  Point,
    /// Every parcel id intersecting the point when there was more than one.
    tied:      Vec<String>,
  },
  Unresolved,
}

impl MatchResult {
  pub fn strategy(&self) -> Option<MatchStrategy> {
    match self {
      Self::ExactAddress { .. } => Some(MatchStrategy::ExactAddress),
      Self::FuzzyAddress { .. } => Some(MatchStrategy::FuzzyAddress),
      Self::ExactGeocode { .. } => Some(MatchStrategy::ExactGeocode),
      Self::SpatialFallback { .. } => Some(MatchStrategy::SpatialFallback),
      Self::Unresolved => None,
    }
  }
}

/// A defect in the reference data noticed while matching.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
  ParcelWithoutGeometry { parcel_id: String },
  InvalidParcelGeometry { parcel_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
  pub result:    MatchResult,
  pub anomalies: Vec<Anomaly>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct MatchEngine<'a, R> {
  reference:  &'a R,
  normalizer: &'a AddressNormalizer,
}

impl<'a, R: ReferenceIndex> MatchEngine<'a, R> {
  pub fn new(reference: &'a R, normalizer: &'a AddressNormalizer) -> Self {
    Self { reference, normalizer }
  }

  /// Run the waterfall for `permit`: exact address, fuzzy address, exact
  /// geocode, then spatial fallback from the permit's own point.
  pub async fn resolve(&self, permit: &PermitRecord) -> Decision {
    let mut anomalies = Vec::new();

    let result = if let Some(m) = self.match_exact_address(&permit.address).await {
      m
    } else if let Some(m) = self.match_fuzzy_address(&permit.address).await {
      m
    } else if let Some(m) = self.match_geocode(&permit.geocode, &mut anomalies).await {
      m
    } else if let Some(m) = self.match_spatial(permit.geometry).await {
      m
    } else {
      MatchResult::Unresolved
    };

    debug!(permit = %permit.permit_number, strategy = ?result.strategy(), "resolved");
    Decision { result, anomalies }
  }

  pub async fn match_exact_address(&self, address: &str) -> Option<MatchResult> {
    let point = self.exact_address_point(address).await?;
    Some(MatchResult::ExactAddress {
      parcel_id: point.parcel_id,
      geometry:  point.geometry,
    })
  }

  /// Fuzzy lookup on the normalized house number and street name. The
  /// shortest candidate wins; equal lengths fall back to address order.
  pub async fn match_fuzzy_address(&self, address: &str) -> Option<MatchResult> {
    if address.trim().is_empty() {
      return None;
    }
    let parsed = match self.normalizer.parse(address) {
      Ok(parsed) => parsed,
      Err(e) => {
        debug!(address, error = %e, "address not normalizable; skipping fuzzy match");
        return None;
      }
    };

    let pattern = parsed.like_pattern();
    let candidates = match self.reference.find_by_fuzzy_pattern(&pattern).await {
      Ok(c) => c,
      Err(e) => {
        warn!(pattern, error = %e, "fuzzy address lookup failed");
        return None;
      }
    };

    let best = candidates.first()?;
    let shortest = best.full_address.chars().count();
    let mut tied: Vec<String> = candidates
      .iter()
      .take_while(|c| c.full_address.chars().count() == shortest)
      .map(|c| c.full_address.clone())
      .collect();
    tied.dedup();
    if tied.len() < 2 {
      tied.clear();
    }

    Some(MatchResult::FuzzyAddress {
      parcel_id: best.parcel_id.clone(),
      geometry: best.geometry,
      original_address: address.to_owned(),
      matched_address: best.full_address.clone(),
      tied,
    })
  }

  /// Verify `geocode` against the parcel layer. A parcel without a usable
  /// polygon is reported in `anomalies` and does not match.
  pub async fn match_geocode(
    &self,
    geocode: &str,
    anomalies: &mut Vec<Anomaly>,
  ) -> Option<MatchResult> {
    let parcel = self.parcel(geocode).await?;
    let geometry = usable_interior_point(&parcel, anomalies)?;
    Some(MatchResult::ExactGeocode { parcel_id: parcel.parcel_id, geometry })
  }

  /// The parcel intersecting `point`, lowest id first. Parcels whose polygon
  /// is unusable cannot hold a resolved permit and are passed over.
  pub async fn match_spatial(&self, point: Option<Point>) -> Option<MatchResult> {
    let point = point?;
    let mut parcels = self.parcels_at(point).await;
    parcels.retain(|p| p.valid_geometry().is_some());
    let first = parcels.first()?;
    let tied = if parcels.len() > 1 {
      parcels.iter().map(|p| p.parcel_id.clone()).collect()
    } else {
      Vec::new()
    };
    Some(MatchResult::SpatialFallback {
      parcel_id: first.parcel_id.clone(),
      geometry: point,
      tied,
    })
  }

  // ── Lookups shared with the pipeline ──────────────────────────────────────
  //
  // Backend faults are logged and treated as "no match" so a flaky lookup
  // never aborts a table.

  pub(crate) async fn exact_address_point(&self, address: &str) -> Option<AddressPoint> {
    if address.is_empty() {
      return None;
    }
    match self.reference.find_by_exact_address(address).await {
      Ok(hit) => hit,
      Err(e) => {
        warn!(address, error = %e, "exact address lookup failed");
        None
      }
    }
  }

  pub(crate) async fn parcel(&self, parcel_id: &str) -> Option<Parcel> {
    if parcel_id.is_empty() {
      return None;
    }
    match self.reference.find_by_parcel_id(parcel_id).await {
      Ok(hit) => hit,
      Err(e) => {
        warn!(parcel_id, error = %e, "parcel lookup failed");
        None
      }
    }
  }

  pub(crate) async fn parcels_at(&self, point: Point) -> Vec<Parcel> {
    if !point.is_valid() {
      return Vec::new();
    }
    match self.reference.parcels_intersecting(&Geometry::Point(point)).await {
      Ok(hits) => hits,
      Err(e) => {
        warn!(x = point.x, y = point.y, error = %e, "spatial lookup failed");
        Vec::new()
      }
    }
  }
}

/// The parcel's interior point, or an anomaly when its polygon is missing or
/// unusable.
pub(crate) fn usable_interior_point(parcel: &Parcel, anomalies: &mut Vec<Anomaly>) -> Option<Point> {
  let parcel_id = parcel.parcel_id.clone();
  let Some(polygon) = &parcel.geometry else {
    anomalies.push(Anomaly::ParcelWithoutGeometry { parcel_id });
    return None;
  };
  let point = polygon.is_valid().then(|| polygon.interior_point()).flatten();
  if point.is_none() {
    anomalies.push(Anomaly::InvalidParcelGeometry { parcel_id });
  }
  point
}
