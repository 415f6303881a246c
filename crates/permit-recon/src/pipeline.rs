//! [`RepairPipeline`]: drives every permit of a table to a terminal state.
//!
//! Each pass advances every non-terminal record by exactly one transition:
//!
//! ```text
//! Unjoined ─► AddressRepaired ─► GeocodeRepaired ─► SpatiallyRepaired
//!    │               │                  │                   │
//!    └───────────────┴──────────────────┴───────────────────┴─► Resolved | Unresolved
//! ```
//!
//! Transitions are computed against the records as they stood when the pass
//! began and applied together once the pass is complete. After convergence
//! the geometry of every resolved record is checked against its parcel, and
//! only records that differ from what was loaded are written back.

use std::collections::{BTreeSet, HashMap};

use permit_address::AddressNormalizer;
use permit_core::{
  geometry::Point,
  permit::{ManualOverride, MatchStrategy, PermitRecord, RepairState},
  store::{PermitTable, ReferenceIndex},
};
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  config::ReconcileConfig,
  engine::{Anomaly, MatchEngine, MatchResult, usable_interior_point},
  report::{AMBIGUOUS_PREFIX, ReconciliationReport},
};

/// Note left on records still in flight when the pass ceiling is reached.
pub const PASS_BUDGET_NOTE: &str = "PASS BUDGET EXHAUSTED";
/// Note left on records whose source values came from a manual override.
pub const OVERRIDE_NOTE: &str = "OVERRIDE";

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
  pub report:    ReconciliationReport,
  /// Passes run, including the final pass that changed nothing.
  pub passes:    usize,
  /// `false` when the pass ceiling forced records to `Unresolved`.
  pub converged: bool,
  /// Rows written back to the permit table.
  pub mutations: usize,
}

pub struct RepairPipeline<'a, R, P> {
  reference:  &'a R,
  permits:    &'a P,
  config:     &'a ReconcileConfig,
  normalizer: AddressNormalizer,
}

impl<'a, R: ReferenceIndex, P: PermitTable> RepairPipeline<'a, R, P> {
  /// Validate `config` and build the address normalizer it describes.
  pub fn new(reference: &'a R, permits: &'a P, config: &'a ReconcileConfig) -> Result<Self> {
    config.validate()?;
    let normalizer = AddressNormalizer::new(&config.street_suffixes)?;
    Ok(Self { reference, permits, config, normalizer })
  }

  /// Reconcile one permit table end to end and persist the changes.
  pub async fn run(&self, table: &str) -> Result<PipelineOutcome> {
    info!(table, "reconciling permit table");

    self.permits.prepare_table(table).await.map_err(Error::store)?;
    let loaded = self.permits.load_permits(table).await.map_err(Error::store)?;
    let overrides = self.permits.overrides(table).await.map_err(Error::store)?;

    let mut records = loaded.clone();
    let overridden = apply_overrides(&mut records, &overrides);
    if overridden > 0 {
      info!(table, overridden, "applied manual overrides");
    }
    for record in records.iter_mut().filter(|r| r.state == RepairState::Unresolved) {
      record.state = RepairState::Unjoined;
    }

    let engine = MatchEngine::new(self.reference, &self.normalizer);
    let mut anomalies = BTreeSet::new();

    let mut passes = 0;
    while passes < self.config.max_passes {
      passes += 1;
      let changed = self.run_pass(&engine, &mut records, &mut anomalies).await;
      info!(table, pass = passes, changed, "repair pass complete");
      if changed == 0 {
        break;
      }
    }

    let stuck = records.iter().filter(|r| !r.state.is_terminal()).count();
    let converged = stuck == 0;
    if !converged {
      warn!(table, stuck, max_passes = self.config.max_passes, "pass budget exhausted");
      for record in records.iter_mut().filter(|r| !r.state.is_terminal()) {
        record.push_note(PASS_BUDGET_NOTE);
        unresolve(record);
      }
    }

    self.check_geometry(&engine, &mut records, &mut anomalies).await;

    for anomaly in &anomalies {
      warn!(table, ?anomaly, "reference data inconsistency");
    }

    let dirty: Vec<PermitRecord> = records
      .iter()
      .zip(&loaded)
      .filter(|(now, before)| differs(now, before))
      .map(|(now, _)| now.clone())
      .collect();
    let mutations = if dirty.is_empty() {
      0
    } else {
      self.permits.save_permits(table, &dirty).await.map_err(Error::store)?
    };

    let report =
      ReconciliationReport::summarize(table, &records, anomalies, &self.config.permit_types);
    info!(
      table,
      passes,
      mutations,
      resolved = report.resolved,
      unresolved = report.unresolved.len(),
      "table reconciled"
    );

    Ok(PipelineOutcome { report, passes, converged, mutations })
  }

  /// One pass over the table. Returns the number of records that changed.
  async fn run_pass(
    &self,
    engine: &MatchEngine<'_, R>,
    records: &mut [PermitRecord],
    anomalies: &mut BTreeSet<Anomaly>,
  ) -> usize {
    let mut updates = Vec::new();
    for (i, record) in records.iter().enumerate() {
      if record.state.is_terminal() {
        continue;
      }
      let mut found = Vec::new();
      let next = self.advance(engine, record, &mut found).await;
      anomalies.extend(found);
      debug!(permit = %record.permit_number, from = %record.state, to = %next.state, "transition");
      updates.push((i, next));
    }

    let changed = updates.len();
    for (i, next) in updates {
      records[i] = next;
    }
    changed
  }

  /// The record after one transition from its current state.
  async fn advance(
    &self,
    engine: &MatchEngine<'_, R>,
    record: &PermitRecord,
    anomalies: &mut Vec<Anomaly>,
  ) -> PermitRecord {
    let mut next = record.clone();

    match record.state {
      RepairState::Unjoined => {
        let decision = engine.resolve(record).await;
        anomalies.extend(decision.anomalies);
        match decision.result {
          MatchResult::ExactAddress { parcel_id, geometry } => {
            next.geocode = parcel_id;
            next.geometry = Some(geometry);
            next.resolved_by = Some(MatchStrategy::ExactAddress);
            next.state = RepairState::AddressRepaired;
          }
          MatchResult::FuzzyAddress {
            parcel_id,
            geometry,
            original_address,
            matched_address,
            tied,
          } => {
            if matched_address != original_address {
              next.push_note(&format!("CHANGED: {original_address}"));
              next.address = matched_address;
            }
            flag_ties(&mut next, &tied);
            next.geocode = parcel_id;
            next.geometry = Some(geometry);
            next.resolved_by = Some(MatchStrategy::FuzzyAddress);
            next.state = RepairState::AddressRepaired;
          }
          MatchResult::ExactGeocode { geometry, .. } => {
            next.geometry.get_or_insert(geometry);
            next.resolved_by = Some(MatchStrategy::ExactGeocode);
            next.state = RepairState::Resolved;
          }
          MatchResult::SpatialFallback { parcel_id, tied, .. } => {
            relocate(&mut next, parcel_id, &tied);
            next.state = RepairState::SpatiallyRepaired;
          }
          MatchResult::Unresolved => next.state = RepairState::AddressRepaired,
        }
      }

      RepairState::AddressRepaired => {
        if let Some(MatchResult::ExactGeocode { geometry, .. }) =
          engine.match_geocode(&record.geocode, anomalies).await
        {
          verified(&mut next, geometry);
        } else {
          if let Some(canonical) = self.config.condo.canonicalize(&record.geocode)
            && engine.parcel(&canonical).await.is_some()
          {
            next.push_note(&format!("CONDO: {}", record.geocode));
            next.geocode = canonical;
            next.resolved_by = Some(MatchStrategy::CondoGeocode);
          }
          next.state = RepairState::GeocodeRepaired;
        }
      }

      RepairState::GeocodeRepaired => {
        if let Some(MatchResult::ExactGeocode { geometry, .. }) =
          engine.match_geocode(&record.geocode, anomalies).await
        {
          verified(&mut next, geometry);
        } else if let Some(MatchResult::SpatialFallback { parcel_id, tied, .. }) =
          engine.match_spatial(record.geometry).await
        {
          relocate(&mut next, parcel_id, &tied);
          next.state = RepairState::SpatiallyRepaired;
        } else {
          unresolve(&mut next);
        }
      }

      RepairState::SpatiallyRepaired => {
        let holds = match (engine.parcel(&record.geocode).await, record.geometry) {
          (Some(parcel), Some(point)) => {
            usable_interior_point(&parcel, anomalies).is_some()
              && parcel.geometry.as_ref().is_some_and(|g| g.intersects_point(&point))
          }
          _ => false,
        };
        if holds {
          next.state = RepairState::Resolved;
        } else {
          unresolve(&mut next);
        }
      }

      RepairState::Resolved | RepairState::Unresolved => {}
    }

    next
  }

  /// Post-convergence geometry check for resolved records:
  ///
  /// 1. a malformed point is replaced by the centroid of the parcel under the
  ///    record's reference address point;
  /// 2. a missing point is backfilled from the reference address point;
  /// 3. a point outside the claimed parcel (or still missing) becomes the
  ///    parcel's interior point.
  ///
  /// A record whose parcel has vanished or lost its polygon is demoted to
  /// `Unresolved` so the next run retries it.
  async fn check_geometry(
    &self,
    engine: &MatchEngine<'_, R>,
    records: &mut [PermitRecord],
    anomalies: &mut BTreeSet<Anomaly>,
  ) {
    for record in records.iter_mut().filter(|r| r.state == RepairState::Resolved) {
      if record.geometry.is_some_and(|p| !p.is_valid()) {
        record.geometry = self.centroid_under_address(engine, &record.address).await;
        record.push_note("GEOMETRY: replaced malformed point");
      }

      if record.geometry.is_none()
        && let Some(point) = engine.exact_address_point(&record.address).await
        && point.geometry.is_valid()
      {
        record.geometry = Some(point.geometry);
        record.push_note("GEOMETRY: from address point");
      }

      let Some(parcel) = engine.parcel(&record.geocode).await else {
        record.push_note(&format!("GEOMETRY: parcel {} not found", record.geocode));
        unresolve(record);
        continue;
      };
      let mut found = Vec::new();
      let interior = usable_interior_point(&parcel, &mut found);
      anomalies.extend(found);
      let (Some(interior), Some(polygon)) = (interior, parcel.geometry.as_ref()) else {
        record.push_note(&format!("GEOMETRY: parcel {} has no usable polygon", record.geocode));
        unresolve(record);
        continue;
      };

      match record.geometry {
        Some(point) if polygon.contains(&point) => {}
        Some(_) => {
          record.geometry = Some(interior);
          record.push_note("GEOMETRY: moved inside parcel");
        }
        None => {
          record.geometry = Some(interior);
          record.push_note("GEOMETRY: parcel interior point");
        }
      }
    }
  }

  async fn centroid_under_address(
    &self,
    engine: &MatchEngine<'_, R>,
    address: &str,
  ) -> Option<Point> {
    let point = engine.exact_address_point(address).await?;
    engine
      .parcels_at(point.geometry)
      .await
      .iter()
      .find_map(|parcel| parcel.valid_geometry().and_then(|g| g.centroid()))
  }
}

// ─── Record helpers ──────────────────────────────────────────────────────────

/// Apply overrides to every record that is not already resolved. Returns the
/// number of records touched.
fn apply_overrides(records: &mut [PermitRecord], overrides: &[ManualOverride]) -> usize {
  let by_number: HashMap<&str, &ManualOverride> =
    overrides.iter().map(|o| (o.permit_number.as_str(), o)).collect();

  let mut applied = 0;
  for record in records.iter_mut().filter(|r| r.state != RepairState::Resolved) {
    let Some(ov) = by_number.get(record.permit_number.as_str()) else { continue };
    if let Some(address) = &ov.address {
      record.address = address.clone();
    }
    if let Some(geocode) = &ov.geocode {
      record.geocode = geocode.clone();
    }
    record.push_note(OVERRIDE_NOTE);
    record.state = RepairState::Unjoined;
    record.resolved_by = None;
    applied += 1;
  }
  applied
}

fn verified(record: &mut PermitRecord, interior: Point) {
  record.geometry.get_or_insert(interior);
  record.resolved_by.get_or_insert(MatchStrategy::ExactGeocode);
  record.state = RepairState::Resolved;
}

fn relocate(record: &mut PermitRecord, parcel_id: String, tied: &[String]) {
  if !record.geocode.is_empty() && record.geocode != parcel_id {
    record.push_note(&format!("RELOCATED: {}", record.geocode));
  }
  flag_ties(record, tied);
  record.geocode = parcel_id;
  record.resolved_by = Some(MatchStrategy::SpatialFallback);
}

fn flag_ties(record: &mut PermitRecord, tied: &[String]) {
  if !tied.is_empty() {
    record.push_note(&format!("{AMBIGUOUS_PREFIX} {}", tied.join(" | ")));
  }
}

fn unresolve(record: &mut PermitRecord) {
  record.state = RepairState::Unresolved;
  record.resolved_by = None;
}

/// Field-wise comparison in which points compare by bit pattern, so a
/// malformed (NaN) point left untouched does not count as a change.
fn differs(a: &PermitRecord, b: &PermitRecord) -> bool {
  let bits = |p: Option<Point>| p.map(|p| (p.x.to_bits(), p.y.to_bits()));
  a.address != b.address
    || a.geocode != b.geocode
    || bits(a.geometry) != bits(b.geometry)
    || a.note != b.note
    || a.state != b.state
    || a.resolved_by != b.resolved_by
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn overrides_skip_resolved_records() {
    let mut resolved = PermitRecord::new("1", "A", "G");
    resolved.state = RepairState::Resolved;
    let mut unresolved = PermitRecord::new("2", "B", "");
    unresolved.state = RepairState::Unresolved;
    let mut records = vec![resolved.clone(), unresolved];

    let overrides = [
      ManualOverride { permit_number: "1".into(), address: Some("X".into()), geocode: None },
      ManualOverride { permit_number: "2".into(), address: None, geocode: Some("G2".into()) },
    ];
    assert_eq!(apply_overrides(&mut records, &overrides), 1);
    assert_eq!(records[0], resolved);
    assert_eq!(records[1].address, "B");
    assert_eq!(records[1].geocode, "G2");
    assert_eq!(records[1].state, RepairState::Unjoined);
    assert_eq!(records[1].note.as_deref(), Some(OVERRIDE_NOTE));
  }

  #[test]
  fn nan_points_do_not_count_as_changes() {
    let a = PermitRecord::new("1", "", "").with_geometry(Point::new(f64::NAN, 0.0));
    assert!(!differs(&a, &a.clone()));
    let b = a.clone().with_geometry(Point::new(1.0, 0.0));
    assert!(differs(&a, &b));
  }

  #[test]
  fn relocation_notes_previous_geocode_and_ties() {
    let mut record = PermitRecord::new("1", "", "P999");
    relocate(&mut record, "P555".into(), &["P555".into(), "P556".into()]);
    assert_eq!(record.geocode, "P555");
    assert_eq!(record.resolved_by, Some(MatchStrategy::SpatialFallback));
    assert_eq!(record.note.as_deref(), Some("RELOCATED: P999; AMBIGUOUS: P555 | P556"));
  }
}
