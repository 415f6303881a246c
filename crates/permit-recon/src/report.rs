//! Per-table reconciliation summary.
//!
//! Pure aggregation over the converged records: nothing here reads the store.

use std::{
  collections::BTreeMap,
  fmt,
  io::Write,
};

use permit_core::{
  permit::{MatchStrategy, PermitRecord, RepairState},
  permit_type::PermitTypeCatalog,
};
use serde::Serialize;

use crate::{Result, engine::Anomaly};

/// Note prefix marking a record for manual review.
pub const AMBIGUOUS_PREFIX: &str = "AMBIGUOUS:";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeTally {
  pub permits:    usize,
  pub dwellings:  u64,
  pub unresolved: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlaggedPermit {
  pub permit_number: String,
  pub note:          String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
  pub table:                     String,
  pub total:                     usize,
  pub resolved:                  usize,
  pub resolved_by_strategy:      BTreeMap<MatchStrategy, usize>,
  /// Permit numbers left `Unresolved`, in table order.
  pub unresolved:                Vec<String>,
  /// Records carrying an ambiguity note.
  pub flagged:                   Vec<FlaggedPermit>,
  pub reference_inconsistencies: Vec<Anomaly>,
  /// Keyed by permit-type label.
  pub by_permit_type:            BTreeMap<String, TypeTally>,
}

impl ReconciliationReport {
  pub fn summarize(
    table: &str,
    records: &[PermitRecord],
    anomalies: impl IntoIterator<Item = Anomaly>,
    catalog: &PermitTypeCatalog,
  ) -> Self {
    let mut report = Self {
      table:                     table.to_owned(),
      total:                     records.len(),
      resolved:                  0,
      resolved_by_strategy:      BTreeMap::new(),
      unresolved:                Vec::new(),
      flagged:                   Vec::new(),
      reference_inconsistencies: anomalies.into_iter().collect(),
      by_permit_type:            BTreeMap::new(),
    };
    report.reference_inconsistencies.sort();
    report.reference_inconsistencies.dedup();

    for record in records {
      let tally = report
        .by_permit_type
        .entry(catalog.label(&record.permit_type).to_owned())
        .or_default();
      tally.permits += 1;
      tally.dwellings += u64::from(record.dwellings);

      match record.state {
        RepairState::Resolved => {
          report.resolved += 1;
          if let Some(strategy) = record.resolved_by {
            *report.resolved_by_strategy.entry(strategy).or_default() += 1;
          }
        }
        _ => {
          tally.unresolved += 1;
          report.unresolved.push(record.permit_number.clone());
        }
      }

      for entry in record.note_entries().filter(|e| e.starts_with(AMBIGUOUS_PREFIX)) {
        report.flagged.push(FlaggedPermit {
          permit_number: record.permit_number.clone(),
          note:          entry.to_owned(),
        });
      }
    }

    report
  }

  /// Share of records that resolved; `1.0` for an empty table.
  pub fn resolved_fraction(&self) -> f64 {
    if self.total == 0 {
      return 1.0;
    }
    self.resolved as f64 / self.total as f64
  }

  /// Share of all records resolved by `strategy`.
  pub fn strategy_fraction(&self, strategy: MatchStrategy) -> f64 {
    if self.total == 0 {
      return 0.0;
    }
    let n = self.resolved_by_strategy.get(&strategy).copied().unwrap_or(0);
    n as f64 / self.total as f64
  }

  /// Whether a person has to look at this table: something is unresolved or
  /// an ambiguous match was taken.
  pub fn needs_manual_pass(&self) -> bool {
    !self.unresolved.is_empty() || !self.flagged.is_empty()
  }

  /// Write the report as `section,key,value` rows.
  pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
    let mut csv = csv::WriterBuilder::new().from_writer(writer);
    csv.write_record(["section", "key", "value"])?;

    csv.write_record(["summary", "table", self.table.as_str()])?;
    csv.write_record(["summary", "total", self.total.to_string().as_str()])?;
    csv.write_record(["summary", "resolved", self.resolved.to_string().as_str()])?;
    csv.write_record(["summary", "unresolved", self.unresolved.len().to_string().as_str()])?;

    for (strategy, n) in &self.resolved_by_strategy {
      csv.write_record(["strategy", strategy.to_string().as_str(), n.to_string().as_str()])?;
    }
    for permit in &self.unresolved {
      csv.write_record(["unresolved", permit.as_str(), ""])?;
    }
    for flagged in &self.flagged {
      csv.write_record(["flagged", flagged.permit_number.as_str(), flagged.note.as_str()])?;
    }
    for anomaly in &self.reference_inconsistencies {
      let (kind, parcel) = match anomaly {
        Anomaly::ParcelWithoutGeometry { parcel_id } => ("parcel_without_geometry", parcel_id),
        Anomaly::InvalidParcelGeometry { parcel_id } => ("invalid_parcel_geometry", parcel_id),
      };
      csv.write_record(["inconsistency", kind, parcel.as_str()])?;
    }
    for (label, tally) in &self.by_permit_type {
      csv.write_record(["type_permits", label.as_str(), tally.permits.to_string().as_str()])?;
      csv.write_record(["type_dwellings", label.as_str(), tally.dwellings.to_string().as_str()])?;
      csv.write_record(["type_unresolved", label.as_str(), tally.unresolved.to_string().as_str()])?;
    }

    csv.flush().map_err(csv::Error::from)?;
    Ok(())
  }
}

impl fmt::Display for ReconciliationReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Table {}", self.table)?;
    writeln!(
      f,
      "  resolved {}/{} ({:.1}%)",
      self.resolved,
      self.total,
      self.resolved_fraction() * 100.0
    )?;
    for (strategy, n) in &self.resolved_by_strategy {
      writeln!(
        f,
        "    {:<18} {:>6} ({:.1}%)",
        strategy.to_string(),
        n,
        self.strategy_fraction(*strategy) * 100.0
      )?;
    }

    if !self.by_permit_type.is_empty() {
      writeln!(f, "  by permit type:")?;
      for (label, tally) in &self.by_permit_type {
        writeln!(
          f,
          "    {:<40} {:>6} permits {:>7} dwellings {:>5} unresolved",
          label, tally.permits, tally.dwellings, tally.unresolved
        )?;
      }
    }

    if !self.reference_inconsistencies.is_empty() {
      writeln!(f, "  reference inconsistencies: {}", self.reference_inconsistencies.len())?;
    }
    if !self.flagged.is_empty() {
      writeln!(f, "  flagged for review: {}", self.flagged.len())?;
      for flagged in &self.flagged {
        writeln!(f, "    {}: {}", flagged.permit_number, flagged.note)?;
      }
    }
    if !self.unresolved.is_empty() {
      writeln!(f, "  unresolved: {}", self.unresolved.join(", "))?;
    }
    Ok(())
  }
}
