//! Address reconciliation and spatial join for building-permit tables.
//!
//! [`MatchEngine`] decides how one permit joins the reference data,
//! [`RepairPipeline`] applies those decisions pass by pass until every record
//! is resolved or explicitly unresolved, and [`ReconciliationReport`]
//! summarizes the outcome. Storage is reached only through the
//! [`permit_core::store`] traits.

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod report;

pub use config::{CondoRule, ReconcileConfig};
pub use engine::{Anomaly, Decision, MatchEngine, MatchResult};
pub use error::{Error, Result};
pub use pipeline::{PipelineOutcome, RepairPipeline};
pub use report::ReconciliationReport;
