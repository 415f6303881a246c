//! Core types and trait definitions for permit reconciliation.
//!
//! This crate has no database or I/O dependencies. It holds the
//! permit and reference data model, the planar geometry the spatial join
//! relies on, and the repository traits every backend implements.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod geometry;
pub mod memory;
pub mod permit;
pub mod permit_type;
pub mod reference;
pub mod store;

pub use error::{Error, Result};
