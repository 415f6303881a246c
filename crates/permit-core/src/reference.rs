//! Authoritative reference data: address points and parcels.
//!
//! Both are read-only from the engine's point of view.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Polygon};

/// A geocoded street address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressPoint {
  pub full_address: String,
  pub parcel_id:    String,
  pub geometry:     Point,
}

/// A land parcel. The polygon may be absent or structurally invalid in the
/// source layer; callers must check before trusting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
  pub parcel_id: String,
  pub geometry:  Option<Polygon>,
}

impl Parcel {
  /// The polygon, if present and structurally valid.
  pub fn valid_geometry(&self) -> Option<&Polygon> {
    self.geometry.as_ref().filter(|g| g.is_valid())
  }
}

/// SQL `LIKE` matching: `%` matches any run of characters, `_` exactly one.
/// ASCII letters compare case-insensitively.
pub fn like_matches(pattern: &str, text: &str) -> bool {
  let pattern: Vec<char> = pattern.chars().collect();
  let text: Vec<char> = text.chars().collect();

  let (mut p, mut t) = (0, 0);
  let mut backtrack: Option<(usize, usize)> = None;

  while t < text.len() {
    match pattern.get(p) {
      Some('%') => {
        backtrack = Some((p, t));
        p += 1;
      }
      Some('_') => {
        p += 1;
        t += 1;
      }
      Some(c) if c.eq_ignore_ascii_case(&text[t]) => {
        p += 1;
        t += 1;
      }
      _ => match backtrack {
        Some((bp, bt)) => {
          backtrack = Some((bp, bt + 1));
          p = bp + 1;
          t = bt + 1;
        }
        None => return false,
      },
    }
  }

  pattern[p..].iter().all(|c| *c == '%')
}
