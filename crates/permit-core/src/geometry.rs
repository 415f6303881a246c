//! Planar geometry used by the spatial join.
//!
//! All coordinates live in one projected coordinate system; nothing here
//! reprojects. Polygons follow the simple-features model (one exterior ring,
//! zero or more holes) and rings may be supplied open or explicitly closed.
//!
//! The predicates mirror the spatial SQL functions the reference data was
//! originally queried with: `contains` excludes the boundary, `intersects`
//! includes it.

use serde::{Deserialize, Serialize};

// ─── Point ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
  pub x: f64,
  pub y: f64,
}

impl Point {
  pub const fn new(x: f64, y: f64) -> Self { Self { x, y } }

  /// A point is malformed when either coordinate is NaN or infinite.
  pub fn is_valid(&self) -> bool { self.x.is_finite() && self.y.is_finite() }
}

// ─── Rect ────────────────────────────────────────────────────────────────────

/// Axis-aligned bounding box; used as a cheap pre-filter before exact tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
  pub min: Point,
  pub max: Point,
}

impl Rect {
  fn from_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Self> {
    let mut points = points.into_iter().filter(|p| p.is_valid());
    let first = points.next()?;
    let mut rect = Rect { min: *first, max: *first };
    for p in points {
      rect.min.x = rect.min.x.min(p.x);
      rect.min.y = rect.min.y.min(p.y);
      rect.max.x = rect.max.x.max(p.x);
      rect.max.y = rect.max.y.max(p.y);
    }
    Some(rect)
  }

  pub fn intersects(&self, other: &Rect) -> bool {
    self.min.x <= other.max.x
      && other.min.x <= self.max.x
      && self.min.y <= other.max.y
      && other.min.y <= self.max.y
  }
}

// ─── Polygon ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
  pub exterior:  Vec<Point>,
  #[serde(default)]
  pub interiors: Vec<Vec<Point>>,
}

impl Polygon {
  pub fn new(exterior: Vec<Point>, interiors: Vec<Vec<Point>>) -> Self {
    Self { exterior, interiors }
  }

  /// Convenience constructor for a polygon without holes.
  pub fn from_exterior(exterior: Vec<Point>) -> Self { Self::new(exterior, Vec::new()) }

  fn rings(&self) -> impl Iterator<Item = &[Point]> {
    std::iter::once(self.exterior.as_slice())
      .chain(self.interiors.iter().map(Vec::as_slice))
  }

  pub fn bounding_rect(&self) -> Option<Rect> { Rect::from_points(&self.exterior) }

  fn on_boundary(&self, p: &Point) -> bool {
    self
      .rings()
      .any(|ring| ring_edges(ring).any(|(a, b)| on_segment(p, &a, &b)))
  }

  /// `true` when `p` lies strictly inside the polygon (not on its boundary,
  /// not inside a hole).
  pub fn contains(&self, p: &Point) -> bool {
    if !p.is_valid() || self.on_boundary(p) {
      return false;
    }
    ring_encloses(&self.exterior, p)
      && !self.interiors.iter().any(|hole| ring_encloses(hole, p))
  }

  /// `true` when `p` lies inside the polygon or on its boundary.
  pub fn intersects_point(&self, p: &Point) -> bool {
    p.is_valid() && (self.on_boundary(p) || self.contains(p))
  }

  /// `true` when the two polygons share at least one point.
  pub fn intersects(&self, other: &Polygon) -> bool {
    match (self.bounding_rect(), other.bounding_rect()) {
      (Some(a), Some(b)) if a.intersects(&b) => {}
      _ => return false,
    }

    let edges_cross = self.rings().any(|r1| {
      ring_edges(r1).any(|(a, b)| {
        other
          .rings()
          .any(|r2| ring_edges(r2).any(|(c, d)| segments_intersect(&a, &b, &c, &d)))
      })
    });

    edges_cross
      || other.exterior.iter().any(|p| self.intersects_point(p))
      || self.exterior.iter().any(|p| other.intersects_point(p))
  }

  /// Area of the exterior minus the area of the holes.
  pub fn area(&self) -> f64 {
    let holes: f64 = self.interiors.iter().map(|r| signed_area(r).abs()).sum();
    signed_area(&self.exterior).abs() - holes
  }

  /// Area-weighted centroid. May fall outside a concave or holed polygon;
  /// use [`Polygon::interior_point`] when the point must lie inside.
  pub fn centroid(&self) -> Option<Point> {
    let mut total = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;

    for (i, ring) in self.rings().enumerate() {
      let weight = if i == 0 { 1.0 } else { -1.0 };
      let mut area2 = 0.0;
      let mut rx = 0.0;
      let mut ry = 0.0;
      for (a, b) in ring_edges(ring) {
        let c = a.x * b.y - b.x * a.y;
        area2 += c;
        rx += (a.x + b.x) * c;
        ry += (a.y + b.y) * c;
      }
      if area2 == 0.0 {
        continue;
      }
      let area = (area2 / 2.0).abs();
      total += weight * area;
      cx += weight * area * (rx / (3.0 * area2));
      cy += weight * area * (ry / (3.0 * area2));
    }

    if total <= 0.0 || !total.is_finite() {
      return None;
    }
    let centroid = Point::new(cx / total, cy / total);
    centroid.is_valid().then_some(centroid)
  }

  /// A point guaranteed to lie strictly inside the polygon.
  ///
  /// Scans a horizontal line placed between two vertex heights near the
  /// vertical middle of the shape and returns the midpoint of the widest
  /// inside interval. Returns `None` for degenerate polygons.
  pub fn interior_point(&self) -> Option<Point> {
    let rect = self.bounding_rect()?;
    let centre = (rect.min.y + rect.max.y) / 2.0;

    let heights = self.rings().flat_map(|r| r.iter().map(|p| p.y));
    let mut below: Option<f64> = None;
    let mut above: Option<f64> = None;
    for y in heights {
      if y <= centre {
        below = Some(below.map_or(y, |b: f64| b.max(y)));
      } else {
        above = Some(above.map_or(y, |a: f64| a.min(y)));
      }
    }
    let scan_y = (below? + above?) / 2.0;

    let mut crossings: Vec<f64> = self
      .rings()
      .flat_map(ring_edges)
      .filter(|(a, b)| (a.y > scan_y) != (b.y > scan_y))
      .map(|(a, b)| a.x + (scan_y - a.y) * (b.x - a.x) / (b.y - a.y))
      .collect();
    crossings.sort_by(f64::total_cmp);

    let (left, right) = crossings
      .chunks_exact(2)
      .map(|pair| (pair[0], pair[1]))
      .fold(None, |best: Option<(f64, f64)>, (l, r)| match best {
        Some((bl, br)) if br - bl >= r - l => Some((bl, br)),
        _ => Some((l, r)),
      })?;

    if right - left <= 0.0 {
      return None;
    }
    Some(Point::new((left + right) / 2.0, scan_y))
  }

  /// Structural validity: finite coordinates, non-degenerate rings and no
  /// ring crossing itself.
  pub fn is_valid(&self) -> bool {
    if !self.rings().all(|r| r.iter().all(Point::is_valid)) {
      return false;
    }
    if signed_area(&self.exterior) == 0.0 {
      return false;
    }
    self.rings().all(|ring| {
      let vertices = distinct_vertices(ring);
      vertices.len() >= 3 && !self_intersects(&vertices)
    })
  }
}

// ─── Geometry ────────────────────────────────────────────────────────────────

/// The argument type of spatial predicates that accept either a point or a
/// polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
  Point(Point),
  Polygon(Polygon),
}

impl Geometry {
  pub fn bounding_rect(&self) -> Option<Rect> {
    match self {
      Self::Point(p) => Rect::from_points([p]),
      Self::Polygon(poly) => poly.bounding_rect(),
    }
  }

  /// Whether this geometry shares any point with `polygon`.
  pub fn intersects_polygon(&self, polygon: &Polygon) -> bool {
    match self {
      Self::Point(p) => polygon.intersects_point(p),
      Self::Polygon(poly) => polygon.intersects(poly),
    }
  }
}

impl From<Point> for Geometry {
  fn from(p: Point) -> Self { Self::Point(p) }
}

impl From<Polygon> for Geometry {
  fn from(p: Polygon) -> Self { Self::Polygon(p) }
}

// ─── Ring helpers ────────────────────────────────────────────────────────────

/// Number of vertices ignoring an explicit closing vertex.
fn open_len(ring: &[Point]) -> usize {
  match ring {
    [first, .., last] if first == last => ring.len() - 1,
    _ => ring.len(),
  }
}

fn ring_edges(ring: &[Point]) -> impl Iterator<Item = (Point, Point)> + '_ {
  let n = open_len(ring);
  (0..n).map(move |i| (ring[i], ring[(i + 1) % n]))
}

/// Vertices with consecutive duplicates and the closing vertex removed.
fn distinct_vertices(ring: &[Point]) -> Vec<Point> {
  let mut vertices = ring.to_vec();
  vertices.dedup();
  if vertices.len() > 1 && vertices.first() == vertices.last() {
    vertices.pop();
  }
  vertices
}

fn signed_area(ring: &[Point]) -> f64 {
  ring_edges(ring).map(|(a, b)| a.x * b.y - b.x * a.y).sum::<f64>() / 2.0
}

/// Even-odd test; the caller handles points on the boundary.
fn ring_encloses(ring: &[Point], p: &Point) -> bool {
  let mut inside = false;
  for (a, b) in ring_edges(ring) {
    if (a.y > p.y) != (b.y > p.y) {
      let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
      if p.x < x {
        inside = !inside;
      }
    }
  }
  inside
}

fn self_intersects(vertices: &[Point]) -> bool {
  let n = vertices.len();
  let edge = |i: usize| (vertices[i], vertices[(i + 1) % n]);
  for i in 0..n {
    for j in (i + 2)..n {
      if i == 0 && j == n - 1 {
        continue;
      }
      let (a, b) = edge(i);
      let (c, d) = edge(j);
      if segments_intersect(&a, &b, &c, &d) {
        return true;
      }
    }
  }
  false
}

fn cross(o: &Point, a: &Point, b: &Point) -> f64 {
  (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn within_span(p: &Point, a: &Point, b: &Point) -> bool {
  p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

fn on_segment(p: &Point, a: &Point, b: &Point) -> bool {
  cross(a, b, p) == 0.0 && within_span(p, a, b)
}

fn segments_intersect(a: &Point, b: &Point, c: &Point, d: &Point) -> bool {
  let d1 = cross(c, d, a);
  let d2 = cross(c, d, b);
  let d3 = cross(a, b, c);
  let d4 = cross(a, b, d);

  if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
    && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
  {
    return true;
  }

  (d1 == 0.0 && within_span(a, c, d))
    || (d2 == 0.0 && within_span(b, c, d))
    || (d3 == 0.0 && within_span(c, a, b))
    || (d4 == 0.0 && within_span(d, a, b))
}
