//! Planar geometry used by lattice filtering and partitioning.
//!
//! Purpose
//! - Keep the vector type identical to nalgebra's (`Vec2`) so callers get
//!   add/sub/scale/normalize/dot/distance for free.
//! - Provide the few polygon predicates `Lattice::partition` needs: convex
//!   hull, point-in-polygon, nearest point on an edge, circle/polygon overlap.
//!
//! Code cross-refs: `lattice::Lattice::{bounds, partition}`

mod hull;
mod types;

pub use hull::{circle_intersects_polygon, convex_hull, nearest_point_on_segment, point_in_polygon};
pub use types::{xy, BoundingBox};

/// 2D point/vector value type.
pub type Vec2 = nalgebra::Vector2<f64>;

/// Euclidean distance between two points.
#[inline]
pub fn distance(a: Vec2, b: Vec2) -> f64 {
    (a - b).norm()
}
