//! Bounding boxes and the `{X, Y}` wire adapter for `Vec2`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::Vec2;

/// Axis-aligned box stored as center plus half-size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub center: Vec2,
    /// Half the total size on each axis.
    pub extents: Vec2,
}

impl BoundingBox {
    /// Min/max reduction over `points`; the zero box for an empty slice.
    pub fn from_points(points: &[Vec2]) -> Self {
        let Some(first) = points.first() else {
            return Self::default();
        };
        let (min, max) = points.iter().skip(1).fold((*first, *first), |(lo, hi), p| {
            (lo.inf(p), hi.sup(p))
        });
        Self {
            center: (min + max) / 2.0,
            extents: (max - min).abs() / 2.0,
        }
    }

    #[inline]
    pub fn min(&self) -> Vec2 {
        self.center - self.extents
    }

    #[inline]
    pub fn max(&self) -> Vec2 {
        self.center + self.extents
    }

    #[inline]
    pub fn size(&self) -> Vec2 {
        self.extents * 2.0
    }

    pub fn contains(&self, p: Vec2) -> bool {
        let (lo, hi) = (self.min(), self.max());
        p.x >= lo.x && p.x <= hi.x && p.y >= lo.y && p.y <= hi.y
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            center: Vec2::zeros(),
            extents: Vec2::zeros(),
        }
    }
}

/// Serde adapter writing a `Vec2` as `{"X": .., "Y": ..}`.
///
/// Use with `#[serde(with = "crate::geom::xy")]`.
pub mod xy {
    use super::*;

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Xy {
        x: f64,
        y: f64,
    }

    pub fn serialize<S: Serializer>(v: &Vec2, s: S) -> Result<S::Ok, S::Error> {
        Xy { x: v.x, y: v.y }.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec2, D::Error> {
        let p = Xy::deserialize(d)?;
        Ok(Vec2::new(p.x, p.y))
    }
}
