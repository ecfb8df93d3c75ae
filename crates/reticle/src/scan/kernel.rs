//! Tangent-angle kernel.
//!
//! For a lattice point `L`, origin `O` and zero `z`, the tangent length is
//! `t = sqrt(|L-O|² - z²)` and the two candidate rotations are
//! `2·atan2(Δy ± t, Δx + z)` in degrees, wrapped to `[0, 360)`.

use rand::Rng;

use crate::geom::Vec2;

const RAD2DEG: f64 = 180.0 / std::f64::consts::PI;

/// Normalize degrees into `[0, 360)`.
#[inline]
pub fn wrap360(deg: f64) -> f64 {
    let w = deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360
    if w >= 360.0 {
        0.0
    } else {
        w
    }
}

/// Both tangent rotations, or `None` when the radicand is negative (the
/// point lies inside the zero's circle) or `t > limit`.
#[inline]
pub fn all_angles(lattice: Vec2, origin: Vec2, zero: f64, limit: f64) -> Option<(f64, f64)> {
    let dx = lattice.x - origin.x;
    let dy = lattice.y - origin.y;
    let t = (dx * dx + dy * dy - zero * zero).sqrt();
    if t.is_nan() || t > limit {
        return None;
    }
    let theta1 = wrap360(RAD2DEG * 2.0 * (dy + t).atan2(dx + zero));
    let theta2 = wrap360(RAD2DEG * 2.0 * (dy - t).atan2(dx + zero));
    Some((theta1, theta2))
}

/// Hit flags indexed by `(bucket, zero)`; a cell is set once no matter how
/// many lattice points land in it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketMatrix {
    bucket_count: usize,
    zero_count: usize,
    cells: Vec<bool>,
}

impl BucketMatrix {
    pub fn new(bucket_count: usize, zero_count: usize) -> Self {
        Self {
            bucket_count,
            zero_count,
            cells: vec![false; bucket_count * zero_count],
        }
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    #[inline]
    pub fn zero_count(&self) -> usize {
        self.zero_count
    }

    #[inline]
    pub fn get(&self, bucket: usize, zero: usize) -> bool {
        self.cells[bucket * self.zero_count + zero]
    }

    #[inline]
    pub fn set(&mut self, bucket: usize, zero: usize) {
        self.cells[bucket * self.zero_count + zero] = true;
    }

    /// Flags of one bucket, one per zero.
    pub fn row(&self, bucket: usize) -> &[bool] {
        let start = bucket * self.zero_count;
        &self.cells[start..start + self.zero_count]
    }

    /// Number of distinct zeros hit in `bucket`.
    pub fn hits(&self, bucket: usize) -> usize {
        self.row(bucket).iter().filter(|&&c| c).count()
    }

    /// `(bucket, zero)` of every set cell.
    pub fn set_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| **c)
            .map(move |(i, _)| (i / self.zero_count, i % self.zero_count))
    }
}

/// Bucket matrix for one origin.
///
/// Panics if a wrapped angle falls outside `[0, 360)`: that can only be a
/// defect in `wrap360`, never a property of the input.
pub fn calculate(
    origin: Vec2,
    lattice: &[Vec2],
    zeros: &[f64],
    limit: f64,
    bucket_count: usize,
) -> BucketMatrix {
    let mut buckets = BucketMatrix::new(bucket_count, zeros.len());
    if bucket_count == 0 {
        return buckets;
    }
    let deg_per_bucket = 360.0 / bucket_count as f64;
    let index = |theta: f64| -> usize {
        assert!(
            (0.0..360.0).contains(&theta),
            "theta {theta} outside [0, 360) (origin {origin:?})"
        );
        // theta just below 360 can divide out to bucket_count when 360/n rounded down
        ((theta / deg_per_bucket) as usize).min(bucket_count - 1)
    };
    for &point in lattice {
        for (i, &zero) in zeros.iter().enumerate() {
            let Some((theta1, theta2)) = all_angles(point, origin, zero, limit) else {
                continue;
            };
            buckets.set(index(theta1), i);
            buckets.set(index(theta2), i);
        }
    }
    buckets
}

/// `count` origins uniform in `[-radius, radius]²` around `center`.
pub fn rand_origins<R: Rng>(rng: &mut R, radius: f64, center: Vec2, count: usize) -> Vec<Vec2> {
    (0..count)
        .map(|_| {
            Vec2::new(
                -radius + rng.gen::<f64>() * 2.0 * radius + center.x,
                -radius + rng.gen::<f64>() * 2.0 * radius + center.y,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::vector;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn angle_regression_fixture() {
        let lattice = vector![123.45, 456.789];
        let origin = vector![-0.8804702, -0.0348327];
        let (t1, t2) = all_angles(lattice, origin, 13.0, f64::INFINITY).unwrap();
        assert_eq!(t1, 163.2015290584845);
        assert_eq!(t2, 346.3484439376577);
        let (m1, m2) = all_angles(lattice, origin, 13.0, f64::MAX).unwrap();
        assert_eq!((m1, m2), (t1, t2));
    }

    #[test]
    fn point_inside_zero_circle_has_no_angles() {
        // |L-O| ≈ 0.88 < 13: negative radicand
        let origin = vector![-0.8804702, -0.0348327];
        assert!(all_angles(Vec2::zeros(), origin, 13.0, f64::INFINITY).is_none());
    }

    #[test]
    fn tangent_limit_rejects_far_points() {
        let origin = Vec2::zeros();
        // |L-O| = 5, z = 3 -> t = 4
        let l = vector![5.0, 0.0];
        assert!(all_angles(l, origin, 3.0, 4.0).is_some());
        assert!(all_angles(l, origin, 3.0, 3.999).is_none());
    }

    #[test]
    fn wrap_edges() {
        assert_eq!(wrap360(0.0), 0.0);
        assert_eq!(wrap360(360.0), 0.0);
        assert_eq!(wrap360(-90.0), 270.0);
        assert_eq!(wrap360(720.5), 0.5);
        assert_eq!(wrap360(-1e-18), 0.0);
    }

    #[test]
    fn matrix_cells_are_idempotent() {
        // Several points on the same tangent directions must not double count.
        let origin = Vec2::zeros();
        let pts = vec![vector![5.0, 0.0], vector![5.0, 0.0], vector![5.0, 0.0]];
        let m = calculate(origin, &pts, &[3.0], f64::INFINITY, 360);
        assert_eq!(m.set_cells().count(), 2);
        for b in 0..m.bucket_count() {
            assert!(m.hits(b) <= 1);
        }
    }

    #[test]
    fn angle_just_below_360_lands_in_last_bucket() {
        let point = vector![3.000000000000002, 4.0];
        let (_, theta2) = all_angles(point, Vec2::zeros(), 3.0, f64::INFINITY).unwrap();
        assert_eq!(theta2, 359.99999999999994);
        for n in [19usize, 33, 38, 39, 66, 360, 3600] {
            let m = calculate(Vec2::zeros(), &[point], &[3.0], f64::INFINITY, n);
            assert!(m.get(n - 1, 0), "n = {n}");
        }
    }

    #[test]
    fn matrix_shape_matches_inputs() {
        let pts: Vec<Vec2> = (0..20).map(|i| vector![i as f64, 3.0]).collect();
        let zeros = [1.0, 2.0, 3.0, 5.0];
        let m = calculate(vector![0.2, -0.4], &pts, &zeros, 1.0, 3600);
        assert_eq!(m.bucket_count(), 3600);
        assert_eq!(m.zero_count(), zeros.len());
        assert_eq!(m.row(0).len(), zeros.len());
    }

    #[test]
    fn origins_stay_in_square() {
        let mut rng = StdRng::seed_from_u64(7);
        let center = vector![10.0, -3.0];
        let origins = rand_origins(&mut rng, 0.5, center, 500);
        assert_eq!(origins.len(), 500);
        for o in origins {
            assert!((o.x - center.x).abs() <= 0.5 && (o.y - center.y).abs() <= 0.5);
        }
    }

    proptest! {
        #[test]
        fn wrap_lands_in_range_and_is_periodic(deg in -1.0e4f64..1.0e4, k in -50i32..50) {
            let w = wrap360(deg);
            prop_assert!((0.0..360.0).contains(&w));
            let shifted = wrap360(deg + 360.0 * k as f64);
            prop_assert!((0.0..360.0).contains(&shifted));
            let diff = (w - shifted).abs();
            // equal up to rounding of the shift, measured around the circle
            prop_assert!(diff.min(360.0 - diff) < 1e-9);
        }

        #[test]
        fn buckets_always_in_range(
            pts in prop::collection::vec((-40.0f64..40.0, -40.0f64..40.0), 1..60),
            ox in -2.0f64..2.0,
            oy in -2.0f64..2.0,
            zeros in prop::collection::vec(-30.0f64..30.0, 1..12),
            limit in prop_oneof![Just(f64::INFINITY), 0.0f64..10.0],
            bucket_count in prop_oneof![Just(1usize), Just(7), Just(360), Just(3600), 2usize..5000],
        ) {
            let points: Vec<Vec2> = pts.iter().map(|&(x, y)| vector![x, y]).collect();
            let m = calculate(vector![ox, oy], &points, &zeros, limit, bucket_count);
            for (b, z) in m.set_cells() {
                prop_assert!(b < bucket_count);
                prop_assert!(z < zeros.len());
            }
        }
    }
}
