use std::cmp::Ordering;

use super::Vec2;

/// Andrew's monotone chain convex hull, counter-clockwise, no repeated closing point.
///
/// Points are sorted by x, ties by y. Collinear points on the boundary are
/// dropped (a point is kept only on a strict left turn). Fewer than three
/// distinct points come back as-is (0, 1 or 2 points).
pub fn convex_hull(points: &[Vec2]) -> Vec<Vec2> {
    let mut pts: Vec<_> = points.to_vec();
    pts.sort_by(|a, b| match a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal) {
        Ordering::Equal => a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal),
        o => o,
    });
    pts.dedup_by(|a, b| (*a - *b).norm() < 1e-12);
    if pts.len() < 3 {
        return pts;
    }
    let mut lower: Vec<Vec2> = Vec::with_capacity(pts.len());
    for p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], *p) <= 0.0 {
            lower.pop();
        }
        lower.push(*p);
    }
    let mut upper: Vec<Vec2> = Vec::with_capacity(pts.len());
    for p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], *p) <= 0.0 {
            upper.pop();
        }
        upper.push(*p);
    }
    lower.pop();
    upper.pop();
    let mut hull = lower;
    hull.extend(upper);
    hull
}

#[inline]
fn cross(a: Vec2, b: Vec2, c: Vec2) -> f64 {
    let ab = b - a;
    let ac = c - a;
    ab.x * ac.y - ab.y * ac.x
}

/// Even-odd ray cast. Points exactly on an edge may land on either side.
pub fn point_in_polygon(poly: &[Vec2], p: Vec2) -> bool {
    if poly.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        let (a, b) = (poly[i], poly[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Closest point to `p` on the segment `a..b` (projection clamped to the ends).
pub fn nearest_point_on_segment(a: Vec2, b: Vec2, p: Vec2) -> Vec2 {
    let d = b - a;
    let len2 = d.norm_squared();
    if len2 <= 0.0 {
        return a;
    }
    let t = ((p - a).dot(&d) / len2).clamp(0.0, 1.0);
    a + d * t
}

/// True if the closed disc `(center, radius)` touches the polygon.
///
/// Center inside the polygon short-circuits; otherwise every edge is tested
/// by its nearest point. Degenerate polygons (a point or a segment) work too.
pub fn circle_intersects_polygon(poly: &[Vec2], center: Vec2, radius: f64) -> bool {
    match poly.len() {
        0 => false,
        1 => (poly[0] - center).norm() <= radius,
        _ => {
            if point_in_polygon(poly, center) {
                return true;
            }
            let mut j = poly.len() - 1;
            for i in 0..poly.len() {
                let nearest = nearest_point_on_segment(poly[j], poly[i], center);
                if (nearest - center).norm() <= radius {
                    return true;
                }
                j = i;
            }
            false
        }
    }
}
