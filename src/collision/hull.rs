//! Convex hull construction (quickhull with point welding and collinear removal).

use glam::Vec2;

use crate::error::CollisionError;

use super::math::{cross, Aabb};
use super::{LINEAR_SLOP, MAX_POLYGON_VERTICES};

/// A convex hull with counter-clockwise winding. Produced by [`compute_hull`];
/// do not fill it in by hand.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Hull {
    pub points: [Vec2; MAX_POLYGON_VERTICES],
    pub count: usize,
}

impl Hull {
    /// The live hull points.
    pub fn points(&self) -> &[Vec2] {
        &self.points[..self.count]
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    fn push(&mut self, p: Vec2) {
        self.points[self.count] = p;
        self.count += 1;
    }
}

// Hull of the points strictly right of p1 -> p2, excluding p1 and p2.
fn recurse_hull(p1: Vec2, p2: Vec2, ps: &[Vec2]) -> Hull {
    let mut hull = Hull::default();
    if ps.is_empty() {
        return hull;
    }

    let e = (p2 - p1).normalize_or_zero();

    let mut right_points = [Vec2::ZERO; MAX_POLYGON_VERTICES];
    let mut right_count = 0;

    let mut best_index = 0;
    let mut best_distance = cross(ps[0] - p1, e);
    if best_distance > 0.0 {
        right_points[right_count] = ps[0];
        right_count += 1;
    }

    for (i, &p) in ps.iter().enumerate().skip(1) {
        let distance = cross(p - p1, e);
        if distance > best_distance {
            best_index = i;
            best_distance = distance;
        }
        if distance > 0.0 {
            right_points[right_count] = p;
            right_count += 1;
        }
    }

    if best_distance < 2.0 * LINEAR_SLOP {
        return hull;
    }

    let best_point = ps[best_index];
    let right = &right_points[..right_count];
    let hull1 = recurse_hull(p1, best_point, right);
    let hull2 = recurse_hull(best_point, p2, right);

    for &p in hull1.points() {
        hull.push(p);
    }
    hull.push(best_point);
    for &p in hull2.points() {
        hull.push(p);
    }
    hull
}

/// Compute the convex hull of a point set, reporting why it failed.
///
/// Close points are welded and collinear points removed. Fails for fewer than
/// three points, more than [`MAX_POLYGON_VERTICES`] points, and coincident or
/// collinear input.
pub fn try_compute_hull(points: &[Vec2]) -> Result<Hull, CollisionError> {
    let count = points.len();
    if count < 3 {
        return Err(CollisionError::TooFewPoints { count });
    }
    if count > MAX_POLYGON_VERTICES {
        return Err(CollisionError::TooManyPoints {
            count,
            max: MAX_POLYGON_VERTICES,
        });
    }

    let mut aabb = Aabb::new(Vec2::splat(f32::MAX), Vec2::splat(-f32::MAX));

    // Aggressive welding. The first point always survives.
    let mut ps = [Vec2::ZERO; MAX_POLYGON_VERTICES];
    let mut n = 0;
    let tol_sqr = 16.0 * LINEAR_SLOP * LINEAR_SLOP;
    for (i, &vi) in points.iter().enumerate() {
        aabb.lower = aabb.lower.min(vi);
        aabb.upper = aabb.upper.max(vi);

        let unique = points[..i]
            .iter()
            .all(|&vj| vi.distance_squared(vj) >= tol_sqr);
        if unique {
            ps[n] = vi;
            n += 1;
        }
    }

    if n < 3 {
        return Err(CollisionError::DegenerateHull);
    }

    // Extreme point relative to the bounding box center starts the hull.
    let c = aabb.center();
    let f1 = farthest_from(c, &ps[..n]);
    let p1 = ps[f1];
    ps[f1] = ps[n - 1];
    n -= 1;

    let f2 = farthest_from(p1, &ps[..n]);
    let p2 = ps[f2];
    ps[f2] = ps[n - 1];
    n -= 1;

    let mut right_points = [Vec2::ZERO; MAX_POLYGON_VERTICES - 2];
    let mut right_count = 0;
    let mut left_points = [Vec2::ZERO; MAX_POLYGON_VERTICES - 2];
    let mut left_count = 0;

    let e = (p2 - p1).normalize_or_zero();
    for &p in &ps[..n] {
        let d = cross(p - p1, e);
        // skip points very close to the line p1-p2
        if d >= 2.0 * LINEAR_SLOP {
            right_points[right_count] = p;
            right_count += 1;
        } else if d <= -2.0 * LINEAR_SLOP {
            left_points[left_count] = p;
            left_count += 1;
        }
    }

    let hull1 = recurse_hull(p1, p2, &right_points[..right_count]);
    let hull2 = recurse_hull(p2, p1, &left_points[..left_count]);

    if hull1.is_empty() && hull2.is_empty() {
        return Err(CollisionError::DegenerateHull);
    }

    let mut hull = Hull::default();
    hull.push(p1);
    for &p in hull1.points() {
        hull.push(p);
    }
    hull.push(p2);
    for &p in hull2.points() {
        hull.push(p);
    }

    remove_collinear(&mut hull);

    if hull.count < 3 {
        return Err(CollisionError::DegenerateHull);
    }

    Ok(hull)
}

/// Compute the convex hull of a point set. Returns an empty hull on failure.
///
/// See [`try_compute_hull`] for the failure cases.
pub fn compute_hull(points: &[Vec2]) -> Hull {
    try_compute_hull(points).unwrap_or_default()
}

fn farthest_from(origin: Vec2, ps: &[Vec2]) -> usize {
    let mut best = 0;
    let mut best_dsq = origin.distance_squared(ps[0]);
    for (i, &p) in ps.iter().enumerate().skip(1) {
        let dsq = origin.distance_squared(p);
        if dsq > best_dsq {
            best = i;
            best_dsq = dsq;
        }
    }
    best
}

fn remove_collinear(hull: &mut Hull) {
    let mut searching = true;
    while searching && hull.count > 2 {
        searching = false;

        for i in 0..hull.count {
            let i2 = (i + 1) % hull.count;
            let i3 = (i + 2) % hull.count;

            let s1 = hull.points[i];
            let s2 = hull.points[i2];
            let s3 = hull.points[i3];

            let r = (s3 - s1).normalize_or_zero();
            let distance = cross(s2 - s1, r);
            if distance <= 2.0 * LINEAR_SLOP {
                // drop the midpoint and rescan
                hull.points.copy_within(i2 + 1..hull.count, i2);
                hull.count -= 1;
                searching = true;
                break;
            }
        }
    }
}

/// Check convexity and absence of collinear points. Expensive; intended for tests and tooling.
pub fn validate_hull(hull: &Hull) -> bool {
    if hull.count < 3 || hull.count > MAX_POLYGON_VERTICES {
        return false;
    }

    let count = hull.count;

    // every point is behind every edge
    for i1 in 0..count {
        let i2 = if i1 < count - 1 { i1 + 1 } else { 0 };
        let p = hull.points[i1];
        let e = (hull.points[i2] - p).normalize_or_zero();

        for j in 0..count {
            if j == i1 || j == i2 {
                continue;
            }
            if cross(hull.points[j] - p, e) >= 0.0 {
                return false;
            }
        }
    }

    for i1 in 0..count {
        let i2 = (i1 + 1) % count;
        let i3 = (i1 + 2) % count;

        let p1 = hull.points[i1];
        let p2 = hull.points[i2];
        let p3 = hull.points[i3];

        let e = (p3 - p1).normalize_or_zero();
        if cross(p2 - p1, e) <= LINEAR_SLOP {
            return false;
        }
    }

    true
}
