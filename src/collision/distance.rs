//! GJK closest points, segment distance and linear shape casting.

use glam::Vec2;

use super::collider::CastOutput;
use super::math::{cross, cross_sv, cross_vs, Rot, Transform};
use super::{GJK_MAX_ITERATIONS, LINEAR_SLOP, MAX_POLYGON_VERTICES, SHAPE_CAST_MAX_ITERATIONS};

/// Closest points between two segments.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SegmentDistanceResult {
    pub closest1: Vec2,
    pub closest2: Vec2,
    /// Barycentric coordinate on the first segment.
    pub fraction1: f32,
    /// Barycentric coordinate on the second segment.
    pub fraction2: f32,
    pub distance_squared: f32,
}

/// Distance between segments `p1-q1` and `p2-q2`, clamped to the end points.
pub fn segment_distance(p1: Vec2, q1: Vec2, p2: Vec2, q2: Vec2) -> SegmentDistanceResult {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let dd1 = d1.dot(d1);
    let dd2 = d2.dot(d2);
    let rd1 = r.dot(d1);
    let rd2 = r.dot(d2);

    let eps_sqr = f32::EPSILON * f32::EPSILON;

    let (fraction1, fraction2) = if dd1 < eps_sqr || dd2 < eps_sqr {
        if dd1 >= eps_sqr {
            // segment 2 is a point
            ((-rd1 / dd1).clamp(0.0, 1.0), 0.0)
        } else if dd2 >= eps_sqr {
            // segment 1 is a point
            (0.0, (rd2 / dd2).clamp(0.0, 1.0))
        } else {
            (0.0, 0.0)
        }
    } else {
        let d12 = d1.dot(d2);
        let denom = dd1 * dd2 - d12 * d12;

        // zero when parallel
        let mut f1 = if denom != 0.0 {
            ((d12 * rd2 - rd1 * dd2) / denom).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut f2 = (d12 * f1 + rd2) / dd2;

        // clamping segment 2 requires recomputing segment 1
        if f2 < 0.0 {
            f2 = 0.0;
            f1 = (-rd1 / dd1).clamp(0.0, 1.0);
        } else if f2 > 1.0 {
            f2 = 1.0;
            f1 = ((d12 - rd1) / dd1).clamp(0.0, 1.0);
        }

        (f1, f2)
    };

    let closest1 = p1 + fraction1 * d1;
    let closest2 = p2 + fraction2 * d2;

    SegmentDistanceResult {
        closest1,
        closest2,
        fraction1,
        fraction2,
        distance_squared: closest1.distance_squared(closest2),
    }
}

/// Point cloud with radius: the input of every GJK based query.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShapeProxy {
    pub points: [Vec2; MAX_POLYGON_VERTICES],
    /// Number of points, at least 1.
    pub count: usize,
    pub radius: f32,
}

impl ShapeProxy {
    pub fn points(&self) -> &[Vec2] {
        &self.points[..self.count]
    }

    /// Index of the point farthest along `direction`.
    #[inline]
    pub fn find_support(&self, direction: Vec2) -> usize {
        let mut best_index = 0;
        let mut best_value = self.points[0].dot(direction);
        for i in 1..self.count {
            let value = self.points[i].dot(direction);
            if value > best_value {
                best_index = i;
                best_value = value;
            }
        }
        best_index
    }
}

/// Make a proxy by copying up to [`MAX_POLYGON_VERTICES`] points.
pub fn make_proxy(points: &[Vec2], radius: f32) -> ShapeProxy {
    let count = points.len().min(MAX_POLYGON_VERTICES);
    let mut proxy = ShapeProxy {
        count,
        radius,
        ..Default::default()
    };
    proxy.points[..count].copy_from_slice(&points[..count]);
    proxy
}

/// Make a proxy from points placed at `position` with `rotation`.
pub fn make_offset_proxy(points: &[Vec2], radius: f32, position: Vec2, rotation: Rot) -> ShapeProxy {
    let transform = Transform::new(position, rotation);
    let count = points.len().min(MAX_POLYGON_VERTICES);
    let mut proxy = ShapeProxy {
        count,
        radius,
        ..Default::default()
    };
    for (dst, &src) in proxy.points.iter_mut().zip(&points[..count]) {
        *dst = transform.transform_point(src);
    }
    proxy
}

/// Warm start state for GJK, owned by the caller per ordered shape pair.
///
/// A zero count is a cold start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimplexCache {
    pub count: u16,
    pub index_a: [u8; 3],
    pub index_b: [u8; 3],
}

/// GJK simplex vertex.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimplexVertex {
    /// Support point on proxy A
    pub w_a: Vec2,
    /// Support point on proxy B
    pub w_b: Vec2,
    /// `w_b - w_a`
    pub w: Vec2,
    /// Barycentric weight of the closest point
    pub a: f32,
    pub index_a: usize,
    pub index_b: usize,
}

/// GJK simplex, 1 to 3 vertices. Exposed for tracing the algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Simplex {
    pub v1: SimplexVertex,
    pub v2: SimplexVertex,
    pub v3: SimplexVertex,
    pub count: usize,
}

/// Input for [`shape_distance`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DistanceInput {
    pub proxy_a: ShapeProxy,
    pub proxy_b: ShapeProxy,
    pub transform_a: Transform,
    pub transform_b: Transform,
    /// Subtract the proxy radii from the result.
    pub use_radii: bool,
}

/// Output of [`shape_distance`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DistanceOutput {
    /// Closest point on A
    pub point_a: Vec2,
    /// Closest point on B
    pub point_b: Vec2,
    /// Points from A to B. Invalid when the point clouds overlap.
    pub normal: Vec2,
    /// Zero when overlapped
    pub distance: f32,
    pub iterations: usize,
    /// Number of simplexes written to the trace buffer
    pub simplex_count: usize,
}

impl Simplex {
    fn vertices_mut(&mut self) -> [&mut SimplexVertex; 3] {
        [&mut self.v1, &mut self.v2, &mut self.v3]
    }

    fn vertex(&self, i: usize) -> &SimplexVertex {
        match i {
            0 => &self.v1,
            1 => &self.v2,
            _ => &self.v3,
        }
    }

    fn from_cache(cache: &SimplexCache, proxy_a: &ShapeProxy, proxy_b: &ShapeProxy) -> Simplex {
        let mut s = Simplex::default();

        let count = cache.count as usize;
        let in_range = count <= 3
            && (0..count).all(|i| {
                (cache.index_a[i] as usize) < proxy_a.count
                    && (cache.index_b[i] as usize) < proxy_b.count
            });

        if count > 0 && in_range {
            s.count = count;
            for (i, v) in s.vertices_mut().into_iter().take(count).enumerate() {
                v.index_a = cache.index_a[i] as usize;
                v.index_b = cache.index_b[i] as usize;
                v.w_a = proxy_a.points[v.index_a];
                v.w_b = proxy_b.points[v.index_b];
                v.w = v.w_b - v.w_a;
                // recomputed by the solver
                v.a = -1.0;
            }
            if count == 1 {
                s.v1.a = 1.0;
            }
            return s;
        }

        // cold start from the first points
        s.v1 = SimplexVertex {
            w_a: proxy_a.points[0],
            w_b: proxy_b.points[0],
            w: proxy_b.points[0] - proxy_a.points[0],
            a: 1.0,
            index_a: 0,
            index_b: 0,
        };
        s.count = 1;
        s
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.count = self.count as u16;
        for i in 0..self.count {
            let v = self.vertex(i);
            cache.index_a[i] = v.index_a as u8;
            cache.index_b[i] = v.index_b as u8;
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        match self.count {
            1 => (self.v1.w_a, self.v1.w_b),
            2 => (
                self.v1.a * self.v1.w_a + self.v2.a * self.v2.w_a,
                self.v1.a * self.v1.w_b + self.v2.a * self.v2.w_b,
            ),
            3 => {
                let a = self.v1.a * self.v1.w_a + self.v2.a * self.v2.w_a + self.v3.a * self.v3.w_a;
                (a, a)
            }
            _ => (Vec2::ZERO, Vec2::ZERO),
        }
    }

    // Direction from the simplex toward the origin.
    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v1.w,
            2 => {
                let e12 = self.v2.w - self.v1.w;
                let sgn = cross(e12, -self.v1.w);
                if sgn > 0.0 {
                    // origin is left of e12
                    cross_sv(1.0, e12)
                } else {
                    cross_vs(e12, 1.0)
                }
            }
            _ => Vec2::ZERO,
        }
    }

    // Closest point on the segment v1-v2 to the origin, via barycentric coordinates.
    fn solve2(&mut self) {
        let w1 = self.v1.w;
        let w2 = self.v2.w;
        let e12 = w2 - w1;

        // w1 region
        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.v1.a = 1.0;
            self.count = 1;
            return;
        }

        // w2 region
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.v2.a = 1.0;
            self.count = 1;
            self.v1 = self.v2;
            return;
        }

        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.v1.a = d12_1 * inv_d12;
        self.v2.a = d12_2 * inv_d12;
        self.count = 2;
    }

    // Voronoi region test of the triangle against the origin.
    fn solve3(&mut self) {
        let w1 = self.v1.w;
        let w2 = self.v2.w;
        let w3 = self.v3.w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        let n123 = cross(e12, e13);

        let d123_1 = n123 * cross(w2, w3);
        let d123_2 = n123 * cross(w3, w1);
        let d123_3 = n123 * cross(w1, w2);

        // w1 region
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v1.a = 1.0;
            self.count = 1;
            return;
        }

        // e12
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv_d12 = 1.0 / (d12_1 + d12_2);
            self.v1.a = d12_1 * inv_d12;
            self.v2.a = d12_2 * inv_d12;
            self.count = 2;
            return;
        }

        // e13
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv_d13 = 1.0 / (d13_1 + d13_2);
            self.v1.a = d13_1 * inv_d13;
            self.v3.a = d13_2 * inv_d13;
            self.count = 2;
            self.v2 = self.v3;
            return;
        }

        // w2 region
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v2.a = 1.0;
            self.count = 1;
            self.v1 = self.v2;
            return;
        }

        // w3 region
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v3.a = 1.0;
            self.count = 1;
            self.v1 = self.v3;
            return;
        }

        // e23
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv_d23 = 1.0 / (d23_1 + d23_2);
            self.v2.a = d23_1 * inv_d23;
            self.v3.a = d23_2 * inv_d23;
            self.count = 2;
            self.v1 = self.v3;
            return;
        }

        // origin inside the triangle
        let inv_d123 = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v1.a = d123_1 * inv_d123;
        self.v2.a = d123_2 * inv_d123;
        self.v3.a = d123_3 * inv_d123;
        self.count = 3;
    }
}

/// Closest points between two convex proxies using GJK.
///
/// The cache is read on entry and rewritten on exit; reuse it for the same ordered
/// pair across nearby poses. When `simplexes` is given, every intermediate simplex
/// is recorded until the buffer is full.
pub fn shape_distance(
    input: &DistanceInput,
    cache: &mut SimplexCache,
    mut simplexes: Option<&mut [Simplex]>,
) -> DistanceOutput {
    let mut output = DistanceOutput::default();

    let proxy_a = &input.proxy_a;

    // Work in the frame of A. B's points are moved once up front.
    let transform = input.transform_a.inv_mul(&input.transform_b);
    let mut local_proxy_b = input.proxy_b;
    for p in local_proxy_b.points.iter_mut().take(local_proxy_b.count) {
        *p = transform.transform_point(*p);
    }

    let mut simplex = Simplex::from_cache(cache, proxy_a, &local_proxy_b);

    let mut simplex_index = 0;
    let mut record = |s: &Simplex, simplexes: &mut Option<&mut [Simplex]>| {
        if let Some(buffer) = simplexes.as_deref_mut() {
            if simplex_index < buffer.len() {
                buffer[simplex_index] = *s;
                simplex_index += 1;
            }
        }
    };
    record(&simplex, &mut simplexes);

    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];

    let mut non_unit_normal = Vec2::ZERO;
    let mut iteration = 0;

    loop {
        // Snapshot so repeated support points can be detected
        let save_count = simplex.count;
        for i in 0..save_count {
            let v = simplex.vertex(i);
            save_a[i] = v.index_a;
            save_b[i] = v.index_b;
        }

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        record(&simplex, &mut simplexes);

        // origin inside the triangle: overlap
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();

        // origin on a vertex or edge: overlap, and the normal is unusable
        if d.dot(d) < f32::EPSILON * f32::EPSILON {
            non_unit_normal = Vec2::ZERO;
            break;
        }

        non_unit_normal = d;

        if iteration == GJK_MAX_ITERATIONS {
            tracing::trace!("shape_distance reached the iteration cap ({})", GJK_MAX_ITERATIONS);
            break;
        }

        // support of the Minkowski difference B - A toward the origin
        let index_a = proxy_a.find_support(-d);
        let index_b = local_proxy_b.find_support(d);
        let w_a = proxy_a.points[index_a];
        let w_b = local_proxy_b.points[index_b];

        iteration += 1;

        // repeated support point: no more progress possible
        let duplicate = (0..save_count).any(|i| save_a[i] == index_a && save_b[i] == index_b);
        if duplicate {
            break;
        }

        let vertex = SimplexVertex {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 0.0,
            index_a,
            index_b,
        };
        match simplex.count {
            1 => simplex.v2 = vertex,
            _ => simplex.v3 = vertex,
        }
        simplex.count += 1;
    }

    let (local_point_a, local_point_b) = simplex.witness_points();
    let local_normal = if simplex.count == 3 {
        Vec2::ZERO
    } else {
        // d points from B toward A
        (-non_unit_normal).normalize_or_zero()
    };

    output.normal = input.transform_a.q.rotate(local_normal);
    output.distance = local_point_a.distance(local_point_b);
    output.point_a = input.transform_a.transform_point(local_point_a);
    output.point_b = input.transform_a.transform_point(local_point_b);
    output.iterations = iteration;
    output.simplex_count = simplex_index;

    simplex.write_cache(cache);

    if input.use_radii {
        if output.distance < f32::EPSILON {
            // too close to compute a normal
            let p = 0.5 * (output.point_a + output.point_b);
            output.point_a = p;
            output.point_b = p;
            output.distance = 0.0;
        } else {
            // keep the points on the surfaces even when overlapped
            let r_a = proxy_a.radius;
            let r_b = local_proxy_b.radius;
            output.distance = (output.distance - r_a - r_b).max(0.0);
            let normal = (output.point_b - output.point_a).normalize_or_zero();
            output.point_a += r_a * normal;
            output.point_b -= r_b * normal;
        }
    }

    output
}

/// Input for [`shape_cast`]: B moves by `translation_b` while A stays fixed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShapeCastPairInput {
    pub proxy_a: ShapeProxy,
    pub proxy_b: ShapeProxy,
    pub transform_a: Transform,
    pub transform_b: Transform,
    pub translation_b: Vec2,
    /// Fraction of the translation to consider, typically 1.
    pub max_fraction: f32,
    /// Let rounded shapes that start touching move slightly closer.
    pub can_encroach: bool,
}

/// Linear shape cast by conservative advancement.
///
/// Initially touching shapes are a miss with zero fraction and normal. With
/// `can_encroach`, shapes that start touching may close in by up to the smaller
/// of the two radii before a hit is reported.
pub fn shape_cast(input: &ShapeCastPairInput) -> CastOutput {
    let radius_a = input.proxy_a.radius;
    let radius_b = input.proxy_b.radius;
    let total_radius = radius_a + radius_b;
    let mut target = LINEAR_SLOP.max(total_radius - LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;

    let mut distance_input = DistanceInput {
        proxy_a: input.proxy_a,
        proxy_b: input.proxy_b,
        transform_a: input.transform_a,
        transform_b: input.transform_b,
        use_radii: false,
    };

    let mut cache = SimplexCache::default();
    let delta2 = input.translation_b;
    let mut alpha = 0.0;

    let mut output = CastOutput::default();

    for iteration in 0..SHAPE_CAST_MAX_ITERATIONS {
        output.iterations += 1;

        let distance_output = shape_distance(&distance_input, &mut cache, None);

        if distance_output.distance < target + tolerance {
            if iteration > 0 {
                output.fraction = alpha;
                output.point = distance_output.point_a + radius_a * distance_output.normal;
                output.normal = distance_output.normal;
                output.hit = true;
                return output;
            }

            // Initial contact. Encroaching is bounded by the smaller radius.
            let encroach_floor = LINEAR_SLOP.max(total_radius - radius_a.min(radius_b));
            let encroached = distance_output.distance - LINEAR_SLOP;
            if input.can_encroach
                && distance_output.distance > 2.0 * LINEAR_SLOP
                && encroached >= encroach_floor
            {
                target = encroached;
            } else {
                return output;
            }
        }

        // approaching?
        let denominator = delta2.dot(distance_output.normal);
        if denominator >= 0.0 {
            return output;
        }

        alpha += (target - distance_output.distance) / denominator;
        if alpha >= input.max_fraction {
            return output;
        }

        distance_input.transform_b.p = input.transform_b.p + alpha * delta2;
    }

    // ran out of iterations
    output
}
