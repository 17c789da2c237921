//! Collider shapes and their geometric queries: construction, mass, bounds, point tests and casts.

use glam::Vec2;

use crate::error::CollisionError;

use super::distance::{
    make_proxy, shape_cast, shape_distance, DistanceInput, ShapeCastPairInput, ShapeProxy,
    SimplexCache,
};
use super::hull::{validate_hull, Hull};
use super::math::{
    cross, get_length_and_normalize, is_valid_float, is_valid_vec2, right_perp, Aabb, Rot,
    Transform,
};
use super::{HUGE, MAX_POLYGON_VERTICES};

/// A solid circle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Circle {
    pub center: Vec2,
    pub radius: f32,
}

/// Two semicircles joined by a rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Capsule {
    pub center1: Vec2,
    pub center2: Vec2,
    pub radius: f32,
}

/// A solid convex polygon with counter-clockwise vertices.
///
/// The interior is to the left of each edge. Build it with [`make_polygon`] or one of
/// the box helpers so normals and centroid stay consistent with the vertices.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Polygon {
    pub vertices: [Vec2; MAX_POLYGON_VERTICES],
    /// Outward unit normal of edge `i -> i + 1`.
    pub normals: [Vec2; MAX_POLYGON_VERTICES],
    pub centroid: Vec2,
    /// External radius for rounded polygons.
    pub radius: f32,
    pub count: usize,
}

/// A two-sided line segment.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Segment {
    pub point1: Vec2,
    pub point2: Vec2,
}

/// A one-sided segment belonging to a chain: `ghost1 -> point1 -> point2 -> ghost2`.
///
/// Only the right side collides. The ghost vertices smooth collision at the joints.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChainSegment {
    pub ghost1: Vec2,
    pub segment: Segment,
    pub ghost2: Vec2,
    /// Owning chain index.
    pub chain_id: i32,
}

/// Ray cast input: the ray spans `origin + [0, max_fraction] * translation`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RayCastInput {
    pub origin: Vec2,
    pub translation: Vec2,
    pub max_fraction: f32,
}

/// Cast a point cloud with radius along a translation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShapeCastInput {
    pub proxy: ShapeProxy,
    pub translation: Vec2,
    pub max_fraction: f32,
    /// Allow the cast to move closer when initially touching. Needs a positive radius.
    pub can_encroach: bool,
}

/// Ray or shape cast result. A miss leaves everything zeroed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CastOutput {
    pub normal: Vec2,
    pub point: Vec2,
    pub fraction: f32,
    pub iterations: usize,
    pub hit: bool,
}

/// Mass properties of a shape.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MassData {
    pub mass: f32,
    /// Centroid relative to the shape origin.
    pub center: Vec2,
    /// Rotational inertia about the shape origin.
    pub rotational_inertia: f32,
}

impl Circle {
    pub fn proxy(&self) -> ShapeProxy {
        make_proxy(&[self.center], self.radius)
    }
}

impl Capsule {
    pub fn proxy(&self) -> ShapeProxy {
        make_proxy(&[self.center1, self.center2], self.radius)
    }
}

impl Polygon {
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    pub fn normals(&self) -> &[Vec2] {
        &self.normals[..self.count]
    }

    pub fn proxy(&self) -> ShapeProxy {
        make_proxy(self.vertices(), self.radius)
    }
}

impl Segment {
    pub fn proxy(&self) -> ShapeProxy {
        make_proxy(&[self.point1, self.point2], 0.0)
    }
}

/// Closed set of collider shapes, dispatched by pair type in [`super::manifold::collide`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Circle(Circle),
    Capsule(Capsule),
    Polygon(Polygon),
    Segment(Segment),
    ChainSegment(ChainSegment),
}

impl Shape {
    /// Bounding box of the shape under `transform`.
    pub fn compute_aabb(&self, transform: Transform) -> Aabb {
        match self {
            Shape::Circle(s) => compute_circle_aabb(s, transform),
            Shape::Capsule(s) => compute_capsule_aabb(s, transform),
            Shape::Polygon(s) => compute_polygon_aabb(s, transform),
            Shape::Segment(s) => compute_segment_aabb(s, transform),
            Shape::ChainSegment(s) => compute_segment_aabb(&s.segment, transform),
        }
    }

    pub fn proxy(&self) -> ShapeProxy {
        match self {
            Shape::Circle(s) => s.proxy(),
            Shape::Capsule(s) => s.proxy(),
            Shape::Polygon(s) => s.proxy(),
            Shape::Segment(s) => s.proxy(),
            Shape::ChainSegment(s) => s.segment.proxy(),
        }
    }

    /// Ray cast in the shape's local frame. Chain segments are one-sided.
    pub fn ray_cast(&self, input: &RayCastInput) -> CastOutput {
        match self {
            Shape::Circle(s) => ray_cast_circle(s, input),
            Shape::Capsule(s) => ray_cast_capsule(s, input),
            Shape::Polygon(s) => ray_cast_polygon(s, input),
            Shape::Segment(s) => ray_cast_segment(s, input, false),
            Shape::ChainSegment(s) => ray_cast_segment(&s.segment, input, true),
        }
    }
}

/// Validate ray input: finite values and a fraction in `[0, HUGE)`.
pub fn is_valid_ray(input: &RayCastInput) -> bool {
    is_valid_vec2(input.origin)
        && is_valid_vec2(input.translation)
        && is_valid_float(input.max_fraction)
        && 0.0 <= input.max_fraction
        && input.max_fraction < HUGE
}

fn compute_polygon_centroid(vertices: &[Vec2]) -> Vec2 {
    let mut center = Vec2::ZERO;
    let mut area = 0.0;

    // fan from the first vertex to limit round-off
    let origin = vertices[0];
    let inv3 = 1.0 / 3.0;

    for i in 1..vertices.len() - 1 {
        let e1 = vertices[i] - origin;
        let e2 = vertices[i + 1] - origin;
        let a = 0.5 * cross(e1, e2);
        center += (a * inv3) * (e1 + e2);
        area += a;
    }

    origin + center * (1.0 / area)
}

fn fill_normals(polygon: &mut Polygon) {
    let n = polygon.count;
    for i in 0..n {
        let i2 = if i + 1 < n { i + 1 } else { 0 };
        let edge = polygon.vertices[i2] - polygon.vertices[i];
        polygon.normals[i] = right_perp(edge).normalize_or_zero();
    }
}

/// Make a convex polygon from a hull. The hull must come from [`super::hull::compute_hull`].
pub fn make_polygon(hull: &Hull, radius: f32) -> Polygon {
    debug_assert!(validate_hull(hull), "make_polygon requires a valid hull");

    if hull.count < 3 {
        // degenerate hull
        return make_square(0.5);
    }

    let mut shape = Polygon {
        count: hull.count,
        radius,
        ..Default::default()
    };
    shape.vertices[..hull.count].copy_from_slice(hull.points());
    fill_normals(&mut shape);
    shape.centroid = compute_polygon_centroid(shape.vertices());
    shape
}

/// Checked form of [`make_polygon`].
pub fn try_make_polygon(hull: &Hull, radius: f32) -> Result<Polygon, CollisionError> {
    if !is_valid_float(radius) || radius < 0.0 {
        return Err(CollisionError::InvalidRadius { radius });
    }
    if !validate_hull(hull) {
        return Err(CollisionError::InvalidHull);
    }
    Ok(make_polygon(hull, radius))
}

/// Make a polygon from a hull, placed at `position` with `rotation`.
pub fn make_offset_polygon(hull: &Hull, position: Vec2, rotation: Rot) -> Polygon {
    make_offset_rounded_polygon(hull, position, rotation, 0.0)
}

/// Make a rounded polygon from a hull, placed at `position` with `rotation`.
pub fn make_offset_rounded_polygon(
    hull: &Hull,
    position: Vec2,
    rotation: Rot,
    radius: f32,
) -> Polygon {
    debug_assert!(validate_hull(hull), "make_offset_rounded_polygon requires a valid hull");

    if hull.count < 3 {
        return make_square(0.5);
    }

    let transform = Transform::new(position, rotation);

    let mut shape = Polygon {
        count: hull.count,
        radius,
        ..Default::default()
    };
    for (v, &p) in shape.vertices.iter_mut().zip(hull.points()) {
        *v = transform.transform_point(p);
    }
    fill_normals(&mut shape);
    shape.centroid = compute_polygon_centroid(shape.vertices());
    shape
}

/// Axis-aligned square centered on the origin.
pub fn make_square(half_width: f32) -> Polygon {
    make_box(half_width, half_width)
}

/// Axis-aligned box centered on the origin.
pub fn make_box(half_width: f32, half_height: f32) -> Polygon {
    let mut shape = Polygon {
        count: 4,
        ..Default::default()
    };
    shape.vertices[0] = Vec2::new(-half_width, -half_height);
    shape.vertices[1] = Vec2::new(half_width, -half_height);
    shape.vertices[2] = Vec2::new(half_width, half_height);
    shape.vertices[3] = Vec2::new(-half_width, half_height);
    shape.normals[0] = Vec2::new(0.0, -1.0);
    shape.normals[1] = Vec2::new(1.0, 0.0);
    shape.normals[2] = Vec2::new(0.0, 1.0);
    shape.normals[3] = Vec2::new(-1.0, 0.0);
    shape
}

/// Box with rounded corners. The radius extends beyond the half extents.
pub fn make_rounded_box(half_width: f32, half_height: f32, radius: f32) -> Polygon {
    let mut shape = make_box(half_width, half_height);
    shape.radius = radius;
    shape
}

/// Box centered at `center` and rotated by `rotation`.
pub fn make_offset_box(half_width: f32, half_height: f32, center: Vec2, rotation: Rot) -> Polygon {
    make_offset_rounded_box(half_width, half_height, center, rotation, 0.0)
}

/// Rounded box centered at `center` and rotated by `rotation`.
pub fn make_offset_rounded_box(
    half_width: f32,
    half_height: f32,
    center: Vec2,
    rotation: Rot,
    radius: f32,
) -> Polygon {
    let transform = Transform::new(center, rotation);
    let local = make_box(half_width, half_height);
    let mut shape = transform_polygon(transform, &local);
    shape.radius = radius;
    shape
}

/// Transform a polygon into another frame.
pub fn transform_polygon(transform: Transform, polygon: &Polygon) -> Polygon {
    let mut p = *polygon;
    for i in 0..p.count {
        p.vertices[i] = transform.transform_point(p.vertices[i]);
        p.normals[i] = transform.q.rotate(p.normals[i]);
    }
    p.centroid = transform.transform_point(p.centroid);
    p
}

pub fn compute_circle_mass(shape: &Circle, density: f32) -> MassData {
    let rr = shape.radius * shape.radius;
    let mass = density * std::f32::consts::PI * rr;

    // inertia about the local origin
    MassData {
        mass,
        center: shape.center,
        rotational_inertia: mass * (0.5 * rr + shape.center.dot(shape.center)),
    }
}

pub fn compute_capsule_mass(shape: &Capsule, density: f32) -> MassData {
    use std::f32::consts::PI;

    let radius = shape.radius;
    let rr = radius * radius;
    let p1 = shape.center1;
    let p2 = shape.center2;
    let length = (p2 - p1).length();
    let ll = length * length;

    let circle_mass = density * (PI * rr);
    let box_mass = density * (2.0 * radius * length);

    let mass = circle_mass + box_mass;
    let center = p1.lerp(p2, 0.5);

    // Each semicircle has its centroid 4r/(3pi) from the flat side. Shift it onto the
    // box end with the parallel axis theorem.
    let lc = 4.0 * radius / (3.0 * PI);
    let h = 0.5 * length;

    let circle_inertia = circle_mass * (0.5 * rr + h * h + 2.0 * h * lc);
    let box_inertia = box_mass * (4.0 * rr + ll) / 12.0;

    MassData {
        mass,
        center,
        rotational_inertia: circle_inertia + box_inertia + mass * center.dot(center),
    }
}

/// Mass of a polygon. Rounded polygons are approximated by pushing the vertices out.
pub fn compute_polygon_mass(shape: &Polygon, density: f32) -> MassData {
    let count = shape.count;
    let radius = shape.radius;

    let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
    if radius > 0.0 {
        let sqrt2 = 1.412;
        for i in 0..count {
            let j = if i == 0 { count - 1 } else { i - 1 };
            let n1 = shape.normals[j];
            let n2 = shape.normals[i];
            let mid = (n1 + n2).normalize_or_zero();
            vertices[i] = shape.vertices[i] + (sqrt2 * radius) * mid;
        }
    } else {
        vertices[..count].copy_from_slice(shape.vertices());
    }

    let mut center = Vec2::ZERO;
    let mut area = 0.0;
    let mut rotational_inertia = 0.0;

    let r = vertices[0];
    let inv3 = 1.0 / 3.0;

    for i in 1..count - 1 {
        let e1 = vertices[i] - r;
        let e2 = vertices[i + 1] - r;

        let d = cross(e1, e2);

        let triangle_area = 0.5 * d;
        area += triangle_area;

        center += (triangle_area * inv3) * (e1 + e2);

        let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
        let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;

        rotational_inertia += (0.25 * inv3 * d) * (intx2 + inty2);
    }

    let mass = density * area;
    center *= 1.0 / area;
    let mass_center = r + center;

    // inertia relative to r, shifted to the centroid then back to the shape origin
    let inertia = density * rotational_inertia
        + mass * (mass_center.dot(mass_center) - center.dot(center));

    MassData {
        mass,
        center: mass_center,
        rotational_inertia: inertia,
    }
}

pub fn compute_circle_aabb(shape: &Circle, transform: Transform) -> Aabb {
    let p = transform.transform_point(shape.center);
    let r = Vec2::splat(shape.radius);
    Aabb::new(p - r, p + r)
}

pub fn compute_capsule_aabb(shape: &Capsule, transform: Transform) -> Aabb {
    let v1 = transform.transform_point(shape.center1);
    let v2 = transform.transform_point(shape.center2);
    let r = Vec2::splat(shape.radius);
    Aabb::new(v1.min(v2) - r, v1.max(v2) + r)
}

pub fn compute_polygon_aabb(shape: &Polygon, transform: Transform) -> Aabb {
    let first = transform.transform_point(shape.vertices[0]);
    let (mut lower, mut upper) = (first, first);

    for &v in &shape.vertices[1..shape.count] {
        let v = transform.transform_point(v);
        lower = lower.min(v);
        upper = upper.max(v);
    }

    let r = Vec2::splat(shape.radius);
    Aabb::new(lower - r, upper + r)
}

pub fn compute_segment_aabb(shape: &Segment, transform: Transform) -> Aabb {
    let v1 = transform.transform_point(shape.point1);
    let v2 = transform.transform_point(shape.point2);
    Aabb::new(v1.min(v2), v1.max(v2))
}

/// Test a local-space point against a circle.
pub fn point_in_circle(shape: &Circle, point: Vec2) -> bool {
    point.distance_squared(shape.center) <= shape.radius * shape.radius
}

/// Test a local-space point against a capsule.
pub fn point_in_capsule(shape: &Capsule, point: Vec2) -> bool {
    let rr = shape.radius * shape.radius;
    let p1 = shape.center1;
    let d = shape.center2 - p1;
    let dd = d.dot(d);
    if dd == 0.0 {
        // capsule is a circle
        return point.distance_squared(p1) <= rr;
    }

    let t = ((point - p1).dot(d) / dd).clamp(0.0, 1.0);
    let c = p1 + t * d;
    point.distance_squared(c) <= rr
}

/// Test a local-space point against a (possibly rounded) polygon.
pub fn point_in_polygon(shape: &Polygon, point: Vec2) -> bool {
    let input = DistanceInput {
        proxy_a: make_proxy(shape.vertices(), 0.0),
        proxy_b: make_proxy(&[point], 0.0),
        transform_a: Transform::IDENTITY,
        transform_b: Transform::IDENTITY,
        use_radii: false,
    };

    let mut cache = SimplexCache::default();
    let output = shape_distance(&input, &mut cache, None);
    output.distance <= shape.radius
}

/// Ray cast against a circle in local space. A ray starting inside misses.
pub fn ray_cast_circle(shape: &Circle, input: &RayCastInput) -> CastOutput {
    debug_assert!(is_valid_ray(input));

    let mut output = CastOutput::default();
    let p = shape.center;

    // shift so the circle center is the origin
    let s = input.origin - p;

    let (length, d) = get_length_and_normalize(input.translation);
    if length == 0.0 {
        return output;
    }

    // closest point on the infinite ray to the center
    let t = -s.dot(d);
    let c = s + t * d;

    let cc = c.dot(c);
    let rr = shape.radius * shape.radius;

    if cc > rr {
        return output;
    }

    let h = (rr - cc).sqrt();
    let fraction = t - h;

    if fraction < 0.0 || input.max_fraction * length < fraction {
        return output;
    }

    let hit_point = s + fraction * d;

    output.fraction = fraction / length;
    output.normal = hit_point.normalize_or_zero();
    output.point = p + shape.radius * output.normal;
    output.hit = true;
    output
}

/// Ray cast against a capsule in local space.
pub fn ray_cast_capsule(shape: &Capsule, input: &RayCastInput) -> CastOutput {
    debug_assert!(is_valid_ray(input));

    let output = CastOutput::default();

    let v1 = shape.center1;
    let v2 = shape.center2;

    let (capsule_length, a) = get_length_and_normalize(v2 - v1);

    if capsule_length < f32::EPSILON {
        let circle = Circle { center: v1, radius: shape.radius };
        return ray_cast_circle(&circle, input);
    }

    let p1 = input.origin;
    let d = input.translation;

    let q = p1 - v1;
    let qa = q.dot(a);

    // component of q perpendicular to the capsule axis
    let qp = q - qa * a;

    let radius = shape.radius;

    // Ray starts inside the infinite capsule slab
    if qp.dot(qp) < radius * radius {
        if qa < 0.0 {
            let circle = Circle { center: v1, radius };
            return ray_cast_circle(&circle, input);
        }

        if qa > capsule_length {
            let circle = Circle { center: v2, radius };
            return ray_cast_circle(&circle, input);
        }

        // starts inside the capsule
        return output;
    }

    let mut n = Vec2::new(a.y, -a.x);

    let (ray_length, u) = get_length_and_normalize(d);

    // Intersect with both sides of the infinite capsule:
    // v1 +/- radius * n + s1 * a = p1 + s2 * u
    // Solved with Cramer's rule on [a -u].
    let den = -a.x * u.y + u.x * a.y;
    if -f32::EPSILON < den && den < f32::EPSILON {
        // parallel and outside
        return output;
    }

    let b1 = q - radius * n;
    let b2 = q + radius * n;

    let inv_den = 1.0 / den;

    let s21 = (a.x * b1.y - b1.x * a.y) * inv_den;
    let s22 = (a.x * b2.y - b2.x * a.y) * inv_den;

    let (s2, b) = if s21 < s22 {
        (s21, b1)
    } else {
        n = -n;
        (s22, b2)
    };

    if s2 < 0.0 || input.max_fraction * ray_length < s2 {
        return output;
    }

    let s1 = (-b.x * u.y + u.x * b.y) * inv_den;

    if s1 < 0.0 {
        let circle = Circle { center: v1, radius };
        ray_cast_circle(&circle, input)
    } else if capsule_length < s1 {
        let circle = Circle { center: v2, radius };
        ray_cast_circle(&circle, input)
    } else {
        CastOutput {
            fraction: s2 / ray_length,
            point: v1.lerp(v2, s1 / capsule_length) + radius * n,
            normal: n,
            iterations: 0,
            hit: true,
        }
    }
}

/// Ray cast against a segment in local space.
///
/// With `one_sided`, rays starting on the left of `point1 -> point2` miss.
pub fn ray_cast_segment(shape: &Segment, input: &RayCastInput, one_sided: bool) -> CastOutput {
    let output = CastOutput::default();

    if one_sided {
        let offset = cross(input.origin - shape.point1, shape.point2 - shape.point1);
        if offset < 0.0 {
            return output;
        }
    }

    let p1 = input.origin;
    let d = input.translation;

    let v1 = shape.point1;
    let (length, e_unit) = get_length_and_normalize(shape.point2 - v1);
    if length == 0.0 {
        return output;
    }

    // right of v1 -> v2
    let mut normal = right_perp(e_unit);

    // dot(normal, p1 + t * d - v1) = 0
    let numerator = normal.dot(v1 - p1);
    let denominator = normal.dot(d);

    if denominator == 0.0 {
        return output;
    }

    let t = numerator / denominator;
    if t < 0.0 || input.max_fraction < t {
        return output;
    }

    let p = p1 + t * d;

    let s = (p - v1).dot(e_unit);
    if s < 0.0 || length < s {
        return output;
    }

    if numerator > 0.0 {
        normal = -normal;
    }

    CastOutput {
        fraction: t,
        point: p,
        normal,
        iterations: 0,
        hit: true,
    }
}

/// Ray cast against a polygon in local space.
pub fn ray_cast_polygon(shape: &Polygon, input: &RayCastInput) -> CastOutput {
    debug_assert!(is_valid_ray(input));

    if shape.radius == 0.0 {
        let p1 = input.origin;
        let d = input.translation;

        let mut lower = 0.0;
        let mut upper = input.max_fraction;
        let mut index = None;

        let output = CastOutput::default();

        for i in 0..shape.count {
            // dot(normal, p1 + a * d - v) = 0
            let numerator = shape.normals[i].dot(shape.vertices[i] - p1);
            let denominator = shape.normals[i].dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return output;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                // entering this half-space
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > 0.0 && numerator < upper * denominator {
                // leaving this half-space
                upper = numerator / denominator;
            }

            if upper < lower {
                return output;
            }
        }

        return match index {
            Some(i) => CastOutput {
                fraction: lower,
                normal: shape.normals[i],
                point: p1 + lower * d,
                iterations: 0,
                hit: true,
            },
            None => output,
        };
    }

    let cast_input = ShapeCastPairInput {
        proxy_a: shape.proxy(),
        proxy_b: make_proxy(&[input.origin], 0.0),
        transform_a: Transform::IDENTITY,
        transform_b: Transform::IDENTITY,
        translation_b: input.translation,
        max_fraction: input.max_fraction,
        can_encroach: false,
    };
    shape_cast(&cast_input)
}

fn shape_cast_against(proxy_a: ShapeProxy, input: &ShapeCastInput) -> CastOutput {
    let pair_input = ShapeCastPairInput {
        proxy_a,
        proxy_b: input.proxy,
        transform_a: Transform::IDENTITY,
        transform_b: Transform::IDENTITY,
        translation_b: input.translation,
        max_fraction: input.max_fraction,
        can_encroach: input.can_encroach,
    };
    shape_cast(&pair_input)
}

/// Cast a proxy against a circle in local space.
pub fn shape_cast_circle(shape: &Circle, input: &ShapeCastInput) -> CastOutput {
    shape_cast_against(shape.proxy(), input)
}

/// Cast a proxy against a capsule in local space.
pub fn shape_cast_capsule(shape: &Capsule, input: &ShapeCastInput) -> CastOutput {
    shape_cast_against(shape.proxy(), input)
}

/// Cast a proxy against a segment in local space.
pub fn shape_cast_segment(shape: &Segment, input: &ShapeCastInput) -> CastOutput {
    shape_cast_against(shape.proxy(), input)
}

/// Cast a proxy against a polygon in local space.
pub fn shape_cast_polygon(shape: &Polygon, input: &ShapeCastInput) -> CastOutput {
    shape_cast_against(shape.proxy(), input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::hull::compute_hull;

    #[test]
    fn test_ray_cast_box() {
        let square = make_box(1.0, 1.0);
        let input = RayCastInput {
            origin: Vec2::new(-5.0, 0.0),
            translation: Vec2::new(10.0, 0.0),
            max_fraction: 1.0,
        };
        let output = ray_cast_polygon(&square, &input);
        let eps = 1e-5;
        assert!(output.hit);
        assert!((output.point - Vec2::new(-1.0, 0.0)).length() < eps);
        assert!((output.normal - Vec2::new(-1.0, 0.0)).length() < eps);
        assert!((output.fraction - 0.4).abs() < eps, "fraction = {}", output.fraction);
    }

    #[test]
    fn test_ray_cast_circle() {
        let circle = Circle { center: Vec2::new(2.0, 0.0), radius: 0.5 };
        let input = RayCastInput {
            origin: Vec2::ZERO,
            translation: Vec2::new(4.0, 0.0),
            max_fraction: 1.0,
        };
        let output = ray_cast_circle(&circle, &input);
        let eps = 1e-5;
        assert!(output.hit);
        assert!((output.fraction - 0.375).abs() < eps);
        assert!((output.normal - Vec2::new(-1.0, 0.0)).length() < eps);

        let miss = RayCastInput {
            origin: Vec2::new(0.0, 1.0),
            ..input
        };
        assert!(!ray_cast_circle(&circle, &miss).hit);
    }

    #[test]
    fn test_ray_cast_capsule_side() {
        let capsule = Capsule {
            center1: Vec2::new(-1.0, 0.0),
            center2: Vec2::new(1.0, 0.0),
            radius: 0.5,
        };
        let input = RayCastInput {
            origin: Vec2::new(0.0, 2.0),
            translation: Vec2::new(0.0, -3.0),
            max_fraction: 1.0,
        };
        let output = ray_cast_capsule(&capsule, &input);
        let eps = 1e-5;
        assert!(output.hit);
        assert!((output.point - Vec2::new(0.0, 0.5)).length() < eps, "point = {}", output.point);
        assert!((output.normal - Vec2::Y).length() < eps);
        assert!((output.fraction - 0.5).abs() < eps);
    }

    #[test]
    fn test_ray_cast_segment_one_sided() {
        let segment = Segment {
            point1: Vec2::new(-1.0, 0.0),
            point2: Vec2::new(1.0, 0.0),
        };
        // from below (right side)
        let below = RayCastInput {
            origin: Vec2::new(0.0, -1.0),
            translation: Vec2::new(0.0, 2.0),
            max_fraction: 1.0,
        };
        let output = ray_cast_segment(&segment, &below, true);
        assert!(output.hit);
        assert!((output.normal - Vec2::new(0.0, -1.0)).length() < 1e-5);
        assert!((output.fraction - 0.5).abs() < 1e-5);

        let above = RayCastInput {
            origin: Vec2::new(0.0, 1.0),
            translation: Vec2::new(0.0, -2.0),
            max_fraction: 1.0,
        };
        assert!(!ray_cast_segment(&segment, &above, true).hit);
        assert!(ray_cast_segment(&segment, &above, false).hit);
    }

    #[test]
    fn test_is_valid_ray() {
        let mut input = RayCastInput {
            origin: Vec2::ZERO,
            translation: Vec2::X,
            max_fraction: 1.0,
        };
        assert!(is_valid_ray(&input));
        input.translation.x = f32::NAN;
        assert!(!is_valid_ray(&input));
        input.translation.x = 1.0;
        input.max_fraction = -0.5;
        assert!(!is_valid_ray(&input));
    }

    #[test]
    fn test_make_polygon_from_hull() {
        let points = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(3.0, 1.0),
            Vec2::new(1.0, 2.5),
            Vec2::new(-0.5, 1.0),
        ];
        let hull = compute_hull(&points);
        let polygon = make_polygon(&hull, 0.0);
        assert_eq!(polygon.count, hull.count);

        for i in 0..polygon.count {
            let n = polygon.normals[i];
            assert!((n.length() - 1.0).abs() < 1e-5);
            let j = (i + 1) % polygon.count;
            let edge = polygon.vertices[j] - polygon.vertices[i];
            assert!(n.dot(edge).abs() < 1e-4);
            // ccw: next edge turns left
            let k = (i + 2) % polygon.count;
            let next = polygon.vertices[k] - polygon.vertices[j];
            assert!(cross(edge, next) > 0.0);
        }
        assert!(point_in_polygon(&polygon, polygon.centroid));
        assert!(try_make_polygon(&hull, -1.0).is_err());
    }

    #[test]
    fn test_box_mass() {
        let shape = make_box(1.0, 0.5);
        let md = compute_polygon_mass(&shape, 2.0);
        let eps = 1e-4;
        assert!((md.mass - 4.0).abs() < eps, "mass = {}", md.mass);
        assert!(md.center.length() < eps);
        // m * (w^2 + h^2) / 12
        let expected = 4.0 * (4.0 + 1.0) / 12.0;
        assert!((md.rotational_inertia - expected).abs() < eps);
    }

    #[test]
    fn test_circle_and_capsule_mass() {
        let circle = Circle { center: Vec2::ZERO, radius: 1.0 };
        let md = compute_circle_mass(&circle, 1.0);
        assert!((md.mass - std::f32::consts::PI).abs() < 1e-5);

        let capsule = Capsule {
            center1: Vec2::new(-1.0, 0.0),
            center2: Vec2::new(1.0, 0.0),
            radius: 0.5,
        };
        let md = compute_capsule_mass(&capsule, 1.0);
        let expected = std::f32::consts::PI * 0.25 + 2.0;
        assert!((md.mass - expected).abs() < 1e-5);
        assert!(md.center.length() < 1e-6);
    }

    #[test]
    fn test_offset_box_aabb() {
        let shape = make_offset_box(1.0, 1.0, Vec2::new(2.0, 0.0), Rot::from_angle(0.25 * std::f32::consts::PI));
        let aabb = compute_polygon_aabb(&shape, Transform::IDENTITY);
        let s = std::f32::consts::SQRT_2;
        let eps = 1e-4;
        assert!((aabb.lower - Vec2::new(2.0 - s, -s)).length() < eps);
        assert!((aabb.upper - Vec2::new(2.0 + s, s)).length() < eps);
        assert!((shape.centroid - Vec2::new(2.0, 0.0)).length() < eps);
    }

    #[test]
    fn test_point_in_capsule() {
        let capsule = Capsule {
            center1: Vec2::new(-1.0, 0.0),
            center2: Vec2::new(1.0, 0.0),
            radius: 0.5,
        };
        assert!(point_in_capsule(&capsule, Vec2::new(1.4, 0.0)));
        assert!(!point_in_capsule(&capsule, Vec2::new(0.0, 0.6)));
    }
}
