//! Contact manifold generation for every supported shape pair.
//!
//! Each function works in the local frame of shape A and reports contact points
//! up to [`SPECULATIVE_DISTANCE`] apart. Curved pairs reduce to segment distance
//! or GJK; polygon pairs use SAT with reference face clipping. Chain segments
//! collide on their right side only.

use glam::Vec2;

use super::collider::{Capsule, ChainSegment, Circle, Polygon, Segment, Shape};
use super::contact::{make_id, Manifold};
use super::distance::{make_proxy, segment_distance, shape_distance, DistanceInput, SimplexCache};
use super::math::{cross, get_length_and_normalize, left_perp, right_perp, Transform};
use super::{LINEAR_SLOP, MAX_POLYGON_VERTICES, SPECULATIVE_DISTANCE};

#[inline]
fn next_index(i: usize, count: usize) -> usize {
    if i + 1 < count {
        i + 1
    } else {
        0
    }
}

// A capsule expressed as a two-sided, two-vertex polygon.
fn make_capsule(p1: Vec2, p2: Vec2, radius: f32) -> Polygon {
    let mut shape = Polygon {
        count: 2,
        radius,
        centroid: p1.lerp(p2, 0.5),
        ..Default::default()
    };
    shape.vertices[0] = p1;
    shape.vertices[1] = p2;

    let normal = right_perp((p2 - p1).normalize_or_zero());
    shape.normals[0] = normal;
    shape.normals[1] = -normal;
    shape
}

/// Contact between two circles.
pub fn collide_circles(circle_a: &Circle, xf_a: Transform, circle_b: &Circle, xf_b: Transform) -> Manifold {
    let mut manifold = Manifold::default();

    let xf = xf_a.inv_mul(&xf_b);
    let point_a = circle_a.center;
    let point_b = xf.transform_point(circle_b.center);

    let (distance, normal) = get_length_and_normalize(point_b - point_a);
    let separation = distance - circle_a.radius - circle_b.radius;
    if separation > SPECULATIVE_DISTANCE {
        return manifold;
    }

    let c_a = point_a + circle_a.radius * normal;
    let c_b = point_b - circle_b.radius * normal;
    manifold.push(c_a.lerp(c_b, 0.5), separation, 0);
    manifold.finalize(normal, Vec2::ZERO, xf_a, xf_b);
    manifold
}

/// Contact between a capsule and a circle.
pub fn collide_capsule_and_circle(
    capsule_a: &Capsule,
    xf_a: Transform,
    circle_b: &Circle,
    xf_b: Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    let xf = xf_a.inv_mul(&xf_b);
    let p_b = xf.transform_point(circle_b.center);

    // closest point on the capsule core
    let p1 = capsule_a.center1;
    let p2 = capsule_a.center2;
    let e = p2 - p1;

    let s1 = (p_b - p1).dot(e);
    let s2 = (p2 - p_b).dot(e);
    let p_a = if s1 < 0.0 {
        p1
    } else if s2 < 0.0 {
        p2
    } else {
        p1 + (s1 / e.dot(e)) * e
    };

    let (distance, normal) = get_length_and_normalize(p_b - p_a);
    let separation = distance - capsule_a.radius - circle_b.radius;
    if separation > SPECULATIVE_DISTANCE {
        return manifold;
    }

    let c_a = p_a + capsule_a.radius * normal;
    let c_b = p_b - circle_b.radius * normal;
    manifold.push(c_a.lerp(c_b, 0.5), separation, 0);
    manifold.finalize(normal, Vec2::ZERO, xf_a, xf_b);
    manifold
}

/// Contact between a two-sided segment and a circle.
pub fn collide_segment_and_circle(
    segment_a: &Segment,
    xf_a: Transform,
    circle_b: &Circle,
    xf_b: Transform,
) -> Manifold {
    let capsule_a = Capsule {
        center1: segment_a.point1,
        center2: segment_a.point2,
        radius: 0.0,
    };
    collide_capsule_and_circle(&capsule_a, xf_a, circle_b, xf_b)
}

/// Contact between a polygon and a circle.
pub fn collide_polygon_and_circle(
    polygon_a: &Polygon,
    xf_a: Transform,
    circle_b: &Circle,
    xf_b: Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    let xf = xf_a.inv_mul(&xf_b);
    let c = xf.transform_point(circle_b.center);
    let radius_a = polygon_a.radius;
    let radius_b = circle_b.radius;
    let radius = radius_a + radius_b;

    // minimum separating edge
    let count = polygon_a.count;
    let vertices = polygon_a.vertices();
    let normals = polygon_a.normals();
    let mut normal_index = 0;
    let mut separation = -f32::MAX;
    for i in 0..count {
        let s = normals[i].dot(c - vertices[i]);
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    if separation - radius > SPECULATIVE_DISTANCE {
        return manifold;
    }

    let v1 = vertices[normal_index];
    let v2 = vertices[next_index(normal_index, count)];

    let u1 = (c - v1).dot(v2 - v1);
    let u2 = (c - v2).dot(v1 - v2);

    // vertex regions only apply when the center is outside
    let vertex = if u1 < 0.0 && separation > f32::EPSILON {
        Some(v1)
    } else if u2 < 0.0 && separation > f32::EPSILON {
        Some(v2)
    } else {
        None
    };

    if let Some(v) = vertex {
        let normal = (c - v).normalize_or_zero();
        let separation = (c - v).dot(normal);
        if separation - radius > SPECULATIVE_DISTANCE {
            return manifold;
        }

        let c_a = v + radius_a * normal;
        let c_b = c - radius_b * normal;
        manifold.push(c_a.lerp(c_b, 0.5), (c_b - c_a).dot(normal), 0);
        manifold.finalize(normal, Vec2::ZERO, xf_a, xf_b);
        return manifold;
    }

    // face region, the center may be inside the polygon
    let normal = normals[normal_index];
    let c_a = c + (radius_a - (c - v1).dot(normal)) * normal;
    let c_b = c - radius_b * normal;
    manifold.push(c_a.lerp(c_b, 0.5), separation - radius, 0);
    manifold.finalize(normal, Vec2::ZERO, xf_a, xf_b);
    manifold
}

/// Contact between two capsules. Parallel overlapping cores produce two points.
pub fn collide_capsules(capsule_a: &Capsule, xf_a: Transform, capsule_b: &Capsule, xf_b: Transform) -> Manifold {
    let origin = capsule_a.center1;

    // shift A to the origin to reduce round-off
    let sf_a = Transform::new(xf_a.p + xf_a.q.rotate(origin), xf_a.q);
    let xf = sf_a.inv_mul(&xf_b);

    let p1 = Vec2::ZERO;
    let q1 = capsule_a.center2 - origin;
    let p2 = xf.transform_point(capsule_b.center1);
    let q2 = xf.transform_point(capsule_b.center2);

    let result = segment_distance(p1, q1, p2, q2);

    let radius_a = capsule_a.radius;
    let radius_b = capsule_b.radius;
    let radius = radius_a + radius_b;
    let max_distance = radius + SPECULATIVE_DISTANCE;
    if result.distance_squared > max_distance * max_distance {
        return Manifold::default();
    }

    let distance = result.distance_squared.sqrt();

    let (length1, u1) = get_length_and_normalize(q1 - p1);
    let (length2, u2) = get_length_and_normalize(q2 - p2);

    // end point regions
    let fp2 = (p2 - p1).dot(u1);
    let fq2 = (q2 - p1).dot(u1);
    let outside_a = (fp2 <= 0.0 && fq2 <= 0.0) || (fp2 >= length1 && fq2 >= length1);

    let fp1 = (p1 - p2).dot(u2);
    let fq1 = (q1 - p2).dot(u2);
    let outside_b = (fp1 <= 0.0 && fq1 <= 0.0) || (fp1 >= length2 && fq1 >= length2);

    // normal of A facing B
    let mut face_normal = left_perp(u1);
    let toward_b = if distance > f32::EPSILON {
        result.closest2 - result.closest1
    } else {
        p2.lerp(q2, 0.5) - p1.lerp(q1, 0.5)
    };
    if face_normal.dot(toward_b) < 0.0 {
        face_normal = -face_normal;
    }

    if !outside_a && !outside_b {
        // clip B's core against the extent of A's core
        let v_lower = if fp2 < 0.0 && fq2 - fp2 > f32::EPSILON {
            p2.lerp(q2, (0.0 - fp2) / (fq2 - fp2))
        } else if fq2 < 0.0 && fp2 - fq2 > f32::EPSILON {
            q2.lerp(p2, (0.0 - fq2) / (fp2 - fq2))
        } else if fp2 < fq2 {
            p2
        } else {
            q2
        };

        let v_upper = if fp2 > length1 && fp2 - fq2 > f32::EPSILON {
            p2.lerp(q2, (fp2 - length1) / (fp2 - fq2))
        } else if fq2 > length1 && fq2 - fp2 > f32::EPSILON {
            q2.lerp(p2, (fq2 - length1) / (fq2 - fp2))
        } else if fp2 < fq2 {
            q2
        } else {
            p2
        };

        let separation_lower = (v_lower - p1).dot(face_normal);
        let separation_upper = (v_upper - p1).dot(face_normal);

        // accept the clip only when the cores are close to parallel
        if separation_lower <= distance + LINEAR_SLOP && separation_upper <= distance + LINEAR_SLOP {
            let lower_b = if fp2 < fq2 { 0 } else { 1 };

            let v_lower = v_lower + 0.5 * (radius_a - radius_b - separation_lower) * face_normal;
            let v_upper = v_upper + 0.5 * (radius_a - radius_b - separation_upper) * face_normal;

            let mut manifold = Manifold::default();
            manifold.push(v_lower, separation_lower - radius, make_id(0, lower_b));
            manifold.push(v_upper, separation_upper - radius, make_id(1, 1 - lower_b));
            manifold.finalize(face_normal, origin, xf_a, xf_b);
            return manifold;
        }
    }

    let normal = if distance > f32::EPSILON {
        (result.closest2 - result.closest1) * (1.0 / distance)
    } else {
        face_normal
    };

    let c_a = result.closest1 + radius_a * normal;
    let c_b = result.closest2 - radius_b * normal;

    let i1 = if result.fraction1 == 0.0 { 0 } else { 1 };
    let i2 = if result.fraction2 == 0.0 { 0 } else { 1 };

    let mut manifold = Manifold::default();
    manifold.push(c_a.lerp(c_b, 0.5), distance - radius, make_id(i1, i2));
    manifold.finalize(normal, origin, xf_a, xf_b);
    manifold
}

/// Contact between a two-sided segment and a capsule.
pub fn collide_segment_and_capsule(
    segment_a: &Segment,
    xf_a: Transform,
    capsule_b: &Capsule,
    xf_b: Transform,
) -> Manifold {
    let capsule_a = Capsule {
        center1: segment_a.point1,
        center2: segment_a.point2,
        radius: 0.0,
    };
    collide_capsules(&capsule_a, xf_a, capsule_b, xf_b)
}

/// Contact between a polygon and a capsule.
pub fn collide_polygon_and_capsule(
    polygon_a: &Polygon,
    xf_a: Transform,
    capsule_b: &Capsule,
    xf_b: Transform,
) -> Manifold {
    let polygon_b = make_capsule(capsule_b.center1, capsule_b.center2, capsule_b.radius);
    collide_polygons(polygon_a, xf_a, &polygon_b, xf_b)
}

// Largest separation of poly2 along the edge normals of poly1, with the edge index.
fn find_max_separation(poly1: &Polygon, poly2: &Polygon) -> (usize, f32) {
    let mut best_index = 0;
    let mut max_separation = -f32::MAX;

    for (i, (&n, &v1)) in poly1.normals().iter().zip(poly1.vertices()).enumerate() {
        // deepest point of poly2 along n
        let si = poly2
            .vertices()
            .iter()
            .map(|&v2| n.dot(v2 - v1))
            .fold(f32::MAX, f32::min);

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }

    (best_index, max_separation)
}

// Clip the incident edge against the reference edge. Both polygons are in the
// same local frame. `flip` means poly_b owns the reference edge.
fn clip_polygons(poly_a: &Polygon, poly_b: &Polygon, edge_a: usize, edge_b: usize, flip: bool) -> Manifold {
    let mut manifold = Manifold::default();

    let (poly1, poly2, i11, i21) = if flip {
        (poly_b, poly_a, edge_b, edge_a)
    } else {
        (poly_a, poly_b, edge_a, edge_b)
    };
    let i12 = next_index(i11, poly1.count);
    let i22 = next_index(i21, poly2.count);

    let normal = poly1.normals[i11];

    // reference edge
    let v11 = poly1.vertices[i11];
    let v12 = poly1.vertices[i12];

    // incident edge
    let v21 = poly2.vertices[i21];
    let v22 = poly2.vertices[i22];

    let tangent = left_perp(normal);

    let lower1 = 0.0;
    let upper1 = (v12 - v11).dot(tangent);

    // the incident edge runs against the tangent
    let upper2 = (v21 - v11).dot(tangent);
    let lower2 = (v22 - v11).dot(tangent);

    let v_lower = if lower2 < lower1 && upper2 - lower2 > f32::EPSILON {
        v22.lerp(v21, (lower1 - lower2) / (upper2 - lower2))
    } else {
        v22
    };

    let v_upper = if upper2 > upper1 && upper2 - lower2 > f32::EPSILON {
        v22.lerp(v21, (upper1 - lower2) / (upper2 - lower2))
    } else {
        v21
    };

    let separation_lower = (v_lower - v11).dot(normal);
    let separation_upper = (v_upper - v11).dot(normal);

    // midpoint between the surfaces
    let v_lower = v_lower + 0.5 * (poly1.radius - poly2.radius - separation_lower) * normal;
    let v_upper = v_upper + 0.5 * (poly1.radius - poly2.radius - separation_upper) * normal;

    let radius = poly1.radius + poly2.radius;

    let mut push = |anchor: Vec2, separation: f32, id: u16| {
        if separation <= SPECULATIVE_DISTANCE {
            manifold.push(anchor, separation, id);
        }
    };

    if flip {
        push(v_upper, separation_upper - radius, make_id(i21, i12));
        push(v_lower, separation_lower - radius, make_id(i22, i11));
        manifold.normal = -normal;
    } else {
        push(v_lower, separation_lower - radius, make_id(i11, i22));
        push(v_upper, separation_upper - radius, make_id(i12, i21));
        manifold.normal = normal;
    }

    manifold
}

/// Contact between two convex polygons (rounded or not). Produces up to two points.
pub fn collide_polygons(polygon_a: &Polygon, xf_a: Transform, polygon_b: &Polygon, xf_b: Transform) -> Manifold {
    let origin = polygon_a.vertices[0];

    // shift A to the origin and put B in A's frame
    let sf_a = Transform::new(xf_a.p + xf_a.q.rotate(origin), xf_a.q);
    let xf = sf_a.inv_mul(&xf_b);

    let mut local_a = *polygon_a;
    local_a.centroid -= origin;
    for v in local_a.vertices.iter_mut().take(local_a.count) {
        *v -= origin;
    }

    let mut local_b = *polygon_b;
    local_b.centroid = xf.transform_point(polygon_b.centroid);
    for i in 0..local_b.count {
        local_b.vertices[i] = xf.transform_point(polygon_b.vertices[i]);
        local_b.normals[i] = xf.q.rotate(polygon_b.normals[i]);
    }

    let (mut edge_a, separation_a) = find_max_separation(&local_a, &local_b);
    let (mut edge_b, separation_b) = find_max_separation(&local_b, &local_a);

    let radius = local_a.radius + local_b.radius;

    if separation_a > SPECULATIVE_DISTANCE + radius || separation_b > SPECULATIVE_DISTANCE + radius {
        return Manifold::default();
    }

    // incident edge is the most anti-parallel edge on the other polygon
    let flip = separation_b > separation_a + 0.1 * LINEAR_SLOP;
    let most_anti_parallel = |search: Vec2, poly: &Polygon| -> usize {
        let mut index = 0;
        let mut min_dot = f32::MAX;
        for (i, n) in poly.normals().iter().enumerate() {
            let dot = search.dot(*n);
            if dot < min_dot {
                min_dot = dot;
                index = i;
            }
        }
        index
    };
    if flip {
        edge_a = most_anti_parallel(local_b.normals[edge_b], &local_a);
    } else {
        edge_b = most_anti_parallel(local_a.normals[edge_a], &local_b);
    }

    let separation = separation_a.max(separation_b);

    let mut manifold = if separation > 0.1 * LINEAR_SLOP {
        // separated: the closest features may be a vertex pair of rounded polygons
        let i11 = edge_a;
        let i12 = next_index(edge_a, local_a.count);
        let i21 = edge_b;
        let i22 = next_index(edge_b, local_b.count);

        let v11 = local_a.vertices[i11];
        let v12 = local_a.vertices[i12];
        let v21 = local_b.vertices[i21];
        let v22 = local_b.vertices[i22];

        let result = segment_distance(v11, v12, v21, v22);

        let corner = match (result.fraction1, result.fraction2) {
            (f1, f2) if f1 == 0.0 && f2 == 0.0 => Some((v11, v21, make_id(i11, i21))),
            (f1, f2) if f1 == 0.0 && f2 == 1.0 => Some((v11, v22, make_id(i11, i22))),
            (f1, f2) if f1 == 1.0 && f2 == 0.0 => Some((v12, v21, make_id(i12, i21))),
            (f1, f2) if f1 == 1.0 && f2 == 1.0 => Some((v12, v22, make_id(i12, i22))),
            _ => None,
        };

        match corner {
            Some((v_a, v_b, id)) => {
                let distance = result.distance_squared.sqrt();
                if distance > SPECULATIVE_DISTANCE + radius {
                    return Manifold::default();
                }

                let normal = (v_b - v_a).normalize_or_zero();
                let c1 = v_a + local_a.radius * normal;
                let c2 = v_b - local_b.radius * normal;

                let mut manifold = Manifold {
                    normal,
                    ..Default::default()
                };
                manifold.push(c1.lerp(c2, 0.5), distance - radius, id);
                manifold
            }
            None => clip_polygons(&local_a, &local_b, edge_a, edge_b, flip),
        }
    } else {
        clip_polygons(&local_a, &local_b, edge_a, edge_b, flip)
    };

    let local_normal = manifold.normal;
    manifold.finalize(local_normal, origin, xf_a, xf_b);
    manifold
}

/// Contact between a two-sided segment and a polygon.
pub fn collide_segment_and_polygon(
    segment_a: &Segment,
    xf_a: Transform,
    polygon_b: &Polygon,
    xf_b: Transform,
) -> Manifold {
    let polygon_a = make_capsule(segment_a.point1, segment_a.point2, 0.0);
    collide_polygons(&polygon_a, xf_a, polygon_b, xf_b)
}

/// Contact between a one-sided chain segment and a circle.
///
/// Circles behind the segment, or in the region owned by a neighboring segment,
/// produce no contact.
pub fn collide_chain_segment_and_circle(
    segment_a: &ChainSegment,
    xf_a: Transform,
    circle_b: &Circle,
    xf_b: Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    let xf = xf_a.inv_mul(&xf_b);
    let p_b = xf.transform_point(circle_b.center);

    let p1 = segment_a.segment.point1;
    let p2 = segment_a.segment.point2;
    let e = p2 - p1;

    // one-sided: the normal points to the right
    let offset = right_perp(e).dot(p_b - p1);
    if offset < 0.0 {
        return manifold;
    }

    let u = e.dot(p2 - p_b);
    let v = e.dot(p_b - p1);

    let p_a = if v <= 0.0 {
        // behind point1, in the previous segment's region?
        let prev_edge = p1 - segment_a.ghost1;
        if prev_edge.dot(p_b - p1) <= 0.0 {
            return manifold;
        }
        p1
    } else if u <= 0.0 {
        // ahead of point2, in the next segment's region?
        let next_edge = segment_a.ghost2 - p2;
        if next_edge.dot(p_b - p2) > 0.0 {
            return manifold;
        }
        p2
    } else {
        let ee = e.dot(e);
        if ee > 0.0 {
            (u * p1 + v * p2) * (1.0 / ee)
        } else {
            p1
        }
    };

    let (distance, normal) = get_length_and_normalize(p_b - p_a);
    let separation = distance - circle_b.radius;
    if separation > SPECULATIVE_DISTANCE {
        return manifold;
    }

    let c_b = p_b - circle_b.radius * normal;
    manifold.push(p_a.lerp(c_b, 0.5), separation, 0);
    manifold.finalize(normal, Vec2::ZERO, xf_a, xf_b);
    manifold
}

/// Contact between a one-sided chain segment and a capsule.
///
/// `cache` warm starts the internal GJK query; keep one per chain segment and capsule pair.
pub fn collide_chain_segment_and_capsule(
    segment_a: &ChainSegment,
    xf_a: Transform,
    capsule_b: &Capsule,
    xf_b: Transform,
    cache: &mut SimplexCache,
) -> Manifold {
    let polygon_b = make_capsule(capsule_b.center1, capsule_b.center2, capsule_b.radius);
    collide_chain_segment_and_polygon(segment_a, xf_a, &polygon_b, xf_b, cache)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NormalType {
    // the neighboring segment owns this normal
    Skip,
    Admit,
    // concave joint, use the segment normal
    Snap,
}

struct ChainSegmentParams {
    edge1: Vec2,
    normal0: Vec2,
    normal2: Vec2,
    convex1: bool,
    convex2: bool,
}

// Is a contact normal admissible for this segment given its neighbors?
fn classify_normal(params: &ChainSegmentParams, normal: Vec2) -> NormalType {
    const SIN_TOL: f32 = 0.01;

    if normal.dot(params.edge1) <= 0.0 {
        // toward the tail
        if !params.convex1 {
            return NormalType::Snap;
        }
        if cross(normal, params.normal0) > SIN_TOL {
            return NormalType::Skip;
        }
        NormalType::Admit
    } else {
        // toward the head
        if !params.convex2 {
            return NormalType::Snap;
        }
        if cross(params.normal2, normal) > SIN_TOL {
            return NormalType::Skip;
        }
        NormalType::Admit
    }
}

// Clip incident segment b1-b2 against reference segment a1-a2 with outward `normal`.
#[allow(clippy::too_many_arguments)]
fn clip_segments(
    a1: Vec2,
    a2: Vec2,
    b1: Vec2,
    b2: Vec2,
    normal: Vec2,
    radius_a: f32,
    radius_b: f32,
    id1: u16,
    id2: u16,
) -> Manifold {
    let mut manifold = Manifold::default();

    let tangent = left_perp(normal);

    let lower1 = 0.0;
    let upper1 = (a2 - a1).dot(tangent);

    // the incident edge runs against the tangent
    let upper2 = (b1 - a1).dot(tangent);
    let lower2 = (b2 - a1).dot(tangent);

    if upper2 < lower1 || upper1 < lower2 {
        return manifold;
    }

    let v_lower = if lower2 < lower1 && upper2 - lower2 > f32::EPSILON {
        b2.lerp(b1, (lower1 - lower2) / (upper2 - lower2))
    } else {
        b2
    };

    let v_upper = if upper2 > upper1 && upper2 - lower2 > f32::EPSILON {
        b2.lerp(b1, (upper1 - lower2) / (upper2 - lower2))
    } else {
        b1
    };

    let separation_lower = (v_lower - a1).dot(normal);
    let separation_upper = (v_upper - a1).dot(normal);

    let v_lower = v_lower + 0.5 * (radius_a - radius_b - separation_lower) * normal;
    let v_upper = v_upper + 0.5 * (radius_a - radius_b - separation_upper) * normal;

    let radius = radius_a + radius_b;

    manifold.normal = normal;
    manifold.push(v_lower, separation_lower - radius, id1);
    manifold.push(v_upper, separation_upper - radius, id2);
    manifold
}

/// Contact between a one-sided chain segment and a polygon.
///
/// Ghost vertices decide which normals the segment may report at convex joints;
/// concave joints snap to the segment normal. `cache` warm starts the internal
/// GJK query.
pub fn collide_chain_segment_and_polygon(
    segment_a: &ChainSegment,
    xf_a: Transform,
    polygon_b: &Polygon,
    xf_b: Transform,
    cache: &mut SimplexCache,
) -> Manifold {
    let empty = Manifold::default();

    let xf = xf_a.inv_mul(&xf_b);

    let centroid_b = xf.transform_point(polygon_b.centroid);
    let radius_b = polygon_b.radius;

    let p1 = segment_a.segment.point1;
    let p2 = segment_a.segment.point2;

    let edge1 = (p2 - p1).normalize_or_zero();
    let normal1 = right_perp(edge1);

    // one-sided
    if normal1.dot(centroid_b - p1) < 0.0 {
        return empty;
    }

    let edge0 = (p1 - segment_a.ghost1).normalize_or_zero();
    let normal0 = right_perp(edge0);
    let convex1 = cross(edge0, edge1) >= 0.0;

    let edge2 = (segment_a.ghost2 - p2).normalize_or_zero();
    let normal2 = right_perp(edge2);
    let convex2 = cross(edge1, edge2) >= 0.0;

    let params = ChainSegmentParams {
        edge1,
        normal0,
        normal2,
        convex1,
        convex2,
    };

    // polygon in the frame of the segment
    let count = polygon_b.count;
    let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
    let mut normals = [Vec2::ZERO; MAX_POLYGON_VERTICES];
    for i in 0..count {
        vertices[i] = xf.transform_point(polygon_b.vertices[i]);
        normals[i] = xf.q.rotate(polygon_b.normals[i]);
    }

    // the core polygon only, the radius is handled below
    let input = DistanceInput {
        proxy_a: make_proxy(&[p1, p2], 0.0),
        proxy_b: make_proxy(&vertices[..count], 0.0),
        transform_a: Transform::IDENTITY,
        transform_b: Transform::IDENTITY,
        use_radii: false,
    };
    let output = shape_distance(&input, cache, None);

    if output.distance > radius_b + SPECULATIVE_DISTANCE {
        return empty;
    }

    // concave neighbors snap to the segment normal
    let n0 = if convex1 { normal0 } else { normal1 };
    let n2 = if convex2 { normal2 } else { normal1 };

    // does a neighbor face the polygon face `n` better than this segment?
    let neighbor_is_incident = |n: Vec2, face_point: Vec2| -> bool {
        let dot1 = n.dot(p1 - face_point);
        let dot2 = n.dot(p2 - face_point);
        if dot1 < dot2 {
            n0.dot(n) < normal1.dot(n)
        } else {
            n2.dot(n) < normal1.dot(n)
        }
    };

    let mut incident_index: Option<usize> = None;
    let mut incident_normal: Option<usize> = None;

    if cache.count == 1 && output.distance > f32::EPSILON {
        // vertex-vertex
        let p_a = output.point_a;
        let normal = (output.point_b - p_a).normalize_or_zero();

        match classify_normal(&params, normal) {
            NormalType::Skip => return empty,
            NormalType::Admit => {
                let mut manifold = Manifold::default();
                let id = make_id(cache.index_a[0] as usize, cache.index_b[0] as usize);
                manifold.push(p_a, output.distance - radius_b, id);
                manifold.finalize(normal, Vec2::ZERO, xf_a, xf_b);
                return manifold;
            }
            NormalType::Snap => incident_index = Some(cache.index_b[0] as usize),
        }
    } else if cache.count == 2 {
        // vertex-edge
        let ia1 = cache.index_a[0];
        let ia2 = cache.index_a[1];
        let ib1 = cache.index_b[0] as usize;
        let ib2 = cache.index_b[1] as usize;

        if ia1 == ia2 && ib1 != ib2 {
            // one segment vertex against a polygon edge: pick the polygon normal
            // most aligned with the closest points
            let normal_b = output.point_a - output.point_b;
            let ib = if normal_b.dot(normals[ib1]) > normal_b.dot(normals[ib2]) {
                ib1
            } else {
                ib2
            };
            let normal_b = normals[ib];

            match classify_normal(&params, -normal_b) {
                NormalType::Skip => return empty,
                NormalType::Admit => {
                    let ib1 = ib;
                    let ib2 = next_index(ib, count);
                    let b1 = vertices[ib1];
                    let b2 = vertices[ib2];

                    if neighbor_is_incident(normal_b, b1) {
                        return empty;
                    }

                    let mut manifold =
                        clip_segments(b1, b2, p1, p2, normal_b, radius_b, 0.0, make_id(ib1, 1), make_id(ib2, 0));
                    manifold.finalize(-normal_b, Vec2::ZERO, xf_a, xf_b);
                    return manifold;
                }
                NormalType::Snap => incident_normal = Some(ib),
            }
        } else {
            let dot1 = normal1.dot(vertices[ib1] - p1);
            let dot2 = normal1.dot(vertices[ib2] - p2);
            incident_index = Some(if dot1 < dot2 { ib1 } else { ib2 });
        }
    }

    // SAT on the segment normal
    let edge_separation = vertices[..count]
        .iter()
        .map(|&v| normal1.dot(v - p1))
        .fold(f32::MAX, f32::min);

    // SAT on the admissible polygon normals
    let mut polygon_separation = -f32::MAX;
    let mut reference_index = None;
    for i in 0..count {
        let n = normals[i];
        if classify_normal(&params, -n) != NormalType::Admit {
            continue;
        }

        let p = vertices[i];
        let s = n.dot(p2 - p).min(n.dot(p1 - p));
        if s > polygon_separation {
            polygon_separation = s;
            reference_index = Some(i);
        }
    }

    if let Some(ia1) = reference_index.filter(|_| polygon_separation > edge_separation) {
        let ia2 = next_index(ia1, count);
        let a1 = vertices[ia1];
        let a2 = vertices[ia2];
        let n = normals[ia1];

        if neighbor_is_incident(n, a1) {
            return empty;
        }

        let mut manifold = clip_segments(a1, a2, p1, p2, n, radius_b, 0.0, make_id(ia1, 1), make_id(ia2, 0));
        manifold.finalize(-n, Vec2::ZERO, xf_a, xf_b);
        return manifold;
    }

    // edge region: the segment is the reference face
    let (i21, i22) = match incident_normal {
        Some(i) => (i, next_index(i, count)),
        None => {
            let i2 = incident_index.unwrap_or_else(|| {
                // deepest polygon vertex along the segment normal
                let mut deepest = 0;
                for i in 1..count {
                    if normal1.dot(vertices[i]) < normal1.dot(vertices[deepest]) {
                        deepest = i;
                    }
                }
                deepest
            });
            let i1 = if i2 > 0 { i2 - 1 } else { count - 1 };

            let d1 = normal1.dot(normals[i1]);
            let d2 = normal1.dot(normals[i2]);
            if d1 < d2 {
                (i1, i2)
            } else {
                (i2, next_index(i2, count))
            }
        }
    };

    let mut manifold = clip_segments(
        p1,
        p2,
        vertices[i21],
        vertices[i22],
        normal1,
        0.0,
        radius_b,
        make_id(0, i22),
        make_id(1, i21),
    );
    manifold.finalize(normal1, Vec2::ZERO, xf_a, xf_b);
    manifold
}

/// Contact manifold for any supported ordered shape pair.
///
/// The supported orderings put the more complex shape first: polygon before
/// capsule before circle, and segments first. Other orderings return an empty
/// manifold; swap the pair and flip the normal instead. `cache` is only used by
/// chain segment pairs that run GJK.
pub fn collide(
    shape_a: &Shape,
    xf_a: Transform,
    shape_b: &Shape,
    xf_b: Transform,
    cache: &mut SimplexCache,
) -> Manifold {
    match (shape_a, shape_b) {
        (Shape::Circle(a), Shape::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
        (Shape::Capsule(a), Shape::Circle(b)) => collide_capsule_and_circle(a, xf_a, b, xf_b),
        (Shape::Capsule(a), Shape::Capsule(b)) => collide_capsules(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Circle(b)) => collide_polygon_and_circle(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Capsule(b)) => collide_polygon_and_capsule(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(a, xf_a, b, xf_b),
        (Shape::Segment(a), Shape::Circle(b)) => collide_segment_and_circle(a, xf_a, b, xf_b),
        (Shape::Segment(a), Shape::Capsule(b)) => collide_segment_and_capsule(a, xf_a, b, xf_b),
        (Shape::Segment(a), Shape::Polygon(b)) => collide_segment_and_polygon(a, xf_a, b, xf_b),
        (Shape::ChainSegment(a), Shape::Circle(b)) => collide_chain_segment_and_circle(a, xf_a, b, xf_b),
        (Shape::ChainSegment(a), Shape::Capsule(b)) => {
            collide_chain_segment_and_capsule(a, xf_a, b, xf_b, cache)
        }
        (Shape::ChainSegment(a), Shape::Polygon(b)) => {
            collide_chain_segment_and_polygon(a, xf_a, b, xf_b, cache)
        }
        _ => Manifold::default(),
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_4;

    use super::*;
    use crate::collision::collider::make_box;
    use crate::collision::math::Rot;

    const EPS: f32 = 1e-4;

    fn at(x: f32, y: f32) -> Transform {
        Transform::new(Vec2::new(x, y), Rot::IDENTITY)
    }

    // a ground chain segment running right to left, so its right side faces +y
    fn ground_segment() -> ChainSegment {
        ChainSegment {
            ghost1: Vec2::new(2.0, 0.0),
            segment: Segment {
                point1: Vec2::new(1.0, 0.0),
                point2: Vec2::new(-1.0, 0.0),
            },
            ghost2: Vec2::new(-2.0, 0.0),
            chain_id: 0,
        }
    }

    #[test]
    fn test_circles_overlap_and_speculative() {
        let circle = Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        };

        let m = collide_circles(&circle, at(0.0, 0.0), &circle, at(0.9, 0.0));
        assert_eq!(m.point_count, 1);
        assert!((m.normal - Vec2::X).length() < EPS, "normal = {:?}", m.normal);
        let mp = m.points[0];
        assert!((mp.separation + 0.1).abs() < EPS, "separation = {}", mp.separation);
        assert!((mp.point - Vec2::new(0.45, 0.0)).length() < EPS, "point = {:?}", mp.point);
        assert!((mp.anchor_b - (mp.anchor_a - Vec2::new(0.9, 0.0))).length() < EPS);

        // inside the speculative margin
        let m = collide_circles(&circle, at(0.0, 0.0), &circle, at(1.01, 0.0));
        assert_eq!(m.point_count, 1);
        assert!(m.points[0].separation > 0.0);

        // beyond it
        let m = collide_circles(&circle, at(0.0, 0.0), &circle, at(1.5, 0.0));
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_capsule_and_circle_closest_point() {
        let capsule = Capsule {
            center1: Vec2::new(-1.0, 0.0),
            center2: Vec2::new(1.0, 0.0),
            radius: 0.25,
        };
        let circle = Circle {
            center: Vec2::ZERO,
            radius: 0.25,
        };

        let m = collide_capsule_and_circle(&capsule, at(0.0, 0.0), &circle, at(0.5, 0.45));
        assert_eq!(m.point_count, 1);
        assert!((m.normal - Vec2::Y).length() < EPS, "normal = {:?}", m.normal);
        assert!((m.points[0].separation + 0.05).abs() < EPS);

        // past the end cap
        let m = collide_capsule_and_circle(&capsule, at(0.0, 0.0), &circle, at(1.45, 0.0));
        assert_eq!(m.point_count, 1);
        assert!((m.normal - Vec2::X).length() < EPS);
    }

    #[test]
    fn test_polygon_and_circle_face_and_vertex() {
        let square = make_box(1.0, 1.0);
        let circle = Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        };

        let m = collide_polygon_and_circle(&square, at(0.0, 0.0), &circle, at(0.0, 1.4));
        assert_eq!(m.point_count, 1);
        assert!((m.normal - Vec2::Y).length() < EPS);
        assert!((m.points[0].separation + 0.1).abs() < EPS);

        // corner region
        let m = collide_polygon_and_circle(&square, at(0.0, 0.0), &circle, at(1.3, 1.3));
        assert_eq!(m.point_count, 1);
        let expected = Vec2::new(1.0, 1.0).normalize();
        assert!((m.normal - expected).length() < EPS, "normal = {:?}", m.normal);
        let gap = (0.3f32 * 0.3 * 2.0).sqrt() - 0.5;
        assert!((m.points[0].separation - gap).abs() < EPS);
    }

    #[test]
    fn test_parallel_capsules_two_points() {
        let a = Capsule {
            center1: Vec2::new(-1.0, 0.0),
            center2: Vec2::new(1.0, 0.0),
            radius: 0.25,
        };
        let b = Capsule {
            center1: Vec2::new(-0.5, 0.0),
            center2: Vec2::new(0.5, 0.0),
            radius: 0.25,
        };

        let m = collide_capsules(&a, at(0.0, 0.0), &b, at(0.0, 0.45));
        assert_eq!(m.point_count, 2);
        assert!((m.normal - Vec2::Y).length() < EPS, "normal = {:?}", m.normal);
        for mp in m.points() {
            assert!((mp.separation + 0.05).abs() < EPS, "separation = {}", mp.separation);
        }
        assert_ne!(m.points[0].id, m.points[1].id);

        let far = collide_capsules(&a, at(0.0, 0.0), &b, at(0.0, 1.0));
        assert_eq!(far.point_count, 0);
    }

    #[test]
    fn test_crossed_capsules_single_point() {
        let a = Capsule {
            center1: Vec2::new(-1.0, 0.0),
            center2: Vec2::new(1.0, 0.0),
            radius: 0.1,
        };
        let b = Capsule {
            center1: Vec2::new(0.0, -1.0),
            center2: Vec2::new(0.0, 1.0),
            radius: 0.1,
        };

        let m = collide_capsules(&a, at(0.0, 0.0), &b, at(0.0, 0.0));
        assert_eq!(m.point_count, 1);
        assert!((m.points[0].separation + 0.2).abs() < EPS);
    }

    #[test]
    fn test_box_stack_two_points_with_stable_ids() {
        let ground = make_box(1.0, 1.0);
        let block = make_box(0.5, 0.5);

        let m = collide_polygons(&ground, at(0.0, 0.0), &block, at(0.0, 1.49));
        assert_eq!(m.point_count, 2);
        assert!((m.normal - Vec2::Y).length() < EPS, "normal = {:?}", m.normal);
        for mp in m.points() {
            assert!((mp.separation + 0.01).abs() < EPS, "separation = {}", mp.separation);
            assert!((mp.point.y - 0.995).abs() < EPS, "point = {:?}", mp.point);
        }

        let moved = collide_polygons(&ground, at(0.0, 0.0), &block, at(0.01, 1.488));
        assert_eq!(moved.point_count, 2);
        let mut ids: Vec<u16> = m.points().iter().map(|mp| mp.id).collect();
        let mut moved_ids: Vec<u16> = moved.points().iter().map(|mp| mp.id).collect();
        ids.sort_unstable();
        moved_ids.sort_unstable();
        assert_eq!(ids, moved_ids);
    }

    #[test]
    fn test_box_anchor_convention() {
        let ground = make_box(1.0, 1.0);
        let block = make_box(0.5, 0.5);
        let xf_a = Transform::new(Vec2::new(3.0, -2.0), Rot::IDENTITY);
        let xf_b = Transform::new(Vec2::new(3.2, -0.52), Rot::IDENTITY);

        let m = collide_polygons(&ground, xf_a, &block, xf_b);
        assert_eq!(m.point_count, 2);
        for mp in m.points() {
            assert!((mp.point - (xf_a.p + mp.anchor_a)).length() < EPS);
            assert!((mp.anchor_b - (mp.anchor_a + (xf_a.p - xf_b.p))).length() < EPS);
        }
    }

    #[test]
    fn test_separated_boxes_beyond_margin() {
        let a = make_box(0.5, 0.5);
        let m = collide_polygons(&a, at(0.0, 0.0), &a, at(1.1, 0.0));
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_rounded_boxes_corner_contact() {
        let mut a = make_box(0.5, 0.5);
        a.radius = 0.1;

        // corner to corner along the diagonal
        let d = 1.0 + 0.2 / std::f32::consts::SQRT_2 + 0.005;
        let m = collide_polygons(&a, at(0.0, 0.0), &a, at(d, d));
        assert_eq!(m.point_count, 1);
        let expected = Vec2::new(1.0, 1.0).normalize();
        assert!((m.normal - expected).length() < 1e-3, "normal = {:?}", m.normal);
        assert!(m.points[0].separation > 0.0);
    }

    #[test]
    fn test_polygon_and_capsule() {
        let ground = make_box(2.0, 0.5);
        let capsule = Capsule {
            center1: Vec2::new(-0.5, 0.0),
            center2: Vec2::new(0.5, 0.0),
            radius: 0.25,
        };

        let m = collide_polygon_and_capsule(&ground, at(0.0, 0.0), &capsule, at(0.0, 0.74));
        assert_eq!(m.point_count, 2);
        assert!((m.normal - Vec2::Y).length() < EPS, "normal = {:?}", m.normal);
        for mp in m.points() {
            assert!((mp.separation + 0.01).abs() < EPS, "separation = {}", mp.separation);
        }
    }

    #[test]
    fn test_segment_is_two_sided() {
        let segment = ground_segment().segment;
        let circle = Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        };

        let above = collide_segment_and_circle(&segment, at(0.0, 0.0), &circle, at(0.0, 0.45));
        let below = collide_segment_and_circle(&segment, at(0.0, 0.0), &circle, at(0.0, -0.45));
        assert_eq!(above.point_count, 1);
        assert_eq!(below.point_count, 1);
        assert!((below.normal + Vec2::Y).length() < EPS);
    }

    #[test]
    fn test_chain_segment_circle_one_sided() {
        let chain = ground_segment();
        let circle = Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        };

        let above = collide_chain_segment_and_circle(&chain, at(0.0, 0.0), &circle, at(0.0, 0.45));
        assert_eq!(above.point_count, 1);
        assert!((above.normal - Vec2::Y).length() < EPS, "normal = {:?}", above.normal);
        assert!((above.points[0].separation + 0.05).abs() < EPS);

        let below = collide_chain_segment_and_circle(&chain, at(0.0, 0.0), &circle, at(0.0, -0.45));
        assert_eq!(below.point_count, 0);
    }

    #[test]
    fn test_chain_segment_circle_neighbor_region() {
        let chain = ground_segment();
        let circle = Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        };

        // past point1 along a straight chain, owned by the previous segment
        let m = collide_chain_segment_and_circle(&chain, at(0.0, 0.0), &circle, at(1.2, 0.45));
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_chain_segment_polygon_one_sided() {
        let chain = ground_segment();
        let block = make_box(0.5, 0.5);

        let mut cache = SimplexCache::default();
        let above = collide_chain_segment_and_polygon(&chain, at(0.0, 0.0), &block, at(0.0, 0.49), &mut cache);
        assert_eq!(above.point_count, 2);
        assert!((above.normal - Vec2::Y).length() < EPS, "normal = {:?}", above.normal);
        for mp in above.points() {
            assert!((mp.separation + 0.01).abs() < EPS, "separation = {}", mp.separation);
        }

        let mut cache = SimplexCache::default();
        let below = collide_chain_segment_and_polygon(&chain, at(0.0, 0.0), &block, at(0.0, -0.49), &mut cache);
        assert_eq!(below.point_count, 0);
    }

    #[test]
    fn test_chain_segment_polygon_speculative() {
        let chain = ground_segment();
        let block = make_box(0.5, 0.5);

        let mut cache = SimplexCache::default();
        let m = collide_chain_segment_and_polygon(&chain, at(0.0, 0.0), &block, at(0.0, 0.51), &mut cache);
        assert!(m.point_count >= 1);
        assert!(m.normal.y > 0.99, "normal = {:?}", m.normal);
        for mp in m.points() {
            assert!((mp.separation - 0.01).abs() < 1e-3, "separation = {}", mp.separation);
        }

        let mut cache = SimplexCache::default();
        let far = collide_chain_segment_and_polygon(&chain, at(0.0, 0.0), &block, at(0.0, 0.6), &mut cache);
        assert_eq!(far.point_count, 0);
    }

    #[test]
    fn test_dispatch_matches_pair_functions() {
        let mut cache = SimplexCache::default();
        let square = Shape::Polygon(make_box(1.0, 1.0));
        let circle = Shape::Circle(Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        });

        let m = collide(&square, at(0.0, 0.0), &circle, at(0.0, 1.4), &mut cache);
        assert_eq!(m.point_count, 1);

        // reversed ordering is not supported
        let m = collide(&circle, at(0.0, 1.4), &square, at(0.0, 0.0), &mut cache);
        assert_eq!(m.point_count, 0);
    }

    // a box resting on a downhill segment just past the crest at (-1, 0)
    fn box_past_crest() -> (Polygon, Transform) {
        let t = Vec2::new(-1.0, -1.0).normalize();
        let n = Vec2::new(-1.0, 1.0).normalize();
        let center = Vec2::new(-1.0, 0.0) + 0.26 * t + 0.995 * n;
        (make_box(0.25, 1.0), Transform::new(center, Rot::from_angle(FRAC_PI_4)))
    }

    #[test]
    fn test_chain_segment_convex_joint_defers_to_neighbor() {
        let flat = ChainSegment {
            ghost2: Vec2::new(-2.0, -1.0),
            ..ground_segment()
        };
        let downhill = ChainSegment {
            ghost1: Vec2::new(1.0, 0.0),
            segment: Segment {
                point1: Vec2::new(-1.0, 0.0),
                point2: Vec2::new(-2.0, -1.0),
            },
            ghost2: Vec2::new(-3.0, -2.0),
            chain_id: 0,
        };
        let (block, xf_b) = box_past_crest();

        let mut cache = SimplexCache::default();
        let m = collide_chain_segment_and_polygon(&flat, at(0.0, 0.0), &block, xf_b, &mut cache);
        assert_eq!(m.point_count, 0);

        let mut cache = SimplexCache::default();
        let m = collide_chain_segment_and_polygon(&downhill, at(0.0, 0.0), &block, xf_b, &mut cache);
        assert!(m.point_count >= 1);
        let slope_normal = Vec2::new(-1.0, 1.0).normalize();
        assert!((m.normal - slope_normal).length() < 1e-3, "normal = {:?}", m.normal);
    }

    #[test]
    fn test_chain_segment_concave_joint_snaps_normal() {
        // the chain turns up into a wall at (-1, 0)
        let floor = ChainSegment {
            ghost2: Vec2::new(-2.0, 1.0),
            ..ground_segment()
        };
        let block = make_box(0.25, 0.25);

        let mut cache = SimplexCache::default();
        let m = collide_chain_segment_and_polygon(&floor, at(0.0, 0.0), &block, at(-0.74, 0.245), &mut cache);
        assert_eq!(m.point_count, 2);
        assert!((m.normal - Vec2::Y).length() < EPS, "normal = {:?}", m.normal);
        for mp in m.points() {
            assert!((mp.separation + 0.005).abs() < EPS, "separation = {}", mp.separation);
        }
    }

    fn tilted_capsule() -> Capsule {
        let center1 = Vec2::new(-1.05, 0.095);
        Capsule {
            center1,
            center2: center1 + 0.6 * Vec2::new(-(0.3f32.cos()), 0.3f32.sin()),
            radius: 0.1,
        }
    }

    fn next_ground_segment() -> ChainSegment {
        ChainSegment {
            ghost1: Vec2::new(1.0, 0.0),
            segment: Segment {
                point1: Vec2::new(-1.0, 0.0),
                point2: Vec2::new(-3.0, 0.0),
            },
            ghost2: Vec2::new(-4.0, 0.0),
            chain_id: 0,
        }
    }

    #[test]
    fn test_chain_segment_capsule_straight_joint_owner() {
        let capsule = tilted_capsule();

        // the lower end hangs just past point2 of the first segment
        let mut cache = SimplexCache::default();
        let m = collide_chain_segment_and_capsule(&ground_segment(), at(0.0, 0.0), &capsule, at(0.0, 0.0), &mut cache);
        assert_eq!(m.point_count, 0);

        let mut cache = SimplexCache::default();
        let m = collide_chain_segment_and_capsule(&next_ground_segment(), at(0.0, 0.0), &capsule, at(0.0, 0.0), &mut cache);
        assert!(m.point_count >= 1);
        assert!((m.normal - Vec2::Y).length() < EPS, "normal = {:?}", m.normal);
        let deepest = m.points().iter().map(|mp| mp.separation).fold(f32::MAX, f32::min);
        assert!((deepest + 0.005).abs() < EPS, "separation = {deepest}");
    }

    #[test]
    fn test_chain_segment_warm_cache_repeats() {
        let capsule = tilted_capsule();
        let chain = next_ground_segment();

        let mut cache = SimplexCache::default();
        let first = collide_chain_segment_and_capsule(&chain, at(0.0, 0.0), &capsule, at(0.0, 0.0), &mut cache);
        assert!(first.point_count > 0);
        assert!(cache.count > 0);

        let second = collide_chain_segment_and_capsule(&chain, at(0.0, 0.0), &capsule, at(0.0, 0.0), &mut cache);
        assert_eq!(first, second);

        // a small move warm started from the old simplex matches a cold query
        let warm = collide_chain_segment_and_capsule(&chain, at(0.0, 0.0), &capsule, at(0.01, 0.0), &mut cache);
        let mut cold_cache = SimplexCache::default();
        let cold = collide_chain_segment_and_capsule(&chain, at(0.0, 0.0), &capsule, at(0.01, 0.0), &mut cold_cache);
        assert_eq!(warm.point_count, cold.point_count);
        for (w, c) in warm.points().iter().zip(cold.points()) {
            assert_eq!(w.id, c.id);
            assert!((w.separation - c.separation).abs() < EPS);
        }
    }
}
