//! Plane solver for kinematic movers.
//!
//! The caller gathers collision planes around a capsule mover (usually with
//! [`collide_mover`] on shapes found by a tree query), then asks
//! [`solve_planes`] for a displacement that respects them.

use glam::Vec2;

use super::collider::{Capsule, Shape};
use super::distance::{make_proxy, shape_distance, DistanceInput, SimplexCache};
use super::math::{Plane, Transform};
use super::{LINEAR_SLOP, PLANE_SOLVER_MAX_ITERATIONS};

/// A plane found between a mover and a shape.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaneResult {
    /// Points from the shape toward the mover. The offset is the overlap.
    pub plane: Plane,
    /// Closest point on the shape surface.
    pub point: Vec2,
    /// If false the plane should be ignored.
    pub hit: bool,
}

/// A constraint plane fed to [`solve_planes`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionPlane {
    pub plane: Plane,
    /// Largest push the plane may apply. `f32::MAX` is rigid, lower values are soft.
    pub push_limit: f32,
    /// Push applied by the last solve.
    pub push: f32,
    /// Whether [`clip_vector`] clips against this plane. Use false for soft planes.
    pub clip_velocity: bool,
}

impl CollisionPlane {
    /// A rigid plane that also clips velocity.
    pub fn rigid(plane: Plane) -> Self {
        Self {
            plane,
            push_limit: f32::MAX,
            push: 0.0,
            clip_velocity: true,
        }
    }
}

/// Output of [`solve_planes`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaneSolverResult {
    /// Mover displacement that satisfies the planes.
    pub translation: Vec2,
    /// Iterations used. Equal to the cap when the solve did not converge.
    pub iteration_count: usize,
}

/// Find the collision plane between `shape` and a capsule mover.
///
/// Both are in the same frame. No hit is reported once the core distance
/// exceeds the summed radii.
pub fn collide_mover(shape: &Shape, mover: &Capsule) -> PlaneResult {
    let proxy_a = shape.proxy();
    let input = DistanceInput {
        proxy_a,
        proxy_b: make_proxy(&[mover.center1, mover.center2], mover.radius),
        transform_a: Transform::IDENTITY,
        transform_b: Transform::IDENTITY,
        use_radii: false,
    };

    let total_radius = proxy_a.radius + mover.radius;

    let mut cache = SimplexCache::default();
    let output = shape_distance(&input, &mut cache, None);

    if output.distance > total_radius {
        return PlaneResult::default();
    }

    PlaneResult {
        plane: Plane {
            normal: output.normal,
            offset: total_radius - output.distance,
        },
        point: output.point_a + proxy_a.radius * output.normal,
        hit: true,
    }
}

/// Solve for a mover displacement near `target_delta` that satisfies `planes`.
///
/// Relaxed Gauss-Seidel over the accumulated push of each plane, clamped to
/// `[0, push_limit]`. The push of every plane is written back for [`clip_vector`].
pub fn solve_planes(target_delta: Vec2, planes: &mut [CollisionPlane]) -> PlaneSolverResult {
    for plane in planes.iter_mut() {
        plane.push = 0.0;
    }

    let mut delta = target_delta;
    let tolerance = LINEAR_SLOP;

    let mut iteration = 0;
    while iteration < PLANE_SOLVER_MAX_ITERATIONS {
        let mut total_push = 0.0;
        for plane in planes.iter_mut() {
            // slop keeps the mover resting slightly inside, preventing jitter
            let separation = plane.plane.separation(delta) + LINEAR_SLOP;
            let push = -separation;

            let accumulated = plane.push;
            plane.push = (plane.push + push).clamp(0.0, plane.push_limit);
            let push = plane.push - accumulated;
            delta += push * plane.plane.normal;

            total_push += push.abs();
        }

        if total_push < tolerance {
            break;
        }
        iteration += 1;
    }

    if iteration == PLANE_SOLVER_MAX_ITERATIONS {
        tracing::trace!("plane solver hit the iteration cap with {} planes", planes.len());
    }

    PlaneSolverResult {
        translation: delta,
        iteration_count: iteration,
    }
}

/// Remove the components of `vector` moving into clipping planes.
///
/// Planes with zero push or `clip_velocity == false` are skipped.
pub fn clip_vector(vector: Vec2, planes: &[CollisionPlane]) -> Vec2 {
    let mut v = vector;
    for plane in planes {
        if plane.push == 0.0 || !plane.clip_velocity {
            continue;
        }
        let normal = plane.plane.normal;
        v -= v.dot(normal).min(0.0) * normal;
    }
    v
}
