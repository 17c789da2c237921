//! 2D collision kernel: shapes, broadphase tree, GJK distance and contact manifolds.
//!
//! # Architecture
//!
//! A simulation step uses the kernel in this order:
//!
//! 1. Reduce shapes to point-cloud proxies ([`distance::ShapeProxy`])
//! 2. Broadphase candidate search ([`broadphase::DynamicTree`])
//! 3. Exact separation via GJK ([`distance::shape_distance`])
//! 4. Contact manifold generation per shape pair ([`manifold`])
//! 5. Continuous collision via time of impact ([`toi::time_of_impact`])
//! 6. Mover displacement against collision planes ([`mover::solve_planes`])

pub mod broadphase;
pub mod collider;
pub mod contact;
pub mod distance;
pub mod hull;
pub mod manifold;
pub mod math;
pub mod mover;
pub mod toi;

/// Maximum number of vertices on a convex polygon. Every per-shape point array uses it.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Length units per meter. Scales the tolerances below.
pub const LENGTH_UNITS_PER_METER: f32 = 1.0;

/// Collision and constraint tolerance, in meters.
pub const LINEAR_SLOP: f32 = 0.005 * LENGTH_UNITS_PER_METER;

/// Contacts are kept up to this separation so the solver can act before overlap.
pub const SPECULATIVE_DISTANCE: f32 = 4.0 * LINEAR_SLOP;

/// Fattening margin applied to broadphase proxies.
pub const AABB_MARGIN: f32 = 0.1 * LENGTH_UNITS_PER_METER;

/// Upper bound on world extents. Used to validate ray input.
pub const HUGE: f32 = 100_000.0 * LENGTH_UNITS_PER_METER;

/// Iteration cap for GJK.
pub const GJK_MAX_ITERATIONS: usize = 20;

/// Iteration cap for linear shape casts.
pub const SHAPE_CAST_MAX_ITERATIONS: usize = 20;

/// Iteration cap for the outer time of impact loop.
pub const TOI_MAX_ITERATIONS: usize = 20;

/// Iteration cap for the plane solver.
pub const PLANE_SOLVER_MAX_ITERATIONS: usize = 20;

/// Depth of the explicit traversal stack used by tree queries.
pub const TREE_STACK_SIZE: usize = 1024;

/// Configuration for a [`broadphase::DynamicTree`].
#[derive(Debug, Clone)]
pub struct TreeConfig {
    /// Margin added around each proxy AABB. Default: [`AABB_MARGIN`].
    /// Zero stores exact boxes.
    pub aabb_margin: f32,
    /// Initial node pool capacity. Default: 16.
    pub initial_capacity: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            aabb_margin: AABB_MARGIN,
            initial_capacity: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_config_default() {
        let config = TreeConfig::default();
        assert!((config.aabb_margin - 0.1).abs() < 1e-6);
        assert_eq!(config.initial_capacity, 16);
    }

    #[test]
    fn test_speculative_distance() {
        assert!((SPECULATIVE_DISTANCE - 0.02).abs() < 1e-6);
    }
}
