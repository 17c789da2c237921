//! Rein 2D Collision
//!
//! A 2D collision kernel for rigid-body simulation.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! 1. **collision::math** - Rotations, transforms, boxes and planes on top of glam
//! 2. **collision::hull** / **collision::collider** - Convex hulls, shapes and per-shape queries
//! 3. **collision::broadphase** - Dynamic AABB tree
//! 4. **collision::distance** / **collision::toi** - GJK, shape casts and time of impact
//! 5. **collision::manifold** - Contact manifolds per shape pair
//! 6. **collision::mover** - Plane solver for kinematic movers
//!
//! The sentinel results (empty hull, `hit == false`, [`ToiState`]) are the primary
//! contract. [`CollisionError`] backs the checked `try_*` entry points.

pub mod collision;
pub mod error;

// Re-export commonly used types
pub use collision::broadphase::{DynamicTree, TreeProxy, TreeStats};
pub use collision::collider::{
    Capsule, CastOutput, ChainSegment, Circle, MassData, Polygon, RayCastInput, Segment, Shape,
    ShapeCastInput,
};
pub use collision::contact::{Manifold, ManifoldPoint};
pub use collision::distance::{
    shape_cast, shape_distance, DistanceInput, DistanceOutput, ShapeCastPairInput, ShapeProxy,
    SimplexCache,
};
pub use collision::hull::{compute_hull, Hull};
pub use collision::manifold::collide;
pub use collision::math::{Aabb, Plane, Rot, Transform};
pub use collision::mover::{clip_vector, solve_planes, CollisionPlane, PlaneResult, PlaneSolverResult};
pub use collision::toi::{time_of_impact, Sweep, ToiInput, ToiOutput, ToiState};
pub use collision::TreeConfig;
pub use error::CollisionError;

// Re-export glam for convenience
pub use glam;
