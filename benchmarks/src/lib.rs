//! Shared setup helpers for rein-collide benchmarks.
//!
//! ## Running
//!
//! Wall-clock (criterion):
//!   cargo bench --manifest-path benchmarks/Cargo.toml --bench collision
//!
//! iai-callgrind (instruction counts, requires valgrind):
//!   cargo install iai-callgrind-runner
//!   cargo bench --manifest-path benchmarks/Cargo.toml --bench collision_iai
//!
//! Filter by group:
//!   cargo bench --manifest-path benchmarks/Cargo.toml --bench collision -- tree

use glam::Vec2;
use rein::collision::broadphase::{DynamicTree, DEFAULT_CATEGORY_BITS};
use rein::collision::collider::{make_box, Capsule, Circle, Polygon};
use rein::{Aabb, Rot, Transform};

// ---------------------------------------------------------------------------
// Tree scenes
// ---------------------------------------------------------------------------

/// Box of half extent `half` centered at `center`.
pub fn box_at(center: Vec2, half: f32) -> Aabb {
    Aabb::new(center - Vec2::splat(half), center + Vec2::splat(half))
}

/// Grid of `n` unit boxes spaced so neighbors almost touch.
pub fn grid_boxes(n: usize) -> Vec<Aabb> {
    let cols = (n as f32).sqrt().ceil() as usize;
    (0..n)
        .map(|i| {
            let x = (i % cols) as f32 * 1.1;
            let y = (i / cols) as f32 * 1.1;
            box_at(Vec2::new(x, y), 0.5)
        })
        .collect()
}

/// Deterministic scatter of `n` small boxes over a square of side `extent`.
pub fn scattered_boxes(n: usize, extent: f32) -> Vec<Aabb> {
    let mut seed: u32 = 0x9E37_79B9;
    let mut next = move || {
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (seed >> 8) as f32 / (1u32 << 24) as f32
    };

    (0..n)
        .map(|_| {
            let center = Vec2::new(next(), next()) * extent;
            box_at(center, 0.1 + 0.4 * next())
        })
        .collect()
}

/// Tree holding every box, user data = index.
pub fn setup_tree(boxes: &[Aabb]) -> (DynamicTree, Vec<i32>) {
    let mut tree = DynamicTree::new();
    let ids = boxes
        .iter()
        .enumerate()
        .map(|(i, aabb)| tree.create_proxy(*aabb, DEFAULT_CATEGORY_BITS, i as u64))
        .collect();
    (tree, ids)
}

/// Shift every proxy by `delta`, the way a step moves bodies.
pub fn move_all(tree: &mut DynamicTree, ids: &[i32], boxes: &mut [Aabb], delta: Vec2) -> usize {
    let mut moved = 0;
    for (id, aabb) in ids.iter().zip(boxes.iter_mut()) {
        *aabb = Aabb::new(aabb.lower + delta, aabb.upper + delta);
        if tree.move_proxy(*id, *aabb) {
            moved += 1;
        }
    }
    moved
}

/// Count overlapping pairs with one tree query per box.
pub fn count_pairs(tree: &DynamicTree, boxes: &[Aabb]) -> usize {
    let mut pairs = 0;
    for (i, aabb) in boxes.iter().enumerate() {
        tree.query(*aabb, u64::MAX, |_, user_data| {
            if user_data as usize > i {
                pairs += 1;
            }
            true
        });
    }
    pairs
}

// ---------------------------------------------------------------------------
// Shape pairs
// ---------------------------------------------------------------------------

pub fn unit_box() -> Polygon {
    make_box(0.5, 0.5)
}

pub fn unit_circle() -> Circle {
    Circle { center: Vec2::ZERO, radius: 0.5 }
}

pub fn unit_capsule() -> Capsule {
    Capsule {
        center1: Vec2::new(-0.5, 0.0),
        center2: Vec2::new(0.5, 0.0),
        radius: 0.25,
    }
}

/// Pose of shape B resting on shape A with a small overlap.
pub fn resting_pose() -> Transform {
    Transform::new(Vec2::new(0.05, 0.99), Rot::from_angle(0.02))
}

/// Pose of shape B well outside the speculative margin.
pub fn separated_pose() -> Transform {
    Transform::new(Vec2::new(3.0, 0.0), Rot::IDENTITY)
}
