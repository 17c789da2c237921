//! Collision kernel benchmarks (iai-callgrind - instruction counts).
//!
//! Prerequisites:
//!   cargo install iai-callgrind-runner
//!   sudo dnf install valgrind   # Fedora/WSL2
//!
//! Run all:    cargo bench --manifest-path benchmarks/Cargo.toml --bench collision_iai
//! Filter:     cargo bench --manifest-path benchmarks/Cargo.toml --bench collision_iai -- tree

use std::hint::black_box;

use glam::Vec2;
use iai_callgrind::{library_benchmark, library_benchmark_group, main};
use rein::collision::manifold::{collide_capsules, collide_polygons};
use rein::{shape_distance, DistanceInput, Rot, SimplexCache, Transform};
use rein_collide_bench::*;

// ---------------------------------------------------------------------------
// Dynamic tree
// ---------------------------------------------------------------------------

#[library_benchmark]
fn tree_build_1000() {
    let boxes = scattered_boxes(black_box(1000), 100.0);
    black_box(setup_tree(&boxes));
}

#[library_benchmark]
fn tree_pairs_1000() {
    let boxes = grid_boxes(black_box(1000));
    let (tree, _) = setup_tree(&boxes);
    black_box(count_pairs(&tree, &boxes));
}

#[library_benchmark]
fn tree_move_1000() {
    let mut boxes = scattered_boxes(black_box(1000), 100.0);
    let (mut tree, ids) = setup_tree(&boxes);
    for _ in 0..10 {
        black_box(move_all(&mut tree, &ids, &mut boxes, Vec2::new(0.05, -0.02)));
    }
}

#[library_benchmark]
fn tree_rebuild_full_1000() {
    let (mut tree, _) = setup_tree(&scattered_boxes(black_box(1000), 100.0));
    black_box(tree.rebuild(true));
}

library_benchmark_group!(
    name = tree_group;
    benchmarks =
        tree_build_1000,
        tree_pairs_1000,
        tree_move_1000,
        tree_rebuild_full_1000
);

// ---------------------------------------------------------------------------
// Narrowphase
// ---------------------------------------------------------------------------

#[library_benchmark]
fn distance_box_capsule() {
    let input = DistanceInput {
        proxy_a: unit_box().proxy(),
        proxy_b: unit_capsule().proxy(),
        transform_a: Transform::IDENTITY,
        transform_b: Transform::new(Vec2::new(1.2, 0.7), Rot::from_angle(0.4)),
        use_radii: true,
    };
    let mut cache = SimplexCache::default();
    black_box(shape_distance(black_box(&input), &mut cache, None));
}

#[library_benchmark]
fn manifold_polygons_resting() {
    let polygon = unit_box();
    black_box(collide_polygons(&polygon, Transform::IDENTITY, &polygon, black_box(resting_pose())));
}

#[library_benchmark]
fn manifold_capsules_resting() {
    let capsule = unit_capsule();
    black_box(collide_capsules(&capsule, Transform::IDENTITY, &capsule, black_box(resting_pose())));
}

library_benchmark_group!(
    name = narrowphase_group;
    benchmarks =
        distance_box_capsule,
        manifold_polygons_resting,
        manifold_capsules_resting
);

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

main!(library_benchmark_groups = tree_group, narrowphase_group);
