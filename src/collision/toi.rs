//! Time of impact via conservative advancement on a swept separating axis.

use glam::Vec2;

use super::distance::{shape_distance, DistanceInput, ShapeProxy, SimplexCache};
use super::math::{cross_vs, Rot, Transform};
use super::{LINEAR_SLOP, MAX_POLYGON_VERTICES, TOI_MAX_ITERATIONS};

/// Root finder iteration cap per separating axis.
const ROOT_MAX_ITERATIONS: usize = 50;

/// Motion of a shape between two poses. Rotation happens about the center of mass,
/// which may differ from the shape origin by `local_center`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sweep {
    /// Local center of mass
    pub local_center: Vec2,
    /// Starting center of mass world position
    pub c1: Vec2,
    /// Ending center of mass world position
    pub c2: Vec2,
    /// Starting world rotation
    pub q1: Rot,
    /// Ending world rotation
    pub q2: Rot,
}

/// Evaluate a sweep at `time` in `[0, 1]`.
pub fn get_sweep_transform(sweep: &Sweep, time: f32) -> Transform {
    let c = (1.0 - time) * sweep.c1 + time * sweep.c2;
    let q = Rot::nlerp(sweep.q1, sweep.q2, time);

    // shift from center of mass to origin
    Transform::new(c - q.rotate(sweep.local_center), q)
}

/// Input for [`time_of_impact`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ToiInput {
    pub proxy_a: ShapeProxy,
    pub proxy_b: ShapeProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    /// Sweep interval is `[0, max_fraction]`
    pub max_fraction: f32,
}

/// Outcome of a time of impact query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToiState {
    #[default]
    Unknown,
    /// Iteration budget exhausted. Treat as a possible hit at `fraction`.
    Failed,
    /// Already overlapping at the start of the interval.
    Overlapped,
    Hit,
    Separated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ToiOutput {
    pub state: ToiState,
    /// Hit point, valid for [`ToiState::Hit`]
    pub point: Vec2,
    /// Hit normal from A to B, valid for [`ToiState::Hit`]
    pub normal: Vec2,
    /// Sweep time of the result
    pub fraction: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeparationType {
    Points,
    FaceA,
    FaceB,
}

struct SeparationFunction<'a> {
    proxy_a: &'a ShapeProxy,
    proxy_b: &'a ShapeProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    local_point: Vec2,
    axis: Vec2,
    kind: SeparationType,
}

impl<'a> SeparationFunction<'a> {
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a ShapeProxy,
        sweep_a: &Sweep,
        proxy_b: &'a ShapeProxy,
        sweep_b: &Sweep,
        t1: f32,
    ) -> Self {
        let xf_a = get_sweep_transform(sweep_a, t1);
        let xf_b = get_sweep_transform(sweep_b, t1);

        let mut f = SeparationFunction {
            proxy_a,
            proxy_b,
            sweep_a: *sweep_a,
            sweep_b: *sweep_b,
            local_point: Vec2::ZERO,
            axis: Vec2::ZERO,
            kind: SeparationType::Points,
        };

        let ia0 = cache.index_a[0] as usize;
        let ib0 = cache.index_b[0] as usize;

        if cache.count == 1 {
            let point_a = xf_a.transform_point(proxy_a.points[ia0]);
            let point_b = xf_b.transform_point(proxy_b.points[ib0]);
            f.axis = (point_b - point_a).normalize_or_zero();
            return f;
        }

        if cache.index_a[0] == cache.index_a[1] {
            // two points on B, one on A
            f.kind = SeparationType::FaceB;
            let b1 = proxy_b.points[ib0];
            let b2 = proxy_b.points[cache.index_b[1] as usize];

            f.axis = cross_vs(b2 - b1, 1.0).normalize_or_zero();
            let normal = xf_b.q.rotate(f.axis);

            f.local_point = 0.5 * (b1 + b2);
            let point_b = xf_b.transform_point(f.local_point);
            let point_a = xf_a.transform_point(proxy_a.points[ia0]);

            if (point_a - point_b).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
            return f;
        }

        // two points on A, one or two on B
        f.kind = SeparationType::FaceA;
        let a1 = proxy_a.points[ia0];
        let a2 = proxy_a.points[cache.index_a[1] as usize];

        f.axis = cross_vs(a2 - a1, 1.0).normalize_or_zero();
        let normal = xf_a.q.rotate(f.axis);

        f.local_point = 0.5 * (a1 + a2);
        let point_a = xf_a.transform_point(f.local_point);
        let point_b = xf_b.transform_point(proxy_b.points[ib0]);

        if (point_b - point_a).dot(normal) < 0.0 {
            f.axis = -f.axis;
        }
        f
    }

    /// Deepest points along the axis at time `t`: `(index_a, index_b, separation)`.
    fn find_min_separation(&self, t: f32) -> (usize, usize, f32) {
        let xf_a = get_sweep_transform(&self.sweep_a, t);
        let xf_b = get_sweep_transform(&self.sweep_b, t);

        match self.kind {
            SeparationType::Points => {
                let axis_a = xf_a.q.inv_rotate(self.axis);
                let axis_b = xf_b.q.inv_rotate(-self.axis);

                let index_a = self.proxy_a.find_support(axis_a);
                let index_b = self.proxy_b.find_support(axis_b);

                let point_a = xf_a.transform_point(self.proxy_a.points[index_a]);
                let point_b = xf_b.transform_point(self.proxy_b.points[index_b]);

                (index_a, index_b, (point_b - point_a).dot(self.axis))
            }
            SeparationType::FaceA => {
                let normal = xf_a.q.rotate(self.axis);
                let point_a = xf_a.transform_point(self.local_point);

                let axis_b = xf_b.q.inv_rotate(-normal);
                let index_b = self.proxy_b.find_support(axis_b);
                let point_b = xf_b.transform_point(self.proxy_b.points[index_b]);

                (usize::MAX, index_b, (point_b - point_a).dot(normal))
            }
            SeparationType::FaceB => {
                let normal = xf_b.q.rotate(self.axis);
                let point_b = xf_b.transform_point(self.local_point);

                let axis_a = xf_a.q.inv_rotate(-normal);
                let index_a = self.proxy_a.find_support(axis_a);
                let point_a = xf_a.transform_point(self.proxy_a.points[index_a]);

                (index_a, usize::MAX, (point_a - point_b).dot(normal))
            }
        }
    }

    fn evaluate(&self, index_a: usize, index_b: usize, t: f32) -> f32 {
        let xf_a = get_sweep_transform(&self.sweep_a, t);
        let xf_b = get_sweep_transform(&self.sweep_b, t);

        match self.kind {
            SeparationType::Points => {
                let point_a = xf_a.transform_point(self.proxy_a.points[index_a]);
                let point_b = xf_b.transform_point(self.proxy_b.points[index_b]);
                (point_b - point_a).dot(self.axis)
            }
            SeparationType::FaceA => {
                let normal = xf_a.q.rotate(self.axis);
                let point_a = xf_a.transform_point(self.local_point);
                let point_b = xf_b.transform_point(self.proxy_b.points[index_b]);
                (point_b - point_a).dot(normal)
            }
            SeparationType::FaceB => {
                let normal = xf_b.q.rotate(self.axis);
                let point_b = xf_b.transform_point(self.local_point);
                let point_a = xf_a.transform_point(self.proxy_a.points[index_a]);
                (point_a - point_b).dot(normal)
            }
        }
    }
}

/// Upper bound on the time before two swept shapes penetrate, as a fraction in
/// `[0, max_fraction]`.
///
/// Uses a swept separating axis, so intermediate collisions that do not tunnel along
/// that axis may be missed. Re-run per sub-step when stronger guarantees are needed.
pub fn time_of_impact(input: &ToiInput) -> ToiOutput {
    let mut output = ToiOutput {
        state: ToiState::Unknown,
        fraction: input.max_fraction,
        ..Default::default()
    };

    let sweep_a = input.sweep_a;
    let sweep_b = input.sweep_b;
    debug_assert!(sweep_a.q1.is_normalized() && sweep_a.q2.is_normalized());
    debug_assert!(sweep_b.q1.is_normalized() && sweep_b.q2.is_normalized());

    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    let t_max = input.max_fraction;

    let total_radius = proxy_a.radius + proxy_b.radius;
    let target = LINEAR_SLOP.max(total_radius - LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;

    let mut t1 = 0.0;
    let mut iteration = 0;

    let mut cache = SimplexCache::default();
    let mut distance_input = DistanceInput {
        proxy_a: input.proxy_a,
        proxy_b: input.proxy_b,
        use_radii: false,
        ..Default::default()
    };

    // Each pass computes a new separating axis. Stops when an axis repeats.
    loop {
        distance_input.transform_a = get_sweep_transform(&sweep_a, t1);
        distance_input.transform_b = get_sweep_transform(&sweep_b, t1);

        let distance_output = shape_distance(&distance_input, &mut cache, None);

        iteration += 1;

        if distance_output.distance <= 0.0 {
            output.state = ToiState::Overlapped;
            output.fraction = 0.0;
            break;
        }

        if distance_output.distance < target + tolerance {
            output.state = ToiState::Hit;
            output.fraction = t1;
            output.normal = distance_output.normal;
            output.point = distance_output.point_a + proxy_a.radius * distance_output.normal;
            break;
        }

        let fcn = SeparationFunction::new(&cache, proxy_a, &sweep_a, proxy_b, &sweep_b, t1);

        // Resolve the deepest point repeatedly. Bounded by the vertex count.
        let mut done = false;
        let mut t2 = t_max;
        let mut push_back_iterations = 0;
        loop {
            let (index_a, index_b, mut s2) = fcn.find_min_separation(t2);

            // final configuration separated
            if s2 > target + tolerance {
                output.state = ToiState::Separated;
                output.fraction = t_max;
                done = true;
                break;
            }

            // reached tolerance: advance the sweeps
            if s2 > target - tolerance {
                t1 = t2;
                break;
            }

            let mut s1 = fcn.evaluate(index_a, index_b, t1);

            // The root finder may have run out of iterations.
            if s1 < target - tolerance {
                output.state = ToiState::Failed;
                output.fraction = t1;
                done = true;
                break;
            }

            // touching at t1 (possibly zero)
            if s1 <= target + tolerance {
                output.state = ToiState::Hit;
                output.fraction = t1;
                done = true;
                break;
            }

            // 1D root of f(t) - target, alternating bisection and secant steps
            let mut root_iteration_count = 0;
            let mut a1 = t1;
            let mut a2 = t2;
            loop {
                let t = if root_iteration_count & 1 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    0.5 * (a1 + a2)
                };
                root_iteration_count += 1;

                let s = fcn.evaluate(index_a, index_b, t);

                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }

                // keep the root bracketed
                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iteration_count == ROOT_MAX_ITERATIONS {
                    break;
                }
            }

            push_back_iterations += 1;
            if push_back_iterations == MAX_POLYGON_VERTICES {
                break;
            }
        }

        if done {
            break;
        }

        if iteration == TOI_MAX_ITERATIONS {
            output.state = ToiState::Failed;
            output.fraction = t1;
            break;
        }
    }

    if output.state == ToiState::Hit && output.normal == Vec2::ZERO {
        distance_input.transform_a = get_sweep_transform(&sweep_a, output.fraction);
        distance_input.transform_b = get_sweep_transform(&sweep_b, output.fraction);
        let distance_output = shape_distance(&distance_input, &mut cache, None);
        output.normal = distance_output.normal;
        output.point = distance_output.point_a + proxy_a.radius * distance_output.normal;
    }

    match output.state {
        ToiState::Failed => tracing::warn!(
            "time_of_impact failed to converge after {} iterations at t = {}",
            iteration,
            output.fraction
        ),
        _ => tracing::trace!(
            "time_of_impact {:?} at t = {} ({} iterations)",
            output.state,
            output.fraction,
            iteration
        ),
    }

    output
}
