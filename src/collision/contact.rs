//! Contact manifold data produced by the pair functions in [`super::manifold`].

use glam::Vec2;

use super::math::Transform;

/// Pack two feature indices into a contact point id.
#[inline]
pub const fn make_id(a: usize, b: usize) -> u16 {
    (((a & 0xFF) as u16) << 8) | ((b & 0xFF) as u16)
}

/// A single contact point between two shapes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ManifoldPoint {
    /// World position, midway between the two surfaces.
    pub point: Vec2,
    /// Location relative to the origin of shape A, in world space.
    pub anchor_a: Vec2,
    /// Location relative to the origin of shape B, in world space.
    pub anchor_b: Vec2,
    /// Negative when overlapping, positive up to the speculative margin.
    pub separation: f32,
    /// Accumulated normal impulse, owned by the solver.
    pub normal_impulse: f32,
    /// Accumulated friction impulse, owned by the solver.
    pub tangent_impulse: f32,
    /// Largest normal impulse applied over the sub-steps.
    pub total_normal_impulse: f32,
    /// Relative normal velocity before the solve.
    pub normal_velocity: f32,
    /// Feature pair that produced the point. Stable across small motions.
    pub id: u16,
    /// The point matched a point of the previous manifold.
    pub persisted: bool,
}

/// Up to two contact points sharing a normal that points from A to B.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Manifold {
    pub normal: Vec2,
    pub rolling_impulse: f32,
    pub points: [ManifoldPoint; 2],
    pub point_count: usize,
}

impl Manifold {
    /// The live contact points.
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    /// Carry solver impulses over from the previous step.
    ///
    /// Points are matched by id. Matched points get the old impulses and are
    /// flagged `persisted`; the rest start from zero.
    pub fn warm_start_from(&mut self, previous: &Manifold) {
        self.rolling_impulse = previous.rolling_impulse;
        for mp in self.points.iter_mut().take(self.point_count) {
            mp.normal_impulse = 0.0;
            mp.tangent_impulse = 0.0;
            mp.persisted = false;

            if let Some(old) = previous.points().iter().find(|old| old.id == mp.id) {
                mp.normal_impulse = old.normal_impulse;
                mp.tangent_impulse = old.tangent_impulse;
                mp.persisted = true;
            }
        }
    }

    // Contact points are generated in the local frame of A. `origin` is the local
    // offset the points were computed relative to.
    pub(crate) fn finalize(&mut self, local_normal: Vec2, origin: Vec2, xf_a: Transform, xf_b: Transform) {
        self.normal = xf_a.q.rotate(local_normal);
        let offset = xf_a.p - xf_b.p;
        for mp in self.points.iter_mut().take(self.point_count) {
            mp.anchor_a = xf_a.q.rotate(mp.anchor_a + origin);
            mp.anchor_b = mp.anchor_a + offset;
            mp.point = xf_a.p + mp.anchor_a;
        }
    }

    pub(crate) fn push(&mut self, local_anchor: Vec2, separation: f32, id: u16) {
        if self.point_count < 2 {
            self.points[self.point_count] = ManifoldPoint {
                anchor_a: local_anchor,
                separation,
                id,
                ..Default::default()
            };
            self.point_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_id_packs_low_bytes() {
        assert_eq!(make_id(0, 0), 0);
        assert_eq!(make_id(1, 2), 0x0102);
        assert_eq!(make_id(0x1FF, 0x103), 0xFF03);
    }

    #[test]
    fn test_warm_start_matches_ids() {
        let mut previous = Manifold::default();
        previous.push(Vec2::ZERO, 0.0, make_id(0, 1));
        previous.points[0].normal_impulse = 2.5;
        previous.points[0].tangent_impulse = -0.5;

        let mut current = Manifold::default();
        current.push(Vec2::ZERO, 0.0, make_id(0, 1));
        current.push(Vec2::X, 0.0, make_id(1, 0));
        current.warm_start_from(&previous);

        assert!(current.points[0].persisted);
        assert!((current.points[0].normal_impulse - 2.5).abs() < 1e-6);
        assert!((current.points[0].tangent_impulse + 0.5).abs() < 1e-6);
        assert!(!current.points[1].persisted);
        assert_eq!(current.points[1].normal_impulse, 0.0);
    }
}
