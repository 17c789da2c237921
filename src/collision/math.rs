//! 2D rotation, transform, bounding box and plane primitives built on `glam::Vec2`.

use glam::Vec2;

/// 2D cross product of two vectors (z component of the 3D cross product).
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a vector and a scalar: `v x s`.
#[inline]
pub fn cross_vs(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

/// Cross product of a scalar and a vector: `s x v`.
#[inline]
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Counter-clockwise perpendicular.
#[inline]
pub fn left_perp(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}

/// Clockwise perpendicular.
#[inline]
pub fn right_perp(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}

/// Normalize `v`, returning its original length. Tiny vectors yield `(0, Vec2::ZERO)`.
#[inline]
pub fn get_length_and_normalize(v: Vec2) -> (f32, Vec2) {
    let length = v.length();
    if length < f32::EPSILON {
        return (0.0, Vec2::ZERO);
    }
    (length, v * (1.0 / length))
}

#[inline]
pub fn is_valid_float(a: f32) -> bool {
    a.is_finite()
}

#[inline]
pub fn is_valid_vec2(v: Vec2) -> bool {
    v.x.is_finite() && v.y.is_finite()
}

/// Rotation stored as cosine/sine pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rot {
    /// Cosine
    pub c: f32,
    /// Sine
    pub s: f32,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    pub const IDENTITY: Rot = Rot { c: 1.0, s: 0.0 };

    /// Make a rotation from an angle in radians.
    pub fn from_angle(radians: f32) -> Self {
        let (s, c) = radians.sin_cos();
        Self { c, s }
    }

    /// Angle in radians, in `[-pi, pi]`.
    pub fn angle(self) -> f32 {
        self.s.atan2(self.c)
    }

    #[inline]
    pub fn rotate(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    #[inline]
    pub fn inv_rotate(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// `self * other`
    #[inline]
    pub fn mul(self, other: Rot) -> Rot {
        Rot {
            c: self.c * other.c - self.s * other.s,
            s: self.s * other.c + self.c * other.s,
        }
    }

    /// `transpose(self) * other`
    #[inline]
    pub fn inv_mul(self, other: Rot) -> Rot {
        Rot {
            c: self.c * other.c + self.s * other.s,
            s: self.c * other.s - self.s * other.c,
        }
    }

    fn normalize(self) -> Rot {
        let mag = (self.s * self.s + self.c * self.c).sqrt();
        let inv = if mag > 0.0 { 1.0 / mag } else { 0.0 };
        Rot { c: self.c * inv, s: self.s * inv }
    }

    /// Normalized linear interpolation between two rotations.
    pub fn nlerp(q1: Rot, q2: Rot, t: f32) -> Rot {
        let omt = 1.0 - t;
        Rot { c: omt * q1.c + t * q2.c, s: omt * q1.s + t * q2.s }.normalize()
    }

    /// Advance the rotation by `delta_angle` radians using a first order update.
    pub fn integrate(self, delta_angle: f32) -> Rot {
        Rot {
            c: self.c - delta_angle * self.s,
            s: self.s + delta_angle * self.c,
        }
        .normalize()
    }

    pub fn is_normalized(self) -> bool {
        let qq = self.s * self.s + self.c * self.c;
        1.0 - 0.0006 < qq && qq < 1.0 + 0.0006
    }

    pub fn is_valid(self) -> bool {
        is_valid_float(self.s) && is_valid_float(self.c) && self.is_normalized()
    }
}

/// Rigid transform: translation plus rotation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub p: Vec2,
    pub q: Rot,
}

impl Transform {
    pub const IDENTITY: Transform = Transform { p: Vec2::ZERO, q: Rot::IDENTITY };

    pub fn new(p: Vec2, q: Rot) -> Self {
        Self { p, q }
    }

    #[inline]
    pub fn transform_point(&self, v: Vec2) -> Vec2 {
        self.q.rotate(v) + self.p
    }

    #[inline]
    pub fn inv_transform_point(&self, v: Vec2) -> Vec2 {
        self.q.inv_rotate(v - self.p)
    }

    /// `self * other`
    pub fn mul(&self, other: &Transform) -> Transform {
        Transform {
            q: self.q.mul(other.q),
            p: self.q.rotate(other.p) + self.p,
        }
    }

    /// `inverse(self) * other`
    pub fn inv_mul(&self, other: &Transform) -> Transform {
        Transform {
            q: self.q.inv_mul(other.q),
            p: self.q.inv_rotate(other.p - self.p),
        }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    pub lower: Vec2,
    pub upper: Vec2,
}

impl Aabb {
    pub fn new(lower: Vec2, upper: Vec2) -> Self {
        Self { lower, upper }
    }

    #[inline]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    /// Does `self` fully contain `other`?
    #[inline]
    pub fn contains(&self, other: &Aabb) -> bool {
        self.lower.x <= other.lower.x
            && self.lower.y <= other.lower.y
            && other.upper.x <= self.upper.x
            && other.upper.y <= self.upper.y
    }

    /// Test whether two AABBs overlap.
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        !(other.lower.x > self.upper.x
            || other.lower.y > self.upper.y
            || self.lower.x > other.upper.x
            || self.lower.y > other.upper.y)
    }

    #[inline]
    pub fn perimeter(&self) -> f32 {
        let w = self.upper.x - self.lower.x;
        let h = self.upper.y - self.lower.y;
        2.0 * (w + h)
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        0.5 * (self.lower + self.upper)
    }

    #[inline]
    pub fn extents(&self) -> Vec2 {
        0.5 * (self.upper - self.lower)
    }

    /// Pad the box by `margin` on every side.
    #[inline]
    pub fn fattened(&self, margin: f32) -> Aabb {
        let r = Vec2::splat(margin);
        Aabb { lower: self.lower - r, upper: self.upper + r }
    }

    /// Grow `self` to include `other`. Returns true if the box changed.
    pub fn enlarge(&mut self, other: &Aabb) -> bool {
        let mut changed = false;
        if other.lower.x < self.lower.x {
            self.lower.x = other.lower.x;
            changed = true;
        }
        if other.lower.y < self.lower.y {
            self.lower.y = other.lower.y;
            changed = true;
        }
        if self.upper.x < other.upper.x {
            self.upper.x = other.upper.x;
            changed = true;
        }
        if self.upper.y < other.upper.y {
            self.upper.y = other.upper.y;
            changed = true;
        }
        changed
    }

    pub fn is_valid(&self) -> bool {
        let d = self.upper - self.lower;
        d.x >= 0.0 && d.y >= 0.0 && is_valid_vec2(self.lower) && is_valid_vec2(self.upper)
    }
}

/// Separating half-space: `dot(normal, p) - offset`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Plane {
    pub normal: Vec2,
    pub offset: f32,
}

impl Plane {
    #[inline]
    pub fn separation(&self, point: Vec2) -> f32 {
        self.normal.dot(point) - self.offset
    }

    pub fn is_valid(&self) -> bool {
        is_valid_vec2(self.normal)
            && (self.normal.length() - 1.0).abs() < 1e-4
            && is_valid_float(self.offset)
    }
}
