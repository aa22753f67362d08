use std::ops::{BitOr, BitOrAssign, Mul};

use cgmath::{EuclideanSpace, InnerSpace, Matrix, Point3, Vector3};

use crate::Transform;

/// A bounding sphere in 3D space.
///
/// A negative radius marks the empty sphere, which is the identity of the
/// merge operator. Fitting and merging are fast approximations: the result
/// always encloses its inputs but is not the minimal enclosing sphere.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundSphere {
    pub center: Point3<f32>,
    pub radius: f32,
}

impl Default for BoundSphere {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundSphere {
    /// The empty sphere (radius -1).
    pub fn empty() -> Self {
        Self {
            center: Point3::origin(),
            radius: -1.0,
        }
    }

    /// Creates a sphere from a center and a radius.
    pub fn new(center: Point3<f32>, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Fits a sphere around the given points.
    ///
    /// The center is the mean of the points and the radius the largest
    /// distance from that mean. Returns the empty sphere for no points.
    pub fn from_points(points: &[Point3<f32>]) -> Self {
        if points.is_empty() {
            return Self::empty();
        }

        let mut sum = Vector3::new(0.0, 0.0, 0.0);
        for point in points {
            sum += point.to_vec();
        }
        let center = Point3::from_vec(sum / points.len() as f32);

        let mut radius2: f32 = 0.0;
        for point in points {
            radius2 = radius2.max((center - *point).magnitude2());
        }

        Self {
            center,
            radius: radius2.sqrt(),
        }
    }

    /// Returns true for the empty sphere.
    pub fn is_empty(&self) -> bool {
        self.radius < 0.0
    }

    /// Returns a sphere enclosing both `self` and `other`.
    ///
    /// If one sphere contains the other the container is returned unchanged.
    /// Otherwise the result is centered at the midpoint of both centers with
    /// radius `max(r1, r2) + distance / 2`.
    pub fn merge(&self, other: &BoundSphere) -> Self {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }

        let distance = (self.center - other.center).magnitude();

        if self.radius >= distance + other.radius {
            return *self;
        }
        if other.radius >= distance + self.radius {
            return *other;
        }

        Self {
            center: self.center.midpoint(other.center),
            radius: self.radius.max(other.radius) + distance / 2.0,
        }
    }

    /// Maps the sphere through a transform. The empty sphere stays empty.
    pub fn apply(&self, transform: &Transform) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self {
            center: transform.transform_point(self.center),
            radius: self.radius * transform.scale.abs(),
        }
    }

    /// Maps the sphere through the inverse of a transform.
    pub fn apply_inv(&self, transform: &Transform) -> Self {
        if self.is_empty() {
            return *self;
        }
        let local = transform.rotation.transpose() * (self.center.to_vec() - transform.translation);
        Self {
            center: Point3::from_vec(local / transform.scale),
            radius: self.radius / transform.scale.abs(),
        }
    }
}

impl BitOr for BoundSphere {
    type Output = BoundSphere;

    fn bitor(self, rhs: BoundSphere) -> BoundSphere {
        self.merge(&rhs)
    }
}

impl BitOrAssign for BoundSphere {
    fn bitor_assign(&mut self, rhs: BoundSphere) {
        *self = self.merge(&rhs);
    }
}

impl Mul<BoundSphere> for Transform {
    type Output = BoundSphere;

    fn mul(self, rhs: BoundSphere) -> BoundSphere {
        rhs.apply(&self)
    }
}
