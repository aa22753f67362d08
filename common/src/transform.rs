use std::ops::Mul;

use cgmath::{
    EuclideanSpace, InnerSpace, Matrix, Matrix3, Matrix4, Point3, Quaternion, SquareMatrix, Vector3,
};

use crate::EPSILON;

/// An affine transform made of a rotation, a translation and a uniform scale.
///
/// Points are mapped as `rotation * (p * scale) + translation`. Composition
/// follows the matrix convention: `a * b` expresses `b` in the frame of `a`,
/// so `(a * b) * p == a * (b * p)`. Composition is associative but not
/// commutative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Orthonormal rotation matrix
    pub rotation: Matrix3<f32>,
    pub translation: Vector3<f32>,
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    /// The transform that leaves every point where it is.
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::new(0.0, 0.0, 0.0),
            scale: 1.0,
        }
    }

    /// Creates a transform from its three components.
    pub fn new(translation: Vector3<f32>, rotation: Matrix3<f32>, scale: f32) -> Self {
        Self {
            rotation,
            translation,
            scale,
        }
    }

    /// Creates a transform whose rotation is given as a quaternion.
    ///
    /// The quaternion does not need to be normalized.
    pub fn from_quaternion(translation: Vector3<f32>, rotation: Quaternion<f32>, scale: f32) -> Self {
        let rotation = if rotation.magnitude2() > EPSILON {
            Matrix3::from(rotation.normalize())
        } else {
            Matrix3::identity()
        };
        Self::new(translation, rotation, scale)
    }

    /// Creates a pure translation.
    pub fn from_translation(translation: Vector3<f32>) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// Maps a point through this transform.
    pub fn transform_point(&self, point: Point3<f32>) -> Point3<f32> {
        Point3::from_vec(self.rotation * (point.to_vec() * self.scale) + self.translation)
    }

    /// Maps a direction through this transform (translation is ignored).
    pub fn transform_vector(&self, vector: Vector3<f32>) -> Vector3<f32> {
        self.rotation * (vector * self.scale)
    }

    /// Returns the inverse transform, or `None` if the scale is degenerate.
    ///
    /// The rotation is assumed orthonormal, so its inverse is its transpose.
    pub fn invert(&self) -> Option<Self> {
        if self.scale.abs() < EPSILON {
            return None;
        }
        let rotation = self.rotation.transpose();
        let scale = 1.0 / self.scale;
        Some(Self {
            rotation,
            translation: -(rotation * self.translation) * scale,
            scale,
        })
    }

    /// Converts to a column-major 4x4 matrix: `T * R * S`.
    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.translation)
            * Matrix4::from(self.rotation)
            * Matrix4::from_scale(self.scale)
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        Transform {
            rotation: self.rotation * rhs.rotation,
            translation: self.translation + self.rotation * (rhs.translation * self.scale),
            scale: self.scale * rhs.scale,
        }
    }
}

impl Mul<Point3<f32>> for Transform {
    type Output = Point3<f32>;

    fn mul(self, rhs: Point3<f32>) -> Point3<f32> {
        self.transform_point(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Rotation3};

    const TEST_EPSILON: f32 = 1e-4;

    fn assert_point_eq(actual: Point3<f32>, expected: Point3<f32>) {
        assert!(
            (actual.x - expected.x).abs() < TEST_EPSILON
                && (actual.y - expected.y).abs() < TEST_EPSILON
                && (actual.z - expected.z).abs() < TEST_EPSILON,
            "expected {:?}, got {:?}",
            expected,
            actual
        );
    }

    fn rotate_z(degrees: f32) -> Transform {
        Transform::new(
            Vector3::new(0.0, 0.0, 0.0),
            Matrix3::from_angle_z(Deg(degrees)),
            1.0,
        )
    }

    #[test]
    fn test_identity_leaves_points() {
        let p = Point3::new(1.0, 2.0, 3.0);
        assert_point_eq(Transform::identity() * p, p);
        assert_eq!(Transform::default(), Transform::identity());
    }

    #[test]
    fn test_point_mapping_order() {
        // Scale, then rotate, then translate
        let t = Transform::new(
            Vector3::new(10.0, 0.0, 0.0),
            Matrix3::from_angle_z(Deg(90.0)),
            2.0,
        );
        assert_point_eq(t * Point3::new(1.0, 0.0, 0.0), Point3::new(10.0, 2.0, 0.0));
    }

    #[test]
    fn test_composition_matches_sequential_application() {
        let a = Transform::new(
            Vector3::new(1.0, 2.0, 3.0),
            Matrix3::from_angle_x(Deg(30.0)),
            2.0,
        );
        let b = Transform::new(
            Vector3::new(-4.0, 0.5, 1.0),
            Matrix3::from_angle_y(Deg(75.0)),
            0.5,
        );
        let p = Point3::new(0.3, -1.2, 7.0);

        assert_point_eq((a * b) * p, a * (b * p));
    }

    #[test]
    fn test_composition_is_not_commutative() {
        let rotate = rotate_z(90.0);
        let translate = Transform::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let origin = Point3::new(0.0, 0.0, 0.0);

        // Translate first, then rotate: (1,0,0) turns into (0,1,0)
        assert_point_eq((rotate * translate) * origin, Point3::new(0.0, 1.0, 0.0));
        // Rotate first, then translate: the origin only moves along x
        assert_point_eq((translate * rotate) * origin, Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_composition_is_associative() {
        let a = rotate_z(30.0);
        let b = Transform::from_translation(Vector3::new(0.0, 5.0, 0.0));
        let c = Transform::new(Vector3::new(1.0, 0.0, 0.0), Matrix3::identity(), 3.0);
        let p = Point3::new(1.0, 1.0, 1.0);

        assert_point_eq(((a * b) * c) * p, (a * (b * c)) * p);
    }

    #[test]
    fn test_invert_round_trip() {
        let t = Transform::new(
            Vector3::new(3.0, -2.0, 8.0),
            Matrix3::from_angle_y(Deg(40.0)),
            4.0,
        );
        let inv = t.invert().unwrap();
        let p = Point3::new(-1.0, 0.25, 9.0);

        assert_point_eq(inv * (t * p), p);
        assert_point_eq((t * inv) * p, p);
    }

    #[test]
    fn test_invert_zero_scale() {
        let t = Transform::new(Vector3::new(1.0, 0.0, 0.0), Matrix3::identity(), 0.0);
        assert!(t.invert().is_none());
    }

    #[test]
    fn test_from_quaternion_matches_matrix() {
        let q = Quaternion::from_angle_z(Deg(90.0));
        let t = Transform::from_quaternion(Vector3::new(0.0, 0.0, 0.0), q, 1.0);
        assert_point_eq(t * Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_from_degenerate_quaternion_is_identity() {
        let t = Transform::from_quaternion(
            Vector3::new(0.0, 0.0, 0.0),
            Quaternion::new(0.0, 0.0, 0.0, 0.0),
            1.0,
        );
        assert_eq!(t.rotation, Matrix3::identity());
    }

    #[test]
    fn test_to_matrix_agrees_with_point_mapping() {
        let t = Transform::new(
            Vector3::new(5.0, 6.0, 7.0),
            Matrix3::from_angle_x(Deg(60.0)),
            1.5,
        );
        let p = Point3::new(1.0, -2.0, 0.5);
        let via_matrix = Point3::from_homogeneous(t.to_matrix() * p.to_homogeneous());

        assert_point_eq(via_matrix, t * p);
    }

    #[test]
    fn test_transform_vector_ignores_translation() {
        let t = Transform::new(Vector3::new(100.0, 0.0, 0.0), Matrix3::identity(), 2.0);
        let v = t.transform_vector(Vector3::new(1.0, 0.0, 0.0));
        assert!((v.x - 2.0).abs() < EPSILON);
        assert!(v.y.abs() < EPSILON);
    }
}
