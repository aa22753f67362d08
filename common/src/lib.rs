//! Value types shared by the scene core.
//!
//! [`Transform`] is the uniform-scale affine transform nodes are expressed in,
//! and [`BoundSphere`] is the bounding volume used for visibility and framing.

mod bound_sphere;
mod transform;

pub use bound_sphere::BoundSphere;
pub use transform::Transform;

/// Tolerance for floating point comparisons.
pub const EPSILON: f32 = 1e-5;
