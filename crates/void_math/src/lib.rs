//! # void_math - Geometry Primitives
//!
//! Vectors, matrices, bounds and plane-bounded volumes used by the
//! rendering crates for culling and shadow geometry.

pub mod vector;
pub mod matrix;
pub mod bounds;
pub mod frustum;
pub mod volume;

pub use vector::*;
pub use matrix::*;
pub use bounds::*;
pub use frustum::*;
pub use volume::*;

pub mod prelude {
    pub use crate::vector::{Vec3, Vec4};
    pub use crate::matrix::Mat4;
    pub use crate::bounds::{AABB, Sphere};
    pub use crate::frustum::{Plane, PlaneSide, FrustumPlanes};
    pub use crate::volume::PlaneBoundedVolume;
}
