//! Planes and view frustum culling

use crate::vector::{Vec3, Vec4};
use crate::matrix::Mat4;
use crate::bounds::{AABB, Sphere};

/// Side of a plane a point or volume lies on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlaneSide {
    /// Exactly on the plane
    None,
    /// Same side as the normal
    Positive,
    /// Opposite side of the normal
    Negative,
    /// Straddles the plane
    Both,
}

/// Plane in 3D space (ax + by + cz + d = 0)
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Plane {
    /// Plane normal (unit vector)
    pub normal: Vec3,
    /// Distance from origin along normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    ///
    /// The normal will be normalized automatically.
    #[inline]
    pub fn new(normal: Vec3, distance: f32) -> Self {
        let len = normal.length();
        if len > 1e-10 {
            Self {
                normal: normal / len,
                distance: distance / len,
            }
        } else {
            Self {
                normal: Vec3::Y,
                distance: 0.0,
            }
        }
    }

    /// Create a plane from a point on the plane and its normal
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize();
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    /// Create a plane from three points (counter-clockwise winding)
    pub fn from_points(p0: Vec3, p1: Vec3, p2: Vec3) -> Self {
        let normal = (p1 - p0).cross(p2 - p0).normalize();
        Self {
            normal,
            distance: -normal.dot(p0),
        }
    }

    /// Get the signed distance from a point to the plane
    ///
    /// Positive = in front (same side as normal)
    /// Negative = behind (opposite side of normal)
    #[inline]
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    pub fn side_of_point(&self, point: Vec3) -> PlaneSide {
        let d = self.distance_to_point(point);
        if d > 0.0 {
            PlaneSide::Positive
        } else if d < 0.0 {
            PlaneSide::Negative
        } else {
            PlaneSide::None
        }
    }

    /// Classify an AABB against the plane using its center and projected extent
    pub fn side_of_aabb(&self, aabb: &AABB) -> PlaneSide {
        if aabb.is_empty() {
            return PlaneSide::None;
        }
        let d = self.distance_to_point(aabb.center());
        let h = aabb.half_extents();
        let max_abs = (h.x * self.normal.x).abs() + (h.y * self.normal.y).abs() + (h.z * self.normal.z).abs();

        if d < -max_abs {
            PlaneSide::Negative
        } else if d > max_abs {
            PlaneSide::Positive
        } else {
            PlaneSide::Both
        }
    }

    /// Same plane with the normal reversed
    #[inline]
    pub fn flip(self) -> Self {
        Self {
            normal: -self.normal,
            distance: -self.distance,
        }
    }

    /// Plane as `(a, b, c, d)` for homogeneous dot products
    #[inline]
    pub fn as_vec4(&self) -> Vec4 {
        self.normal.extend(self.distance)
    }
}

impl Default for Plane {
    fn default() -> Self {
        Self {
            normal: Vec3::Y,
            distance: 0.0,
        }
    }
}

/// View frustum for culling
///
/// The six planes are: left, right, bottom, top, near, far
/// All planes have normals pointing inward (toward the visible region).
#[derive(Clone, Debug)]
pub struct FrustumPlanes {
    /// Frustum planes (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl FrustumPlanes {
    pub const LEFT: usize = 0;
    pub const RIGHT: usize = 1;
    pub const BOTTOM: usize = 2;
    pub const TOP: usize = 3;
    pub const NEAR: usize = 4;
    pub const FAR: usize = 5;

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Uses the Gribb/Hartmann method for extracting planes from the
    /// combined view-projection matrix.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let m = vp.to_array();

        // Left plane:   row3 + row0
        let left = Plane::new(
            Vec3::new(m[3] + m[0], m[7] + m[4], m[11] + m[8]),
            m[15] + m[12],
        );

        // Right plane:  row3 - row0
        let right = Plane::new(
            Vec3::new(m[3] - m[0], m[7] - m[4], m[11] - m[8]),
            m[15] - m[12],
        );

        // Bottom plane: row3 + row1
        let bottom = Plane::new(
            Vec3::new(m[3] + m[1], m[7] + m[5], m[11] + m[9]),
            m[15] + m[13],
        );

        // Top plane:    row3 - row1
        let top = Plane::new(
            Vec3::new(m[3] - m[1], m[7] - m[5], m[11] - m[9]),
            m[15] - m[13],
        );

        // Near plane:   row3 + row2
        let near = Plane::new(
            Vec3::new(m[3] + m[2], m[7] + m[6], m[11] + m[10]),
            m[15] + m[14],
        );

        // Far plane:    row3 - row2
        let far = Plane::new(
            Vec3::new(m[3] - m[2], m[7] - m[6], m[11] - m[10]),
            m[15] - m[14],
        );

        Self {
            planes: [left, right, bottom, top, near, far],
        }
    }

    /// Test if a point is inside the frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Returns true if the AABB might be visible
    pub fn is_aabb_visible(&self, aabb: &AABB) -> bool {
        if aabb.is_empty() {
            return false;
        }
        for plane in &self.planes {
            // Get the corner most aligned with plane normal
            let p = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );

            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }

    /// Returns true if the sphere might be visible
    pub fn is_sphere_visible(&self, sphere: &Sphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(sphere.center) >= -sphere.radius)
    }
}

impl Default for FrustumPlanes {
    fn default() -> Self {
        Self {
            planes: [Plane::default(); 6],
        }
    }
}
