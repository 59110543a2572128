//! Convex volumes bounded by planes

use crate::vector::Vec3;
use crate::bounds::{AABB, Sphere};
use crate::frustum::{Plane, PlaneSide};

/// Convex region described by a list of planes
///
/// `outside` names the side of each plane that lies outside the volume. A
/// volume without planes is unbounded and intersects everything.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaneBoundedVolume {
    pub planes: Vec<Plane>,
    pub outside: PlaneSide,
}

impl PlaneBoundedVolume {
    pub fn new(outside: PlaneSide) -> Self {
        Self {
            planes: Vec::new(),
            outside,
        }
    }

    pub fn with_planes(planes: Vec<Plane>, outside: PlaneSide) -> Self {
        Self { planes, outside }
    }

    #[inline]
    pub fn is_unbounded(&self) -> bool {
        self.planes.is_empty()
    }

    /// Conservative AABB test: rejected only when fully outside one plane
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        if aabb.is_empty() {
            return false;
        }
        self.planes
            .iter()
            .all(|plane| plane.side_of_aabb(aabb) != self.outside)
    }

    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        self.planes.iter().all(|plane| {
            let d = plane.distance_to_point(sphere.center);
            match self.outside {
                PlaneSide::Negative => d >= -sphere.radius,
                PlaneSide::Positive => d <= sphere.radius,
                _ => true,
            }
        })
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.side_of_point(point) != self.outside)
    }
}

impl Default for PlaneBoundedVolume {
    fn default() -> Self {
        Self::new(PlaneSide::Negative)
    }
}
