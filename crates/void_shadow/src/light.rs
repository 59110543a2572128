//! Lights and the clip volumes derived from them

use serde::{Deserialize, Serialize};
use void_math::{FrustumPlanes, Plane, PlaneBoundedVolume, PlaneSide, Sphere, Vec3, Vec4};

use crate::camera::Camera;
use crate::material::ColourValue;

/// Type of light
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightType {
    #[default]
    Point,
    Directional,
    Spot,
}

/// Camera frustum corner indices bounding each frustum plane
const FACE_CORNERS: [[usize; 4]; 6] = [
    [1, 2, 6, 5], // LEFT
    [0, 3, 7, 4], // RIGHT
    [2, 3, 7, 6], // BOTTOM
    [0, 1, 5, 4], // TOP
    [0, 1, 2, 3], // NEAR
    [4, 5, 6, 7], // FAR
];

const CLIP_EPSILON: f32 = 1e-6;

/// A light source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Light {
    pub name: String,
    pub light_type: LightType,
    /// World position (point and spot)
    pub position: Vec3,
    /// Direction the light travels (directional and spot)
    pub direction: Vec3,
    pub diffuse: ColourValue,
    pub specular: ColourValue,
    /// Distance beyond which the light has no effect
    pub attenuation_range: f32,
    pub cast_shadows: bool,
    /// Spot inner cone angle in radians
    pub spot_inner: f32,
    /// Spot outer cone angle in radians
    pub spot_outer: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            name: String::new(),
            light_type: LightType::Point,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            diffuse: ColourValue::WHITE,
            specular: ColourValue::WHITE,
            attenuation_range: 100_000.0,
            cast_shadows: true,
            spot_inner: 30.0_f32.to_radians(),
            spot_outer: 40.0_f32.to_radians(),
        }
    }
}

impl Light {
    pub fn point(name: impl Into<String>, position: Vec3, range: f32) -> Self {
        Self {
            name: name.into(),
            position,
            attenuation_range: range,
            ..Default::default()
        }
    }

    pub fn directional(name: impl Into<String>, direction: Vec3) -> Self {
        Self {
            name: name.into(),
            light_type: LightType::Directional,
            direction: direction.normalize_or_zero(),
            ..Default::default()
        }
    }

    pub fn spot(name: impl Into<String>, position: Vec3, direction: Vec3, range: f32, outer_angle: f32) -> Self {
        Self {
            name: name.into(),
            light_type: LightType::Spot,
            position,
            direction: direction.normalize_or_zero(),
            attenuation_range: range,
            spot_outer: outer_angle,
            spot_inner: outer_angle * 0.75,
            ..Default::default()
        }
    }

    pub fn with_cast_shadows(mut self, cast: bool) -> Self {
        self.cast_shadows = cast;
        self
    }

    #[inline]
    pub fn is_directional(&self) -> bool {
        self.light_type == LightType::Directional
    }

    /// Normalised travel direction
    pub fn derived_direction(&self) -> Vec3 {
        self.direction.normalize_or_zero()
    }

    /// Homogeneous light position: `(position, 1)` or `(-direction, 0)`
    pub fn as_vec4(&self) -> Vec4 {
        if self.is_directional() {
            (-self.derived_direction()).extend(0.0)
        } else {
            self.position.extend(1.0)
        }
    }

    /// Attenuation sphere of point and spot lights
    pub fn bounding_sphere(&self) -> Sphere {
        Sphere::new(self.position, self.attenuation_range)
    }

    /// Whether the light can reach the sphere
    pub fn affects_sphere(&self, sphere: &Sphere) -> bool {
        self.is_directional() || self.bounding_sphere().intersects_sphere(sphere)
    }

    /// Volume between the light and the camera's near plane
    ///
    /// An object intersecting it may put a shadow volume across the near
    /// plane. Returns an unbounded volume when the light lies on the near
    /// plane, since every object then qualifies.
    pub fn near_clip_volume(&self, camera: &Camera) -> PlaneBoundedVolume {
        let corners = camera.world_space_corners();
        let near = camera.near_plane();
        let light = self.as_vec4();
        let d = near.normal.dot(light.xyz()) + near.distance * light.w;
        if d.abs() < CLIP_EPSILON {
            return PlaneBoundedVolume::new(PlaneSide::Negative);
        }

        let face = FACE_CORNERS[FrustumPlanes::NEAR].map(|i| corners[i]);
        self.light_prism(face, near)
    }

    /// Volumes between the light and each frustum face it lies outside of
    ///
    /// Objects outside the view frustum that intersect one of these may
    /// still cast a shadow into it.
    pub fn frustum_clip_volumes(&self, camera: &Camera) -> Vec<PlaneBoundedVolume> {
        let corners = camera.world_space_corners();
        let planes = camera.frustum_planes();
        let light = self.as_vec4();

        planes
            .planes
            .iter()
            .zip(FACE_CORNERS)
            .filter(|(plane, _)| plane.normal.dot(light.xyz()) + plane.distance * light.w < -CLIP_EPSILON)
            .map(|(plane, face)| self.light_prism(face.map(|i| corners[i]), *plane))
            .collect()
    }

    /// Convex volume swept from a quad towards the light
    ///
    /// Pyramid with the light at its apex for positional lights, prism
    /// extending against the light direction for directional lights.
    fn light_prism(&self, face: [Vec3; 4], face_plane: Plane) -> PlaneBoundedVolume {
        let centroid = (face[0] + face[1] + face[2] + face[3]) * 0.25;
        let mut planes = Vec::with_capacity(6);

        let interior = if self.is_directional() {
            let dir = self.derived_direction();
            for i in 0..4 {
                let (a, b) = (face[i], face[(i + 1) % 4]);
                planes.extend(plane_through(a, b, a - dir));
            }
            centroid - dir
        } else {
            let light = self.position;
            for i in 0..4 {
                planes.extend(plane_through(light, face[i], face[(i + 1) % 4]));
            }
            planes.push(Plane::from_point_normal(light, face_plane.normal));
            (centroid + light) * 0.5
        };
        planes.push(face_plane);

        for plane in &mut planes {
            if plane.distance_to_point(interior) < 0.0 {
                *plane = plane.flip();
            }
        }
        PlaneBoundedVolume::with_planes(planes, PlaneSide::Negative)
    }
}

fn plane_through(a: Vec3, b: Vec3, c: Vec3) -> Option<Plane> {
    let normal = (b - a).cross(c - a);
    if normal.length_squared() < 1e-12 {
        return None;
    }
    Some(Plane::from_point_normal(a, normal))
}
