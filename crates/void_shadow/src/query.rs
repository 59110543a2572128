//! Shadow caster discovery
//!
//! Finds the objects that may throw a shadow into the view for one light.
//! Objects inside the view frustum qualify directly; objects outside it
//! qualify only when they lie between the light and a frustum face the
//! light is outside of.

use void_math::AABB;

use crate::camera::Camera;
use crate::caster::ShadowCaster;
use crate::config::ShadowConfig;
use crate::light::Light;
use crate::scene::{ObjectId, SceneGraph};

/// Per-light caster query
pub struct ShadowCasterQuery;

impl ShadowCasterQuery {
    /// Casters for `light` seen from `camera`, ordered by object id
    pub fn find_casters(scene: &SceneGraph, light: &Light, camera: &Camera, config: &ShadowConfig) -> Vec<ObjectId> {
        if !light.cast_shadows {
            return Vec::new();
        }

        let candidates = if light.is_directional() {
            let region = Self::directional_region(light, camera, config.directional_extrusion_distance);
            scene.query_aabb(&region)
        } else {
            let sphere = light.bounding_sphere();
            if !camera.is_visible_sphere(&sphere) {
                log::trace!("Light '{}' out of view, no casters", light.name);
                return Vec::new();
            }
            scene.query_sphere(&sphere)
        };

        let frustum = camera.frustum_planes();
        let clip_volumes = light.frustum_clip_volumes(camera);
        let far_distance = if config.technique.is_texture() {
            config.shadow_far_distance
        } else {
            0.0
        };

        let casters: Vec<ObjectId> = candidates
            .into_iter()
            .filter(|&id| {
                let Some(object) = scene.object(id) else {
                    return false;
                };
                if !object.casts_shadows() || !object.is_visible() {
                    return false;
                }
                let bounds = object.world_bounding_box();
                if !frustum.is_aabb_visible(&bounds) && !clip_volumes.iter().any(|v| v.intersects_aabb(&bounds)) {
                    return false;
                }
                if far_distance > 0.0 {
                    let sphere = object.world_bounding_sphere();
                    if (sphere.center - camera.position).length() - sphere.radius > far_distance {
                        return false;
                    }
                }
                true
            })
            .collect();

        log::debug!("Light '{}': {} shadow casters", light.name, casters.len());
        casters
    }

    /// Box enclosing the view frustum swept against the light direction
    pub fn directional_region(light: &Light, camera: &Camera, extrusion_distance: f32) -> AABB {
        let offset = light.derived_direction() * extrusion_distance;
        camera
            .world_space_corners()
            .iter()
            .fold(AABB::EMPTY, |acc, corner| {
                acc.expand_to_include(*corner).expand_to_include(*corner - offset)
            })
    }
}
