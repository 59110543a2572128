//! Projective texture shadows
//!
//! Each shadow-casting light, up to the configured texture count, gets an
//! offscreen camera placed by a [`ShadowCameraSetup`]. Casters are drawn
//! into that light's texture in a flat shadow colour, then receivers project
//! the texture back onto themselves through the light camera's matrices.
//! Lights past the texture count sample the null shadow texture and stay
//! fully lit.

use void_math::{Mat4, Vec3};

use crate::camera::Camera;
use crate::caster::ShadowReceiverParams;
use crate::config::{PixelFormat, ShadowConfig, TextureShadowConfig};
use crate::frame::FrameContext;
use crate::light::{Light, LightType};
use crate::material::{ColourValue, Material, NULL_SHADOW_TEXTURE};
use crate::query::ShadowCasterQuery;
use crate::render_system::{FrameBufferType, RenderSystem, RenderTarget};
use crate::scene::{ObjectId, SceneGraph};

/// Widest spot light shadow frustum
const MAX_SPOT_FOV_DEGREES: f32 = 175.0;

/// Spot cone widening applied to the shadow frustum
const SPOT_FOV_PADDING: f32 = 1.2;

/// Field of view used for point light shadow cameras
const POINT_FOV_DEGREES: f32 = 120.0;

const SHADOW_CAMERA_NEAR: f32 = 0.1;

/// Places the camera a light's shadow texture is rendered from
pub trait ShadowCameraSetup {
    fn shadow_camera(&self, scene: &SceneGraph, camera: &Camera, light: &Light, config: &ShadowConfig) -> Camera;
}

/// Orthographic fit for directional lights, the spot cone for spot lights
/// and a wide view towards the camera focus for point lights
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultShadowCameraSetup;

impl ShadowCameraSetup for DefaultShadowCameraSetup {
    fn shadow_camera(&self, scene: &SceneGraph, camera: &Camera, light: &Light, config: &ShadowConfig) -> Camera {
        let name = format!("{}/shadow_camera", light.name);
        let mut shadow = match light.light_type {
            LightType::Directional => {
                let bounds = scene.visible_bounds();
                let (center, radius) = if bounds.is_empty() {
                    (camera.position, 1.0)
                } else {
                    (bounds.center(), bounds.half_extents().length().max(1e-3))
                };
                let direction = light.derived_direction();
                let mut shadow = Camera::orthographic(
                    name,
                    radius * 2.0,
                    radius * 2.0,
                    SHADOW_CAMERA_NEAR,
                    radius * 2.0 + SHADOW_CAMERA_NEAR * 2.0,
                );
                shadow.position = center - direction * (radius + SHADOW_CAMERA_NEAR);
                shadow.set_direction(direction);
                shadow
            }
            LightType::Spot => {
                let fov = (light.spot_outer * SPOT_FOV_PADDING).min(MAX_SPOT_FOV_DEGREES.to_radians());
                let mut shadow =
                    Camera::perspective(name, fov, 1.0, SHADOW_CAMERA_NEAR, light.attenuation_range);
                shadow.position = light.position;
                shadow.set_direction(light.derived_direction());
                shadow
            }
            LightType::Point => {
                let far = if config.shadow_far_distance > 0.0 {
                    config.shadow_far_distance
                } else {
                    light.attenuation_range
                };
                let mut shadow =
                    Camera::perspective(name, POINT_FOV_DEGREES.to_radians(), 1.0, SHADOW_CAMERA_NEAR, far);
                shadow.position = light.position;
                let focus = camera.position + camera.forward() * (config.texture.offset * far);
                shadow.look_at(focus);
                shadow
            }
        };

        if shadow.forward().cross(Vec3::Y).length_squared() < 1e-6 {
            shadow.up = Vec3::Z;
        }
        shadow
    }
}

/// Render target holding one light's shadow
#[derive(Clone, Debug)]
pub struct ShadowTexture {
    pub name: String,
    pub size: u32,
    pub format: PixelFormat,
    /// Light rendered into the texture this frame
    pub light: Option<String>,
    /// World to texture coordinates for the current light
    pub texture_matrix: Mat4,
}

/// Draw counts of one texture shadow update
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureShadowStats {
    /// Lights given a shadow texture
    pub lights: usize,
    pub caster_draws: usize,
    /// Casters skipped after a failure
    pub skipped: usize,
}

/// Owns the shadow textures and renders casters into them
pub struct TextureShadowRenderer {
    textures: Vec<ShadowTexture>,
    camera_setup: Box<dyn ShadowCameraSetup>,
}

impl TextureShadowRenderer {
    pub fn new(config: &TextureShadowConfig) -> Self {
        let textures = (0..config.count)
            .map(|i| ShadowTexture {
                name: format!("void_shadow/ShadowTexture{}", i),
                size: config.size,
                format: config.format,
                light: None,
                texture_matrix: Mat4::IDENTITY,
            })
            .collect();
        Self {
            textures,
            camera_setup: Box::new(DefaultShadowCameraSetup),
        }
    }

    /// Replace the camera placement strategy
    pub fn set_camera_setup(&mut self, setup: Box<dyn ShadowCameraSetup>) {
        self.camera_setup = setup;
    }

    pub fn textures(&self) -> &[ShadowTexture] {
        &self.textures
    }

    /// Index of the texture holding `light`'s shadow this frame
    pub fn texture_index(&self, light: &Light) -> Option<usize> {
        self.textures
            .iter()
            .position(|texture| texture.light.as_deref() == Some(light.name.as_str()))
    }

    /// Texture name receivers sample for `light`
    pub fn texture_name(&self, light: &Light) -> &str {
        self.texture_index(light)
            .and_then(|i| self.textures.get(i))
            .map_or(NULL_SHADOW_TEXTURE, |texture| texture.name.as_str())
    }

    /// Shadow-casting lights able to reach the view, in scene order
    pub fn shadow_lights<'a>(scene: &'a SceneGraph, camera: &Camera) -> Vec<&'a Light> {
        scene
            .lights()
            .iter()
            .filter(|light| light.cast_shadows)
            .filter(|light| light.is_directional() || camera.is_visible_sphere(&light.bounding_sphere()))
            .collect()
    }

    /// Render casters into one texture per shadow-casting light
    ///
    /// Leaves the viewport bound with the main camera's matrices and the
    /// scene ambient restored.
    pub fn render_shadow_textures(
        &mut self,
        scene: &SceneGraph,
        camera: &Camera,
        rs: &mut dyn RenderSystem,
        config: &ShadowConfig,
        frame: &mut FrameContext,
    ) -> TextureShadowStats {
        let mut stats = TextureShadowStats::default();
        for texture in &mut self.textures {
            texture.light = None;
        }

        let lights = Self::shadow_lights(scene, camera);
        if lights.len() > self.textures.len() {
            log::debug!(
                "{} shadow lights, {} shadow textures; the rest use the null texture",
                lights.len(),
                self.textures.len()
            );
        }

        let caster_ambient = if config.technique.is_modulative() {
            config.shadow_colour
        } else {
            ColourValue::BLACK
        };

        for (index, light) in lights.into_iter().take(self.textures.len()).enumerate() {
            let shadow_camera = self.camera_setup.shadow_camera(scene, camera, light, config);
            let view = shadow_camera.view_matrix();
            let projection = shadow_camera.projection_matrix();

            rs.set_render_target(RenderTarget::ShadowTexture(index));
            rs.clear(FrameBufferType::ALL);
            rs.set_view_matrix(&view);
            rs.set_projection_matrix(&projection);
            rs.set_ambient_light(caster_ambient);

            let casters = ShadowCasterQuery::find_casters(scene, light, camera, config);
            for id in casters {
                match Self::render_caster(scene, id, rs, config, frame) {
                    Some(draws) => stats.caster_draws += draws,
                    None => stats.skipped += 1,
                }
            }

            if let Some(texture) = self.textures.get_mut(index) {
                texture.light = Some(light.name.clone());
                texture.texture_matrix = Mat4::CLIP_SPACE_TO_IMAGE_SPACE * projection * view;
            }
            stats.lights += 1;
        }

        rs.set_render_target(RenderTarget::Viewport);
        rs.set_view_matrix(&camera.view_matrix());
        rs.set_projection_matrix(&camera.projection_matrix());
        rs.set_ambient_light(scene.ambient_light());
        stats
    }

    /// Draw one caster with its derived caster pass, `None` when skipped
    fn render_caster(
        scene: &SceneGraph,
        id: ObjectId,
        rs: &mut dyn RenderSystem,
        config: &ShadowConfig,
        frame: &mut FrameContext,
    ) -> Option<usize> {
        if frame.has_failed(id) {
            return None;
        }
        let object = scene.object(id)?;
        let ops = match object.render_operations() {
            Ok(ops) => ops,
            Err(e) => {
                log::warn!("Shadow caster '{}' has no geometry: {}. Skipping.", object.name(), e);
                frame.mark_failed(id);
                return None;
            }
        };

        rs.set_world_matrix(&object.world_transform());
        let mut draws = 0;
        for op in &ops {
            let fallback;
            let material = match scene.material(op.material) {
                Some(material) => material,
                None => {
                    fallback = Material::new(op.material);
                    &fallback
                }
            };
            if !material.casts_shadows() {
                continue;
            }
            let custom = material
                .shadow_caster_material
                .as_deref()
                .and_then(|name| scene.material(name));
            rs.bind_pass(&material.caster_pass(config.technique, config.shadow_colour, custom));

            if let Err(e) = rs.render(op) {
                log::warn!("Shadow caster material '{}' failed: {}. Skipping.", op.material, e);
                frame.mark_failed(id);
                return None;
            }
            draws += 1;
        }
        Some(draws)
    }

    /// Projection parameters for receivers of the shadow in `index`
    ///
    /// Fading is disabled (both distances 0) without a shadow far distance.
    pub fn receiver_params(&self, index: usize, config: &ShadowConfig) -> Option<ShadowReceiverParams> {
        let texture = self.textures.get(index)?;
        if texture.light.is_none() {
            return None;
        }
        let far = config.shadow_far_distance;
        Some(ShadowReceiverParams {
            texture_matrix: texture.texture_matrix.to_cols_array_2d(),
            fade_start: config.texture.fade_start * far,
            fade_end: config.texture.fade_end * far,
            _pad: [0.0; 2],
        })
    }

    /// Bind `light`'s shadow texture and projection for receiver passes
    pub fn bind_receiver(&self, light: &Light, rs: &mut dyn RenderSystem, config: &ShadowConfig) {
        match self.texture_index(light) {
            Some(index) => {
                rs.set_shadow_texture(self.texture_name(light));
                rs.set_receiver_params(self.receiver_params(index, config).as_ref());
            }
            None => {
                rs.set_shadow_texture(NULL_SHADOW_TEXTURE);
                rs.set_receiver_params(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::mesh::Mesh;
    use crate::render_system::HeadlessRenderSystem;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn scene() -> SceneGraph {
        let mut scene = SceneGraph::new();
        let mesh = Arc::new(Mesh::new_box("cube", Vec3::ONE, "stone"));
        scene.add_object(Entity::new("cube", mesh));
        scene.add_light(Light::directional("sun", Vec3::new(0.0, -1.0, -0.2)));
        scene.add_light(Light::point("lamp", Vec3::new(0.0, 5.0, 0.0), 50.0));
        scene
    }

    fn camera() -> Camera {
        let mut camera = Camera::perspective("cam", 1.0, 1.0, 0.5, 500.0);
        camera.position = Vec3::new(0.0, 3.0, 20.0);
        camera.look_at(Vec3::ZERO);
        camera
    }

    #[test]
    fn test_directional_camera_fits_scene() {
        let scene = scene();
        let sun = &scene.lights()[0];
        let shadow = DefaultShadowCameraSetup.shadow_camera(&scene, &camera(), sun, &ShadowConfig::texture_modulative());
        assert!(matches!(shadow.projection, crate::camera::Projection::Orthographic { .. }));
        let visible = scene.visible_bounds();
        assert!(shadow.is_visible_aabb(&visible));
        assert_relative_eq!(shadow.forward().dot(sun.derived_direction()), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_spot_fov_clamped() {
        let scene = scene();
        let narrow = Light::spot("spot", Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, 30.0, 0.5);
        let wide = Light::spot("wide", Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, 30.0, 3.1);
        let config = ShadowConfig::texture_modulative();

        let shadow = DefaultShadowCameraSetup.shadow_camera(&scene, &camera(), &narrow, &config);
        let crate::camera::Projection::Perspective { fov, far, .. } = shadow.projection else {
            panic!("spot shadow camera must be perspective");
        };
        assert_relative_eq!(fov, 0.6, epsilon = 1e-6);
        assert_eq!(far, 30.0);

        let shadow = DefaultShadowCameraSetup.shadow_camera(&scene, &camera(), &wide, &config);
        let crate::camera::Projection::Perspective { fov, .. } = shadow.projection else {
            panic!("spot shadow camera must be perspective");
        };
        assert_relative_eq!(fov, 175.0_f32.to_radians(), epsilon = 1e-6);
    }

    #[test]
    fn test_extra_lights_use_null_texture() {
        let scene = scene();
        let config = ShadowConfig::texture_modulative();
        let mut renderer = TextureShadowRenderer::new(&config.texture);
        let mut rs = HeadlessRenderSystem::default();
        let mut frame = FrameContext::default();

        let stats = renderer.render_shadow_textures(&scene, &camera(), &mut rs, &config, &mut frame);
        assert_eq!(stats.lights, 1);
        assert_eq!(stats.caster_draws, 1);

        let (sun, lamp) = (&scene.lights()[0], &scene.lights()[1]);
        assert_eq!(renderer.texture_name(sun), "void_shadow/ShadowTexture0");
        assert_eq!(renderer.texture_name(lamp), NULL_SHADOW_TEXTURE);

        renderer.bind_receiver(lamp, &mut rs, &config);
        assert!(rs.commands().contains(&crate::render_system::RenderCommand::ShadowTexture(
            NULL_SHADOW_TEXTURE.to_string()
        )));
    }

    #[test]
    fn test_casters_drawn_into_texture_with_shadow_colour() {
        let scene = scene();
        let config = ShadowConfig::texture_modulative();
        let mut renderer = TextureShadowRenderer::new(&config.texture);
        let mut rs = HeadlessRenderSystem::default();
        let mut frame = FrameContext::default();
        renderer.render_shadow_textures(&scene, &camera(), &mut rs, &config, &mut frame);

        let draw = &rs.draws()[0];
        assert_eq!(draw.render_target, RenderTarget::ShadowTexture(0));
        assert_eq!(draw.ambient, config.shadow_colour);
        assert_eq!(draw.pass.as_deref(), Some("stone/shadow_caster"));
        assert!(rs
            .commands()
            .ends_with(&[crate::render_system::RenderCommand::Ambient(scene.ambient_light())]));
    }

    #[test]
    fn test_receiver_fade_distances() {
        let scene = scene();
        let mut config = ShadowConfig::texture_modulative();
        config.shadow_far_distance = 100.0;
        let mut renderer = TextureShadowRenderer::new(&config.texture);
        let mut rs = HeadlessRenderSystem::default();
        let mut frame = FrameContext::default();
        renderer.render_shadow_textures(&scene, &camera(), &mut rs, &config, &mut frame);

        let params = renderer.receiver_params(0, &config).unwrap();
        assert_relative_eq!(params.fade_start, 70.0, epsilon = 1e-4);
        assert_relative_eq!(params.fade_end, 90.0, epsilon = 1e-4);
        assert!(renderer.receiver_params(1, &config).is_none());
    }
}
