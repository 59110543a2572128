//! Stencil shadow volume rendering
//!
//! For one light, every caster's shadow volume is rasterised into the
//! stencil buffer with colour and depth writes off. Pixels inside a volume
//! end up with a non-zero count; the lit pass that follows tests against 0.
//!
//! The counting strategy is chosen once per light. When any caster may put
//! its volume across the near plane the depth-fail (zfail) method is used,
//! which needs closed volumes (light and dark caps); otherwise the cheaper
//! depth-pass (zpass) method is enough.

use crate::buffer::{IndexBuffer, IndexType};
use crate::camera::Camera;
use crate::caster::{ShadowCaster, ShadowRenderable, ShadowVolumeFlags, ShadowVolumeRequest};
use crate::config::{ShadowConfig, ShadowTechnique};
use crate::error::Result;
use crate::frame::FrameContext;
use crate::light::Light;
use crate::material::{CullMode, Material, Pass};
use crate::render_system::{
    Capabilities, CompareFunction, FrameBufferType, RenderSystem, ScissorRect, StencilOperation, StencilParams,
};
use crate::scene::{ObjectId, SceneGraph};

/// Outcome of rendering the shadow volumes of one light
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StencilLightStats {
    /// Depth-fail counting was used
    pub zfail: bool,
    /// Casters whose volumes were drawn
    pub casters: usize,
    /// Draw calls submitted for volumes and caps
    pub volume_draws: usize,
    /// Casters skipped after a failure
    pub skipped: usize,
}

/// Device features the volume passes depend on
#[derive(Clone, Copy, Debug)]
struct VolumeStrategy {
    zfail: bool,
    two_sided: bool,
    wrap: bool,
}

impl VolumeStrategy {
    fn increment(&self) -> StencilOperation {
        if self.wrap {
            StencilOperation::IncrementWrap
        } else {
            StencilOperation::Increment
        }
    }

    fn decrement(&self) -> StencilOperation {
        if self.wrap {
            StencilOperation::DecrementWrap
        } else {
            StencilOperation::Decrement
        }
    }

    /// Front faces count into the volume on zpass and out of it on zfail
    fn front_op(&self) -> StencilOperation {
        if self.zfail {
            self.decrement()
        } else {
            self.increment()
        }
    }

    /// Culling and op of the two single-sided draws, incrementing first
    ///
    /// zpass increments on front faces, zfail on back faces.
    fn single_sided_passes(&self) -> [(CullMode, StencilOperation); 2] {
        if self.zfail {
            [(CullMode::Front, self.increment()), (CullMode::Back, self.decrement())]
        } else {
            [(CullMode::Back, self.increment()), (CullMode::Front, self.decrement())]
        }
    }

    /// Stencil state counting faces with `op`
    fn params(&self, op: StencilOperation, two_sided: bool) -> StencilParams {
        let mut params = StencilParams {
            compare: CompareFunction::AlwaysPass,
            two_sided,
            ..Default::default()
        };
        if self.zfail {
            params.depth_fail_op = op;
        } else {
            params.pass_op = op;
        }
        params
    }
}

/// Renders stencil shadow volumes and prepares the stencil test for lit passes
pub struct StencilShadowRenderer {
    index_buffer: IndexBuffer,
    volume_pass: Pass,
    debug_pass: Pass,
}

impl StencilShadowRenderer {
    pub fn new(config: &ShadowConfig) -> Self {
        let pass = |material: Material| material.passes.into_iter().next().unwrap_or_else(|| Pass::new(material.name));
        Self {
            index_buffer: IndexBuffer::new(IndexType::U16, config.index_buffer_size),
            volume_pass: pass(Material::stencil_volume()),
            debug_pass: pass(Material::debug_shadows()),
        }
    }

    /// Shared index buffer every caster writes its volume into
    pub fn index_buffer(&self) -> &IndexBuffer {
        &self.index_buffer
    }

    /// Whether the device can extrude volumes in a vertex program
    pub fn uses_hardware_extrusion(config: &ShadowConfig, caps: Capabilities) -> bool {
        config.hardware_extrusion && caps.contains(Capabilities::VERTEX_PROGRAMS)
    }

    /// Whether volumes are projected to infinity
    ///
    /// Needs hardware extrusion and a camera without a far clip plane.
    pub fn extrudes_to_infinity(config: &ShadowConfig, caps: Capabilities, camera: &Camera) -> bool {
        Self::uses_hardware_extrusion(config, caps)
            && config.extrude_to_infinity
            && caps.contains(Capabilities::INFINITE_FAR_PLANE)
            && camera.is_infinite()
    }

    /// Whether any caster may put its shadow volume across the near plane
    pub fn requires_zfail(scene: &SceneGraph, casters: &[ObjectId], light: &Light, camera: &Camera) -> bool {
        let near_clip = light.near_clip_volume(camera);
        casters
            .iter()
            .filter_map(|&id| scene.object(id))
            .any(|object| near_clip.intersects_aabb(&object.world_bounding_box()))
    }

    /// Volume parts needed for a caster
    pub fn volume_flags(
        caster: &dyn ShadowCaster,
        light: &Light,
        camera: &Camera,
        config: &ShadowConfig,
        zfail: bool,
        infinite: bool,
    ) -> ShadowVolumeFlags {
        let mut flags = ShadowVolumeFlags::NONE;
        flags.set(ShadowVolumeFlags::EXTRUDE_TO_INFINITY, infinite);

        let directional = light.is_directional();
        let extrusion_distance = if directional {
            config.directional_extrusion_distance
        } else {
            caster.point_extrusion_distance(light)
        };
        let dark_cap_visible = || camera.is_visible_aabb(&caster.dark_cap_bounds(light, extrusion_distance));

        if zfail {
            if camera.is_visible_aabb(&caster.light_cap_bounds()) {
                flags.insert(ShadowVolumeFlags::INCLUDE_LIGHT_CAP);
            }
            if !(infinite && directional) && dark_cap_visible() {
                flags.insert(ShadowVolumeFlags::INCLUDE_DARK_CAP);
            }
        } else {
            // Finite volumes need closing; infinite point volumes only when modulative
            let needs_dark_cap =
                !infinite || (!directional && config.technique == ShadowTechnique::StencilModulative);
            if needs_dark_cap && dark_cap_visible() {
                flags.insert(ShadowVolumeFlags::INCLUDE_DARK_CAP);
            }
        }
        flags
    }

    /// Stencil test applied to geometry lit after the volumes
    pub fn lit_stencil_params(technique: ShadowTechnique) -> StencilParams {
        StencilParams {
            compare: if technique.is_modulative() {
                CompareFunction::NotEqual
            } else {
                CompareFunction::Equal
            },
            reference: 0,
            ..Default::default()
        }
    }

    /// Draw every caster's shadow volume for `light` into the stencil buffer
    ///
    /// On return the stencil test is left enabled with the lit-pass state
    /// of [`Self::lit_stencil_params`]. Casters that fail are marked in
    /// `frame` and skipped.
    #[allow(clippy::too_many_arguments)]
    pub fn render_shadow_volumes(
        &mut self,
        scene: &mut SceneGraph,
        casters: &[ObjectId],
        light: &Light,
        camera: &Camera,
        rs: &mut dyn RenderSystem,
        config: &ShadowConfig,
        frame: &mut FrameContext,
    ) -> StencilLightStats {
        let caps = rs.capabilities();
        let hardware = Self::uses_hardware_extrusion(config, caps);
        let infinite = Self::extrudes_to_infinity(config, caps, camera);
        let strategy = VolumeStrategy {
            zfail: Self::requires_zfail(scene, casters, light, camera),
            two_sided: caps.contains(Capabilities::TWO_SIDED_STENCIL | Capabilities::STENCIL_WRAP),
            wrap: caps.contains(Capabilities::STENCIL_WRAP),
        };
        log::debug!(
            "Light '{}': {} casters, {}, {}",
            light.name,
            casters.len(),
            if strategy.zfail { "zfail" } else { "zpass" },
            if strategy.two_sided { "two-sided stencil" } else { "two-pass stencil" }
        );

        let mut stats = StencilLightStats {
            zfail: strategy.zfail,
            ..Default::default()
        };

        if config.use_scissor && caps.contains(Capabilities::SCISSOR_TEST) && !light.is_directional() {
            let rect = camera.project_sphere(&light.bounding_sphere()).map(ScissorRect::from_ndc);
            rs.set_scissor(rect);
        }
        // Cleared within the scissor
        rs.clear(FrameBufferType::STENCIL);

        rs.set_stencil_check_enabled(true);
        rs.bind_pass(&self.volume_pass);

        for &id in casters {
            if frame.has_failed(id) {
                stats.skipped += 1;
                continue;
            }
            let Some(object) = scene.object_mut(id) else {
                continue;
            };

            let flags = Self::volume_flags(&*object, light, camera, config, strategy.zfail, infinite);
            let request = ShadowVolumeRequest {
                light,
                index_buffer: &self.index_buffer,
                flags,
                directional_extrusion_distance: config.directional_extrusion_distance,
                hardware_extrusion: hardware,
                frame: &*frame,
            };

            let result = object.shadow_renderables(&request).and_then(|renderables| {
                let mut draws = 0;
                for renderable in renderables.iter().filter(|r| !r.is_empty()) {
                    draws += self.render_volume(renderable, rs, &strategy)?;
                    if config.debug_shadows {
                        self.render_debug(renderable, rs)?;
                        rs.bind_pass(&self.volume_pass);
                    }
                }
                Ok(draws)
            });

            match result {
                Ok(draws) => {
                    stats.casters += 1;
                    stats.volume_draws += draws;
                }
                Err(e) => {
                    log::warn!(
                        "Shadow volume for '{}' (material '{}') failed: {}. Skipping.",
                        object.name(),
                        object.material_name(),
                        e
                    );
                    frame.mark_failed(id);
                    stats.skipped += 1;
                    // Debug or cap state may be left over
                    rs.bind_pass(&self.volume_pass);
                }
            }
        }

        rs.set_colour_write_enabled(true);
        rs.set_depth_params(true, true, CompareFunction::LessEqual);
        rs.set_culling_mode(CullMode::Back);
        rs.set_stencil_params(&Self::lit_stencil_params(config.technique));
        stats
    }

    /// Disable the stencil test and scissor after a light's lit pass
    pub fn restore_state(rs: &mut dyn RenderSystem) {
        rs.set_stencil_check_enabled(false);
        rs.set_stencil_params(&StencilParams::default());
        rs.set_scissor(None);
        rs.set_culling_mode(CullMode::Back);
        rs.set_colour_write_enabled(true);
        rs.set_depth_params(true, true, CompareFunction::LessEqual);
    }

    /// Rasterise one volume and its separate light cap, returning the draw count
    fn render_volume(&self, renderable: &ShadowRenderable, rs: &mut dyn RenderSystem, strategy: &VolumeStrategy) -> Result<usize> {
        rs.set_world_matrix(renderable.world_transform());
        rs.set_extrusion_params(renderable.extrusion_params());
        let op = renderable.render_operation(&self.index_buffer);
        let mut draws = 0;

        if strategy.two_sided {
            // Back faces get the inverse of the front face op
            rs.set_stencil_params(&strategy.params(strategy.front_op(), true));
            rs.set_culling_mode(CullMode::None);
            rs.render(&op)?;
            draws += 1;

            if let Some(cap) = renderable.light_cap() {
                draws += self.render_light_cap(cap, rs, CullMode::Front)?;
                draws += self.render_light_cap(cap, rs, CullMode::Back)?;
                rs.set_culling_mode(CullMode::None);
            }
        } else {
            // Increment before decrement so saturating ops never clamp at 0
            for (culling, stencil_op) in strategy.single_sided_passes() {
                rs.set_stencil_params(&strategy.params(stencil_op, false));
                rs.set_culling_mode(culling);
                rs.render(&op)?;
                draws += 1;
                if let Some(cap) = renderable.light_cap() {
                    draws += self.render_light_cap(cap, rs, culling)?;
                }
            }
        }
        Ok(draws)
    }

    /// Light cap faces seen from behind test depth normally; faces seen
    /// from the front must never count
    fn render_light_cap(&self, cap: &ShadowRenderable, rs: &mut dyn RenderSystem, culling: CullMode) -> Result<usize> {
        let depth_func = match culling {
            CullMode::Back => CompareFunction::AlwaysFail,
            _ => self.volume_pass.depth_func,
        };
        rs.set_culling_mode(culling);
        rs.set_depth_params(true, false, depth_func);
        let result = rs.render(&cap.render_operation(&self.index_buffer));
        rs.set_depth_params(true, false, self.volume_pass.depth_func);
        result.map(|_| 1)
    }

    /// Draw a volume visibly on top of the scene
    fn render_debug(&self, renderable: &ShadowRenderable, rs: &mut dyn RenderSystem) -> Result<()> {
        rs.set_stencil_check_enabled(false);
        rs.bind_pass(&self.debug_pass);
        rs.render(&renderable.render_operation(&self.index_buffer))?;
        if let Some(cap) = renderable.light_cap() {
            rs.render(&cap.render_operation(&self.index_buffer))?;
        }
        rs.set_stencil_check_enabled(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::mesh::Mesh;
    use crate::render_system::{HeadlessRenderSystem, RenderCommand};
    use std::sync::Arc;
    use void_math::Vec3;

    fn scene_with_cube() -> (SceneGraph, ObjectId) {
        let mut mesh = Mesh::new_box("cube", Vec3::ONE, "stone");
        mesh.prepare_for_shadow_volume().unwrap();
        let mut scene = SceneGraph::new();
        let id = scene.add_object(Entity::new("cube", Arc::new(mesh)));
        (scene, id)
    }

    fn camera_at(position: Vec3) -> Camera {
        let mut camera = Camera::perspective("cam", 60.0_f32.to_radians(), 1.0, 0.5, 0.0);
        camera.position = position;
        camera.look_at(Vec3::ZERO);
        camera
    }

    fn software_config() -> ShadowConfig {
        ShadowConfig {
            hardware_extrusion: false,
            ..ShadowConfig::stencil_additive()
        }
    }

    /// Renders the cube's volume either with the camera well outside it
    /// (zpass) or from inside the shadow (zfail)
    fn render_volumes(caps: Capabilities, zfail: bool) -> HeadlessRenderSystem {
        let (mut scene, id) = scene_with_cube();
        let config = software_config();
        let (light, camera) = if zfail {
            let mut camera = camera_at(Vec3::new(0.0, -4.0, 0.5));
            camera.look_at(Vec3::new(0.0, -4.0, -10.0));
            (Light::point("lamp", Vec3::new(0.0, 5.0, 0.0), 100.0), camera)
        } else {
            (Light::directional("sun", Vec3::NEG_Y), camera_at(Vec3::new(0.0, 2.0, 20.0)))
        };
        let mut renderer = StencilShadowRenderer::new(&config);
        let mut rs = HeadlessRenderSystem::new(caps);
        let mut frame = FrameContext::default();
        let stats = renderer.render_shadow_volumes(&mut scene, &[id], &light, &camera, &mut rs, &config, &mut frame);
        assert_eq!(stats.zfail, zfail);
        rs
    }

    fn apply(op: StencilOperation, value: u8, reference: u32) -> u8 {
        match op {
            StencilOperation::Keep => value,
            StencilOperation::Zero => 0,
            StencilOperation::Replace => reference as u8,
            StencilOperation::Increment => value.saturating_add(1),
            StencilOperation::Decrement => value.saturating_sub(1),
            StencilOperation::IncrementWrap => value.wrapping_add(1),
            StencilOperation::DecrementWrap => value.wrapping_sub(1),
            StencilOperation::Invert => !value,
        }
    }

    /// Replays the recorded volume draws over one 8-bit stencil pixel that
    /// is covered by one front face and one back face of the volume
    fn stencil_at(rs: &HeadlessRenderSystem, front_passes: bool, back_passes: bool) -> u8 {
        rs.shadow_volume_draws().fold(0, |value, draw| {
            let faces = match draw.culling {
                CullMode::Back => vec![(true, front_passes)],
                CullMode::Front => vec![(false, back_passes)],
                CullMode::None => vec![(true, front_passes), (false, back_passes)],
            };
            faces.into_iter().fold(value, |value, (front, passes)| {
                let passes = passes && draw.depth_func != CompareFunction::AlwaysFail;
                let op = if passes { draw.stencil.pass_op } else { draw.stencil.depth_fail_op };
                let op = if draw.stencil.two_sided && !front { op.inverse() } else { op };
                apply(op, value, draw.stencil.reference)
            })
        })
    }

    #[test]
    fn test_stencil_counts_for_every_strategy() {
        let strategies = [
            Capabilities::ALL,
            Capabilities::ALL.difference(Capabilities::TWO_SIDED_STENCIL),
            Capabilities::ALL.difference(Capabilities::STENCIL_WRAP),
            Capabilities::ALL.difference(Capabilities::TWO_SIDED_STENCIL | Capabilities::STENCIL_WRAP),
        ];
        for zfail in [false, true] {
            for caps in strategies {
                let rs = render_volumes(caps, zfail);
                // Surface between the faces
                assert_eq!(stencil_at(&rs, true, false), 1, "shadowed, zfail={} {:?}", zfail, caps);
                // Surface behind the whole volume
                assert_eq!(stencil_at(&rs, true, true), 0, "lit behind, zfail={} {:?}", zfail, caps);
                // Surface in front of the whole volume
                assert_eq!(stencil_at(&rs, false, false), 0, "lit in front, zfail={} {:?}", zfail, caps);
            }
        }
    }

    #[test]
    fn test_saturating_zfail_increments_back_faces_first() {
        let caps = Capabilities::ALL.difference(Capabilities::TWO_SIDED_STENCIL | Capabilities::STENCIL_WRAP);
        let rs = render_volumes(caps, true);

        let draws: Vec<_> = rs.shadow_volume_draws().collect();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].culling, CullMode::Front);
        assert_eq!(draws[0].stencil.depth_fail_op, StencilOperation::Increment);
        assert_eq!(draws[1].culling, CullMode::Back);
        assert_eq!(draws[1].stencil.depth_fail_op, StencilOperation::Decrement);
        assert!(draws.iter().all(|d| d.stencil.pass_op == StencilOperation::Keep));
    }

    #[test]
    fn test_stencil_cleared_inside_scissor() {
        let (mut scene, id) = scene_with_cube();
        let camera = camera_at(Vec3::new(0.0, 2.0, 40.0));
        let config = software_config();
        let mut renderer = StencilShadowRenderer::new(&config);
        let mut rs = HeadlessRenderSystem::default();
        let mut frame = FrameContext::default();

        let lamp = Light::point("lamp", Vec3::new(0.0, 4.0, 0.0), 6.0);
        renderer.render_shadow_volumes(&mut scene, &[id], &lamp, &camera, &mut rs, &config, &mut frame);

        let commands = rs.commands();
        let scissor = commands
            .iter()
            .position(|c| matches!(c, RenderCommand::Scissor(Some(_))))
            .unwrap();
        let clear = commands
            .iter()
            .position(|c| *c == RenderCommand::Clear(FrameBufferType::STENCIL))
            .unwrap();
        let first_draw = commands.iter().position(|c| matches!(c, RenderCommand::Draw(_))).unwrap();
        assert!(scissor < clear);
        assert!(clear < first_draw);
    }

    #[test]
    fn test_two_sided_single_draw() {
        let (mut scene, id) = scene_with_cube();
        let sun = Light::directional("sun", Vec3::NEG_Y);
        let camera = camera_at(Vec3::new(0.0, 2.0, 20.0));
        let mut renderer = StencilShadowRenderer::new(&software_config());
        let mut rs = HeadlessRenderSystem::default();
        let mut frame = FrameContext::default();

        let stats = renderer.render_shadow_volumes(&mut scene, &[id], &sun, &camera, &mut rs, &software_config(), &mut frame);
        assert!(!stats.zfail);
        assert_eq!(stats.casters, 1);
        assert_eq!(stats.volume_draws, 1);

        let draw = rs.shadow_volume_draws().next().unwrap();
        assert!(draw.stencil.two_sided);
        assert_eq!(draw.culling, CullMode::None);
        assert_eq!(draw.stencil.pass_op, StencilOperation::IncrementWrap);
        assert!(!draw.colour_write);
        assert!(!draw.depth_write);
        assert!(draw.stencil_check);

        // Lit pass state left behind
        assert_eq!(rs.stencil_params().compare, CompareFunction::Equal);
        assert!(rs.colour_write_enabled());
    }

    #[test]
    fn test_two_pass_without_two_sided_stencil() {
        let (mut scene, id) = scene_with_cube();
        let sun = Light::directional("sun", Vec3::NEG_Y);
        let camera = camera_at(Vec3::new(0.0, 2.0, 20.0));
        let caps = Capabilities::ALL.difference(Capabilities::TWO_SIDED_STENCIL | Capabilities::STENCIL_WRAP);
        let mut rs = HeadlessRenderSystem::new(caps);
        let mut renderer = StencilShadowRenderer::new(&software_config());
        let mut frame = FrameContext::default();

        let stats = renderer.render_shadow_volumes(&mut scene, &[id], &sun, &camera, &mut rs, &software_config(), &mut frame);
        assert_eq!(stats.volume_draws, 2);

        let draws: Vec<_> = rs.shadow_volume_draws().collect();
        // Front faces count in before back faces count out
        assert_eq!(draws[0].culling, CullMode::Back);
        assert_eq!(draws[0].stencil.pass_op, StencilOperation::Increment);
        assert_eq!(draws[1].culling, CullMode::Front);
        assert_eq!(draws[1].stencil.pass_op, StencilOperation::Decrement);
        assert!(draws.iter().all(|d| !d.stencil.two_sided));
        assert!(draws.iter().all(|d| d.stencil.depth_fail_op == StencilOperation::Keep));
    }

    #[test]
    fn test_zfail_when_camera_inside_volume() {
        let (mut scene, id) = scene_with_cube();
        let lamp = Light::point("lamp", Vec3::new(0.0, 5.0, 0.0), 100.0);
        // Camera below the cube, inside its shadow
        let mut camera = camera_at(Vec3::new(0.0, -4.0, 0.5));
        camera.look_at(Vec3::new(0.0, -4.0, -10.0));
        let config = software_config();
        assert!(StencilShadowRenderer::requires_zfail(&scene, &[id], &lamp, &camera));

        let mut renderer = StencilShadowRenderer::new(&config);
        let mut rs = HeadlessRenderSystem::default();
        let mut frame = FrameContext::default();
        let stats = renderer.render_shadow_volumes(&mut scene, &[id], &lamp, &camera, &mut rs, &config, &mut frame);
        assert!(stats.zfail);
        let draw = rs.shadow_volume_draws().next().unwrap();
        assert_eq!(draw.stencil.depth_fail_op, StencilOperation::DecrementWrap);
        assert_eq!(draw.stencil.pass_op, StencilOperation::Keep);
    }

    #[test]
    fn test_hardware_light_cap_depth_functions() {
        let (mut scene, id) = scene_with_cube();
        let lamp = Light::point("lamp", Vec3::new(0.0, 5.0, 0.0), 100.0);
        let mut camera = camera_at(Vec3::new(0.0, -4.0, 0.5));
        camera.look_at(Vec3::new(0.0, 0.0, 0.0));
        let config = ShadowConfig::stencil_additive();

        let mut renderer = StencilShadowRenderer::new(&config);
        let mut rs = HeadlessRenderSystem::default();
        let mut frame = FrameContext::default();
        let stats = renderer.render_shadow_volumes(&mut scene, &[id], &lamp, &camera, &mut rs, &config, &mut frame);
        assert!(stats.zfail);
        // Volume, then the cap seen from behind and from the front
        assert_eq!(stats.volume_draws, 3);

        let draws: Vec<_> = rs.shadow_volume_draws().collect();
        assert!(draws[0].extrusion.is_some());
        assert_eq!(draws[1].culling, CullMode::Front);
        assert_eq!(draws[1].depth_func, CompareFunction::Less);
        assert_eq!(draws[2].culling, CullMode::Back);
        assert_eq!(draws[2].depth_func, CompareFunction::AlwaysFail);
    }

    #[test]
    fn test_failed_caster_skipped_for_frame() {
        let (mut scene, id) = scene_with_cube();
        let sun = Light::directional("sun", Vec3::NEG_Y);
        let camera = camera_at(Vec3::new(0.0, 2.0, 20.0));
        let config = software_config();
        let mut renderer = StencilShadowRenderer::new(&config);
        let mut rs = HeadlessRenderSystem::default();
        rs.fail_material("stone");
        let mut frame = FrameContext::default();

        let stats = renderer.render_shadow_volumes(&mut scene, &[id], &sun, &camera, &mut rs, &config, &mut frame);
        assert_eq!(stats.skipped, 1);
        assert!(frame.has_failed(id));

        let again = renderer.render_shadow_volumes(&mut scene, &[id], &sun, &camera, &mut rs, &config, &mut frame);
        assert_eq!(again.skipped, 1);
        assert_eq!(again.casters, 0);
    }

    #[test]
    fn test_scissor_for_point_lights_only() {
        let (mut scene, id) = scene_with_cube();
        let camera = camera_at(Vec3::new(0.0, 2.0, 40.0));
        let config = software_config();
        let mut renderer = StencilShadowRenderer::new(&config);
        let mut rs = HeadlessRenderSystem::default();
        let mut frame = FrameContext::default();

        let lamp = Light::point("lamp", Vec3::new(0.0, 4.0, 0.0), 6.0);
        renderer.render_shadow_volumes(&mut scene, &[id], &lamp, &camera, &mut rs, &config, &mut frame);
        assert!(rs.scissor().is_some());

        StencilShadowRenderer::restore_state(&mut rs);
        assert!(rs.scissor().is_none());
        assert!(!rs.stencil_check_enabled());

        let sun = Light::directional("sun", Vec3::NEG_Y);
        renderer.render_shadow_volumes(&mut scene, &[id], &sun, &camera, &mut rs, &config, &mut frame);
        assert!(rs.scissor().is_none());
    }

    #[test]
    fn test_lit_stencil_params() {
        let additive = StencilShadowRenderer::lit_stencil_params(ShadowTechnique::StencilAdditive);
        assert_eq!(additive.compare, CompareFunction::Equal);
        let modulative = StencilShadowRenderer::lit_stencil_params(ShadowTechnique::StencilModulative);
        assert_eq!(modulative.compare, CompareFunction::NotEqual);
        assert_eq!(modulative.reference, 0);
    }
}
