//! Frame orchestration for every shadow technique
//!
//! The controller splits a frame into illumination stages and decides, per
//! technique, which passes of which objects are drawn in each stage:
//!
//! | Technique           | Stages                                                        |
//! |---------------------|---------------------------------------------------------------|
//! | None                | None (fully lit)                                              |
//! | Stencil additive    | Ambient, PerLight (volumes + lit pass per light), Decal, None |
//! | Stencil modulative  | None (solids), RenderModulativePass per light, None           |
//! | Texture additive    | RenderToTexture, Ambient, RenderModulativePass, Decal, None   |
//! | Texture modulative  | RenderToTexture, None (solids), RenderModulativePass, None    |
//!
//! The trailing `None` stage draws transparent objects with their full
//! light list. Listeners registered at construction see every stage
//! transition and may skip render queue groups.

use void_math::Mat4;

use crate::camera::Camera;
use crate::caster::ShadowCaster;
use crate::config::{ShadowConfig, ShadowTechnique};
use crate::frame::FrameContext;
use crate::light::Light;
use crate::material::{ColourValue, Material, Pass, PassCategory, MODULATIVE_PASS_MATERIAL};
use crate::query::ShadowCasterQuery;
use crate::queue::RenderQueue;
use crate::render_system::{Capabilities, FrameBufferType, RenderOperation, RenderSystem, RenderTarget};
use crate::scene::{ObjectId, SceneGraph};
use crate::stencil::StencilShadowRenderer;
use crate::texture::TextureShadowRenderer;

/// Stage of the frame currently being rendered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IlluminationStage {
    /// Regular rendering, no shadow-specific split
    #[default]
    None,
    /// Ambient and emissive passes
    Ambient,
    /// Per-light diffuse and specular passes
    PerLight,
    /// Texture passes modulated over the lit result
    Decal,
    /// Casters drawn into shadow textures
    RenderToTexture,
    /// Shadow darkening or shadow receiver passes
    RenderModulativePass,
}

/// Observer of the illumination pipeline
///
/// All methods have empty defaults.
pub trait IlluminationListener {
    fn stage_started(&mut self, _stage: IlluminationStage) {}

    fn stage_ended(&mut self, _stage: IlluminationStage) {}

    /// Called before a queue group is drawn in a stage; return `true` to skip it
    fn queue_group_started(&mut self, _group: u8, _stage: IlluminationStage) -> bool {
        false
    }

    fn queue_group_ended(&mut self, _group: u8, _stage: IlluminationStage) {}
}

/// Summary of one rendered frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Technique actually used after capability checks
    pub technique: ShadowTechnique,
    /// Lights that had shadows rendered
    pub shadow_lights: usize,
    /// Lights whose volumes used depth-fail counting
    pub zfail_lights: usize,
    pub casters: usize,
    pub volume_draws: usize,
    pub shadow_textures: usize,
    pub object_draws: usize,
    /// Objects or casters skipped after a failure
    pub skipped: usize,
}

/// How lights are bound for an object draw
#[derive(Clone, Copy)]
enum Lighting<'a> {
    Off,
    Only(&'a Light),
    Affecting,
}

/// Which objects of a queue group a stage draws
#[derive(Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Solids,
    Transparents,
}

/// Drives the shadow renderers through a frame
pub struct ShadowPipelineController {
    config: ShadowConfig,
    listeners: Vec<Box<dyn IlluminationListener>>,
    stencil: StencilShadowRenderer,
    texture: TextureShadowRenderer,
    modulative_pass: Pass,
    stage: IlluminationStage,
    downgrade_reported: bool,
    last_stats: FrameStats,
}

impl ShadowPipelineController {
    pub fn new(mut config: ShadowConfig, listeners: Vec<Box<dyn IlluminationListener>>) -> Self {
        config.validate();
        Self {
            stencil: StencilShadowRenderer::new(&config),
            texture: TextureShadowRenderer::new(&config.texture),
            modulative_pass: modulative_pass(config.shadow_colour),
            config,
            listeners,
            stage: IlluminationStage::None,
            downgrade_reported: false,
            last_stats: FrameStats::default(),
        }
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Apply a new configuration, rebuilding buffers and textures
    pub fn set_config(&mut self, mut config: ShadowConfig) {
        config.validate();
        if config.index_buffer_size != self.config.index_buffer_size {
            self.stencil = StencilShadowRenderer::new(&config);
        }
        if config.texture != self.config.texture {
            self.texture = TextureShadowRenderer::new(&config.texture);
        }
        self.modulative_pass = modulative_pass(config.shadow_colour);
        self.downgrade_reported = false;
        log::info!("Shadow technique set to {:?}", config.technique);
        self.config = config;
    }

    pub fn stage(&self) -> IlluminationStage {
        self.stage
    }

    pub fn last_stats(&self) -> &FrameStats {
        &self.last_stats
    }

    pub fn stencil_renderer(&self) -> &StencilShadowRenderer {
        &self.stencil
    }

    pub fn texture_renderer(&self) -> &TextureShadowRenderer {
        &self.texture
    }

    pub fn texture_renderer_mut(&mut self) -> &mut TextureShadowRenderer {
        &mut self.texture
    }

    /// Technique usable with `caps`; stencil techniques need a stencil buffer
    pub fn effective_technique(&self, caps: Capabilities) -> ShadowTechnique {
        let technique = self.config.technique;
        if technique.is_stencil() && !caps.contains(Capabilities::STENCIL_BUFFER) {
            ShadowTechnique::None
        } else {
            technique
        }
    }

    /// Render one frame of `scene` seen from `camera`
    pub fn render_frame(
        &mut self,
        scene: &mut SceneGraph,
        camera: &Camera,
        rs: &mut dyn RenderSystem,
        frame: &mut FrameContext,
    ) -> FrameStats {
        let technique = self.effective_technique(rs.capabilities());
        if technique != self.config.technique && !self.downgrade_reported {
            log::warn!(
                "Shadow technique {:?} requires a stencil buffer, which the device lacks. Shadows disabled.",
                self.config.technique
            );
            self.downgrade_reported = true;
        }

        let mut stats = FrameStats {
            technique,
            ..Default::default()
        };

        update_animations(scene, frame);

        rs.begin_frame(frame);
        rs.set_render_target(RenderTarget::Viewport);
        rs.set_view_matrix(&camera.view_matrix());
        rs.set_projection_matrix(&camera.projection_matrix());
        rs.set_ambient_light(scene.ambient_light());
        rs.clear(FrameBufferType::ALL);

        let queue = RenderQueue::build(scene, camera);
        log::trace!(
            "Frame {}: {} visible objects, technique {:?}",
            frame.frame_number(),
            queue.object_count(),
            technique
        );

        match technique {
            ShadowTechnique::None => {
                self.render_fully_lit(&queue, scene, rs, frame, &mut stats);
            }
            ShadowTechnique::StencilAdditive => {
                self.render_stencil_additive(&queue, scene, camera, rs, frame, &mut stats);
            }
            ShadowTechnique::StencilModulative => {
                self.render_stencil_modulative(&queue, scene, camera, rs, frame, &mut stats);
            }
            ShadowTechnique::TextureAdditive | ShadowTechnique::TextureModulative => {
                self.render_texture_shadows(technique, &queue, scene, camera, rs, frame, &mut stats);
            }
        }

        rs.end_frame();
        log::debug!(
            "Frame {}: {:?}, {} shadow lights, {} casters, {} object draws, {} skipped",
            frame.frame_number(),
            stats.technique,
            stats.shadow_lights,
            stats.casters,
            stats.object_draws,
            stats.skipped
        );
        self.last_stats = stats;
        stats
    }

    /// Everything fully lit
    fn render_fully_lit(
        &mut self,
        queue: &RenderQueue,
        scene: &SceneGraph,
        rs: &mut dyn RenderSystem,
        frame: &mut FrameContext,
        stats: &mut FrameStats,
    ) {
        self.begin_stage(IlluminationStage::None);
        for bucket in [Bucket::Solids, Bucket::Transparents] {
            stats.object_draws += render_groups(&mut self.listeners, queue, self.stage, bucket, |id| {
                draw_object(scene, id, rs, frame, Lighting::Affecting, all_passes)
            });
        }
        self.end_stage();
    }

    fn render_stencil_additive(
        &mut self,
        queue: &RenderQueue,
        scene: &mut SceneGraph,
        camera: &Camera,
        rs: &mut dyn RenderSystem,
        frame: &mut FrameContext,
        stats: &mut FrameStats,
    ) {
        self.render_category(IlluminationStage::Ambient, PassCategory::Ambient, queue, scene, rs, frame, stats);

        self.begin_stage(IlluminationStage::PerLight);
        for light in lights_in_view(scene, camera) {
            if light.cast_shadows {
                self.render_light_volumes(&light, scene, camera, rs, frame, stats);
            }

            let scene_ref: &SceneGraph = scene;
            stats.object_draws += render_groups(&mut self.listeners, queue, self.stage, Bucket::Solids, |id| {
                if !lit_by(scene_ref, id, &light) {
                    return 0;
                }
                draw_object(scene_ref, id, rs, frame, Lighting::Only(&light), |material| {
                    category_passes(material, PassCategory::PerLight)
                })
            });

            if light.cast_shadows {
                StencilShadowRenderer::restore_state(rs);
            }
        }
        self.end_stage();

        self.render_category(IlluminationStage::Decal, PassCategory::Decal, queue, scene, rs, frame, stats);
        self.render_transparents(queue, scene, rs, frame, stats);
    }

    fn render_stencil_modulative(
        &mut self,
        queue: &RenderQueue,
        scene: &mut SceneGraph,
        camera: &Camera,
        rs: &mut dyn RenderSystem,
        frame: &mut FrameContext,
        stats: &mut FrameStats,
    ) {
        self.render_solids_lit(queue, scene, rs, frame, stats);

        self.begin_stage(IlluminationStage::RenderModulativePass);
        for light in lights_in_view(scene, camera).into_iter().filter(|light| light.cast_shadows) {
            self.render_light_volumes(&light, scene, camera, rs, frame, stats);

            rs.set_world_matrix(&Mat4::IDENTITY);
            rs.bind_pass(&self.modulative_pass);
            match rs.render(&RenderOperation::full_screen_quad(MODULATIVE_PASS_MATERIAL)) {
                Ok(()) => stats.object_draws += 1,
                Err(e) => log::warn!(
                    "Modulative shadow pass '{}' failed: {}. Skipping.",
                    MODULATIVE_PASS_MATERIAL,
                    e
                ),
            }
            StencilShadowRenderer::restore_state(rs);
        }
        self.end_stage();

        self.render_transparents(queue, scene, rs, frame, stats);
    }

    #[allow(clippy::too_many_arguments)]
    fn render_texture_shadows(
        &mut self,
        technique: ShadowTechnique,
        queue: &RenderQueue,
        scene: &SceneGraph,
        camera: &Camera,
        rs: &mut dyn RenderSystem,
        frame: &mut FrameContext,
        stats: &mut FrameStats,
    ) {
        self.begin_stage(IlluminationStage::RenderToTexture);
        let texture_stats = self.texture.render_shadow_textures(scene, camera, rs, &self.config, frame);
        stats.shadow_textures += texture_stats.lights;
        stats.shadow_lights += texture_stats.lights;
        stats.object_draws += texture_stats.caster_draws;
        stats.skipped += texture_stats.skipped;
        self.end_stage();

        let additive = technique.is_additive();
        if additive {
            self.render_category(IlluminationStage::Ambient, PassCategory::Ambient, queue, scene, rs, frame, stats);
        } else {
            self.render_solids_lit(queue, scene, rs, frame, stats);
        }

        self.begin_stage(IlluminationStage::RenderModulativePass);
        if !additive {
            rs.set_ambient_light(ColourValue::WHITE);
        }
        let lights: Vec<Light> = if additive {
            lights_in_view(scene, camera)
        } else {
            TextureShadowRenderer::shadow_lights(scene, camera).into_iter().cloned().collect()
        };
        for light in &lights {
            self.texture.bind_receiver(light, rs, &self.config);
            stats.object_draws += render_groups(&mut self.listeners, queue, self.stage, Bucket::Solids, |id| {
                if additive && !lit_by(scene, id, light) {
                    return 0;
                }
                let lighting = if additive { Lighting::Only(light) } else { Lighting::Off };
                draw_object(scene, id, rs, frame, lighting, |material| receiver_passes(material, technique))
            });
        }
        rs.set_ambient_light(scene.ambient_light());
        self.end_stage();

        if additive {
            self.render_category(IlluminationStage::Decal, PassCategory::Decal, queue, scene, rs, frame, stats);
        }
        self.render_transparents(queue, scene, rs, frame, stats);
    }

    /// Stencil volumes of one light, counted into `stats`
    fn render_light_volumes(
        &mut self,
        light: &Light,
        scene: &mut SceneGraph,
        camera: &Camera,
        rs: &mut dyn RenderSystem,
        frame: &mut FrameContext,
        stats: &mut FrameStats,
    ) {
        let casters = ShadowCasterQuery::find_casters(scene, light, camera, &self.config);
        let light_stats = self
            .stencil
            .render_shadow_volumes(scene, &casters, light, camera, rs, &self.config, frame);
        stats.shadow_lights += 1;
        stats.zfail_lights += usize::from(light_stats.zfail);
        stats.casters += light_stats.casters;
        stats.volume_draws += light_stats.volume_draws;
        stats.skipped += light_stats.skipped;
    }

    /// Solid objects with one category of their illumination passes
    #[allow(clippy::too_many_arguments)]
    fn render_category(
        &mut self,
        stage: IlluminationStage,
        category: PassCategory,
        queue: &RenderQueue,
        scene: &SceneGraph,
        rs: &mut dyn RenderSystem,
        frame: &mut FrameContext,
        stats: &mut FrameStats,
    ) {
        self.begin_stage(stage);
        stats.object_draws += render_groups(&mut self.listeners, queue, stage, Bucket::Solids, |id| {
            draw_object(scene, id, rs, frame, Lighting::Off, |material| category_passes(material, category))
        });
        self.end_stage();
    }

    fn render_solids_lit(
        &mut self,
        queue: &RenderQueue,
        scene: &SceneGraph,
        rs: &mut dyn RenderSystem,
        frame: &mut FrameContext,
        stats: &mut FrameStats,
    ) {
        self.begin_stage(IlluminationStage::None);
        stats.object_draws += render_groups(&mut self.listeners, queue, self.stage, Bucket::Solids, |id| {
            draw_object(scene, id, rs, frame, Lighting::Affecting, all_passes)
        });
        self.end_stage();
    }

    fn render_transparents(
        &mut self,
        queue: &RenderQueue,
        scene: &SceneGraph,
        rs: &mut dyn RenderSystem,
        frame: &mut FrameContext,
        stats: &mut FrameStats,
    ) {
        self.begin_stage(IlluminationStage::None);
        stats.object_draws += render_groups(&mut self.listeners, queue, self.stage, Bucket::Transparents, |id| {
            draw_object(scene, id, rs, frame, Lighting::Affecting, all_passes)
        });
        self.end_stage();
    }

    fn begin_stage(&mut self, stage: IlluminationStage) {
        self.stage = stage;
        for listener in &mut self.listeners {
            listener.stage_started(stage);
        }
    }

    fn end_stage(&mut self) {
        for listener in &mut self.listeners {
            listener.stage_ended(self.stage);
        }
        self.stage = IlluminationStage::None;
    }
}

fn modulative_pass(shadow_colour: ColourValue) -> Pass {
    let material = Material::modulative_pass(shadow_colour);
    material
        .passes
        .into_iter()
        .next()
        .unwrap_or_else(|| Pass::new(MODULATIVE_PASS_MATERIAL))
}

/// Blend animated entities for this frame
fn update_animations(scene: &mut SceneGraph, frame: &mut FrameContext) {
    let ids: Vec<ObjectId> = scene.objects().map(|(id, _)| id).collect();
    for id in ids {
        let Some(entity) = scene.object_mut(id).and_then(|object| object.as_entity_mut()) else {
            continue;
        };
        if let Err(e) = entity.update_animation(frame) {
            log::warn!("Animation of '{}' failed: {}. Skipping.", entity.name(), e);
            frame.mark_failed(id);
        }
    }
}

/// Lights reaching the view, cloned so the scene can be borrowed mutably
fn lights_in_view(scene: &SceneGraph, camera: &Camera) -> Vec<Light> {
    scene
        .lights()
        .iter()
        .filter(|light| light.is_directional() || camera.is_visible_sphere(&light.bounding_sphere()))
        .cloned()
        .collect()
}

fn lit_by(scene: &SceneGraph, id: ObjectId, light: &Light) -> bool {
    scene
        .object(id)
        .is_some_and(|object| light.affects_sphere(&object.world_bounding_sphere()))
}

fn all_passes(material: &Material) -> Vec<Pass> {
    material.passes.clone()
}

fn category_passes(material: &Material, category: PassCategory) -> Vec<Pass> {
    material
        .illumination_passes()
        .into_iter()
        .filter(|pass| pass.category == category)
        .map(|pass| pass.pass)
        .collect()
}

/// Receiver passes, or the plain passes for materials that ignore shadows
fn receiver_passes(material: &Material, technique: ShadowTechnique) -> Vec<Pass> {
    if technique.is_additive() {
        category_passes(material, PassCategory::PerLight)
            .iter()
            .map(|per_light| {
                if material.receive_shadows {
                    material.receiver_pass(technique, Some(per_light))
                } else {
                    per_light.clone()
                }
            })
            .collect()
    } else if material.receive_shadows {
        vec![material.receiver_pass(technique, None)]
    } else {
        Vec::new()
    }
}

/// Walk the queue groups of one bucket, asking listeners before each group
fn render_groups(
    listeners: &mut [Box<dyn IlluminationListener>],
    queue: &RenderQueue,
    stage: IlluminationStage,
    bucket: Bucket,
    mut draw: impl FnMut(ObjectId) -> usize,
) -> usize {
    let mut draws = 0;
    for group in queue.groups() {
        let ids = match bucket {
            Bucket::Solids => &group.solids,
            Bucket::Transparents => &group.transparents,
        };
        if ids.is_empty() {
            continue;
        }

        let mut skip = false;
        for listener in listeners.iter_mut() {
            skip |= listener.queue_group_started(group.id, stage);
        }
        if skip {
            log::trace!("Queue group {} skipped in stage {:?}", group.id, stage);
        } else {
            draws += ids.iter().map(|&id| draw(id)).sum::<usize>();
        }
        for listener in listeners.iter_mut() {
            listener.queue_group_ended(group.id, stage);
        }
    }
    draws
}

/// Draw an object's operations with the selected passes
///
/// Returns the number of draws. A failing draw marks the object failed for
/// the rest of the frame.
fn draw_object(
    scene: &SceneGraph,
    id: ObjectId,
    rs: &mut dyn RenderSystem,
    frame: &mut FrameContext,
    lighting: Lighting<'_>,
    passes: impl Fn(&Material) -> Vec<Pass>,
) -> usize {
    if frame.has_failed(id) {
        return 0;
    }
    let Some(object) = scene.object(id) else {
        return 0;
    };
    let ops = match object.render_operations() {
        Ok(ops) => ops,
        Err(e) => {
            log::warn!("Object '{}' has no drawable geometry: {}. Skipping.", object.name(), e);
            frame.mark_failed(id);
            return 0;
        }
    };

    match lighting {
        Lighting::Off => rs.set_lights(&[]),
        Lighting::Only(light) => rs.set_lights(&[light]),
        Lighting::Affecting => rs.set_lights(&scene.lights_affecting(id)),
    }
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
        for pass in passes(material) {
            rs.bind_pass(&pass);
            if let Err(e) = rs.render(op) {
                log::warn!(
                    "Rendering '{}' with material '{}' failed: {}. Skipping.",
                    object.name(),
                    op.material,
                    e
                );
                frame.mark_failed(id);
                return draws;
            }
            draws += 1;
        }
    }
    draws
}
