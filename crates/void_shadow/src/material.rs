//! Materials, passes and illumination-pass compilation
//!
//! Materials are the collaborator the shadow pipeline renders through. The
//! pipeline needs three things from them: the split of each pass into
//! ambient, per-light and decal parts for additive techniques, a derived
//! pass for drawing casters into shadow textures, and a derived pass for
//! projecting a shadow texture onto receivers.

use serde::{Deserialize, Serialize};

use crate::config::ShadowTechnique;
use crate::render_system::CompareFunction;

/// Name of the material used to draw stencil shadow volumes
pub const STENCIL_VOLUME_MATERIAL: &str = "void_shadow/StencilShadowVolumes";

/// Name of the material used to draw shadow volumes visibly
pub const DEBUG_SHADOW_MATERIAL: &str = "void_shadow/DebugShadowVolumes";

/// Name of the full-screen modulation material
pub const MODULATIVE_PASS_MATERIAL: &str = "void_shadow/StencilShadowModulationPass";

/// Name of the always-lit shadow texture bound past the texture count
pub const NULL_SHADOW_TEXTURE: &str = "void_shadow/NullShadowTexture";

/// RGBA colour
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColourValue {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ColourValue {
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for ColourValue {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Face culling mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
}

/// Framebuffer blend for a pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneBlend {
    #[default]
    Replace,
    Add,
    Modulate,
    AlphaBlend,
}

/// Texture coordinate addressing outside `[0, 1]`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureAddressing {
    #[default]
    Wrap,
    Clamp,
    Border,
}

/// One texture sampled by a pass
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextureUnit {
    pub texture: String,
    pub addressing: TextureAddressing,
    pub border_colour: ColourValue,
    /// Bound to the current light's shadow texture at render time
    pub is_shadow_texture: bool,
}

impl TextureUnit {
    pub fn new(texture: impl Into<String>) -> Self {
        Self {
            texture: texture.into(),
            addressing: TextureAddressing::Wrap,
            border_colour: ColourValue::BLACK,
            is_shadow_texture: false,
        }
    }

    /// Texture unit sampling the shadow texture, white outside the frustum
    pub fn shadow() -> Self {
        Self {
            texture: String::new(),
            addressing: TextureAddressing::Border,
            border_colour: ColourValue::WHITE,
            is_shadow_texture: true,
        }
    }
}

/// A single rendering pass of a material
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pass {
    pub name: String,
    pub ambient: ColourValue,
    pub diffuse: ColourValue,
    pub specular: ColourValue,
    pub self_illumination: ColourValue,
    pub lighting_enabled: bool,
    pub cull_mode: CullMode,
    pub scene_blend: SceneBlend,
    pub depth_check: bool,
    pub depth_write: bool,
    pub depth_func: CompareFunction,
    pub colour_write: bool,
    pub texture_units: Vec<TextureUnit>,
    pub vertex_program: Option<String>,
    pub fragment_program: Option<String>,
    /// Vertex program replacing `vertex_program` when drawing into a shadow texture
    pub shadow_caster_vertex_program: Option<String>,
    /// Vertex program replacing `vertex_program` when receiving a shadow texture
    pub shadow_receiver_vertex_program: Option<String>,
    pub shadow_receiver_fragment_program: Option<String>,
    /// Render once per light with only that light bound
    pub iterate_per_light: bool,
}

impl Pass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ambient: ColourValue::WHITE,
            diffuse: ColourValue::WHITE,
            specular: ColourValue::BLACK,
            self_illumination: ColourValue::BLACK,
            lighting_enabled: true,
            cull_mode: CullMode::Back,
            scene_blend: SceneBlend::Replace,
            depth_check: true,
            depth_write: true,
            depth_func: CompareFunction::LessEqual,
            colour_write: true,
            texture_units: Vec::new(),
            vertex_program: None,
            fragment_program: None,
            shadow_caster_vertex_program: None,
            shadow_receiver_vertex_program: None,
            shadow_receiver_fragment_program: None,
            iterate_per_light: false,
        }
    }

    pub fn with_texture(mut self, texture: impl Into<String>) -> Self {
        self.texture_units.push(TextureUnit::new(texture));
        self
    }

    pub fn with_blend(mut self, blend: SceneBlend) -> Self {
        self.scene_blend = blend;
        self
    }

    pub fn with_lighting(mut self, enabled: bool) -> Self {
        self.lighting_enabled = enabled;
        self
    }

    #[inline]
    pub fn has_textures(&self) -> bool {
        !self.texture_units.is_empty()
    }

    /// Blended without depth writes
    pub fn is_transparent(&self) -> bool {
        self.scene_blend != SceneBlend::Replace && !self.depth_write
    }
}

/// Category of a compiled illumination pass
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassCategory {
    /// Ambient and emissive contribution, rendered once
    Ambient,
    /// Diffuse and specular, rendered once per light
    PerLight,
    /// Texturing modulated over the lit result
    Decal,
}

/// Pass produced by splitting a material for additive lighting
#[derive(Clone, Debug, PartialEq)]
pub struct IlluminationPass {
    pub pass: Pass,
    pub category: PassCategory,
    /// Index of the source pass in the material
    pub original_index: usize,
}

/// Surface description made of one or more passes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub passes: Vec<Pass>,
    pub receive_shadows: bool,
    /// Transparent materials cast shadows only when set
    pub transparency_casts_shadows: bool,
    /// Material used instead of the derived caster pass
    pub shadow_caster_material: Option<String>,
}

impl Material {
    /// Material with a single default lit pass
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            passes: vec![Pass::new(format!("{}/0", name))],
            name,
            receive_shadows: true,
            transparency_casts_shadows: false,
            shadow_caster_material: None,
        }
    }

    pub fn with_passes(name: impl Into<String>, passes: Vec<Pass>) -> Self {
        Self {
            passes,
            ..Self::new(name)
        }
    }

    /// Unlit material drawing stencil shadow volumes
    pub fn stencil_volume() -> Self {
        let mut pass = Pass::new(STENCIL_VOLUME_MATERIAL).with_lighting(false);
        pass.cull_mode = CullMode::None;
        pass.colour_write = false;
        pass.depth_write = false;
        pass.depth_func = CompareFunction::Less;
        Self::with_passes(STENCIL_VOLUME_MATERIAL, vec![pass])
    }

    /// Additive translucent material showing shadow volumes on screen
    pub fn debug_shadows() -> Self {
        let mut pass = Pass::new(DEBUG_SHADOW_MATERIAL)
            .with_lighting(false)
            .with_blend(SceneBlend::Add);
        pass.self_illumination = ColourValue::new(0.7, 0.0, 0.2, 1.0);
        pass.cull_mode = CullMode::None;
        pass.depth_write = false;
        Self::with_passes(DEBUG_SHADOW_MATERIAL, vec![pass])
    }

    /// Full-screen pass darkening stencilled pixels by the shadow colour
    pub fn modulative_pass(shadow_colour: ColourValue) -> Self {
        let mut pass = Pass::new(MODULATIVE_PASS_MATERIAL)
            .with_lighting(false)
            .with_blend(SceneBlend::Modulate);
        pass.diffuse = shadow_colour;
        pass.self_illumination = shadow_colour;
        pass.depth_check = false;
        pass.depth_write = false;
        pass.cull_mode = CullMode::None;
        Self::with_passes(MODULATIVE_PASS_MATERIAL, vec![pass])
    }

    pub fn first_pass(&self) -> Option<&Pass> {
        self.passes.first()
    }

    pub fn is_transparent(&self) -> bool {
        self.passes.first().map_or(false, Pass::is_transparent)
    }

    /// Whether objects using this material cast shadows at all
    pub fn casts_shadows(&self) -> bool {
        !self.is_transparent() || self.transparency_casts_shadows
    }

    /// Split every pass into ambient, per-light and decal parts
    pub fn illumination_passes(&self) -> Vec<IlluminationPass> {
        let mut out = Vec::new();
        for (index, pass) in self.passes.iter().enumerate() {
            let mut push = |pass: Pass, category| {
                out.push(IlluminationPass {
                    pass,
                    category,
                    original_index: index,
                })
            };

            if !pass.lighting_enabled {
                let category = if pass.has_textures() {
                    PassCategory::Decal
                } else {
                    PassCategory::Ambient
                };
                push(pass.clone(), category);
                continue;
            }

            let mut ambient = pass.clone();
            ambient.name = format!("{}/ambient", pass.name);
            ambient.diffuse = ColourValue::BLACK;
            ambient.specular = ColourValue::BLACK;
            ambient.texture_units.clear();
            ambient.iterate_per_light = false;
            push(ambient, PassCategory::Ambient);

            let mut per_light = pass.clone();
            per_light.name = format!("{}/per_light", pass.name);
            per_light.ambient = ColourValue::BLACK;
            per_light.self_illumination = ColourValue::BLACK;
            per_light.scene_blend = SceneBlend::Add;
            per_light.depth_write = false;
            per_light.texture_units.clear();
            per_light.iterate_per_light = true;
            push(per_light, PassCategory::PerLight);

            if pass.has_textures() {
                let mut decal = pass.clone();
                decal.name = format!("{}/decal", pass.name);
                decal.lighting_enabled = false;
                decal.scene_blend = SceneBlend::Modulate;
                decal.depth_write = false;
                decal.iterate_per_light = false;
                push(decal, PassCategory::Decal);
            }
        }
        out
    }

    /// Pass drawing this material's objects into a shadow texture
    ///
    /// `custom` replaces the derived pass when the material names a caster
    /// material. Culling always follows the source pass.
    pub fn caster_pass(&self, technique: ShadowTechnique, shadow_colour: ColourValue, custom: Option<&Material>) -> Pass {
        let source = self.passes.first();
        let mut pass = match custom.and_then(Material::first_pass) {
            Some(custom) => custom.clone(),
            None => {
                let mut pass = Pass::new(format!("{}/shadow_caster", self.name)).with_lighting(false);
                pass.self_illumination = if technique.is_modulative() {
                    shadow_colour
                } else {
                    ColourValue::BLACK
                };
                pass.diffuse = pass.self_illumination;
                pass
            }
        };

        if let Some(source) = source {
            pass.cull_mode = source.cull_mode;
            if source.shadow_caster_vertex_program.is_some() {
                pass.vertex_program = source.shadow_caster_vertex_program.clone();
            }
        }
        pass
    }

    /// Pass projecting a shadow texture onto this material's objects
    ///
    /// Modulative techniques darken with a single textured pass; additive
    /// techniques reuse the per-light pass and mask it with the texture.
    pub fn receiver_pass(&self, technique: ShadowTechnique, per_light: Option<&Pass>) -> Pass {
        let source = per_light.or_else(|| self.passes.first());
        let mut pass = match (technique.is_additive(), per_light) {
            (true, Some(per_light)) => {
                let mut pass = per_light.clone();
                pass.name = format!("{}/shadow_receiver", per_light.name);
                pass
            }
            _ => {
                let mut pass = Pass::new(format!("{}/shadow_receiver", self.name))
                    .with_lighting(false)
                    .with_blend(SceneBlend::Modulate);
                pass.depth_write = false;
                pass.depth_func = CompareFunction::LessEqual;
                pass
            }
        };
        pass.texture_units.push(TextureUnit::shadow());

        if let Some(source) = source {
            pass.cull_mode = source.cull_mode;
            if source.shadow_receiver_vertex_program.is_some() {
                pass.vertex_program = source.shadow_receiver_vertex_program.clone();
            }
            if source.shadow_receiver_fragment_program.is_some() {
                pass.fragment_program = source.shadow_receiver_fragment_program.clone();
            }
        }
        pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lit_textured_pass_splits_three_ways() {
        let material = Material::with_passes("brick", vec![Pass::new("p").with_texture("brick.png")]);
        let passes = material.illumination_passes();
        let categories: Vec<_> = passes.iter().map(|p| p.category).collect();
        assert_eq!(categories, vec![PassCategory::Ambient, PassCategory::PerLight, PassCategory::Decal]);

        let per_light = &passes[1].pass;
        assert_eq!(per_light.scene_blend, SceneBlend::Add);
        assert_eq!(per_light.ambient, ColourValue::BLACK);
        assert!(per_light.iterate_per_light);
        assert!(per_light.texture_units.is_empty());

        let decal = &passes[2].pass;
        assert!(!decal.lighting_enabled);
        assert_eq!(decal.scene_blend, SceneBlend::Modulate);
        assert_eq!(decal.texture_units.len(), 1);
    }

    #[test]
    fn test_untextured_and_unlit_passes() {
        let material = Material::with_passes(
            "mixed",
            vec![
                Pass::new("lit"),
                Pass::new("glow").with_lighting(false),
                Pass::new("overlay").with_lighting(false).with_texture("dirt.png"),
            ],
        );
        let passes = material.illumination_passes();
        let summary: Vec<_> = passes.iter().map(|p| (p.original_index, p.category)).collect();
        assert_eq!(
            summary,
            vec![
                (0, PassCategory::Ambient),
                (0, PassCategory::PerLight),
                (1, PassCategory::Ambient),
                (2, PassCategory::Decal),
            ]
        );
    }

    #[test]
    fn test_caster_pass_preserves_culling_and_programs() {
        let mut source = Pass::new("p");
        source.cull_mode = CullMode::None;
        source.shadow_caster_vertex_program = Some("skin_caster_vp".into());
        let material = Material::with_passes("skinned", vec![source]);
        let colour = ColourValue::new(0.3, 0.3, 0.3, 1.0);

        let pass = material.caster_pass(ShadowTechnique::TextureModulative, colour, None);
        assert_eq!(pass.cull_mode, CullMode::None);
        assert_eq!(pass.self_illumination, colour);
        assert_eq!(pass.vertex_program.as_deref(), Some("skin_caster_vp"));
        assert!(!pass.lighting_enabled);

        let pass = material.caster_pass(ShadowTechnique::TextureAdditive, colour, None);
        assert_eq!(pass.self_illumination, ColourValue::BLACK);

        let custom = Material::with_passes("custom_caster", vec![Pass::new("custom").with_lighting(false)]);
        let pass = material.caster_pass(ShadowTechnique::TextureModulative, colour, Some(&custom));
        assert_eq!(pass.name, "custom");
        assert_eq!(pass.cull_mode, CullMode::None);
    }

    #[test]
    fn test_receiver_pass() {
        let material = Material::new("ground");
        let pass = material.receiver_pass(ShadowTechnique::TextureModulative, None);
        assert_eq!(pass.scene_blend, SceneBlend::Modulate);
        let unit = pass.texture_units.last().unwrap();
        assert!(unit.is_shadow_texture);
        assert_eq!(unit.addressing, TextureAddressing::Border);
        assert_eq!(unit.border_colour, ColourValue::WHITE);

        let passes = material.illumination_passes();
        let per_light = passes.iter().find(|p| p.category == PassCategory::PerLight).unwrap();
        let pass = material.receiver_pass(ShadowTechnique::TextureAdditive, Some(&per_light.pass));
        assert_eq!(pass.scene_blend, SceneBlend::Add);
        assert!(pass.lighting_enabled);
        assert_eq!(pass.texture_units.len(), 1);
    }

    #[test]
    fn test_transparency() {
        let mut pass = Pass::new("glass").with_blend(SceneBlend::AlphaBlend);
        pass.depth_write = false;
        let mut material = Material::with_passes("glass", vec![pass]);
        assert!(material.is_transparent());
        assert!(!material.casts_shadows());
        material.transparency_casts_shadows = true;
        assert!(material.casts_shadows());
    }
}
