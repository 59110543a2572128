//! Shadow Configuration
//!
//! Technique selection and tuning with serde support for hot-reload.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShadowError};
use crate::material::ColourValue;

/// Shadow technique
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadowTechnique {
    /// No shadows
    #[default]
    None,
    /// Stencil volumes, lighting added per light outside the shadow
    StencilAdditive,
    /// Stencil volumes, shadowed pixels darkened after full lighting
    StencilModulative,
    /// Projective textures, lighting added per light
    TextureAdditive,
    /// Projective textures modulated over the lit scene
    TextureModulative,
}

impl ShadowTechnique {
    #[inline]
    pub fn is_stencil(self) -> bool {
        matches!(self, Self::StencilAdditive | Self::StencilModulative)
    }

    #[inline]
    pub fn is_texture(self) -> bool {
        matches!(self, Self::TextureAdditive | Self::TextureModulative)
    }

    #[inline]
    pub fn is_additive(self) -> bool {
        matches!(self, Self::StencilAdditive | Self::TextureAdditive)
    }

    #[inline]
    pub fn is_modulative(self) -> bool {
        matches!(self, Self::StencilModulative | Self::TextureModulative)
    }
}

/// Shadow texture pixel format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    #[default]
    Rgb8,
    Rgba8,
    R16Float,
    R32Float,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgb8 => 3,
            Self::Rgba8 | Self::R32Float => 4,
            Self::R16Float => 2,
        }
    }
}

/// Projective shadow texture settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureShadowConfig {
    /// Texture resolution (power of 2)
    pub size: u32,

    /// Number of shadow textures; extra lights use the null texture
    pub count: usize,

    /// Texture pixel format
    pub format: PixelFormat,

    /// Proportion of the shadow far distance to offset the point light focus
    /// in front of the camera
    pub offset: f32,

    /// Proportion of the far distance where the shadow starts fading
    pub fade_start: f32,

    /// Proportion of the far distance where the shadow is fully faded
    pub fade_end: f32,
}

impl Default for TextureShadowConfig {
    fn default() -> Self {
        Self {
            size: 512,
            count: 1,
            format: PixelFormat::Rgb8,
            offset: 0.6,
            fade_start: 0.7,
            fade_end: 0.9,
        }
    }
}

/// Global shadow configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Requested technique (may be downgraded by device capabilities)
    pub technique: ShadowTechnique,

    /// Colour of shadowed areas for modulative techniques
    pub shadow_colour: ColourValue,

    /// Fixed extrusion distance for directional lights
    pub directional_extrusion_distance: f32,

    /// Maximum distance from the camera at which shadows are considered
    /// (0 = unlimited)
    pub shadow_far_distance: f32,

    /// Capacity of the shared shadow index buffer in indices
    pub index_buffer_size: usize,

    /// Extrude in the vertex stage when the device supports vertex programs
    pub hardware_extrusion: bool,

    /// Allow extrusion to infinity (hardware extrusion only)
    pub extrude_to_infinity: bool,

    /// Restrict stencil work to the projected light attenuation sphere
    pub use_scissor: bool,

    /// Render shadow volumes visibly after the stencil pass
    pub debug_shadows: bool,

    /// Texture technique settings
    pub texture: TextureShadowConfig,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            technique: ShadowTechnique::None,
            shadow_colour: ColourValue::new(0.25, 0.25, 0.25, 1.0),
            directional_extrusion_distance: 10000.0,
            shadow_far_distance: 0.0,
            index_buffer_size: 51200,
            hardware_extrusion: true,
            extrude_to_infinity: true,
            use_scissor: true,
            debug_shadows: false,
            texture: TextureShadowConfig::default(),
        }
    }
}

impl ShadowConfig {
    /// Stencil shadows with per-light additive lighting
    pub fn stencil_additive() -> Self {
        Self {
            technique: ShadowTechnique::StencilAdditive,
            ..Default::default()
        }
    }

    /// Stencil shadows darkened with the shadow colour
    pub fn stencil_modulative() -> Self {
        Self {
            technique: ShadowTechnique::StencilModulative,
            ..Default::default()
        }
    }

    /// Texture shadows with a reasonable far distance
    pub fn texture_modulative() -> Self {
        Self {
            technique: ShadowTechnique::TextureModulative,
            shadow_far_distance: 200.0,
            ..Default::default()
        }
    }

    /// Create a configuration with shadows disabled
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Validate configuration and clamp values to valid ranges
    pub fn validate(&mut self) {
        self.directional_extrusion_distance = self.directional_extrusion_distance.max(1.0);
        self.shadow_far_distance = self.shadow_far_distance.max(0.0);
        // At least one full triangle plus a quad
        self.index_buffer_size = self.index_buffer_size.max(1024);

        let texture = &mut self.texture;
        texture.size = texture.size.clamp(64, 8192).next_power_of_two();
        texture.count = texture.count.clamp(1, 8);
        texture.offset = texture.offset.clamp(0.0, 1.0);
        texture.fade_end = texture.fade_end.clamp(0.0, 1.0);
        texture.fade_start = texture.fade_start.clamp(0.0, texture.fade_end);
    }

    /// Parse a configuration from JSON, validating the result
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: Self =
            serde_json::from_str(json).map_err(|e| ShadowError::InvalidConfig(e.to_string()))?;
        config.validate();
        Ok(config)
    }

    /// Read and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ShadowError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ShadowError::InvalidConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ShadowConfig::default();
        assert_eq!(config.technique, ShadowTechnique::None);
        assert_eq!(config.index_buffer_size, 51200);
        assert_eq!(config.texture.count, 1);
    }

    #[test]
    fn test_technique_classes() {
        assert!(ShadowTechnique::StencilAdditive.is_stencil());
        assert!(ShadowTechnique::StencilAdditive.is_additive());
        assert!(ShadowTechnique::TextureModulative.is_texture());
        assert!(ShadowTechnique::TextureModulative.is_modulative());
        assert!(!ShadowTechnique::None.is_stencil());
        assert!(!ShadowTechnique::None.is_texture());
    }

    #[test]
    fn test_validate_clamps() {
        let mut config = ShadowConfig {
            index_buffer_size: 3,
            texture: TextureShadowConfig {
                size: 300,
                count: 0,
                fade_start: 0.95,
                fade_end: 0.5,
                ..Default::default()
            },
            ..Default::default()
        };
        config.validate();

        assert_eq!(config.index_buffer_size, 1024);
        assert_eq!(config.texture.size, 512);
        assert_eq!(config.texture.count, 1);
        assert!(config.texture.fade_start <= config.texture.fade_end);
    }

    #[test]
    fn test_config_serialization() {
        let config = ShadowConfig::stencil_modulative();
        let json = config.to_json().unwrap();
        let restored = ShadowConfig::from_json(&json).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ShadowConfig::from_json(r#"{ "technique": "TextureAdditive" }"#).unwrap();
        assert_eq!(config.technique, ShadowTechnique::TextureAdditive);
        assert_eq!(config.texture, TextureShadowConfig::default());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = ShadowConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ShadowError::InvalidConfig(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ShadowConfig::load("/nonexistent/void_shadow.json").unwrap_err();
        assert!(matches!(err, ShadowError::InvalidConfig(msg) if msg.contains("void_shadow.json")));
    }
}
