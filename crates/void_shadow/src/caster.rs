//! Shadow caster capability and shadow renderables

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use void_math::{Mat4, Sphere, AABB};

use crate::buffer::{IndexBuffer, VertexBuffer};
use crate::error::Result;
use crate::frame::FrameContext;
use crate::light::Light;
use crate::render_system::{IndexRange, RenderOperation, VertexSource};
use crate::volume::ShadowVolumeBuilder;

/// Parts of a shadow volume to generate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShadowVolumeFlags(u32);

impl ShadowVolumeFlags {
    pub const NONE: Self = Self(0);

    /// Extruded vertices are projected to infinity by the vertex program
    pub const EXTRUDE_TO_INFINITY: Self = Self(1 << 0);

    /// Close the volume at the caster with its light-facing triangles
    pub const INCLUDE_LIGHT_CAP: Self = Self(1 << 1);

    /// Close the volume at the far end
    pub const INCLUDE_DARK_CAP: Self = Self(1 << 2);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    #[inline]
    pub fn set(&mut self, other: Self, value: bool) {
        if value {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl core::ops::BitOr for ShadowVolumeFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for ShadowVolumeFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Vertex program extruding shadow volumes on the GPU
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ExtrusionProgram {
    PointFinite = 0,
    PointInfinite = 1,
    DirectionalFinite = 2,
    DirectionalInfinite = 3,
}

impl ExtrusionProgram {
    pub fn select(directional: bool, infinite: bool) -> Self {
        match (directional, infinite) {
            (false, false) => Self::PointFinite,
            (false, true) => Self::PointInfinite,
            (true, false) => Self::DirectionalFinite,
            (true, true) => Self::DirectionalInfinite,
        }
    }

    #[inline]
    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::PointFinite => "void_shadow/ShadowExtrudePointLightFinite",
            Self::PointInfinite => "void_shadow/ShadowExtrudePointLight",
            Self::DirectionalFinite => "void_shadow/ShadowExtrudeDirLightFinite",
            Self::DirectionalInfinite => "void_shadow/ShadowExtrudeDirLight",
        }
    }
}

/// GPU parameters for hardware shadow volume extrusion
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowExtrusionParams {
    /// Light position in object space, `w = 0` for directional lights
    pub light_position: [f32; 4],
    /// Object-space extrusion distance, ignored by the infinite programs
    pub extrusion_distance: f32,
    /// [`ExtrusionProgram`] identifier
    pub program: u32,
    pub _pad: [f32; 2],
}

impl ShadowExtrusionParams {
    pub fn new(light_position: [f32; 4], extrusion_distance: f32, program: ExtrusionProgram) -> Self {
        Self {
            light_position,
            extrusion_distance,
            program: program.id(),
            _pad: [0.0; 2],
        }
    }
}

/// GPU parameters for projecting a shadow texture onto receivers
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowReceiverParams {
    /// World to shadow texture coordinates
    pub texture_matrix: [[f32; 4]; 4],
    /// View distance where the shadow starts fading
    pub fade_start: f32,
    /// View distance where the shadow has faded out
    pub fade_end: f32,
    pub _pad: [f32; 2],
}

/// Shadow volume geometry of one caster section
///
/// Vertices come from a doubled position buffer (`[0, n)` original,
/// `[n, 2n)` extruded); indices are a range of the shared shadow index
/// buffer and stay valid only until the next caster is processed.
#[derive(Clone, Debug)]
pub struct ShadowRenderable {
    material: String,
    positions: Arc<VertexBuffer>,
    extrusion_weights: Option<Arc<VertexBuffer>>,
    vertex_count: usize,
    index_start: usize,
    index_count: usize,
    world_transform: Mat4,
    extrusion: Option<ShadowExtrusionParams>,
    light_cap: Option<Box<ShadowRenderable>>,
}

impl ShadowRenderable {
    pub fn new(
        material: impl Into<String>,
        positions: Arc<VertexBuffer>,
        extrusion_weights: Option<Arc<VertexBuffer>>,
        world_transform: Mat4,
    ) -> Self {
        let vertex_count = positions.vertex_count();
        Self {
            material: material.into(),
            positions,
            extrusion_weights,
            vertex_count,
            index_start: 0,
            index_count: 0,
            world_transform,
            extrusion: None,
            light_cap: None,
        }
    }

    /// Sub-renderable sharing this one's vertices
    pub(crate) fn sibling(&self) -> Self {
        Self {
            light_cap: None,
            index_start: 0,
            index_count: 0,
            ..self.clone()
        }
    }

    pub fn material(&self) -> &str {
        &self.material
    }

    pub fn positions(&self) -> &Arc<VertexBuffer> {
        &self.positions
    }

    pub fn extrusion_weights(&self) -> Option<&Arc<VertexBuffer>> {
        self.extrusion_weights.as_ref()
    }

    /// Always twice the source vertex count
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn index_range(&self) -> (usize, usize) {
        (self.index_start, self.index_count)
    }

    pub fn set_index_range(&mut self, start: usize, count: usize) {
        self.index_start = start;
        self.index_count = count;
    }

    pub fn world_transform(&self) -> &Mat4 {
        &self.world_transform
    }

    pub fn extrusion_params(&self) -> Option<&ShadowExtrusionParams> {
        self.extrusion.as_ref()
    }

    pub fn set_extrusion_params(&mut self, params: Option<ShadowExtrusionParams>) {
        self.extrusion = params;
    }

    /// Separately rendered light cap
    pub fn light_cap(&self) -> Option<&ShadowRenderable> {
        self.light_cap.as_deref()
    }

    pub fn set_light_cap(&mut self, cap: Option<ShadowRenderable>) {
        self.light_cap = cap.map(Box::new);
    }

    pub fn is_empty(&self) -> bool {
        self.index_count == 0
    }

    /// Draw over `index_buffer`, the buffer the indices were written to
    pub fn render_operation<'a>(&'a self, index_buffer: &'a IndexBuffer) -> RenderOperation<'a> {
        RenderOperation {
            vertices: VertexSource::ShadowVolume {
                positions: &self.positions,
                extrusion_weights: self.extrusion_weights.as_deref(),
            },
            vertex_count: self.vertex_count,
            indices: Some(IndexRange {
                buffer: index_buffer,
                start: self.index_start,
                count: self.index_count,
            }),
            material: &self.material,
        }
    }
}

/// Everything a caster needs to build its shadow volume for one light
#[derive(Clone, Copy, Debug)]
pub struct ShadowVolumeRequest<'a> {
    pub light: &'a Light,
    /// Shared scratch buffer, rewritten from index 0 by every caster
    pub index_buffer: &'a IndexBuffer,
    pub flags: ShadowVolumeFlags,
    /// World-space extrusion distance for directional lights
    pub directional_extrusion_distance: f32,
    /// Extrude in a vertex program instead of on the CPU
    pub hardware_extrusion: bool,
    pub frame: &'a FrameContext,
}

impl<'a> ShadowVolumeRequest<'a> {
    /// World-space extrusion distance of `caster` for this light
    pub fn extrusion_distance(&self, caster: &(impl ShadowCaster + ?Sized)) -> f32 {
        if self.light.is_directional() {
            self.directional_extrusion_distance
        } else {
            caster.point_extrusion_distance(self.light)
        }
    }
}

/// Scene object able to cast stencil shadows
pub trait ShadowCaster {
    fn casts_shadows(&self) -> bool;

    fn is_visible(&self) -> bool;

    /// Material reported when rendering fails
    fn material_name(&self) -> &str;

    fn world_bounding_box(&self) -> AABB;

    fn world_bounding_sphere(&self) -> Sphere {
        Sphere::from_aabb(&self.world_bounding_box())
    }

    /// World bounds of the light cap
    fn light_cap_bounds(&self) -> AABB {
        self.world_bounding_box()
    }

    /// World bounds of the dark cap
    fn dark_cap_bounds(&self, light: &Light, extrusion_distance: f32) -> AABB {
        ShadowVolumeBuilder::extrude_bounds(&self.world_bounding_box(), light.as_vec4(), extrusion_distance)
    }

    /// Distance point and spot volumes are extruded in world space
    ///
    /// Extends to the edge of the light's attenuation range, never negative.
    fn point_extrusion_distance(&self, light: &Light) -> f32 {
        let center = self.world_bounding_sphere().center;
        (light.attenuation_range - center.distance(light.position)).max(0.0)
    }

    /// Build this caster's shadow volumes for `request.light`
    ///
    /// Indices are written into `request.index_buffer` starting at 0.
    fn shadow_renderables(&mut self, request: &ShadowVolumeRequest<'_>) -> Result<Vec<ShadowRenderable>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use void_math::Vec3;

    #[test]
    fn test_flags() {
        let mut flags = ShadowVolumeFlags::INCLUDE_LIGHT_CAP | ShadowVolumeFlags::INCLUDE_DARK_CAP;
        assert!(flags.contains(ShadowVolumeFlags::INCLUDE_DARK_CAP));
        assert!(!flags.contains(ShadowVolumeFlags::EXTRUDE_TO_INFINITY));
        flags.set(ShadowVolumeFlags::INCLUDE_LIGHT_CAP, false);
        flags.set(ShadowVolumeFlags::EXTRUDE_TO_INFINITY, true);
        assert_eq!(
            flags,
            ShadowVolumeFlags::INCLUDE_DARK_CAP | ShadowVolumeFlags::EXTRUDE_TO_INFINITY
        );
    }

    #[test]
    fn test_gpu_params_layout() {
        assert_eq!(std::mem::size_of::<ShadowExtrusionParams>(), 32);
        assert_eq!(std::mem::size_of::<ShadowReceiverParams>(), 80);

        let params = ShadowExtrusionParams::new([1.0, 2.0, 3.0, 1.0], 50.0, ExtrusionProgram::PointFinite);
        let bytes: &[u8] = bytemuck::bytes_of(&params);
        assert_eq!(bytes.len(), 32);
        assert_eq!(params.program, 0);
    }

    #[test]
    fn test_program_selection() {
        assert_eq!(ExtrusionProgram::select(true, true), ExtrusionProgram::DirectionalInfinite);
        assert_eq!(ExtrusionProgram::select(false, false), ExtrusionProgram::PointFinite);
        assert_eq!(ExtrusionProgram::PointInfinite.id(), 1);
    }

    #[test]
    fn test_render_operation_borrows_shared_indices() {
        let positions = Arc::new(VertexBuffer::from_positions(&[Vec3::ZERO; 6]));
        let mut renderable = ShadowRenderable::new("rock", positions, None, Mat4::IDENTITY);
        renderable.set_index_range(0, 12);
        let indices = IndexBuffer::new(crate::buffer::IndexType::U16, 64);

        let op = renderable.render_operation(&indices);
        assert_eq!(op.vertex_count, 6);
        assert_eq!(op.element_count(), 12);
        assert_eq!(op.material, "rock");
        assert!(op.is_shadow_volume());
    }
}
