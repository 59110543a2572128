//! Render device abstraction
//!
//! The shadow renderers drive a device only through [`RenderSystem`]. The
//! crate ships [`HeadlessRenderSystem`], which keeps the full pipeline state
//! and records every call, so the whole pipeline can run without a GPU.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use void_math::Mat4;

use crate::buffer::{IndexBuffer, VertexBuffer};
use crate::caster::{ShadowExtrusionParams, ShadowReceiverParams};
use crate::error::{Result, ShadowError};
use crate::frame::FrameContext;
use crate::light::Light;
use crate::material::{ColourValue, CullMode, Pass};
use crate::vertex::VertexData;

/// Device capabilities relevant to shadow rendering
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Self = Self(0);

    /// Stencil buffer attached to the main target
    pub const STENCIL_BUFFER: Self = Self(1 << 0);

    /// Separate stencil operations for front and back faces
    pub const TWO_SIDED_STENCIL: Self = Self(1 << 1);

    /// Wrapping increment/decrement
    pub const STENCIL_WRAP: Self = Self(1 << 2);

    /// Programmable vertex stage
    pub const VERTEX_PROGRAMS: Self = Self(1 << 3);

    /// Projection without a far clip plane
    pub const INFINITE_FAR_PLANE: Self = Self(1 << 4);

    /// Scissor rectangle
    pub const SCISSOR_TEST: Self = Self(1 << 5);

    pub const ALL: Self = Self(0x3F);

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

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
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl core::ops::BitOr for Capabilities {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for Capabilities {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Depth and stencil comparison
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareFunction {
    AlwaysFail,
    #[default]
    AlwaysPass,
    Less,
    LessEqual,
    Equal,
    NotEqual,
    GreaterEqual,
    Greater,
}

/// Stencil buffer update
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StencilOperation {
    #[default]
    Keep,
    Zero,
    Replace,
    Increment,
    Decrement,
    IncrementWrap,
    DecrementWrap,
    Invert,
}

impl StencilOperation {
    /// Operation applied to the opposite face in two-sided mode
    pub fn inverse(self) -> Self {
        match self {
            Self::Increment => Self::Decrement,
            Self::Decrement => Self::Increment,
            Self::IncrementWrap => Self::DecrementWrap,
            Self::DecrementWrap => Self::IncrementWrap,
            other => other,
        }
    }
}

/// Full stencil state
///
/// With `two_sided` set the operations apply to front faces and back faces
/// receive their [`StencilOperation::inverse`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StencilParams {
    pub compare: CompareFunction,
    pub reference: u32,
    pub mask: u32,
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
    pub two_sided: bool,
}

impl Default for StencilParams {
    fn default() -> Self {
        Self {
            compare: CompareFunction::AlwaysPass,
            reference: 0,
            mask: 0xFFFF_FFFF,
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
            two_sided: false,
        }
    }
}

/// Scissor rectangle in normalised device coordinates
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScissorRect {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl ScissorRect {
    pub fn from_ndc([left, bottom, right, top]: [f32; 4]) -> Self {
        Self { left, bottom, right, top }
    }

    /// Pixel rectangle `(x, y, width, height)` with the origin top-left
    pub fn to_pixels(&self, (width, height): (u32, u32)) -> (u32, u32, u32, u32) {
        let to_x = |v: f32| (((v + 1.0) * 0.5) * width as f32).round().clamp(0.0, width as f32) as u32;
        let to_y = |v: f32| (((1.0 - v) * 0.5) * height as f32).round().clamp(0.0, height as f32) as u32;
        let (x0, x1) = (to_x(self.left), to_x(self.right));
        let (y0, y1) = (to_y(self.top), to_y(self.bottom));
        (x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }
}

/// Buffers touched by a clear
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FrameBufferType(u32);

impl FrameBufferType {
    pub const COLOUR: Self = Self(1 << 0);
    pub const DEPTH: Self = Self(1 << 1);
    pub const STENCIL: Self = Self(1 << 2);
    pub const ALL: Self = Self(0x7);

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl core::ops::BitOr for FrameBufferType {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Surface receiving draws
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    #[default]
    Viewport,
    ShadowTexture(usize),
}

/// Vertex input for a draw
#[derive(Clone, Copy, Debug)]
pub enum VertexSource<'a> {
    /// Regular geometry
    Data(&'a VertexData),
    /// Doubled shadow position buffer with optional extrusion weights
    ShadowVolume {
        positions: &'a VertexBuffer,
        extrusion_weights: Option<&'a VertexBuffer>,
    },
    /// Full-screen quad generated by the device
    FullScreenQuad,
}

/// Range of an index buffer
#[derive(Clone, Copy, Debug)]
pub struct IndexRange<'a> {
    pub buffer: &'a IndexBuffer,
    pub start: usize,
    pub count: usize,
}

/// A single draw, borrowing everything it references
#[derive(Clone, Copy, Debug)]
pub struct RenderOperation<'a> {
    pub vertices: VertexSource<'a>,
    pub vertex_count: usize,
    pub indices: Option<IndexRange<'a>>,
    /// Material name, reported when the draw fails
    pub material: &'a str,
}

impl<'a> RenderOperation<'a> {
    pub fn full_screen_quad(material: &'a str) -> Self {
        Self {
            vertices: VertexSource::FullScreenQuad,
            vertex_count: 4,
            indices: None,
            material,
        }
    }

    pub fn is_shadow_volume(&self) -> bool {
        matches!(self.vertices, VertexSource::ShadowVolume { .. })
    }

    /// Number of primitives' worth of vertices submitted
    pub fn element_count(&self) -> usize {
        self.indices.map_or(self.vertex_count, |range| range.count)
    }
}

/// Render device used by the shadow pipeline
pub trait RenderSystem {
    fn capabilities(&self) -> Capabilities;

    fn begin_frame(&mut self, frame: &FrameContext);
    fn end_frame(&mut self);

    fn set_stencil_check_enabled(&mut self, enabled: bool);
    fn set_stencil_params(&mut self, params: &StencilParams);
    fn set_colour_write_enabled(&mut self, enabled: bool);
    fn set_depth_params(&mut self, check: bool, write: bool, func: CompareFunction);
    fn set_culling_mode(&mut self, mode: CullMode);
    fn set_scissor(&mut self, rect: Option<ScissorRect>);
    fn clear(&mut self, buffers: FrameBufferType);

    fn set_ambient_light(&mut self, colour: ColourValue);
    fn set_lights(&mut self, lights: &[&Light]);
    fn set_render_target(&mut self, target: RenderTarget);

    fn set_view_matrix(&mut self, matrix: &Mat4);
    fn set_projection_matrix(&mut self, matrix: &Mat4);
    fn set_world_matrix(&mut self, matrix: &Mat4);

    /// Apply a pass's fixed-function state and programs
    fn bind_pass(&mut self, pass: &Pass);
    /// Texture sampled by shadow texture units of subsequently bound passes
    fn set_shadow_texture(&mut self, texture: &str);
    fn set_extrusion_params(&mut self, params: Option<&ShadowExtrusionParams>);
    fn set_receiver_params(&mut self, params: Option<&ShadowReceiverParams>);

    fn render(&mut self, op: &RenderOperation<'_>) -> Result<()>;
}

/// Recorded device call
#[derive(Clone, Debug, PartialEq)]
pub enum RenderCommand {
    BeginFrame(u64),
    EndFrame,
    StencilCheck(bool),
    StencilParams(StencilParams),
    ColourWrite(bool),
    DepthParams { check: bool, write: bool, func: CompareFunction },
    Culling(CullMode),
    Scissor(Option<ScissorRect>),
    Clear(FrameBufferType),
    Ambient(ColourValue),
    Lights(Vec<String>),
    RenderTarget(RenderTarget),
    ViewMatrix,
    ProjectionMatrix,
    WorldMatrix,
    BindPass(String),
    ShadowTexture(String),
    ExtrusionParams(Option<ShadowExtrusionParams>),
    ReceiverParams(Option<ShadowReceiverParams>),
    Draw(usize),
}

/// Device state captured at each draw
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub material: String,
    pub pass: Option<String>,
    pub shadow_volume: bool,
    pub vertex_count: usize,
    pub index_count: Option<usize>,
    pub render_target: RenderTarget,
    pub stencil_check: bool,
    pub stencil: StencilParams,
    pub colour_write: bool,
    pub depth_check: bool,
    pub depth_write: bool,
    pub depth_func: CompareFunction,
    pub culling: CullMode,
    pub scissor: Option<ScissorRect>,
    pub ambient: ColourValue,
    pub lights: Vec<String>,
    pub shadow_texture: Option<String>,
    pub extrusion: Option<ShadowExtrusionParams>,
    pub receiver: Option<ShadowReceiverParams>,
}

/// Device state without a GPU, recording every call
#[derive(Debug)]
pub struct HeadlessRenderSystem {
    capabilities: Capabilities,
    commands: Vec<RenderCommand>,
    draws: Vec<DrawRecord>,
    failing_materials: HashSet<String>,
    frames: u64,
    in_frame: bool,

    stencil_check: bool,
    stencil: StencilParams,
    colour_write: bool,
    depth_check: bool,
    depth_write: bool,
    depth_func: CompareFunction,
    culling: CullMode,
    scissor: Option<ScissorRect>,
    ambient: ColourValue,
    lights: Vec<String>,
    render_target: RenderTarget,
    pass: Option<String>,
    shadow_texture: Option<String>,
    extrusion: Option<ShadowExtrusionParams>,
    receiver: Option<ShadowReceiverParams>,
    world: Mat4,
}

impl HeadlessRenderSystem {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            commands: Vec::new(),
            draws: Vec::new(),
            failing_materials: HashSet::new(),
            frames: 0,
            in_frame: false,
            stencil_check: false,
            stencil: StencilParams::default(),
            colour_write: true,
            depth_check: true,
            depth_write: true,
            depth_func: CompareFunction::LessEqual,
            culling: CullMode::Back,
            scissor: None,
            ambient: ColourValue::BLACK,
            lights: Vec::new(),
            render_target: RenderTarget::Viewport,
            pass: None,
            shadow_texture: None,
            extrusion: None,
            receiver: None,
            world: Mat4::IDENTITY,
        }
    }

    /// Make every draw with the named material fail
    pub fn fail_material(&mut self, material: impl Into<String>) {
        self.failing_materials.insert(material.into());
    }

    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Draws submitted with a shadow volume vertex source
    pub fn shadow_volume_draws(&self) -> impl Iterator<Item = &DrawRecord> {
        self.draws.iter().filter(|draw| draw.shadow_volume)
    }

    pub fn clear_recording(&mut self) {
        self.commands.clear();
        self.draws.clear();
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn stencil_check_enabled(&self) -> bool {
        self.stencil_check
    }

    pub fn stencil_params(&self) -> &StencilParams {
        &self.stencil
    }

    pub fn colour_write_enabled(&self) -> bool {
        self.colour_write
    }

    pub fn depth_write_enabled(&self) -> bool {
        self.depth_write
    }

    pub fn scissor(&self) -> Option<ScissorRect> {
        self.scissor
    }

    pub fn world_matrix(&self) -> &Mat4 {
        &self.world
    }

    fn validate(op: &RenderOperation<'_>) -> Result<()> {
        let vertex_capacity = match op.vertices {
            VertexSource::Data(data) => data.vertex_count(),
            VertexSource::ShadowVolume { positions, extrusion_weights } => {
                if let Some(weights) = extrusion_weights {
                    if weights.vertex_count() < op.vertex_count {
                        return Err(ShadowError::BufferOutOfRange {
                            index: op.vertex_count,
                            count: weights.vertex_count(),
                        });
                    }
                }
                positions.vertex_count()
            }
            VertexSource::FullScreenQuad => 4,
        };
        if op.vertex_count > vertex_capacity {
            return Err(ShadowError::BufferOutOfRange {
                index: op.vertex_count,
                count: vertex_capacity,
            });
        }
        if let Some(range) = op.indices {
            if range.start + range.count > range.buffer.index_count() {
                return Err(ShadowError::BufferOutOfRange {
                    index: range.start + range.count,
                    count: range.buffer.index_count(),
                });
            }
        }
        Ok(())
    }
}

impl Default for HeadlessRenderSystem {
    fn default() -> Self {
        Self::new(Capabilities::ALL)
    }
}

impl RenderSystem for HeadlessRenderSystem {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn begin_frame(&mut self, frame: &FrameContext) {
        self.in_frame = true;
        self.commands.push(RenderCommand::BeginFrame(frame.frame_number()));
    }

    fn end_frame(&mut self) {
        if self.in_frame {
            self.frames += 1;
        }
        self.in_frame = false;
        self.commands.push(RenderCommand::EndFrame);
    }

    fn set_stencil_check_enabled(&mut self, enabled: bool) {
        self.stencil_check = enabled;
        self.commands.push(RenderCommand::StencilCheck(enabled));
    }

    fn set_stencil_params(&mut self, params: &StencilParams) {
        self.stencil = *params;
        self.commands.push(RenderCommand::StencilParams(*params));
    }

    fn set_colour_write_enabled(&mut self, enabled: bool) {
        self.colour_write = enabled;
        self.commands.push(RenderCommand::ColourWrite(enabled));
    }

    fn set_depth_params(&mut self, check: bool, write: bool, func: CompareFunction) {
        self.depth_check = check;
        self.depth_write = write;
        self.depth_func = func;
        self.commands.push(RenderCommand::DepthParams { check, write, func });
    }

    fn set_culling_mode(&mut self, mode: CullMode) {
        self.culling = mode;
        self.commands.push(RenderCommand::Culling(mode));
    }

    fn set_scissor(&mut self, rect: Option<ScissorRect>) {
        self.scissor = rect;
        self.commands.push(RenderCommand::Scissor(rect));
    }

    fn clear(&mut self, buffers: FrameBufferType) {
        self.commands.push(RenderCommand::Clear(buffers));
    }

    fn set_ambient_light(&mut self, colour: ColourValue) {
        self.ambient = colour;
        self.commands.push(RenderCommand::Ambient(colour));
    }

    fn set_lights(&mut self, lights: &[&Light]) {
        self.lights = lights.iter().map(|light| light.name.clone()).collect();
        self.commands.push(RenderCommand::Lights(self.lights.clone()));
    }

    fn set_render_target(&mut self, target: RenderTarget) {
        self.render_target = target;
        self.commands.push(RenderCommand::RenderTarget(target));
    }

    fn set_view_matrix(&mut self, _matrix: &Mat4) {
        self.commands.push(RenderCommand::ViewMatrix);
    }

    fn set_projection_matrix(&mut self, _matrix: &Mat4) {
        self.commands.push(RenderCommand::ProjectionMatrix);
    }

    fn set_world_matrix(&mut self, matrix: &Mat4) {
        self.world = *matrix;
        self.commands.push(RenderCommand::WorldMatrix);
    }

    fn bind_pass(&mut self, pass: &Pass) {
        self.pass = Some(pass.name.clone());
        self.culling = pass.cull_mode;
        self.colour_write = pass.colour_write;
        self.depth_check = pass.depth_check;
        self.depth_write = pass.depth_write;
        self.depth_func = pass.depth_func;
        self.commands.push(RenderCommand::BindPass(pass.name.clone()));
    }

    fn set_shadow_texture(&mut self, texture: &str) {
        self.shadow_texture = Some(texture.to_string());
        self.commands.push(RenderCommand::ShadowTexture(texture.to_string()));
    }

    fn set_extrusion_params(&mut self, params: Option<&ShadowExtrusionParams>) {
        self.extrusion = params.copied();
        self.commands.push(RenderCommand::ExtrusionParams(self.extrusion));
    }

    fn set_receiver_params(&mut self, params: Option<&ShadowReceiverParams>) {
        self.receiver = params.copied();
        self.commands.push(RenderCommand::ReceiverParams(self.receiver));
    }

    fn render(&mut self, op: &RenderOperation<'_>) -> Result<()> {
        if self.failing_materials.contains(op.material) {
            return Err(ShadowError::RenderFailed {
                material: op.material.to_string(),
                reason: "device rejected draw".to_string(),
            });
        }
        Self::validate(op)?;

        log::trace!(
            "Draw '{}': {} vertices, {} elements",
            op.material,
            op.vertex_count,
            op.element_count()
        );
        self.commands.push(RenderCommand::Draw(self.draws.len()));
        self.draws.push(DrawRecord {
            material: op.material.to_string(),
            pass: self.pass.clone(),
            shadow_volume: op.is_shadow_volume(),
            vertex_count: op.vertex_count,
            index_count: op.indices.map(|range| range.count),
            render_target: self.render_target,
            stencil_check: self.stencil_check,
            stencil: self.stencil,
            colour_write: self.colour_write,
            depth_check: self.depth_check,
            depth_write: self.depth_write,
            depth_func: self.depth_func,
            culling: self.culling,
            scissor: self.scissor,
            ambient: self.ambient,
            lights: self.lights.clone(),
            shadow_texture: self.shadow_texture.clone(),
            extrusion: self.extrusion,
            receiver: self.receiver,
        });
        Ok(())
    }
}
