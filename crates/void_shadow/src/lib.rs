//! # void_shadow - Shadow Volumes and Shadow Textures
//!
//! Real-time shadows for a 3D scene renderer:
//! - Edge list building and silhouette detection per light
//! - Shadow volume construction with zpass/zfail and hardware extrusion
//! - Stencil shadow rendering with one- or two-sided stencil
//! - Texture shadows with per-light shadow cameras
//! - Illumination stage sequencing with listener hooks
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  ShadowPipelineController                │
//! │   Ambient → PerLight → Decal | RenderToTexture → Receive │
//! ├───────────────────────────┬──────────────────────────────┤
//! │   StencilShadowRenderer   │    TextureShadowRenderer     │
//! │  (volumes, caps, stencil) │  (shadow cameras, receivers) │
//! ├───────────────────────────┴──────────────────────────────┤
//! │ ShadowCasterQuery │ ShadowVolumeBuilder │ EdgeListBuilder │
//! ├──────────────────────────────────────────────────────────┤
//! │         SceneGraph / Entity / StaticGeometry / Mesh      │
//! ├──────────────────────────────────────────────────────────┤
//! │                RenderSystem (backend trait)              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use void_shadow::prelude::*;
//!
//! let mut scene = SceneGraph::new();
//! let mesh = Arc::new(Mesh::new_box("crate", Vec3::ONE, "stone"));
//! scene.add_object(Entity::new("crate", mesh));
//! scene.add_light(Light::directional("sun", Vec3::new(-1.0, -1.0, 0.0)));
//!
//! let mut camera = Camera::perspective("main", 1.0, 16.0 / 9.0, 0.5, 500.0);
//! camera.position = Vec3::new(0.0, 5.0, 15.0);
//! camera.look_at(Vec3::ZERO);
//!
//! let mut rs = HeadlessRenderSystem::new(Capabilities::ALL);
//! let mut frame = FrameContext::new(1280, 720);
//! let mut pipeline = ShadowPipelineController::new(ShadowConfig::stencil_additive(), Vec::new());
//! let stats = pipeline.render_frame(&mut scene, &camera, &mut rs, &mut frame);
//! ```

pub mod animation;
pub mod buffer;
pub mod camera;
pub mod caster;
pub mod config;
pub mod edge;
pub mod entity;
pub mod error;
pub mod frame;
pub mod light;
pub mod material;
pub mod mesh;
pub mod pipeline;
pub mod query;
pub mod queue;
pub mod render_system;
pub mod scene;
pub mod static_geometry;
pub mod stencil;
pub mod texture;
pub mod vertex;
pub mod volume;

// Re-exports
pub use error::{Result, ShadowError};
pub use config::{PixelFormat, ShadowConfig, ShadowTechnique, TextureShadowConfig};
pub use frame::FrameContext;

// Geometry
pub use buffer::{IndexBuffer, IndexType, VertexBuffer};
pub use vertex::{
    IndexData, VertexData, VertexDeclaration, VertexElement, VertexElementSemantic, VertexElementType,
};
pub use edge::{Edge, EdgeData, EdgeGroup, EdgeListBuilder, Triangle};
pub use mesh::{LodLevel, Mesh, SubMesh};
pub use animation::{MorphTarget, VertexAnimation};

// Scene
pub use camera::{Camera, Projection};
pub use light::{Light, LightType};
pub use material::{ColourValue, CullMode, Material, Pass, PassCategory, SceneBlend};
pub use entity::Entity;
pub use static_geometry::StaticGeometry;
pub use scene::{ObjectId, SceneGraph, SceneObject, RENDER_QUEUE_MAIN};

// Shadows
pub use caster::{ShadowCaster, ShadowReceiverParams, ShadowRenderable, ShadowVolumeFlags};
pub use volume::ShadowVolumeBuilder;
pub use query::ShadowCasterQuery;
pub use stencil::{StencilLightStats, StencilShadowRenderer};
pub use texture::{
    DefaultShadowCameraSetup, ShadowCameraSetup, ShadowTexture, TextureShadowRenderer, TextureShadowStats,
};
pub use pipeline::{FrameStats, IlluminationListener, IlluminationStage, ShadowPipelineController};

// Backend
pub use render_system::{
    Capabilities, CompareFunction, DrawRecord, HeadlessRenderSystem, RenderCommand, RenderOperation,
    RenderSystem, StencilOperation, StencilParams,
};

/// Prelude for common imports
pub mod prelude {
    pub use crate::camera::Camera;
    pub use crate::config::{ShadowConfig, ShadowTechnique};
    pub use crate::entity::Entity;
    pub use crate::error::{Result, ShadowError};
    pub use crate::frame::FrameContext;
    pub use crate::light::Light;
    pub use crate::material::{ColourValue, Material};
    pub use crate::mesh::Mesh;
    pub use crate::pipeline::{IlluminationListener, IlluminationStage, ShadowPipelineController};
    pub use crate::render_system::{Capabilities, HeadlessRenderSystem, RenderSystem};
    pub use crate::scene::{ObjectId, SceneGraph};
    pub use void_math::{Mat4, Vec3};
}
