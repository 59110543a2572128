//! Error types for the shadow system

use thiserror::Error;

use crate::buffer::IndexType;
use crate::vertex::{VertexElementSemantic, VertexElementType};

/// Shadow system errors
#[derive(Debug, Error)]
pub enum ShadowError {
    /// Shadow volumes only address vertices through 16-bit indices
    #[error("Unsupported index format for shadow volumes: {0:?} (only 16-bit indices are supported)")]
    UnsupportedIndexFormat(IndexType),

    /// Doubled vertex count would not fit in a 16-bit index
    #[error("Too many vertices for shadow volumes: {count} (maximum {max})")]
    VertexCountTooLarge { count: usize, max: usize },

    /// LOD index past the mesh's LOD levels
    #[error("LOD index {lod} out of range ({count} levels)")]
    LodOutOfRange { lod: usize, count: usize },

    /// Element or index access past the end of a buffer
    #[error("Index {index} out of range for buffer of {count} elements")]
    BufferOutOfRange { index: usize, count: usize },

    /// Vertex data without a position element
    #[error("Vertex data has no position element")]
    MissingPositions,

    /// Required vertex element absent from the declaration
    #[error("Vertex data has no {0:?} element")]
    MissingElement(VertexElementSemantic),

    /// Element present but stored in a type the reader cannot handle
    #[error("Vertex element {semantic:?} has unsupported type {element_type:?}")]
    UnsupportedElementType {
        semantic: VertexElementSemantic,
        element_type: VertexElementType,
    },

    /// Shadow index buffer too small for one caster's volume
    #[error("Shadow index buffer overflow: {required} indices required, capacity {capacity}")]
    IndexBufferOverflow { required: usize, capacity: usize },

    /// Position buffer has not been doubled for extrusion
    #[error("Vertex data has not been prepared for shadow volumes")]
    NotPreparedForShadowVolumes,

    /// Device failed to render with a material
    #[error("Rendering with material '{material}' failed: {reason}")]
    RenderFailed { material: String, reason: String },

    /// Invalid configuration
    #[error("Invalid shadow configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for shadow operations
pub type Result<T> = std::result::Result<T, ShadowError>;
