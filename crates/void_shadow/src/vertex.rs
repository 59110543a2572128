//! Vertex declarations and vertex/index data

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use void_math::Vec3;

use crate::buffer::{ElementView, ElementViewMut, IndexBuffer, VertexBuffer};
use crate::error::{Result, ShadowError};

/// Meaning of a vertex element
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexElementSemantic {
    Position,
    Normal,
    BlendWeights,
    BlendIndices,
    Diffuse,
    TexCoords,
}

/// Storage type of a vertex element
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexElementType {
    Float1,
    Float2,
    Float3,
    Float4,
    UByte4,
}

impl VertexElementType {
    pub fn size(self) -> usize {
        match self {
            Self::Float1 | Self::UByte4 => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
        }
    }

    pub fn component_count(self) -> usize {
        match self {
            Self::Float1 => 1,
            Self::Float2 => 2,
            Self::Float3 => 3,
            Self::Float4 | Self::UByte4 => 4,
        }
    }
}

/// One element of a vertex, bound to a buffer source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexElement {
    pub source: u16,
    pub offset: usize,
    pub element_type: VertexElementType,
    pub semantic: VertexElementSemantic,
    pub index: u16,
}

impl VertexElement {
    #[inline]
    pub fn size(&self) -> usize {
        self.element_type.size()
    }
}

/// Vertex layout across one or more buffer sources
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexDeclaration {
    elements: Vec<VertexElement>,
}

impl VertexDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_element(
        &mut self,
        source: u16,
        offset: usize,
        element_type: VertexElementType,
        semantic: VertexElementSemantic,
        index: u16,
    ) -> &mut Self {
        self.elements.push(VertexElement { source, offset, element_type, semantic, index });
        self
    }

    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    pub fn find_element(&self, semantic: VertexElementSemantic, index: u16) -> Option<&VertexElement> {
        self.elements
            .iter()
            .find(|e| e.semantic == semantic && e.index == index)
    }

    pub fn elements_for_source(&self, source: u16) -> impl Iterator<Item = &VertexElement> {
        self.elements.iter().filter(move |e| e.source == source)
    }

    /// Size in bytes of one vertex in the given source
    pub fn vertex_size(&self, source: u16) -> usize {
        self.elements_for_source(source)
            .map(|e| e.offset + e.size())
            .max()
            .unwrap_or(0)
    }

    /// Move an element to another source and offset
    pub fn rebind_element(&mut self, semantic: VertexElementSemantic, index: u16, source: u16, offset: usize) {
        if let Some(element) = self
            .elements
            .iter_mut()
            .find(|e| e.semantic == semantic && e.index == index)
        {
            element.source = source;
            element.offset = offset;
        }
    }

    /// First source number not referenced by any element
    pub fn next_free_source(&self) -> u16 {
        self.elements.iter().map(|e| e.source + 1).max().unwrap_or(0)
    }
}

/// Vertex data: a declaration, its buffer bindings and the vertex count
///
/// After [`VertexData::prepare_for_shadow_volume`] positions live in their
/// own buffer of `2 × vertex_count` entries; the first half holds the
/// original positions and the second half the extruded copies.
#[derive(Clone, Debug)]
pub struct VertexData {
    pub declaration: VertexDeclaration,
    bindings: BTreeMap<u16, Arc<VertexBuffer>>,
    vertex_count: usize,
    extrusion_weights: Option<Arc<VertexBuffer>>,
    prepared_for_shadow: bool,
}

impl VertexData {
    pub fn new(declaration: VertexDeclaration, vertex_count: usize) -> Self {
        Self {
            declaration,
            bindings: BTreeMap::new(),
            vertex_count,
            extrusion_weights: None,
            prepared_for_shadow: false,
        }
    }

    /// Positions only, one tightly packed buffer
    pub fn from_positions(positions: &[Vec3]) -> Self {
        let mut declaration = VertexDeclaration::new();
        declaration.add_element(0, 0, VertexElementType::Float3, VertexElementSemantic::Position, 0);
        let mut data = Self::new(declaration, positions.len());
        data.set_binding(0, Arc::new(VertexBuffer::from_positions(positions)));
        data
    }

    /// Interleaved positions and normals in one buffer
    pub fn from_positions_normals(positions: &[Vec3], normals: &[Vec3]) -> Self {
        let mut declaration = VertexDeclaration::new();
        declaration
            .add_element(0, 0, VertexElementType::Float3, VertexElementSemantic::Position, 0)
            .add_element(0, 12, VertexElementType::Float3, VertexElementSemantic::Normal, 0);

        let mut bytes = Vec::with_capacity(positions.len() * 24);
        for (p, n) in positions.iter().zip(normals) {
            bytes.extend_from_slice(bytemuck::cast_slice(&p.to_array()));
            bytes.extend_from_slice(bytemuck::cast_slice(&n.to_array()));
        }

        let mut data = Self::new(declaration, positions.len().min(normals.len()));
        data.set_binding(0, Arc::new(VertexBuffer::from_bytes(24, bytes)));
        data
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn binding(&self, source: u16) -> Option<&Arc<VertexBuffer>> {
        self.bindings.get(&source)
    }

    pub fn set_binding(&mut self, source: u16, buffer: Arc<VertexBuffer>) {
        self.bindings.insert(source, buffer);
    }

    pub fn unset_binding(&mut self, source: u16) {
        self.bindings.remove(&source);
    }

    /// Element and the buffer it lives in
    pub fn element_buffer(
        &self,
        semantic: VertexElementSemantic,
        index: u16,
    ) -> Option<(VertexElement, &Arc<VertexBuffer>)> {
        let element = *self.declaration.find_element(semantic, index)?;
        let buffer = self.bindings.get(&element.source)?;
        Some((element, buffer))
    }

    /// Position element and buffer
    pub fn position_buffer(&self) -> Result<(VertexElement, &Arc<VertexBuffer>)> {
        let (element, buffer) = self
            .element_buffer(VertexElementSemantic::Position, 0)
            .ok_or(ShadowError::MissingPositions)?;
        if element.element_type != VertexElementType::Float3 {
            return Err(ShadowError::UnsupportedElementType {
                semantic: element.semantic,
                element_type: element.element_type,
            });
        }
        Ok((element, buffer))
    }

    /// Current positions of the `vertex_count` original vertices
    pub fn positions(&self) -> Result<Vec<Vec3>> {
        let (element, buffer) = self.position_buffer()?;
        read_vec3s(buffer, &element, self.vertex_count)
    }

    /// Overwrite the original positions
    ///
    /// When prepared for shadow volumes the extruded half is refreshed with
    /// the same positions, ready for the vertex stage to extrude.
    pub fn write_positions(&self, positions: &[Vec3]) -> Result<()> {
        let (element, buffer) = self.position_buffer()?;
        let count = buffer.vertex_count();
        let mut bytes = buffer.write();
        let mut view = ElementViewMut::new(&mut bytes, element.offset, buffer.vertex_size(), count);
        for (i, p) in positions.iter().enumerate().take(self.vertex_count) {
            view.write_vec3(i, *p)?;
            if self.prepared_for_shadow {
                view.write_vec3(i + self.vertex_count, *p)?;
            }
        }
        Ok(())
    }

    #[inline]
    pub fn is_prepared_for_shadow_volumes(&self) -> bool {
        self.prepared_for_shadow
    }

    /// Per-vertex extrusion weights for the vertex stage (1 original, 0 extruded)
    pub fn extrusion_weights(&self) -> Option<&Arc<VertexBuffer>> {
        self.extrusion_weights.as_ref()
    }

    /// Move positions into their own buffer of `2 × vertex_count` entries
    ///
    /// The first half keeps the original positions, the second half starts
    /// as a copy and is overwritten by extrusion. Also creates the extrusion
    /// weight stream for hardware extrusion. Calling this twice is a no-op.
    pub fn prepare_for_shadow_volume(&mut self) -> Result<()> {
        if self.prepared_for_shadow {
            return Ok(());
        }

        let positions = self.positions()?;
        let n = self.vertex_count;
        let (element, _) = self.position_buffer()?;
        let old_source = element.source;

        let shadow_positions = VertexBuffer::new(12, n * 2);
        {
            let mut bytes = shadow_positions.write_discard();
            let mut view = ElementViewMut::new(&mut bytes, 0, 12, n * 2);
            for (i, p) in positions.iter().enumerate() {
                view.write_vec3(i, *p)?;
                view.write_vec3(i + n, *p)?;
            }
        }

        let weights = VertexBuffer::new(4, n * 2);
        {
            let mut bytes = weights.write_discard();
            let mut view = ElementViewMut::new(&mut bytes, 0, 4, n * 2);
            for i in 0..n {
                view.write_f32s(i, &[1.0])?;
            }
        }

        let new_source = self.declaration.next_free_source();
        self.declaration
            .rebind_element(VertexElementSemantic::Position, 0, new_source, 0);
        if self.declaration.elements_for_source(old_source).next().is_none() {
            self.unset_binding(old_source);
        }
        self.set_binding(new_source, Arc::new(shadow_positions));
        self.extrusion_weights = Some(Arc::new(weights));
        self.prepared_for_shadow = true;

        log::trace!(
            "Prepared vertex data for shadow volumes: {} vertices, position source {} -> {}",
            n,
            old_source,
            new_source
        );
        Ok(())
    }

    /// Copy with every buffer duplicated, for per-instance animation
    pub fn duplicate(&self) -> Self {
        Self {
            declaration: self.declaration.clone(),
            bindings: self
                .bindings
                .iter()
                .map(|(source, buffer)| (*source, Arc::new(buffer.duplicate())))
                .collect(),
            vertex_count: self.vertex_count,
            extrusion_weights: self.extrusion_weights.clone(),
            prepared_for_shadow: self.prepared_for_shadow,
        }
    }
}

/// Read `count` `Float3` elements
pub(crate) fn read_vec3s(buffer: &VertexBuffer, element: &VertexElement, count: usize) -> Result<Vec<Vec3>> {
    let bytes = buffer.read();
    let view = ElementView::new(&bytes, element.offset, buffer.vertex_size(), buffer.vertex_count());
    (0..count).map(|i| view.read_vec3(i)).collect()
}

/// Range of an index buffer
#[derive(Clone, Debug)]
pub struct IndexData {
    pub buffer: Arc<IndexBuffer>,
    pub index_start: usize,
    pub index_count: usize,
}

impl IndexData {
    pub fn new(buffer: Arc<IndexBuffer>) -> Self {
        let index_count = buffer.index_count();
        Self { buffer, index_start: 0, index_count }
    }

    pub fn from_u16(indices: &[u16]) -> Self {
        Self::new(Arc::new(IndexBuffer::from_u16(indices)))
    }

    pub fn from_u32(indices: &[u32]) -> Self {
        Self::new(Arc::new(IndexBuffer::from_u32(indices)))
    }

    /// Indices in range, widened to 32 bits
    pub fn indices(&self) -> Result<Vec<u32>> {
        self.buffer.read_indices(self.index_start, self.index_count)
    }
}
