//! CPU-side hardware buffers
//!
//! Vertex and index buffers own their bytes behind a `parking_lot::RwLock`.
//! Three lock modes are exposed:
//!
//! - [`VertexBuffer::read`]: read-only, for sampling positions
//! - [`VertexBuffer::write_discard`]: whole-buffer replacement, previous
//!   contents are zeroed
//! - [`VertexBuffer::write`]: in-place writes that keep existing contents
//!
//! Guards are RAII and cannot outlive the buffer borrow. Callers address
//! data in elements; byte strides only appear inside [`ElementView`] and
//! [`ElementViewMut`].

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use void_math::Vec3;

use crate::error::{Result, ShadowError};

pub type BufferReadGuard<'a> = RwLockReadGuard<'a, Vec<u8>>;
pub type BufferWriteGuard<'a> = RwLockWriteGuard<'a, Vec<u8>>;

/// Vertex buffer of fixed-size vertices
#[derive(Debug)]
pub struct VertexBuffer {
    vertex_size: usize,
    vertex_count: usize,
    data: RwLock<Vec<u8>>,
}

impl VertexBuffer {
    /// Create a zero-filled buffer
    pub fn new(vertex_size: usize, vertex_count: usize) -> Self {
        Self {
            vertex_size,
            vertex_count,
            data: RwLock::new(vec![0; vertex_size * vertex_count]),
        }
    }

    /// Create a buffer from raw bytes; trailing partial vertices are dropped
    pub fn from_bytes(vertex_size: usize, mut bytes: Vec<u8>) -> Self {
        let vertex_count = if vertex_size == 0 { 0 } else { bytes.len() / vertex_size };
        bytes.truncate(vertex_count * vertex_size);
        Self {
            vertex_size,
            vertex_count,
            data: RwLock::new(bytes),
        }
    }

    /// Create a tightly packed `Float3` buffer
    pub fn from_positions(positions: &[Vec3]) -> Self {
        let mut bytes = Vec::with_capacity(positions.len() * 12);
        for p in positions {
            bytes.extend_from_slice(bytemuck::cast_slice(&p.to_array()));
        }
        Self::from_bytes(12, bytes)
    }

    #[inline]
    pub fn vertex_size(&self) -> usize {
        self.vertex_size
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.vertex_size * self.vertex_count
    }

    /// Read-only lock
    pub fn read(&self) -> BufferReadGuard<'_> {
        self.data.read()
    }

    /// Normal lock, contents preserved
    pub fn write(&self) -> BufferWriteGuard<'_> {
        self.data.write()
    }

    /// Discard lock, contents zeroed
    pub fn write_discard(&self) -> BufferWriteGuard<'_> {
        let mut guard = self.data.write();
        guard.fill(0);
        guard
    }

    /// Deep copy of the buffer contents
    pub fn duplicate(&self) -> Self {
        Self::from_bytes(self.vertex_size, self.read().clone())
    }
}

/// Index width
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    #[inline]
    pub fn size(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Index buffer of 16 or 32-bit indices
#[derive(Debug)]
pub struct IndexBuffer {
    index_type: IndexType,
    index_count: usize,
    data: RwLock<Vec<u8>>,
}

impl IndexBuffer {
    /// Create a zero-filled buffer
    pub fn new(index_type: IndexType, index_count: usize) -> Self {
        Self {
            index_type,
            index_count,
            data: RwLock::new(vec![0; index_type.size() * index_count]),
        }
    }

    pub fn from_u16(indices: &[u16]) -> Self {
        Self {
            index_type: IndexType::U16,
            index_count: indices.len(),
            data: RwLock::new(bytemuck::cast_slice(indices).to_vec()),
        }
    }

    pub fn from_u32(indices: &[u32]) -> Self {
        Self {
            index_type: IndexType::U32,
            index_count: indices.len(),
            data: RwLock::new(bytemuck::cast_slice(indices).to_vec()),
        }
    }

    #[inline]
    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    #[inline]
    pub fn index_count(&self) -> usize {
        self.index_count
    }

    pub fn read(&self) -> BufferReadGuard<'_> {
        self.data.read()
    }

    pub fn write(&self) -> BufferWriteGuard<'_> {
        self.data.write()
    }

    pub fn write_discard(&self) -> BufferWriteGuard<'_> {
        let mut guard = self.data.write();
        guard.fill(0);
        guard
    }

    /// Read `count` indices starting at `start`, widened to 32 bits
    pub fn read_indices(&self, start: usize, count: usize) -> Result<Vec<u32>> {
        let end = start + count;
        if end > self.index_count {
            return Err(ShadowError::BufferOutOfRange {
                index: end.saturating_sub(1),
                count: self.index_count,
            });
        }

        let size = self.index_type.size();
        let bytes = self.read();
        let range = &bytes[start * size..end * size];
        let indices = match self.index_type {
            IndexType::U16 => range
                .chunks_exact(2)
                .map(|c| u32::from(bytemuck::pod_read_unaligned::<u16>(c)))
                .collect(),
            IndexType::U32 => range
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<u32>)
                .collect(),
        };
        Ok(indices)
    }

    /// Replace the front of a 16-bit buffer through a discard lock
    pub fn replace_u16(&self, indices: &[u16]) -> Result<()> {
        if self.index_type != IndexType::U16 {
            return Err(ShadowError::UnsupportedIndexFormat(self.index_type));
        }
        if indices.len() > self.index_count {
            return Err(ShadowError::IndexBufferOverflow {
                required: indices.len(),
                capacity: self.index_count,
            });
        }

        let mut guard = self.write_discard();
        guard[..indices.len() * 2].copy_from_slice(bytemuck::cast_slice(indices));
        Ok(())
    }
}

/// Bounds-checked strided view over locked bytes
pub struct ElementView<'a> {
    bytes: &'a [u8],
    offset: usize,
    stride: usize,
    count: usize,
}

impl<'a> ElementView<'a> {
    pub fn new(bytes: &'a [u8], offset: usize, stride: usize, count: usize) -> Self {
        Self { bytes, offset, stride, count }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn range(&self, index: usize, size: usize) -> Result<std::ops::Range<usize>> {
        let start = self.offset + index * self.stride;
        let end = start + size;
        if index >= self.count || end > self.bytes.len() {
            return Err(ShadowError::BufferOutOfRange { index, count: self.count });
        }
        Ok(start..end)
    }

    /// Read `N` consecutive floats of element `index`
    pub fn read_f32s<const N: usize>(&self, index: usize) -> Result<[f32; N]> {
        let range = self.range(index, N * 4)?;
        let mut out = [0.0; N];
        for (value, chunk) in out.iter_mut().zip(self.bytes[range].chunks_exact(4)) {
            *value = bytemuck::pod_read_unaligned(chunk);
        }
        Ok(out)
    }

    pub fn read_vec3(&self, index: usize) -> Result<Vec3> {
        self.read_f32s::<3>(index).map(Vec3::from_array)
    }

    pub fn read_u8x4(&self, index: usize) -> Result<[u8; 4]> {
        let range = self.range(index, 4)?;
        let mut out = [0; 4];
        out.copy_from_slice(&self.bytes[range]);
        Ok(out)
    }
}

/// Mutable counterpart of [`ElementView`]
pub struct ElementViewMut<'a> {
    bytes: &'a mut [u8],
    offset: usize,
    stride: usize,
    count: usize,
}

impl<'a> ElementViewMut<'a> {
    pub fn new(bytes: &'a mut [u8], offset: usize, stride: usize, count: usize) -> Self {
        Self { bytes, offset, stride, count }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn range(&self, index: usize, size: usize) -> Result<std::ops::Range<usize>> {
        let start = self.offset + index * self.stride;
        let end = start + size;
        if index >= self.count || end > self.bytes.len() {
            return Err(ShadowError::BufferOutOfRange { index, count: self.count });
        }
        Ok(start..end)
    }

    pub fn read_vec3(&self, index: usize) -> Result<Vec3> {
        let range = self.range(index, 12)?;
        let mut out = [0.0f32; 3];
        for (value, chunk) in out.iter_mut().zip(self.bytes[range].chunks_exact(4)) {
            *value = bytemuck::pod_read_unaligned(chunk);
        }
        Ok(Vec3::from_array(out))
    }

    pub fn write_f32s(&mut self, index: usize, values: &[f32]) -> Result<()> {
        let range = self.range(index, values.len() * 4)?;
        self.bytes[range].copy_from_slice(bytemuck::cast_slice(values));
        Ok(())
    }

    pub fn write_vec3(&mut self, index: usize, value: Vec3) -> Result<()> {
        self.write_f32s(index, &value.to_array())
    }
}
