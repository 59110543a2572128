//! Software vertex animation
//!
//! Shadow volumes must be extruded from the positions the object is drawn
//! with, so animated entities blend into their own copy of the vertex data
//! on the CPU. Skinning is driven entirely by the vertex declaration:
//! whatever position, normal, blend index and blend weight elements exist
//! are read through strided views.

use std::sync::Arc;

use void_math::{Mat4, Vec3};

use crate::buffer::{ElementView, ElementViewMut, VertexBuffer};
use crate::error::{Result, ShadowError};
use crate::vertex::{read_vec3s, VertexData, VertexElement, VertexElementSemantic, VertexElementType};

/// Skin `source` into `dest` with already-blended bone matrices
///
/// `blend_index_map` maps the per-vertex blend indices to entries of
/// `bone_matrices`; an empty map means identity. Normals are blended when
/// requested and both sides carry a `Float3` normal element.
pub fn software_vertex_blend(
    source: &VertexData,
    dest: &VertexData,
    bone_matrices: &[Mat4],
    blend_index_map: &[u16],
    blend_normals: bool,
) -> Result<()> {
    let count = source.vertex_count();
    let positions = source.positions()?;

    let normals = if blend_normals {
        match source.element_buffer(VertexElementSemantic::Normal, 0) {
            Some((element, buffer)) if element.element_type == VertexElementType::Float3 => {
                Some(read_vec3s(buffer, &element, count)?)
            }
            _ => None,
        }
    } else {
        None
    };

    let (index_element, index_buffer) = source
        .element_buffer(VertexElementSemantic::BlendIndices, 0)
        .ok_or(ShadowError::MissingElement(VertexElementSemantic::BlendIndices))
        .and_then(|found| expect_type(found, VertexElementType::UByte4))?;
    let (weight_element, weight_buffer) = source
        .element_buffer(VertexElementSemantic::BlendWeights, 0)
        .ok_or(ShadowError::MissingElement(VertexElementSemantic::BlendWeights))?;
    let weights_per_vertex = weight_element.element_type.component_count();

    let mut blended_positions = Vec::with_capacity(count);
    let mut blended_normals = normals.as_ref().map(|_| Vec::with_capacity(count));
    {
        let index_bytes = index_buffer.read();
        let index_view = ElementView::new(
            &index_bytes,
            index_element.offset,
            index_buffer.vertex_size(),
            index_buffer.vertex_count(),
        );
        let weight_bytes = weight_buffer.read();
        let weight_view = ElementView::new(
            &weight_bytes,
            weight_element.offset,
            weight_buffer.vertex_size(),
            weight_buffer.vertex_count(),
        );

        for (i, position) in positions.iter().enumerate() {
            let indices = index_view.read_u8x4(i)?;
            let weights = read_weights(&weight_view, i, weights_per_vertex)?;

            let mut p = Vec3::ZERO;
            let mut n = Vec3::ZERO;
            for (&bone_index, &weight) in indices.iter().zip(&weights).take(weights_per_vertex) {
                if weight == 0.0 {
                    continue;
                }
                let bone = blend_index_map
                    .get(bone_index as usize)
                    .map(|&mapped| mapped as usize)
                    .unwrap_or(bone_index as usize);
                let matrix = bone_matrices.get(bone).ok_or(ShadowError::BufferOutOfRange {
                    index: bone,
                    count: bone_matrices.len(),
                })?;

                p += matrix.transform_point(*position) * weight;
                if let Some(normals) = &normals {
                    n += matrix.transform_vector(normals[i]) * weight;
                }
            }

            blended_positions.push(p);
            if let Some(out) = blended_normals.as_mut() {
                out.push(n.normalize_or_zero());
            }
        }
    }

    dest.write_positions(&blended_positions)?;
    if let Some(normals) = blended_normals {
        write_normals(dest, &normals)?;
    }
    Ok(())
}

/// Linear interpolation between two packed `Float3` position buffers
pub fn software_vertex_morph(
    t: f32,
    from: &VertexBuffer,
    to: &VertexBuffer,
    target: &VertexData,
) -> Result<()> {
    let count = target.vertex_count();
    let read = |buffer: &VertexBuffer| -> Result<Vec<Vec3>> {
        let bytes = buffer.read();
        let view = ElementView::new(&bytes, 0, buffer.vertex_size(), buffer.vertex_count());
        (0..count).map(|i| view.read_vec3(i)).collect()
    };
    let a = read(from)?;
    let b = read(to)?;

    let morphed: Vec<Vec3> = a.iter().zip(&b).map(|(a, b)| a.lerp(*b, t)).collect();
    target.write_positions(&morphed)
}

fn expect_type<'a>(
    (element, buffer): (VertexElement, &'a Arc<VertexBuffer>),
    element_type: VertexElementType,
) -> Result<(VertexElement, &'a Arc<VertexBuffer>)> {
    if element.element_type != element_type {
        return Err(ShadowError::UnsupportedElementType {
            semantic: element.semantic,
            element_type: element.element_type,
        });
    }
    Ok((element, buffer))
}

fn read_weights(view: &ElementView<'_>, index: usize, count: usize) -> Result<[f32; 4]> {
    let mut weights = [0.0; 4];
    match count {
        1 => weights[..1].copy_from_slice(&view.read_f32s::<1>(index)?),
        2 => weights[..2].copy_from_slice(&view.read_f32s::<2>(index)?),
        3 => weights[..3].copy_from_slice(&view.read_f32s::<3>(index)?),
        _ => weights = view.read_f32s::<4>(index)?,
    }
    Ok(weights)
}

fn write_normals(dest: &VertexData, normals: &[Vec3]) -> Result<()> {
    let Some((element, buffer)) = dest.element_buffer(VertexElementSemantic::Normal, 0) else {
        return Ok(());
    };
    if element.element_type != VertexElementType::Float3 {
        return Ok(());
    }
    let count = buffer.vertex_count();
    let mut bytes = buffer.write();
    let mut view = ElementViewMut::new(&mut bytes, element.offset, buffer.vertex_size(), count);
    for (i, normal) in normals.iter().enumerate() {
        view.write_vec3(i, *normal)?;
    }
    Ok(())
}

/// Morph keyframe pair for one vertex set
#[derive(Clone, Debug)]
pub struct MorphTarget {
    pub vertex_set: usize,
    pub from: Arc<VertexBuffer>,
    pub to: Arc<VertexBuffer>,
}

/// Animation state applied to an entity's vertex sets each frame
#[derive(Clone, Debug)]
pub enum VertexAnimation {
    Skeletal {
        bone_matrices: Vec<Mat4>,
        blend_index_map: Vec<u16>,
    },
    Morph {
        targets: Vec<MorphTarget>,
        weight: f32,
    },
}

impl VertexAnimation {
    /// Blend `sources` into the matching `dests` (same vertex set order)
    pub fn apply(&self, sources: &[&VertexData], dests: &[VertexData]) -> Result<()> {
        match self {
            Self::Skeletal { bone_matrices, blend_index_map } => {
                for (source, dest) in sources.iter().zip(dests) {
                    let skinned = source
                        .declaration
                        .find_element(VertexElementSemantic::BlendIndices, 0)
                        .is_some();
                    if skinned {
                        software_vertex_blend(source, dest, bone_matrices, blend_index_map, true)?;
                    } else {
                        dest.write_positions(&source.positions()?)?;
                    }
                }
            }
            Self::Morph { targets, weight } => {
                for target in targets {
                    let dest = dests.get(target.vertex_set).ok_or(ShadowError::BufferOutOfRange {
                        index: target.vertex_set,
                        count: dests.len(),
                    })?;
                    software_vertex_morph(*weight, &target.from, &target.to, dest)?;
                }
            }
        }
        Ok(())
    }
}
