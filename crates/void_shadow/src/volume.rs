//! Shadow volume construction
//!
//! Turns an object's edge list and current vertex positions into extruded
//! shadow volume geometry for one light:
//!
//! 1. classify every triangle as light-facing or not,
//! 2. find silhouette edges and emit one outward-wound quad per edge,
//! 3. optionally close the volume with a light cap (the lit triangles) and
//!    a dark cap (the lit triangles extruded, winding reversed),
//! 4. extrude the second half of the doubled position buffer on the CPU,
//!    or leave that to a vertex program with per-vertex extrusion weights.
//!
//! All indices go into the shared 16-bit shadow index buffer, rewritten
//! from the start for every caster.

use void_math::{Mat4, Vec3, Vec4, AABB};

use crate::buffer::{ElementViewMut, IndexType};
use crate::caster::{ExtrusionProgram, ShadowExtrusionParams, ShadowRenderable, ShadowVolumeFlags, ShadowVolumeRequest};
use crate::edge::EdgeData;
use crate::error::{Result, ShadowError};
use crate::vertex::{IndexData, VertexData};

/// Largest source vertex count whose doubled buffer fits 16-bit indices
pub const MAX_SHADOW_SOURCE_VERTICES: usize = 32767;

/// Object geometry a shadow volume is built from
pub struct VolumeSource<'a> {
    /// Reported when rendering the volume fails
    pub material: &'a str,
    /// Edge list owned by the caster; facing state is updated in place
    pub edges: &'a mut EdgeData,
    /// Current vertex sets, in edge group `vertex_set` order
    pub vertex_sets: &'a [&'a VertexData],
    pub world_transform: Mat4,
}

/// Stateless shadow volume generation
pub struct ShadowVolumeBuilder;

impl ShadowVolumeBuilder {
    /// Reject index data shadow volumes cannot address
    pub fn check_index_format<'a>(
        index_data: impl IntoIterator<Item = &'a IndexData>,
        vertex_sets: &[&VertexData],
    ) -> Result<()> {
        for data in index_data {
            let index_type = data.buffer.index_type();
            if index_type != IndexType::U16 {
                return Err(ShadowError::UnsupportedIndexFormat(index_type));
            }
        }
        for vertex_data in vertex_sets {
            let count = vertex_data.vertex_count();
            if count > MAX_SHADOW_SOURCE_VERTICES {
                return Err(ShadowError::VertexCountTooLarge {
                    count,
                    max: MAX_SHADOW_SOURCE_VERTICES,
                });
            }
        }
        Ok(())
    }

    /// Write extruded copies of `[0, n)` into `[n, 2n)` of the shadow positions
    ///
    /// `light_pos` is the homogeneous light position in the same space as
    /// the vertices.
    pub fn extrude_vertices(vertex_data: &VertexData, light_pos: Vec4, distance: f32) -> Result<()> {
        if !vertex_data.is_prepared_for_shadow_volumes() {
            return Err(ShadowError::NotPreparedForShadowVolumes);
        }
        let (element, buffer) = vertex_data.position_buffer()?;
        let n = vertex_data.vertex_count();

        let mut bytes = buffer.write();
        let mut view = ElementViewMut::new(&mut bytes, element.offset, buffer.vertex_size(), buffer.vertex_count());
        for i in 0..n {
            let v = view.read_vec3(i)?;
            view.write_vec3(i + n, extrude_point(v, light_pos, distance))?;
        }
        Ok(())
    }

    /// Bounds of a box's corners pushed away from the light
    pub fn extrude_bounds(aabb: &AABB, light_pos: Vec4, distance: f32) -> AABB {
        if aabb.is_empty() {
            return *aabb;
        }
        aabb.corners()
            .iter()
            .fold(AABB::EMPTY, |acc, corner| {
                acc.expand_to_include(extrude_point(*corner, light_pos, distance))
            })
    }

    /// Build the shadow renderables of one object, one per edge group
    ///
    /// `extrusion_distance` is in world space.
    pub fn build_shadow_renderables(
        source: VolumeSource<'_>,
        request: &ShadowVolumeRequest<'_>,
        extrusion_distance: f32,
    ) -> Result<Vec<ShadowRenderable>> {
        let VolumeSource {
            material,
            edges,
            vertex_sets,
            world_transform,
        } = source;

        for vertex_data in vertex_sets {
            if !vertex_data.is_prepared_for_shadow_volumes() {
                return Err(ShadowError::NotPreparedForShadowVolumes);
            }
        }

        let inv_world = world_transform.inverse();
        let light_pos = inv_world * request.light.as_vec4();
        let distance = extrusion_distance * inv_world.min_axis_scale();
        let directional = request.light.is_directional();
        let hardware = request.hardware_extrusion;
        let infinite = hardware && request.flags.contains(ShadowVolumeFlags::EXTRUDE_TO_INFINITY);

        for (set, vertex_data) in vertex_sets.iter().enumerate() {
            if edges.groups.iter().any(|group| group.vertex_set == set) {
                edges.update_face_normals(set, &vertex_data.positions()?)?;
            }
        }
        edges.update_triangle_light_facing(light_pos);

        if !hardware {
            for vertex_data in vertex_sets {
                Self::extrude_vertices(vertex_data, light_pos, distance)?;
            }
        }

        let extrusion = hardware.then(|| {
            ShadowExtrusionParams::new(
                light_pos.to_array(),
                distance,
                ExtrusionProgram::select(directional, infinite),
            )
        });

        let mut indices: Vec<u16> = Vec::new();
        let mut renderables = Vec::with_capacity(edges.groups.len());
        for group in &edges.groups {
            let vertex_data = vertex_sets.get(group.vertex_set).ok_or(ShadowError::BufferOutOfRange {
                index: group.vertex_set,
                count: vertex_sets.len(),
            })?;
            let (_, positions) = vertex_data.position_buffer()?;
            let n = group.vertex_count as u32;
            let push = |indices: &mut Vec<u16>, i: u32| indices.push(i as u16);

            let start = indices.len();
            for edge in edges.silhouette_edges(group) {
                let [mut v0, mut v1] = edge.vert_index;
                if !edges.light_facing[edge.tri_index] {
                    std::mem::swap(&mut v0, &mut v1);
                }
                push(&mut indices, v1);
                push(&mut indices, v0);
                push(&mut indices, v0 + n);
                // Both far points meet at infinity
                if !(directional && infinite) {
                    push(&mut indices, v0 + n);
                    push(&mut indices, v1 + n);
                    push(&mut indices, v1);
                }
            }

            let lit_triangles = || {
                group
                    .triangle_range()
                    .filter(|&t| edges.light_facing[t])
                    .map(|t| edges.triangles[t].vert_index)
            };

            if request.flags.contains(ShadowVolumeFlags::INCLUDE_DARK_CAP) && !(directional && infinite) {
                for [v0, v1, v2] in lit_triangles() {
                    push(&mut indices, v1 + n);
                    push(&mut indices, v0 + n);
                    push(&mut indices, v2 + n);
                }
            }

            let include_light_cap = request.flags.contains(ShadowVolumeFlags::INCLUDE_LIGHT_CAP);
            if include_light_cap && !hardware {
                for [v0, v1, v2] in lit_triangles() {
                    push(&mut indices, v0);
                    push(&mut indices, v1);
                    push(&mut indices, v2);
                }
            }

            let weights = if hardware {
                vertex_data.extrusion_weights().cloned()
            } else {
                None
            };
            let mut renderable = ShadowRenderable::new(material, positions.clone(), weights, world_transform);
            renderable.set_index_range(start, indices.len() - start);
            renderable.set_extrusion_params(extrusion);

            if include_light_cap && hardware {
                let cap_start = indices.len();
                for [v0, v1, v2] in lit_triangles() {
                    push(&mut indices, v0);
                    push(&mut indices, v1);
                    push(&mut indices, v2);
                }
                let mut cap = renderable.sibling();
                cap.set_index_range(cap_start, indices.len() - cap_start);
                renderable.set_light_cap(Some(cap));
            }

            renderables.push(renderable);
        }

        request.index_buffer.replace_u16(&indices)?;
        log::trace!(
            "Shadow volume for '{}': {} groups, {} indices{}",
            material,
            renderables.len(),
            indices.len(),
            if hardware { " (hardware extrusion)" } else { "" }
        );
        Ok(renderables)
    }
}

/// Push a point away from a homogeneous light position
#[inline]
fn extrude_point(v: Vec3, light_pos: Vec4, distance: f32) -> Vec3 {
    let direction = (v * light_pos.w - light_pos.xyz()).normalize_or_zero();
    v + direction * distance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::IndexBuffer;
    use crate::frame::FrameContext;
    use crate::light::Light;
    use crate::mesh::Mesh;
    use approx::assert_relative_eq;

    fn prepared_cube() -> Mesh {
        let mut mesh = Mesh::new_box("cube", Vec3::ONE, "stone");
        mesh.prepare_for_shadow_volume().unwrap();
        mesh
    }

    fn build(
        mesh: &Mesh,
        light: &Light,
        flags: ShadowVolumeFlags,
        hardware: bool,
        world: Mat4,
        index_buffer: &IndexBuffer,
    ) -> Result<Vec<ShadowRenderable>> {
        let mut edges = (*mesh.edge_list(0)?).clone();
        let sets = mesh.vertex_sets(0)?;
        let frame = FrameContext::default();
        let request = ShadowVolumeRequest {
            light,
            index_buffer,
            flags,
            directional_extrusion_distance: 10.0,
            hardware_extrusion: hardware,
            frame: &frame,
        };
        let source = VolumeSource {
            material: "stone",
            edges: &mut edges,
            vertex_sets: &sets,
            world_transform: world,
        };
        ShadowVolumeBuilder::build_shadow_renderables(source, &request, 10.0)
    }

    #[test]
    fn test_software_directional_volume() {
        let mesh = prepared_cube();
        let light = Light::directional("sun", Vec3::NEG_Y);
        let indices = IndexBuffer::new(IndexType::U16, 1024);
        let flags = ShadowVolumeFlags::INCLUDE_LIGHT_CAP | ShadowVolumeFlags::INCLUDE_DARK_CAP;

        let renderables = build(&mesh, &light, flags, false, Mat4::IDENTITY, &indices).unwrap();
        assert_eq!(renderables.len(), 1);
        let volume = &renderables[0];
        // 4 silhouette quads, 2 dark cap and 2 light cap triangles
        assert_eq!(volume.index_range(), (0, 4 * 6 + 6 + 6));
        assert_eq!(volume.vertex_count(), 16);
        assert!(volume.light_cap().is_none());
        assert!(volume.extrusion_params().is_none());

        // Top corner (vertex 6) extruded straight down by the distance
        let positions = mesh.vertex_sets(0).unwrap()[0].position_buffer().unwrap().1.clone();
        let bytes = positions.read();
        let view = crate::buffer::ElementView::new(&bytes, 0, 12, 16);
        assert_eq!(view.read_vec3(6 + 8).unwrap(), Vec3::new(1.0, -9.0, 1.0));

        // Dark cap reverses the winding of the lit triangle (3, 7, 6)
        let written = indices.read_indices(24, 6).unwrap();
        assert_eq!(&written[..3], &[7 + 8, 3 + 8, 6 + 8]);
        let light_cap = indices.read_indices(30, 6).unwrap();
        assert_eq!(&light_cap[..3], &[3, 7, 6]);
    }

    #[test]
    fn test_quads_are_wound_outward() {
        let mesh = prepared_cube();
        let light = Light::directional("sun", Vec3::NEG_Y);
        let indices = IndexBuffer::new(IndexType::U16, 1024);
        build(&mesh, &light, ShadowVolumeFlags::NONE, false, Mat4::IDENTITY, &indices).unwrap();

        let sets = mesh.vertex_sets(0).unwrap();
        let (_, buffer) = sets[0].position_buffer().unwrap();
        let bytes = buffer.read();
        let view = crate::buffer::ElementView::new(&bytes, 0, 12, 16);
        let written = indices.read_indices(0, 24).unwrap();
        for tri in written.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| view.read_vec3(i as usize).unwrap());
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            // Side walls face away from the vertical axis of the cube
            assert!(normal.dot(Vec3::new(centroid.x, 0.0, centroid.z)) > 0.0);
        }
    }

    #[test]
    fn test_hardware_infinite_directional() {
        let mesh = prepared_cube();
        let light = Light::directional("sun", Vec3::NEG_Y);
        let indices = IndexBuffer::new(IndexType::U16, 1024);
        let flags = ShadowVolumeFlags::INCLUDE_LIGHT_CAP
            | ShadowVolumeFlags::INCLUDE_DARK_CAP
            | ShadowVolumeFlags::EXTRUDE_TO_INFINITY;

        let renderables = build(&mesh, &light, flags, true, Mat4::IDENTITY, &indices).unwrap();
        let volume = &renderables[0];
        // One triangle per silhouette, no dark cap, separate light cap
        assert_eq!(volume.index_range(), (0, 12));
        let cap = volume.light_cap().unwrap();
        assert_eq!(cap.index_range(), (12, 6));
        assert!(volume.extrusion_weights().is_some());

        let params = volume.extrusion_params().unwrap();
        assert_eq!(params.program, ExtrusionProgram::DirectionalInfinite.id());
        assert_eq!(params.light_position, [0.0, 1.0, 0.0, 0.0]);

        // Extruded half untouched on the hardware path
        let sets = mesh.vertex_sets(0).unwrap();
        let (_, buffer) = sets[0].position_buffer().unwrap();
        let bytes = buffer.read();
        let view = crate::buffer::ElementView::new(&bytes, 0, 12, 16);
        assert_eq!(view.read_vec3(6 + 8).unwrap(), Vec3::ONE);
    }

    #[test]
    fn test_object_space_distance_and_light() {
        let mesh = prepared_cube();
        let light = Light::point("lamp", Vec3::new(0.0, 20.0, 0.0), 100.0);
        let indices = IndexBuffer::new(IndexType::U16, 1024);
        let world = Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0)) * Mat4::from_scale(Vec3::splat(2.0));

        let renderables = build(&mesh, &light, ShadowVolumeFlags::NONE, true, world, &indices).unwrap();
        let params = renderables[0].extrusion_params().unwrap();
        assert_relative_eq!(params.extrusion_distance, 5.0, epsilon = 1e-5);
        assert_relative_eq!(params.light_position[1], 5.0, epsilon = 1e-5);
        assert_relative_eq!(params.light_position[3], 1.0, epsilon = 1e-5);
        assert_eq!(params.program, ExtrusionProgram::PointFinite.id());
    }

    #[test]
    fn test_overflow_and_unprepared() {
        let mesh = prepared_cube();
        let light = Light::directional("sun", Vec3::NEG_Y);
        let small = IndexBuffer::new(IndexType::U16, 12);
        let err = build(&mesh, &light, ShadowVolumeFlags::NONE, false, Mat4::IDENTITY, &small).unwrap_err();
        assert!(matches!(err, ShadowError::IndexBufferOverflow { required: 24, capacity: 12 }));

        let raw = Mesh::new_box("raw", Vec3::ONE, "stone");
        let indices = IndexBuffer::new(IndexType::U16, 1024);
        let err = build(&raw, &light, ShadowVolumeFlags::NONE, false, Mat4::IDENTITY, &indices).unwrap_err();
        assert!(matches!(err, ShadowError::NotPreparedForShadowVolumes));
    }

    #[test]
    fn test_check_index_format() {
        let vertices = VertexData::from_positions(&[Vec3::ZERO, Vec3::X, Vec3::Y]);
        let wide = IndexData::from_u32(&[0, 1, 2]);
        let err = ShadowVolumeBuilder::check_index_format([&wide], &[&vertices]).unwrap_err();
        assert!(matches!(err, ShadowError::UnsupportedIndexFormat(IndexType::U32)));

        let narrow = IndexData::from_u16(&[0, 1, 2]);
        assert!(ShadowVolumeBuilder::check_index_format([&narrow], &[&vertices]).is_ok());

        let big = VertexData::from_positions(&vec![Vec3::ZERO; MAX_SHADOW_SOURCE_VERTICES + 1]);
        let err = ShadowVolumeBuilder::check_index_format([&narrow], &[&big]).unwrap_err();
        assert!(matches!(err, ShadowError::VertexCountTooLarge { count: 32768, .. }));
    }

    #[test]
    fn test_extrude_bounds_uses_far_corners() {
        let aabb = AABB::new(Vec3::splat(-1.0), Vec3::ONE);
        let bounds = ShadowVolumeBuilder::extrude_bounds(&aabb, Vec4::new(0.0, 1.0, 0.0, 0.0), 10.0);
        assert_eq!(bounds.min, Vec3::new(-1.0, -11.0, -1.0));
        assert_eq!(bounds.max, Vec3::new(1.0, -9.0, 1.0));
    }
}
