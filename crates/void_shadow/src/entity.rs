//! Mesh instances placed in the scene

use std::sync::Arc;

use void_math::{Mat4, AABB};

use crate::animation::VertexAnimation;
use crate::caster::{ShadowCaster, ShadowRenderable, ShadowVolumeRequest};
use crate::edge::EdgeData;
use crate::error::Result;
use crate::frame::FrameContext;
use crate::mesh::Mesh;
use crate::render_system::{IndexRange, RenderOperation, VertexSource};
use crate::vertex::VertexData;
use crate::volume::{ShadowVolumeBuilder, VolumeSource};

/// Edge list copy whose facing state this entity updates
#[derive(Debug)]
struct EdgeCache {
    lod: usize,
    generation: u64,
    edges: Arc<EdgeData>,
}

/// Instance of a mesh with its own transform, LOD and animation
#[derive(Debug)]
pub struct Entity {
    name: String,
    mesh: Arc<Mesh>,
    transform: Mat4,
    lod: usize,
    cast_shadows: bool,
    visible: bool,
    animation: Option<VertexAnimation>,
    /// Blended vertex sets, same order as the mesh's vertex sets
    blended: Vec<VertexData>,
    blended_frame: Option<u64>,
    edge_cache: Option<EdgeCache>,
}

impl Entity {
    pub fn new(name: impl Into<String>, mesh: Arc<Mesh>) -> Self {
        Self {
            name: name.into(),
            mesh,
            transform: Mat4::IDENTITY,
            lod: 0,
            cast_shadows: true,
            visible: true,
            animation: None,
            blended: Vec::new(),
            blended_frame: None,
            edge_cache: None,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    pub fn lod(&self) -> usize {
        self.lod
    }

    /// Switch detail level; clamped to the mesh's LOD count
    pub fn set_lod(&mut self, lod: usize) {
        let lod = lod.min(self.mesh.lod_count() - 1);
        if lod != self.lod {
            self.lod = lod;
            self.blended.clear();
            self.blended_frame = None;
        }
    }

    pub fn set_cast_shadows(&mut self, cast: bool) {
        self.cast_shadows = cast;
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn animation(&self) -> Option<&VertexAnimation> {
        self.animation.as_ref()
    }

    pub fn set_animation(&mut self, animation: Option<VertexAnimation>) {
        if animation.is_none() {
            self.blended.clear();
        }
        self.animation = animation;
        self.blended_frame = None;
    }

    /// Blend animated vertex sets, at most once per frame
    pub fn update_animation(&mut self, frame: &FrameContext) -> Result<()> {
        let Some(animation) = &self.animation else {
            return Ok(());
        };
        if self.blended_frame == Some(frame.frame_number()) {
            return Ok(());
        }

        let sources = self.mesh.vertex_sets(self.lod)?;
        if self.blended.len() != sources.len() {
            self.blended = sources.iter().map(|data| data.duplicate()).collect();
        }
        animation.apply(&sources, &self.blended)?;
        self.blended_frame = Some(frame.frame_number());
        Ok(())
    }

    /// Vertex sets as currently drawn
    pub fn vertex_sets(&self) -> Result<Vec<&VertexData>> {
        if self.animation.is_some() && !self.blended.is_empty() {
            return Ok(self.blended.iter().collect());
        }
        self.mesh.vertex_sets(self.lod)
    }

    /// Draws for every submesh at the current LOD
    pub fn render_operations(&self) -> Result<Vec<RenderOperation<'_>>> {
        let (source_mesh, source_lod) = self.geometry_source()?;
        let sets = self.vertex_sets()?;
        let shared = usize::from(source_mesh.shared_vertex_data.is_some());

        let mut owned = 0;
        let mut ops = Vec::with_capacity(source_mesh.submeshes().len());
        for submesh in source_mesh.submeshes() {
            let set = if submesh.uses_shared_vertices() {
                0
            } else {
                owned += 1;
                shared + owned - 1
            };
            let Some(vertex_data) = sets.get(set) else {
                continue;
            };
            let index_data = submesh.index_data_for_lod(source_lod);
            ops.push(RenderOperation {
                vertices: VertexSource::Data(vertex_data),
                vertex_count: vertex_data.vertex_count(),
                indices: Some(IndexRange {
                    buffer: &index_data.buffer,
                    start: index_data.index_start,
                    count: index_data.index_count,
                }),
                material: &submesh.material_name,
            });
        }
        Ok(ops)
    }

    /// Mesh and LOD providing geometry at the current detail level
    fn geometry_source(&self) -> Result<(&Mesh, usize)> {
        let mesh = self.mesh.lod_mesh(self.lod)?;
        let lod = if std::ptr::eq(mesh, self.mesh.as_ref()) { self.lod } else { 0 };
        Ok((mesh, lod))
    }

    /// Refetch the mesh's edge list when LOD or topology changed
    fn refresh_edge_cache(&mut self) -> Result<()> {
        let generation = self.geometry_source()?.0.generation();
        let fresh = matches!(
            &self.edge_cache,
            Some(cache) if cache.lod == self.lod && cache.generation == generation
        );
        if !fresh {
            self.edge_cache = Some(EdgeCache {
                lod: self.lod,
                generation,
                edges: self.mesh.edge_list(self.lod)?,
            });
        }
        Ok(())
    }
}

impl ShadowCaster for Entity {
    fn casts_shadows(&self) -> bool {
        self.cast_shadows
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn material_name(&self) -> &str {
        self.mesh
            .submeshes()
            .first()
            .map(|submesh| submesh.material_name.as_str())
            .unwrap_or(self.name.as_str())
    }

    fn world_bounding_box(&self) -> AABB {
        self.mesh.bounds().transform(&self.transform)
    }

    fn shadow_renderables(&mut self, request: &ShadowVolumeRequest<'_>) -> Result<Vec<ShadowRenderable>> {
        self.update_animation(request.frame)?;

        {
            let (mesh, lod) = self.geometry_source()?;
            ShadowVolumeBuilder::check_index_format(mesh.lod_index_data(lod), &self.vertex_sets()?)?;
        }

        let extrusion_distance = request.extrusion_distance(&*self);
        let material = self.material_name().to_string();
        let world_transform = self.transform;

        // Take the edge list out so the vertex sets can be borrowed alongside
        self.refresh_edge_cache()?;
        let Some(mut cache) = self.edge_cache.take() else {
            return Ok(Vec::new());
        };
        let result = self.vertex_sets().and_then(|sets| {
            ShadowVolumeBuilder::build_shadow_renderables(
                VolumeSource {
                    material: &material,
                    edges: Arc::make_mut(&mut cache.edges),
                    vertex_sets: &sets,
                    world_transform,
                },
                request,
                extrusion_distance,
            )
        });
        self.edge_cache = Some(cache);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::MorphTarget;
    use crate::buffer::{IndexBuffer, IndexType, VertexBuffer};
    use crate::caster::ShadowVolumeFlags;
    use crate::light::Light;
    use crate::mesh::SubMesh;
    use crate::vertex::IndexData;
    use approx::assert_relative_eq;
    use void_math::Vec3;

    fn cube_entity() -> Entity {
        let mut mesh = Mesh::new_box("cube", Vec3::ONE, "stone");
        mesh.prepare_for_shadow_volume().unwrap();
        Entity::new("cube", Arc::new(mesh))
    }

    fn request<'a>(light: &'a Light, indices: &'a IndexBuffer, frame: &'a FrameContext) -> ShadowVolumeRequest<'a> {
        ShadowVolumeRequest {
            light,
            index_buffer: indices,
            flags: ShadowVolumeFlags::NONE,
            directional_extrusion_distance: 100.0,
            hardware_extrusion: false,
            frame,
        }
    }

    #[test]
    fn test_world_bounds() {
        let entity = cube_entity().with_transform(Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        let bounds = entity.world_bounding_box();
        assert_eq!(bounds.min, Vec3::new(4.0, -1.0, -1.0));
        assert_eq!(bounds.max, Vec3::new(6.0, 1.0, 1.0));
    }

    #[test]
    fn test_point_extrusion_distance() {
        let entity = cube_entity();
        let light = Light::point("lamp", Vec3::new(0.0, 10.0, 0.0), 25.0);
        assert_eq!(entity.point_extrusion_distance(&light), 15.0);
        let far = Light::point("far", Vec3::new(0.0, 50.0, 0.0), 25.0);
        assert_eq!(entity.point_extrusion_distance(&far), 0.0);
    }

    #[test]
    fn test_edge_list_copied_not_shared() {
        let mut entity = cube_entity();
        let light = Light::directional("sun", Vec3::NEG_Y);
        let indices = IndexBuffer::new(IndexType::U16, 1024);
        let frame = FrameContext::default();

        entity.shadow_renderables(&request(&light, &indices, &frame)).unwrap();
        let shared = entity.mesh().edge_list(0).unwrap();
        // Mesh copy keeps its initial facing state
        assert!(shared.light_facing.iter().all(|facing| !facing));
        let cache = entity.edge_cache.as_ref().unwrap();
        assert_eq!(cache.edges.light_facing.iter().filter(|f| **f).count(), 2);
    }

    #[test]
    fn test_animated_entity_blends_once_per_frame() {
        let mut entity = cube_entity();
        let lift = Mat4::from_translation(Vec3::new(0.0, 3.0, 0.0));
        let mut mesh = Mesh::new_box("cube", Vec3::ONE, "stone");
        mesh.prepare_for_shadow_volume().unwrap();
        let source = mesh.shared_vertex_data.as_ref().unwrap();
        let lifted: Vec<Vec3> = source.positions().unwrap().iter().map(|p| lift.transform_point(*p)).collect();
        entity.set_animation(Some(VertexAnimation::Morph {
            targets: vec![MorphTarget {
                vertex_set: 0,
                from: Arc::new(VertexBuffer::from_positions(&source.positions().unwrap())),
                to: Arc::new(VertexBuffer::from_positions(&lifted)),
            }],
            weight: 1.0,
        }));

        let mut frame = FrameContext::default();
        entity.update_animation(&frame).unwrap();
        let blended = entity.vertex_sets().unwrap()[0].positions().unwrap();
        assert_eq!(blended[6], Vec3::new(1.0, 4.0, 1.0));
        // Mesh geometry untouched
        assert_eq!(entity.mesh().vertex_sets(0).unwrap()[0].positions().unwrap()[6], Vec3::ONE);

        // Overwrite the blended copy; same frame does not re-blend
        entity.blended[0].write_positions(&[Vec3::ZERO; 8]).unwrap();
        entity.update_animation(&frame).unwrap();
        assert_eq!(entity.vertex_sets().unwrap()[0].positions().unwrap()[6], Vec3::ZERO);

        frame.advance();
        entity.update_animation(&frame).unwrap();
        assert_eq!(entity.vertex_sets().unwrap()[0].positions().unwrap()[6], Vec3::new(1.0, 4.0, 1.0));
    }

    #[test]
    fn test_animated_volume_extrudes_blended_positions() {
        let light = Light::directional("sun", Vec3::NEG_X);
        let indices = IndexBuffer::new(IndexType::U16, 1024);
        let frame = FrameContext::default();

        // At rest only the +X face is lit
        let mut still = cube_entity();
        let volume = still.shadow_renderables(&request(&light, &indices, &frame)).unwrap();
        assert_eq!(volume[0].index_range(), (0, 4 * 6));

        // Morphed 45 degrees about Z, the +X and -Y faces both face the light
        let mut entity = cube_entity();
        let source = entity.mesh().vertex_sets(0).unwrap()[0].positions().unwrap();
        let (s, c) = std::f32::consts::FRAC_PI_4.sin_cos();
        let rotated: Vec<Vec3> = source.iter().map(|p| Vec3::new(p.x * c - p.y * s, p.x * s + p.y * c, p.z)).collect();
        entity.set_animation(Some(VertexAnimation::Morph {
            targets: vec![MorphTarget {
                vertex_set: 0,
                from: Arc::new(VertexBuffer::from_positions(&source)),
                to: Arc::new(VertexBuffer::from_positions(&rotated)),
            }],
            weight: 1.0,
        }));

        let volume = entity.shadow_renderables(&request(&light, &indices, &frame)).unwrap();
        assert_eq!(volume.len(), 1);
        assert_eq!(volume[0].index_range(), (0, 6 * 6));

        let sets = entity.vertex_sets().unwrap();
        let (_, buffer) = sets[0].position_buffer().unwrap();
        assert!(Arc::ptr_eq(volume[0].positions(), buffer));
        assert!(!Arc::ptr_eq(buffer, entity.mesh().vertex_sets(0).unwrap()[0].position_buffer().unwrap().1));

        let bytes = buffer.read();
        let view = crate::buffer::ElementView::new(&bytes, 0, 12, 16);
        for (i, expected) in rotated.iter().enumerate() {
            let blended = view.read_vec3(i).unwrap();
            assert_relative_eq!(blended.x, expected.x, epsilon = 1e-5);
            assert_relative_eq!(blended.y, expected.y, epsilon = 1e-5);
            // Pushed along the light direction by the extrusion distance
            let extruded = view.read_vec3(i + 8).unwrap();
            assert_relative_eq!(extruded.x, blended.x - 100.0, epsilon = 1e-4);
            assert_eq!(extruded.y, blended.y);
            assert_eq!(extruded.z, blended.z);
        }
    }

    #[test]
    fn test_wide_indices_rejected() {
        let mut mesh = Mesh::new("wide");
        mesh.shared_vertex_data = Some(VertexData::from_positions(&[Vec3::ZERO, Vec3::X, Vec3::Y]));
        mesh.add_submesh(SubMesh::new("m", IndexData::from_u32(&[0, 1, 2])));
        mesh.prepare_for_shadow_volume().unwrap();
        let mut entity = Entity::new("wide", Arc::new(mesh));

        let light = Light::directional("sun", Vec3::NEG_Y);
        let indices = IndexBuffer::new(IndexType::U16, 1024);
        let frame = FrameContext::default();
        let err = entity.shadow_renderables(&request(&light, &indices, &frame)).unwrap_err();
        assert!(matches!(err, crate::error::ShadowError::UnsupportedIndexFormat(IndexType::U32)));
    }

    #[test]
    fn test_render_operations_per_submesh() {
        let entity = cube_entity();
        let ops = entity.render_operations().unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].material, "stone");
        assert_eq!(ops[0].vertex_count, 8);
        assert_eq!(ops[0].element_count(), 36);
    }
}
