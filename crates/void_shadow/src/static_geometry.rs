//! Baked, immovable world geometry
//!
//! Entities added to a [`StaticGeometry`] are transformed into world space
//! and merged per material. After [`StaticGeometry::build`] the batch acts
//! as a single caster with one edge group per material region.

use std::collections::BTreeMap;

use void_math::{Mat4, Vec3, AABB};

use crate::caster::{ShadowCaster, ShadowRenderable, ShadowVolumeRequest};
use crate::edge::{EdgeData, EdgeListBuilder};
use crate::entity::Entity;
use crate::error::{Result, ShadowError};
use crate::render_system::{IndexRange, RenderOperation, VertexSource};
use crate::vertex::{IndexData, VertexData};
use crate::volume::{ShadowVolumeBuilder, VolumeSource, MAX_SHADOW_SOURCE_VERTICES};

/// Merged geometry sharing one material
#[derive(Debug)]
pub struct StaticRegion {
    pub material: String,
    pub vertex_data: VertexData,
    pub index_data: IndexData,
    pub bounds: AABB,
}

#[derive(Debug, Default)]
struct PendingRegion {
    positions: Vec<Vec3>,
    indices: Vec<u32>,
}

/// Batch of static world geometry
#[derive(Debug)]
pub struct StaticGeometry {
    name: String,
    pending: BTreeMap<String, PendingRegion>,
    regions: Vec<StaticRegion>,
    edges: Option<EdgeData>,
    bounds: AABB,
    cast_shadows: bool,
    visible: bool,
}

impl StaticGeometry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pending: BTreeMap::new(),
            regions: Vec::new(),
            edges: None,
            bounds: AABB::EMPTY,
            cast_shadows: true,
            visible: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn regions(&self) -> &[StaticRegion] {
        &self.regions
    }

    pub fn is_built(&self) -> bool {
        self.edges.is_some()
    }

    pub fn set_cast_shadows(&mut self, cast: bool) {
        self.cast_shadows = cast;
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Queue an entity's full-detail geometry in world space
    pub fn add_entity(&mut self, entity: &Entity) -> Result<()> {
        let mesh = entity.mesh();
        let sets = mesh.vertex_sets(0)?;
        let positions: Vec<Vec<Vec3>> = sets.iter().map(|data| data.positions()).collect::<Result<_>>()?;
        let shared = usize::from(mesh.shared_vertex_data.is_some());

        let mut owned = 0;
        for submesh in mesh.submeshes() {
            let set = if submesh.uses_shared_vertices() {
                0
            } else {
                owned += 1;
                shared + owned - 1
            };
            let Some(source) = positions.get(set) else {
                return Err(ShadowError::MissingPositions);
            };

            let region = self.pending.entry(submesh.material_name.clone()).or_default();
            let base = region.positions.len() as u32;
            region
                .positions
                .extend(source.iter().map(|p| entity.transform().transform_point(*p)));
            region
                .indices
                .extend(submesh.index_data.indices()?.into_iter().map(|i| i + base));
        }
        Ok(())
    }

    /// Merge queued geometry, prepare it for shadow volumes and build edges
    pub fn build(&mut self) -> Result<()> {
        for (material, pending) in std::mem::take(&mut self.pending) {
            if pending.positions.len() > MAX_SHADOW_SOURCE_VERTICES {
                return Err(ShadowError::VertexCountTooLarge {
                    count: pending.positions.len(),
                    max: MAX_SHADOW_SOURCE_VERTICES,
                });
            }
            let indices: Vec<u16> = pending.indices.iter().map(|&i| i as u16).collect();
            let mut vertex_data = VertexData::from_positions(&pending.positions);
            vertex_data.prepare_for_shadow_volume()?;
            let bounds = AABB::from_points(&pending.positions);
            self.bounds = self.bounds.union(&bounds);
            self.regions.push(StaticRegion {
                material,
                vertex_data,
                index_data: IndexData::from_u16(&indices),
                bounds,
            });
        }

        let mut builder = EdgeListBuilder::new();
        for region in &self.regions {
            let set = builder.add_vertex_data(&region.vertex_data);
            builder.add_index_data(&region.index_data, set);
        }
        let edges = builder.build()?;
        log::debug!(
            "Static geometry '{}': {} regions, {} edges",
            self.name,
            self.regions.len(),
            edges.edge_count()
        );
        self.edges = Some(edges);
        Ok(())
    }

    pub fn render_operations(&self) -> Vec<RenderOperation<'_>> {
        self.regions
            .iter()
            .map(|region| RenderOperation {
                vertices: VertexSource::Data(&region.vertex_data),
                vertex_count: region.vertex_data.vertex_count(),
                indices: Some(IndexRange {
                    buffer: &region.index_data.buffer,
                    start: region.index_data.index_start,
                    count: region.index_data.index_count,
                }),
                material: &region.material,
            })
            .collect()
    }
}

impl ShadowCaster for StaticGeometry {
    fn casts_shadows(&self) -> bool {
        self.cast_shadows && self.is_built()
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn material_name(&self) -> &str {
        self.regions
            .first()
            .map(|region| region.material.as_str())
            .unwrap_or(self.name.as_str())
    }

    fn world_bounding_box(&self) -> AABB {
        self.bounds
    }

    fn shadow_renderables(&mut self, request: &ShadowVolumeRequest<'_>) -> Result<Vec<ShadowRenderable>> {
        let extrusion_distance = request.extrusion_distance(&*self);
        let material = self.material_name().to_string();
        let Some(edges) = self.edges.as_mut() else {
            return Ok(Vec::new());
        };
        let sets: Vec<&VertexData> = self.regions.iter().map(|region| &region.vertex_data).collect();
        ShadowVolumeBuilder::build_shadow_renderables(
            VolumeSource {
                material: &material,
                edges,
                vertex_sets: &sets,
                world_transform: Mat4::IDENTITY,
            },
            request,
            extrusion_distance,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{IndexBuffer, IndexType};
    use crate::caster::ShadowVolumeFlags;
    use crate::frame::FrameContext;
    use crate::light::Light;
    use crate::mesh::Mesh;
    use std::sync::Arc;

    #[test]
    fn test_bake_two_entities() {
        let mesh = Arc::new(Mesh::new_box("cube", Vec3::ONE, "stone"));
        let a = Entity::new("a", Arc::clone(&mesh)).with_transform(Mat4::from_translation(Vec3::new(-5.0, 0.0, 0.0)));
        let b = Entity::new("b", mesh).with_transform(Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));

        let mut geometry = StaticGeometry::new("walls");
        geometry.add_entity(&a).unwrap();
        geometry.add_entity(&b).unwrap();
        assert!(!geometry.casts_shadows());
        geometry.build().unwrap();

        assert_eq!(geometry.regions().len(), 1);
        assert_eq!(geometry.regions()[0].vertex_data.vertex_count(), 16);
        assert_eq!(geometry.world_bounding_box().min.x, -6.0);
        assert_eq!(geometry.world_bounding_box().max.x, 6.0);
        assert!(geometry.casts_shadows());

        let light = Light::directional("sun", Vec3::NEG_Y);
        let indices = IndexBuffer::new(IndexType::U16, 1024);
        let frame = FrameContext::default();
        let request = ShadowVolumeRequest {
            light: &light,
            index_buffer: &indices,
            flags: ShadowVolumeFlags::NONE,
            directional_extrusion_distance: 50.0,
            hardware_extrusion: false,
            frame: &frame,
        };
        let renderables = geometry.shadow_renderables(&request).unwrap();
        assert_eq!(renderables.len(), 1);
        // Two separate cubes: 8 silhouette edges
        assert_eq!(renderables[0].index_range(), (0, 8 * 6));
        assert_eq!(renderables[0].vertex_count(), 32);
    }
}
