//! Mesh geometry with lazily cached edge lists

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use void_math::{Vec3, AABB};

use crate::edge::{EdgeData, EdgeListBuilder};
use crate::error::{Result, ShadowError};
use crate::vertex::{IndexData, VertexData};

/// Part of a mesh drawn with one material
#[derive(Clone, Debug)]
pub struct SubMesh {
    pub material_name: String,
    /// Own vertex data; `None` uses the mesh's shared vertex data
    pub vertex_data: Option<VertexData>,
    /// Full detail indices
    pub index_data: IndexData,
    /// Reduced indices for generated LOD levels 1..
    pub lod_index_data: Vec<IndexData>,
}

impl SubMesh {
    pub fn new(material_name: impl Into<String>, index_data: IndexData) -> Self {
        Self {
            material_name: material_name.into(),
            vertex_data: None,
            index_data,
            lod_index_data: Vec::new(),
        }
    }

    pub fn with_vertex_data(mut self, vertex_data: VertexData) -> Self {
        self.vertex_data = Some(vertex_data);
        self
    }

    #[inline]
    pub fn uses_shared_vertices(&self) -> bool {
        self.vertex_data.is_none()
    }

    /// Index data for a generated LOD, falling back to the closest coarser level
    pub fn index_data_for_lod(&self, lod: usize) -> &IndexData {
        if lod == 0 || self.lod_index_data.is_empty() {
            &self.index_data
        } else {
            let level = (lod - 1).min(self.lod_index_data.len() - 1);
            &self.lod_index_data[level]
        }
    }
}

/// LOD level beyond full detail
#[derive(Clone, Debug)]
pub enum LodLevel {
    /// Reduced index data stored on each submesh
    Generated,
    /// A different mesh substitutes at this level
    Manual(Arc<Mesh>),
}

/// A mesh: shared vertex data, submeshes and LOD levels
///
/// Edge lists are built on first request per LOD and cached until the
/// topology is edited through [`Mesh::set_index_data`] or
/// [`Mesh::invalidate_edge_lists`].
#[derive(Debug)]
pub struct Mesh {
    name: String,
    pub shared_vertex_data: Option<VertexData>,
    submeshes: Vec<SubMesh>,
    lod_levels: Vec<LodLevel>,
    edge_lists: Vec<RwLock<Option<Arc<EdgeData>>>>,
    generation: AtomicU64,
    bounds: AABB,
}

impl Mesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared_vertex_data: None,
            submeshes: Vec::new(),
            lod_levels: Vec::new(),
            edge_lists: vec![RwLock::new(None)],
            generation: AtomicU64::new(0),
            bounds: AABB::EMPTY,
        }
    }

    /// Axis-aligned box with shared corners, outward winding and one
    /// submesh using `material_name`
    pub fn new_box(name: impl Into<String>, half_extents: Vec3, material_name: &str) -> Self {
        let h = half_extents;
        let positions = [
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        let indices: [u16; 36] = [
            0, 2, 1, 0, 3, 2, // -Z
            4, 5, 6, 4, 6, 7, // +Z
            0, 1, 5, 0, 5, 4, // -Y
            3, 7, 6, 3, 6, 2, // +Y
            0, 4, 7, 0, 7, 3, // -X
            1, 2, 6, 1, 6, 5, // +X
        ];

        let mut mesh = Self::new(name);
        mesh.shared_vertex_data = Some(VertexData::from_positions(&positions));
        mesh.add_submesh(SubMesh::new(material_name, IndexData::from_u16(&indices)));
        mesh.bounds = AABB::from_points(&positions);
        mesh
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_submesh(&mut self, submesh: SubMesh) {
        self.submeshes.push(submesh);
        self.invalidate_edge_lists();
    }

    pub fn submeshes(&self) -> &[SubMesh] {
        &self.submeshes
    }

    pub fn submesh(&self, index: usize) -> Option<&SubMesh> {
        self.submeshes.get(index)
    }

    #[inline]
    pub fn bounds(&self) -> AABB {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: AABB) {
        self.bounds = bounds;
    }

    /// Recompute bounds from every vertex set's positions
    pub fn compute_bounds(&mut self) -> Result<()> {
        let mut bounds = AABB::EMPTY;
        for vertex_data in self.vertex_sets(0)? {
            bounds = vertex_data
                .positions()?
                .into_iter()
                .fold(bounds, AABB::expand_to_include);
        }
        self.bounds = bounds;
        Ok(())
    }

    /// Number of LOD levels including full detail
    #[inline]
    pub fn lod_count(&self) -> usize {
        self.lod_levels.len() + 1
    }

    pub fn add_generated_lod(&mut self) {
        self.lod_levels.push(LodLevel::Generated);
        self.edge_lists.push(RwLock::new(None));
    }

    pub fn add_manual_lod(&mut self, mesh: Arc<Mesh>) {
        self.lod_levels.push(LodLevel::Manual(mesh));
        self.edge_lists.push(RwLock::new(None));
    }

    /// Mesh providing geometry at a LOD (itself unless a manual level)
    pub fn lod_mesh(&self, lod: usize) -> Result<&Mesh> {
        self.check_lod(lod)?;
        match lod.checked_sub(1).map(|level| &self.lod_levels[level]) {
            Some(LodLevel::Manual(mesh)) => Ok(mesh.as_ref()),
            _ => Ok(self),
        }
    }

    fn check_lod(&self, lod: usize) -> Result<()> {
        if lod >= self.lod_count() {
            return Err(ShadowError::LodOutOfRange { lod, count: self.lod_count() });
        }
        Ok(())
    }

    /// Vertex sets in edge-group order: shared data first, then each
    /// submesh with its own vertex data
    pub fn vertex_sets(&self, lod: usize) -> Result<Vec<&VertexData>> {
        let mesh = self.lod_mesh(lod)?;
        Ok(mesh
            .shared_vertex_data
            .iter()
            .chain(mesh.submeshes.iter().filter_map(|s| s.vertex_data.as_ref()))
            .collect())
    }

    /// Index data per submesh for a generated LOD of this mesh
    pub fn lod_index_data(&self, lod: usize) -> impl Iterator<Item = &IndexData> {
        self.submeshes.iter().map(move |s| s.index_data_for_lod(lod))
    }

    /// Edge list for a LOD, built on first request
    ///
    /// A manual LOD shares the full-detail edge list of its substitute mesh.
    pub fn edge_list(&self, lod: usize) -> Result<Arc<EdgeData>> {
        self.check_lod(lod)?;
        if let Some(LodLevel::Manual(mesh)) = lod.checked_sub(1).map(|level| &self.lod_levels[level]) {
            return mesh.edge_list(0);
        }

        if let Some(edges) = self.edge_lists[lod].read().as_ref() {
            return Ok(Arc::clone(edges));
        }

        let mut slot = self.edge_lists[lod].write();
        // Another caller may have built it while we waited
        if let Some(edges) = slot.as_ref() {
            return Ok(Arc::clone(edges));
        }

        let edges = Arc::new(self.build_edge_list(lod)?);
        log::debug!("Mesh '{}': built edge list for LOD {}", self.name, lod);
        *slot = Some(Arc::clone(&edges));
        Ok(edges)
    }

    fn build_edge_list(&self, lod: usize) -> Result<EdgeData> {
        let mut builder = EdgeListBuilder::new();
        let shared_set = self
            .shared_vertex_data
            .as_ref()
            .map(|vertex_data| builder.add_vertex_data(vertex_data));

        for submesh in &self.submeshes {
            let set = match (&submesh.vertex_data, shared_set) {
                (Some(vertex_data), _) => builder.add_vertex_data(vertex_data),
                (None, Some(set)) => set,
                (None, None) => return Err(ShadowError::MissingPositions),
            };
            builder.add_index_data(submesh.index_data_for_lod(lod), set);
        }
        builder.build()
    }

    /// Whether an edge list is cached for a LOD
    pub fn has_edge_list(&self, lod: usize) -> bool {
        self.edge_lists
            .get(lod)
            .map(|slot| slot.read().is_some())
            .unwrap_or(false)
    }

    /// Drop cached edge lists; they are rebuilt on next request
    pub fn invalidate_edge_lists(&self) {
        for slot in &self.edge_lists {
            *slot.write() = None;
        }
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    /// Counter bumped on every topology invalidation
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Replace the indices of a submesh at a LOD
    pub fn set_index_data(&mut self, submesh: usize, lod: usize, index_data: IndexData) -> Result<()> {
        self.check_lod(lod)?;
        let count = self.submeshes.len();
        let target = self
            .submeshes
            .get_mut(submesh)
            .ok_or(ShadowError::BufferOutOfRange { index: submesh, count })?;
        if lod == 0 {
            target.index_data = index_data;
        } else {
            let level = lod - 1;
            if target.lod_index_data.len() <= level {
                target.lod_index_data.resize(level + 1, target.index_data.clone());
            }
            target.lod_index_data[level] = index_data;
        }
        self.invalidate_edge_lists();
        Ok(())
    }

    /// Double every position buffer for shadow volume extrusion
    pub fn prepare_for_shadow_volume(&mut self) -> Result<()> {
        if let Some(vertex_data) = self.shared_vertex_data.as_mut() {
            vertex_data.prepare_for_shadow_volume()?;
        }
        for submesh in &mut self.submeshes {
            if let Some(vertex_data) = submesh.vertex_data.as_mut() {
                vertex_data.prepare_for_shadow_volume()?;
            }
        }
        Ok(())
    }

    pub fn is_prepared_for_shadow_volumes(&self) -> bool {
        self.shared_vertex_data
            .iter()
            .chain(self.submeshes.iter().filter_map(|s| s.vertex_data.as_ref()))
            .all(VertexData::is_prepared_for_shadow_volumes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_list_is_cached() {
        let mesh = Mesh::new_box("box", Vec3::splat(0.5), "Grey");
        assert!(!mesh.has_edge_list(0));

        let first = mesh.edge_list(0).unwrap();
        let second = mesh.edge_list(0).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.triangles.len(), 12);
    }

    #[test]
    fn test_invalidate_rebuilds() {
        let mut mesh = Mesh::new_box("box", Vec3::splat(0.5), "Grey");
        let before = mesh.edge_list(0).unwrap();
        let generation = mesh.generation();

        // Drop the last two triangles, opening the box
        let indices: Vec<u16> = before
            .triangles
            .iter()
            .take(10)
            .flat_map(|t| t.vert_index.map(|i| i as u16))
            .collect();
        mesh.set_index_data(0, 0, IndexData::from_u16(&indices)).unwrap();

        assert!(mesh.generation() > generation);
        assert!(!mesh.has_edge_list(0));
        let after = mesh.edge_list(0).unwrap();
        assert_eq!(after.triangles.len(), 10);
        assert!(!after.is_closed());
    }

    #[test]
    fn test_manual_lod_shares_substitute_edges() {
        let low = Arc::new(Mesh::new_box("low", Vec3::splat(0.5), "Grey"));
        let mut mesh = Mesh::new_box("high", Vec3::splat(0.5), "Grey");
        mesh.add_manual_lod(Arc::clone(&low));

        let lod_edges = mesh.edge_list(1).unwrap();
        let low_edges = low.edge_list(0).unwrap();
        assert!(Arc::ptr_eq(&lod_edges, &low_edges));
        assert!(matches!(
            mesh.edge_list(2),
            Err(ShadowError::LodOutOfRange { lod: 2, count: 2 })
        ));
    }

    #[test]
    fn test_generated_lod_uses_reduced_indices() {
        let mut mesh = Mesh::new_box("box", Vec3::splat(0.5), "Grey");
        mesh.add_generated_lod();
        mesh.set_index_data(0, 1, IndexData::from_u16(&[3, 7, 6, 3, 6, 2])).unwrap();

        assert_eq!(mesh.edge_list(0).unwrap().triangles.len(), 12);
        assert_eq!(mesh.edge_list(1).unwrap().triangles.len(), 2);
    }

    #[test]
    fn test_prepare_for_shadow_volume() {
        let mut mesh = Mesh::new_box("box", Vec3::splat(0.5), "Grey");
        assert!(!mesh.is_prepared_for_shadow_volumes());
        mesh.prepare_for_shadow_volume().unwrap();
        assert!(mesh.is_prepared_for_shadow_volumes());

        let vertex_data = mesh.shared_vertex_data.as_ref().unwrap();
        let (_, buffer) = vertex_data.position_buffer().unwrap();
        assert_eq!(buffer.vertex_count(), 2 * vertex_data.vertex_count());
    }

    #[test]
    fn test_compute_bounds() {
        let mut mesh = Mesh::new_box("box", Vec3::new(1.0, 2.0, 3.0), "Grey");
        mesh.set_bounds(AABB::EMPTY);
        mesh.compute_bounds().unwrap();
        assert_eq!(mesh.bounds().max, Vec3::new(1.0, 2.0, 3.0));
    }
}
