//! Edge topology for silhouette detection
//!
//! An [`EdgeData`] describes every triangle and edge of one mesh LOD,
//! grouped by the vertex data set the triangles index into. It is built by
//! [`EdgeListBuilder`] and then updated every frame with face planes (for
//! animated geometry) and light-facing flags before shadow volumes are
//! extruded from its silhouette.

use std::collections::HashMap;

use void_math::{Vec3, Vec4};

use crate::error::{Result, ShadowError};
use crate::vertex::{IndexData, VertexData};

/// A triangle of the edge list
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Triangle {
    /// Index set the triangle was read from
    pub index_set: usize,
    /// Vertex set (and edge group) the triangle indexes into
    pub vertex_set: usize,
    /// Vertex indices in the vertex set
    pub vert_index: [u32; 3],
    /// Welded indices (first vertex with the same position)
    pub shared_vert_index: [u32; 3],
}

/// An edge shared by one or two triangles
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    /// Triangle that first produced the edge
    pub tri_index: usize,
    /// Second triangle, `None` for a boundary edge
    pub adjacent_tri: Option<usize>,
    /// Vertex indices in the winding of the first triangle
    pub vert_index: [u32; 2],
    /// Welded vertex indices
    pub shared_vert_index: [u32; 2],
    /// Edge shared by more than two triangles
    pub degenerate: bool,
}

impl Edge {
    #[inline]
    pub fn is_boundary(&self) -> bool {
        self.adjacent_tri.is_none()
    }
}

/// Triangles and edges that share one vertex data set
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdgeGroup {
    pub vertex_set: usize,
    /// Number of vertices in the set
    pub vertex_count: usize,
    /// First triangle of the group in [`EdgeData::triangles`]
    pub tri_start: usize,
    pub tri_count: usize,
    pub edges: Vec<Edge>,
}

impl EdgeGroup {
    #[inline]
    pub fn triangle_range(&self) -> std::ops::Range<usize> {
        self.tri_start..self.tri_start + self.tri_count
    }
}

/// Edge list for one mesh LOD
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeData {
    pub triangles: Vec<Triangle>,
    /// Face plane per triangle as `(n, -n·v0)`, `n` not normalised
    pub face_normals: Vec<Vec4>,
    /// Per-frame light-facing flag per triangle
    pub light_facing: Vec<bool>,
    pub groups: Vec<EdgeGroup>,
    closed: bool,
}

impl EdgeData {
    /// True when every edge joins exactly two triangles
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn edge_count(&self) -> usize {
        self.groups.iter().map(|g| g.edges.len()).sum()
    }

    /// Recompute face planes of a vertex set from its current positions
    pub fn update_face_normals(&mut self, vertex_set: usize, positions: &[Vec3]) -> Result<()> {
        for (tri, plane) in self.triangles.iter().zip(self.face_normals.iter_mut()) {
            if tri.vertex_set != vertex_set {
                continue;
            }
            *plane = face_plane(positions, &tri.vert_index)?;
        }
        Ok(())
    }

    /// Classify every triangle against a light
    ///
    /// `light_pos` is `(position, 1)` for point and spot lights or
    /// `(-direction, 0)` for directional lights, in the same space as the
    /// positions. The test is an exact sign comparison.
    pub fn update_triangle_light_facing(&mut self, light_pos: Vec4) {
        for (facing, plane) in self.light_facing.iter_mut().zip(&self.face_normals) {
            *facing = plane.dot(light_pos) > 0.0;
        }
    }

    /// True if the edge separates a lit and an unlit triangle, or is a
    /// boundary of a lit triangle
    pub fn is_silhouette(&self, edge: &Edge) -> bool {
        if edge.degenerate {
            return false;
        }
        let first = self.light_facing[edge.tri_index];
        match edge.adjacent_tri {
            Some(second) => first != self.light_facing[second],
            None => first,
        }
    }

    /// Silhouette edges of one group
    pub fn silhouette_edges<'a>(&'a self, group: &'a EdgeGroup) -> impl Iterator<Item = &'a Edge> + 'a {
        group.edges.iter().filter(move |edge| self.is_silhouette(edge))
    }
}

/// Plane of a triangle as `(n, -n·v0)`
fn face_plane(positions: &[Vec3], vert_index: &[u32; 3]) -> Result<Vec4> {
    let fetch = |i: u32| {
        positions
            .get(i as usize)
            .copied()
            .ok_or(ShadowError::BufferOutOfRange { index: i as usize, count: positions.len() })
    };
    let v0 = fetch(vert_index[0])?;
    let v1 = fetch(vert_index[1])?;
    let v2 = fetch(vert_index[2])?;
    let n = (v1 - v0).cross(v2 - v0);
    Ok(n.extend(-n.dot(v0)))
}

/// Weld key: bit-identical positions share a vertex
fn position_key(p: Vec3) -> [u32; 3] {
    [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]
}

/// Builds [`EdgeData`] from vertex and index data sets
///
/// Index sets that share a vertex set are merged into that set's group.
/// Edges are ordered by first appearance so repeated builds of the same
/// geometry produce identical lists.
#[derive(Default)]
pub struct EdgeListBuilder<'a> {
    vertex_data: Vec<&'a VertexData>,
    geometry: Vec<(usize, &'a IndexData)>,
}

impl<'a> EdgeListBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vertex set, returning its number
    pub fn add_vertex_data(&mut self, vertex_data: &'a VertexData) -> usize {
        self.vertex_data.push(vertex_data);
        self.vertex_data.len() - 1
    }

    /// Register triangles indexing into a vertex set
    pub fn add_index_data(&mut self, index_data: &'a IndexData, vertex_set: usize) {
        self.geometry.push((vertex_set, index_data));
    }

    pub fn build(&self) -> Result<EdgeData> {
        let mut data = EdgeData {
            triangles: Vec::new(),
            face_normals: Vec::new(),
            light_facing: Vec::new(),
            groups: Vec::with_capacity(self.vertex_data.len()),
            closed: true,
        };

        for (vertex_set, vertex_data) in self.vertex_data.iter().enumerate() {
            let positions = vertex_data.positions()?;
            let vertex_count = positions.len();

            let mut weld: HashMap<[u32; 3], u32> = HashMap::new();
            let shared: Vec<u32> = positions
                .iter()
                .enumerate()
                .map(|(i, p)| *weld.entry(position_key(*p)).or_insert(i as u32))
                .collect();

            let mut group = EdgeGroup {
                vertex_set,
                vertex_count,
                tri_start: data.triangles.len(),
                tri_count: 0,
                edges: Vec::new(),
            };
            let mut edge_lookup: HashMap<(u32, u32), usize> = HashMap::new();

            for (index_set, (_, index_data)) in self
                .geometry
                .iter()
                .enumerate()
                .filter(|(_, (set, _))| *set == vertex_set)
            {
                let indices = index_data.indices()?;
                for tri in indices.chunks_exact(3) {
                    if let Some(&bad) = tri.iter().find(|&&i| i as usize >= vertex_count) {
                        return Err(ShadowError::BufferOutOfRange {
                            index: bad as usize,
                            count: vertex_count,
                        });
                    }

                    let vert_index = [tri[0], tri[1], tri[2]];
                    let shared_vert_index = vert_index.map(|i| shared[i as usize]);
                    let tri_index = data.triangles.len();

                    data.face_normals.push(face_plane(&positions, &vert_index)?);
                    data.light_facing.push(false);
                    data.triangles.push(Triangle {
                        index_set,
                        vertex_set,
                        vert_index,
                        shared_vert_index,
                    });
                    group.tri_count += 1;

                    for e in 0..3 {
                        let a = shared_vert_index[e];
                        let b = shared_vert_index[(e + 1) % 3];
                        if a == b {
                            // Collapsed edge of a zero-area triangle
                            continue;
                        }
                        let key = (a.min(b), a.max(b));
                        match edge_lookup.get(&key) {
                            Some(&existing) => {
                                let edge = &mut group.edges[existing];
                                if edge.adjacent_tri.is_none() && !edge.degenerate {
                                    edge.adjacent_tri = Some(tri_index);
                                } else {
                                    edge.degenerate = true;
                                }
                            }
                            None => {
                                edge_lookup.insert(key, group.edges.len());
                                group.edges.push(Edge {
                                    tri_index,
                                    adjacent_tri: None,
                                    vert_index: [vert_index[e], vert_index[(e + 1) % 3]],
                                    shared_vert_index: [a, b],
                                    degenerate: false,
                                });
                            }
                        }
                    }
                }
            }

            if group
                .edges
                .iter()
                .any(|edge| edge.degenerate || edge.adjacent_tri.is_none())
            {
                data.closed = false;
            }
            data.groups.push(group);
        }

        log::debug!(
            "Built edge list: {} triangles, {} edges in {} groups (closed: {})",
            data.triangles.len(),
            data.edge_count(),
            data.groups.len(),
            data.closed
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unit cube, 8 shared corners, 12 outward-wound triangles
    fn cube() -> (VertexData, IndexData) {
        let positions = [
            Vec3::new(-0.5, -0.5, -0.5),
            Vec3::new(0.5, -0.5, -0.5),
            Vec3::new(0.5, 0.5, -0.5),
            Vec3::new(-0.5, 0.5, -0.5),
            Vec3::new(-0.5, -0.5, 0.5),
            Vec3::new(0.5, -0.5, 0.5),
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(-0.5, 0.5, 0.5),
        ];
        let indices: [u16; 36] = [
            0, 2, 1, 0, 3, 2, // -Z
            4, 5, 6, 4, 6, 7, // +Z
            0, 1, 5, 0, 5, 4, // -Y
            3, 7, 6, 3, 6, 2, // +Y
            0, 4, 7, 0, 7, 3, // -X
            1, 2, 6, 1, 6, 5, // +X
        ];
        (VertexData::from_positions(&positions), IndexData::from_u16(&indices))
    }

    fn build(vertex_data: &VertexData, index_data: &IndexData) -> EdgeData {
        let mut builder = EdgeListBuilder::new();
        let set = builder.add_vertex_data(vertex_data);
        builder.add_index_data(index_data, set);
        builder.build().unwrap()
    }

    #[test]
    fn test_cube_is_closed() {
        let (vd, id) = cube();
        let edges = build(&vd, &id);

        assert_eq!(edges.triangles.len(), 12);
        assert_eq!(edges.edge_count(), 18);
        assert!(edges.is_closed());
        assert!(edges.groups[0].edges.iter().all(|e| e.adjacent_tri.is_some()));
    }

    #[test]
    fn test_build_is_idempotent() {
        let (vd, id) = cube();
        assert_eq!(build(&vd, &id), build(&vd, &id));
    }

    #[test]
    fn test_directional_light_silhouette() {
        let (vd, id) = cube();
        let mut edges = build(&vd, &id);

        // Light shining along -Y
        edges.update_triangle_light_facing(Vec4::new(0.0, 1.0, 0.0, 0.0));
        let facing: Vec<usize> = (0..12).filter(|i| edges.light_facing[*i]).collect();
        assert_eq!(facing, vec![6, 7]);

        let group = &edges.groups[0];
        let silhouette: Vec<&Edge> = edges.silhouette_edges(group).collect();
        assert_eq!(silhouette.len(), 4);
        for edge in silhouette {
            for v in edge.vert_index {
                assert!(matches!(v, 2 | 3 | 6 | 7), "silhouette vertex {} not on top face", v);
            }
        }
    }

    #[test]
    fn test_closed_cube_silhouettes_are_even() {
        let (vd, id) = cube();
        let mut edges = build(&vd, &id);
        let lights = [
            Vec4::new(3.0, 4.0, 5.0, 1.0),
            Vec4::new(-10.0, 0.2, 0.1, 1.0),
            Vec4::new(0.3, -1.0, 0.7, 0.0),
            Vec4::new(0.0, 0.0, 1.0, 0.0),
        ];
        for light in lights {
            edges.update_triangle_light_facing(light);
            let count = edges.silhouette_edges(&edges.groups[0]).count();
            assert_eq!(count % 2, 0, "odd silhouette for light {:?}", light);
            assert!(count >= 4);
        }
    }

    #[test]
    fn test_light_facing_is_exact_sign() {
        let (vd, id) = cube();
        let mut edges = build(&vd, &id);
        // Point light exactly in the plane of the +Y face
        edges.update_triangle_light_facing(Vec4::new(0.0, 0.5, 0.0, 1.0));
        assert!(!edges.light_facing[6]);
        assert!(!edges.light_facing[7]);

        let first = edges.light_facing.clone();
        edges.update_triangle_light_facing(Vec4::new(0.0, 0.5, 0.0, 1.0));
        assert_eq!(first, edges.light_facing);
    }

    #[test]
    fn test_seams_are_welded() {
        // Two triangles forming a quad, with the shared edge duplicated
        let vd = VertexData::from_positions(&[
            Vec3::ZERO,
            Vec3::X,
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::ZERO,
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::Y,
        ]);
        let id = IndexData::from_u16(&[0, 1, 2, 3, 4, 5]);
        let edges = build(&vd, &id);

        assert_eq!(edges.edge_count(), 5);
        let interior: Vec<&Edge> = edges.groups[0]
            .edges
            .iter()
            .filter(|e| e.adjacent_tri.is_some())
            .collect();
        assert_eq!(interior.len(), 1);
        assert!(!edges.is_closed());
    }

    #[test]
    fn test_fan_edge_is_degenerate() {
        // Three triangles sharing the edge 0-1
        let vd = VertexData::from_positions(&[
            Vec3::ZERO,
            Vec3::X,
            Vec3::Y,
            Vec3::Z,
            Vec3::NEG_Y,
        ]);
        let id = IndexData::from_u16(&[0, 1, 2, 1, 0, 3, 0, 1, 4]);
        let mut edges = build(&vd, &id);
        let shared = edges.groups[0]
            .edges
            .iter()
            .find(|e| e.shared_vert_index == [0, 1])
            .cloned()
            .unwrap();
        assert!(shared.degenerate);

        edges.update_triangle_light_facing(Vec4::new(0.0, 0.0, 1.0, 0.0));
        assert!(!edges.is_silhouette(&shared));
    }

    #[test]
    fn test_merged_index_sets_and_separate_vertex_sets() {
        let (vd, id) = cube();
        let other = VertexData::from_positions(&[Vec3::ZERO, Vec3::X, Vec3::Y]);
        let tri = IndexData::from_u16(&[0, 1, 2]);

        let mut builder = EdgeListBuilder::new();
        let cube_set = builder.add_vertex_data(&vd);
        let tri_set = builder.add_vertex_data(&other);
        builder.add_index_data(&tri, tri_set);
        builder.add_index_data(&id, cube_set);
        let edges = builder.build().unwrap();

        assert_eq!(edges.groups.len(), 2);
        assert_eq!(edges.groups[0].tri_count, 12);
        assert_eq!(edges.groups[1].tri_start, 12);
        assert_eq!(edges.triangles[12].index_set, 0);
        assert_eq!(edges.triangles[0].index_set, 1);
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let vd = VertexData::from_positions(&[Vec3::ZERO, Vec3::X, Vec3::Y]);
        let id = IndexData::from_u32(&[0, 1, 7]);
        let mut builder = EdgeListBuilder::new();
        let set = builder.add_vertex_data(&vd);
        builder.add_index_data(&id, set);
        assert!(matches!(
            builder.build(),
            Err(ShadowError::BufferOutOfRange { index: 7, count: 3 })
        ));
    }
}
