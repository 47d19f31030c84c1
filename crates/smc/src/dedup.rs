use std::collections::HashMap;

use glam::DVec3;

use crate::mesh::MeshSink;

/// Quantisation factor for vertex keys.
const QUANT: f64 = 1e10;

/// Canonicalises world points to vertex ids by lattice quantisation.
///
/// The first occurrence of a key creates a fresh vertex in the sink; later
/// occurrences return the existing id. Ids are issued in creation order
/// starting from 1, which makes this the only source of topological sharing
/// across cells.
pub struct VertexPool {
    map: HashMap<(i64, i64, i64), u32>,
    next_id: u32,
}

impl VertexPool {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            next_id: 1,
        }
    }

    fn key(p: DVec3) -> (i64, i64, i64) {
        (
            (p.x * QUANT).round() as i64,
            (p.y * QUANT).round() as i64,
            (p.z * QUANT).round() as i64,
        )
    }

    /// Id for `p`, creating the vertex in `sink` on first occurrence.
    pub fn get_or_create<M: MeshSink>(&mut self, p: DVec3, sink: &mut M) -> u32 {
        let key = Self::key(p);
        if let Some(&id) = self.map.get(&key) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.map.insert(key, id);
        sink.create_vertex(id, p);
        id
    }

    /// Number of vertices created so far.
    pub fn len(&self) -> usize {
        (self.next_id - 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.next_id == 1
    }
}

impl Default for VertexPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::IndexedMesh;

    #[test]
    fn ids_start_at_one_and_follow_creation_order() {
        let mut pool = VertexPool::new();
        let mut mesh = IndexedMesh::new();
        let a = pool.get_or_create(DVec3::ZERO, &mut mesh);
        let b = pool.get_or_create(DVec3::ONE, &mut mesh);
        assert_eq!((a, b), (1, 2));
        assert_eq!(mesh.vertex_count(), 2);
    }

    #[test]
    fn repeated_points_share_one_vertex() {
        let mut pool = VertexPool::new();
        let mut mesh = IndexedMesh::new();
        let a = pool.get_or_create(DVec3::new(0.5, 0.25, -0.125), &mut mesh);
        let b = pool.get_or_create(DVec3::new(0.5, 0.25, -0.125), &mut mesh);
        assert_eq!(a, b);
        assert_eq!(mesh.vertex_count(), 1);
    }

    #[test]
    fn points_below_quantum_collapse() {
        let mut pool = VertexPool::new();
        let mut mesh = IndexedMesh::new();
        let a = pool.get_or_create(DVec3::new(1.0, 0.0, 0.0), &mut mesh);
        let b = pool.get_or_create(DVec3::new(1.0 + 1e-12, 0.0, 0.0), &mut mesh);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_points_get_distinct_ids() {
        let mut pool = VertexPool::new();
        let mut mesh = IndexedMesh::new();
        let a = pool.get_or_create(DVec3::new(1.0, 0.0, 0.0), &mut mesh);
        let b = pool.get_or_create(DVec3::new(1.0 + 1e-9, 0.0, 0.0), &mut mesh);
        assert_ne!(a, b);
    }

    #[test]
    fn requantising_existing_vertices_is_idempotent() {
        let mut pool = VertexPool::new();
        let mut mesh = IndexedMesh::new();
        let points = [
            DVec3::new(0.1, 0.2, 0.3),
            DVec3::new(-0.4, 0.5, -0.6),
            DVec3::new(0.7, -0.8, 0.9),
        ];
        let ids: Vec<u32> = points
            .iter()
            .map(|&p| pool.get_or_create(p, &mut mesh))
            .collect();

        let mut fresh = VertexPool::new();
        let mut sink = IndexedMesh::new();
        let again: Vec<u32> = mesh
            .vertices()
            .iter()
            .map(|&p| fresh.get_or_create(p, &mut sink))
            .collect();
        assert_eq!(ids, again);
    }
}
