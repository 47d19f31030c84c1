use glam::DVec3;

/// Receiver interface for extracted meshes.
///
/// The extractor hands out vertices and faces in a deterministic order with
/// ids starting from 1; a sink may store them, stream them to disk, or
/// forward them to another mesh library.
pub trait MeshSink {
    /// Register a new vertex. Ids are issued sequentially starting from 1.
    fn create_vertex(&mut self, id: u32, point: DVec3);

    /// Register a new face as an ordered loop of vertex ids.
    fn create_face(&mut self, id: u32, vertices: &[u32]);
}

/// Provider interface for triangle-soup input.
///
/// Faces with more than three vertices are fan-triangulated by the consumer.
pub trait TriangleSource {
    fn face_count(&self) -> usize;

    /// Vertex positions of face `index`, in loop order.
    fn face_vertices(&self, index: usize) -> Vec<DVec3>;
}

/// Simple indexed mesh storing positions and vertex-id loops.
///
/// Vertex ids are 1-based, matching the extractor contract and the OBJ file
/// format.
#[derive(Debug, Default, Clone)]
pub struct IndexedMesh {
    vertices: Vec<DVec3>,
    faces: Vec<Vec<u32>>,
}

impl IndexedMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a vertex and return its 1-based id.
    pub fn add_vertex(&mut self, point: DVec3) -> u32 {
        self.vertices.push(point);
        self.vertices.len() as u32
    }

    /// Append a face given as 1-based vertex ids.
    pub fn add_face(&mut self, vertices: Vec<u32>) {
        self.faces.push(vertices);
    }

    /// Position of the vertex with the given 1-based id.
    pub fn vertex(&self, id: u32) -> DVec3 {
        self.vertices[(id - 1) as usize]
    }

    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    pub fn faces(&self) -> &[Vec<u32>] {
        &self.faces
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.faces.is_empty()
    }

    /// Axis-aligned bounding box of all vertices, or `None` for an empty mesh.
    pub fn bounding_box(&self) -> Option<(DVec3, DVec3)> {
        let first = *self.vertices.first()?;
        let mut min = first;
        let mut max = first;
        for &v in &self.vertices[1..] {
            min = min.min(v);
            max = max.max(v);
        }
        Some((min, max))
    }
}

impl MeshSink for IndexedMesh {
    fn create_vertex(&mut self, id: u32, point: DVec3) {
        debug_assert_eq!(id as usize, self.vertices.len() + 1);
        self.vertices.push(point);
    }

    fn create_face(&mut self, _id: u32, vertices: &[u32]) {
        self.faces.push(vertices.to_vec());
    }
}

impl TriangleSource for IndexedMesh {
    fn face_count(&self) -> usize {
        self.faces.len()
    }

    fn face_vertices(&self, index: usize) -> Vec<DVec3> {
        self.faces[index].iter().map(|&id| self.vertex(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_ids_are_one_based() {
        let mut mesh = IndexedMesh::new();
        let a = mesh.add_vertex(DVec3::ZERO);
        let b = mesh.add_vertex(DVec3::ONE);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(mesh.vertex(2), DVec3::ONE);
    }

    #[test]
    fn bounding_box_covers_all_vertices() {
        let mut mesh = IndexedMesh::new();
        mesh.add_vertex(DVec3::new(1.0, -2.0, 0.5));
        mesh.add_vertex(DVec3::new(-1.0, 3.0, 0.0));
        let (min, max) = mesh.bounding_box().unwrap();
        assert_eq!(min, DVec3::new(-1.0, -2.0, 0.0));
        assert_eq!(max, DVec3::new(1.0, 3.0, 0.5));
    }

    #[test]
    fn empty_mesh_has_no_bounding_box() {
        assert!(IndexedMesh::new().bounding_box().is_none());
    }

    #[test]
    fn triangle_source_resolves_positions() {
        let mut mesh = IndexedMesh::new();
        let a = mesh.add_vertex(DVec3::ZERO);
        let b = mesh.add_vertex(DVec3::X);
        let c = mesh.add_vertex(DVec3::Y);
        mesh.add_face(vec![a, b, c]);
        assert_eq!(mesh.face_vertices(0), vec![DVec3::ZERO, DVec3::X, DVec3::Y]);
    }
}
