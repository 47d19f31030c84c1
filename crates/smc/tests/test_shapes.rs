//! Shared fields, soups and mesh invariant helpers for the extraction tests.

use std::collections::{HashMap, HashSet};

use smc::glam::DVec3;
use smc::IndexedMesh;

pub fn sphere_field(p: DVec3) -> f64 {
    p.length_squared() - 1.0
}

pub fn cube_field(p: DVec3) -> f64 {
    p.x.abs().max(p.y.abs()).max(p.z.abs()) - 1.0
}

pub fn two_spheres_field(p: DVec3) -> f64 {
    let a = (p - DVec3::new(1.0, 0.0, 0.0)).length();
    let b = (p - DVec3::new(-1.0, 0.0, 0.0)).length();
    a.min(b) - 0.5
}

/// The twelve triangles of the axis-aligned cube `[0,1]^3`, outward-facing.
pub fn unit_cube_soup() -> IndexedMesh {
    let mut mesh = IndexedMesh::new();
    let corners = [
        DVec3::new(0.0, 0.0, 0.0),
        DVec3::new(1.0, 0.0, 0.0),
        DVec3::new(1.0, 1.0, 0.0),
        DVec3::new(0.0, 1.0, 0.0),
        DVec3::new(0.0, 0.0, 1.0),
        DVec3::new(1.0, 0.0, 1.0),
        DVec3::new(1.0, 1.0, 1.0),
        DVec3::new(0.0, 1.0, 1.0),
    ];
    for c in corners {
        mesh.add_vertex(c);
    }
    let triangles: [[u32; 3]; 12] = [
        [1, 3, 2],
        [1, 4, 3],
        [5, 6, 7],
        [5, 7, 8],
        [1, 2, 6],
        [1, 6, 5],
        [2, 3, 7],
        [2, 7, 6],
        [3, 4, 8],
        [3, 8, 7],
        [4, 1, 5],
        [4, 5, 8],
    ];
    for t in triangles {
        mesh.add_face(t.to_vec());
    }
    mesh
}

/// Usage counts of undirected and directed edges over all faces.
pub fn edge_use_counts(
    mesh: &IndexedMesh,
) -> (HashMap<(u32, u32), u32>, HashMap<(u32, u32), u32>) {
    let mut undirected = HashMap::new();
    let mut directed = HashMap::new();
    for face in mesh.faces() {
        let n = face.len();
        for i in 0..n {
            let a = face[i];
            let b = face[(i + 1) % n];
            let key = if a < b { (a, b) } else { (b, a) };
            *undirected.entry(key).or_insert(0) += 1;
            *directed.entry((a, b)).or_insert(0) += 1;
        }
    }
    (undirected, directed)
}

/// Every undirected edge bounds at most two faces; every directed edge at
/// most one.
pub fn assert_edge_manifold(mesh: &IndexedMesh) {
    let (undirected, directed) = edge_use_counts(mesh);
    for (edge, count) in &undirected {
        assert!(*count <= 2, "edge {edge:?} bounds {count} faces");
    }
    for (edge, count) in &directed {
        assert!(*count <= 1, "directed edge {edge:?} used {count} times");
    }
}

/// No two vertices collapse to the same 1e10-quantised key.
pub fn assert_distinct_quantised_keys(mesh: &IndexedMesh) {
    let mut keys = HashSet::new();
    for v in mesh.vertices() {
        let key = (
            (v.x * 1e10).round() as i64,
            (v.y * 1e10).round() as i64,
            (v.z * 1e10).round() as i64,
        );
        assert!(keys.insert(key), "duplicate quantised vertex at {v}");
    }
}

/// All vertices lie inside the given box, inflated by `tolerance`.
pub fn assert_contained(mesh: &IndexedMesh, min: DVec3, max: DVec3, tolerance: f64) {
    for v in mesh.vertices() {
        assert!(
            v.cmpge(min - DVec3::splat(tolerance)).all()
                && v.cmple(max + DVec3::splat(tolerance)).all(),
            "vertex {v} escapes [{min}, {max}]"
        );
    }
}

struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n as u32).collect(),
        }
    }

    fn find(&mut self, i: u32) -> u32 {
        let mut root = i;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut walk = i;
        while self.parent[walk as usize] != root {
            let next = self.parent[walk as usize];
            self.parent[walk as usize] = root;
            walk = next;
        }
        root
    }

    fn union(&mut self, a: u32, b: u32) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb as usize] = ra;
        }
    }
}

/// Per connected component: referenced vertex count, distinct undirected
/// edge count, face count.
pub fn component_counts(mesh: &IndexedMesh) -> Vec<(usize, usize, usize)> {
    let mut uf = UnionFind::new(mesh.vertex_count() + 1);
    for face in mesh.faces() {
        for pair in face.windows(2) {
            uf.union(pair[0], pair[1]);
        }
    }

    let mut vertices: HashMap<u32, HashSet<u32>> = HashMap::new();
    let mut edges: HashMap<u32, HashSet<(u32, u32)>> = HashMap::new();
    let mut faces: HashMap<u32, usize> = HashMap::new();
    for face in mesh.faces() {
        let root = uf.find(face[0]);
        *faces.entry(root).or_default() += 1;
        let n = face.len();
        for i in 0..n {
            let a = face[i];
            let b = face[(i + 1) % n];
            vertices.entry(root).or_default().insert(a);
            let key = if a < b { (a, b) } else { (b, a) };
            edges.entry(root).or_default().insert(key);
        }
    }

    let mut out: Vec<(usize, usize, usize)> = faces
        .iter()
        .map(|(root, &f)| (vertices[root].len(), edges[root].len(), f))
        .collect();
    out.sort();
    out
}

/// Euler characteristic V - E + F of a single-component mesh.
pub fn euler_characteristic(mesh: &IndexedMesh) -> i64 {
    let components = component_counts(mesh);
    assert_eq!(components.len(), 1, "expected a single component");
    let (v, e, f) = components[0];
    v as i64 - e as i64 + f as i64
}
