//! The extraction pipeline: voxel-accurate construction, bottom-up planar
//! merging, and per-leaf triangulation.

use std::collections::VecDeque;
use std::time::Instant;

use glam::{DVec3, IVec3};
use serde::Serialize;
use tracing::{debug, info};

use crate::dedup::VertexPool;
use crate::grid::PointStateGrid;
use crate::guard::ManifoldGuard;
use crate::mesh::{MeshSink, TriangleSource};
use crate::octree::{NodeId, NodeParms, OctreeStore, VoxelRange};
use crate::oracle::{FieldOracle, ImplicitOracle, TriangleSoupOracle};
use crate::plane::{self, D_INVALID};
use crate::tables::{
    remap_to_mc, CELL_CORNER_DELTA, EDGE_CORNERS, MC_CORNER_OFFSET, NORMAL_BY_TYPE,
    NORMAL_NOT_SIMPLE, TRI_TABLE,
};

pub const MIN_DEPTH: i32 = 1;
pub const MAX_DEPTH: i32 = 9;

/// Cross products below this norm denote a zero-area triangle.
const DEGENERATE_NORMAL: f64 = 1e-10;

/// Slack for the in-cube check of analytic plane/edge intersections.
const PLANE_POINT_TOLERANCE: f64 = 1e-9;

/// Equal-value cutoff for edge interpolation.
const INTERPOLATION_EPSILON: f64 = 1e-12;

/// Extraction behaviour switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Triangulate merged leaves from their stored plane signature instead
    /// of resampling their cells at the finest resolution. The planar form
    /// snaps the patch to the lattice plane the merge detected; resampling
    /// reproduces the voxel-accurate surface seamlessly.
    pub planar_leaves: bool,
}

/// Diagnostic counters of one extraction pass.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct Stats {
    pub boundary_cells: u64,
    pub merged_nodes: u64,
    pub visited_nodes: u64,
    pub visited_leaves: u64,
    pub vertices: u64,
    pub faces: u64,
    pub degenerate_faces: u64,
    pub rejected_faces: u64,
    pub construct_ms: u64,
    pub shrink_ms: u64,
    pub extract_ms: u64,
    pub total_ms: u64,
}

/// Simplicial marching cubes extractor over an adaptive octree.
///
/// The root cube is axis-aligned, centred on the data, with side equal to
/// the largest bounding-box extent. Depth fixes the finest lattice at
/// `2^depth` voxels per axis.
pub struct SurfaceExtractor<O: FieldOracle> {
    oracle: O,
    max_depth: u32,
    scale: i32,
    root_min: DVec3,
    step: f64,
    options: ExtractOptions,
}

impl<F: Fn(DVec3) -> f64> SurfaceExtractor<ImplicitOracle<F>> {
    /// Extractor for the sub-level set `{p : field(p) < isovalue}`.
    pub fn from_implicit(
        field: F,
        isovalue: f64,
        bbox_min: DVec3,
        bbox_max: DVec3,
        max_depth: i32,
    ) -> Self {
        Self::new(ImplicitOracle::new(field, isovalue), bbox_min, bbox_max, max_depth)
    }
}

impl SurfaceExtractor<TriangleSoupOracle> {
    /// Extractor for the interior of a triangle soup, classified by
    /// ray-crossing parity.
    pub fn from_mesh<S: TriangleSource>(source: &S, max_depth: i32) -> Self {
        let oracle = TriangleSoupOracle::from_source(source);
        let (min, max) = oracle.bounding_box().unwrap_or((DVec3::ZERO, DVec3::ONE));
        Self::new(oracle, min, max, max_depth)
    }
}

impl<O: FieldOracle> SurfaceExtractor<O> {
    /// Generic constructor over any oracle. `max_depth` is clamped to
    /// `[MIN_DEPTH, MAX_DEPTH]`.
    pub fn new(oracle: O, bbox_min: DVec3, bbox_max: DVec3, max_depth: i32) -> Self {
        let max_depth = max_depth.clamp(MIN_DEPTH, MAX_DEPTH) as u32;
        let scale = 1i32 << max_depth;
        let size = bbox_max - bbox_min;
        let mut side = size.max_element();
        if side <= 1e-12 {
            side = 1.0;
        }
        let center = (bbox_min + bbox_max) * 0.5;
        Self {
            oracle,
            max_depth,
            scale,
            root_min: center - DVec3::splat(side * 0.5),
            step: side / scale as f64,
            options: ExtractOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Voxels per axis at the finest resolution.
    pub fn scale(&self) -> i32 {
        self.scale
    }

    /// World-space side of one finest voxel.
    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn root_min(&self) -> DVec3 {
        self.root_min
    }

    pub fn root_max(&self) -> DVec3 {
        self.root_min + DVec3::splat(self.step * self.scale as f64)
    }

    fn grid_to_world(&self, g: DVec3) -> DVec3 {
        self.root_min + g * self.step
    }

    /// Run the full pipeline, feeding the resulting mesh into `out`.
    ///
    /// Vertex and face ids are issued from 1 in a deterministic order; two
    /// invocations over the same oracle produce identical sequences.
    pub fn extract<M: MeshSink>(&self, out: &mut M) -> Stats {
        let total_start = Instant::now();
        let mut stats = Stats::default();
        let mut grid = PointStateGrid::new(self.scale);
        let mut store = OctreeStore::new(self.max_depth);
        let mut queue = VecDeque::new();

        let t = Instant::now();
        self.construct_tree(&mut grid, &mut store, &mut queue, &mut stats);
        self.refine_point_state(&mut grid);
        stats.construct_ms = t.elapsed().as_millis() as u64;

        let t = Instant::now();
        self.shrink_tree(&mut store, &mut queue, &mut stats);
        stats.shrink_ms = t.elapsed().as_millis() as u64;

        let t = Instant::now();
        self.triangulate(&grid, &store, out, &mut stats);
        stats.extract_ms = t.elapsed().as_millis() as u64;
        stats.total_ms = total_start.elapsed().as_millis() as u64;

        info!(
            vertices = stats.vertices,
            faces = stats.faces,
            rejected = stats.rejected_faces,
            total_ms = stats.total_ms,
            "extraction done"
        );
        stats
    }

    /// Walk all finest cells in z-major order, materialising the leaf chain
    /// of every boundary cell and seeding the merge queue with its parent.
    fn construct_tree(
        &self,
        grid: &mut PointStateGrid,
        store: &mut OctreeStore,
        queue: &mut VecDeque<NodeId>,
        stats: &mut Stats,
    ) {
        let scale = self.scale;
        let total = (scale as i64).pow(3);
        info!(cells = total, "construct start");
        let z_log_step = (scale / 8).max(1);

        for z in 0..scale {
            for y in 0..scale {
                for x in 0..scale {
                    let cell = IVec3::new(x, y, z);
                    let mut config = 0u8;
                    for (i, delta) in CELL_CORNER_DELTA.iter().enumerate() {
                        let g = cell + *delta;
                        let inside = grid.inside_cached(g, || {
                            self.oracle.inside_robust(self.grid_to_world(g.as_dvec3()))
                        });
                        if !inside {
                            config |= 1 << i;
                        }
                    }
                    if config == 0 || config == 255 {
                        continue;
                    }
                    let leaf = store.create_to_leaf(cell);
                    {
                        let node = store.node_mut(leaf);
                        node.parms = NodeParms {
                            valid: true,
                            config,
                            d: plane::plane_d(cell, config),
                        };
                        node.visited = true;
                    }
                    stats.boundary_cells += 1;
                    if let Some(parent) = store.node(leaf).parent {
                        if !store.node(parent).visited {
                            store.node_mut(parent).visited = true;
                            queue.push_back(parent);
                        }
                    }
                }
            }
            if (z + 1) % z_log_step == 0 || z + 1 == scale {
                debug!(
                    plane = z + 1,
                    of = scale,
                    boundary = stats.boundary_cells,
                    "construct progress"
                );
            }
        }
        info!(boundary_cells = stats.boundary_cells, "construct done");
    }

    /// Second pass over all cells: force concrete oracle samples at every
    /// corner of every boundary cell, so corners shared with interior
    /// neighbours reflect the oracle rather than a stale state.
    fn refine_point_state(&self, grid: &mut PointStateGrid) {
        let mut refined = 0u64;
        for z in 0..self.scale {
            for y in 0..self.scale {
                for x in 0..self.scale {
                    let cell = IVec3::new(x, y, z);
                    let config = grid.cell_config(cell);
                    if config == 0 || config == 255 {
                        continue;
                    }
                    for delta in &CELL_CORNER_DELTA {
                        let g = cell + *delta;
                        let inside = self.oracle.inside_robust(self.grid_to_world(g.as_dvec3()));
                        grid.set(g, inside);
                    }
                    refined += 1;
                }
            }
        }
        debug!(cells = refined, "refined corner states");
    }

    /// Drain the merge queue once, collapsing coplanar sibling groups
    /// bottom-up and propagating candidates upward.
    fn shrink_tree(
        &self,
        store: &mut OctreeStore,
        queue: &mut VecDeque<NodeId>,
        stats: &mut Stats,
    ) {
        info!(queue = queue.len(), "shrink start");
        let mut popped = 0u64;
        while let Some(id) = queue.pop_front() {
            popped += 1;
            store.node_mut(id).visited = false;
            if let Some(d) = plane::can_merge(store, id) {
                let config = plane::synthesize_config(store, id);
                store.remove_children(id);
                store.node_mut(id).parms = NodeParms {
                    valid: true,
                    config,
                    d,
                };
                stats.merged_nodes += 1;
                if let Some(parent) = store.node(id).parent {
                    if !store.node(parent).visited {
                        store.node_mut(parent).visited = true;
                        queue.push_back(parent);
                    }
                }
            }
        }
        info!(popped, merged = stats.merged_nodes, "shrink done");
    }

    /// Breadth-first walk over leaves, emitting triangles through the
    /// deduplicator and the manifold guard.
    fn triangulate<M: MeshSink>(
        &self,
        grid: &PointStateGrid,
        store: &OctreeStore,
        out: &mut M,
        stats: &mut Stats,
    ) {
        let mut emitter = Emitter {
            out,
            pool: VertexPool::new(),
            guard: ManifoldGuard::new(),
            next_face_id: 1,
            degenerate: 0,
        };
        let mut bfs = VecDeque::from([store.root()]);
        while let Some(id) = bfs.pop_front() {
            stats.visited_nodes += 1;
            let node = store.node(id);
            if node.is_leaf() {
                stats.visited_leaves += 1;
                if self.options.planar_leaves && !node.range.is_single() && node.parms.valid {
                    self.emit_planar_leaf(grid, node.parms, node.range, &mut emitter);
                } else {
                    self.emit_cells(grid, node.range, &mut emitter);
                }
            } else {
                for child in node.children.iter().flatten() {
                    bfs.push_back(*child);
                }
            }
            if stats.visited_nodes % 20_000 == 0 {
                debug!(
                    nodes = stats.visited_nodes,
                    leaves = stats.visited_leaves,
                    faces = emitter.next_face_id - 1,
                    "extract progress"
                );
            }
        }
        stats.vertices = emitter.pool.len() as u64;
        stats.faces = (emitter.next_face_id - 1) as u64;
        stats.degenerate_faces = emitter.degenerate;
        stats.rejected_faces = emitter.guard.rejected();
    }

    /// Per-cell marching cubes over every boundary cell in `range`.
    fn emit_cells<M: MeshSink>(
        &self,
        grid: &PointStateGrid,
        range: VoxelRange,
        emitter: &mut Emitter<'_, M>,
    ) {
        for z in range.min.z..=range.max.z {
            for y in range.min.y..=range.max.y {
                for x in range.min.x..=range.max.x {
                    let cell = IVec3::new(x, y, z);
                    let config = grid.cell_config(cell);
                    if config == 0 || config == 255 {
                        continue;
                    }
                    self.emit_cell_mc(cell, config, emitter);
                }
            }
        }
    }

    /// Marching-cubes triangulation of a single voxel cell.
    fn emit_cell_mc<M: MeshSink>(&self, cell: IVec3, config: u8, emitter: &mut Emitter<'_, M>) {
        let mc_config = remap_to_mc(config);
        if mc_config == 0 || mc_config == 255 {
            return;
        }
        let corners =
            MC_CORNER_OFFSET.map(|offset| self.grid_to_world((cell + offset).as_dvec3()));
        let edge_points =
            EDGE_CORNERS.map(|[a, b]| self.intersect_edge(corners[a], corners[b]));
        let cell_center = self.grid_to_world(cell.as_dvec3() + DVec3::splat(0.5));

        let row = &TRI_TABLE[mc_config as usize];
        let mut i = 0;
        while row[i] >= 0 {
            let mut p0 = edge_points[row[i] as usize];
            let mut p1 = edge_points[row[i + 1] as usize];
            let mut p2 = edge_points[row[i + 2] as usize];
            i += 3;
            let n = (p1 - p0).cross(p2 - p0);
            if n.length() <= DEGENERATE_NORMAL {
                emitter.degenerate += 1;
                continue;
            }
            // Orient along the outward field gradient; without one, use the
            // cell-centre to triangle-centre direction as a surrogate.
            let centroid = (p0 + p1 + p2) / 3.0;
            let orient = self
                .oracle
                .gradient(centroid)
                .unwrap_or(centroid - cell_center);
            if n.dot(orient) < 0.0 {
                std::mem::swap(&mut p1, &mut p2);
            }
            emitter.emit_triangle(p0, p1, p2);
        }
    }

    /// Isosurface crossing on the edge `p0`..`p1` by linear interpolation of
    /// the oracle's scalar field; edge midpoint when no field is available
    /// or the values do not bracket a crossing.
    fn intersect_edge(&self, p0: DVec3, p1: DVec3) -> DVec3 {
        match (self.oracle.value(p0), self.oracle.value(p1)) {
            (Some(f0), Some(f1)) => {
                if (f1 - f0).abs() < INTERPOLATION_EPSILON || f0 * f1 > 0.0 {
                    (p0 + p1) * 0.5
                } else {
                    let t = (-f0 / (f1 - f0)).clamp(0.0, 1.0);
                    p0 + (p1 - p0) * t
                }
            }
            _ => (p0 + p1) * 0.5,
        }
    }

    /// Triangulate a merged leaf from its plane signature: intersect the
    /// stored plane with the coarse cell's edges analytically, falling back
    /// to edge midpoints on numerical pathology.
    fn emit_planar_leaf<M: MeshSink>(
        &self,
        grid: &PointStateGrid,
        parms: NodeParms,
        range: VoxelRange,
        emitter: &mut Emitter<'_, M>,
    ) {
        let nt = plane::normal_type(parms.config);
        if nt >= NORMAL_NOT_SIMPLE || parms.d == D_INVALID {
            // Signature degenerated during synthesis: resample the cells.
            self.emit_cells(grid, range, emitter);
            return;
        }
        let mc_config = remap_to_mc(parms.config);
        if mc_config == 0 || mc_config == 255 {
            return;
        }
        let normal = NORMAL_BY_TYPE[nt as usize];
        let side = range.side();
        let corners =
            MC_CORNER_OFFSET.map(|offset| self.grid_to_world((range.min + offset * side).as_dvec3()));
        let edge_mid: [DVec3; 12] = EDGE_CORNERS.map(|[a, b]| (corners[a] + corners[b]) * 0.5);
        let pmin = corners[0];
        let pmax = corners[6];
        let in_cube = |p: DVec3| {
            p.is_finite()
                && p.cmpge(pmin - DVec3::splat(PLANE_POINT_TOLERANCE)).all()
                && p.cmple(pmax + DVec3::splat(PLANE_POINT_TOLERANCE)).all()
        };

        let row = &TRI_TABLE[mc_config as usize];
        let mut i = 0;
        while row[i] >= 0 {
            let edges = [row[i] as usize, row[i + 1] as usize, row[i + 2] as usize];
            i += 3;
            let points = edges.map(|e| {
                let p = self.plane_edge_point(range, e, normal, parms.d);
                if in_cube(p) {
                    p
                } else {
                    edge_mid[e]
                }
            });
            let n = (points[1] - points[0]).cross(points[2] - points[0]);
            if n.length() <= DEGENERATE_NORMAL {
                emitter.degenerate += 1;
                continue;
            }
            emitter.emit_triangle(points[0], points[1], points[2]);
        }
    }

    /// Intersection of the plane `normal . g = d` with a cube edge, solved
    /// for the coordinate that varies along the edge; the other two are the
    /// edge's face coordinates. All in finest-lattice coordinates.
    fn plane_edge_point(&self, range: VoxelRange, edge: usize, normal: IVec3, d: i32) -> DVec3 {
        let [a, b] = EDGE_CORNERS[edge];
        let oa = MC_CORNER_OFFSET[a];
        let ob = MC_CORNER_OFFSET[b];
        let side = range.side();
        let axis = if oa.x != ob.x {
            0
        } else if oa.y != ob.y {
            1
        } else {
            2
        };
        let n = normal.as_dvec3();
        if n[axis] == 0.0 {
            // Plane parallel to the edge: no single crossing exists.
            return DVec3::NAN;
        }
        let mut g = (range.min + oa * side).as_dvec3();
        let fixed = n.dot(g) - n[axis] * g[axis];
        g[axis] = (d as f64 - fixed) / n[axis];
        self.grid_to_world(g)
    }
}

/// Output side of the pipeline: deduplicated vertices, guarded faces,
/// sequential face ids.
struct Emitter<'a, M: MeshSink> {
    out: &'a mut M,
    pool: VertexPool,
    guard: ManifoldGuard,
    next_face_id: u32,
    degenerate: u64,
}

impl<M: MeshSink> Emitter<'_, M> {
    fn emit_triangle(&mut self, p0: DVec3, p1: DVec3, p2: DVec3) {
        let mut loop_ids = vec![
            self.pool.get_or_create(p0, &mut *self.out),
            self.pool.get_or_create(p1, &mut *self.out),
            self.pool.get_or_create(p2, &mut *self.out),
        ];
        if self.guard.try_admit(&mut loop_ids) {
            self.out.create_face(self.next_face_id, &loop_ids);
            self.next_face_id += 1;
        }
    }
}
