//! Arena-backed octree over integer voxel ranges.
//!
//! Nodes are addressed by [`NodeId`] indices into the arena; the parent link
//! is a back-index, never an ownership edge. Removing a subtree returns its
//! slots to a free list, so no raw references survive a mutation.

use glam::IVec3;

/// Index of a node in the [`OctreeStore`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// Inclusive integer voxel box, always a power-of-two cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelRange {
    pub min: IVec3,
    pub max: IVec3,
}

impl VoxelRange {
    pub fn new(min: IVec3, max: IVec3) -> Self {
        Self { min, max }
    }

    /// Whether the range covers exactly one voxel.
    pub fn is_single(&self) -> bool {
        self.min == self.max
    }

    /// Side length in voxels.
    pub fn side(&self) -> i32 {
        self.max.x - self.min.x + 1
    }

    /// Range of the child at octant `index` (bit 0 = x, bit 1 = y, bit 2 = z).
    pub fn child(&self, index: usize) -> Self {
        let half = (self.max - self.min + IVec3::ONE) / 2;
        let mut min = self.min;
        let mut max = self.max;
        if index & 1 == 0 {
            max.x = self.min.x + half.x - 1;
        } else {
            min.x = self.min.x + half.x;
        }
        if index & 2 == 0 {
            max.y = self.min.y + half.y - 1;
        } else {
            min.y = self.min.y + half.y;
        }
        if index & 4 == 0 {
            max.z = self.min.z + half.z - 1;
        } else {
            min.z = self.min.z + half.z;
        }
        Self { min, max }
    }
}

/// Per-node surface parameters set during construction and merging.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeParms {
    pub valid: bool,
    /// Cell configuration at the node's resolution, construction corner order.
    pub config: u8,
    /// Plane coefficient in finest-lattice coordinates.
    pub d: i32,
}

#[derive(Debug)]
pub struct OctreeNode {
    pub children: [Option<NodeId>; 8],
    pub parent: Option<NodeId>,
    pub index_in_parent: u8,
    /// Depth counted from the leaves upward: finest leaves sit at 0.
    pub layer_index: u8,
    pub range: VoxelRange,
    /// Transient mark used by the merge queue for single-enqueue semantics.
    pub visited: bool,
    pub parms: NodeParms,
}

impl OctreeNode {
    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }
}

/// Arena owning all octree nodes of one extraction pass.
pub struct OctreeStore {
    nodes: Vec<OctreeNode>,
    free: Vec<u32>,
    root: NodeId,
    max_depth: u32,
}

impl OctreeStore {
    /// Create a store holding only the root, spanning `[0, 2^max_depth)` voxels.
    pub fn new(max_depth: u32) -> Self {
        let scale = 1 << max_depth;
        let root_node = OctreeNode {
            children: [None; 8],
            parent: None,
            index_in_parent: 0,
            layer_index: max_depth as u8,
            range: VoxelRange::new(IVec3::ZERO, IVec3::splat(scale - 1)),
            visited: false,
            parms: NodeParms::default(),
        };
        Self {
            nodes: vec![root_node],
            free: Vec::new(),
            root: NodeId(0),
            max_depth,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &OctreeNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut OctreeNode {
        &mut self.nodes[id.0 as usize]
    }

    /// Octant index of `cell` at the level selecting on `bit`.
    pub fn child_index_on(cell: IVec3, bit: u32) -> usize {
        let mut index = 0;
        if cell.x & (1 << bit) != 0 {
            index |= 1;
        }
        if cell.y & (1 << bit) != 0 {
            index |= 2;
        }
        if cell.z & (1 << bit) != 0 {
            index |= 4;
        }
        index
    }

    fn alloc(&mut self, node: OctreeNode) -> NodeId {
        if let Some(slot) = self.free.pop() {
            self.nodes[slot as usize] = node;
            NodeId(slot)
        } else {
            self.nodes.push(node);
            NodeId(self.nodes.len() as u32 - 1)
        }
    }

    /// Materialise the chain from the root down to the leaf holding `cell`,
    /// allocating any missing intermediates, and return the leaf.
    pub fn create_to_leaf(&mut self, cell: IVec3) -> NodeId {
        let mut current = self.root;
        for level in 1..=self.max_depth {
            let index = Self::child_index_on(cell, self.max_depth - level);
            if let Some(child) = self.node(current).children[index] {
                current = child;
            } else {
                let parent = self.node(current);
                let child_node = OctreeNode {
                    children: [None; 8],
                    parent: Some(current),
                    index_in_parent: index as u8,
                    layer_index: parent.layer_index - 1,
                    range: parent.range.child(index),
                    visited: false,
                    parms: NodeParms::default(),
                };
                let child = self.alloc(child_node);
                self.node_mut(current).children[index] = Some(child);
                current = child;
            }
        }
        current
    }

    /// Delete all descendants of `id`, returning their slots to the free list.
    pub fn remove_children(&mut self, id: NodeId) {
        let children = std::mem::replace(&mut self.node_mut(id).children, [None; 8]);
        for child in children.into_iter().flatten() {
            self.remove_children(child);
            self.free.push(child.0);
        }
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
