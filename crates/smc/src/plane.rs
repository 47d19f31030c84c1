//! Planar signatures of cell configurations and the bottom-up merge
//! predicate.
//!
//! A configuration with a simple normal type admits a single separating
//! plane `n . p = d` in finest-lattice coordinates. Eight siblings that
//! agree on the normal type and on `d` describe one plane and collapse into
//! their parent during the shrink pass.

use glam::IVec3;

use crate::octree::{NodeId, OctreeStore};
use crate::tables::{
    CONFIG_EQ_TYPE, CONFIG_NORMAL_TYPE, MID_CORNER_SOURCE, NORMAL_NOT_SIMPLE,
    PARENT_CORNER_SOURCE, PLANE_EQ_BY_TYPE,
};

/// Sentinel `d` for configurations with no plane equation.
pub const D_INVALID: i32 = i32::MIN;

/// Normal-type id of a configuration; `NORMAL_NOT_SIMPLE` when it has no
/// single separating plane.
pub fn normal_type(config: u8) -> u8 {
    CONFIG_NORMAL_TYPE[config as usize]
}

pub fn is_simple(config: u8) -> bool {
    normal_type(config) != NORMAL_NOT_SIMPLE
}

/// Plane coefficient of a cell at `cell` with configuration `config`,
/// or `D_INVALID` when no equation applies.
pub fn plane_d(cell: IVec3, config: u8) -> i32 {
    let eq = CONFIG_EQ_TYPE[config as usize];
    if eq as usize >= PLANE_EQ_BY_TYPE.len() {
        return D_INVALID;
    }
    let e = PLANE_EQ_BY_TYPE[eq as usize];
    e.d + e.a * cell.x + e.b * cell.y + e.c * cell.z
}

/// Merge predicate: all existing children of `id` are valid, all have a
/// simple normal type, and all agree on normal type and plane coefficient.
/// Returns the common coefficient.
pub fn can_merge(store: &OctreeStore, id: NodeId) -> Option<i32> {
    let node = store.node(id);
    let mut common: Option<(u8, i32)> = None;
    for child in node.children.iter().flatten() {
        let parms = store.node(*child).parms;
        if !parms.valid {
            return None;
        }
        let nt = normal_type(parms.config);
        if nt == NORMAL_NOT_SIMPLE {
            return None;
        }
        match common {
            None => common = Some((nt, parms.d)),
            Some((first_nt, first_d)) => {
                if nt != first_nt || parms.d != first_d {
                    return None;
                }
            }
        }
    }
    common.map(|(_, d)| d)
}

/// Reconstruct a parent's 8-corner configuration from its children.
///
/// Corner `i` of the parent coincides with corner `PARENT_CORNER_SOURCE[i]`
/// of child `i`; a missing child contributes the fill state read from the
/// first valid child's centre-point bit (`MID_CORNER_SOURCE`).
pub fn synthesize_config(store: &OctreeStore, id: NodeId) -> u8 {
    let node = store.node(id);
    let mut first: Option<(usize, u8)> = None;
    for (i, child) in node.children.iter().enumerate() {
        if let Some(child) = child {
            let parms = store.node(*child).parms;
            if parms.valid {
                first = Some((i, parms.config));
                break;
            }
        }
    }
    let Some((first_index, first_config)) = first else {
        return 0;
    };

    let fill = if first_config & (1 << MID_CORNER_SOURCE[first_index]) == 0 {
        0u8
    } else {
        255u8
    };
    let mut out = 0u8;
    for i in 0..8 {
        let config = match node.children[i] {
            Some(child) if store.node(child).parms.valid => store.node(child).parms.config,
            _ => fill,
        };
        out |= config & (1 << PARENT_CORNER_SOURCE[i]);
    }
    out
}
