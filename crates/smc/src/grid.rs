use glam::IVec3;

use crate::tables::CELL_CORNER_DELTA;

const UNKNOWN: i8 = -1;
const OUTSIDE: i8 = 0;
const INSIDE: i8 = 1;

/// Dense inside/outside cache over the `(scale + 1)^3` lattice.
///
/// Entries start unknown and are materialised lazily through
/// [`PointStateGrid::inside_cached`]. After tree construction every lattice
/// corner of a boundary cell holds a concrete state.
pub struct PointStateGrid {
    points_per_axis: usize,
    states: Vec<i8>,
}

impl PointStateGrid {
    /// Create an all-unknown grid for a `scale^3` cell lattice.
    pub fn new(scale: i32) -> Self {
        let points_per_axis = scale as usize + 1;
        Self {
            points_per_axis,
            states: vec![UNKNOWN; points_per_axis * points_per_axis * points_per_axis],
        }
    }

    fn index(&self, g: IVec3) -> usize {
        let n = self.points_per_axis;
        debug_assert!(
            (0..n as i32).contains(&g.x)
                && (0..n as i32).contains(&g.y)
                && (0..n as i32).contains(&g.z)
        );
        (g.z as usize * n + g.y as usize) * n + g.x as usize
    }

    /// Cached inside test; `sample` is invoked on first access only.
    pub fn inside_cached(&mut self, g: IVec3, sample: impl FnOnce() -> bool) -> bool {
        let idx = self.index(g);
        if self.states[idx] == UNKNOWN {
            self.states[idx] = if sample() { INSIDE } else { OUTSIDE };
        }
        self.states[idx] == INSIDE
    }

    /// Force the state of a lattice point to a concrete value.
    pub fn set(&mut self, g: IVec3, inside: bool) {
        let idx = self.index(g);
        self.states[idx] = if inside { INSIDE } else { OUTSIDE };
    }

    /// Inside state of a materialised point. Unknown points read as outside.
    pub fn inside(&self, g: IVec3) -> bool {
        self.states[self.index(g)] == INSIDE
    }

    pub fn is_known(&self, g: IVec3) -> bool {
        self.states[self.index(g)] != UNKNOWN
    }

    /// Cell configuration of the unit cell at `cell`, from cached states.
    ///
    /// Bit `i` is set iff the corner at `cell + CELL_CORNER_DELTA[i]` is
    /// outside the solid.
    pub fn cell_config(&self, cell: IVec3) -> u8 {
        let mut cfg = 0u8;
        for (i, delta) in CELL_CORNER_DELTA.iter().enumerate() {
            if !self.inside(cell + *delta) {
                cfg |= 1 << i;
            }
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazy_sampling_invokes_oracle_once() {
        let mut grid = PointStateGrid::new(4);
        let mut calls = 0;
        let g = IVec3::new(1, 2, 3);
        assert!(grid.inside_cached(g, || {
            calls += 1;
            true
        }));
        assert!(grid.inside_cached(g, || {
            calls += 1;
            false
        }));
        assert_eq!(calls, 1);
        assert!(grid.is_known(g));
    }

    #[test]
    fn unknown_points_read_outside() {
        let grid = PointStateGrid::new(2);
        assert!(!grid.inside(IVec3::ZERO));
        assert!(!grid.is_known(IVec3::ZERO));
    }

    #[test]
    fn config_is_all_bits_when_cell_outside() {
        let mut grid = PointStateGrid::new(2);
        for z in 0..=2 {
            for y in 0..=2 {
                for x in 0..=2 {
                    grid.set(IVec3::new(x, y, z), false);
                }
            }
        }
        assert_eq!(grid.cell_config(IVec3::ZERO), 255);
    }

    #[test]
    fn config_bit_tracks_single_outside_corner() {
        let mut grid = PointStateGrid::new(1);
        for z in 0..=1 {
            for y in 0..=1 {
                for x in 0..=1 {
                    grid.set(IVec3::new(x, y, z), true);
                }
            }
        }
        // Only the corner at delta (0, 1, 1) outside: that is corner bit 0.
        grid.set(IVec3::new(0, 1, 1), false);
        assert_eq!(grid.cell_config(IVec3::ZERO), 1);
    }
}
