//! Grid-backed spatial index.

use std::collections::HashMap;

use crate::point::Point;
use crate::traits::SpatialIndex;

/// A [`SpatialIndex`] mapping integer grid points to point indices.
///
/// Built once over a point slice; lookups are O(1) and neighbourhood queries
/// enumerate the fixed 3^d stencil around a cell. Where several points share
/// a grid cell the last one wins, matching the occupancy semantics of a
/// gridded field (one sample per cell).
pub struct GridIndex {
    cells: HashMap<Vec<i64>, usize>,
    stencil: Vec<Vec<i64>>,
}

impl GridIndex {
    /// Build an index over `points`.
    pub fn build(points: &[Point]) -> Self {
        let spatial_rank = points.first().map_or(0, Point::spatial_rank);
        let mut cells = HashMap::with_capacity(points.len());
        for (i, p) in points.iter().enumerate() {
            cells.insert(p.gridpoint.clone(), i);
        }
        Self {
            cells,
            stencil: stencil_offsets(spatial_rank),
        }
    }

    /// Number of occupied cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl SpatialIndex for GridIndex {
    fn lookup(&self, gridpoint: &[i64]) -> Option<usize> {
        self.cells.get(gridpoint).copied()
    }

    fn neighbours(&self, gridpoint: &[i64]) -> Vec<usize> {
        let mut result = Vec::new();
        let mut probe = vec![0i64; gridpoint.len()];
        for offset in &self.stencil {
            for (d, (g, o)) in gridpoint.iter().zip(offset.iter()).enumerate() {
                probe[d] = g + o;
            }
            if let Some(&i) = self.cells.get(&probe) {
                result.push(i);
            }
        }
        result
    }
}

/// All offsets of the 3^d stencil except the all-zero center.
pub fn stencil_offsets(rank: usize) -> Vec<Vec<i64>> {
    let count = 3usize.pow(rank as u32);
    let mut offsets = Vec::with_capacity(count.saturating_sub(1));
    for mut code in 0..count {
        let mut offset = vec![0i64; rank];
        for slot in offset.iter_mut() {
            *slot = (code % 3) as i64 - 1;
            code /= 3;
        }
        if offset.iter().any(|&o| o != 0) {
            offsets.push(offset);
        }
    }
    offsets
}
