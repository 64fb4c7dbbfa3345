//! Occupancy index over a set of clusters.

use std::collections::HashMap;

use stormcell_core::grid::stencil_offsets;

use crate::cluster::Cluster;

/// Maps grid cells to the position of the occupying cluster in a cluster
/// slice.
///
/// Built once over the slice and used for coverage ratios during tracking
/// and for adjacency queries during post-processing. Positions are indices
/// into the slice the index was built from; the caller must not reorder
/// that slice while the index is alive.
pub struct ClusterIndex {
    cells: HashMap<Vec<i64>, usize>,
    spatial_rank: usize,
}

impl ClusterIndex {
    /// Build an index over `clusters`.
    pub fn build(clusters: &[Cluster]) -> Self {
        let mut cells = HashMap::new();
        let mut spatial_rank = 0;
        for (pos, cluster) in clusters.iter().enumerate() {
            for p in &cluster.points {
                spatial_rank = p.spatial_rank();
                cells.insert(p.gridpoint.clone(), pos);
            }
        }
        Self {
            cells,
            spatial_rank,
        }
    }

    /// Position of the cluster occupying `gridpoint`, if any.
    pub fn cluster_at(&self, gridpoint: &[i64]) -> Option<usize> {
        self.cells.get(gridpoint).copied()
    }

    /// Fraction of `covered`'s points whose grid cell this index attributes
    /// to the cluster at position `covering_pos`.
    ///
    /// Note the index is typically built over a *different* cluster list
    /// than `covered` comes from; this is how cross-time-step coverage is
    /// measured.
    pub fn occupation_ratio(&self, covered: &Cluster, covering_pos: usize) -> f64 {
        if covered.is_empty() {
            return 0.0;
        }
        let occupied = covered
            .points
            .iter()
            .filter(|p| self.cluster_at(&p.gridpoint) == Some(covering_pos))
            .count();
        occupied as f64 / covered.size() as f64
    }

    /// Positions of all clusters other than `pos` whose points touch the
    /// 3^d stencil around any point of the cluster at `pos`.
    pub fn neighbours_of(&self, clusters: &[Cluster], pos: usize) -> Vec<usize> {
        let Some(cluster) = clusters.get(pos) else {
            return Vec::new();
        };
        let stencil = stencil_offsets(self.spatial_rank);
        let mut found = Vec::new();
        let mut probe = vec![0i64; self.spatial_rank];
        for p in &cluster.points {
            for offset in &stencil {
                for (d, (g, o)) in p.gridpoint.iter().zip(offset.iter()).enumerate() {
                    probe[d] = g + o;
                }
                if let Some(other) = self.cluster_at(&probe) {
                    if other != pos && !found.contains(&other) {
                        found.push(other);
                    }
                }
            }
        }
        found
    }
}
