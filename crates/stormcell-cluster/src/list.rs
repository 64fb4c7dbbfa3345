//! The per-time-step cluster list.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use stormcell_core::{CoreError, CoreResult};

use crate::cluster::Cluster;
use crate::index::ClusterIndex;

/// All clusters detected in one time step, plus the tracking annotations
/// produced when the list is matched against its predecessor.
///
/// The ordered-set and ordered-map annotation types keep serialized output
/// deterministic across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterList {
    /// The clusters themselves.
    pub clusters: Vec<Cluster>,
    /// Names of the spatial feature variables, in feature-vector order.
    pub spatial_variables: Vec<String>,
    /// Names of the value feature variables, in feature-vector order.
    pub value_variables: Vec<String>,
    /// Valid time of this time step, seconds since epoch.
    pub timestamp: i64,
    /// Highest tracking id ever handed out in this list's history.
    pub highest_id: Option<u64>,
    /// Highest per-run uuid handed out.
    pub highest_uuid: Option<u64>,
    /// Whether tracking has been run against a predecessor list.
    pub tracking_performed: bool,
    /// Ids carried over from the previous time step.
    pub tracked_ids: BTreeSet<u64>,
    /// Ids handed out fresh in this time step.
    pub new_ids: BTreeSet<u64>,
    /// Previous-step ids with no continuation in this time step.
    pub dropped_ids: BTreeSet<u64>,
    /// For each id in this step that absorbed several predecessors: the
    /// contributing previous-step ids.
    pub merges: BTreeMap<u64, BTreeSet<u64>>,
    /// For each previous-step id that split: the resulting ids in this step.
    pub splits: BTreeMap<u64, BTreeSet<u64>>,
}

impl ClusterList {
    /// Create an empty list for one time step.
    pub fn new(
        spatial_variables: Vec<String>,
        value_variables: Vec<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            clusters: Vec::new(),
            spatial_variables,
            value_variables,
            timestamp,
            highest_id: None,
            highest_uuid: None,
            tracking_performed: false,
            tracked_ids: BTreeSet::new(),
            new_ids: BTreeSet::new(),
            dropped_ids: BTreeSet::new(),
            merges: BTreeMap::new(),
            splits: BTreeMap::new(),
        }
    }

    /// Number of clusters.
    pub fn size(&self) -> usize {
        self.clusters.len()
    }

    /// Whether the list has no clusters.
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Total number of points across all clusters.
    pub fn point_count(&self) -> usize {
        self.clusters.iter().map(Cluster::size).sum()
    }

    /// Position of the cluster carrying `id`, if any.
    pub fn find_by_id(&self, id: u64) -> Option<usize> {
        self.clusters.iter().position(|c| c.id == Some(id))
    }

    /// Remove all clusters smaller than `min_size` points.
    ///
    /// A threshold of one or less keeps everything.
    pub fn apply_size_threshold(&mut self, min_size: usize) {
        if min_size <= 1 {
            return;
        }
        let before = self.clusters.len();
        self.clusters.retain(|c| c.size() >= min_size);
        let removed = before - self.clusters.len();
        if removed > 0 {
            debug!(removed, min_size, "size threshold removed clusters");
        }
    }

    /// Merge the cluster at `absorbed` into the cluster at `survivor`.
    ///
    /// The survivor keeps its id, gains all points, and its mode becomes
    /// the average of the two modes. The absorbed cluster is removed from
    /// the list.
    pub fn merge_clusters(&mut self, survivor: usize, absorbed: usize) -> CoreResult<()> {
        if survivor == absorbed
            || survivor >= self.clusters.len()
            || absorbed >= self.clusters.len()
        {
            return Err(CoreError::internal(format!(
                "invalid merge pair ({survivor}, {absorbed}) in list of {}",
                self.clusters.len()
            )));
        }
        let donor = self.clusters.remove(absorbed);
        let survivor = if absorbed < survivor {
            survivor - 1
        } else {
            survivor
        };
        let target = &mut self.clusters[survivor];
        if target.mode.len() == donor.mode.len() && !target.mode.is_empty() {
            for (m, d) in target.mode.iter_mut().zip(donor.mode.iter()) {
                *m = 0.5 * (*m + d);
            }
        }
        for p in donor.points {
            target.add_point(p);
        }
        Ok(())
    }

    /// Wipe all tracking ids off the clusters and their points.
    ///
    /// Used as a tracking preliminary: the current step's clusters must not
    /// carry stale ids into matchmaking.
    pub fn erase_identifiers(&mut self) {
        for c in &mut self.clusters {
            c.id = None;
            c.refresh_point_backrefs();
        }
        self.highest_id = None;
    }

    /// Hand every cluster a fresh per-run uuid, continuing from
    /// `highest_uuid`.
    pub fn assign_uuids(&mut self) {
        let mut next = self.highest_uuid.map_or(0, |u| u + 1);
        for c in &mut self.clusters {
            c.uuid = Some(next);
            next += 1;
        }
        self.highest_uuid = next.checked_sub(1);
    }

    /// Hand out sequential ids starting at zero, as the final step of a
    /// fresh detection run (no tracking history).
    pub fn assign_sequential_ids(&mut self) {
        for (i, c) in self.clusters.iter_mut().enumerate() {
            c.id = Some(i as u64);
            c.refresh_point_backrefs();
        }
        self.highest_id = self.clusters.len().checked_sub(1).map(|n| n as u64);
    }

    /// Positions of all clusters adjacent to the cluster at `pos` on the
    /// grid (touching its 3^d stencil), excluding `pos` itself.
    pub fn neighbours_of(&self, pos: usize) -> Vec<usize> {
        let index = ClusterIndex::build(&self.clusters);
        index.neighbours_of(&self.clusters, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stormcell_core::Point;

    fn cluster_of(cells: &[(i64, i64)], value: f64) -> Cluster {
        let mut c = Cluster::new();
        for &(x, y) in cells {
            c.add_point(Point::new(
                vec![x, y],
                vec![x as f64, y as f64],
                vec![x as f64, y as f64, value],
            ));
        }
        c.recompute_mode();
        c
    }

    fn list_of(clusters: Vec<Cluster>) -> ClusterList {
        let mut list = ClusterList::new(
            vec!["x".into(), "y".into()],
            vec!["reflectivity".into()],
            0,
        );
        list.clusters = clusters;
        list
    }

    #[test]
    fn test_size_threshold() {
        let mut list = list_of(vec![
            cluster_of(&[(0, 0)], 1.0),
            cluster_of(&[(5, 5), (5, 6), (6, 5)], 1.0),
        ]);

        // threshold of one keeps everything
        list.apply_size_threshold(1);
        assert_eq!(list.size(), 2);

        list.apply_size_threshold(2);
        assert_eq!(list.size(), 1);
        assert_eq!(list.clusters[0].size(), 3);
    }

    #[test]
    fn test_merge_clusters() {
        let mut list = list_of(vec![
            cluster_of(&[(0, 0), (1, 0)], 10.0),
            cluster_of(&[(2, 0)], 30.0),
        ]);
        list.clusters[0].id = Some(4);
        list.clusters[1].id = Some(9);

        list.merge_clusters(0, 1).expect("valid positions");
        assert_eq!(list.size(), 1);
        let merged = &list.clusters[0];
        assert_eq!(merged.id, Some(4));
        assert_eq!(merged.size(), 3);
        // mode is the average of the two modes, value component included
        assert!((merged.mode[2] - 20.0).abs() < 1e-12);

        assert!(list.merge_clusters(0, 0).is_err());
        assert!(list.merge_clusters(0, 5).is_err());
    }

    #[test]
    fn test_erase_identifiers() {
        let mut list = list_of(vec![cluster_of(&[(0, 0)], 1.0)]);
        list.clusters[0].id = Some(3);
        list.clusters[0].refresh_point_backrefs();
        list.highest_id = Some(3);

        list.erase_identifiers();
        assert_eq!(list.clusters[0].id, None);
        assert_eq!(list.clusters[0].points[0].cluster, None);
        assert_eq!(list.highest_id, None);
    }

    #[test]
    fn test_uuid_assignment_continues() {
        let mut list = list_of(vec![cluster_of(&[(0, 0)], 1.0), cluster_of(&[(3, 3)], 1.0)]);
        list.assign_uuids();
        assert_eq!(list.clusters[0].uuid, Some(0));
        assert_eq!(list.clusters[1].uuid, Some(1));
        assert_eq!(list.highest_uuid, Some(1));

        list.assign_uuids();
        assert_eq!(list.clusters[0].uuid, Some(2));
        assert_eq!(list.highest_uuid, Some(3));
    }

    #[test]
    fn test_sequential_ids_set_backrefs() {
        let mut list = list_of(vec![cluster_of(&[(0, 0)], 1.0), cluster_of(&[(3, 3)], 1.0)]);
        list.assign_sequential_ids();
        assert_eq!(list.clusters[1].id, Some(1));
        assert_eq!(list.clusters[1].points[0].cluster, Some(1));
        assert_eq!(list.highest_id, Some(1));
    }

    #[test]
    fn test_neighbours_of() {
        let list = list_of(vec![
            cluster_of(&[(0, 0), (1, 0)], 1.0),
            cluster_of(&[(2, 1)], 1.0),
            cluster_of(&[(8, 8)], 1.0),
        ]);
        assert_eq!(list.neighbours_of(0), vec![1]);
        assert!(list.neighbours_of(2).is_empty());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut list = list_of(vec![cluster_of(&[(0, 0), (1, 0)], 5.0)]);
        list.assign_sequential_ids();
        list.tracked_ids.insert(0);

        let json = serde_json::to_string(&list).expect("serializes");
        let back: ClusterList = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back, list);
    }
}
