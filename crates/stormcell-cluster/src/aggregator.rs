//! Mean-shift cluster aggregation.
//!
//! Turns a field of mean-shift-annotated points into a [`ClusterList`] in
//! four phases:
//!
//! 1. **Zero-shift seeding**: spatially stable points and their stable
//!    stencil neighbours are united into seed clusters.
//! 2. **Graph following**: every spatially unstable original point is
//!    united with its gridded-shift predecessor (four-way rule) and the
//!    edge marks the pointing point as a boundary point. A missed
//!    predecessor lookup is ignored; such points stay unclustered and
//!    out of the result.
//! 3. **Coalescence** (optional): a cluster absorbs the cluster of the
//!    strongest-responding stencil-neighbour point when that response
//!    exceeds the cluster's own peak, repeated to a fixpoint.
//! 4. **Pruning**: filter-synthesized points are dropped and clusters
//!    emptied by this are removed.
//!
//! Membership is kept in a slot arena (`point index -> slot`) until the
//! final phase, so unions and merges are cheap index rewrites; points are
//! only moved into their owning [`Cluster`] once membership is final.

use rayon::prelude::*;
use tracing::{debug, info, trace};

use stormcell_core::{
    CoreError, CoreResult, GridIndex, Point, SpatialIndex, WeightFunction,
};

use crate::cluster::Cluster;
use crate::list::ClusterList;

/// Configuration for one aggregation run.
#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// Merge clusters into a stronger-weighted grid neighbour until stable.
    /// Requires a weight function on the aggregator.
    pub coalesce_with_strongest_neighbour: bool,
    /// Drop clusters with fewer points than this after aggregation.
    /// Values of one or less keep everything.
    pub min_cluster_size: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            coalesce_with_strongest_neighbour: false,
            min_cluster_size: 1,
        }
    }
}

/// Membership state during aggregation: a slot arena plus a per-point
/// assignment table. Slot `None` entries are tombstones left by merges.
struct SlotArena {
    slots: Vec<Option<Vec<usize>>>,
    assignment: Vec<Option<usize>>,
}

impl SlotArena {
    fn new(point_count: usize) -> Self {
        Self {
            slots: Vec::new(),
            assignment: vec![None; point_count],
        }
    }

    fn slot_of(&self, point: usize) -> Option<usize> {
        self.assignment[point]
    }

    fn create(&mut self, members: Vec<usize>) -> usize {
        let slot = self.slots.len();
        for &m in &members {
            self.assignment[m] = Some(slot);
        }
        self.slots.push(Some(members));
        slot
    }

    fn attach(&mut self, point: usize, slot: usize) {
        self.assignment[point] = Some(slot);
        if let Some(members) = self.slots[slot].as_mut() {
            members.push(point);
        }
    }

    /// Move all members of `absorbed` into `survivor`.
    fn unite(&mut self, survivor: usize, absorbed: usize) {
        if survivor == absorbed {
            return;
        }
        if let Some(members) = self.slots[absorbed].take() {
            for &m in &members {
                self.assignment[m] = Some(survivor);
            }
            if let Some(target) = self.slots[survivor].as_mut() {
                target.extend(members);
            }
        }
    }

    fn live_slots(&self) -> impl Iterator<Item = (usize, &Vec<usize>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|m| (i, m)))
    }
}

/// The aggregation engine.
pub struct ClusterGraphAggregator<'a> {
    config: AggregationConfig,
    weight: Option<&'a dyn WeightFunction>,
}

impl<'a> ClusterGraphAggregator<'a> {
    /// Create an aggregator with the given configuration.
    pub fn new(config: AggregationConfig) -> Self {
        Self {
            config,
            weight: None,
        }
    }

    /// Attach the weight function used for coalescence.
    #[must_use]
    pub fn with_weight_function(mut self, weight: &'a dyn WeightFunction) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Run aggregation over `points` and produce an identified cluster
    /// list for one time step.
    pub fn aggregate(
        &self,
        mut points: Vec<Point>,
        spatial_variables: Vec<String>,
        value_variables: Vec<String>,
        timestamp: i64,
    ) -> CoreResult<ClusterList> {
        if self.config.coalesce_with_strongest_neighbour && self.weight.is_none() {
            return Err(CoreError::configuration(
                "coalescence requires a weight function",
            ));
        }

        let mut list = ClusterList::new(spatial_variables, value_variables, timestamp);
        if points.is_empty() {
            return Ok(list);
        }

        let index = GridIndex::build(&points);
        let mut arena = SlotArena::new(points.len());

        self.seed_zero_shifts(&points, &index, &mut arena);
        self.follow_shift_graph(&mut points, &index, &mut arena);

        if self.config.coalesce_with_strongest_neighbour {
            // checked above
            if let Some(weight) = self.weight {
                self.coalesce(&points, &index, &mut arena, weight);
            }
        }

        self.finalize(points, arena, &mut list);

        list.apply_size_threshold(self.config.min_cluster_size);
        list.assign_sequential_ids();

        info!(
            clusters = list.size(),
            points = list.point_count(),
            timestamp,
            "aggregation complete"
        );
        Ok(list)
    }

    /// Phase 1: unite spatially stable points with their stable stencil
    /// neighbours.
    fn seed_zero_shifts(&self, points: &[Point], index: &GridIndex, arena: &mut SlotArena) {
        let zero_shift: Vec<usize> = points
            .par_iter()
            .enumerate()
            .filter(|(_, p)| p.is_zero_shift())
            .map(|(i, _)| i)
            .collect();

        for &i in &zero_shift {
            for j in index.neighbours(&points[i].gridpoint) {
                if !points[j].is_zero_shift() {
                    continue;
                }
                match (arena.slot_of(i), arena.slot_of(j)) {
                    (None, None) => {
                        arena.create(vec![i, j]);
                    }
                    (Some(a), None) => arena.attach(j, a),
                    (None, Some(b)) => arena.attach(i, b),
                    (Some(a), Some(b)) if a != b => arena.unite(a, b),
                    _ => {}
                }
            }
        }

        // isolated stable points seed singleton clusters
        for &i in &zero_shift {
            if arena.slot_of(i).is_none() {
                arena.create(vec![i]);
            }
        }

        debug!(
            seeds = zero_shift.len(),
            slots = arena.live_slots().count(),
            "zero-shift seeding done"
        );
    }

    /// Phase 2: unite every spatially unstable original point with its
    /// gridded-shift predecessor.
    ///
    /// Synthesized points never initiate an edge (their outgoing shift
    /// would bridge unrelated clusters) but may be absorbed as
    /// predecessors. A point whose predecessor cell is unoccupied stays
    /// unclustered.
    fn follow_shift_graph(&self, points: &mut [Point], index: &GridIndex, arena: &mut SlotArena) {
        let predecessors: Vec<Option<usize>> = points
            .par_iter()
            .map(|p| index.lookup(&p.predecessor_gridpoint()))
            .collect();

        for i in 0..points.len() {
            if points[i].is_zero_shift() || !points[i].is_original {
                continue;
            }
            let Some(pred) = predecessors[i] else {
                trace!(i, "predecessor lookup miss, point stays unclustered");
                continue;
            };
            if pred == i {
                continue;
            }

            // the pointing point sits on the cluster edge, its target
            // does not
            points[i].is_boundary = true;
            points[pred].is_boundary = false;

            match (arena.slot_of(i), arena.slot_of(pred)) {
                (None, None) => {
                    arena.create(vec![i, pred]);
                }
                (None, Some(b)) => arena.attach(i, b),
                (Some(a), None) => arena.attach(pred, a),
                (Some(a), Some(b)) if a != b => arena.unite(a, b),
                _ => {}
            }
        }
    }

    /// Phase 3: a cluster absorbs the cluster of its strongest-responding
    /// stencil-neighbour point when that point's response exceeds the
    /// cluster's own peak, until nothing moves.
    ///
    /// The comparison is against the neighbouring *point's* response, not
    /// the neighbouring cluster's peak: a strong cluster touching only
    /// through a weak edge point does not pull its neighbour in.
    fn coalesce(
        &self,
        points: &[Point],
        index: &GridIndex,
        arena: &mut SlotArena,
        weight: &dyn WeightFunction,
    ) {
        let mut merges = 0usize;
        'restart: loop {
            let live: Vec<usize> = arena.live_slots().map(|(i, _)| i).collect();
            for slot in live {
                let Some(members) = arena.slots[slot].as_ref() else {
                    continue;
                };
                let mut own_peak = f64::NEG_INFINITY;
                let mut strongest = f64::NEG_INFINITY;
                let mut strongest_slot: Option<usize> = None;
                for &m in members {
                    let own = weight.weight(&points[m]);
                    if own > own_peak {
                        own_peak = own;
                    }
                    for n in index.neighbours(&points[m].gridpoint) {
                        if arena.slot_of(n) == Some(slot) {
                            continue;
                        }
                        let response = weight.weight(&points[n]);
                        if response > strongest {
                            strongest = response;
                            strongest_slot = arena.slot_of(n);
                        }
                    }
                }
                if strongest > own_peak {
                    if let Some(other) = strongest_slot {
                        trace!(
                            slot,
                            other,
                            strongest,
                            "absorbing cluster of strongest neighbour point"
                        );
                        arena.unite(slot, other);
                        merges += 1;
                        continue 'restart;
                    }
                }
            }
            break;
        }
        if merges > 0 {
            debug!(merges, "coalescence done");
        }
    }

    /// Phase 4: move points into clusters, dropping synthesized points and
    /// clusters left empty by the drop.
    fn finalize(&self, points: Vec<Point>, arena: SlotArena, list: &mut ClusterList) {
        let mut bank: Vec<Option<Point>> = points.into_iter().map(Some).collect();
        let mut pruned = 0usize;
        for (_, members) in arena.live_slots() {
            let mut cluster = Cluster::new();
            for &m in members {
                let Some(point) = bank[m].take() else { continue };
                if point.is_original {
                    cluster.add_point(point);
                } else {
                    pruned += 1;
                }
            }
            if !cluster.is_empty() {
                cluster.recompute_mode();
                list.clusters.push(cluster);
            }
        }
        if pruned > 0 {
            debug!(pruned, "pruned filter-synthesized points");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stormcell_core::ValueWeight;

    fn stable(x: i64, y: i64, value: f64) -> Point {
        Point::new(vec![x, y], vec![x as f64, y as f64], vec![x as f64, y as f64, value])
    }

    fn drifting(x: i64, y: i64, dx: i64, dy: i64, value: f64) -> Point {
        Point::new(vec![x, y], vec![x as f64, y as f64], vec![x as f64, y as f64, value])
            .with_shift(vec![dx as f64, dy as f64, 0.0], vec![dx, dy])
    }

    fn aggregate(points: Vec<Point>, config: AggregationConfig) -> ClusterList {
        ClusterGraphAggregator::new(config)
            .aggregate(
                points,
                vec!["x".into(), "y".into()],
                vec!["reflectivity".into()],
                0,
            )
            .expect("aggregation succeeds")
    }

    #[test]
    fn test_adjacent_seeds_unite() {
        // two stable points in one stencil, a third far away
        let points = vec![stable(0, 0, 1.0), stable(1, 0, 1.0), stable(10, 10, 1.0)];
        let list = aggregate(points, AggregationConfig::default());
        assert_eq!(list.size(), 2);

        let sizes: Vec<usize> = {
            let mut s: Vec<usize> = list.clusters.iter().map(Cluster::size).collect();
            s.sort_unstable();
            s
        };
        assert_eq!(sizes, vec![1, 2]);
    }

    #[test]
    fn test_graph_following_attaches_chain() {
        // seed at (0,0); (2,0) shifts to (1,0) which shifts to the seed
        let points = vec![
            stable(0, 0, 5.0),
            drifting(1, 0, -1, 0, 3.0),
            drifting(2, 0, -1, 0, 2.0),
        ];
        let list = aggregate(points, AggregationConfig::default());
        assert_eq!(list.size(), 1);
        assert_eq!(list.clusters[0].size(), 3);
    }

    #[test]
    fn test_lookup_miss_stays_unclustered() {
        // the drifting point's predecessor cell is unoccupied; the point
        // joins nothing and is absent from the result
        let points = vec![stable(0, 0, 1.0), drifting(5, 5, 1, 1, 1.0)];
        let list = aggregate(points, AggregationConfig::default());
        assert_eq!(list.size(), 1);
        assert_eq!(list.point_count(), 1);
        assert_eq!(list.clusters[0].points[0].gridpoint, vec![0, 0]);
    }

    #[test]
    fn test_graph_following_marks_boundary() {
        let points = vec![stable(0, 0, 5.0), drifting(1, 0, -1, 0, 3.0)];
        let list = aggregate(points, AggregationConfig::default());
        assert_eq!(list.size(), 1);

        let cluster = &list.clusters[0];
        assert!(cluster.has_margin_points);
        for p in &cluster.points {
            // the pointing point is on the edge, its target is interior
            assert_eq!(p.is_boundary, p.gridpoint == vec![1, 0]);
        }
    }

    #[test]
    fn test_synthesized_points_do_not_initiate_unions() {
        // a synthesized point between two clusters must not bridge them
        let points = vec![
            stable(0, 0, 5.0),
            drifting(1, 0, -1, 0, 3.0).synthesized(),
            drifting(2, 0, -1, 0, 2.0),
        ];
        let list = aggregate(points, AggregationConfig::default());
        assert_eq!(list.size(), 2);
        for c in &list.clusters {
            assert_eq!(c.size(), 1);
            assert!(c.points[0].is_original);
        }
    }

    #[test]
    fn test_mode_is_mean_of_members() {
        let points = vec![stable(0, 0, 10.0), drifting(1, 0, -1, 0, 30.0)];
        let list = aggregate(points, AggregationConfig::default());
        assert_eq!(list.size(), 1);
        assert!((list.clusters[0].mode[2] - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_coalescence_merges_into_stronger() {
        // two adjacent seed clusters, right one carries the higher response
        let points = vec![stable(0, 0, 10.0), stable(1, 0, 50.0)];
        let weight = ValueWeight::new(0);
        let list = ClusterGraphAggregator::new(AggregationConfig {
            coalesce_with_strongest_neighbour: true,
            min_cluster_size: 1,
        })
        .with_weight_function(&weight)
        .aggregate(
            points,
            vec!["x".into(), "y".into()],
            vec!["reflectivity".into()],
            0,
        )
        .expect("aggregation succeeds");

        // the seeding phase already unites these two; coalescence must not
        // disturb the single surviving cluster
        assert_eq!(list.size(), 1);
        assert_eq!(list.clusters[0].size(), 2);
    }

    #[test]
    fn test_coalescence_across_gap() {
        // two clusters touching only through drifting members; equal peaks
        // stay apart, unequal peaks merge
        let weak = vec![stable(0, 0, 10.0), drifting(1, 0, -1, 0, 10.0)];
        let strong = vec![stable(3, 0, 40.0), drifting(2, 0, 1, 0, 40.0)];
        let mut points = weak.clone();
        points.extend(strong.clone());

        let weight = ValueWeight::new(0);
        let list = ClusterGraphAggregator::new(AggregationConfig {
            coalesce_with_strongest_neighbour: true,
            min_cluster_size: 1,
        })
        .with_weight_function(&weight)
        .aggregate(
            points,
            vec!["x".into(), "y".into()],
            vec!["reflectivity".into()],
            0,
        )
        .expect("aggregation succeeds");
        assert_eq!(list.size(), 1);
        assert_eq!(list.clusters[0].size(), 4);

        // equal responses: no cluster exceeds the other, both survive
        let mut equal = vec![stable(0, 0, 10.0), drifting(1, 0, -1, 0, 10.0)];
        equal.extend(vec![stable(3, 0, 10.0), drifting(2, 0, 1, 0, 10.0)]);
        let list = ClusterGraphAggregator::new(AggregationConfig {
            coalesce_with_strongest_neighbour: true,
            min_cluster_size: 1,
        })
        .with_weight_function(&weight)
        .aggregate(
            equal,
            vec!["x".into(), "y".into()],
            vec!["reflectivity".into()],
            0,
        )
        .expect("aggregation succeeds");
        assert_eq!(list.size(), 2);
    }

    #[test]
    fn test_coalescence_judges_neighbour_point_response() {
        // the strong cluster touches only through a weak contact point;
        // its peak of 100 must not pull the w=50 cluster in
        let points = vec![
            stable(0, 0, 50.0),
            stable(2, 0, 100.0),
            drifting(1, 0, 1, 0, 5.0),
        ];
        let weight = ValueWeight::new(0);
        let list = ClusterGraphAggregator::new(AggregationConfig {
            coalesce_with_strongest_neighbour: true,
            min_cluster_size: 1,
        })
        .with_weight_function(&weight)
        .aggregate(
            points,
            vec!["x".into(), "y".into()],
            vec!["reflectivity".into()],
            0,
        )
        .expect("aggregation succeeds");

        assert_eq!(list.size(), 2);
        let mut sizes: Vec<usize> = list.clusters.iter().map(Cluster::size).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2]);
    }

    #[test]
    fn test_coalescence_without_weight_is_configuration_error() {
        let err = ClusterGraphAggregator::new(AggregationConfig {
            coalesce_with_strongest_neighbour: true,
            min_cluster_size: 1,
        })
        .aggregate(vec![stable(0, 0, 1.0)], vec!["x".into()], vec![], 0)
        .expect_err("must fail");
        assert!(matches!(err, CoreError::Configuration { .. }));
    }

    #[test]
    fn test_synthesized_points_pruned() {
        let points = vec![
            stable(0, 0, 1.0),
            drifting(1, 0, -1, 0, 1.0).synthesized(),
            stable(10, 10, 1.0).synthesized(),
        ];
        let list = aggregate(points, AggregationConfig::default());
        // the synthesized singleton's cluster vanishes entirely
        assert_eq!(list.size(), 1);
        assert_eq!(list.clusters[0].size(), 1);
        assert!(list.clusters[0].points[0].is_original);
    }

    #[test]
    fn test_min_cluster_size() {
        let points = vec![stable(0, 0, 1.0), stable(1, 0, 1.0), stable(10, 10, 1.0)];
        let list = aggregate(
            points,
            AggregationConfig {
                coalesce_with_strongest_neighbour: false,
                min_cluster_size: 2,
            },
        );
        assert_eq!(list.size(), 1);
        assert_eq!(list.clusters[0].size(), 2);
    }

    #[test]
    fn test_ids_sequential_and_backrefs_set() {
        let points = vec![stable(0, 0, 1.0), stable(10, 10, 1.0)];
        let list = aggregate(points, AggregationConfig::default());
        let mut ids: Vec<u64> = list.clusters.iter().filter_map(|c| c.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);
        for c in &list.clusters {
            for p in &c.points {
                assert_eq!(p.cluster, c.id);
            }
        }
        assert_eq!(list.highest_id, Some(1));
    }

    #[test]
    fn test_points_partition_without_duplicates() {
        let mut points = vec![
            stable(0, 0, 5.0),
            drifting(1, 0, -1, 0, 3.0),
            drifting(2, 0, -1, 0, 2.0),
            stable(10, 10, 1.0),
            drifting(11, 10, -1, 0, 1.0),
        ];
        // predecessor cell unoccupied, stays out of the result
        points.push(drifting(5, 5, 1, 1, 1.0));
        let total = points.len();

        let list = aggregate(points, AggregationConfig::default());
        assert_eq!(list.point_count(), total - 1);

        let mut seen = std::collections::HashSet::new();
        for c in &list.clusters {
            for p in &c.points {
                assert!(seen.insert(p.gridpoint.clone()), "point owned twice");
            }
        }
    }

    #[test]
    fn test_empty_input() {
        let list = aggregate(Vec::new(), AggregationConfig::default());
        assert!(list.is_empty());
        assert_eq!(list.highest_id, None);
    }
}
