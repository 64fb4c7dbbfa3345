//! Pairwise correlation matrices between two cluster lists.
//!
//! For N current clusters and M previous clusters, every matrix is N x M
//! and indexed `[n, m]` with `n` addressing the current list and `m` the
//! previous one. Pairs failing a hard constraint are marked impossible and
//! never enter matchmaking; the exclusions are logged at trace level only.

use libm::erfc;
use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, trace};

use stormcell_core::math::vector_sub;
use stormcell_core::CoordinateSystem;
use stormcell_cluster::{Cluster, ClusterIndex, ClusterList, Histogram};

use crate::config::TrackingConfig;

/// One evaluated cluster pair.
struct PairObservation {
    n: usize,
    m: usize,
    cover_old_by_new: f64,
    cover_new_by_old: f64,
    mid_displacement: f64,
    size_difference: f64,
    possible: bool,
    tau: f64,
}

/// The full set of pairwise matrices plus the normalization maxima.
pub struct CorrelationMatrices {
    /// Fraction of each previous cluster's area covered by each current
    /// cluster.
    pub cover_old_by_new: Array2<f64>,
    /// Fraction of each current cluster's area covered by each previous
    /// cluster.
    pub cover_new_by_old: Array2<f64>,
    /// Distance between geometrical centers, metres.
    pub mid_displacement: Array2<f64>,
    /// Relative size deviation `(max - min) / min`.
    pub size_difference: Array2<f64>,
    /// Whether the pair survives all hard constraints.
    pub possible: Array2<bool>,
    /// Kendall rank correlation of the tracking-variable histograms, or
    /// zero when no tracking variable is in use.
    pub tau: Array2<f64>,
    /// Largest displacement over possible pairs; one when no possible pair
    /// registered a displacement.
    pub max_mid_displacement: f64,
    /// Largest size deviation over possible pairs; one when no possible
    /// pair registered a deviation.
    pub max_size_difference: f64,
}

impl CorrelationMatrices {
    /// Evaluate all pairs between `previous` and `current`.
    pub fn compute(
        previous: &ClusterList,
        current: &ClusterList,
        cs: &dyn CoordinateSystem,
        config: &TrackingConfig,
        delta_t: i64,
        tracking_value_index: Option<usize>,
    ) -> Self {
        let n_current = current.size();
        let m_previous = previous.size();

        let previous_index = ClusterIndex::build(&previous.clusters);
        let current_index = ClusterIndex::build(&current.clusters);

        let current_centers: Vec<Option<Vec<f64>>> = current
            .clusters
            .iter()
            .map(Cluster::geometrical_center)
            .collect();
        let previous_centers: Vec<Option<Vec<f64>>> = previous
            .clusters
            .iter()
            .map(Cluster::geometrical_center)
            .collect();
        let previous_radii: Vec<f64> = previous
            .clusters
            .iter()
            .map(|c| c.radius(cs))
            .collect();
        // histograms are only comparable over a range shared by both lists
        let histograms = tracking_value_index.map(|vi| {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for c in current.clusters.iter().chain(previous.clusters.iter()) {
                for v in c.variable_values(vi) {
                    if v < min {
                        min = v;
                    }
                    if v > max {
                        max = v;
                    }
                }
            }
            if min > max {
                (min, max) = (0.0, 0.0);
            }
            let cur: Vec<Histogram> = current
                .clusters
                .iter()
                .map(|c| c.histogram_in_range(vi, config.histogram_bins, min, max))
                .collect();
            let prev: Vec<Histogram> = previous
                .clusters
                .iter()
                .map(|c| c.histogram_in_range(vi, config.histogram_bins, min, max))
                .collect();
            (cur, prev)
        });

        let max_travel = config.max_velocity_ms * delta_t as f64;
        // a cluster of this radius cannot fully clear its own footprint
        // within delta_t, so an honest continuation must still overlap
        let overlap_radius = 0.5 * max_travel;

        let pairs: Vec<(usize, usize)> = (0..n_current)
            .flat_map(|n| (0..m_previous).map(move |m| (n, m)))
            .collect();

        let observations: Vec<PairObservation> = pairs
            .par_iter()
            .map(|&(n, m)| {
                let new_cluster = &current.clusters[n];
                let old_cluster = &previous.clusters[m];

                let cover_old_by_new = current_index.occupation_ratio(old_cluster, n);
                let cover_new_by_old = previous_index.occupation_ratio(new_cluster, m);

                let mid_displacement = match (&current_centers[n], &previous_centers[m]) {
                    (Some(c), Some(p)) => cs.physical_magnitude(&vector_sub(c, p)),
                    _ => f64::INFINITY,
                };

                let size_new = new_cluster.size() as f64;
                let size_old = old_cluster.size() as f64;
                let smaller = size_new.min(size_old);
                let size_difference = if smaller > 0.0 {
                    (size_new.max(size_old) - smaller) / smaller
                } else {
                    f64::INFINITY
                };

                let mut possible = true;
                if mid_displacement > max_travel {
                    trace!(n, m, mid_displacement, max_travel, "excluded: too fast");
                    possible = false;
                }
                if possible && size_difference > config.max_size_deviation {
                    trace!(n, m, size_difference, "excluded: size deviation");
                    possible = false;
                }
                if possible
                    && config.use_overlap_constraint
                    && previous_radii[m] >= overlap_radius
                    && cover_old_by_new == 0.0
                    && cover_new_by_old == 0.0
                {
                    trace!(n, m, "excluded: large cluster without overlap");
                    possible = false;
                }

                let tau = histograms
                    .as_ref()
                    .map_or(0.0, |(cur, prev)| cur[n].correlate_kendall(&prev[m]));

                PairObservation {
                    n,
                    m,
                    cover_old_by_new,
                    cover_new_by_old,
                    mid_displacement,
                    size_difference,
                    possible,
                    tau,
                }
            })
            .collect();

        let mut matrices = Self {
            cover_old_by_new: Array2::zeros((n_current, m_previous)),
            cover_new_by_old: Array2::zeros((n_current, m_previous)),
            mid_displacement: Array2::zeros((n_current, m_previous)),
            size_difference: Array2::zeros((n_current, m_previous)),
            possible: Array2::from_elem((n_current, m_previous), false),
            tau: Array2::zeros((n_current, m_previous)),
            max_mid_displacement: 0.0,
            max_size_difference: 0.0,
        };
        for o in observations {
            matrices.cover_old_by_new[[o.n, o.m]] = o.cover_old_by_new;
            matrices.cover_new_by_old[[o.n, o.m]] = o.cover_new_by_old;
            matrices.mid_displacement[[o.n, o.m]] = o.mid_displacement;
            matrices.size_difference[[o.n, o.m]] = o.size_difference;
            matrices.possible[[o.n, o.m]] = o.possible;
            matrices.tau[[o.n, o.m]] = o.tau;
            if o.possible {
                if o.mid_displacement > matrices.max_mid_displacement {
                    matrices.max_mid_displacement = o.mid_displacement;
                }
                if o.size_difference > matrices.max_size_difference {
                    matrices.max_size_difference = o.size_difference;
                }
            }
        }
        // an observed maximum below one must stay, it is the erfc scale;
        // only a degenerate zero falls back to one
        if matrices.max_mid_displacement == 0.0 {
            matrices.max_mid_displacement = 1.0;
        }
        if matrices.max_size_difference == 0.0 {
            matrices.max_size_difference = 1.0;
        }

        debug!(
            n_current,
            m_previous,
            possible = matrices.possible.iter().filter(|&&p| p).count(),
            max_mid_displacement = matrices.max_mid_displacement,
            max_size_difference = matrices.max_size_difference,
            "correlation matrices computed"
        );
        matrices
    }

    /// Match likelihood of the pair `[n, m]`, or negative infinity if the
    /// pair is impossible.
    pub fn likelihood(&self, n: usize, m: usize, config: &TrackingConfig) -> f64 {
        if !self.possible[[n, m]] {
            return f64::NEG_INFINITY;
        }
        config.range_weight * erfc(self.mid_displacement[[n, m]] / self.max_mid_displacement)
            + config.size_weight * erfc(self.size_difference[[n, m]] / self.max_size_difference)
            + config.correlation_weight * self.tau[[n, m]]
    }

    /// Score of previous cluster `m` contributing to current cluster `n`
    /// in a merge.
    pub fn merge_score(&self, n: usize, m: usize) -> f64 {
        self.cover_new_by_old[[n, m]] * self.proximity(n, m)
    }

    /// Score of current cluster `n` continuing previous cluster `m` in a
    /// split.
    pub fn split_score(&self, n: usize, m: usize) -> f64 {
        self.cover_old_by_new[[n, m]] * self.proximity(n, m)
    }

    fn proximity(&self, n: usize, m: usize) -> f64 {
        erfc(self.mid_displacement[[n, m]] / self.max_mid_displacement)
            + erfc(self.size_difference[[n, m]] / self.max_size_difference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stormcell_core::{Point, UniformGrid};

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

    fn list_at(timestamp: i64, clusters: Vec<Cluster>) -> ClusterList {
        let mut list = ClusterList::new(
            vec!["x".into(), "y".into()],
            vec!["reflectivity".into()],
            timestamp,
        );
        list.clusters = clusters;
        list.assign_sequential_ids();
        list
    }

    #[test]
    fn test_coverage_and_displacement() {
        let grid = UniformGrid::kilometres(vec![1.0, 1.0]).expect("valid grid");
        let config = TrackingConfig::default();
        let previous = list_at(0, vec![cluster_of(&[(0, 0), (1, 0)], 30.0)]);
        // shifted one cell east, half the footprint still overlaps
        let current = list_at(300, vec![cluster_of(&[(1, 0), (2, 0)], 30.0)]);

        let matrices =
            CorrelationMatrices::compute(&previous, &current, &grid, &config, 300, None);
        assert!((matrices.cover_old_by_new[[0, 0]] - 0.5).abs() < 1e-12);
        assert!((matrices.cover_new_by_old[[0, 0]] - 0.5).abs() < 1e-12);
        // centers moved from (0.5, 0) to (1.5, 0): one km
        assert!((matrices.mid_displacement[[0, 0]] - 1000.0).abs() < 1e-9);
        assert_eq!(matrices.size_difference[[0, 0]], 0.0);
        assert!(matrices.possible[[0, 0]]);
    }

    #[test]
    fn test_velocity_constraint_excludes() {
        let grid = UniformGrid::kilometres(vec![1.0, 1.0]).expect("valid grid");
        let config = TrackingConfig::default();
        let previous = list_at(0, vec![cluster_of(&[(0, 0)], 30.0)]);
        // 100 km in 300 s is 333 m/s, over the 100 m/s limit
        let current = list_at(300, vec![cluster_of(&[(100, 0)], 30.0)]);

        let matrices =
            CorrelationMatrices::compute(&previous, &current, &grid, &config, 300, None);
        assert!(!matrices.possible[[0, 0]]);
        assert_eq!(
            matrices.likelihood(0, 0, &config),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_size_constraint_excludes() {
        let grid = UniformGrid::kilometres(vec![1.0, 1.0]).expect("valid grid");
        let config = TrackingConfig::default();
        let previous = list_at(0, vec![cluster_of(&[(0, 0)], 30.0)]);
        let big: Vec<(i64, i64)> = (0..8).map(|i| (i, 0)).collect();
        // 8 vs 1 points: deviation 7.0, over the 2.5 limit
        let current = list_at(300, vec![cluster_of(&big, 30.0)]);

        let matrices =
            CorrelationMatrices::compute(&previous, &current, &grid, &config, 300, None);
        assert!(!matrices.possible[[0, 0]]);
    }

    #[test]
    fn test_likelihood_prefers_closer_cluster() {
        let grid = UniformGrid::kilometres(vec![1.0, 1.0]).expect("valid grid");
        let config = TrackingConfig::default();
        let previous = list_at(0, vec![cluster_of(&[(0, 0), (1, 0)], 30.0)]);
        let current = list_at(
            300,
            vec![
                cluster_of(&[(1, 0), (2, 0)], 30.0),
                cluster_of(&[(10, 0), (11, 0)], 30.0),
            ],
        );

        let matrices =
            CorrelationMatrices::compute(&previous, &current, &grid, &config, 300, None);
        assert!(
            matrices.likelihood(0, 0, &config) > matrices.likelihood(1, 0, &config)
        );
    }

    #[test]
    fn test_maxima_follow_observed_values() {
        let grid = UniformGrid::kilometres(vec![1.0, 1.0]).expect("valid grid");
        let config = TrackingConfig::default();
        let previous = list_at(0, vec![cluster_of(&[(0, 0), (1, 0)], 30.0)]);
        // 2 vs 3 points: a sub-one size deviation of 0.5 must become the
        // normalization scale rather than being floored at one
        let current = list_at(300, vec![cluster_of(&[(1, 0), (2, 0), (3, 0)], 30.0)]);

        let matrices =
            CorrelationMatrices::compute(&previous, &current, &grid, &config, 300, None);
        assert!((matrices.max_size_difference - 0.5).abs() < 1e-12);
        assert!((matrices.max_mid_displacement - 1500.0).abs() < 1e-9);

        // a stationary identical pair observes nothing; the scales fall
        // back to one instead of dividing by zero
        let still_previous = list_at(0, vec![cluster_of(&[(0, 0), (1, 0)], 30.0)]);
        let still_current = list_at(300, vec![cluster_of(&[(0, 0), (1, 0)], 30.0)]);
        let still = CorrelationMatrices::compute(
            &still_previous,
            &still_current,
            &grid,
            &config,
            300,
            None,
        );
        assert_eq!(still.max_mid_displacement, 1.0);
        assert_eq!(still.max_size_difference, 1.0);
    }

    #[test]
    fn test_histogram_term_fills_tau() {
        let grid = UniformGrid::kilometres(vec![1.0, 1.0]).expect("valid grid");
        let config = TrackingConfig::default();
        let previous = list_at(0, vec![cluster_of(&[(0, 0), (1, 0)], 30.0)]);
        let current = list_at(300, vec![cluster_of(&[(1, 0), (2, 0)], 30.0)]);

        let without =
            CorrelationMatrices::compute(&previous, &current, &grid, &config, 300, None);
        assert_eq!(without.tau[[0, 0]], 0.0);

        let with =
            CorrelationMatrices::compute(&previous, &current, &grid, &config, 300, Some(0));
        // flat single-value histograms are degenerate and correlate at -1
        assert_eq!(with.tau[[0, 0]], -1.0);
    }
}
