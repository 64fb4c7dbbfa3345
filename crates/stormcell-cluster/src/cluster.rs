//! A single detected cluster.

use serde::{Deserialize, Serialize};

use stormcell_core::math::mean_vector;
use stormcell_core::{CoordinateSystem, Point};

use crate::histogram::Histogram;

/// A connected region of feature-space points, as produced by cluster
/// aggregation.
///
/// A cluster owns its points outright. The `id` is the tracking identity:
/// it survives across time steps once tracking has matched the cluster to a
/// predecessor. The `uuid` is a per-run bookkeeping handle assigned before
/// matching; it never leaves the run that created it. Both are `None` on a
/// cluster that has not yet been through identification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Tracking identity. `None` means "not identified yet".
    pub id: Option<u64>,
    /// Per-run handle used during matchmaking.
    pub uuid: Option<u64>,
    /// Cluster mode: arithmetic mean of the member feature vectors.
    pub mode: Vec<f64>,
    /// Spatial displacement since the previous time step, in physical units.
    /// Zero until tracking matches this cluster to a predecessor.
    pub displacement: Vec<f64>,
    /// Whether any member point lies on the domain boundary.
    pub has_margin_points: bool,
    /// Member points. Exclusive ownership; a point appears in at most one
    /// cluster.
    pub points: Vec<Point>,
    /// Cached bounding box, lower corner per dimension.
    bbox_min: Vec<f64>,
    /// Cached bounding box, upper corner per dimension.
    bbox_max: Vec<f64>,
}

impl Cluster {
    /// Create an empty, unidentified cluster.
    pub fn new() -> Self {
        Self {
            id: None,
            uuid: None,
            mode: Vec::new(),
            displacement: Vec::new(),
            has_margin_points: false,
            points: Vec::new(),
            bbox_min: Vec::new(),
            bbox_max: Vec::new(),
        }
    }

    /// Create an empty cluster carrying the given mode vector.
    pub fn with_mode(mode: Vec<f64>) -> Self {
        let mut c = Self::new();
        c.mode = mode;
        c
    }

    /// Add a point, taking ownership and updating the back-reference and the
    /// cached bounding box.
    pub fn add_point(&mut self, mut point: Point) {
        point.cluster = self.id;
        if point.is_boundary {
            self.has_margin_points = true;
        }
        if self.bbox_min.is_empty() {
            self.bbox_min = point.coordinate.clone();
            self.bbox_max = point.coordinate.clone();
        } else {
            for (d, &c) in point.coordinate.iter().enumerate() {
                if c < self.bbox_min[d] {
                    self.bbox_min[d] = c;
                }
                if c > self.bbox_max[d] {
                    self.bbox_max[d] = c;
                }
            }
        }
        self.points.push(point);
    }

    /// Number of member points.
    pub fn size(&self) -> usize {
        self.points.len()
    }

    /// Whether the cluster has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Rewrite the back-reference on every member point to the current `id`.
    pub fn refresh_point_backrefs(&mut self) {
        for p in &mut self.points {
            p.cluster = self.id;
        }
    }

    /// Geometrical center: arithmetic mean of the member coordinates.
    /// `None` for an empty cluster.
    pub fn geometrical_center(&self) -> Option<Vec<f64>> {
        mean_vector(self.points.iter().map(|p| p.coordinate.as_slice()))
    }

    /// Mean distance of the member points from the geometrical center, in
    /// physical units. Zero for clusters of fewer than two points.
    pub fn radius(&self, cs: &dyn CoordinateSystem) -> f64 {
        let Some(center) = self.geometrical_center() else {
            return 0.0;
        };
        if self.points.len() < 2 {
            return 0.0;
        }
        let sum: f64 = self
            .points
            .iter()
            .map(|p| {
                let d: Vec<f64> = p
                    .coordinate
                    .iter()
                    .zip(center.iter())
                    .map(|(c, m)| c - m)
                    .collect();
                cs.physical_magnitude(&d)
            })
            .sum();
        sum / self.points.len() as f64
    }

    /// Bounding box as `(lower, upper)` corners. `None` for an empty
    /// cluster.
    pub fn bounding_box(&self) -> Option<(&[f64], &[f64])> {
        if self.bbox_min.is_empty() {
            None
        } else {
            Some((&self.bbox_min, &self.bbox_max))
        }
    }

    /// Whether this cluster's bounding box, each side grown by `margin`
    /// physical units converted back to coordinate units by the caller,
    /// overlaps `other`'s. Margins are in coordinate units here.
    pub fn bounding_boxes_overlap(&self, other: &Cluster, margin: f64) -> bool {
        let (Some((a_min, a_max)), Some((b_min, b_max))) =
            (self.bounding_box(), other.bounding_box())
        else {
            return false;
        };
        a_min
            .iter()
            .zip(a_max.iter())
            .zip(b_min.iter().zip(b_max.iter()))
            .all(|((amin, amax), (bmin, bmax))| amin - margin <= *bmax && amax + margin >= *bmin)
    }

    /// Histogram of one value variable over the member points.
    ///
    /// `value_index` addresses the value portion of the feature vector
    /// (0 = first component after the spatial ones).
    pub fn histogram(&self, value_index: usize, bins: usize) -> Histogram {
        Histogram::from_values(&self.variable_values(value_index), bins)
    }

    /// Like [`Self::histogram`], but over a caller-supplied value range so
    /// histograms of different clusters stay comparable.
    pub fn histogram_in_range(
        &self,
        value_index: usize,
        bins: usize,
        min: f64,
        max: f64,
    ) -> Histogram {
        Histogram::from_values_in_range(&self.variable_values(value_index), bins, min, max)
    }

    /// All samples of one value variable over the member points.
    pub fn variable_values(&self, value_index: usize) -> Vec<f64> {
        let rank = self
            .points
            .first()
            .map_or(0, stormcell_core::Point::spatial_rank);
        self.points
            .iter()
            .filter_map(|p| p.values.get(rank + value_index).copied())
            .collect()
    }

    /// Lowest and highest weight response over the member points under `w`.
    pub fn weight_range(&self, w: &dyn stormcell_core::WeightFunction) -> Option<(f64, f64)> {
        let mut iter = self.points.iter().map(|p| w.weight(p));
        let first = iter.next()?;
        let (mut lo, mut hi) = (first, first);
        for v in iter {
            if v < lo {
                lo = v;
            }
            if v > hi {
                hi = v;
            }
        }
        Some((lo, hi))
    }

    /// Recompute the mode as the arithmetic mean of the member feature
    /// vectors. No-op on an empty cluster.
    pub fn recompute_mode(&mut self) {
        if let Some(mode) = mean_vector(self.points.iter().map(|p| p.values.as_slice())) {
            self.mode = mode;
        }
    }
}

impl Default for Cluster {
    fn default() -> Self {
        Self::new()
    }
}
