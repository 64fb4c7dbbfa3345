//! Feature-space point type.
//!
//! A [`Point`] is one sample of the gridded field: its physical coordinate,
//! its integer grid index, the full feature vector (spatial components
//! followed by value components), and the mean-shift displacement produced
//! by the upstream iteration.

use serde::{Deserialize, Serialize};

/// One point in feature space.
///
/// Points are created by the upstream mean-shift stage, mutated here only by
/// cluster membership assignment, and destroyed together with their owning
/// cluster. Ownership is exclusive: a point belongs to at most one cluster at
/// any time. The `cluster` field is a weak back-reference (the owning
/// cluster's id) used for neighbourhood queries, never for ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Physical coordinate, length = spatial rank.
    pub coordinate: Vec<f64>,
    /// Integer grid index, length = spatial rank.
    pub gridpoint: Vec<i64>,
    /// Full feature vector: spatial components followed by value components.
    pub values: Vec<f64>,
    /// Mean-shift displacement, length = feature rank.
    pub shift: Vec<f64>,
    /// Spatial shift rounded to grid steps, length = spatial rank.
    pub gridded_shift: Vec<i64>,
    /// Whether this point was part of the original data set (as opposed to
    /// being synthesized by an upstream smoothing filter).
    pub is_original: bool,
    /// Whether this point lies on its cluster's boundary.
    pub is_boundary: bool,
    /// Id of the owning cluster, if any. Weak reference; set on membership
    /// assignment only.
    pub cluster: Option<u64>,
}

impl Point {
    /// Create a point with no shift information.
    pub fn new(gridpoint: Vec<i64>, coordinate: Vec<f64>, values: Vec<f64>) -> Self {
        let spatial_rank = coordinate.len();
        let rank = values.len();
        Self {
            coordinate,
            gridpoint,
            values,
            shift: vec![0.0; rank],
            gridded_shift: vec![0; spatial_rank],
            is_original: true,
            is_boundary: false,
            cluster: None,
        }
    }

    /// Attach a mean-shift displacement.
    #[must_use]
    pub fn with_shift(mut self, shift: Vec<f64>, gridded_shift: Vec<i64>) -> Self {
        self.shift = shift;
        self.gridded_shift = gridded_shift;
        self
    }

    /// Mark the point as filter-synthesized rather than original.
    #[must_use]
    pub fn synthesized(mut self) -> Self {
        self.is_original = false;
        self
    }

    /// Number of spatial dimensions.
    pub fn spatial_rank(&self) -> usize {
        self.coordinate.len()
    }

    /// Euclidean magnitude of the spatial part of the shift vector.
    ///
    /// A magnitude of exactly zero marks a locally stable ("zero-shift")
    /// point, the seed material for cluster aggregation.
    pub fn spatial_shift_magnitude(&self) -> f64 {
        let rank = self.spatial_rank().min(self.shift.len());
        crate::math::magnitude(&self.shift[..rank])
    }

    /// Whether the spatial component of the shift is exactly zero.
    pub fn is_zero_shift(&self) -> bool {
        self.spatial_shift_magnitude() == 0.0
    }

    /// Grid index of this point's graph predecessor: own gridpoint plus the
    /// gridded shift.
    pub fn predecessor_gridpoint(&self) -> Vec<i64> {
        self.gridpoint
            .iter()
            .zip(self.gridded_shift.iter())
            .map(|(g, s)| g + s)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_2d(x: i64, y: i64) -> Point {
        Point::new(
            vec![x, y],
            vec![x as f64, y as f64],
            vec![x as f64, y as f64, 1.0],
        )
    }

    #[test]
    fn test_zero_shift_detection() {
        let p = point_2d(1, 1);
        assert!(p.is_zero_shift());

        let q = point_2d(1, 1).with_shift(vec![0.5, 0.0, 3.0], vec![1, 0]);
        assert!(!q.is_zero_shift());

        // value-component shift alone does not disturb spatial stability
        let r = point_2d(1, 1).with_shift(vec![0.0, 0.0, 3.0], vec![0, 0]);
        assert!(r.is_zero_shift());
    }

    #[test]
    fn test_predecessor_gridpoint() {
        let p = point_2d(4, 7).with_shift(vec![-1.0, 2.0, 0.0], vec![-1, 2]);
        assert_eq!(p.predecessor_gridpoint(), vec![3, 9]);
    }

    #[test]
    fn test_synthesized_flag() {
        let p = point_2d(0, 0).synthesized();
        assert!(!p.is_original);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut p = point_2d(4, 7).with_shift(vec![-1.0, 2.0, 0.0], vec![-1, 2]);
        p.cluster = Some(3);
        let json = serde_json::to_string(&p).expect("serializes");
        let back: Point = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back, p);
    }
}
