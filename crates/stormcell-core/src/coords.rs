//! Coordinate-system implementations.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::traits::CoordinateSystem;

/// A uniform rectilinear grid.
///
/// Each spatial dimension has a fixed resolution (coordinate units per grid
/// step) and a single scale factor converts coordinate units to metres. For
/// radar composites the coordinate unit is usually kilometres, giving a
/// scale of 1000.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformGrid {
    resolution: Vec<f64>,
    metres_per_unit: f64,
}

impl UniformGrid {
    /// Create a grid with the given per-dimension resolution and unit scale.
    pub fn new(resolution: Vec<f64>, metres_per_unit: f64) -> CoreResult<Self> {
        if resolution.is_empty() {
            return Err(CoreError::configuration("grid resolution must not be empty"));
        }
        if resolution.iter().any(|&r| r <= 0.0 || !r.is_finite()) {
            return Err(CoreError::configuration(
                "grid resolution components must be finite and positive",
            ));
        }
        if metres_per_unit <= 0.0 || !metres_per_unit.is_finite() {
            return Err(CoreError::configuration(
                "metres-per-unit scale must be finite and positive",
            ));
        }
        Ok(Self {
            resolution,
            metres_per_unit,
        })
    }

    /// Convenience constructor for a grid whose coordinates are in
    /// kilometres.
    pub fn kilometres(resolution: Vec<f64>) -> CoreResult<Self> {
        Self::new(resolution, 1000.0)
    }

    /// Number of spatial dimensions.
    pub fn spatial_rank(&self) -> usize {
        self.resolution.len()
    }
}

impl CoordinateSystem for UniformGrid {
    fn to_physical_units(&self, v: &[f64]) -> Vec<f64> {
        v.iter().map(|c| c * self.metres_per_unit).collect()
    }

    fn resolution(&self) -> &[f64] {
        &self.resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_resolution() {
        assert!(UniformGrid::new(vec![], 1000.0).is_err());
        assert!(UniformGrid::new(vec![1.0, 0.0], 1000.0).is_err());
        assert!(UniformGrid::new(vec![1.0, 1.0], -1.0).is_err());
    }

    #[test]
    fn test_physical_conversion() {
        let grid = UniformGrid::kilometres(vec![1.0, 1.0]).expect("valid grid");
        assert_eq!(grid.to_physical_units(&[3.0, 4.0]), vec![3000.0, 4000.0]);
        assert!((grid.physical_magnitude(&[3.0, 4.0]) - 5000.0).abs() < 1e-9);
    }
}
