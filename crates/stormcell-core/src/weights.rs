//! Weight-function implementations.

use crate::point::Point;
use crate::traits::WeightFunction;

/// Weight function reading a single value variable off each point.
///
/// The index is into the *value* portion of the feature vector; the spatial
/// components come first and are skipped.
#[derive(Debug, Clone, Copy)]
pub struct ValueWeight {
    variable_index: usize,
}

impl ValueWeight {
    /// Weight by the value variable at `variable_index` (0 = first value
    /// component after the spatial components).
    pub fn new(variable_index: usize) -> Self {
        Self { variable_index }
    }
}

impl WeightFunction for ValueWeight {
    fn weight(&self, point: &Point) -> f64 {
        let i = point.spatial_rank() + self.variable_index;
        point.values.get(i).copied().unwrap_or(0.0)
    }
}
