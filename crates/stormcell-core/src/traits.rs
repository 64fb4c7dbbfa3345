//! Collaborator traits at the seams of the system.
//!
//! The aggregation and tracking engines do not own the spatial lookup
//! structure, the coordinate system or the weight-function strategy; they
//! consume them through these traits. Concrete grid-backed implementations
//! live in [`crate::grid`] and [`crate::coords`].

use crate::point::Point;

/// Grid-point lookup over a fixed arena of points.
///
/// Implementations are built over a point slice and return *indices* into
/// that slice, never references. This keeps the index usable while the caller
/// mutates the points (cluster assignment, boundary flags) and sidesteps the
/// shared back-pointer graph of older designs.
pub trait SpatialIndex: Send + Sync {
    /// Index of the point occupying `gridpoint`, if any.
    ///
    /// An out-of-range or unoccupied lookup is not an error; it returns
    /// `None` and the caller skips the point or pair.
    fn lookup(&self, gridpoint: &[i64]) -> Option<usize>;

    /// Indices of all points in the immediate 3^d stencil around
    /// `gridpoint`, excluding the center cell itself.
    fn neighbours(&self, gridpoint: &[i64]) -> Vec<usize>;
}

/// Conversion between grid/coordinate space and physical units.
pub trait CoordinateSystem: Send + Sync {
    /// Convert a coordinate-space vector to metres, component-wise.
    fn to_physical_units(&self, v: &[f64]) -> Vec<f64>;

    /// Grid resolution in coordinate units per grid step, one entry per
    /// spatial dimension.
    fn resolution(&self) -> &[f64];

    /// Euclidean length of a coordinate-space vector in metres.
    fn physical_magnitude(&self, v: &[f64]) -> f64 {
        crate::math::magnitude(&self.to_physical_units(v))
    }
}

/// Pluggable scalar response per point.
///
/// Used for coalescence tie-breaking during aggregation and as the optional
/// histogram variable during tracking. Implementations carry their own
/// configuration; there is no shared mutable state.
pub trait WeightFunction: Send + Sync {
    /// Scalar response of `point`.
    fn weight(&self, point: &Point) -> f64;
}
