//! # stormcell-core
//!
//! Core data model for the stormcell detection and tracking workspace:
//! the feature-space [`Point`] type, the collaborator traits the engines
//! consume ([`SpatialIndex`], [`CoordinateSystem`], [`WeightFunction`]),
//! concrete grid-backed implementations, and the shared error taxonomy.
//!
//! The cluster aggregation engine lives in `stormcell-cluster` and the
//! temporal tracking engine in `stormcell-track`; both build on this crate.

pub mod coords;
pub mod error;
pub mod grid;
pub mod math;
pub mod point;
pub mod traits;
pub mod weights;

pub use coords::UniformGrid;
pub use error::{CoreError, CoreResult};
pub use grid::GridIndex;
pub use point::Point;
pub use traits::{CoordinateSystem, SpatialIndex, WeightFunction};
pub use weights::ValueWeight;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
