//! # stormcell-track
//!
//! Temporal tracking of [`stormcell_cluster::ClusterList`]s: pairwise
//! correlation matrices, likelihood-based greedy matchmaking, fresh-id
//! handout, and merge/split annotation.
//!
//! ```no_run
//! use stormcell_core::UniformGrid;
//! use stormcell_track::{Tracking, TrackingConfig};
//! # fn demo(previous: &stormcell_cluster::ClusterList,
//! #         current: &mut stormcell_cluster::ClusterList)
//! #     -> stormcell_core::CoreResult<()> {
//! let grid = UniformGrid::kilometres(vec![1.0, 1.0])?;
//! let tracking = Tracking::new(TrackingConfig::default())?;
//! let summary = tracking.track(previous, current, &grid, Some("reflectivity"))?;
//! println!("tracked {} clusters", summary.tracked);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod correlation;
pub mod engine;

pub use config::{TrackingConfig, TrackingConfigBuilder};
pub use correlation::CorrelationMatrices;
pub use engine::{Tracking, TrackingPhase, TrackingSummary};
