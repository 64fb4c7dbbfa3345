//! # stormcell-cluster
//!
//! Cluster aggregation for mean-shift-annotated gridded fields: the
//! [`Cluster`] and [`ClusterList`] types, the
//! [`ClusterGraphAggregator`] engine, equidistant [`Histogram`]s with
//! Kendall rank correlation, and the [`ClusterIndex`] occupancy index used
//! for coverage queries.

pub mod aggregator;
pub mod cluster;
pub mod histogram;
pub mod index;
pub mod list;

pub use aggregator::{AggregationConfig, ClusterGraphAggregator};
pub use cluster::Cluster;
pub use histogram::Histogram;
pub use index::ClusterIndex;
pub use list::ClusterList;
