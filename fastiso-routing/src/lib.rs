//! Fast-isochrone index for road networks
//!
//! Offline, [`prepare`] runs bounded searches inside every partition cell and
//! persists two stores per weighting: border-to-border distances
//! ([`border_distance`]) and per-border-node eccentricity bounds
//! ([`eccentricity`]). At serving time [`query`] combines a search in the
//! source cell with a Dijkstra over border nodes, marking whole cells
//! reachable when the eccentricity bound allows it. [`service`] owns the
//! loaded stores of one profile and falls back to an exact bounded search
//! whenever the fast path cannot answer.

pub mod border_distance;
pub mod eccentricity;
pub mod graph;
pub mod partition;
pub mod prepare;
pub mod query;
pub mod search;
pub mod service;
pub mod weighting;

pub use border_distance::{BorderNodeDistanceSet, BorderNodeDistanceStore};
pub use eccentricity::EccentricityStore;
pub use graph::{Edge, GraphBuilder, RoadGraph};
pub use partition::CellPartition;
pub use prepare::Preparation;
pub use query::{FastIsochroneQuery, QueryStats, ReachableSet};
pub use search::{RangeResult, RangeSearch};
pub use service::{FastIsochroneIndex, Isochrone, QueryMethod};
pub use weighting::{
    snap_cost, CostFunctionId, FastestWeighting, ShortestWeighting, Weighting, COST_RESOLUTION,
};

pub use fastiso_common::{CellId, Error, NodeId, Result};
