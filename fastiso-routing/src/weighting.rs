//! Edge-cost functions
//!
//! Searches never add raw weights. Every edge cost is first snapped to a
//! multiple of `1 / COST_RESOLUTION`, a power of two, so path costs below
//! 2^43 are sums of fixed-point values and come out bit-identical whatever
//! the order of addition. A peer distance summed during preparation and the
//! same path summed edge by edge at query time then agree exactly.

use crate::graph::Edge;

/// Fixed-point steps per cost unit
pub const COST_RESOLUTION: f64 = 1024.0;

/// Snap `cost` to the cost grid. Non-finite and negative costs are
/// impassable.
pub fn snap_cost(cost: f64) -> f64 {
    if !cost.is_finite() || cost < 0.0 {
        return f64::INFINITY;
    }
    (cost * COST_RESOLUTION).round() / COST_RESOLUTION
}

/// Cost model over graph edges. All prepared data is specific to one.
pub trait Weighting: Send + Sync {
    /// Weighting name, e.g. `fastest`.
    fn name(&self) -> &str;

    /// Base profile the weighting was built for, e.g. `car`.
    fn profile(&self) -> &str;

    /// Raw cost of traversing `edge`; `f64::INFINITY` marks an impassable edge.
    fn edge_weight(&self, edge: &Edge) -> f64;

    /// Cost used by every search: [`Weighting::edge_weight`] on the cost grid.
    fn edge_cost(&self, edge: &Edge) -> f64 {
        snap_cost(self.edge_weight(edge))
    }

    fn descriptor(&self) -> String {
        format!("{}|{}", self.name(), self.profile())
    }
}

/// Identity of a weighting as recorded by a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CostFunctionId {
    pub name: String,
    pub profile: String,
}

impl CostFunctionId {
    pub fn of(weighting: &dyn Weighting) -> Self {
        Self {
            name: weighting.name().to_string(),
            profile: weighting.profile().to_string(),
        }
    }

    pub fn matches(&self, weighting: &dyn Weighting) -> bool {
        self.name == weighting.name() && self.profile == weighting.profile()
    }

    pub fn descriptor(&self) -> String {
        format!("{}|{}", self.name, self.profile)
    }
}

/// Cost = length in meters.
#[derive(Debug, Clone)]
pub struct ShortestWeighting {
    profile: String,
}

impl ShortestWeighting {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
        }
    }
}

impl Weighting for ShortestWeighting {
    fn name(&self) -> &str {
        "shortest"
    }

    fn profile(&self) -> &str {
        &self.profile
    }

    fn edge_weight(&self, edge: &Edge) -> f64 {
        edge.length_m
    }
}

/// Cost = travel time in seconds at the edge speed, optionally capped.
#[derive(Debug, Clone)]
pub struct FastestWeighting {
    profile: String,
    max_speed_kmh: Option<f64>,
}

impl FastestWeighting {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            max_speed_kmh: None,
        }
    }

    pub fn with_max_speed(mut self, max_speed_kmh: f64) -> Self {
        self.max_speed_kmh = Some(max_speed_kmh);
        self
    }
}

impl Weighting for FastestWeighting {
    fn name(&self) -> &str {
        "fastest"
    }

    fn profile(&self) -> &str {
        &self.profile
    }

    fn edge_weight(&self, edge: &Edge) -> f64 {
        let speed = match self.max_speed_kmh {
            Some(cap) => edge.speed_kmh.min(cap),
            None => edge.speed_kmh,
        };
        if speed <= 0.0 {
            return f64::INFINITY;
        }
        edge.length_m / (speed / 3.6)
    }
}
