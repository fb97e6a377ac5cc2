//! Prepared stores of one profile, with exact fallback
//!
//! [`FastIsochroneIndex`] owns one store pair per weighting. A query first
//! tries the fast path; a missing, unreadable or mismatched store, or a query
//! that runs into its settled-node cap, degrades to a plain bounded search
//! over the whole graph.

use tracing::{debug, warn};

use fastiso_common::{Error, FastIsochroneConfig, NodeId, Result};

use crate::border_distance::BorderNodeDistanceStore;
use crate::eccentricity::EccentricityStore;
use crate::graph::RoadGraph;
use crate::partition::CellPartition;
use crate::query::{validate_request, FastIsochroneQuery, ReachableSet};
use crate::search::RangeSearch;
use crate::weighting::{CostFunctionId, Weighting};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMethod {
    /// Two-level search over the prepared stores
    Fast,
    /// Plain bounded search
    Exact,
}

#[derive(Debug, Clone)]
pub struct Isochrone {
    pub method: QueryMethod,
    pub reachable: ReachableSet,
}

struct StorePair {
    distances: BorderNodeDistanceStore,
    eccentricities: EccentricityStore,
}

pub struct FastIsochroneIndex {
    config: FastIsochroneConfig,
    stores: Vec<StorePair>,
}

impl FastIsochroneIndex {
    pub fn new(config: FastIsochroneConfig) -> Self {
        Self {
            config,
            stores: Vec::new(),
        }
    }

    /// Load the prepared stores of each weighting from the storage
    /// directory. Weightings without usable stores are skipped and later
    /// served by the exact search.
    pub fn open(config: FastIsochroneConfig, weightings: &[&dyn Weighting]) -> Self {
        let mut index = Self::new(config);
        for &weighting in weightings {
            match index.load(weighting) {
                Ok(true) => {}
                Ok(false) => debug!(
                    weighting = %weighting.descriptor(),
                    "no prepared stores, exact search only"
                ),
                Err(err) => warn!(
                    weighting = %weighting.descriptor(),
                    error = %err,
                    "cannot load prepared stores, exact search only"
                ),
            }
        }
        index
    }

    fn load(&mut self, weighting: &dyn Weighting) -> Result<bool> {
        let dir = &self.config.storage_dir;
        let mut distances = BorderNodeDistanceStore::new(dir, weighting);
        let mut eccentricities = EccentricityStore::new(dir, weighting);
        if !distances.load_existing()? || !eccentricities.load_existing()? {
            return Ok(false);
        }
        self.insert(distances, eccentricities)?;
        Ok(true)
    }

    /// Register a store pair, replacing any pair of the same weighting.
    pub fn insert(
        &mut self,
        distances: BorderNodeDistanceStore,
        eccentricities: EccentricityStore,
    ) -> Result<()> {
        if distances.cost_function() != eccentricities.cost_function() {
            return Err(Error::CostFunctionMismatch {
                store: eccentricities.path().display().to_string(),
                requested: distances.cost_function().descriptor(),
            });
        }
        let id = distances.cost_function().clone();
        self.stores
            .retain(|pair| pair.distances.cost_function() != &id);
        self.stores.push(StorePair {
            distances,
            eccentricities,
        });
        Ok(())
    }

    pub fn stores_for(
        &self,
        weighting: &dyn Weighting,
    ) -> Option<(&BorderNodeDistanceStore, &EccentricityStore)> {
        self.stores
            .iter()
            .find(|pair| pair.distances.matches_cost_function(weighting))
            .map(|pair| (&pair.distances, &pair.eccentricities))
    }

    pub fn cost_functions(&self) -> Vec<CostFunctionId> {
        self.stores
            .iter()
            .map(|pair| pair.distances.cost_function().clone())
            .collect()
    }

    pub fn config(&self) -> &FastIsochroneConfig {
        &self.config
    }

    fn fast(
        &self,
        graph: &RoadGraph,
        partition: &CellPartition,
        weighting: &dyn Weighting,
        source: NodeId,
        budget: f64,
    ) -> Result<ReachableSet> {
        let (distances, eccentricities) = self
            .stores_for(weighting)
            .ok_or_else(|| Error::NotInitialized(format!("stores for {}", weighting.descriptor())))?;
        FastIsochroneQuery::new(graph, partition, weighting, distances, eccentricities)?
            .max_settled(self.config.max_query_settled)
            .run(source, budget)
    }

    /// Nodes reachable from `source` within `budget` under `weighting`.
    ///
    /// Only invalid arguments are reported; every other failure of the fast
    /// path is logged and answered by the exact search.
    pub fn isochrone(
        &self,
        graph: &RoadGraph,
        partition: &CellPartition,
        weighting: &dyn Weighting,
        source: NodeId,
        budget: f64,
    ) -> Result<Isochrone> {
        validate_request(graph, source, budget)?;
        if partition.n_nodes() != graph.n_nodes() {
            return Err(Error::InvalidArgument(format!(
                "partition covers {} nodes, graph has {}",
                partition.n_nodes(),
                graph.n_nodes()
            )));
        }

        match self.fast(graph, partition, weighting, source, budget) {
            Ok(reachable) => Ok(Isochrone {
                method: QueryMethod::Fast,
                reachable,
            }),
            Err(err) if err.is_recoverable_at_query() => {
                warn!(
                    weighting = %weighting.descriptor(),
                    source,
                    error = %err,
                    "fast isochrone unavailable, falling back to exact search"
                );
                let result = RangeSearch::new(graph, weighting)
                    .budget(budget)
                    .run(&[(source, 0.0)]);
                Ok(Isochrone {
                    method: QueryMethod::Exact,
                    reachable: ReachableSet::from_range(budget, result),
                })
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::prepare::Preparation;
    use crate::weighting::{FastestWeighting, ShortestWeighting};

    fn fixture() -> (RoadGraph, CellPartition) {
        let mut builder = GraphBuilder::new(4);
        builder.add_edge(0, 1, 1.0, 50.0).unwrap();
        builder.add_edge(1, 2, 1.0, 50.0).unwrap();
        builder.add_edge(2, 3, 1.0, 50.0).unwrap();
        let graph = builder.build();
        let partition = CellPartition::from_cell_ids(&graph, vec![0, 0, 1, 1]).unwrap();
        (graph, partition)
    }

    fn config(dir: &std::path::Path) -> FastIsochroneConfig {
        FastIsochroneConfig {
            storage_dir: dir.to_path_buf(),
            max_cell_nodes: 10,
            ..Default::default()
        }
    }

    #[test]
    fn selects_store_by_weighting() {
        let (graph, partition) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let shortest = ShortestWeighting::new("car");
        Preparation::new(&graph, &partition, &config)
            .unwrap()
            .run(&shortest)
            .unwrap();

        let fastest = FastestWeighting::new("car");
        let weightings: [&dyn Weighting; 2] = [&shortest, &fastest];
        let index = FastIsochroneIndex::open(config, &weightings);
        assert!(index.stores_for(&shortest).is_some());
        assert!(index.stores_for(&fastest).is_none());
        assert_eq!(index.cost_functions().len(), 1);

        let fast = index.isochrone(&graph, &partition, &shortest, 0, 2.0).unwrap();
        assert_eq!(fast.method, QueryMethod::Fast);
        let exact = index.isochrone(&graph, &partition, &fastest, 0, 0.0).unwrap();
        assert_eq!(exact.method, QueryMethod::Exact);
        assert_eq!(exact.reachable.len(&partition), 1);
    }

    #[test]
    fn invalid_arguments_are_not_masked() {
        let (graph, partition) = fixture();
        let index = FastIsochroneIndex::new(FastIsochroneConfig::default());
        let w = ShortestWeighting::new("car");
        assert!(index.isochrone(&graph, &partition, &w, 9, 1.0).is_err());
        assert!(index.isochrone(&graph, &partition, &w, 0, -2.0).is_err());
    }

    #[test]
    fn insert_replaces_same_weighting() {
        let (graph, partition) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let w = ShortestWeighting::new("car");
        let prep = Preparation::new(&graph, &partition, &config).unwrap();

        let mut index = FastIsochroneIndex::new(config.clone());
        let (d, e) = prep.run(&w).unwrap();
        index.insert(d, e).unwrap();
        let (d, e) = prep.run(&w).unwrap();
        index.insert(d, e).unwrap();
        assert_eq!(index.cost_functions().len(), 1);

        let other = FastestWeighting::new("car");
        let d = BorderNodeDistanceStore::new(dir.path(), &w);
        let e = EccentricityStore::new(dir.path(), &other);
        assert!(matches!(
            index.insert(d, e),
            Err(Error::CostFunctionMismatch { .. })
        ));
    }
}
