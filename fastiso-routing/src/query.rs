//! Two-level reachability query
//!
//! 1. Start cell: cell-confined search from the source. Border nodes of the
//!    start cell within budget seed the coarse queue.
//! 2. Coarse: Dijkstra over border nodes only. A border node relaxes its
//!    precomputed in-cell peer distances and the arcs leaving its cell.
//! 3. A popped border node whose eccentricity fits into the remaining budget
//!    marks its whole cell reachable, provided the cell is fully reachable
//!    from it. Such cells are never expanded node by node.
//! 4. Active cells: each other cell touched by the coarse search is expanded
//!    by a cell-confined multi-source search seeded with the coarse
//!    distances of its border nodes (and the source for the start cell).
//!
//! Coarse relaxation continues through bulk-marked cells, so the result is
//! the same node set a plain bounded search would produce.

use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use rustc_hash::FxHashMap;
use tracing::debug;

use fastiso_common::{CellId, Error, NodeId, Result};

use crate::border_distance::BorderNodeDistanceStore;
use crate::eccentricity::EccentricityStore;
use crate::graph::RoadGraph;
use crate::partition::CellPartition;
use crate::search::{HeapEntry, RangeResult, RangeSearch};
use crate::weighting::Weighting;

/// Reject a source outside the graph or a budget that is not a number >= 0.
pub(crate) fn validate_request(graph: &RoadGraph, source: NodeId, budget: f64) -> Result<()> {
    if !graph.contains(source) {
        return Err(Error::InvalidArgument(format!(
            "source {source} outside graph of {} nodes",
            graph.n_nodes()
        )));
    }
    if budget.is_nan() || budget < 0.0 {
        return Err(Error::InvalidArgument(format!(
            "budget must be non-negative, got {budget}"
        )));
    }
    Ok(())
}

#[derive(Debug, Default, Clone)]
pub struct QueryStats {
    pub start_cell_settled: usize,
    pub border_nodes_settled: usize,
    pub bulk_cells: usize,
    pub active_cells: usize,
    pub active_settled: usize,
}

impl QueryStats {
    pub fn total_settled(&self) -> usize {
        self.start_cell_settled + self.border_nodes_settled + self.active_settled
    }
}

/// Nodes reachable within a budget.
///
/// Cells marked reachable in bulk are kept as cell ids; their nodes carry no
/// individual distance.
#[derive(Debug, Default, Clone)]
pub struct ReachableSet {
    pub budget: f64,
    pub fully_reachable_cells: BTreeSet<CellId>,
    /// Individually expanded nodes with their distance
    pub nodes: FxHashMap<NodeId, f64>,
    pub stats: QueryStats,
}

impl ReachableSet {
    /// Set produced by a plain bounded search.
    pub fn from_range(budget: f64, result: RangeResult) -> Self {
        Self {
            budget,
            fully_reachable_cells: BTreeSet::new(),
            nodes: result.dist,
            stats: QueryStats::default(),
        }
    }

    pub fn contains(&self, partition: &CellPartition, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
            || ((node as usize) < partition.n_nodes()
                && self.fully_reachable_cells.contains(&partition.cell_id(node)))
    }

    /// Distance of an individually expanded node.
    pub fn distance(&self, node: NodeId) -> Option<f64> {
        self.nodes.get(&node).copied()
    }

    /// Every reachable node, bulk cells expanded.
    pub fn node_ids(&self, partition: &CellPartition) -> BTreeSet<NodeId> {
        let mut ids: BTreeSet<NodeId> = self.nodes.keys().copied().collect();
        for &cell in &self.fully_reachable_cells {
            ids.extend(partition.nodes_of_cell(cell).iter().copied());
        }
        ids
    }

    pub fn len(&self, partition: &CellPartition) -> usize {
        self.node_ids(partition).len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.fully_reachable_cells.is_empty()
    }
}

pub struct FastIsochroneQuery<'a> {
    graph: &'a RoadGraph,
    partition: &'a CellPartition,
    weighting: &'a dyn Weighting,
    distances: &'a BorderNodeDistanceStore,
    eccentricities: &'a EccentricityStore,
    max_settled: usize,
}

impl<'a> FastIsochroneQuery<'a> {
    /// Bind the prepared stores of `weighting`. Fails when either store is
    /// closed or was prepared for another weighting.
    pub fn new(
        graph: &'a RoadGraph,
        partition: &'a CellPartition,
        weighting: &'a dyn Weighting,
        distances: &'a BorderNodeDistanceStore,
        eccentricities: &'a EccentricityStore,
    ) -> Result<Self> {
        for (closed, matches, path) in [
            (
                distances.is_closed(),
                distances.matches_cost_function(weighting),
                distances.path(),
            ),
            (
                eccentricities.is_closed(),
                eccentricities.matches_cost_function(weighting),
                eccentricities.path(),
            ),
        ] {
            if closed {
                return Err(Error::NotInitialized(path.display().to_string()));
            }
            if !matches {
                return Err(Error::CostFunctionMismatch {
                    store: path.display().to_string(),
                    requested: weighting.descriptor(),
                });
            }
        }
        Ok(Self {
            graph,
            partition,
            weighting,
            distances,
            eccentricities,
            max_settled: usize::MAX,
        })
    }

    /// Cap on entries settled over all phases of one query.
    pub fn max_settled(mut self, max_settled: usize) -> Self {
        self.max_settled = max_settled;
        self
    }

    fn remaining(&self, stats: &QueryStats) -> usize {
        self.max_settled.saturating_sub(stats.total_settled())
    }

    pub fn run(&self, source: NodeId, budget: f64) -> Result<ReachableSet> {
        validate_request(self.graph, source, budget)?;
        let mut stats = QueryStats::default();
        let start_cell = self.partition.cell_id(source);

        // Start cell
        let start = RangeSearch::new(self.graph, self.weighting)
            .within_cell(self.partition, start_cell)
            .budget(budget)
            .max_settled(self.remaining(&stats))
            .run(&[(source, 0.0)]);
        stats.start_cell_settled = start.n_settled();
        if start.limit_hit {
            return Err(Error::ExpansionLimit(self.max_settled));
        }

        // Coarse search over border nodes
        let mut tentative: FxHashMap<NodeId, f64> = FxHashMap::default();
        let mut settled: FxHashMap<NodeId, f64> = FxHashMap::default();
        let mut pq: BinaryHeap<HeapEntry> = BinaryHeap::new();
        let mut bulk: BTreeSet<CellId> = BTreeSet::new();

        for (&node, &cost) in &start.dist {
            if self.partition.is_border_node(node) {
                tentative.insert(node, cost);
                pq.push(HeapEntry { cost, node });
            }
        }

        while let Some(HeapEntry { cost, node }) = pq.pop() {
            if cost > budget {
                break;
            }
            if settled.contains_key(&node) || cost > tentative[&node] {
                continue;
            }
            if stats.total_settled() >= self.max_settled {
                return Err(Error::ExpansionLimit(self.max_settled));
            }
            settled.insert(node, cost);
            stats.border_nodes_settled += 1;

            let cell = self.partition.cell_id(node);
            if !bulk.contains(&cell) && self.eccentricities.get_fully_reachable(node)? {
                let eccentricity = self.eccentricities.get_eccentricity(node)? as f64;
                if cost + eccentricity <= budget {
                    bulk.insert(cell);
                }
            }

            let mut relax = |head: NodeId, new_cost: f64| {
                if new_cost > budget || settled.contains_key(&head) {
                    return;
                }
                let best = tentative.entry(head).or_insert(f64::INFINITY);
                if new_cost < *best {
                    *best = new_cost;
                    pq.push(HeapEntry {
                        cost: new_cost,
                        node: head,
                    });
                }
            };

            for (peer, distance) in self.distances.get_distance_set(node)?.iter() {
                if distance.is_finite() {
                    relax(peer, cost + distance);
                }
            }
            for edge in self.graph.out_edges(node) {
                if self.partition.cell_id(edge.head) == cell {
                    continue;
                }
                let w = self.weighting.edge_cost(edge);
                if w.is_finite() {
                    relax(edge.head, cost + w);
                }
            }
        }
        stats.bulk_cells = bulk.len();

        // Active cells, seeded by coarse distances
        let mut seeds: BTreeMap<CellId, Vec<(NodeId, f64)>> = BTreeMap::new();
        seeds.entry(start_cell).or_default().push((source, 0.0));
        for (&node, &cost) in &settled {
            seeds.entry(self.partition.cell_id(node)).or_default().push((node, cost));
        }

        let mut nodes: FxHashMap<NodeId, f64> = FxHashMap::default();
        for (cell, cell_seeds) in seeds {
            if bulk.contains(&cell) {
                continue;
            }
            let result = RangeSearch::new(self.graph, self.weighting)
                .within_cell(self.partition, cell)
                .budget(budget)
                .max_settled(self.remaining(&stats))
                .run(&cell_seeds);
            stats.active_cells += 1;
            stats.active_settled += result.n_settled();
            if result.limit_hit {
                return Err(Error::ExpansionLimit(self.max_settled));
            }
            nodes.extend(result.dist);
        }

        debug!(
            source,
            budget,
            start_cell = stats.start_cell_settled,
            border_nodes = stats.border_nodes_settled,
            bulk_cells = stats.bulk_cells,
            active_cells = stats.active_cells,
            "fast isochrone query"
        );

        Ok(ReachableSet {
            budget,
            fully_reachable_cells: bulk,
            nodes,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::prepare::Preparation;
    use crate::weighting::{FastestWeighting, ShortestWeighting};
    use fastiso_common::FastIsochroneConfig;

    //  cell 0        cell 1        cell 2
    //  0 -1- 1 -2- 2 -1- 3 -1- 4 -3- 5 -1- 6
    fn chain() -> (RoadGraph, CellPartition) {
        let mut builder = GraphBuilder::new(7);
        builder.add_edge(0, 1, 1.0, 50.0).unwrap();
        builder.add_edge(1, 2, 2.0, 50.0).unwrap();
        builder.add_edge(2, 3, 1.0, 50.0).unwrap();
        builder.add_edge(3, 4, 1.0, 50.0).unwrap();
        builder.add_edge(4, 5, 3.0, 50.0).unwrap();
        builder.add_edge(5, 6, 1.0, 50.0).unwrap();
        let graph = builder.build();
        let partition = CellPartition::from_cell_ids(&graph, vec![0, 0, 1, 1, 1, 2, 2]).unwrap();
        (graph, partition)
    }

    fn prepared(
        dir: &std::path::Path,
        graph: &RoadGraph,
        partition: &CellPartition,
        weighting: &dyn Weighting,
    ) -> (BorderNodeDistanceStore, EccentricityStore) {
        let config = FastIsochroneConfig {
            storage_dir: dir.to_path_buf(),
            max_cell_nodes: 10,
            ..Default::default()
        };
        Preparation::new(graph, partition, &config)
            .unwrap()
            .run(weighting)
            .unwrap()
    }

    #[test]
    fn chain_bulk_marks_middle_cell() {
        let (graph, partition) = chain();
        let dir = tempfile::tempdir().unwrap();
        let w = ShortestWeighting::new("car");
        let (distances, eccentricities) = prepared(dir.path(), &graph, &partition, &w);
        let query = FastIsochroneQuery::new(&graph, &partition, &w, &distances, &eccentricities).unwrap();

        // 2 is reached at 3 with eccentricity 2, so cell 1 fits a budget of 5.
        // 5 is at 8, just beyond.
        let set = query.run(0, 5.0).unwrap();
        assert_eq!(
            set.fully_reachable_cells.iter().copied().collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert!(set.contains(&partition, 4));
        assert!(!set.contains(&partition, 5));
        assert_eq!(set.stats.active_cells, 0);
        assert_eq!(
            set.node_ids(&partition).into_iter().collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );

        let wider = query.run(0, 8.0).unwrap();
        assert!(wider.contains(&partition, 5));
        assert!(!wider.contains(&partition, 6));
        assert_eq!(wider.distance(5), Some(8.0));
    }

    #[test]
    fn zero_budget_is_source_only() {
        let (graph, partition) = chain();
        let dir = tempfile::tempdir().unwrap();
        let w = ShortestWeighting::new("car");
        let (distances, eccentricities) = prepared(dir.path(), &graph, &partition, &w);
        let query = FastIsochroneQuery::new(&graph, &partition, &w, &distances, &eccentricities).unwrap();

        let set = query.run(3, 0.0).unwrap();
        assert_eq!(set.node_ids(&partition).into_iter().collect::<Vec<_>>(), vec![3]);
        assert!(set.fully_reachable_cells.is_empty());
    }

    #[test]
    fn rejects_invalid_requests() {
        let (graph, partition) = chain();
        let dir = tempfile::tempdir().unwrap();
        let w = ShortestWeighting::new("car");
        let (distances, eccentricities) = prepared(dir.path(), &graph, &partition, &w);
        let query = FastIsochroneQuery::new(&graph, &partition, &w, &distances, &eccentricities).unwrap();

        assert!(matches!(query.run(70, 1.0), Err(Error::InvalidArgument(_))));
        assert!(matches!(query.run(0, -1.0), Err(Error::InvalidArgument(_))));
        assert!(matches!(query.run(0, f64::NAN), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn stores_of_other_weighting_are_refused() {
        let (graph, partition) = chain();
        let dir = tempfile::tempdir().unwrap();
        let shortest = ShortestWeighting::new("car");
        let (distances, eccentricities) = prepared(dir.path(), &graph, &partition, &shortest);

        let fastest = FastestWeighting::new("car");
        let err = FastIsochroneQuery::new(&graph, &partition, &fastest, &distances, &eccentricities)
            .err()
            .unwrap();
        assert!(matches!(err, Error::CostFunctionMismatch { .. }));
    }

    #[test]
    fn settled_cap_aborts() {
        let (graph, partition) = chain();
        let dir = tempfile::tempdir().unwrap();
        let w = ShortestWeighting::new("car");
        let (distances, eccentricities) = prepared(dir.path(), &graph, &partition, &w);
        let query = FastIsochroneQuery::new(&graph, &partition, &w, &distances, &eccentricities)
            .unwrap()
            .max_settled(3);

        assert!(matches!(query.run(0, 100.0), Err(Error::ExpansionLimit(3))));
        assert!(query.run(0, 0.0).is_ok());
    }
}
