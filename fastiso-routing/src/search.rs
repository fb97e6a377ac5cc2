//! Range query (bounded Dijkstra)
//!
//! Every search in the crate goes through [`RangeSearch`]: the in-cell
//! searches of preparation, the start-cell and active-cell phases of the
//! fast query, and the exact whole-graph fallback.
//!
//! Key properties:
//! - multi-source, each source with its own initial distance
//! - optional confinement to one cell (arcs leaving the cell are skipped)
//! - settles nodes with `dist <= budget` only
//! - optional early stop once a target set is settled
//! - hard cap on settled nodes, reported through `limit_hit`

use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use fastiso_common::{CellId, NodeId};

use crate::graph::RoadGraph;
use crate::partition::CellPartition;
use crate::weighting::Weighting;

/// Heap entry ordered so that `BinaryHeap` pops the smallest cost first.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeapEntry {
    pub cost: f64,
    pub node: NodeId,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap, ties broken by node id
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Query statistics
#[derive(Debug, Default, Clone)]
pub struct RangeStats {
    pub pq_pushes: usize,
    pub pq_pops: usize,
    pub relaxations: usize,
}

/// Result of a range search
#[derive(Debug, Default)]
pub struct RangeResult {
    /// Settled nodes with their distance from the nearest source
    pub dist: FxHashMap<NodeId, f64>,
    /// The settled-node cap stopped the search early
    pub limit_hit: bool,
    pub stats: RangeStats,
}

impl RangeResult {
    pub fn n_settled(&self) -> usize {
        self.dist.len()
    }

    /// Largest settled distance, 0 when nothing was settled.
    pub fn max_dist(&self) -> f64 {
        self.dist.values().copied().fold(0.0, f64::max)
    }
}

pub struct RangeSearch<'a> {
    graph: &'a RoadGraph,
    weighting: &'a dyn Weighting,
    cell: Option<(&'a CellPartition, CellId)>,
    budget: f64,
    max_settled: usize,
    targets: Option<&'a FxHashSet<NodeId>>,
}

impl<'a> RangeSearch<'a> {
    pub fn new(graph: &'a RoadGraph, weighting: &'a dyn Weighting) -> Self {
        Self {
            graph,
            weighting,
            cell: None,
            budget: f64::INFINITY,
            max_settled: usize::MAX,
            targets: None,
        }
    }

    /// Only follow arcs whose both ends lie in `cell`.
    pub fn within_cell(mut self, partition: &'a CellPartition, cell: CellId) -> Self {
        self.cell = Some((partition, cell));
        self
    }

    pub fn budget(mut self, budget: f64) -> Self {
        self.budget = budget;
        self
    }

    pub fn max_settled(mut self, max_settled: usize) -> Self {
        self.max_settled = max_settled;
        self
    }

    /// Stop as soon as every node of `targets` is settled.
    pub fn stop_after(mut self, targets: &'a FxHashSet<NodeId>) -> Self {
        self.targets = Some(targets);
        self
    }

    fn admits(&self, node: NodeId) -> bool {
        match self.cell {
            Some((partition, cell)) => partition.cell_id(node) == cell,
            None => true,
        }
    }

    /// Run from `(node, initial distance)` sources. Sources outside the
    /// search cell or beyond the budget are ignored.
    pub fn run(&self, sources: &[(NodeId, f64)]) -> RangeResult {
        let mut result = RangeResult::default();
        let mut tentative: FxHashMap<NodeId, f64> = FxHashMap::default();
        let mut pq: BinaryHeap<HeapEntry> = BinaryHeap::new();

        for &(node, cost) in sources {
            if !self.graph.contains(node) || !self.admits(node) || !(cost <= self.budget) {
                continue;
            }
            let best = tentative.entry(node).or_insert(f64::INFINITY);
            if cost < *best {
                *best = cost;
                pq.push(HeapEntry { cost, node });
                result.stats.pq_pushes += 1;
            }
        }

        let mut targets_left = self.targets.map(|t| t.len()).unwrap_or(usize::MAX);

        while let Some(HeapEntry { cost, node }) = pq.pop() {
            result.stats.pq_pops += 1;

            // Skip stale entries and already settled nodes
            if result.dist.contains_key(&node) || cost > tentative[&node] {
                continue;
            }
            if result.dist.len() >= self.max_settled {
                result.limit_hit = true;
                break;
            }
            result.dist.insert(node, cost);

            if let Some(targets) = self.targets {
                if targets.contains(&node) {
                    targets_left -= 1;
                    if targets_left == 0 {
                        break;
                    }
                }
            }

            for edge in self.graph.out_edges(node) {
                let v = edge.head;
                if !self.admits(v) || result.dist.contains_key(&v) {
                    continue;
                }
                let w = self.weighting.edge_cost(edge);
                if !w.is_finite() {
                    continue;
                }
                let new_dist = cost + w;
                result.stats.relaxations += 1;

                if new_dist <= self.budget {
                    let best = tentative.entry(v).or_insert(f64::INFINITY);
                    if new_dist < *best {
                        *best = new_dist;
                        pq.push(HeapEntry {
                            cost: new_dist,
                            node: v,
                        });
                        result.stats.pq_pushes += 1;
                    }
                }
            }
        }

        result
    }
}
