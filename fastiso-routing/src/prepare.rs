//! Offline preparation of the fast-isochrone stores
//!
//! Two passes per weighting, both parallel over the partition:
//! - eccentricities: one bounded search per border node
//! - border-node distances: one cell-confined search per border node,
//!   streamed to a single writer thread over a bounded channel
//!
//! A store file that already exists for the weighting is loaded instead of
//! being rebuilt.

use std::time::Instant;

use crossbeam_channel::bounded;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use fastiso_common::{CellId, Error, FastIsochroneConfig, NodeId, Result};

use crate::border_distance::{BorderNodeDistanceSet, BorderNodeDistanceStore};
use crate::eccentricity::EccentricityStore;
use crate::graph::RoadGraph;
use crate::partition::CellPartition;
use crate::search::RangeSearch;
use crate::weighting::Weighting;

/// Records in flight between the search workers and the store writer
const WRITER_QUEUE: usize = 1024;

/// Eccentricity of one border node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EccentricityResult {
    pub node: NodeId,
    /// Largest distance to a node of the cell that was found
    pub eccentricity: f64,
    /// Every node of the cell was found
    pub fully_reachable: bool,
}

pub struct Preparation<'a> {
    graph: &'a RoadGraph,
    partition: &'a CellPartition,
    config: &'a FastIsochroneConfig,
}

impl<'a> Preparation<'a> {
    pub fn new(
        graph: &'a RoadGraph,
        partition: &'a CellPartition,
        config: &'a FastIsochroneConfig,
    ) -> Result<Self> {
        if partition.n_nodes() != graph.n_nodes() {
            return Err(Error::InvalidArgument(format!(
                "partition covers {} nodes, graph has {}",
                partition.n_nodes(),
                graph.n_nodes()
            )));
        }
        config.validate()?;
        for cell in partition.all_cell_ids() {
            let size = partition.nodes_of_cell(cell).len();
            if size > config.max_cell_nodes {
                warn!(
                    cell,
                    size,
                    max_cell_nodes = config.max_cell_nodes,
                    "cell larger than max_cell_nodes"
                );
            }
        }
        Ok(Self {
            graph,
            partition,
            config,
        })
    }

    /// Prepare (or load) both stores for `weighting`.
    pub fn run(
        &self,
        weighting: &dyn Weighting,
    ) -> Result<(BorderNodeDistanceStore, EccentricityStore)> {
        let eccentricities = self.calc_eccentricities(weighting)?;
        let distances = self.calc_border_node_distances(weighting)?;
        Ok((distances, eccentricities))
    }

    /// Run `op` on a dedicated pool when a thread count is configured.
    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> Result<R> {
        if self.config.threads == 0 {
            return Ok(op());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| Error::Config(format!("cannot build thread pool: {e}")))?;
        Ok(pool.install(op))
    }

    /// Eccentricity of `node` within its cell.
    ///
    /// The cell-confined search is tried first. If it misses cell nodes
    /// (the cell is not connected internally), the search is repeated on the
    /// whole graph with a settled-node cap.
    pub fn eccentricity_of(&self, weighting: &dyn Weighting, node: NodeId) -> EccentricityResult {
        let cell = self.partition.cell_id(node);
        let cell_nodes = self.partition.nodes_of_cell(cell);

        let in_cell = RangeSearch::new(self.graph, weighting)
            .within_cell(self.partition, cell)
            .run(&[(node, 0.0)]);
        if in_cell.n_settled() == cell_nodes.len() {
            return EccentricityResult {
                node,
                eccentricity: in_cell.max_dist(),
                fully_reachable: true,
            };
        }

        let targets: FxHashSet<NodeId> = cell_nodes.iter().copied().collect();
        let wide = RangeSearch::new(self.graph, weighting)
            .max_settled(self.config.eccentricity_search_limit())
            .stop_after(&targets)
            .run(&[(node, 0.0)]);

        let mut found = 0;
        let mut eccentricity: f64 = 0.0;
        for n in cell_nodes {
            if let Some(&d) = wide.dist.get(n) {
                found += 1;
                eccentricity = eccentricity.max(d);
            }
        }
        EccentricityResult {
            node,
            eccentricity,
            fully_reachable: found == cell_nodes.len(),
        }
    }

    pub fn calc_eccentricities(&self, weighting: &dyn Weighting) -> Result<EccentricityStore> {
        let mut store = EccentricityStore::new(&self.config.storage_dir, weighting);
        if store.load_existing()? {
            info!(
                path = %store.path().display(),
                border_nodes = store.border_node_count(),
                "reusing prepared eccentricities"
            );
            return Ok(store);
        }

        let start = Instant::now();
        store.init(self.partition)?;
        let border_nodes = self.partition.border_nodes();

        let results: Vec<EccentricityResult> = self.install(|| {
            border_nodes
                .par_iter()
                .map(|&node| self.eccentricity_of(weighting, node))
                .collect()
        })?;

        let mut fully = 0usize;
        for result in &results {
            store.set_eccentricity(result.node, result.eccentricity)?;
            store.set_fully_reachable(result.node, result.fully_reachable)?;
            if result.fully_reachable {
                fully += 1;
            }
        }
        store.finalize_index()?;
        store.flush()?;
        store.close();
        reopen(store.load_existing(), store.path())?;

        info!(
            weighting = %weighting.descriptor(),
            border_nodes = results.len(),
            fully_reachable = fully,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "prepared eccentricities"
        );
        Ok(store)
    }

    /// Distances from every border node of `cell` to the other border nodes
    /// of the same cell. Peers not reached get `f64::INFINITY`.
    ///
    /// The search never leaves the cell, so it settles at most the cell's
    /// nodes and runs without a cap.
    pub fn cell_border_distances(
        &self,
        weighting: &dyn Weighting,
        cell: CellId,
    ) -> Vec<(NodeId, BorderNodeDistanceSet)> {
        let border = self.partition.border_nodes_of_cell(cell);

        border
            .iter()
            .map(|&node| {
                let peers: Vec<NodeId> = border.iter().copied().filter(|&p| p != node).collect();
                if peers.is_empty() {
                    return (node, BorderNodeDistanceSet::default());
                }
                let targets: FxHashSet<NodeId> = peers.iter().copied().collect();
                let result = RangeSearch::new(self.graph, weighting)
                    .within_cell(self.partition, cell)
                    .stop_after(&targets)
                    .run(&[(node, 0.0)]);
                let distances: Vec<f64> = peers
                    .iter()
                    .map(|p| result.dist.get(p).copied().unwrap_or(f64::INFINITY))
                    .collect();
                let unreached = distances.iter().filter(|d| d.is_infinite()).count();
                if unreached > 0 {
                    debug!(node, cell, unreached, "border peers not reachable inside the cell");
                }
                (node, BorderNodeDistanceSet::new(peers, distances))
            })
            .collect()
    }

    pub fn calc_border_node_distances(
        &self,
        weighting: &dyn Weighting,
    ) -> Result<BorderNodeDistanceStore> {
        let mut store = BorderNodeDistanceStore::new(&self.config.storage_dir, weighting);
        if store.load_existing()? {
            info!(
                path = %store.path().display(),
                border_nodes = store.border_node_count(),
                "reusing prepared border node distances"
            );
            return Ok(store);
        }

        let start = Instant::now();
        store.init(self.partition)?;
        let cells: Vec<CellId> = self.partition.all_cell_ids().collect();

        let (tx, rx) = bounded::<(NodeId, BorderNodeDistanceSet)>(WRITER_QUEUE);
        let written = std::thread::scope(|scope| -> Result<usize> {
            let writer_store = &mut store;
            let writer = scope.spawn(move || -> Result<usize> {
                let mut written = 0usize;
                for (node, set) in rx {
                    writer_store.store_distance_set(node, &set)?;
                    written += 1;
                }
                Ok(written)
            });

            let produced = self.install(|| {
                cells.par_iter().try_for_each_with(tx, |tx, &cell| {
                    for record in self.cell_border_distances(weighting, cell) {
                        tx.send(record).map_err(|_| {
                            Error::InvalidArgument("distance store writer stopped".into())
                        })?;
                    }
                    Ok::<(), Error>(())
                })
            });

            let written = match writer.join() {
                Ok(result) => result?,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            produced??;
            Ok(written)
        })?;

        store.finalize_index()?;
        store.flush()?;
        let used = store.used_bytes();
        store.close();
        reopen(store.load_existing(), store.path())?;

        info!(
            weighting = %weighting.descriptor(),
            cells = cells.len(),
            border_nodes = written,
            bytes = used,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "prepared border node distances"
        );
        Ok(store)
    }
}

/// A store that was just flushed must load back.
fn reopen(loaded: Result<bool>, path: &std::path::Path) -> Result<()> {
    if loaded? {
        Ok(())
    } else {
        Err(Error::NotInitialized(path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::weighting::ShortestWeighting;

    //  cell 0: 0 -1- 1 -2- 2      cell 1: 3 -1- 4
    //  bridges: 2 -3- 3, 0 -7- 4
    fn fixture() -> (RoadGraph, CellPartition) {
        let mut builder = GraphBuilder::new(5);
        builder.add_edge(0, 1, 1.0, 50.0).unwrap();
        builder.add_edge(1, 2, 2.0, 50.0).unwrap();
        builder.add_edge(2, 3, 3.0, 50.0).unwrap();
        builder.add_edge(3, 4, 1.0, 50.0).unwrap();
        builder.add_edge(0, 4, 7.0, 50.0).unwrap();
        let graph = builder.build();
        let partition = CellPartition::from_cell_ids(&graph, vec![0, 0, 0, 1, 1]).unwrap();
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
    fn eccentricity_in_connected_cell() {
        let (graph, partition) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let prep = Preparation::new(&graph, &partition, &config).unwrap();
        let w = ShortestWeighting::new("car");

        let result = prep.eccentricity_of(&w, 0);
        assert!(result.fully_reachable);
        assert_eq!(result.eccentricity, 3.0);
        assert_eq!(prep.eccentricity_of(&w, 2).eccentricity, 3.0);
    }

    #[test]
    fn disconnected_cell_uses_outside_paths() {
        // cell 0 = {0, 2}, only joined through node 1 of cell 1
        let mut builder = GraphBuilder::new(3);
        builder.add_edge(0, 1, 1.0, 50.0).unwrap();
        builder.add_edge(1, 2, 1.0, 50.0).unwrap();
        let graph = builder.build();
        let partition = CellPartition::from_cell_ids(&graph, vec![0, 1, 0]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let prep = Preparation::new(&graph, &partition, &config).unwrap();

        let result = prep.eccentricity_of(&ShortestWeighting::new("car"), 0);
        assert!(result.fully_reachable);
        assert_eq!(result.eccentricity, 2.0);
    }

    #[test]
    fn one_way_cell_is_not_fully_reachable() {
        // 1 -> 0 only, so 0 cannot reach 1
        let mut builder = GraphBuilder::new(3);
        builder.add_arc(1, 0, 1.0, 50.0).unwrap();
        builder.add_edge(0, 2, 1.0, 50.0).unwrap();
        let graph = builder.build();
        let partition = CellPartition::from_cell_ids(&graph, vec![0, 0, 1]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let prep = Preparation::new(&graph, &partition, &config).unwrap();

        let result = prep.eccentricity_of(&ShortestWeighting::new("car"), 0);
        assert!(!result.fully_reachable);
        assert_eq!(result.eccentricity, 0.0);
    }

    #[test]
    fn border_distances_stay_in_cell() {
        let (graph, partition) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let prep = Preparation::new(&graph, &partition, &config).unwrap();
        let w = ShortestWeighting::new("car");

        let records = prep.cell_border_distances(&w, 0);
        assert_eq!(records.len(), 2);
        let (node, set) = &records[0];
        assert_eq!(*node, 0);
        assert_eq!(set.ids, vec![2]);
        assert_eq!(set.distances, vec![3.0]);
    }

    #[test]
    fn border_distances_cover_cells_above_max_size() {
        // 0 | 1 - 2 - ... - 30 | 31, the chain is one cell of 30 nodes
        let mut builder = GraphBuilder::new(32);
        for v in 0..31 {
            builder.add_edge(v, v + 1, 1.0, 50.0).unwrap();
        }
        let graph = builder.build();
        let cells = (0..32).map(|v| if v == 0 || v == 31 { 1 } else { 0 }).collect();
        let partition = CellPartition::from_cell_ids(&graph, cells).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = FastIsochroneConfig {
            max_cell_nodes: 1,
            ..config(dir.path())
        };
        let prep = Preparation::new(&graph, &partition, &config).unwrap();

        let records = prep.cell_border_distances(&ShortestWeighting::new("car"), 0);
        let (node, set) = &records[0];
        assert_eq!(*node, 1);
        assert_eq!(set.distance_to(30), Some(29.0));
    }

    #[test]
    fn run_persists_and_reuses() {
        let (graph, partition) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let prep = Preparation::new(&graph, &partition, &config).unwrap();
        let w = ShortestWeighting::new("car");

        let (distances, eccentricities) = prep.run(&w).unwrap();
        assert_eq!(distances.border_node_count(), 4);
        assert_eq!(distances.get_distance_set(3).unwrap().ids, vec![4]);
        assert_eq!(eccentricities.get_eccentricity(4).unwrap(), 1);
        assert!(eccentricities.get_fully_reachable(4).unwrap());

        let (again, _) = prep.run(&w).unwrap();
        assert_eq!(again.get_distance_set(0).unwrap().distances, vec![3.0]);
    }

    #[test]
    fn partition_must_cover_graph() {
        let (graph, _) = fixture();
        let mut builder = GraphBuilder::new(2);
        builder.add_edge(0, 1, 1.0, 50.0).unwrap();
        let other = CellPartition::from_cell_ids(&builder.build(), vec![0, 1]).unwrap();
        let config = FastIsochroneConfig::default();
        assert!(Preparation::new(&graph, &other, &config).is_err());
    }
}
