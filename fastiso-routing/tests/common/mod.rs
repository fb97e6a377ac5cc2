#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fastiso_common::FastIsochroneConfig;
use fastiso_routing::{
    BorderNodeDistanceStore, CellPartition, EccentricityStore, GraphBuilder, NodeId, Preparation,
    RangeSearch, RoadGraph, Weighting,
};

pub fn config(dir: &Path, max_cell_nodes: usize) -> FastIsochroneConfig {
    FastIsochroneConfig {
        storage_dir: dir.to_path_buf(),
        max_cell_nodes,
        ..Default::default()
    }
}

pub fn prepare(
    dir: &Path,
    graph: &RoadGraph,
    partition: &CellPartition,
    weighting: &dyn Weighting,
) -> (BorderNodeDistanceStore, EccentricityStore) {
    prepare_with_cell_size(dir, graph, partition, weighting, graph.n_nodes().max(1))
}

pub fn prepare_with_cell_size(
    dir: &Path,
    graph: &RoadGraph,
    partition: &CellPartition,
    weighting: &dyn Weighting,
    max_cell_nodes: usize,
) -> (BorderNodeDistanceStore, EccentricityStore) {
    let config = config(dir, max_cell_nodes);
    Preparation::new(graph, partition, &config)
        .unwrap()
        .run(weighting)
        .unwrap()
}

/// Random instance with integer lengths, a bidirectional spanning tree and
/// extra arcs, some of them one-way. Cell ids are random, so cells are often
/// not connected internally.
pub fn random_instance(seed: u64, n: usize, cells: u32) -> (RoadGraph, CellPartition) {
    random_graph(seed, n, cells, |rng| (rng.gen_range(1..=9) as f64, 50.0))
}

/// Same shape as [`random_instance`] with fractional lengths and mixed
/// speeds, so no edge has an integer travel time.
pub fn random_fractional_instance(seed: u64, n: usize, cells: u32) -> (RoadGraph, CellPartition) {
    const SPEEDS: [f64; 5] = [13.7, 30.0, 50.0, 77.3, 110.0];
    random_graph(seed, n, cells, |rng| {
        let length = rng.gen_range(5.0..400.0);
        let speed = SPEEDS[rng.gen_range(0..SPEEDS.len())];
        (length, speed)
    })
}

fn random_graph(
    seed: u64,
    n: usize,
    cells: u32,
    mut edge: impl FnMut(&mut StdRng) -> (f64, f64),
) -> (RoadGraph, CellPartition) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut builder = GraphBuilder::new(n);
    for v in 1..n {
        let u = rng.gen_range(0..v);
        let (length, speed) = edge(&mut rng);
        builder.add_edge(u as NodeId, v as NodeId, length, speed).unwrap();
    }
    for _ in 0..n {
        let u = rng.gen_range(0..n) as NodeId;
        let v = rng.gen_range(0..n) as NodeId;
        if u == v {
            continue;
        }
        let (length, speed) = edge(&mut rng);
        if rng.gen_bool(0.3) {
            builder.add_arc(u, v, length, speed).unwrap();
        } else {
            builder.add_edge(u, v, length, speed).unwrap();
        }
    }
    let graph = builder.build();
    let cell_of = (0..n).map(|_| rng.gen_range(0..cells)).collect();
    let partition = CellPartition::from_cell_ids(&graph, cell_of).unwrap();
    (graph, partition)
}

/// Node set of a plain bounded search.
pub fn brute_force(
    graph: &RoadGraph,
    weighting: &dyn Weighting,
    source: NodeId,
    budget: f64,
) -> BTreeSet<NodeId> {
    RangeSearch::new(graph, weighting)
        .budget(budget)
        .run(&[(source, 0.0)])
        .dist
        .keys()
        .copied()
        .collect()
}
