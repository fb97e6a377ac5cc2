//! Serving through `FastIsochroneIndex`: stores missing, corrupt or too
//! small a query cap all end in the exact search.

mod common;

use fastiso_common::FastIsochroneConfig;
use fastiso_io::naming::{store_path, StoreKind};
use fastiso_routing::{
    FastIsochroneIndex, FastestWeighting, QueryMethod, ShortestWeighting, Weighting,
};

#[test]
fn prepared_profile_uses_fast_path() {
    let (graph, partition) = common::random_instance(5, 30, 4);
    let dir = tempfile::tempdir().unwrap();
    let w = ShortestWeighting::new("car");
    common::prepare(dir.path(), &graph, &partition, &w);

    let weightings: [&dyn Weighting; 1] = [&w];
    let index = FastIsochroneIndex::open(common::config(dir.path(), 30), &weightings);
    let iso = index.isochrone(&graph, &partition, &w, 2, 12.0).unwrap();
    assert_eq!(iso.method, QueryMethod::Fast);
    assert_eq!(
        iso.reachable.node_ids(&partition),
        common::brute_force(&graph, &w, 2, 12.0)
    );
}

#[test]
fn missing_store_falls_back() {
    let (graph, partition) = common::random_instance(6, 30, 4);
    let dir = tempfile::tempdir().unwrap();
    let w = FastestWeighting::new("car");

    let weightings: [&dyn Weighting; 1] = [&w];
    let index = FastIsochroneIndex::open(common::config(dir.path(), 30), &weightings);
    assert!(index.stores_for(&w).is_none());
    let iso = index.isochrone(&graph, &partition, &w, 0, 5.0).unwrap();
    assert_eq!(iso.method, QueryMethod::Exact);
    assert_eq!(
        iso.reachable.node_ids(&partition),
        common::brute_force(&graph, &w, 0, 5.0)
    );
}

#[test]
fn corrupt_store_falls_back() {
    let (graph, partition) = common::random_instance(7, 30, 4);
    let dir = tempfile::tempdir().unwrap();
    let w = ShortestWeighting::new("car");
    common::prepare(dir.path(), &graph, &partition, &w);

    let path = store_path(dir.path(), StoreKind::BorderNodeDistances, &w.descriptor());
    let mut raw = std::fs::read(&path).unwrap();
    let middle = raw.len() / 2;
    raw[middle] ^= 0x5A;
    std::fs::write(&path, raw).unwrap();

    let weightings: [&dyn Weighting; 1] = [&w];
    let index = FastIsochroneIndex::open(common::config(dir.path(), 30), &weightings);
    assert!(index.stores_for(&w).is_none());
    let iso = index.isochrone(&graph, &partition, &w, 4, 10.0).unwrap();
    assert_eq!(iso.method, QueryMethod::Exact);
    assert_eq!(
        iso.reachable.node_ids(&partition),
        common::brute_force(&graph, &w, 4, 10.0)
    );
}

#[test]
fn expansion_limit_falls_back() {
    let (graph, partition) = common::random_instance(8, 30, 4);
    let dir = tempfile::tempdir().unwrap();
    let w = ShortestWeighting::new("car");
    common::prepare(dir.path(), &graph, &partition, &w);

    let config = FastIsochroneConfig {
        max_query_settled: 2,
        ..common::config(dir.path(), 30)
    };
    let weightings: [&dyn Weighting; 1] = [&w];
    let index = FastIsochroneIndex::open(config, &weightings);
    assert!(index.stores_for(&w).is_some());
    let iso = index.isochrone(&graph, &partition, &w, 0, 1e9).unwrap();
    assert_eq!(iso.method, QueryMethod::Exact);
    assert_eq!(iso.reachable.len(&partition), graph.n_nodes());
}
