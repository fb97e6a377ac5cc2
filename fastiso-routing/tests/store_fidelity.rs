//! Stores read back exactly what preparation wrote, after a reload.

mod common;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fastiso_routing::{
    BorderNodeDistanceSet, BorderNodeDistanceStore, EccentricityStore, Error, NodeId,
    ShortestWeighting,
};

#[test]
fn distance_lists_survive_reload() {
    let (_, partition) = common::random_instance(11, 50, 6);
    let dir = tempfile::tempdir().unwrap();
    let w = ShortestWeighting::new("car");
    let mut rng = StdRng::seed_from_u64(11);

    let mut store = BorderNodeDistanceStore::new(dir.path(), &w);
    store.init(&partition).unwrap();

    let mut written = Vec::new();
    for cell in partition.all_cell_ids() {
        let border = partition.border_nodes_of_cell(cell);
        for &node in &border {
            let ids: Vec<NodeId> = border.iter().copied().filter(|&p| p != node).collect();
            let distances = ids
                .iter()
                .map(|_| {
                    if rng.gen_bool(0.1) {
                        f64::INFINITY
                    } else {
                        rng.gen_range(0.0..5000.0)
                    }
                })
                .collect();
            let set = BorderNodeDistanceSet::new(ids, distances);
            store.store_distance_set(node, &set).unwrap();
            written.push((node, set));
        }
    }
    assert!(store.used_bytes() <= BorderNodeDistanceStore::planned_bytes(&partition));
    store.finalize_index().unwrap();
    store.flush().unwrap();
    store.close();
    assert!(store.is_closed());

    let mut reader = BorderNodeDistanceStore::new(dir.path(), &w);
    assert!(reader.load_existing().unwrap());
    assert_eq!(reader.border_node_count(), partition.border_node_count());
    for (node, set) in &written {
        assert_eq!(&reader.get_distance_set(*node).unwrap(), set);
    }
    let inner = (0..partition.n_nodes() as NodeId).find(|&n| !partition.is_border_node(n));
    if let Some(inner) = inner {
        assert!(matches!(
            reader.get_distance_set(inner),
            Err(Error::NotFound { .. })
        ));
    }
    let set = BorderNodeDistanceSet::new(vec![], vec![]);
    assert!(matches!(
        reader.store_distance_set(0, &set),
        Err(Error::ReadOnly(_)) | Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn unfinished_index_is_rejected() {
    let (_, partition) = common::random_instance(12, 20, 3);
    let dir = tempfile::tempdir().unwrap();
    let w = ShortestWeighting::new("car");
    let mut store = BorderNodeDistanceStore::new(dir.path(), &w);
    store.init(&partition).unwrap();
    if let Some(&node) = partition.border_nodes().first() {
        store
            .store_distance_set(node, &BorderNodeDistanceSet::default())
            .unwrap();
        if partition.border_node_count() > 1 {
            assert!(store.finalize_index().is_err());
        }
    }
}

#[test]
fn eccentricities_survive_reload() {
    let (_, partition) = common::random_instance(13, 40, 5);
    let dir = tempfile::tempdir().unwrap();
    let w = ShortestWeighting::new("car");
    let mut rng = StdRng::seed_from_u64(13);

    let mut store = EccentricityStore::new(dir.path(), &w);
    store.init(&partition).unwrap();
    let mut written = Vec::new();
    for node in partition.border_nodes() {
        let real: f64 = rng.gen_range(0.0..10_000.0);
        let fully = rng.gen_bool(0.7);
        store.set_eccentricity(node, real).unwrap();
        store.set_fully_reachable(node, fully).unwrap();
        written.push((node, real, fully));
    }
    store.finalize_index().unwrap();
    store.flush().unwrap();
    store.close();

    let mut reader = EccentricityStore::new(dir.path(), &w);
    assert!(reader.load_existing().unwrap());
    for (node, real, fully) in written {
        let stored = reader.get_eccentricity(node).unwrap();
        assert!(stored as f64 >= real);
        assert_eq!(stored, real.ceil() as i32);
        assert_eq!(reader.get_fully_reachable(node).unwrap(), fully);
    }
}
