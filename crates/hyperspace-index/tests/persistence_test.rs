use hyperspace_core::{EngineConfig, FilterOp, IndexKind, MetricKind};
use hyperspace_index::IndexRegistry;
use hyperspace_store::ScalarStore;

#[test]
fn snapshot_folder_has_one_file_per_vector_index_kind() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::new(dir.path().to_path_buf());
    let store = ScalarStore::open(config.scalar_dir()).unwrap();

    let mut registry = IndexRegistry::new(MetricKind::L2, 3);
    registry.init(IndexKind::Flat, &config);
    registry.init(IndexKind::Ann, &config);
    registry.flat_mut().unwrap().insert(&[1.0, 2.0, 3.0], 1).unwrap();
    registry.ann_mut().unwrap().insert(&[1.0, 2.0, 3.0], 1).unwrap();

    registry.save_all(config.snapshot_dir(), &store).unwrap();

    assert!(config.snapshot_dir().join("FLAT.index").exists());
    assert!(config.snapshot_dir().join("HNSW.index").exists());
}

#[test]
fn full_registry_round_trip_preserves_vectors_and_postings() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::new(dir.path().to_path_buf());
    let store = ScalarStore::open(config.scalar_dir()).unwrap();

    let mut registry = IndexRegistry::new(MetricKind::L2, 2);
    registry.init(IndexKind::Flat, &config);
    for id in 1..=20u64 {
        registry.flat_mut().unwrap().insert(&[id as f32, 0.0], id).unwrap();
        registry.filter().add("bucket", (id % 3) as i64, id);
    }
    registry.save_all(config.snapshot_dir(), &store).unwrap();

    let loaded = IndexRegistry::load_all(config.snapshot_dir(), MetricKind::L2, 2, &store).unwrap();
    assert_eq!(loaded.flat().unwrap().count(), 20);
    let mask = loaded.filter().mask("bucket", FilterOp::Eq, 1).unwrap();
    assert!(mask.contains(1));
    assert!(mask.contains(4));
    assert!(!mask.contains(3));
}
