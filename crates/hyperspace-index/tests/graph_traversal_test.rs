use hyperspace_core::MetricKind;
use hyperspace_index::HnswIndex;

/// Enough points to force multiple layers (`m = 4` keeps `random_level` from
/// being vanishingly unlikely to exceed zero) so the greedy descent through
/// `max_layer` down to layer 0 actually runs, not just the base-layer beam.
#[test]
fn multi_layer_descent_still_finds_the_true_nearest() {
    let index = HnswIndex::new(MetricKind::L2, 1, 4, 200, 100_000);
    for i in 1..=500u64 {
        index.insert(&[i as f32], i).unwrap();
    }
    let (ids, dists) = index.search(&[250.0], 1, None, 200);
    assert_eq!(ids[0], 250);
    assert_eq!(dists[0], 0.0);
}

#[test]
fn ef_search_of_one_still_returns_a_result() {
    let index = HnswIndex::new(MetricKind::L2, 2, 8, 100, 1000);
    for i in 1..=50u64 {
        index.insert(&[i as f32, i as f32], i).unwrap();
    }
    let (ids, _) = index.search(&[1.0, 1.0], 1, None, 1);
    assert_ne!(ids[0], -1);
}

#[test]
fn searching_an_empty_index_pads_with_sentinel() {
    let index = HnswIndex::new(MetricKind::L2, 2, 8, 100, 1000);
    let (ids, dists) = index.search(&[0.0, 0.0], 3, None, 50);
    assert_eq!(ids, vec![-1, -1, -1]);
    assert_eq!(dists, vec![0.0, 0.0, 0.0]);
}
