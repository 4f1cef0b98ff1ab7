use hyperspace_core::error::{EngineError, Result};
use hyperspace_core::metric::MetricKind;
use parking_lot::RwLock;
use rand::Rng;
use roaring::{RoaringBitmap, RoaringTreemap};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fs;
use std::path::Path;

/// One graph node per inserted slot: a neighbor list per layer it
/// participates in, `layers[0]` being the base layer every node has.
struct Node {
    layers: Vec<RwLock<Vec<u32>>>,
}

/// Hierarchical small-world graph ANN index.
///
/// There is no delete. Overwriting an id tombstones its previous slot
/// (excluded from every future search and from future pruning decisions)
/// before linking the new node in — the graph edges around the tombstoned
/// node are left untouched, since there is nothing to delete them with.
pub struct HnswIndex {
    metric: MetricKind,
    dim: usize,
    m: usize,
    m_max0: usize,
    ef_construction: usize,
    max_elements: usize,
    vectors: RwLock<Vec<Vec<f32>>>,
    nodes: RwLock<Vec<Node>>,
    slot_of: RwLock<HashMap<u64, u32>>,
    id_of: RwLock<HashMap<u32, u64>>,
    tombstoned: RwLock<RoaringBitmap>,
    entry_point: RwLock<Option<u32>>,
    max_layer: RwLock<usize>,
}

#[derive(Clone, Copy)]
struct Candidate {
    key: f32,
    slot: u32,
}
impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.partial_cmp(&other.key).unwrap_or(Ordering::Equal)
    }
}

thread_local! {
    static VISITED_CACHE: RefCell<HashMap<usize, (Vec<u64>, u64)>> = RefCell::new(HashMap::new());
}

/// Generation-stamped visited set reused across queries on the same thread
/// instead of allocating a fresh set per call. `marks[slot] == generation`
/// means visited-this-query; bumping `generation` invalidates every prior
/// mark in O(1).
struct VisitedScratch<'a> {
    marks: &'a mut Vec<u64>,
    generation: u64,
}
impl<'a> VisitedScratch<'a> {
    fn is_visited(&self, slot: u32) -> bool {
        self.marks.get(slot as usize).copied().unwrap_or(0) == self.generation
    }
    fn mark(&mut self, slot: u32) {
        self.marks[slot as usize] = self.generation;
    }
}

fn with_visited_scratch<R>(index_id: usize, capacity: usize, f: impl FnOnce(&mut VisitedScratch) -> R) -> R {
    VISITED_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        let entry = cache.entry(index_id).or_insert_with(|| (vec![0u64; capacity], 0));
        if entry.0.len() < capacity {
            entry.0.resize(capacity, 0);
        }
        entry.1 = entry.1.wrapping_add(1);
        if entry.1 == 0 {
            // Wrapped back to 0 (the "unvisited" sentinel): clear so old marks can't alias.
            entry.0.iter_mut().for_each(|m| *m = 0);
            entry.1 = 1;
        }
        let generation = entry.1;
        let mut scratch = VisitedScratch {
            marks: &mut entry.0,
            generation,
        };
        f(&mut scratch)
    })
}

impl HnswIndex {
    pub fn new(metric: MetricKind, dim: usize, m: usize, ef_construction: usize, max_elements: usize) -> Self {
        HnswIndex {
            metric,
            dim,
            m,
            m_max0: m * 2,
            ef_construction,
            max_elements,
            vectors: RwLock::new(Vec::new()),
            nodes: RwLock::new(Vec::new()),
            slot_of: RwLock::new(HashMap::new()),
            id_of: RwLock::new(HashMap::new()),
            tombstoned: RwLock::new(RoaringBitmap::new()),
            entry_point: RwLock::new(None),
            max_layer: RwLock::new(0),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn contains(&self, id: u64) -> bool {
        self.slot_of.read().contains_key(&id)
    }

    pub fn count_live(&self) -> usize {
        let slot_of = self.slot_of.read();
        slot_of.len()
    }

    fn metric_key(&self, a: &[f32], b: &[f32]) -> f32 {
        let d = self.metric.distance(a, b);
        if self.metric == MetricKind::InnerProduct {
            -d
        } else {
            d
        }
    }

    fn key_to_distance(&self, key: f32) -> f32 {
        if self.metric == MetricKind::InnerProduct {
            -key
        } else {
            key
        }
    }

    fn random_level(&self) -> usize {
        let ml = 1.0 / (self.m as f64).ln();
        let mut rng = rand::thread_rng();
        let r: f64 = rng.gen_range(f64::EPSILON..1.0);
        (-r.ln() * ml).floor() as usize
    }

    /// Best-first search of a single layer starting from `entry_points`.
    /// `reject` controls membership in the returned result pool (but a
    /// rejected node is still traversed for its neighbors) — this is what
    /// makes mask filtering a property of the traversal rather than a
    /// post-filter.
    #[allow(clippy::too_many_arguments)]
    fn search_layer(
        &self,
        vectors: &[Vec<f32>],
        nodes: &[Node],
        layer: usize,
        entry_points: &[u32],
        query: &[f32],
        ef: usize,
        reject: &dyn Fn(u32) -> bool,
        scratch: &mut VisitedScratch,
    ) -> Vec<Candidate> {
        let mut frontier: BinaryHeap<std::cmp::Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

        for &ep in entry_points {
            if scratch.is_visited(ep) {
                continue;
            }
            scratch.mark(ep);
            let key = self.metric_key(query, &vectors[ep as usize]);
            let cand = Candidate { key, slot: ep };
            frontier.push(std::cmp::Reverse(cand));
            if !reject(ep) {
                results.push(cand);
            }
        }

        while let Some(std::cmp::Reverse(current)) = frontier.pop() {
            if let Some(worst) = results.peek() {
                if results.len() >= ef && current.key > worst.key {
                    break;
                }
            }
            if layer >= nodes[current.slot as usize].layers.len() {
                continue;
            }
            let neighbors: Vec<u32> = nodes[current.slot as usize].layers[layer].read().clone();
            for nb in neighbors {
                if scratch.is_visited(nb) {
                    continue;
                }
                scratch.mark(nb);
                let key = self.metric_key(query, &vectors[nb as usize]);
                let worse_than_pool = results.len() >= ef
                    && results
                        .peek()
                        .map(|w| key >= w.key)
                        .unwrap_or(false);
                if worse_than_pool {
                    continue;
                }
                let cand = Candidate { key, slot: nb };
                frontier.push(std::cmp::Reverse(cand));
                if !reject(nb) {
                    results.push(cand);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Adds `vector` as a new node labelled `id`. If `id` already has a live
    /// slot, that slot is tombstoned first so only the new node is "live"
    /// for future searches — overwrite semantics without a true delete.
    pub fn insert(&self, vector: &[f32], id: u64) -> Result<()> {
        if vector.len() != self.dim {
            return Err(EngineError::BadRequest(format!(
                "vector has dimension {} but collection is configured for {}",
                vector.len(),
                self.dim
            )));
        }

        let mut vectors = self.vectors.write();
        if vectors.len() >= self.max_elements {
            return Err(EngineError::CapacityExceeded {
                max_elements: self.max_elements,
            });
        }
        let mut nodes = self.nodes.write();
        let mut slot_of = self.slot_of.write();
        let mut id_of = self.id_of.write();
        let mut tombstoned = self.tombstoned.write();
        let mut entry_point = self.entry_point.write();
        let mut max_layer = self.max_layer.write();

        if let Some(&old_slot) = slot_of.get(&id) {
            tombstoned.insert(old_slot);
        }

        let level = self.random_level();
        let slot = u32::try_from(vectors.len()).map_err(|_| EngineError::CapacityExceeded {
            max_elements: u32::MAX as usize,
        })?;
        vectors.push(vector.to_vec());
        nodes.push(Node {
            layers: (0..=level).map(|_| RwLock::new(Vec::new())).collect(),
        });
        slot_of.insert(id, slot);
        id_of.insert(slot, id);

        let index_id = self as *const Self as usize;

        let Some(mut ep) = *entry_point else {
            *entry_point = Some(slot);
            *max_layer = level;
            return Ok(());
        };
        let top = *max_layer;

        with_visited_scratch(index_id, vectors.len(), |scratch| {
            for layer in ((level + 1)..=top).rev() {
                let res = self.search_layer(&vectors, &nodes, layer, &[ep], vector, 1, &|_| false, scratch);
                if let Some(best) = res.first() {
                    ep = best.slot;
                }
            }

            for layer in (0..=level.min(top)).rev() {
                let candidates =
                    self.search_layer(&vectors, &nodes, layer, &[ep], vector, self.ef_construction, &|_| false, scratch);
                let m_layer = if layer == 0 { self.m_max0 } else { self.m };
                let selected: Vec<u32> = candidates.iter().take(m_layer).map(|c| c.slot).collect();

                *nodes[slot as usize].layers[layer].write() = selected.clone();
                for &nb in &selected {
                    let mut nb_list = nodes[nb as usize].layers[layer].write();
                    nb_list.push(slot);
                    if nb_list.len() > m_layer {
                        let nb_vec = &vectors[nb as usize];
                        let mut scored: Vec<Candidate> = nb_list
                            .iter()
                            .map(|&s| Candidate {
                                key: self.metric_key(nb_vec, &vectors[s as usize]),
                                slot: s,
                            })
                            .collect();
                        scored.sort();
                        scored.truncate(m_layer);
                        *nb_list = scored.into_iter().map(|c| c.slot).collect();
                    }
                }
                if let Some(best) = candidates.first() {
                    ep = best.slot;
                }
            }
        });

        if level > top {
            *max_layer = level;
            *entry_point = Some(slot);
        }
        Ok(())
    }

    /// Traverses the hierarchy for the `k` best matches. Tombstoned slots
    /// and (when `mask` is given) slots whose id is outside the mask are
    /// rejected during traversal itself, not filtered after the fact.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        mask: Option<&RoaringTreemap>,
        ef_search: usize,
    ) -> (Vec<i64>, Vec<f32>) {
        let vectors = self.vectors.read();
        let nodes = self.nodes.read();
        let id_of = self.id_of.read();
        let tombstoned = self.tombstoned.read();
        let entry_point = *self.entry_point.read();
        let max_layer = *self.max_layer.read();

        let pad = |mut ids: Vec<i64>, mut dists: Vec<f32>| {
            while ids.len() < k {
                ids.push(-1);
                dists.push(0.0);
            }
            (ids, dists)
        };

        let Some(mut ep) = entry_point else {
            return pad(Vec::new(), Vec::new());
        };

        let reject = |slot: u32| -> bool {
            if tombstoned.contains(slot) {
                return true;
            }
            if let Some(mask) = mask {
                match id_of.get(&slot) {
                    Some(&id) => !mask.contains(id),
                    None => true,
                }
            } else {
                false
            }
        };

        let index_id = self as *const Self as usize;
        let ef = ef_search.max(k);
        let (mut ids, mut dists) = (Vec::new(), Vec::new());
        with_visited_scratch(index_id, vectors.len(), |scratch| {
            for layer in (1..=max_layer).rev() {
                let res = self.search_layer(&vectors, &nodes, layer, &[ep], query, 1, &|_| false, scratch);
                if let Some(best) = res.first() {
                    ep = best.slot;
                }
            }
            let candidates = self.search_layer(&vectors, &nodes, 0, &[ep], query, ef, &reject, scratch);
            for c in candidates.into_iter().take(k) {
                if let Some(&id) = id_of.get(&c.slot) {
                    ids.push(id as i64);
                    dists.push(self.key_to_distance(c.key));
                }
            }
        });
        pad(ids, dists)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let vectors = self.vectors.read();
        let nodes = self.nodes.read();
        let slot_of = self.slot_of.read();
        let id_of = self.id_of.read();
        let tombstoned = self.tombstoned.read();
        let entry_point = *self.entry_point.read();
        let max_layer = *self.max_layer.read();

        let mut tombstoned_bytes = Vec::new();
        tombstoned
            .serialize_into(&mut tombstoned_bytes)
            .map_err(|e| EngineError::Internal(format!("bitmap serialize failed: {e}")))?;

        let node_layers: Vec<Vec<Vec<u32>>> = nodes
            .iter()
            .map(|n| n.layers.iter().map(|l| l.read().clone()).collect())
            .collect();

        let snapshot = HnswSnapshot {
            metric: metric_tag(self.metric),
            dim: self.dim as u64,
            m: self.m as u64,
            m_max0: self.m_max0 as u64,
            ef_construction: self.ef_construction as u64,
            max_elements: self.max_elements as u64,
            entry_point: entry_point.map(i64::from).unwrap_or(-1),
            max_layer: max_layer as u64,
            vectors: vectors.clone(),
            node_layers,
            slot_of: slot_of.iter().map(|(&k, &v)| (k, v)).collect(),
            id_of: id_of.iter().map(|(&k, &v)| (k, v)).collect(),
            tombstoned_bytes,
        };
        let bytes = bincode::serialize(&snapshot)
            .map_err(|e| EngineError::Internal(format!("hnsw snapshot encode failed: {e}")))?;
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        let snapshot: HnswSnapshot = bincode::deserialize(&bytes)
            .map_err(|e| EngineError::Internal(format!("hnsw snapshot decode failed: {e}")))?;
        let tombstoned = RoaringBitmap::deserialize_from(&snapshot.tombstoned_bytes[..])
            .map_err(|e| EngineError::Internal(format!("bitmap deserialize failed: {e}")))?;
        let nodes = snapshot
            .node_layers
            .into_iter()
            .map(|layers| Node {
                layers: layers.into_iter().map(RwLock::new).collect(),
            })
            .collect();
        Ok(HnswIndex {
            metric: metric_from_tag(snapshot.metric),
            dim: snapshot.dim as usize,
            m: snapshot.m as usize,
            m_max0: snapshot.m_max0 as usize,
            ef_construction: snapshot.ef_construction as usize,
            max_elements: snapshot.max_elements as usize,
            vectors: RwLock::new(snapshot.vectors),
            nodes: RwLock::new(nodes),
            slot_of: RwLock::new(snapshot.slot_of.into_iter().collect()),
            id_of: RwLock::new(snapshot.id_of.into_iter().collect()),
            tombstoned: RwLock::new(tombstoned),
            entry_point: RwLock::new(if snapshot.entry_point < 0 {
                None
            } else {
                Some(snapshot.entry_point as u32)
            }),
            max_layer: RwLock::new(snapshot.max_layer as usize),
        })
    }
}

fn metric_tag(m: MetricKind) -> u8 {
    match m {
        MetricKind::L2 => 0,
        MetricKind::InnerProduct => 1,
        MetricKind::Cosine => 2,
    }
}
fn metric_from_tag(tag: u8) -> MetricKind {
    match tag {
        1 => MetricKind::InnerProduct,
        2 => MetricKind::Cosine,
        _ => MetricKind::L2,
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct HnswSnapshot {
    metric: u8,
    dim: u64,
    m: u64,
    m_max0: u64,
    ef_construction: u64,
    max_elements: u64,
    entry_point: i64,
    max_layer: u64,
    vectors: Vec<Vec<f32>>,
    node_layers: Vec<Vec<Vec<u32>>>,
    slot_of: Vec<(u64, u32)>,
    id_of: Vec<(u32, u64)>,
    tombstoned_bytes: Vec<u8>,
}
